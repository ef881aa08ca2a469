use crate::media::{
    LocalTrack,
    MediaKind,
};
use derive_more::{
    Deref,
    Display,
};
use serde::{
    Deserialize,
    Serialize,
};

/// Transport-assigned participant identifier, unique within a channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Deref, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ParticipantId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Metadata the transport exposes for a remote video track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteVideoTrack {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Dedicated screen-track flag, only some transports set it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_screen_track: Option<bool>,
    /// Label of the underlying capture device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_label: Option<String>,
}

impl RemoteVideoTrack {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: None,
            is_screen_track: None,
            device_label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_screen_flag(mut self, is_screen_track: bool) -> Self {
        self.is_screen_track = Some(is_screen_track);
        self
    }

    pub fn with_device_label(mut self, device_label: impl Into<String>) -> Self {
        self.device_label = Some(device_label.into());
        self
    }
}

impl From<&LocalTrack> for RemoteVideoTrack {
    fn from(track: &LocalTrack) -> Self {
        Self::new(track.id.clone()).with_label(track.label.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteParticipant {
    pub id: ParticipantId,
    pub has_video: bool,
    pub has_audio: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_track: Option<RemoteVideoTrack>,
}

impl RemoteParticipant {
    /// A participant that joined without publishing anything.
    pub fn new(id: impl Into<ParticipantId>) -> Self {
        Self {
            id: id.into(),
            has_video: false,
            has_audio: false,
            video_track: None,
        }
    }

    pub fn with_audio(mut self) -> Self {
        self.has_audio = true;
        self
    }

    pub fn with_video(mut self, track: RemoteVideoTrack) -> Self {
        self.has_video = true;
        self.video_track = Some(track);
        self
    }

    /// Remote view of a participant publishing `tracks`. A published screen
    /// takes the video slot over the camera.
    pub fn from_published(id: impl Into<ParticipantId>, tracks: &[LocalTrack]) -> Self {
        let mut participant = Self::new(id);
        participant.has_audio = tracks.iter().any(|track| track.kind == MediaKind::Microphone);
        let video = tracks
            .iter()
            .find(|track| track.kind == MediaKind::Screen)
            .or_else(|| tracks.iter().find(|track| track.kind == MediaKind::Camera));
        if let Some(track) = video {
            participant = participant.with_video(track.into());
        }
        participant
    }
}
