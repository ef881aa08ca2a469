use async_trait::async_trait;
use serde::{
    Deserialize,
    Serialize,
};
use strum::{
    Display,
    EnumIter,
};

mod controller;

pub use controller::{
    Acquisition,
    MediaController,
    MediaUpdate,
};

/// The three local capture sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MediaKind {
    Microphone,
    Camera,
    Screen,
}

/// What the user asked for. Screen sharing and camera are independent
/// sources and may both be on.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalMediaState {
    pub mic_on: bool,
    pub camera_on: bool,
    pub screen_sharing: bool,
}

impl LocalMediaState {
    pub fn new(mic_on: bool, camera_on: bool) -> Self {
        Self {
            mic_on,
            camera_on,
            screen_sharing: false,
        }
    }

    pub fn is_on(&self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Microphone => self.mic_on,
            MediaKind::Camera => self.camera_on,
            MediaKind::Screen => self.screen_sharing,
        }
    }

    pub(crate) fn set(&mut self, kind: MediaKind, on: bool) {
        match kind {
            MediaKind::Microphone => self.mic_on = on,
            MediaKind::Camera => self.camera_on = on,
            MediaKind::Screen => self.screen_sharing = on,
        }
    }
}

/// Handle to a capture track owned by the media-device layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalTrack {
    pub id: String,
    pub kind: MediaKind,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    #[error("{kind} unavailable: {reason}")]
    Unavailable { kind: MediaKind, reason: String },
}

impl MediaError {
    pub fn unavailable(kind: MediaKind, reason: impl ToString) -> Self {
        Self::Unavailable {
            kind,
            reason: reason.to_string(),
        }
    }

    pub fn kind(&self) -> MediaKind {
        match self {
            Self::Unavailable { kind, .. } => *kind,
        }
    }
}

/// Capture devices (microphone, camera, display capture).
///
/// Acquisition is asynchronous and may fail when permission is denied or the
/// device is busy. A released track must not be used again.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn acquire(&self, kind: MediaKind) -> Result<LocalTrack, MediaError>;

    async fn release(&self, track: LocalTrack);

    async fn acquire_microphone_track(&self) -> Result<LocalTrack, MediaError> {
        self.acquire(MediaKind::Microphone).await
    }

    async fn acquire_camera_track(&self) -> Result<LocalTrack, MediaError> {
        self.acquire(MediaKind::Camera).await
    }

    async fn acquire_screen_track(&self) -> Result<LocalTrack, MediaError> {
        self.acquire(MediaKind::Screen).await
    }
}
