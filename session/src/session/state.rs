use crate::{
    layout::Layout,
    media::LocalMediaState,
    participant::{
        ParticipantId,
        RemoteParticipant,
    },
};
use classroom_config::JoinConfig;

#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SessionState {
    pub running: bool,
    pub joined: bool,
    pub channel: String,
    pub local_id: Option<ParticipantId>,
    /// Requested toggles. A source reads as on while its track is still
    /// being acquired.
    pub media: LocalMediaState,
    pub whiteboard_open: bool,
    pub participants: Vec<RemoteParticipant>,
    pub remote_screen_share: Option<ParticipantId>,
    pub layout: Layout,
}

impl SessionState {
    pub(super) fn new(join: &JoinConfig) -> Self {
        Self {
            running: true,
            channel: join.channel.clone(),
            media: LocalMediaState::new(join.mic_on, join.camera_on),
            ..Default::default()
        }
    }
}
