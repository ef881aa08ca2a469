use crate::{
    media::LocalTrack,
    participant::{
        ParticipantId,
        RemoteParticipant,
    },
};
use async_trait::async_trait;
use classroom_config::JoinConfig;
use tokio::sync::watch;

/// Channel identity and credentials handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub app_id: String,
    pub channel: String,
    pub token: Option<String>,
}

impl From<&JoinConfig> for JoinRequest {
    fn from(join: &JoinConfig) -> Self {
        Self {
            app_id: join.app_id.clone(),
            channel: join.channel.clone(),
            token: join.token.clone(),
        }
    }
}

/// A joined channel.
///
/// Every change of the remote participant set arrives as one complete list
/// on `participants`. The receiver closes when the connection is lost.
#[derive(Debug)]
pub struct TransportSession {
    pub local_id: ParticipantId,
    pub participants: watch::Receiver<Vec<RemoteParticipant>>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("failed to join channel {channel}: {reason}")]
    JoinFailed { channel: String, reason: String },
    #[error("already joined to channel {0}")]
    AlreadyJoined(String),
    #[error("not joined to a channel")]
    NotJoined,
    #[error("failed to publish track {track}: {reason}")]
    Publish { track: String, reason: String },
    #[error("transport closed")]
    Closed,
}

/// Real-time media transport. One instance serves one session screen.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn join(&self, request: JoinRequest) -> Result<TransportSession, TransportError>;

    async fn publish(&self, tracks: &[LocalTrack]) -> Result<(), TransportError>;

    async fn unpublish(&self, tracks: &[LocalTrack]) -> Result<(), TransportError>;

    async fn leave(&self) -> Result<(), TransportError>;
}
