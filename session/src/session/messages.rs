use crate::media::MediaKind;
use chrono::{
    DateTime,
    Utc,
};
use derive_more::Display;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum SessionMessage {
    Join,
    Leave,
    Close,
    #[display("SetMedia({_0}, {_1})")]
    SetMedia(MediaKind, bool),
    #[display("ToggleMedia({_0})")]
    ToggleMedia(MediaKind),
    #[display("SetWhiteboardOpen({_0})")]
    SetWhiteboardOpen(bool),
    ToggleWhiteboard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warn,
    Error,
}

/// Something the user should be told about, e.g. a camera that could not be
/// opened or a join that failed.
#[derive(Debug, Clone, Serialize)]
pub struct SessionNotice {
    pub created: DateTime<Utc>,
    pub level: NoticeLevel,
    pub channel: String,
    pub message: String,
}

impl SessionNotice {
    pub fn new(level: NoticeLevel, channel: impl ToString, message: impl ToString) -> Self {
        Self {
            created: Utc::now(),
            level,
            channel: channel.to_string(),
            message: message.to_string(),
        }
    }

    /// Emits the notice as a tracing event.
    pub fn write(&self) {
        let Self { channel, message, .. } = self;
        match self.level {
            NoticeLevel::Info => info!(%channel, "{message}"),
            NoticeLevel::Warn => warn!(%channel, "{message}"),
            NoticeLevel::Error => error!(%channel, "{message}"),
        }
    }
}

impl std::fmt::Display for SessionNotice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}: {}",
            self.created.format("%H:%M:%S%.3f"),
            self.level,
            self.channel,
            self.message
        )
    }
}
