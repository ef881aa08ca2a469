use crate::{
    participant::{
        ParticipantId,
        RemoteParticipant,
    },
    registry::ParticipantRegistry,
};
use derive_more::Display;
use serde::{
    Deserialize,
    Serialize,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayoutInputs {
    pub local_screen_sharing: bool,
    pub whiteboard_open: bool,
    pub remote_screen_share: Option<ParticipantId>,
    pub remote_count: usize,
}

/// What fills the main area of the call screen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(tag = "layout", rename_all = "snake_case")]
pub enum Layout {
    #[display("remote screen share ({sharer})")]
    RemoteScreenShare { sharer: ParticipantId },
    #[display("whiteboard")]
    Whiteboard,
    #[display("local screen share")]
    LocalScreenShare,
    #[display("grid ({columns} columns)")]
    Grid { columns: u8 },
    #[default]
    #[display("waiting")]
    Waiting,
}

/// Where the local camera preview is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum LocalPreview {
    /// Small floating tile on top of the main area.
    Overlay,
    /// First entry of the fixed-width sidebar list.
    Sidebar,
}

impl Layout {
    pub fn local_preview(&self) -> LocalPreview {
        match self {
            Layout::RemoteScreenShare { .. } | Layout::Whiteboard | Layout::LocalScreenShare => LocalPreview::Sidebar,
            Layout::Grid { .. } | Layout::Waiting => LocalPreview::Overlay,
        }
    }
}

/// First matching rule wins:
/// remote share > whiteboard > local share > grid > waiting.
pub fn select_layout(inputs: &LayoutInputs) -> Layout {
    match inputs {
        LayoutInputs {
            remote_screen_share: Some(sharer),
            local_screen_sharing: false,
            whiteboard_open: false,
            ..
        } => Layout::RemoteScreenShare { sharer: sharer.clone() },
        LayoutInputs {
            whiteboard_open: true, ..
        } => Layout::Whiteboard,
        LayoutInputs {
            local_screen_sharing: true,
            ..
        } => Layout::LocalScreenShare,
        LayoutInputs { remote_count, .. } if *remote_count > 0 => Layout::Grid {
            columns: grid_columns(*remote_count),
        },
        _ => Layout::Waiting,
    }
}

/// Column count of the remote grid. A fixed table, not a square root.
pub fn grid_columns(remote_count: usize) -> u8 {
    match remote_count {
        0 | 1 => 1,
        2..=4 => 2,
        _ => 3,
    }
}

/// Remote participants listed in the sidebar next to the local preview.
///
/// The participant whose screen fills the main area is not repeated there.
/// Grid and waiting layouts have no sidebar.
pub fn sidebar<'a>(layout: &Layout, registry: &'a ParticipantRegistry) -> Vec<&'a RemoteParticipant> {
    match layout {
        Layout::RemoteScreenShare { sharer } => registry.iter().filter(|participant| &participant.id != sharer).collect(),
        Layout::Whiteboard | Layout::LocalScreenShare => registry.iter().collect(),
        Layout::Grid { .. } | Layout::Waiting => Vec::new(),
    }
}
