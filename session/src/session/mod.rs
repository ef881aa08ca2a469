use crate::{
    media::{
        MediaDevices,
        MediaKind,
    },
    navigation::Navigator,
    transport::Transport,
    whiteboard::{
        SnapshotChannel,
        SyncTiming,
        WhiteboardDocument,
    },
};
use chrono::{
    DateTime,
    Utc,
};
use classroom_config::{
    Config,
    JoinConfig,
};
use eyre::{
    Context as _,
    Result,
};
use std::sync::Arc;
use tokio::sync::{
    mpsc::{
        unbounded_channel,
        UnboundedReceiver,
        UnboundedSender,
    },
    watch,
};
use tokio_util::sync::{
    CancellationToken,
    DropGuard,
};

mod inner;
pub mod messages;
mod state;

use inner::SessionInner;
pub use messages::{
    NoticeLevel,
    SessionMessage,
    SessionNotice,
};
pub use state::SessionState;

/// External systems a session talks to. All of them are scoped to one
/// session screen.
#[derive(Clone)]
pub struct Collaborators {
    pub transport: Arc<dyn Transport>,
    pub devices: Arc<dyn MediaDevices>,
    pub board: Arc<dyn WhiteboardDocument>,
    pub board_channel: Arc<dyn SnapshotChannel>,
    pub navigator: Arc<dyn Navigator>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// A call session for one channel.
///
/// The session runs as its own task and is driven through this handle.
/// Dropping the last clone stops it the same way [`Session::close`] does.
#[derive(Debug, Clone)]
pub struct Session {
    pub channel: String,
    pub created: DateTime<Utc>,
    pub state: watch::Receiver<SessionState>,
    _session_task_guard: Arc<DropGuard>,
    sender: UnboundedSender<SessionMessage>,
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self._session_task_guard, &other._session_task_guard)
    }
}

impl Session {
    pub fn with_config(
        config: &Config,
        collaborators: Collaborators,
    ) -> Result<(Self, UnboundedReceiver<SessionNotice>)> {
        let join = JoinConfig::new(config).context("Invalid join parameters")?;
        debug!("Join config: {join:#?}");
        Ok(Self::spawn(join, SyncTiming::from(&config.whiteboard), collaborators))
    }

    pub fn spawn(
        join: JoinConfig,
        timing: SyncTiming,
        collaborators: Collaborators,
    ) -> (Self, UnboundedReceiver<SessionNotice>) {
        let (sender_tx, receiver_tx) = unbounded_channel::<SessionMessage>();
        let (sender_rx, receiver_rx) = unbounded_channel::<SessionNotice>();

        let channel = join.channel.clone();
        let task_cancellation_token = CancellationToken::new();
        let task_cancellation_guard = task_cancellation_token.clone().drop_guard();
        let (state_sender, state_receiver) = watch::channel(SessionState::new(&join));

        tokio::task::spawn({
            let channel = channel.clone();
            async move {
                SessionInner::run(
                    join,
                    timing,
                    collaborators,
                    receiver_tx,
                    sender_rx,
                    state_sender,
                    task_cancellation_token,
                )
                .await;

                debug!(channel, "Session task stopped");
            }
        });

        (
            Self {
                channel,
                created: Utc::now(),
                state: state_receiver,
                _session_task_guard: Arc::new(task_cancellation_guard),
                sender: sender_tx,
            },
            receiver_rx,
        )
    }
}

impl Session {
    /// Leaves the channel without navigating away and waits until the session
    /// has released everything.
    pub async fn close(mut self) {
        if !self.state.borrow().running {
            debug!(self.channel, "Session already closed");
            return;
        }
        if self.sender.send(SessionMessage::Close).is_ok() {
            if let Err(err) = self.state.wait_for(|state| !state.running).await {
                error!("Failed to wait for session to close: {err}");
            };
        } else {
            error!("Was not able to send SessionMessage::Close message")
        }
    }

    pub fn join(&self) {
        let state = self.state.borrow();
        if !state.running {
            debug!(self.channel, "Session already closed");
            return;
        }
        if state.joined {
            debug!(self.channel, "Already joined");
            return;
        }
        if self.sender.send(SessionMessage::Join).is_err() {
            error!("Was not able to send SessionMessage::Join message")
        }
    }

    /// Media and whiteboard toggles are accepted before joining; tracks are
    /// published once the session joins.
    pub fn send_message(&self, message: SessionMessage) {
        if let SessionMessage::Join = &message {
            return self.join();
        }

        if !self.state.borrow().running {
            debug!(self.channel, "Session already closed, dropping {message}");
            return;
        }
        if self.sender.send(message.clone()).is_err() {
            error!("Was not able to send message: {message}")
        }

        debug!("Sent message {message:?}");
    }

    pub fn leave(&self) {
        self.send_message(SessionMessage::Leave);
    }

    pub fn set_mic_on(&self, on: bool) {
        self.send_message(SessionMessage::SetMedia(MediaKind::Microphone, on));
    }

    pub fn set_camera_on(&self, on: bool) {
        self.send_message(SessionMessage::SetMedia(MediaKind::Camera, on));
    }

    pub fn set_screen_sharing(&self, on: bool) {
        self.send_message(SessionMessage::SetMedia(MediaKind::Screen, on));
    }

    pub fn toggle_mic(&self) {
        self.send_message(SessionMessage::ToggleMedia(MediaKind::Microphone));
    }

    pub fn toggle_camera(&self) {
        self.send_message(SessionMessage::ToggleMedia(MediaKind::Camera));
    }

    pub fn toggle_screen_share(&self) {
        self.send_message(SessionMessage::ToggleMedia(MediaKind::Screen));
    }

    pub fn set_whiteboard_open(&self, open: bool) {
        self.send_message(SessionMessage::SetWhiteboardOpen(open));
    }

    pub fn toggle_whiteboard(&self) {
        self.send_message(SessionMessage::ToggleWhiteboard);
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Waits until the published state satisfies `predicate`.
    pub async fn wait_until(&self, predicate: impl FnMut(&SessionState) -> bool) -> Result<SessionState> {
        let mut state = self.state.clone();
        let matched = state
            .wait_for(predicate)
            .await
            .wrap_err_with(|| format!("Session for {} stopped", self.channel))?
            .clone();
        Ok(matched)
    }
}
