use super::{
    messages::{
        NoticeLevel,
        SessionMessage,
        SessionNotice,
    },
    Collaborators,
    SessionState,
};
use crate::{
    layout::{
        select_layout,
        Layout,
        LayoutInputs,
    },
    media::{
        Acquisition,
        LocalMediaState,
        LocalTrack,
        MediaController,
        MediaKind,
        MediaUpdate,
    },
    navigation::Route,
    participant::{
        ParticipantId,
        RemoteParticipant,
    },
    registry::ParticipantRegistry,
    screen_share,
    transport::{
        JoinRequest,
        TransportSession,
    },
    whiteboard::{
        SnapshotInbox,
        SyncTiming,
        WhiteboardSnapshot,
        WhiteboardSync,
    },
};
use classroom_config::JoinConfig;
use std::slice;
use tokio::sync::{
    mpsc::{
        UnboundedReceiver,
        UnboundedSender,
    },
    watch,
};
use tokio_util::sync::CancellationToken;

/// Live connection to a channel.
struct Connection {
    local_id: ParticipantId,
    participants: watch::Receiver<Vec<RemoteParticipant>>,
    inbox: Option<SnapshotInbox>,
}

enum SessionEvent {
    Message(SessionMessage),
    Acquired(Acquisition),
    Participants(Vec<RemoteParticipant>),
    ConnectionLost,
    Snapshot(WhiteboardSnapshot),
    InboxClosed,
    HandlesDropped,
}

pub(super) struct SessionInner {
    join: JoinConfig,
    timing: SyncTiming,
    collaborators: Collaborators,
    media: MediaController,
    registry: ParticipantRegistry,
    whiteboard_open: bool,
    whiteboard: Option<WhiteboardSync>,
    /// Latest inbound snapshot received while the whiteboard was closed.
    pending_snapshot: Option<WhiteboardSnapshot>,
    connection: Option<Connection>,
    state: watch::Sender<SessionState>,
    notices: UnboundedSender<SessionNotice>,
}

impl SessionInner {
    #[instrument(level = "debug", skip_all, fields(channel = %join.channel))]
    pub(super) async fn run(
        join: JoinConfig,
        timing: SyncTiming,
        collaborators: Collaborators,
        receiver: UnboundedReceiver<SessionMessage>,
        notices: UnboundedSender<SessionNotice>,
        state: watch::Sender<SessionState>,
        cancellation: CancellationToken,
    ) {
        let media = MediaController::new(collaborators.devices.clone());
        let mut session = Self {
            join,
            timing,
            collaborators,
            media,
            registry: ParticipantRegistry::new(),
            whiteboard_open: false,
            whiteboard: None,
            pending_snapshot: None,
            connection: None,
            state,
            notices,
        };

        session.start();
        session.handle_events(receiver, cancellation).await;

        session.state.send_modify(|state| {
            state.running = false;
        });
    }

    /// Opens the initial tracks so the preview is live before joining.
    fn start(&mut self) {
        if self.join.mic_on {
            self.media.request(MediaKind::Microphone, true);
        }
        if self.join.camera_on {
            self.media.request(MediaKind::Camera, true);
        }
        self.refresh();
    }

    async fn handle_events(&mut self, mut receiver: UnboundedReceiver<SessionMessage>, cancellation: CancellationToken) {
        loop {
            let event = tokio::select! {
                biased;

                _ = cancellation.cancelled() => SessionEvent::HandlesDropped,

                message = receiver.recv() => match message {
                    Some(message) => SessionEvent::Message(message),
                    None => SessionEvent::HandlesDropped,
                },
                Some(acquisition) = self.media.next_acquisition() => SessionEvent::Acquired(acquisition),
                event = next_connection_event(&mut self.connection) => event,
            };

            match event {
                SessionEvent::Message(message) => {
                    debug!("Handling {message}");
                    match message {
                        SessionMessage::Join => self.join_channel().await,
                        SessionMessage::Leave => {
                            self.shutdown().await;
                            self.collaborators.navigator.route_to(Route::Lobby);
                            return;
                        }
                        SessionMessage::Close => {
                            self.shutdown().await;
                            return;
                        }
                        SessionMessage::SetMedia(kind, on) => self.set_media(kind, on).await,
                        SessionMessage::ToggleMedia(kind) => {
                            let on = !self.media.state().is_on(kind);
                            self.set_media(kind, on).await
                        }
                        SessionMessage::SetWhiteboardOpen(open) => self.set_whiteboard_open(open),
                        SessionMessage::ToggleWhiteboard => self.set_whiteboard_open(!self.whiteboard_open),
                    }
                }
                SessionEvent::Acquired(acquisition) => self.on_acquired(acquisition).await,
                SessionEvent::Participants(participants) => {
                    self.registry.replace(participants);
                    self.refresh();
                }
                SessionEvent::ConnectionLost => self.on_connection_lost(),
                SessionEvent::Snapshot(snapshot) => self.on_snapshot(snapshot),
                SessionEvent::InboxClosed => {
                    warn!("Whiteboard relay closed, remote drawings will no longer arrive");
                    if let Some(connection) = self.connection.as_mut() {
                        connection.inbox = None;
                    }
                }
                SessionEvent::HandlesDropped => {
                    debug!("Last session handle dropped");
                    self.shutdown().await;
                    return;
                }
            }
        }
    }

    async fn join_channel(&mut self) {
        if self.connection.is_some() {
            warn!("Already joined {}", self.join.channel);
            return;
        }

        info!("Joining channel");
        let TransportSession {
            local_id,
            mut participants,
        } = match self.collaborators.transport.join(JoinRequest::from(&self.join)).await {
            Ok(session) => session,
            Err(err) => {
                self.notify(NoticeLevel::Error, format!("Could not join, try again: {err}"));
                return;
            }
        };

        let inbox = match self.collaborators.board_channel.subscribe() {
            Ok(inbox) => Some(inbox),
            Err(err) => {
                self.notify(NoticeLevel::Warn, format!("Whiteboard sync unavailable: {err}"));
                None
            }
        };

        self.registry.replace(participants.borrow_and_update().clone());
        self.connection = Some(Connection {
            local_id: local_id.clone(),
            participants,
            inbox,
        });

        let tracks = self.media.live_tracks();
        self.publish(&tracks).await;

        info!(%local_id, remotes = self.registry.len(), "Joined channel");
        self.state.send_modify(|state| {
            state.joined = true;
            state.local_id = Some(local_id);
        });
        self.refresh();
    }

    async fn set_media(&mut self, kind: MediaKind, on: bool) {
        match self.media.request(kind, on) {
            MediaUpdate::Unchanged => return,
            MediaUpdate::Pending => debug!("Acquiring {kind}"),
            MediaUpdate::Cancelled => debug!("Switched {kind} off while acquiring"),
            MediaUpdate::Stopped(track) => {
                self.unpublish(slice::from_ref(&track)).await;
                self.media.release(track).await;
            }
        }
        self.refresh();
    }

    async fn on_acquired(&mut self, acquisition: Acquisition) {
        match self.media.complete(acquisition).await {
            Ok(Some(track)) => {
                debug!(track = %track.id, "{} is live", track.kind);
                self.publish(slice::from_ref(&track)).await;
            }
            Ok(None) => {}
            Err(err) => self.notify(NoticeLevel::Warn, err),
        }
        self.refresh();
    }

    async fn publish(&self, tracks: &[LocalTrack]) {
        if tracks.is_empty() || self.connection.is_none() {
            return;
        }
        if let Err(err) = self.collaborators.transport.publish(tracks).await {
            self.notify(NoticeLevel::Error, format!("Failed to publish: {err}"));
        }
    }

    async fn unpublish(&self, tracks: &[LocalTrack]) {
        if tracks.is_empty() || self.connection.is_none() {
            return;
        }
        if let Err(err) = self.collaborators.transport.unpublish(tracks).await {
            warn!("Failed to unpublish: {err}");
        }
    }

    fn on_connection_lost(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };
        self.registry.clear();
        self.state.send_modify(|state| {
            state.joined = false;
            state.local_id = None;
        });
        self.notify(
            NoticeLevel::Error,
            format!("Connection lost as {}, join again to reconnect", connection.local_id),
        );
        self.refresh();
    }

    fn set_whiteboard_open(&mut self, open: bool) {
        if self.whiteboard_open == open {
            return;
        }
        self.whiteboard_open = open;

        if open {
            let sync = WhiteboardSync::attach(
                self.collaborators.board.clone(),
                self.collaborators.board_channel.clone(),
                self.timing,
            );
            if let Some(snapshot) = self.pending_snapshot.take() {
                if let Err(err) = sync.apply_remote(snapshot) {
                    warn!("Failed to apply stored whiteboard snapshot: {err}");
                }
            }
            self.whiteboard = Some(sync);
            debug!("Whiteboard opened");
        } else {
            self.whiteboard = None;
            debug!("Whiteboard closed");
        }
        self.refresh();
    }

    fn on_snapshot(&mut self, snapshot: WhiteboardSnapshot) {
        match &self.whiteboard {
            Some(sync) => {
                if let Err(err) = sync.apply_remote(snapshot) {
                    warn!("Failed to hand whiteboard snapshot to the bridge: {err}");
                }
            }
            None => {
                trace!("Whiteboard closed, keeping snapshot for later");
                self.pending_snapshot = Some(snapshot);
            }
        }
    }

    /// Unpublishes and releases every local track and leaves the channel.
    async fn shutdown(&mut self) {
        self.whiteboard = None;
        self.whiteboard_open = false;

        let tracks = self.media.shutdown().await;
        self.unpublish(&tracks).await;
        for track in tracks {
            self.media.release(track).await;
        }

        if let Some(connection) = self.connection.take() {
            if let Err(err) = self.collaborators.transport.leave().await {
                warn!("Failed to leave channel: {err}");
            }
            info!(local_id = %connection.local_id, "Left channel");
        }

        self.registry.clear();
        self.state.send_modify(|state| {
            state.joined = false;
            state.local_id = None;
            state.media = LocalMediaState::default();
            state.whiteboard_open = false;
            state.participants.clear();
            state.remote_screen_share = None;
            state.layout = Layout::Waiting;
        });
    }

    /// Recomputes classification and layout from the current registry and
    /// toggles and publishes them in one state update.
    fn refresh(&mut self) {
        let media = self.media.state();
        let share = screen_share::classify(&self.registry);
        if let Some(share) = &share {
            trace!(sharer = %share.participant.id, rule = %share.rule, "Remote screen share detected");
        }
        let remote_screen_share = share.map(|share| share.participant.id.clone());
        let layout = select_layout(&LayoutInputs {
            // The capture view needs a track to show, not just the toggle.
            local_screen_sharing: media.screen_sharing && self.media.is_live(MediaKind::Screen),
            whiteboard_open: self.whiteboard_open,
            remote_screen_share: remote_screen_share.clone(),
            remote_count: self.registry.len(),
        });

        let participants = self.registry.to_vec();
        let whiteboard_open = self.whiteboard_open;
        self.state.send_if_modified(|state| {
            let mut next = state.clone();
            next.media = media;
            next.whiteboard_open = whiteboard_open;
            next.participants = participants;
            next.remote_screen_share = remote_screen_share;
            next.layout = layout;
            if next == *state {
                return false;
            }
            if next.layout != state.layout {
                info!(from = %state.layout, to = %next.layout, "Layout changed");
            }
            *state = next;
            true
        });
    }

    fn notify(&self, level: NoticeLevel, message: impl ToString) {
        let notice = SessionNotice::new(level, &self.join.channel, message);
        notice.write();
        if self.notices.send(notice).is_err() {
            trace!("Nobody is listening for session notices");
        }
    }
}

async fn next_connection_event(connection: &mut Option<Connection>) -> SessionEvent {
    let Some(connection) = connection.as_mut() else {
        return std::future::pending().await;
    };

    tokio::select! {
        changed = connection.participants.changed() => match changed {
            Ok(()) => SessionEvent::Participants(connection.participants.borrow_and_update().clone()),
            Err(_) => SessionEvent::ConnectionLost,
        },
        Some(received) = next_snapshot(&mut connection.inbox) => received,
    }
}

async fn next_snapshot(inbox: &mut Option<SnapshotInbox>) -> Option<SessionEvent> {
    match inbox {
        Some(inbox) => Some(match inbox.recv().await {
            Some(snapshot) => SessionEvent::Snapshot(snapshot),
            None => SessionEvent::InboxClosed,
        }),
        None => std::future::pending().await,
    }
}
