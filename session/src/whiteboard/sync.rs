use super::{
    ListenerGuard,
    SnapshotError,
    SnapshotSink,
    WhiteboardDocument,
    WhiteboardSnapshot,
};
use classroom_config::WhiteboardConfig;
use serde::Serialize;
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::{
        mpsc::{
            unbounded_channel,
            UnboundedReceiver,
            UnboundedSender,
        },
        watch,
    },
    time::{
        sleep_until,
        Instant,
    },
};
use tokio_util::sync::{
    CancellationToken,
    DropGuard,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncTiming {
    /// Quiet period after the last local change before a snapshot is exported.
    pub debounce: Duration,
    /// How long local changes stay suppressed after an inbound snapshot was
    /// loaded.
    pub grace: Duration,
}

impl Default for SyncTiming {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(150),
            grace: Duration::from_millis(100),
        }
    }
}

impl From<&WhiteboardConfig> for SyncTiming {
    fn from(config: &WhiteboardConfig) -> Self {
        Self {
            debounce: Duration::from_millis(config.debounce_ms),
            grace: Duration::from_millis(config.grace_ms),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub exported: u64,
    pub applied: u64,
    /// Local change notifications dropped while suppressed.
    pub discarded: u64,
    /// Inbound snapshots the document refused to load.
    pub rejected: u64,
    pub suppressed: bool,
}

#[derive(Debug)]
enum SyncMessage {
    LocalChange,
    Remote(WhiteboardSnapshot),
}

enum SyncEvent {
    Message(SyncMessage),
    DebounceElapsed,
    GraceElapsed,
}

/// Bridges one whiteboard document to an outbound snapshot sink.
///
/// Local edits are coalesced and exported once the document has been quiet
/// for [`SyncTiming::debounce`]. Inbound snapshots replace the document and
/// mute its change notifications until [`SyncTiming::grace`] has passed, so an
/// applied snapshot is never echoed back. Dropping the bridge unsubscribes
/// from the document and cancels both timers.
#[derive(Debug)]
pub struct WhiteboardSync {
    stats: watch::Receiver<SyncStats>,
    sender: UnboundedSender<SyncMessage>,
    _sync_task_guard: DropGuard,
}

impl WhiteboardSync {
    pub fn attach(
        document: Arc<dyn WhiteboardDocument>,
        outbound: impl SnapshotSink + 'static,
        timing: SyncTiming,
    ) -> Self {
        let (sender, receiver) = unbounded_channel::<SyncMessage>();
        let (stats_sender, stats_receiver) = watch::channel(SyncStats::default());

        let listener = document.listen(Box::new({
            let sender = sender.clone();
            move || {
                let _ = sender.send(SyncMessage::LocalChange);
            }
        }));

        let task_cancellation_token = CancellationToken::new();
        let task_cancellation_guard = task_cancellation_token.clone().drop_guard();

        let inner = SyncInner {
            document,
            outbound: Box::new(outbound),
            timing,
            stats: stats_sender,
            suppressed: false,
            debounce: None,
            grace: None,
            _listener: listener,
        };

        tokio::task::spawn(async move {
            tokio::select! {
                biased;
                _ = task_cancellation_token.cancelled() => {},
                _ = inner.run(receiver) => {},
            };
            debug!("Whiteboard sync detached");
        });

        Self {
            stats: stats_receiver,
            sender,
            _sync_task_guard: task_cancellation_guard,
        }
    }

    /// Queues a snapshot received from another participant.
    pub fn apply_remote(&self, snapshot: WhiteboardSnapshot) -> Result<(), SnapshotError> {
        self.sender
            .send(SyncMessage::Remote(snapshot))
            .map_err(|_| SnapshotError::ChannelClosed)
    }

    pub fn stats(&self) -> SyncStats {
        *self.stats.borrow()
    }
}

struct SyncInner {
    document: Arc<dyn WhiteboardDocument>,
    outbound: Box<dyn SnapshotSink>,
    timing: SyncTiming,
    stats: watch::Sender<SyncStats>,
    suppressed: bool,
    debounce: Option<Instant>,
    grace: Option<Instant>,
    _listener: ListenerGuard,
}

impl SyncInner {
    #[instrument(level = "debug", skip_all)]
    async fn run(mut self, mut receiver: UnboundedReceiver<SyncMessage>) {
        loop {
            let event = tokio::select! {
                biased;

                message = receiver.recv() => match message {
                    Some(message) => SyncEvent::Message(message),
                    None => break,
                },
                _ = until(self.debounce) => SyncEvent::DebounceElapsed,
                _ = until(self.grace) => SyncEvent::GraceElapsed,
            };

            match event {
                SyncEvent::Message(SyncMessage::LocalChange) => self.on_local_change(),
                SyncEvent::Message(SyncMessage::Remote(snapshot)) => self.on_remote(snapshot),
                SyncEvent::DebounceElapsed => {
                    self.debounce = None;
                    self.export().await;
                }
                SyncEvent::GraceElapsed => {
                    self.grace = None;
                    self.set_suppressed(false);
                }
            }
        }
    }

    fn on_local_change(&mut self) {
        if self.suppressed {
            trace!("Ignoring whiteboard change caused by an inbound snapshot");
            self.stats.send_modify(|stats| stats.discarded += 1);
            return;
        }
        // Restarts a pending timer, there is never more than one.
        self.debounce = Some(Instant::now() + self.timing.debounce);
    }

    fn on_remote(&mut self, snapshot: WhiteboardSnapshot) {
        // Last write wins: no local export may follow an applied snapshot.
        self.debounce = None;
        self.set_suppressed(true);

        match self.document.load_snapshot(&snapshot) {
            Ok(()) => {
                self.grace = Some(Instant::now() + self.timing.grace);
                self.stats.send_modify(|stats| stats.applied += 1);
            }
            Err(err) => {
                warn!("Discarding inbound whiteboard snapshot: {err}");
                // An earlier load may still have its own change notifications
                // queued; those stay muted until its grace window ends.
                if self.grace.is_none() {
                    self.set_suppressed(false);
                }
                self.stats.send_modify(|stats| stats.rejected += 1);
            }
        }
    }

    async fn export(&mut self) {
        let snapshot = match self.document.snapshot() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!("Failed to export whiteboard snapshot: {err}");
                return;
            }
        };
        if let Err(err) = self.outbound.send_snapshot(snapshot).await {
            warn!("Failed to send whiteboard snapshot: {err}");
            return;
        }
        self.stats.send_modify(|stats| stats.exported += 1);
    }

    fn set_suppressed(&mut self, suppressed: bool) {
        self.suppressed = suppressed;
        self.stats.send_if_modified(|stats| {
            let changed = stats.suppressed != suppressed;
            stats.suppressed = suppressed;
            changed
        });
    }
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
