//! Keeps a collaborative whiteboard in step with the other participants by
//! exchanging whole-document snapshots.

use async_trait::async_trait;
use derive_more::{
    Deref,
    From,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::sync::Arc;
use tokio::sync::mpsc::{
    UnboundedReceiver,
    UnboundedSender,
};

mod sync;

pub use sync::{
    SyncStats,
    SyncTiming,
    WhiteboardSync,
};

/// Opaque serialized whiteboard document.
#[derive(Debug, Clone, PartialEq, Deref, From, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WhiteboardSnapshot(serde_json::Value);

impl WhiteboardSnapshot {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn into_inner(self) -> serde_json::Value {
        self.0
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        Ok(serde_json::to_vec(&self.0)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        Ok(Self(serde_json::from_slice(bytes)?))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("malformed snapshot: {0}")]
    Malformed(String),
    #[error("incompatible snapshot schema {found}, expected {expected}")]
    Incompatible { found: u64, expected: u64 },
    #[error("snapshot channel closed")]
    ChannelClosed,
    #[error("not joined to a channel")]
    NotJoined,
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type ChangeListener = Box<dyn Fn() + Send + Sync>;

/// Unsubscribes a change listener when dropped.
#[must_use = "the listener is removed as soon as the guard is dropped"]
pub struct ListenerGuard(Option<Box<dyn FnOnce() + Send + Sync>>);

impl ListenerGuard {
    pub fn new(unsubscribe: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self(Some(Box::new(unsubscribe)))
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.0.take() {
            unsubscribe();
        }
    }
}

impl std::fmt::Debug for ListenerGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerGuard")
            .field("active", &self.0.is_some())
            .finish()
    }
}

/// The drawing surface's document.
///
/// Listeners fire on every document change, including the ones caused by
/// [`WhiteboardDocument::load_snapshot`].
pub trait WhiteboardDocument: Send + Sync {
    fn snapshot(&self) -> Result<WhiteboardSnapshot, SnapshotError>;

    fn load_snapshot(&self, snapshot: &WhiteboardSnapshot) -> Result<(), SnapshotError>;

    fn listen(&self, listener: ChangeListener) -> ListenerGuard;
}

/// Where exported snapshots go.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    async fn send_snapshot(&self, snapshot: WhiteboardSnapshot) -> Result<(), SnapshotError>;
}

pub type SnapshotInbox = UnboundedReceiver<WhiteboardSnapshot>;

/// Broadcast medium shared by everyone in a channel. A subscriber never
/// receives its own broadcasts.
#[async_trait]
pub trait SnapshotChannel: Send + Sync {
    async fn broadcast(&self, snapshot: WhiteboardSnapshot) -> Result<(), SnapshotError>;

    fn subscribe(&self) -> Result<SnapshotInbox, SnapshotError>;
}

#[async_trait]
impl SnapshotSink for UnboundedSender<WhiteboardSnapshot> {
    async fn send_snapshot(&self, snapshot: WhiteboardSnapshot) -> Result<(), SnapshotError> {
        self.send(snapshot).map_err(|_| SnapshotError::ChannelClosed)
    }
}

#[async_trait]
impl SnapshotSink for Arc<dyn SnapshotChannel> {
    async fn send_snapshot(&self, snapshot: WhiteboardSnapshot) -> Result<(), SnapshotError> {
        self.broadcast(snapshot).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{
        AtomicBool,
        Ordering,
    };

    #[test]
    fn snapshot_bytes_are_plain_json() {
        let snapshot = WhiteboardSnapshot::new(json!({"schema": 1, "records": {}}));
        let bytes = snapshot.to_bytes().unwrap();
        assert_eq!(bytes, br#"{"records":{},"schema":1}"#);
        assert!(matches!(WhiteboardSnapshot::from_bytes(b"{nope"), Err(SnapshotError::Json(_))));
    }

    #[test]
    fn guard_unsubscribes_on_drop() {
        let removed = Arc::new(AtomicBool::new(false));
        let guard = ListenerGuard::new({
            let removed = removed.clone();
            move || removed.store(true, Ordering::SeqCst)
        });
        assert!(!removed.load(Ordering::SeqCst));
        drop(guard);
        assert!(removed.load(Ordering::SeqCst));
    }
}
