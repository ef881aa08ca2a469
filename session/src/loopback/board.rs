use crate::whiteboard::{
    ChangeListener,
    ListenerGuard,
    SnapshotError,
    WhiteboardDocument,
    WhiteboardSnapshot,
};
use serde_json::{
    json,
    Value,
};
use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        Mutex,
    },
};

const SCHEMA: u64 = 1;

#[derive(Default)]
struct BoardInner {
    records: BTreeMap<String, Value>,
    listeners: BTreeMap<u64, Arc<dyn Fn() + Send + Sync>>,
    next_listener: u64,
}

/// Whiteboard document held in memory as a map of JSON records.
///
/// Snapshots look like `{"schema": 1, "records": {...}}`.
#[derive(Clone, Default)]
pub struct MemoryBoard {
    inner: Arc<Mutex<BoardInner>>,
}

impl std::fmt::Debug for MemoryBoard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().unwrap();
        f.debug_struct("MemoryBoard")
            .field("records", &inner.records)
            .field("listeners", &inner.listeners.len())
            .finish()
    }
}

impl MemoryBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a record, like a stroke or a shape.
    pub fn put(&self, key: impl ToString, value: Value) {
        let listeners = {
            let mut inner = self.inner.lock().unwrap();
            inner.records.insert(key.to_string(), value);
            inner.listeners.values().cloned().collect::<Vec<_>>()
        };
        notify(listeners);
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        let (removed, listeners) = {
            let mut inner = self.inner.lock().unwrap();
            let removed = inner.records.remove(key);
            (removed, inner.listeners.values().cloned().collect::<Vec<_>>())
        };
        if removed.is_some() {
            notify(listeners);
        }
        removed
    }

    pub fn record(&self, key: &str) -> Option<Value> {
        self.inner.lock().unwrap().records.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().records.is_empty()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.lock().unwrap().listeners.len()
    }
}

fn notify(listeners: Vec<Arc<dyn Fn() + Send + Sync>>) {
    for listener in listeners {
        listener();
    }
}

fn parse(snapshot: &WhiteboardSnapshot) -> Result<BTreeMap<String, Value>, SnapshotError> {
    let document = snapshot
        .as_object()
        .ok_or_else(|| SnapshotError::Malformed("expected a JSON object".to_string()))?;
    let schema = document
        .get("schema")
        .and_then(Value::as_u64)
        .ok_or_else(|| SnapshotError::Malformed("missing schema version".to_string()))?;
    if schema != SCHEMA {
        return Err(SnapshotError::Incompatible {
            found: schema,
            expected: SCHEMA,
        });
    }
    let records = document
        .get("records")
        .and_then(Value::as_object)
        .ok_or_else(|| SnapshotError::Malformed("missing records".to_string()))?;
    Ok(records.iter().map(|(key, value)| (key.clone(), value.clone())).collect())
}

impl WhiteboardDocument for MemoryBoard {
    fn snapshot(&self) -> Result<WhiteboardSnapshot, SnapshotError> {
        let inner = self.inner.lock().unwrap();
        Ok(WhiteboardSnapshot::new(json!({
            "schema": SCHEMA,
            "records": inner.records,
        })))
    }

    /// Validates the whole snapshot before touching the document.
    fn load_snapshot(&self, snapshot: &WhiteboardSnapshot) -> Result<(), SnapshotError> {
        let records = parse(snapshot)?;
        let listeners = {
            let mut inner = self.inner.lock().unwrap();
            inner.records = records;
            inner.listeners.values().cloned().collect::<Vec<_>>()
        };
        notify(listeners);
        Ok(())
    }

    fn listen(&self, listener: ChangeListener) -> ListenerGuard {
        let id = {
            let mut inner = self.inner.lock().unwrap();
            inner.next_listener += 1;
            let id = inner.next_listener;
            inner.listeners.insert(id, Arc::from(listener));
            id
        };

        let board = Arc::downgrade(&self.inner);
        ListenerGuard::new(move || {
            if let Some(board) = board.upgrade() {
                board.lock().unwrap().listeners.remove(&id);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{
        AtomicUsize,
        Ordering,
    };

    #[test]
    fn export_then_load_is_identity() {
        let board = MemoryBoard::new();
        board.put("shape:1", json!({ "kind": "rect", "x": 10 }));
        board.put("stroke:1", json!({ "points": [[0, 0], [4, 2]] }));

        let exported = board.snapshot().unwrap();
        board.load_snapshot(&exported).unwrap();
        assert_eq!(board.snapshot().unwrap(), exported);

        let other = MemoryBoard::new();
        other.load_snapshot(&exported).unwrap();
        assert_eq!(other.snapshot().unwrap(), exported);
    }

    #[test]
    fn load_replaces_the_whole_document() {
        let board = MemoryBoard::new();
        board.put("shape:1", json!("rect"));
        board
            .load_snapshot(&WhiteboardSnapshot::new(json!({
                "schema": 1,
                "records": { "shape:2": "line" },
            })))
            .unwrap();
        assert_eq!(board.record("shape:1"), None);
        assert_eq!(board.record("shape:2"), Some(json!("line")));
    }

    #[test]
    fn rejected_snapshot_keeps_the_document() {
        let board = MemoryBoard::new();
        board.put("shape:1", json!("rect"));

        let incompatible = board.load_snapshot(&WhiteboardSnapshot::new(json!({ "schema": 2, "records": {} })));
        assert!(matches!(
            incompatible,
            Err(SnapshotError::Incompatible { found: 2, expected: 1 })
        ));
        let malformed = board.load_snapshot(&WhiteboardSnapshot::new(json!({ "schema": 1 })));
        assert!(matches!(malformed, Err(SnapshotError::Malformed(_))));
        assert_eq!(board.len(), 1);
    }

    #[test]
    fn listeners_fire_on_every_change_until_dropped() {
        let board = MemoryBoard::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let guard = board.listen(Box::new({
            let calls = calls.clone();
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
            }
        }));

        board.put("a", json!(1));
        board.remove("a");
        board.remove("missing");
        board.load_snapshot(&board.snapshot().unwrap()).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        drop(guard);
        board.put("b", json!(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(board.listener_count(), 0);
    }
}
