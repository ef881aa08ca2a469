use crate::session::Session;
use futures::future::join_all;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
    },
};

/// Named sessions running in one process, e.g. the local user and the
/// simulated peers.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    inner: Arc<Mutex<HashMap<String, Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }

    /// Named sessions in creation order.
    pub fn entries(&self) -> Vec<(String, Session)> {
        let mut sessions = self
            .inner
            .lock()
            .unwrap()
            .iter()
            .map(|(name, session)| (name.clone(), session.clone()))
            .collect::<Vec<_>>();
        sessions.sort_by(|(_, a), (_, b)| a.created.cmp(&b.created));
        sessions
    }

    pub fn add(&self, name: &str, session: Session) {
        self.inner.lock().unwrap().insert(name.to_string(), session);
    }

    pub fn get(&self, name: &str) -> Option<Session> {
        self.inner.lock().unwrap().get(name).cloned()
    }

    /// Closes and removes every session.
    pub async fn close_all(&self) {
        let sessions = self.inner.lock().unwrap().drain().map(|(_, session)| session).collect::<Vec<_>>();
        join_all(sessions.into_iter().map(Session::close)).await;
    }
}
