use crate::media::{
    LocalTrack,
    MediaDevices,
    MediaError,
    MediaKind,
};
use async_trait::async_trait;
use std::{
    collections::{
        HashMap,
        HashSet,
    },
    sync::Mutex,
};
use tokio::sync::watch;

#[derive(Debug, Default)]
struct DevicesInner {
    next_track: u64,
    acquisitions: usize,
    failures: HashMap<MediaKind, String>,
    live: Vec<LocalTrack>,
}

/// Capture devices that hand out numbered fake tracks.
///
/// Acquisitions of a kind can be held back with [`FakeDevices::hold`] or made
/// to fail with [`FakeDevices::fail`].
#[derive(Debug)]
pub struct FakeDevices {
    inner: Mutex<DevicesInner>,
    held: watch::Sender<HashSet<MediaKind>>,
}

impl Default for FakeDevices {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDevices {
    pub fn new() -> Self {
        let (held, _) = watch::channel(HashSet::new());
        Self {
            inner: Default::default(),
            held,
        }
    }

    /// Fails every following acquisition of `kind`.
    pub fn fail(&self, kind: MediaKind, reason: impl ToString) {
        self.inner.lock().unwrap().failures.insert(kind, reason.to_string());
    }

    pub fn recover(&self, kind: MediaKind) {
        self.inner.lock().unwrap().failures.remove(&kind);
    }

    /// Keeps acquisitions of `kind` pending until [`FakeDevices::resume`].
    pub fn hold(&self, kind: MediaKind) {
        self.held.send_modify(|held| {
            held.insert(kind);
        });
    }

    pub fn resume(&self, kind: MediaKind) {
        self.held.send_modify(|held| {
            held.remove(&kind);
        });
    }

    /// Number of acquisitions started so far.
    pub fn acquisitions(&self) -> usize {
        self.inner.lock().unwrap().acquisitions
    }

    /// Tracks handed out and not yet released.
    pub fn live_tracks(&self) -> Vec<LocalTrack> {
        self.inner.lock().unwrap().live.clone()
    }
}

fn label(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Microphone => "Default - Microphone",
        MediaKind::Camera => "Integrated Camera",
        MediaKind::Screen => "Screen 1",
    }
}

#[async_trait]
impl MediaDevices for FakeDevices {
    async fn acquire(&self, kind: MediaKind) -> Result<LocalTrack, MediaError> {
        self.inner.lock().unwrap().acquisitions += 1;

        let mut held = self.held.subscribe();
        let released = held.wait_for(|held| !held.contains(&kind)).await.map(|_| ());
        if released.is_err() {
            return Err(MediaError::unavailable(kind, "device layer shut down"));
        }

        let mut inner = self.inner.lock().unwrap();
        if let Some(reason) = inner.failures.get(&kind) {
            return Err(MediaError::unavailable(kind, reason));
        }
        inner.next_track += 1;
        let track = LocalTrack {
            id: format!("track-{}", inner.next_track),
            kind,
            label: label(kind).to_string(),
        };
        inner.live.push(track.clone());
        Ok(track)
    }

    async fn release(&self, track: LocalTrack) {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.live.len();
        inner.live.retain(|live| live.id != track.id);
        if inner.live.len() == before {
            warn!(track = %track.id, "Released a track that was not live");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[tokio::test]
    async fn tracks_are_numbered_and_labelled() {
        let devices = FakeDevices::new();
        let mic = devices.acquire_microphone_track().await.unwrap();
        let screen = devices.acquire_screen_track().await.unwrap();
        assert_eq!(mic.id, "track-1");
        assert_eq!(screen.label, "Screen 1");
        assert_eq!(devices.live_tracks().len(), 2);

        devices.release(mic).await;
        assert_eq!(devices.live_tracks(), vec![screen]);
    }

    #[tokio::test]
    async fn held_acquisition_completes_on_resume() {
        let devices = Arc::new(FakeDevices::new());
        devices.hold(MediaKind::Camera);

        let pending = tokio::spawn({
            let devices = devices.clone();
            async move { devices.acquire_camera_track().await }
        });
        tokio::task::yield_now().await;
        assert!(devices.live_tracks().is_empty());
        assert_eq!(devices.acquisitions(), 1);

        devices.resume(MediaKind::Camera);
        let track = pending.await.unwrap().unwrap();
        assert_eq!(track.kind, MediaKind::Camera);
    }

    #[tokio::test]
    async fn failures_can_be_cleared() {
        let devices = FakeDevices::new();
        devices.fail(MediaKind::Camera, "busy");
        assert_eq!(
            devices.acquire_camera_track().await,
            Err(MediaError::unavailable(MediaKind::Camera, "busy"))
        );
        devices.recover(MediaKind::Camera);
        assert!(devices.acquire_camera_track().await.is_ok());
    }
}
