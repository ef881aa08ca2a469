use super::{
    LocalMediaState,
    LocalTrack,
    MediaDevices,
    MediaError,
    MediaKind,
};
use std::sync::Arc;
use tokio::sync::mpsc::{
    error::SendError,
    unbounded_channel,
    UnboundedReceiver,
    UnboundedSender,
};

/// Result of a finished acquisition, delivered back to the controller.
#[derive(Debug)]
pub struct Acquisition {
    pub(crate) kind: MediaKind,
    pub(crate) result: Result<LocalTrack, MediaError>,
}

/// What a toggle request changed.
#[derive(Debug, PartialEq, Eq)]
pub enum MediaUpdate {
    /// The requested state already held.
    Unchanged,
    /// An acquisition is in flight; its result arrives through
    /// [`MediaController::next_acquisition`].
    Pending,
    /// Switched off while the acquisition was still in flight. The track is
    /// released as soon as it arrives.
    Cancelled,
    /// Switched off. The caller unpublishes the track and then hands it back
    /// to [`MediaController::release`].
    Stopped(LocalTrack),
}

#[derive(Debug, Default)]
struct TrackSlot {
    desired: bool,
    pending: bool,
    live: Option<LocalTrack>,
}

/// Tracks microphone, camera and screen capture for one session.
///
/// At most one acquisition per source is in flight. Turning a source back on
/// while its acquisition is still running reuses that acquisition instead of
/// starting another one.
pub struct MediaController {
    devices: Arc<dyn MediaDevices>,
    microphone: TrackSlot,
    camera: TrackSlot,
    screen: TrackSlot,
    completions_tx: UnboundedSender<Acquisition>,
    completions_rx: UnboundedReceiver<Acquisition>,
}

impl MediaController {
    pub fn new(devices: Arc<dyn MediaDevices>) -> Self {
        let (completions_tx, completions_rx) = unbounded_channel();
        Self {
            devices,
            microphone: TrackSlot::default(),
            camera: TrackSlot::default(),
            screen: TrackSlot::default(),
            completions_tx,
            completions_rx,
        }
    }

    pub fn state(&self) -> LocalMediaState {
        LocalMediaState {
            mic_on: self.microphone.desired,
            camera_on: self.camera.desired,
            screen_sharing: self.screen.desired,
        }
    }

    pub fn live_tracks(&self) -> Vec<LocalTrack> {
        [&self.microphone, &self.camera, &self.screen]
            .into_iter()
            .filter_map(|slot| slot.live.clone())
            .collect()
    }

    pub fn is_pending(&self, kind: MediaKind) -> bool {
        self.slot(kind).pending
    }

    pub fn is_live(&self, kind: MediaKind) -> bool {
        self.slot(kind).live.is_some()
    }

    pub fn request(&mut self, kind: MediaKind, on: bool) -> MediaUpdate {
        let slot = self.slot_mut(kind);
        if slot.desired == on {
            return MediaUpdate::Unchanged;
        }
        slot.desired = on;

        if !on {
            return match slot.live.take() {
                Some(track) => MediaUpdate::Stopped(track),
                None => MediaUpdate::Cancelled,
            };
        }

        if slot.pending {
            return MediaUpdate::Pending;
        }
        slot.pending = true;
        self.spawn_acquisition(kind);
        MediaUpdate::Pending
    }

    fn spawn_acquisition(&self, kind: MediaKind) {
        let devices = self.devices.clone();
        let completions = self.completions_tx.clone();
        tokio::task::spawn(async move {
            let result = devices.acquire(kind).await;
            if let Err(SendError(acquisition)) = completions.send(Acquisition { kind, result }) {
                // The controller is gone, nobody will ever publish this track.
                if let Ok(track) = acquisition.result {
                    debug!(track = %track.id, "Releasing {kind} acquired after shutdown");
                    devices.release(track).await;
                }
            }
        });
    }

    pub async fn next_acquisition(&mut self) -> Option<Acquisition> {
        self.completions_rx.recv().await
    }

    /// Applies a finished acquisition.
    ///
    /// Returns the track when it became live. A track that arrives after its
    /// source was switched off is released right away. A failed acquisition
    /// reverts the toggle and is returned as an error.
    pub async fn complete(&mut self, acquisition: Acquisition) -> Result<Option<LocalTrack>, MediaError> {
        let Acquisition { kind, result } = acquisition;
        let slot = self.slot_mut(kind);
        slot.pending = false;

        match result {
            Ok(track) if slot.desired => {
                slot.live = Some(track.clone());
                Ok(Some(track))
            }
            Ok(track) => {
                debug!(track = %track.id, "{kind} was switched off while acquiring, releasing");
                self.devices.release(track).await;
                Ok(None)
            }
            Err(err) if slot.desired => {
                slot.desired = false;
                Err(err)
            }
            Err(err) => {
                debug!("Ignoring failed {kind} acquisition, already switched off: {err}");
                Ok(None)
            }
        }
    }

    pub async fn release(&self, track: LocalTrack) {
        self.devices.release(track).await;
    }

    /// Switches every source off and stops accepting acquisitions.
    ///
    /// Tracks still in flight are released by their acquiring task. The live
    /// tracks are returned so the caller can unpublish them before releasing.
    pub async fn shutdown(&mut self) -> Vec<LocalTrack> {
        self.completions_rx.close();
        while let Ok(acquisition) = self.completions_rx.try_recv() {
            if let Ok(track) = acquisition.result {
                self.devices.release(track).await;
            }
        }

        let mut live = Vec::new();
        for slot in [&mut self.microphone, &mut self.camera, &mut self.screen] {
            slot.desired = false;
            slot.pending = false;
            live.extend(slot.live.take());
        }
        live
    }

    fn slot(&self, kind: MediaKind) -> &TrackSlot {
        match kind {
            MediaKind::Microphone => &self.microphone,
            MediaKind::Camera => &self.camera,
            MediaKind::Screen => &self.screen,
        }
    }

    fn slot_mut(&mut self, kind: MediaKind) -> &mut TrackSlot {
        match kind {
            MediaKind::Microphone => &mut self.microphone,
            MediaKind::Camera => &mut self.camera,
            MediaKind::Screen => &mut self.screen,
        }
    }
}

impl Drop for MediaController {
    fn drop(&mut self) {
        self.completions_rx.close();
        let mut leftover = Vec::new();
        while let Ok(acquisition) = self.completions_rx.try_recv() {
            leftover.extend(acquisition.result.ok());
        }
        for slot in [&mut self.microphone, &mut self.camera, &mut self.screen] {
            leftover.extend(slot.live.take());
        }
        if leftover.is_empty() {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(count = leftover.len(), "No runtime left to release local tracks");
            return;
        };
        let devices = self.devices.clone();
        runtime.spawn(async move {
            for track in leftover {
                devices.release(track).await;
            }
        });
    }
}
