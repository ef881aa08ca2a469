use super::{
    FakeDevices,
    MemoryBoard,
    MemoryNavigator,
};
use crate::{
    media::LocalTrack,
    participant::{
        ParticipantId,
        RemoteParticipant,
    },
    session::Collaborators,
    transport::{
        JoinRequest,
        Transport,
        TransportError,
        TransportSession,
    },
    whiteboard::{
        SnapshotChannel,
        SnapshotError,
        SnapshotInbox,
        WhiteboardSnapshot,
    },
};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
    },
};
use tokio::sync::{
    broadcast::{
        self,
        error::RecvError,
    },
    mpsc::unbounded_channel,
    watch,
};

const RELAY_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
struct Relayed {
    from: ParticipantId,
    bytes: Arc<[u8]>,
}

#[derive(Debug)]
struct Member {
    owner: u64,
    id: ParticipantId,
    tracks: Vec<LocalTrack>,
    view: watch::Sender<Vec<RemoteParticipant>>,
}

impl Member {
    fn remote(&self) -> RemoteParticipant {
        RemoteParticipant::from_published(self.id.clone(), &self.tracks)
    }
}

#[derive(Debug)]
struct Channel {
    members: Vec<Member>,
    relay: broadcast::Sender<Relayed>,
}

impl Channel {
    fn new() -> Self {
        let (relay, _) = broadcast::channel(RELAY_CAPACITY);
        Self {
            members: Vec::new(),
            relay,
        }
    }

    /// Pushes every member its view of the others, in join order.
    fn refresh_views(&self) {
        for member in &self.members {
            let others = self
                .members
                .iter()
                .filter(|other| other.id != member.id)
                .map(Member::remote)
                .collect::<Vec<_>>();
            member.view.send_if_modified(|view| {
                if *view == others {
                    return false;
                }
                *view = others;
                true
            });
        }
    }
}

#[derive(Debug, Default)]
struct RoomInner {
    channels: HashMap<String, Channel>,
    rejected: HashMap<String, String>,
    next_uid: u64,
    next_owner: u64,
}

impl RoomInner {
    fn find(&self, owner: u64) -> Option<(&String, &Channel)> {
        self.channels
            .iter()
            .find(|(_, channel)| channel.members.iter().any(|member| member.owner == owner))
    }

    fn find_mut(&mut self, owner: u64) -> Option<(&mut Channel, usize)> {
        self.channels.values_mut().find_map(|channel| {
            let index = channel.members.iter().position(|member| member.owner == owner)?;
            Some((channel, index))
        })
    }

    fn remove(&mut self, owner: u64) -> Option<ParticipantId> {
        let (name, _) = self.find(owner)?;
        let name = name.clone();
        let channel = self.channels.get_mut(&name)?;
        let index = channel.members.iter().position(|member| member.owner == owner)?;
        let member = channel.members.remove(index);
        if channel.members.is_empty() {
            self.channels.remove(&name);
        } else {
            channel.refresh_views();
        }
        Some(member.id)
    }
}

/// In-process stand-in for the media backend.
///
/// Channels are keyed by name. Whiteboard snapshots travel as JSON bytes and
/// are relayed to every other member of the sender's channel in the order
/// they were broadcast.
#[derive(Debug, Clone, Default)]
pub struct LoopbackRoom {
    inner: Arc<Mutex<RoomInner>>,
}

impl LoopbackRoom {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport for one session. It leaves its channel when dropped.
    pub fn client(&self) -> Arc<LoopbackTransport> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_owner += 1;
        Arc::new(LoopbackTransport {
            room: self.clone(),
            owner: inner.next_owner,
        })
    }

    /// A full set of collaborators backed by this room.
    pub fn peer(&self) -> LoopbackPeer {
        LoopbackPeer {
            transport: self.client(),
            devices: Arc::new(FakeDevices::new()),
            board: Arc::new(MemoryBoard::new()),
            navigator: Arc::new(MemoryNavigator::new()),
        }
    }

    /// Makes the next join to `channel` fail with `reason`.
    pub fn reject_next_join(&self, channel: impl ToString, reason: impl ToString) {
        self.inner
            .lock()
            .unwrap()
            .rejected
            .insert(channel.to_string(), reason.to_string());
    }

    pub fn members(&self, channel: &str) -> Vec<ParticipantId> {
        self.inner
            .lock()
            .unwrap()
            .channels
            .get(channel)
            .map(|channel| channel.members.iter().map(|member| member.id.clone()).collect())
            .unwrap_or_default()
    }

    pub fn member_count(&self, channel: &str) -> usize {
        self.members(channel).len()
    }

    /// Drops a member as if its connection broke. Its session sees the
    /// participant feed close.
    pub fn disconnect(&self, id: &ParticipantId) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let owner = inner
            .channels
            .values()
            .flat_map(|channel| channel.members.iter())
            .find(|member| &member.id == id)
            .map(|member| member.owner);
        match owner {
            Some(owner) => inner.remove(owner).is_some(),
            None => false,
        }
    }
}

#[derive(Debug)]
pub struct LoopbackTransport {
    room: LoopbackRoom,
    owner: u64,
}

impl LoopbackTransport {
    pub fn local_id(&self) -> Option<ParticipantId> {
        let inner = self.room.inner.lock().unwrap();
        let (_, channel) = inner.find(self.owner)?;
        channel
            .members
            .iter()
            .find(|member| member.owner == self.owner)
            .map(|member| member.id.clone())
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn join(&self, request: JoinRequest) -> Result<TransportSession, TransportError> {
        let mut inner = self.room.inner.lock().unwrap();
        if let Some(reason) = inner.rejected.remove(&request.channel) {
            return Err(TransportError::JoinFailed {
                channel: request.channel,
                reason,
            });
        }
        if request.app_id.is_empty() {
            return Err(TransportError::JoinFailed {
                channel: request.channel,
                reason: "invalid app id".to_string(),
            });
        }
        if let Some((channel, _)) = inner.find(self.owner) {
            return Err(TransportError::AlreadyJoined(channel.clone()));
        }

        inner.next_uid += 1;
        let local_id = ParticipantId::new(format!("user-{}", inner.next_uid));
        let (view, participants) = watch::channel(Vec::new());

        let channel = inner.channels.entry(request.channel.clone()).or_insert_with(Channel::new);
        channel.members.push(Member {
            owner: self.owner,
            id: local_id.clone(),
            tracks: Vec::new(),
            view,
        });
        channel.refresh_views();
        debug!(channel = request.channel, %local_id, "Joined loopback channel");

        Ok(TransportSession { local_id, participants })
    }

    async fn publish(&self, tracks: &[LocalTrack]) -> Result<(), TransportError> {
        let mut inner = self.room.inner.lock().unwrap();
        let (channel, index) = inner.find_mut(self.owner).ok_or(TransportError::NotJoined)?;
        let published = &mut channel.members[index].tracks;
        for track in tracks {
            if !published.iter().any(|existing| existing.id == track.id) {
                published.push(track.clone());
            }
        }
        channel.refresh_views();
        Ok(())
    }

    async fn unpublish(&self, tracks: &[LocalTrack]) -> Result<(), TransportError> {
        let mut inner = self.room.inner.lock().unwrap();
        let (channel, index) = inner.find_mut(self.owner).ok_or(TransportError::NotJoined)?;
        channel.members[index]
            .tracks
            .retain(|published| !tracks.iter().any(|track| track.id == published.id));
        channel.refresh_views();
        Ok(())
    }

    async fn leave(&self) -> Result<(), TransportError> {
        let mut inner = self.room.inner.lock().unwrap();
        let id = inner.remove(self.owner).ok_or(TransportError::NotJoined)?;
        debug!(%id, "Left loopback channel");
        Ok(())
    }
}

#[async_trait]
impl SnapshotChannel for LoopbackTransport {
    async fn broadcast(&self, snapshot: WhiteboardSnapshot) -> Result<(), SnapshotError> {
        let inner = self.room.inner.lock().unwrap();
        let (_, channel) = inner.find(self.owner).ok_or(SnapshotError::NotJoined)?;
        let from = channel
            .members
            .iter()
            .find(|member| member.owner == self.owner)
            .map(|member| member.id.clone())
            .ok_or(SnapshotError::NotJoined)?;
        let bytes = Arc::from(snapshot.to_bytes()?);
        // No other subscriber is not an error, there is just nobody to draw for.
        let _ = channel.relay.send(Relayed { from, bytes });
        Ok(())
    }

    fn subscribe(&self) -> Result<SnapshotInbox, SnapshotError> {
        let (own_id, mut relay) = {
            let inner = self.room.inner.lock().unwrap();
            let (_, channel) = inner.find(self.owner).ok_or(SnapshotError::NotJoined)?;
            let own_id = channel
                .members
                .iter()
                .find(|member| member.owner == self.owner)
                .map(|member| member.id.clone())
                .ok_or(SnapshotError::NotJoined)?;
            (own_id, channel.relay.subscribe())
        };

        let (sender, inbox) = unbounded_channel();
        tokio::task::spawn(async move {
            loop {
                match relay.recv().await {
                    Ok(Relayed { from, .. }) if from == own_id => continue,
                    Ok(Relayed { bytes, .. }) => match WhiteboardSnapshot::from_bytes(&bytes) {
                        Ok(snapshot) => {
                            if sender.send(snapshot).is_err() {
                                break;
                            }
                        }
                        Err(err) => warn!(%own_id, "Dropping undecodable whiteboard snapshot: {err}"),
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(%own_id, skipped, "Whiteboard relay fell behind");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            trace!(%own_id, "Whiteboard relay subscription ended");
        });
        Ok(inbox)
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.room.inner.lock() {
            inner.remove(self.owner);
        }
    }
}

/// Collaborators of one simulated participant.
#[derive(Debug, Clone)]
pub struct LoopbackPeer {
    pub transport: Arc<LoopbackTransport>,
    pub devices: Arc<FakeDevices>,
    pub board: Arc<MemoryBoard>,
    pub navigator: Arc<MemoryNavigator>,
}

impl LoopbackPeer {
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            transport: self.transport.clone(),
            devices: self.devices.clone(),
            board: self.board.clone(),
            board_channel: self.transport.clone(),
            navigator: self.navigator.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaKind;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn request(channel: &str) -> JoinRequest {
        JoinRequest {
            app_id: "app".to_string(),
            channel: channel.to_string(),
            token: None,
        }
    }

    fn screen(id: &str) -> LocalTrack {
        LocalTrack {
            id: id.to_string(),
            kind: MediaKind::Screen,
            label: "Screen 1".to_string(),
        }
    }

    #[tokio::test]
    async fn members_see_each_other_and_their_tracks() {
        let room = LoopbackRoom::new();
        let ada = room.client();
        let bob = room.client();

        let ada_session = ada.join(request("math")).await.unwrap();
        let mut bob_session = bob.join(request("math")).await.unwrap();
        assert_eq!(room.member_count("math"), 2);
        assert_eq!(
            *bob_session.participants.borrow_and_update(),
            vec![RemoteParticipant::new(ada_session.local_id.clone())]
        );

        ada.publish(&[screen("track-1")]).await.unwrap();
        let view = bob_session.participants.borrow_and_update().clone();
        let track = view[0].video_track.as_ref().expect("published video");
        assert_eq!(track.label.as_deref(), Some("Screen 1"));

        ada.unpublish(&[screen("track-1")]).await.unwrap();
        assert!(!bob_session.participants.borrow().first().unwrap().has_video);

        ada.leave().await.unwrap();
        assert!(bob_session.participants.borrow().is_empty());
        assert_eq!(ada.leave().await, Err(TransportError::NotJoined));
    }

    #[tokio::test]
    async fn channels_are_isolated() {
        let room = LoopbackRoom::new();
        let ada = room.client();
        let bob = room.client();
        ada.join(request("math")).await.unwrap();
        let bob_session = bob.join(request("art")).await.unwrap();
        assert!(bob_session.participants.borrow().is_empty());
        assert!(matches!(ada.join(request("art")).await, Err(TransportError::AlreadyJoined(_))));
    }

    #[tokio::test]
    async fn rejected_join_can_be_retried() {
        let room = LoopbackRoom::new();
        room.reject_next_join("math", "network unreachable");
        let client = room.client();

        let err = client.join(request("math")).await.unwrap_err();
        assert_eq!(err.to_string(), "failed to join channel math: network unreachable");
        assert!(client.join(request("math")).await.is_ok());
    }

    #[tokio::test]
    async fn relay_skips_the_sender() {
        let room = LoopbackRoom::new();
        let ada = room.client();
        let bob = room.client();
        ada.join(request("math")).await.unwrap();
        bob.join(request("math")).await.unwrap();
        let mut ada_inbox = ada.subscribe().unwrap();
        let mut bob_inbox = bob.subscribe().unwrap();

        let snapshot = WhiteboardSnapshot::new(json!({ "schema": 1, "records": {} }));
        ada.broadcast(snapshot.clone()).await.unwrap();

        assert_eq!(bob_inbox.recv().await, Some(snapshot));
        assert!(ada_inbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropping_the_transport_leaves() {
        let room = LoopbackRoom::new();
        let ada = room.client();
        ada.join(request("math")).await.unwrap();
        drop(ada);
        assert_eq!(room.member_count("math"), 0);
    }

    #[tokio::test]
    async fn disconnect_closes_the_participant_feed() {
        let room = LoopbackRoom::new();
        let ada = room.client();
        let mut session = ada.join(request("math")).await.unwrap();

        assert!(room.disconnect(&session.local_id));
        assert!(session.participants.changed().await.is_err());
        assert_eq!(ada.local_id(), None);
        assert!(ada.join(request("math")).await.is_ok());
    }
}
