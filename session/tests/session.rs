use classroom_config::{
    Config,
    JoinConfig,
};
use classroom_session::{
    layout::Layout,
    loopback::{
        LoopbackPeer,
        LoopbackRoom,
    },
    media::MediaKind,
    navigation::Route,
    session::NoticeLevel,
    whiteboard::{
        SyncTiming,
        WhiteboardDocument as _,
    },
    Session,
    SessionNotice,
    SessionState,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::{
    sync::{
        atomic::{
            AtomicUsize,
            Ordering,
        },
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::mpsc::UnboundedReceiver,
    time::{
        sleep,
        timeout,
    },
};

struct Member {
    session: Session,
    peer: LoopbackPeer,
    notices: UnboundedReceiver<SessionNotice>,
}

fn join_config(channel: &str) -> JoinConfig {
    JoinConfig::for_channel(&Config::default(), channel).unwrap()
}

fn spawn(room: &LoopbackRoom, join: JoinConfig) -> Member {
    let peer = room.peer();
    let (session, notices) = Session::spawn(join, SyncTiming::default(), peer.collaborators());
    Member { session, peer, notices }
}

async fn joined(room: &LoopbackRoom, channel: &str) -> Member {
    let member = spawn(room, join_config(channel));
    member.session.join();
    wait(&member.session, |state| state.joined).await;
    member
}

async fn wait(session: &Session, predicate: impl FnMut(&SessionState) -> bool) -> SessionState {
    timeout(Duration::from_secs(5), session.wait_until(predicate))
        .await
        .expect("state not reached in time")
        .expect("session stopped")
}

async fn next_notice(notices: &mut UnboundedReceiver<SessionNotice>) -> SessionNotice {
    timeout(Duration::from_secs(5), notices.recv())
        .await
        .expect("no notice in time")
        .expect("notice channel closed")
}

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

#[tokio::test(start_paused = true)]
async fn camera_toggled_off_and_on_while_acquiring_ends_on_without_leaks() {
    let room = LoopbackRoom::new();
    let observer = joined(&room, "math").await;

    let local = spawn(&room, join_config("math"));
    local.peer.devices.hold(MediaKind::Camera);
    local.session.join();
    wait(&local.session, |state| state.joined).await;

    local.session.set_camera_on(false);
    local.session.set_camera_on(true);
    sleep(ms(10)).await;
    local.peer.devices.resume(MediaKind::Camera);

    let seen = wait(&observer.session, |state| state.participants.iter().any(|p| p.has_video)).await;
    let video = seen.participants[0].video_track.as_ref().unwrap();
    assert_eq!(video.label.as_deref(), Some("Integrated Camera"));

    assert!(local.session.snapshot().media.camera_on);
    let live = local.peer.devices.live_tracks();
    assert_eq!(live.iter().filter(|track| track.kind == MediaKind::Camera).count(), 1);
    // One microphone and a single camera acquisition.
    assert_eq!(local.peer.devices.acquisitions(), 2);
}

#[tokio::test(start_paused = true)]
async fn remote_screen_share_takes_over_the_grid() {
    let room = LoopbackRoom::new();
    let local = joined(&room, "math").await;
    let ada = joined(&room, "math").await;
    let _bob = joined(&room, "math").await;

    let state = wait(&local.session, |state| state.participants.len() == 2).await;
    assert_eq!(state.layout, Layout::Grid { columns: 2 });
    assert_eq!(state.remote_screen_share, None);

    ada.session.set_screen_sharing(true);
    let ada_id = ada.session.snapshot().local_id.unwrap();

    let state = wait(&local.session, |state| state.remote_screen_share.is_some()).await;
    assert_eq!(state.remote_screen_share, Some(ada_id.clone()));
    assert_eq!(state.layout, Layout::RemoteScreenShare { sharer: ada_id });

    ada.session.set_screen_sharing(false);
    let state = wait(&local.session, |state| state.remote_screen_share.is_none()).await;
    assert_eq!(state.layout, Layout::Grid { columns: 2 });
}

#[tokio::test(start_paused = true)]
async fn whiteboard_wins_over_local_screen_share() {
    let room = LoopbackRoom::new();
    let local = joined(&room, "math").await;

    local.session.set_screen_sharing(true);
    wait(&local.session, |state| state.layout == Layout::LocalScreenShare).await;

    local.session.set_whiteboard_open(true);
    let state = wait(&local.session, |state| state.whiteboard_open).await;
    assert_eq!(state.layout, Layout::Whiteboard);
    assert!(state.media.screen_sharing);

    local.session.toggle_whiteboard();
    let state = wait(&local.session, |state| !state.whiteboard_open).await;
    assert_eq!(state.layout, Layout::LocalScreenShare);
}

#[tokio::test(start_paused = true)]
async fn local_share_layout_waits_for_the_screen_track() {
    let room = LoopbackRoom::new();
    let local = joined(&room, "math").await;
    local.peer.devices.hold(MediaKind::Screen);

    local.session.set_screen_sharing(true);
    let state = wait(&local.session, |state| state.media.screen_sharing).await;
    assert_eq!(state.layout, Layout::Waiting);
    sleep(ms(500)).await;
    assert_eq!(local.session.snapshot().layout, Layout::Waiting);

    local.peer.devices.resume(MediaKind::Screen);
    wait(&local.session, |state| state.layout == Layout::LocalScreenShare).await;
    assert!(local
        .peer
        .devices
        .live_tracks()
        .iter()
        .any(|track| track.kind == MediaKind::Screen));
}

#[tokio::test(start_paused = true)]
async fn alone_in_the_channel_is_waiting() {
    let room = LoopbackRoom::new();
    let local = joined(&room, "math").await;
    assert_eq!(local.session.snapshot().layout, Layout::Waiting);

    let _ada = joined(&room, "math").await;
    let state = wait(&local.session, |state| !state.participants.is_empty()).await;
    assert_eq!(state.layout, Layout::Grid { columns: 1 });
}

#[tokio::test(start_paused = true)]
async fn failed_join_is_reported_and_can_be_retried() {
    let room = LoopbackRoom::new();
    room.reject_next_join("math", "network unreachable");
    let mut local = spawn(&room, join_config("math"));

    local.session.join();
    let notice = next_notice(&mut local.notices).await;
    assert_eq!(notice.level, NoticeLevel::Error);
    assert!(notice.message.contains("network unreachable"), "{notice}");
    assert!(!local.session.snapshot().joined);
    assert_eq!(room.member_count("math"), 0);

    local.session.join();
    wait(&local.session, |state| state.joined).await;
    assert_eq!(room.member_count("math"), 1);
}

#[tokio::test(start_paused = true)]
async fn leave_releases_tracks_and_returns_to_the_lobby() {
    let room = LoopbackRoom::new();
    let local = joined(&room, "math").await;
    sleep(ms(10)).await;
    assert_eq!(local.peer.devices.live_tracks().len(), 2);

    local.session.leave();
    let state = wait(&local.session, |state| !state.running).await;
    assert!(!state.joined);
    assert_eq!(state.media, Default::default());

    assert!(local.peer.devices.live_tracks().is_empty());
    assert_eq!(room.member_count("math"), 0);
    assert_eq!(local.peer.navigator.routes(), vec![Route::Lobby]);
    assert_eq!(Route::Lobby.path(), "/");
}

#[tokio::test(start_paused = true)]
async fn close_stops_without_navigating() {
    let room = LoopbackRoom::new();
    let local = joined(&room, "math").await;
    let navigator = local.peer.navigator.clone();
    let devices = local.peer.devices.clone();
    sleep(ms(10)).await;

    local.session.clone().close().await;
    assert!(!local.session.snapshot().running);
    assert!(navigator.routes().is_empty());
    assert!(devices.live_tracks().is_empty());

    // Stopped sessions ignore further input.
    local.session.toggle_camera();
    local.session.join();
    sleep(ms(10)).await;
    assert!(!local.session.snapshot().joined);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_last_handle_leaves_the_channel() {
    let room = LoopbackRoom::new();
    let observer = joined(&room, "math").await;
    let Member { session, peer, .. } = joined(&room, "math").await;
    wait(&observer.session, |state| state.participants.len() == 1).await;
    sleep(ms(10)).await;
    assert_eq!(peer.devices.live_tracks().len(), 2);

    drop(session);
    wait(&observer.session, |state| state.participants.is_empty()).await;
    assert_eq!(room.member_count("math"), 1);
    assert!(peer.devices.live_tracks().is_empty());
    assert!(peer.navigator.routes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn toggles_before_join_shape_what_gets_published() {
    let room = LoopbackRoom::new();
    let observer = joined(&room, "math").await;

    let local = spawn(&room, join_config("math").with_media(true, false));
    local.session.toggle_mic();
    local.session.toggle_camera();
    local.session.join();

    let state = wait(&local.session, |state| state.joined).await;
    assert!(!state.media.mic_on);
    assert!(state.media.camera_on);

    let seen = wait(&observer.session, |state| {
        state.participants.first().is_some_and(|p| p.has_video)
    })
    .await;
    assert!(!seen.participants[0].has_audio);
    assert!(local.peer.devices.live_tracks().iter().all(|track| track.kind == MediaKind::Camera));
}

#[tokio::test(start_paused = true)]
async fn unavailable_screen_capture_reverts_and_notifies() {
    let room = LoopbackRoom::new();
    let mut local = joined(&room, "math").await;
    local.peer.devices.fail(MediaKind::Screen, "permission denied");

    local.session.toggle_screen_share();
    let notice = next_notice(&mut local.notices).await;
    assert_eq!(notice.level, NoticeLevel::Warn);
    assert_eq!(notice.message, "screen unavailable: permission denied");

    let state = wait(&local.session, |state| !state.media.screen_sharing).await;
    assert_eq!(state.layout, Layout::Waiting);
}

#[tokio::test(start_paused = true)]
async fn lost_connection_is_reported_and_rejoinable() {
    let room = LoopbackRoom::new();
    let mut local = joined(&room, "math").await;
    let local_id = local.session.snapshot().local_id.unwrap();

    assert!(room.disconnect(&local_id));
    let notice = next_notice(&mut local.notices).await;
    assert_eq!(notice.level, NoticeLevel::Error);
    wait(&local.session, |state| !state.joined).await;

    local.session.join();
    let state = wait(&local.session, |state| state.joined).await;
    assert_ne!(state.local_id, Some(local_id));
}

#[tokio::test(start_paused = true)]
async fn drawings_reach_the_other_whiteboard_once() {
    let room = LoopbackRoom::new();
    let ada = joined(&room, "art").await;
    let bob = joined(&room, "art").await;
    ada.session.set_whiteboard_open(true);
    bob.session.set_whiteboard_open(true);
    sleep(ms(10)).await;

    let ada_changes = Arc::new(AtomicUsize::new(0));
    let _listener = ada.peer.board.listen(Box::new({
        let changes = ada_changes.clone();
        move || {
            changes.fetch_add(1, Ordering::SeqCst);
        }
    }));

    ada.peer.board.put("shape:1", json!({ "kind": "rect" }));
    sleep(ms(100)).await;
    assert_eq!(bob.peer.board.record("shape:1"), None);

    sleep(ms(100)).await;
    assert_eq!(bob.peer.board.record("shape:1"), Some(json!({ "kind": "rect" })));

    sleep(ms(1_000)).await;
    // Only the local edit, bob never echoed the snapshot back.
    assert_eq!(ada_changes.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn closed_whiteboard_catches_up_when_opened() {
    let room = LoopbackRoom::new();
    let ada = joined(&room, "art").await;
    let bob = joined(&room, "art").await;
    ada.session.set_whiteboard_open(true);
    sleep(ms(10)).await;

    ada.peer.board.put("note", json!("first"));
    sleep(ms(200)).await;
    ada.peer.board.put("note", json!("second"));
    sleep(ms(200)).await;
    assert!(bob.peer.board.is_empty());

    bob.session.toggle_whiteboard();
    sleep(ms(10)).await;
    assert_eq!(bob.peer.board.record("note"), Some(json!("second")));
}

#[tokio::test(start_paused = true)]
async fn session_from_config() {
    let room = LoopbackRoom::new();
    let peer = room.peer();
    let config = Config {
        channel: "history".to_string(),
        video_enabled: false,
        ..Config::default()
    };

    let (session, _notices) = Session::with_config(&config, peer.collaborators()).unwrap();
    assert_eq!(session.channel, "history");
    assert!(!session.snapshot().media.camera_on);

    let invalid = Config {
        channel: "  ".to_string(),
        ..Config::default()
    };
    assert!(Session::with_config(&invalid, room.peer().collaborators()).is_err());
}
