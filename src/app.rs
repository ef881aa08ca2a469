use classroom_config::{
    Config,
    JoinConfig,
};
use classroom_session::{
    layout::{
        sidebar,
        Layout,
    },
    loopback::{
        LoopbackPeer,
        LoopbackRoom,
        MemoryBoard,
    },
    navigation::{
        Navigator as _,
        Route,
    },
    registry::ParticipantRegistry,
    whiteboard::SyncTiming,
    Session,
    SessionNotice,
    SessionState,
    SessionStore,
};
use color_eyre::Result;
use names::Generator;
use serde::Serialize;
use serde_json::json;
use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        Mutex,
    },
    time::Duration,
};
use tokio::{
    sync::mpsc::UnboundedReceiver,
    time::sleep,
};

const LOCAL: &str = "local";

/// Runs the local session next to scripted peers in one in-process room.
pub struct App {
    config: Config,
    room: LoopbackRoom,
    sessions: SessionStore,
    boards: BTreeMap<String, Arc<MemoryBoard>>,
    notices: Arc<Mutex<Vec<SessionNotice>>>,
}

#[derive(Debug, Serialize)]
struct MemberSummary {
    name: String,
    local_id: Option<String>,
    layout: Layout,
}

#[derive(Debug, Serialize)]
struct Summary {
    local: SessionState,
    members: Vec<MemberSummary>,
    local_preview: String,
    sidebar: Vec<String>,
    whiteboard_records: BTreeMap<String, usize>,
    notices: Vec<SessionNotice>,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            room: LoopbackRoom::new(),
            sessions: SessionStore::new(),
            boards: BTreeMap::new(),
            notices: Default::default(),
        }
    }

    pub async fn run(mut self) -> Result<()> {
        let simulation = self.config.simulation.clone();
        let join = JoinConfig::new(&self.config)?;
        info!(
            channel = %join.channel,
            peers = simulation.peers,
            "Starting classroom simulation"
        );

        let local_peer = self.room.peer();
        let (local, notices) = Session::with_config(&self.config, local_peer.collaborators())?;
        let route = Route::Session(join.clone());
        info!(path = route.path(), "Entering session screen");
        local_peer.navigator.route_to(route);
        self.register(LOCAL, local.clone(), notices, &local_peer);
        local.join();

        let mut generator = Generator::default();
        let mut peers = Vec::new();
        for index in 0..simulation.peers {
            let name = generator.next().unwrap_or_else(|| format!("peer-{index}"));
            let peer = self.room.peer();
            let timing = SyncTiming::from(&self.config.whiteboard);
            let (session, notices) = Session::spawn(join.clone().with_media(true, true), timing, peer.collaborators());
            self.register(&name, session.clone(), notices, &peer);
            session.join();
            peers.push(session);
        }

        let script = tokio::task::spawn(script(
            local.clone(),
            local_peer.board.clone(),
            peers,
            simulation.screen_share_after_secs,
        ));

        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Interrupted"),
            _ = sleep(Duration::from_secs(simulation.run_seconds)) => info!("Simulation time is up"),
        }
        script.abort();

        let summary = self.summary(&local);
        println!("{}", serde_json::to_string_pretty(&summary)?);

        local.leave();
        local.wait_until(|state| !state.running).await?;
        self.sessions.close_all().await;
        info!(members = self.room.member_count(&join.channel), "Simulation stopped");
        Ok(())
    }

    fn register(
        &mut self,
        name: &str,
        session: Session,
        mut notices: UnboundedReceiver<SessionNotice>,
        peer: &LoopbackPeer,
    ) {
        let collected = self.notices.clone();
        tokio::task::spawn(async move {
            while let Some(notice) = notices.recv().await {
                collected.lock().unwrap().push(notice);
            }
        });
        self.boards.insert(name.to_string(), peer.board.clone());
        self.sessions.add(name, session);
    }

    fn summary(&self, local: &Session) -> Summary {
        let members = self
            .sessions
            .entries()
            .into_iter()
            .map(|(name, session)| {
                let state = session.snapshot();
                MemberSummary {
                    name,
                    local_id: state.local_id.map(|id| id.to_string()),
                    layout: state.layout,
                }
            })
            .collect();
        let state = local.snapshot();
        let registry: ParticipantRegistry = state.participants.iter().cloned().collect();
        let sidebar = sidebar(&state.layout, &registry)
            .into_iter()
            .map(|participant| participant.id.to_string())
            .collect();

        Summary {
            members,
            local_preview: state.layout.local_preview().to_string(),
            sidebar,
            whiteboard_records: self
                .boards
                .iter()
                .map(|(name, board)| (name.clone(), board.len()))
                .collect(),
            notices: self.notices.lock().unwrap().clone(),
            local: state,
        }
    }
}

/// The first peer presents for a while, then everybody opens the whiteboard
/// and the local user sketches on it.
async fn script(local: Session, board: Arc<MemoryBoard>, peers: Vec<Session>, share_after: Option<u64>) {
    if let (Some(presenter), Some(after)) = (peers.first(), share_after) {
        let after = Duration::from_secs(after);
        sleep(after).await;
        info!("Peer starts presenting");
        presenter.set_screen_sharing(true);
        sleep(after).await;
        presenter.set_screen_sharing(false);
    }

    sleep(Duration::from_secs(1)).await;
    local.set_whiteboard_open(true);
    for peer in &peers {
        peer.set_whiteboard_open(true);
    }

    for stroke in 0..5u32 {
        board.put(
            format!("stroke:{stroke}"),
            json!({ "points": [[stroke * 10, 0], [stroke * 10 + 5, 20]] }),
        );
        sleep(Duration::from_millis(40)).await;
    }
    debug!(records = board.len(), "Finished sketching");
}
