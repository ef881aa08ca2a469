use classroom_config::JoinConfig;
use derive_more::Display;

/// Screens the client can show.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum Route {
    /// Pre-join form.
    #[display("lobby")]
    Lobby,
    /// Call screen, carrying the join parameters from the lobby form.
    #[display("session {}", _0.channel)]
    Session(JoinConfig),
}

impl Route {
    pub fn path(&self) -> String {
        match self {
            Route::Lobby => "/".to_string(),
            Route::Session(join) => join.session_path(),
        }
    }
}

pub trait Navigator: Send + Sync {
    fn route_to(&self, route: Route);
}
