use crate::navigation::{
    Navigator,
    Route,
};
use std::sync::Mutex;

/// Records every route it is sent to.
#[derive(Debug, Default)]
pub struct MemoryNavigator {
    routes: Mutex<Vec<Route>>,
}

impl MemoryNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn routes(&self) -> Vec<Route> {
        self.routes.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<Route> {
        self.routes.lock().unwrap().last().cloned()
    }
}

impl Navigator for MemoryNavigator {
    fn route_to(&self, route: Route) {
        debug!(path = route.path(), "Navigating to {route}");
        self.routes.lock().unwrap().push(route);
    }
}
