#[macro_use]
extern crate tracing;

pub mod layout;
pub mod loopback;
pub mod media;
pub mod navigation;
pub mod participant;
pub mod registry;
pub mod screen_share;
pub mod session;
pub mod store;
pub mod transport;
pub mod whiteboard;

pub use layout::{
    select_layout,
    Layout,
    LayoutInputs,
};
pub use session::{
    Collaborators,
    Session,
    SessionMessage,
    SessionNotice,
    SessionState,
};
pub use store::SessionStore;
