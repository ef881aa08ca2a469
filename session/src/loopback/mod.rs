//! In-process collaborators.
//!
//! Everything a session needs to run without a real media SDK: a room that
//! plays transport and whiteboard relay for any number of sessions, capture
//! devices that hand out fake tracks, an in-memory whiteboard document and a
//! navigator that records where it was sent.

mod board;
mod devices;
mod navigator;
mod room;

pub use board::MemoryBoard;
pub use devices::FakeDevices;
pub use navigator::MemoryNavigator;
pub use room::{
    LoopbackPeer,
    LoopbackRoom,
    LoopbackTransport,
};
