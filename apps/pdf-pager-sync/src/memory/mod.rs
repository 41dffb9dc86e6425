//! In-memory implementations of the host store, viewer and editing surface
//!
//! Used by the tests and the demo binary. They behave like the real
//! collaborators where it matters for synchronization: the surface treats
//! deserialized objects as pastes, and host updates are broadcast to every
//! client with the writing actor's id.

mod host;
mod surface;
mod viewer;

pub use host::{MemoryHost, MemoryHostClient};
pub use surface::{MemoryLayer, MemoryObject, MemorySurface};
pub use viewer::MemoryViewer;
