//! PDF Pager annotation sync
//!
//! Synchronizes annotations drawn in embedded PDF editors with per-page blobs
//! persisted on host documents, and propagates them between clients.
//!
//! # Modules
//!
//! - `annotations`: descriptor types and the per-page blob codec
//! - `host`: host document store capability and page blob storage
//! - `surface`: viewer and editing surface capabilities
//! - `sync`: sessions, registry, debouncing and remote reconciliation
//! - `memory`: in-memory collaborators for tests and the demo binary

pub mod annotations;
pub mod config;
pub mod error;
pub mod events;
pub mod host;
pub mod memory;
pub mod surface;
pub mod sync;

pub use config::Config;
pub use error::{Result, SyncError};
pub use sync::{AnnotationSession, AnnotationSync, SyncMode};
