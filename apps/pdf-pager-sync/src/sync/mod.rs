//! Annotation synchronization
//!
//! Keeps every open viewer's live annotations in step with the per-page blobs
//! stored on its host document.
//!
//! # Flow
//!
//! 1. `AnnotationSync::attach` opens a session for a (document, viewer) pair
//! 2. Rendered pages are filled from their stored blobs
//! 3. Local edits mark the session dirty; a debounced flush writes every
//!    changed page in one host update
//! 4. Other clients receive the update and replace just those pages
//!
//! # Conflicts
//!
//! Pages are replaced whole. Two actors editing the same page inside one
//! debounce window race, and the last write wins.

mod debounce;
mod engine;
mod reconciler;
mod registry;
mod session;

pub use debounce::Debouncer;
pub use engine::AnnotationSync;
pub use reconciler::{ReconcileOutcome, RemoteReconciler};
pub use registry::SessionRegistry;
pub use session::{AnnotationSession, SessionStatus, SyncMode};
