//! Annotation module
//!
//! Descriptor types for annotations drawn in the PDF editing surface, and the
//! codec that turns one page's worth of them into a persistable blob.
//!
//! # Blob format
//!
//! - absent: the page was never saved
//! - `""`: the page has no annotations
//! - `[{...}, ...]`: JSON array of descriptors

pub mod codec;
mod types;

pub use types::{AnnotationDescriptor, AnnotationKind, EditorMode};
