//! Editing surface and viewer capabilities
//!
//! The PDF viewer and its annotation editing surface are external. The sync
//! engine only needs to enumerate, inject, remove and serialize annotation
//! objects per page, switch the surface's global mode, and hear about surface
//! lifecycle events.
//!
//! Page numbers are 1-based everywhere in this crate.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::annotations::{AnnotationDescriptor, EditorMode};
use crate::events::{Event, EventSource};

/// A live annotation object on a page layer
pub trait AnnotationObject: Send + Sync {
    /// Persistable form, or `None` if the object refuses (e.g. still empty)
    fn serialize(&self) -> Option<AnnotationDescriptor>;

    fn position(&self) -> (f64, f64);

    fn set_position(&self, x: f64, y: f64);

    fn size(&self) -> (f64, f64);

    fn is_selected(&self) -> bool;

    fn unselect(&self);

    /// Remove from its layer
    fn remove(&self);
}

/// Transient reference to a live object
pub type LiveObject = Arc<dyn AnnotationObject>;

/// The editor layer of one rendered page
pub trait AnnotationLayer: Send + Sync {
    fn page_number(&self) -> u32;

    /// Build (but do not add) a live object from a descriptor
    fn deserialize(&self, descriptor: &AnnotationDescriptor) -> Option<LiveObject>;

    fn add(&self, object: LiveObject);
}

/// The live annotation editing surface of one viewer
pub trait EditSurface: Send + Sync {
    fn objects_on_page(&self, page_number: u32) -> Vec<LiveObject>;

    /// Editor layer for a page, absent until that page has rendered
    fn layer(&self, page_number: u32) -> Option<Arc<dyn AnnotationLayer>>;

    /// Pages whose editor layer currently exists
    fn loaded_pages(&self) -> Vec<u32>;

    fn set_global_mode(&self, mode: EditorMode);
}

/// Events emitted by the viewer and its editing surface
#[derive(Clone)]
pub enum ViewerEvent {
    /// The editing surface has been created
    SurfaceReady(Arc<dyn EditSurface>),
    /// A page's editor layer finished rendering
    LayerRendered { page_number: u32 },
    /// The surface's editing state changed
    EditStateChanged { is_editing: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewerEventKind {
    SurfaceReady,
    LayerRendered,
    EditStateChanged,
}

impl Event for ViewerEvent {
    type Kind = ViewerEventKind;

    fn kind(&self) -> ViewerEventKind {
        match self {
            ViewerEvent::SurfaceReady(_) => ViewerEventKind::SurfaceReady,
            ViewerEvent::LayerRendered { .. } => ViewerEventKind::LayerRendered,
            ViewerEvent::EditStateChanged { .. } => ViewerEventKind::EditStateChanged,
        }
    }
}

impl fmt::Debug for ViewerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewerEvent::SurfaceReady(_) => f.write_str("SurfaceReady"),
            ViewerEvent::LayerRendered { page_number } => {
                write!(f, "LayerRendered({})", page_number)
            }
            ViewerEvent::EditStateChanged { is_editing } => {
                write!(f, "EditStateChanged({})", is_editing)
            }
        }
    }
}

/// An embedded PDF viewer hosting one document
#[async_trait]
pub trait ViewerHandle: Send + Sync {
    /// Viewer event bus
    fn events(&self) -> Arc<dyn EventSource<ViewerEvent>>;

    /// Resolves once the viewer application has initialized
    async fn initialized(&self);

    /// Whether the sheet hosting this viewer is still rendered
    fn is_rendered(&self) -> bool;
}
