//! In-memory PDF viewer
//!
//! Drives an [`MemorySurface`] and its event bus the way a user and the
//! viewer's renderer would.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;

use super::surface::MemorySurface;
use crate::annotations::AnnotationDescriptor;
use crate::events::{EventBus, EventSource};
use crate::surface::{AnnotationObject, EditSurface, ViewerEvent, ViewerEventKind, ViewerHandle};

pub struct MemoryViewer {
    events: Arc<EventBus<ViewerEvent>>,
    surface: Arc<MemorySurface>,
    rendered: AtomicBool,
    initialized: AtomicBool,
    ready: Notify,
}

impl MemoryViewer {
    /// An initialized viewer for a document with `page_count` pages
    pub fn new(page_count: u32) -> Arc<Self> {
        let viewer = Self::uninitialized(page_count);
        viewer.initialized.store(true, Ordering::SeqCst);
        viewer
    }

    /// A viewer whose `initialized()` blocks until [`finish_initializing`](Self::finish_initializing)
    pub fn uninitialized(page_count: u32) -> Arc<Self> {
        let events = Arc::new(EventBus::new());
        Arc::new(Self {
            surface: Arc::new(MemorySurface::new(page_count, Arc::clone(&events))),
            events,
            rendered: AtomicBool::new(true),
            initialized: AtomicBool::new(false),
            ready: Notify::new(),
        })
    }

    pub fn finish_initializing(&self) {
        self.initialized.store(true, Ordering::SeqCst);
        self.ready.notify_waiters();
    }

    pub fn surface(&self) -> Arc<MemorySurface> {
        Arc::clone(&self.surface)
    }

    /// Announce the editing surface
    pub fn acquire_surface(&self) {
        let surface: Arc<dyn EditSurface> = self.surface.clone();
        self.events.emit(&ViewerEvent::SurfaceReady(surface));
    }

    /// Render a page's editor layer and announce it
    pub fn render_page(&self, page_number: u32) {
        if page_number == 0 || page_number > self.surface.page_count() {
            tracing::warn!(page = page_number, "Page out of range");
            return;
        }
        self.surface.ensure_layer(page_number);
        self.events.emit(&ViewerEvent::LayerRendered { page_number });
    }

    pub fn render_pages(&self, pages: impl IntoIterator<Item = u32>) {
        for page_number in pages {
            self.render_page(page_number);
        }
    }

    pub fn emit_edit_state(&self, is_editing: bool) {
        self.events.emit(&ViewerEvent::EditStateChanged { is_editing });
    }

    /// A complete user edit: start editing, draw, stop editing
    pub fn draw(&self, page_number: u32, descriptor: AnnotationDescriptor) {
        self.emit_edit_state(true);
        self.surface.add_object(page_number, descriptor);
        self.emit_edit_state(false);
    }

    /// A complete user edit deleting everything on a page
    pub fn erase_page(&self, page_number: u32) {
        self.emit_edit_state(true);
        for object in self.surface.objects(page_number) {
            object.remove();
        }
        self.emit_edit_state(false);
    }

    /// The hosting sheet went away
    pub fn close(&self) {
        self.rendered.store(false, Ordering::SeqCst);
    }

    pub fn subscriber_count(&self) -> usize {
        [
            ViewerEventKind::SurfaceReady,
            ViewerEventKind::LayerRendered,
            ViewerEventKind::EditStateChanged,
        ]
        .into_iter()
        .map(|kind| self.events.subscriber_count(kind))
        .sum()
    }
}

#[async_trait]
impl ViewerHandle for MemoryViewer {
    fn events(&self) -> Arc<dyn EventSource<ViewerEvent>> {
        self.events.clone()
    }

    async fn initialized(&self) {
        loop {
            let notified = self.ready.notified();
            if self.initialized.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }

    fn is_rendered(&self) -> bool {
        self.rendered.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_initialized_waits_for_viewer() {
        let viewer = MemoryViewer::uninitialized(1);
        let waiting = Arc::clone(&viewer);
        let waiter = tokio::spawn(async move { waiting.initialized().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        viewer.finish_initializing();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_render_out_of_range_is_ignored() {
        let viewer = MemoryViewer::new(2);
        viewer.render_pages(0..=3);
        assert_eq!(viewer.surface().loaded_pages(), vec![1, 2]);
    }
}
