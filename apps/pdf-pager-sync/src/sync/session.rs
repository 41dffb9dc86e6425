//! Annotation session
//!
//! One session per open (document, viewer) pair. It owns the three-state
//! machine that decides whether surface edit events are real user edits:
//!
//! ```text
//!   Ignored --layer rendered + load--> Idle --edit started--> Dirty
//!      ^                                 ^                      |
//!      +------ programmatic load --------+----- flush done -----+
//! ```
//!
//! Locks are only held for short, non-awaiting sections and never while
//! calling into the editing surface, because the surface may emit events that
//! re-enter the session synchronously.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use uuid::Uuid;

use super::debounce::Debouncer;
use super::reconciler::changed_pages;
use crate::annotations::{codec, EditorMode};
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::events::Subscriptions;
use crate::host::{DocumentRef, PageStore, UpdateBatch};
use crate::surface::{EditSurface, ViewerEvent, ViewerEventKind, ViewerHandle};

/// Whether surface edit events are currently treated as user edits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Surface not ready, or the engine itself is mutating it
    Ignored,
    /// No local edits since the last flush
    Idle,
    /// Local edits waiting for a flush
    Dirty,
}

/// Point-in-time view of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    #[serde(rename = "documentId")]
    pub document_id: String,
    pub mode: SyncMode,
    pub editable: bool,
    #[serde(rename = "surfaceReady")]
    pub surface_ready: bool,
    #[serde(rename = "flushPending")]
    pub flush_pending: bool,
    #[serde(rename = "flushInProgress")]
    pub flush_in_progress: bool,
    #[serde(rename = "flushCount")]
    pub flush_count: u64,
    #[serde(rename = "pagesWritten")]
    pub pages_written: u64,
    #[serde(rename = "openedAt")]
    pub opened_at: DateTime<Utc>,
    #[serde(rename = "lastFlush")]
    pub last_flush: Option<DateTime<Utc>>,
    #[serde(rename = "lastError", skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct FlushStats {
    flush_count: u64,
    pages_written: u64,
    last_flush: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

/// Handle to a live annotation session
#[derive(Clone)]
pub struct AnnotationSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    id: Uuid,
    document: DocumentRef,
    editable: bool,
    viewer: Arc<dyn ViewerHandle>,
    pages: PageStore,
    surface: RwLock<Option<Arc<dyn EditSurface>>>,
    /// Pages whose persisted blob has been injected; only these are flushed
    loaded: Mutex<BTreeSet<u32>>,
    mode: Mutex<SyncMode>,
    subscriptions: Subscriptions<ViewerEvent>,
    flush_timer: Debouncer,
    mode_reset_timer: Debouncer,
    flush_gate: tokio::sync::Mutex<()>,
    closed: AtomicBool,
    stats: Mutex<FlushStats>,
    opened_at: DateTime<Utc>,
}

impl AnnotationSession {
    /// Create a session and subscribe it to the viewer's events
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn open(
        document: DocumentRef,
        viewer: Arc<dyn ViewerHandle>,
        editable: bool,
        pages: PageStore,
        config: &SyncConfig,
    ) -> Self {
        let inner = Arc::new(SessionInner {
            id: Uuid::new_v4(),
            subscriptions: Subscriptions::new(viewer.events()),
            document,
            editable,
            viewer,
            pages,
            surface: RwLock::new(None),
            loaded: Mutex::new(BTreeSet::new()),
            mode: Mutex::new(SyncMode::Ignored),
            flush_timer: Debouncer::new("flush", config.flush_debounce()),
            mode_reset_timer: Debouncer::new("mode-reset", config.mode_reset_debounce()),
            flush_gate: tokio::sync::Mutex::new(()),
            closed: AtomicBool::new(false),
            stats: Mutex::new(FlushStats::default()),
            opened_at: Utc::now(),
        });
        SessionInner::subscribe(&inner);

        tracing::info!(
            session_id = %inner.id,
            document_id = %inner.document.id,
            document = %inner.document.name,
            editable,
            "Created annotation session"
        );

        Self { inner }
    }

    pub fn document(&self) -> &DocumentRef {
        &self.inner.document
    }

    pub fn editable(&self) -> bool {
        self.inner.editable
    }

    pub fn mode(&self) -> SyncMode {
        *self.inner.mode.lock()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Whether the sheet hosting the viewer is still rendered
    pub fn viewer_rendered(&self) -> bool {
        self.inner.viewer.is_rendered()
    }

    pub fn surface(&self) -> Option<Arc<dyn EditSurface>> {
        self.inner.surface()
    }

    /// Number of viewer subscriptions currently held
    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.len()
    }

    /// Whether two handles refer to the same session
    pub fn same_session(&self, other: &AnnotationSession) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn status(&self) -> SessionStatus {
        let inner = &self.inner;
        let stats = inner.stats.lock();
        SessionStatus {
            document_id: inner.document.id.to_string(),
            mode: *inner.mode.lock(),
            editable: inner.editable,
            surface_ready: inner.surface.read().is_some(),
            flush_pending: inner.flush_timer.is_pending(),
            flush_in_progress: inner.flush_gate.try_lock().is_err(),
            flush_count: stats.flush_count,
            pages_written: stats.pages_written,
            opened_at: inner.opened_at,
            last_flush: stats.last_flush,
            last_error: stats.last_error.clone(),
        }
    }

    /// Inject a page's persisted annotations into its live layer
    ///
    /// Edit events raised by the injection are ignored. Returns how many
    /// objects were added.
    pub(crate) fn load_page(&self, page_number: u32) -> usize {
        self.inner.load_page_quietly(page_number)
    }

    /// Pages whose persisted annotations have been injected
    pub fn loaded_pages(&self) -> Vec<u32> {
        self.inner.loaded.lock().iter().copied().collect()
    }

    /// Remove every live object on a page; returns how many were removed
    pub fn remove_page(&self, page_number: u32) -> usize {
        self.inner.remove_page(page_number)
    }

    /// Page numbers whose blob paths appear in `paths`
    pub fn pages_changed(&self, paths: &[String]) -> Vec<u32> {
        changed_pages(paths, |path| self.inner.pages.page_from_path(path))
    }

    /// Replace the live contents of `pages` with their persisted blobs
    pub fn reload_pages(&self, pages: &[u32]) {
        let inner = &self.inner;
        inner.set_mode(SyncMode::Ignored);
        for &page_number in pages {
            inner.remove_page(page_number);
            inner.load_page(page_number);
        }
        inner.set_mode(SyncMode::Idle);
    }

    /// Flush immediately, serialized with debounced flushes
    ///
    /// Returns the number of pages written.
    pub async fn flush_now(&self) -> Result<usize> {
        if self.is_closed() {
            return Err(SyncError::SessionClosed(self.inner.document.id.to_string()));
        }
        self.inner.flush_timer.cancel();
        Arc::clone(&self.inner).flush().await
    }

    /// Release every subscription and cancel pending timers
    ///
    /// Returns how many subscriptions were released. Idempotent.
    pub(crate) fn close(&self) -> usize {
        let inner = &self.inner;
        if inner.closed.swap(true, Ordering::SeqCst) {
            return 0;
        }
        inner.flush_timer.cancel();
        inner.mode_reset_timer.cancel();
        let released = inner.subscriptions.release_all();
        inner.surface.write().take();

        tracing::info!(
            session_id = %inner.id,
            document_id = %inner.document.id,
            released,
            "Closed annotation session"
        );
        released
    }
}

impl SessionInner {
    fn subscribe(this: &Arc<Self>) {
        let weak = Arc::downgrade(this);
        this.subscriptions.subscribe(
            ViewerEventKind::SurfaceReady,
            Arc::new(move |event: &ViewerEvent| {
                if let (Some(inner), ViewerEvent::SurfaceReady(surface)) = (weak.upgrade(), event) {
                    inner.on_surface_ready(Arc::clone(surface));
                }
            }),
        );

        let weak = Arc::downgrade(this);
        this.subscriptions.subscribe(
            ViewerEventKind::LayerRendered,
            Arc::new(move |event: &ViewerEvent| {
                if let (Some(inner), ViewerEvent::LayerRendered { page_number }) =
                    (weak.upgrade(), event)
                {
                    inner.on_layer_rendered(*page_number);
                }
            }),
        );

        // Read-only sessions never persist, so they never listen for edits
        if this.editable {
            let weak = Arc::downgrade(this);
            this.subscriptions.subscribe(
                ViewerEventKind::EditStateChanged,
                Arc::new(move |event: &ViewerEvent| {
                    if let (Some(inner), ViewerEvent::EditStateChanged { is_editing }) =
                        (weak.upgrade(), event)
                    {
                        inner.on_edit_state_changed(*is_editing);
                    }
                }),
            );
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn surface(&self) -> Option<Arc<dyn EditSurface>> {
        self.surface.read().clone()
    }

    fn set_mode(&self, mode: SyncMode) {
        let mut current = self.mode.lock();
        if *current != mode {
            tracing::trace!(session_id = %self.id, from = ?*current, to = ?mode, "Mode change");
            *current = mode;
        }
    }

    fn on_surface_ready(self: &Arc<Self>, surface: Arc<dyn EditSurface>) {
        if self.is_closed() {
            return;
        }
        tracing::debug!(session_id = %self.id, "Editing surface acquired");
        *self.surface.write() = Some(Arc::clone(&surface));

        // Layers that rendered before the surface existed
        let rendered: Vec<u32> = surface
            .loaded_pages()
            .into_iter()
            .filter(|page_number| surface.objects_on_page(*page_number).is_empty())
            .collect();
        let deferred: Vec<u32> = {
            let loaded = self.loaded.lock();
            rendered
                .into_iter()
                .filter(|page_number| !loaded.contains(page_number))
                .collect()
        };
        if deferred.is_empty() {
            return;
        }
        tracing::debug!(session_id = %self.id, pages = ?deferred, "Loading deferred pages");
        self.set_mode(SyncMode::Ignored);
        for page_number in deferred {
            self.load_page(page_number);
        }
        self.set_mode(SyncMode::Idle);
    }

    fn on_layer_rendered(self: &Arc<Self>, page_number: u32) {
        if self.is_closed() {
            return;
        }
        tracing::debug!(session_id = %self.id, page = page_number, "Editor layer rendered");

        let Some(surface) = self.surface() else {
            tracing::debug!(
                session_id = %self.id,
                page = page_number,
                "No surface yet, deferring load"
            );
            return;
        };

        // A layer can render more than once; never load on top of live objects
        if !surface.objects_on_page(page_number).is_empty() {
            tracing::debug!(
                session_id = %self.id,
                page = page_number,
                "Annotations already loaded, ignoring re-render"
            );
            return;
        }

        self.load_page_quietly(page_number);
    }

    fn load_page_quietly(self: &Arc<Self>, page_number: u32) -> usize {
        if self.surface().is_none() {
            return 0;
        }
        self.set_mode(SyncMode::Ignored);
        let added = self.load_page(page_number);
        self.set_mode(SyncMode::Idle);
        added
    }

    fn on_edit_state_changed(self: &Arc<Self>, is_editing: bool) {
        if self.is_closed() {
            return;
        }

        let schedule_flush = {
            let mut mode = self.mode.lock();
            match (*mode, is_editing) {
                (SyncMode::Ignored, _) => false,
                (_, true) => {
                    if *mode != SyncMode::Dirty {
                        tracing::debug!(session_id = %self.id, "Local editing detected");
                    }
                    *mode = SyncMode::Dirty;
                    false
                }
                (SyncMode::Dirty, false) => true,
                (SyncMode::Idle, false) => false,
            }
        };

        if schedule_flush {
            tracing::debug!(session_id = %self.id, "Editing stopped, scheduling flush");
            let weak = Arc::downgrade(self);
            self.flush_timer.schedule(move || flush_if_alive(weak).boxed());
        }
    }

    fn load_page(self: &Arc<Self>, page_number: u32) -> usize {
        // Loaded later, when the surface arrives or that layer renders
        let Some(surface) = self.surface() else {
            return 0;
        };
        let Some(layer) = surface.layer(page_number) else {
            return 0;
        };
        self.loaded.lock().insert(page_number);

        let Some(blob) = self.pages.read(&self.document, page_number) else {
            return 0;
        };
        if blob.is_empty() {
            return 0;
        }

        let descriptors = match codec::decode(&blob) {
            Ok(descriptors) => descriptors,
            Err(e) => {
                tracing::warn!(
                    session_id = %self.id,
                    document_id = %self.document.id,
                    page = page_number,
                    error = %e,
                    "Treating unreadable page blob as empty"
                );
                return 0;
            }
        };

        tracing::debug!(
            session_id = %self.id,
            page = page_number,
            count = descriptors.len(),
            "Loading annotations"
        );

        // Placing mode keeps the surface from treating the injection as a
        // paste aimed at the currently selected object
        surface.set_global_mode(EditorMode::Stamp);

        let mut added = 0;
        for descriptor in &descriptors {
            let Some(object) = layer.deserialize(descriptor) else {
                continue;
            };
            // The surface offsets pasted objects by their size on add
            let (x, y) = object.position();
            let (width, height) = object.size();
            object.set_position(x - width, y - height);
            layer.add(Arc::clone(&object));
            object.unselect();
            added += 1;
        }

        let weak = Arc::downgrade(self);
        self.mode_reset_timer.schedule(move || {
            async move {
                let Some(inner) = weak.upgrade() else { return };
                if inner.is_closed() {
                    return;
                }
                if let Some(surface) = inner.surface() {
                    tracing::debug!(session_id = %inner.id, "Returning surface to normal mode");
                    surface.set_global_mode(EditorMode::None);
                }
            }
            .boxed()
        });

        added
    }

    fn remove_page(&self, page_number: u32) -> usize {
        let Some(surface) = self.surface() else {
            return 0;
        };
        let objects = surface.objects_on_page(page_number);
        for object in &objects {
            object.remove();
        }
        objects.len()
    }

    async fn flush(self: Arc<Self>) -> Result<usize> {
        if !self.editable {
            return Ok(0);
        }
        let _gate = self.flush_gate.lock().await;
        if self.is_closed() {
            return Ok(0);
        }
        let Some(surface) = self.surface() else {
            return Ok(0);
        };

        // Every loaded page, including empty ones, so deleting the last
        // annotation on a page is persisted as "". A page whose blob was never
        // injected would serialize as empty and erase it.
        let loaded = self.loaded.lock().clone();
        let mut batch = UpdateBatch::new();
        for page_number in surface.loaded_pages() {
            if !loaded.contains(&page_number) {
                tracing::debug!(
                    session_id = %self.id,
                    page = page_number,
                    "Skipping unloaded page"
                );
                continue;
            }
            let objects = surface.objects_on_page(page_number);
            match codec::serialize_page(&objects) {
                Ok(blob) => {
                    self.pages
                        .write_if_changed(&mut batch, &self.document, page_number, blob);
                }
                Err(e) => tracing::warn!(
                    session_id = %self.id,
                    page = page_number,
                    error = %e,
                    "Failed to serialize page"
                ),
            }
        }

        // Edits landing while the write is in flight mark the session dirty
        // again and get their own flush
        {
            let mut mode = self.mode.lock();
            if *mode == SyncMode::Dirty {
                *mode = SyncMode::Idle;
            }
        }

        if batch.is_empty() {
            tracing::debug!(session_id = %self.id, "Flush found no changed pages");
            self.stats.lock().flush_count += 1;
            return Ok(0);
        }

        match self.pages.commit(&self.document, batch).await {
            Ok(pages) => {
                tracing::info!(
                    session_id = %self.id,
                    document_id = %self.document.id,
                    pages,
                    "Persisted annotations"
                );
                let mut stats = self.stats.lock();
                stats.flush_count += 1;
                stats.pages_written += pages as u64;
                stats.last_flush = Some(Utc::now());
                stats.last_error = None;
                Ok(pages)
            }
            Err(e) => {
                tracing::error!(
                    session_id = %self.id,
                    document_id = %self.document.id,
                    error = %e,
                    "Failed to persist annotations"
                );
                self.pages.host().notify_error(&format!(
                    "Failed to save annotations for {}: {}",
                    self.document.name, e
                ));
                let mut stats = self.stats.lock();
                stats.flush_count += 1;
                stats.last_error = Some(e.to_string());
                Err(e.into())
            }
        }
    }
}

async fn flush_if_alive(session: Weak<SessionInner>) {
    let Some(inner) = session.upgrade() else {
        return;
    };
    if inner.is_closed() {
        return;
    }
    // Failures are already logged and surfaced to the user
    let _ = inner.flush().await;
}
