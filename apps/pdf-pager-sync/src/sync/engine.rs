//! Annotation sync engine
//!
//! Process-wide entry point. Owns the session registry and the remote update
//! reconciler, and wires the reconciler to the host's update and sheet-close
//! notifications exactly once.

use std::sync::Arc;

use parking_lot::Mutex;

use super::reconciler::RemoteReconciler;
use super::registry::SessionRegistry;
use super::session::{AnnotationSession, SyncMode};
use crate::config::Config;
use crate::events::{EventSource, Subscriptions};
use crate::host::{
    DocumentId, DocumentRef, HostEvent, HostEventKind, HostStore, PageStore, RecordKind, SheetKind,
};
use crate::surface::ViewerHandle;

/// Shared engine handle
#[derive(Clone)]
pub struct AnnotationSync {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: Config,
    registry: Arc<SessionRegistry>,
    reconciler: Arc<RemoteReconciler>,
    hooks: Mutex<Option<Subscriptions<HostEvent>>>,
}

impl AnnotationSync {
    pub fn new(config: Config, host: Arc<dyn HostStore>) -> Self {
        let pages = PageStore::new(host, &config.sync.namespace);
        let registry = Arc::new(SessionRegistry::new(pages, config.sync.clone()));
        let reconciler = Arc::new(RemoteReconciler::new(
            Arc::clone(&registry),
            config.actor.id.clone(),
        ));

        Self {
            inner: Arc::new(EngineInner {
                config,
                registry,
                reconciler,
                hooks: Mutex::new(None),
            }),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.inner.registry
    }

    /// Subscribe to host notifications
    ///
    /// Only the first call subscribes; later calls return false.
    pub fn install(&self, source: Arc<dyn EventSource<HostEvent>>) -> bool {
        let mut hooks = self.inner.hooks.lock();
        if hooks.is_some() {
            tracing::debug!("Host hooks already installed");
            return false;
        }

        let subscriptions = Subscriptions::new(source);
        let kinds = RecordKind::ALL
            .iter()
            .map(|kind| HostEventKind::Updated(*kind))
            .chain(SheetKind::ALL.iter().map(|sheet| HostEventKind::Closed(*sheet)));
        for kind in kinds {
            let reconciler = Arc::downgrade(&self.inner.reconciler);
            subscriptions.subscribe(
                kind,
                Arc::new(move |event: &HostEvent| {
                    if let Some(reconciler) = reconciler.upgrade() {
                        reconciler.handle(event);
                    }
                }),
            );
        }

        tracing::info!(
            actor = %self.inner.config.actor.id,
            hooks = subscriptions.len(),
            "Installed annotation sync hooks"
        );
        *hooks = Some(subscriptions);
        true
    }

    pub fn is_installed(&self) -> bool {
        self.inner.hooks.lock().is_some()
    }

    /// Start synchronizing `viewer` with `document`
    ///
    /// Waits for the viewer to initialize before subscribing to its events.
    pub async fn attach(
        &self,
        document: DocumentRef,
        viewer: Arc<dyn ViewerHandle>,
    ) -> AnnotationSession {
        viewer.initialized().await;
        let editable = document.is_editable();
        self.inner.registry.create(document, viewer, editable)
    }

    pub fn session(&self, document: DocumentId) -> Option<AnnotationSession> {
        self.inner.registry.lookup(document)
    }

    /// Flush outstanding edits, close every session and drop the host hooks
    ///
    /// Returns how many sessions were closed.
    pub async fn shutdown(&self) -> usize {
        for session in self.inner.registry.sessions() {
            if session.editable() && session.mode() == SyncMode::Dirty {
                if let Err(e) = session.flush_now().await {
                    tracing::warn!(
                        document_id = %session.document().id,
                        error = %e,
                        "Final flush failed"
                    );
                }
            }
        }

        let closed = self.inner.registry.clear();
        if let Some(hooks) = self.inner.hooks.lock().take() {
            hooks.release_all();
        }
        tracing::info!(closed, "Annotation sync shut down");
        closed
    }
}
