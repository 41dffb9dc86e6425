//! Live session registry, keyed by document id
//!
//! Holds at most one session per document. Sessions are looked up both by
//! their own document and by a containing document when a sheet closes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::session::AnnotationSession;
use crate::config::SyncConfig;
use crate::host::{DocumentId, DocumentRef, PageStore};
use crate::surface::ViewerHandle;

pub struct SessionRegistry {
    sessions: RwLock<HashMap<DocumentId, AnnotationSession>>,
    pages: PageStore,
    config: SyncConfig,
}

impl SessionRegistry {
    pub fn new(pages: PageStore, config: SyncConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            pages,
            config,
        }
    }

    pub fn pages(&self) -> &PageStore {
        &self.pages
    }

    /// Open a session for `document` and register it
    ///
    /// A document already holding a session has it closed and replaced.
    pub fn create(
        &self,
        document: DocumentRef,
        viewer: Arc<dyn ViewerHandle>,
        editable: bool,
    ) -> AnnotationSession {
        let id = document.id;
        let session =
            AnnotationSession::open(document, viewer, editable, self.pages.clone(), &self.config);

        let previous = self.sessions.write().insert(id, session.clone());
        if let Some(previous) = previous {
            tracing::warn!(document_id = %id, "Replacing existing annotation session");
            previous.close();
        }
        session
    }

    /// Close and unregister a session
    ///
    /// Returns false if it was not (or no longer) the registered session for
    /// its document.
    pub fn delete(&self, session: &AnnotationSession) -> bool {
        let id = session.document().id;
        let removed = {
            let mut sessions = self.sessions.write();
            match sessions.get(&id) {
                Some(current) if current.same_session(session) => sessions.remove(&id),
                _ => None,
            }
        };
        // Closing a stale handle still releases its subscriptions
        session.close();
        removed.is_some()
    }

    pub fn lookup(&self, document: DocumentId) -> Option<AnnotationSession> {
        self.sessions.read().get(&document).cloned()
    }

    /// Sessions whose document is `container` or lives inside it
    pub fn find_for_container(&self, container: DocumentId) -> Vec<AnnotationSession> {
        self.sessions
            .read()
            .values()
            .filter(|session| session.document().is_contained_by(container))
            .cloned()
            .collect()
    }

    pub fn sessions(&self) -> Vec<AnnotationSession> {
        self.sessions.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Close and drop every session; returns how many were closed
    pub fn clear(&self) -> usize {
        let drained: Vec<AnnotationSession> =
            self.sessions.write().drain().map(|(_, s)| s).collect();
        for session in &drained {
            session.close();
        }
        drained.len()
    }
}
