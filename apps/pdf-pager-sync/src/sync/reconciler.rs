//! Remote update reconciliation
//!
//! Replays annotation writes made by other actors into the local session
//! viewing the same document, and tears sessions down when their viewer's
//! sheet closes.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::registry::SessionRegistry;
use crate::host::{DocumentId, DocumentUpdate, HostEvent, SheetKind};

/// What an update notification led to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// No session for the document
    NoSession,
    /// The session's viewer was gone; the session was deleted
    CleanedUp,
    /// Not produced by an annotation flush
    NotAnnotationWrite,
    /// Our own write coming back
    SelfEcho,
    /// Marked, but no page blob paths changed
    NoPageChanges,
    /// These pages were replaced from the store
    Reloaded(Vec<u32>),
}

pub struct RemoteReconciler {
    registry: Arc<SessionRegistry>,
    actor_id: String,
}

impl RemoteReconciler {
    pub fn new(registry: Arc<SessionRegistry>, actor_id: String) -> Self {
        Self { registry, actor_id }
    }

    pub fn handle(&self, event: &HostEvent) {
        match event {
            HostEvent::Updated(update) => {
                self.on_document_updated(update);
            }
            HostEvent::SheetClosed { sheet, document } => {
                self.on_sheet_closed(*sheet, *document);
            }
        }
    }

    pub fn on_document_updated(&self, update: &DocumentUpdate) -> ReconcileOutcome {
        let document_id = update.document.id;
        let Some(session) = self.registry.lookup(document_id) else {
            return ReconcileOutcome::NoSession;
        };

        if !session.viewer_rendered() {
            tracing::debug!(
                document_id = %document_id,
                "Viewer no longer rendered, dropping session"
            );
            self.registry.delete(&session);
            return ReconcileOutcome::CleanedUp;
        }

        if !update.options.update_pdf_editors {
            return ReconcileOutcome::NotAnnotationWrite;
        }

        // Replaying our own write would clobber edits made since it was taken
        if update.actor_id == self.actor_id {
            return ReconcileOutcome::SelfEcho;
        }

        let pages = session.pages_changed(&update.changed_paths);
        if pages.is_empty() {
            return ReconcileOutcome::NoPageChanges;
        }

        tracing::debug!(
            document_id = %document_id,
            actor = %update.actor_id,
            pages = ?pages,
            "Applying remote annotation update"
        );
        session.reload_pages(&pages);
        ReconcileOutcome::Reloaded(pages)
    }

    /// Delete every session shown inside the closed sheet
    ///
    /// Returns how many sessions were deleted.
    pub fn on_sheet_closed(&self, sheet: SheetKind, document: DocumentId) -> usize {
        let sessions = self.registry.find_for_container(document);
        let deleted = sessions
            .iter()
            .filter(|session| self.registry.delete(session))
            .count();
        if deleted > 0 {
            tracing::debug!(sheet = ?sheet, document_id = %document, deleted, "Sheet closed");
        }
        deleted
    }
}

/// Distinct page numbers addressed by `paths`, in ascending order
pub(crate) fn changed_pages<'a>(
    paths: impl IntoIterator<Item = &'a String>,
    page_from_path: impl Fn(&str) -> Option<u32>,
) -> Vec<u32> {
    paths
        .into_iter()
        .filter_map(|path| page_from_path(path.as_str()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::host::{DocumentRef, PageStore, RecordKind, UpdateOptions};
    use crate::memory::{MemoryHost, MemoryViewer};

    struct Fixture {
        registry: Arc<SessionRegistry>,
        reconciler: RemoteReconciler,
        viewer: Arc<MemoryViewer>,
        doc: DocumentRef,
    }

    fn fixture() -> Fixture {
        let host = MemoryHost::new();
        let config = SyncConfig::default();
        let pages = PageStore::new(host.client("gm"), &config.namespace);
        let registry = Arc::new(SessionRegistry::new(pages, config));
        let doc = DocumentRef::new(RecordKind::JournalEntryPage, "Rulebook");
        host.register(&doc);
        let viewer = MemoryViewer::new(4);
        registry.create(doc.clone(), viewer.clone(), true);
        viewer.acquire_surface();
        viewer.render_pages(1..=4);

        Fixture {
            reconciler: RemoteReconciler::new(Arc::clone(&registry), "gm".to_string()),
            registry,
            viewer,
            doc,
        }
    }

    fn update(doc: &DocumentRef, actor: &str, marked: bool, paths: &[&str]) -> DocumentUpdate {
        DocumentUpdate {
            document: doc.clone(),
            changed_paths: paths.iter().map(|p| p.to_string()).collect(),
            options: if marked {
                UpdateOptions::annotation_flush()
            } else {
                UpdateOptions::default()
            },
            actor_id: actor.to_string(),
        }
    }

    const PAGE_3: &str = "flags.pdf-pager.objects.page3";

    #[test]
    fn test_changed_pages_are_distinct_and_sorted() {
        let paths: Vec<String> = ["p7", "p2", "x", "p7"].iter().map(|s| s.to_string()).collect();
        let pages = changed_pages(&paths, |p| p.strip_prefix('p').and_then(|n| n.parse().ok()));
        assert_eq!(pages, vec![2, 7]);
    }

    #[tokio::test]
    async fn test_update_filters() {
        let f = fixture();
        let other = DocumentRef::new(RecordKind::Item, "Elsewhere");

        assert_eq!(
            f.reconciler.on_document_updated(&update(&other, "player", true, &[PAGE_3])),
            ReconcileOutcome::NoSession
        );
        assert_eq!(
            f.reconciler.on_document_updated(&update(&f.doc, "player", false, &[PAGE_3])),
            ReconcileOutcome::NotAnnotationWrite
        );
        assert_eq!(
            f.reconciler.on_document_updated(&update(&f.doc, "gm", true, &[PAGE_3])),
            ReconcileOutcome::SelfEcho
        );
        assert_eq!(
            f.reconciler.on_document_updated(&update(&f.doc, "player", true, &["name"])),
            ReconcileOutcome::NoPageChanges
        );
        assert_eq!(
            f.reconciler.on_document_updated(&update(&f.doc, "player", true, &["name", PAGE_3])),
            ReconcileOutcome::Reloaded(vec![3])
        );
    }

    #[tokio::test]
    async fn test_lazy_cleanup_when_viewer_gone() {
        let f = fixture();
        f.viewer.close();

        assert_eq!(
            f.reconciler.on_document_updated(&update(&f.doc, "player", true, &[PAGE_3])),
            ReconcileOutcome::CleanedUp
        );
        assert!(f.registry.is_empty());
        assert_eq!(f.viewer.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_sheet_close_deletes_contained_sessions() {
        let f = fixture();
        assert_eq!(f.reconciler.on_sheet_closed(SheetKind::Journal, DocumentId::new()), 0);
        assert_eq!(f.registry.len(), 1);

        f.reconciler.handle(&HostEvent::SheetClosed {
            sheet: SheetKind::PdfPage,
            document: f.doc.id,
        });
        assert!(f.registry.is_empty());
        assert_eq!(f.viewer.subscriber_count(), 0);
    }
}
