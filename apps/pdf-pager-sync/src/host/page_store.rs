//! Per-page blob storage on host documents
//!
//! Each page's blob lives at `flags.<namespace>.objects.page<N>`. Writes are
//! staged into an [`UpdateBatch`] and committed together as one host update
//! carrying the annotation-flush marker.

use std::sync::Arc;

use serde_json::Value;

use super::{DocumentRef, HostStore, UpdateBatch, UpdateOptions};
use crate::error::HostError;

#[derive(Clone)]
pub struct PageStore {
    host: Arc<dyn HostStore>,
    objects_path: String,
}

impl PageStore {
    pub fn new(host: Arc<dyn HostStore>, namespace: &str) -> Self {
        Self {
            host,
            objects_path: format!("flags.{}.objects", namespace),
        }
    }

    pub fn host(&self) -> &Arc<dyn HostStore> {
        &self.host
    }

    /// Property path of a page's blob
    pub fn path(&self, page_number: u32) -> String {
        format!("{}.page{}", self.objects_path, page_number)
    }

    /// Page number addressed by a property path, if it is a page blob path
    pub fn page_from_path(&self, path: &str) -> Option<u32> {
        path.strip_prefix(self.objects_path.as_str())?
            .strip_prefix(".page")?
            .parse()
            .ok()
            .filter(|page| *page > 0)
    }

    /// Stored blob for a page; absent when never written
    pub fn read(&self, document: &DocumentRef, page_number: u32) -> Option<String> {
        match self.host.get_property(document.id, &self.path(page_number))? {
            Value::String(blob) => Some(blob),
            Value::Null => None,
            other => {
                tracing::warn!(
                    document_id = %document.id,
                    page = page_number,
                    "Ignoring non-string annotation blob: {}",
                    other
                );
                None
            }
        }
    }

    /// Stage `blob` into `batch` unless the stored value already matches
    ///
    /// An absent blob and `""` both mean "no annotations" and compare equal,
    /// unlike a plain value comparison where absent differs from `""`. A page
    /// that never had annotations is therefore not written as `""` on every
    /// first flush, and other sessions are not asked to reload it.
    pub fn write_if_changed(
        &self,
        batch: &mut UpdateBatch,
        document: &DocumentRef,
        page_number: u32,
        blob: String,
    ) -> bool {
        let stored = self.read(document, page_number).unwrap_or_default();
        if stored == blob {
            return false;
        }

        tracing::debug!(
            document_id = %document.id,
            page = page_number,
            bytes = blob.len(),
            "Staging annotation blob"
        );
        batch.set_property(&self.path(page_number), Value::String(blob));
        true
    }

    /// Issue one host update for everything staged; no-op for an empty batch
    pub async fn commit(
        &self,
        document: &DocumentRef,
        batch: UpdateBatch,
    ) -> Result<usize, HostError> {
        if batch.is_empty() {
            return Ok(0);
        }
        let pages = batch.len();
        self.host
            .update(document, batch, UpdateOptions::annotation_flush())
            .await?;
        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::RecordKind;
    use crate::memory::MemoryHost;

    fn setup() -> (Arc<MemoryHost>, PageStore, DocumentRef) {
        let host = MemoryHost::new();
        let store = PageStore::new(host.client("gm"), "pdf-pager");
        let doc = DocumentRef::new(RecordKind::JournalEntryPage, "Rulebook");
        host.register(&doc);
        (host, store, doc)
    }

    #[test]
    fn test_paths() {
        let (_, store, _) = setup();
        assert_eq!(store.path(5), "flags.pdf-pager.objects.page5");
        assert_eq!(store.page_from_path("flags.pdf-pager.objects.page12"), Some(12));
        assert_eq!(store.page_from_path("flags.pdf-pager.objects.page0"), None);
        assert_eq!(store.page_from_path("flags.pdf-pager.pageOffset"), None);
        assert_eq!(store.page_from_path("flags.other.objects.page3"), None);
        assert_eq!(store.page_from_path("flags.pdf-pager.objects.pagex"), None);
    }

    #[test]
    fn test_read_missing_is_absent() {
        let (host, store, doc) = setup();
        assert_eq!(store.read(&doc, 1), None);

        host.set_property(doc.id, "flags.pdf-pager.objects.page1", Value::String(String::new()));
        assert_eq!(store.read(&doc, 1), Some(String::new()));
    }

    #[test]
    fn test_write_if_changed() {
        let (host, store, doc) = setup();
        host.set_property(doc.id, &store.path(2), Value::String("[1]".to_string()));

        let mut batch = UpdateBatch::new();
        assert!(!store.write_if_changed(&mut batch, &doc, 1, String::new()));
        assert!(!store.write_if_changed(&mut batch, &doc, 2, "[1]".to_string()));
        assert!(batch.is_empty());

        assert!(store.write_if_changed(&mut batch, &doc, 2, String::new()));
        assert!(store.write_if_changed(&mut batch, &doc, 3, "[2]".to_string()));
        assert_eq!(batch.len(), 2);
    }

    #[tokio::test]
    async fn test_commit_is_one_marked_update() {
        let (host, store, doc) = setup();

        assert_eq!(store.commit(&doc, UpdateBatch::new()).await.unwrap(), 0);
        assert_eq!(host.update_count(), 0);

        let mut batch = UpdateBatch::new();
        store.write_if_changed(&mut batch, &doc, 1, "[1]".to_string());
        store.write_if_changed(&mut batch, &doc, 4, "[4]".to_string());
        assert_eq!(store.commit(&doc, batch).await.unwrap(), 2);

        assert_eq!(host.update_count(), 1);
        assert_eq!(store.read(&doc, 4).as_deref(), Some("[4]"));
        let last = host.last_options().unwrap();
        assert!(last.update_pdf_editors);
        assert!(!last.render);
    }
}
