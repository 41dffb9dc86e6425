//! Host document store capability
//!
//! The host application owns the documents (journal pages, actors, items) a
//! PDF viewer is attached to. The sync engine reads and writes nested
//! properties on them and listens for their update notifications.

mod page_store;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::HostError;
use crate::events::Event;

pub use page_store::PageStore;

/// Identity of a host document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(Uuid);

impl DocumentId {
    pub fn new() -> Self {
        DocumentId(Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Host record kinds that can carry a PDF viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordKind {
    JournalEntryPage,
    Actor,
    Item,
}

impl RecordKind {
    pub const ALL: [RecordKind; 3] =
        [RecordKind::JournalEntryPage, RecordKind::Actor, RecordKind::Item];
}

/// Sheets whose closing tears down the viewers they contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SheetKind {
    /// A whole journal; closes every page viewer inside it
    Journal,
    /// A single PDF journal page
    PdfPage,
}

impl SheetKind {
    pub const ALL: [SheetKind; 2] = [SheetKind::Journal, SheetKind::PdfPage];
}

/// A host document as seen by the sync engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRef {
    pub id: DocumentId,
    pub kind: RecordKind,
    pub name: String,
    /// Containing document (the journal of a journal page)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<DocumentId>,
    /// Whether the current actor owns this document
    #[serde(rename = "isOwner")]
    pub is_owner: bool,
    /// Whether the compendium pack holding this document is locked
    #[serde(rename = "packLocked")]
    pub pack_locked: bool,
    /// Whether the compendium pack holding the parent is locked
    #[serde(rename = "parentPackLocked")]
    pub parent_pack_locked: bool,
}

impl DocumentRef {
    /// An owned, unlocked document
    pub fn new(kind: RecordKind, name: &str) -> Self {
        Self {
            id: DocumentId::new(),
            kind,
            name: name.to_string(),
            parent: None,
            is_owner: true,
            pack_locked: false,
            parent_pack_locked: false,
        }
    }

    pub fn with_parent(mut self, parent: DocumentId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_owner(mut self, is_owner: bool) -> Self {
        self.is_owner = is_owner;
        self
    }

    pub fn with_pack_locked(mut self, locked: bool) -> Self {
        self.pack_locked = locked;
        self
    }

    /// Owner, and neither this document's pack nor its parent's is locked
    pub fn is_editable(&self) -> bool {
        self.is_owner && !self.pack_locked && !self.parent_pack_locked
    }

    /// Whether closing a sheet for `container` should close this document's viewer
    pub fn is_contained_by(&self, container: DocumentId) -> bool {
        self.id == container || self.parent == Some(container)
    }
}

/// A multi-path property update applied atomically by the host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateBatch {
    changes: BTreeMap<String, Value>,
}

impl UpdateBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_property(&mut self, path: &str, value: Value) {
        self.changes.insert(path.to_string(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.changes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.changes.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Options passed along with an update and echoed to every observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOptions {
    /// Whether the host should re-render sheets for this update
    pub render: bool,
    /// Set on every write produced by an annotation flush
    #[serde(rename = "updatePdfEditors")]
    pub update_pdf_editors: bool,
}

impl UpdateOptions {
    /// Options for an annotation flush: no re-render, marked for editors
    pub fn annotation_flush() -> Self {
        Self {
            render: false,
            update_pdf_editors: true,
        }
    }
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            render: true,
            update_pdf_editors: false,
        }
    }
}

/// A host "document updated" notification
#[derive(Debug, Clone)]
pub struct DocumentUpdate {
    pub document: DocumentRef,
    /// Full dotted paths of every property the update changed
    pub changed_paths: Vec<String>,
    pub options: UpdateOptions,
    /// Actor whose write produced this update
    pub actor_id: String,
}

/// Host notifications the sync engine listens to
#[derive(Debug, Clone)]
pub enum HostEvent {
    Updated(DocumentUpdate),
    /// A sheet showing `document` was closed
    SheetClosed { sheet: SheetKind, document: DocumentId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostEventKind {
    Updated(RecordKind),
    Closed(SheetKind),
}

impl Event for HostEvent {
    type Kind = HostEventKind;

    fn kind(&self) -> HostEventKind {
        match self {
            HostEvent::Updated(update) => HostEventKind::Updated(update.document.kind),
            HostEvent::SheetClosed { sheet, .. } => HostEventKind::Closed(*sheet),
        }
    }
}

/// Host document store
#[async_trait]
pub trait HostStore: Send + Sync {
    /// Value at a dotted property path, absent if any segment is missing
    fn get_property(&self, document: DocumentId, path: &str) -> Option<Value>;

    /// Apply a batch atomically and notify every observer of the document
    async fn update(
        &self,
        document: &DocumentRef,
        batch: UpdateBatch,
        options: UpdateOptions,
    ) -> Result<(), HostError>;

    /// Non-fatal notification shown to the user
    fn notify_error(&self, message: &str) {
        tracing::error!("{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_editability() {
        let doc = DocumentRef::new(RecordKind::JournalEntryPage, "Rulebook");
        assert!(doc.is_editable());
        assert!(!doc.clone().with_owner(false).is_editable());
        assert!(!doc.clone().with_pack_locked(true).is_editable());

        let mut in_locked_journal = doc;
        in_locked_journal.parent_pack_locked = true;
        assert!(!in_locked_journal.is_editable());
    }

    #[test]
    fn test_containment() {
        let journal = DocumentId::new();
        let page = DocumentRef::new(RecordKind::JournalEntryPage, "Map").with_parent(journal);
        assert!(page.is_contained_by(journal));
        assert!(page.is_contained_by(page.id));
        assert!(!page.is_contained_by(DocumentId::new()));
    }

    #[test]
    fn test_flush_options_serialize_marker() {
        let json = serde_json::to_value(UpdateOptions::annotation_flush()).unwrap();
        assert_eq!(json["updatePdfEditors"], Value::Bool(true));
        assert_eq!(json["render"], Value::Bool(false));
    }

    #[test]
    fn test_event_kind_routes_by_record() {
        let update = DocumentUpdate {
            document: DocumentRef::new(RecordKind::Actor, "Hero"),
            changed_paths: vec![],
            options: UpdateOptions::default(),
            actor_id: "gm".to_string(),
        };
        assert_eq!(
            HostEvent::Updated(update).kind(),
            HostEventKind::Updated(RecordKind::Actor)
        );
    }
}
