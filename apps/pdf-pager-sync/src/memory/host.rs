//! In-memory host document store
//!
//! Documents are JSON property trees addressed by dotted paths. Every client
//! shares the same trees and event bus but writes under its own actor id, so
//! several clients on one host behave like several users of one world.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tokio::sync::Notify;

use crate::error::HostError;
use crate::events::{EventBus, EventSource};
use crate::host::{
    DocumentId, DocumentRef, DocumentUpdate, HostEvent, HostEventKind, HostStore, RecordKind,
    SheetKind, UpdateBatch, UpdateOptions,
};

pub struct MemoryHost {
    documents: RwLock<HashMap<DocumentId, Value>>,
    events: Arc<EventBus<HostEvent>>,
    reject_updates: AtomicBool,
    paused: AtomicBool,
    resumed: Notify,
    update_count: AtomicUsize,
    notifications: Mutex<Vec<String>>,
    last_options: Mutex<Option<UpdateOptions>>,
}

impl MemoryHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            documents: RwLock::new(HashMap::new()),
            events: Arc::new(EventBus::new()),
            reject_updates: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            resumed: Notify::new(),
            update_count: AtomicUsize::new(0),
            notifications: Mutex::new(Vec::new()),
            last_options: Mutex::new(None),
        })
    }

    /// A store handle that writes as `actor_id`
    pub fn client(self: &Arc<Self>, actor_id: &str) -> Arc<dyn HostStore> {
        Arc::new(MemoryHostClient {
            host: Arc::clone(self),
            actor_id: actor_id.to_string(),
        })
    }

    pub fn events(&self) -> Arc<dyn EventSource<HostEvent>> {
        self.events.clone()
    }

    pub fn register(&self, document: &DocumentRef) {
        self.documents
            .write()
            .entry(document.id)
            .or_insert_with(|| Value::Object(Map::new()));
    }

    /// Write a property directly, without an update notification
    pub fn set_property(&self, document: DocumentId, path: &str, value: Value) {
        let mut documents = self.documents.write();
        let root = documents
            .entry(document)
            .or_insert_with(|| Value::Object(Map::new()));
        if let Err(e) = set_path(root, path, value) {
            tracing::warn!(document_id = %document, error = %e, "Could not set property");
        }
    }

    pub fn property(&self, document: DocumentId, path: &str) -> Option<Value> {
        let documents = self.documents.read();
        let mut node = documents.get(&document)?;
        for segment in path.split('.') {
            node = node.as_object()?.get(segment)?;
        }
        Some(node.clone())
    }

    /// Emit a sheet-closed notification
    pub fn close_sheet(&self, sheet: SheetKind, document: DocumentId) -> usize {
        self.events.emit(&HostEvent::SheetClosed { sheet, document })
    }

    pub fn set_reject_updates(&self, reject: bool) {
        self.reject_updates.store(reject, Ordering::SeqCst);
    }

    /// Hold every `update` before it applies, until [`resume_updates`](Self::resume_updates)
    pub fn pause_updates(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume_updates(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.resumed.notify_waiters();
    }

    async fn wait_until_resumed(&self) {
        loop {
            let resumed = self.resumed.notified();
            if !self.paused.load(Ordering::SeqCst) {
                return;
            }
            resumed.await;
        }
    }

    /// Number of `update` calls, accepted or not
    pub fn update_count(&self) -> usize {
        self.update_count.load(Ordering::SeqCst)
    }

    pub fn last_options(&self) -> Option<UpdateOptions> {
        *self.last_options.lock()
    }

    /// Messages shown to the user so far
    pub fn notifications(&self) -> Vec<String> {
        self.notifications.lock().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        RecordKind::ALL
            .iter()
            .map(|kind| HostEventKind::Updated(*kind))
            .chain(SheetKind::ALL.iter().map(|sheet| HostEventKind::Closed(*sheet)))
            .map(|kind| self.events.subscriber_count(kind))
            .sum()
    }
}

fn set_path(root: &mut Value, path: &str, value: Value) -> Result<(), HostError> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(HostError::InvalidPath(path.to_string()));
    }
    let Some((last, parents)) = segments.split_last() else {
        return Err(HostError::InvalidPath(path.to_string()));
    };

    let mut node = root;
    for segment in parents {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Value::Object(map) = node else {
            return Err(HostError::InvalidPath(path.to_string()));
        };
        node = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    match node {
        Value::Object(map) => {
            map.insert(last.to_string(), value);
            Ok(())
        }
        _ => Err(HostError::InvalidPath(path.to_string())),
    }
}

/// One actor's view of a [`MemoryHost`]
pub struct MemoryHostClient {
    host: Arc<MemoryHost>,
    actor_id: String,
}

#[async_trait]
impl HostStore for MemoryHostClient {
    fn get_property(&self, document: DocumentId, path: &str) -> Option<Value> {
        self.host.property(document, path)
    }

    async fn update(
        &self,
        document: &DocumentRef,
        batch: UpdateBatch,
        options: UpdateOptions,
    ) -> Result<(), HostError> {
        let host = &self.host;
        host.update_count.fetch_add(1, Ordering::SeqCst);
        host.wait_until_resumed().await;
        if host.reject_updates.load(Ordering::SeqCst) {
            return Err(HostError::Rejected(format!(
                "{} may not modify {}",
                self.actor_id, document.name
            )));
        }

        {
            let mut documents = host.documents.write();
            let root = documents
                .get_mut(&document.id)
                .ok_or_else(|| HostError::DocumentNotFound(document.id.to_string()))?;
            for (path, value) in batch.iter() {
                set_path(root, path, value.clone())?;
            }
        }
        *host.last_options.lock() = Some(options);

        let update = DocumentUpdate {
            document: document.clone(),
            changed_paths: batch.paths().map(str::to_string).collect(),
            options,
            actor_id: self.actor_id.clone(),
        };
        host.events.emit(&HostEvent::Updated(update));
        Ok(())
    }

    fn notify_error(&self, message: &str) {
        tracing::error!(actor = %self.actor_id, "{}", message);
        self.host.notifications.lock().push(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dotted_paths() {
        let host = MemoryHost::new();
        let doc = DocumentId::new();
        host.set_property(doc, "flags.pdf-pager.objects.page1", json!("[]"));
        host.set_property(doc, "flags.pdf-pager.pageOffset", json!(2));

        assert_eq!(host.property(doc, "flags.pdf-pager.objects.page1"), Some(json!("[]")));
        assert_eq!(host.property(doc, "flags.pdf-pager.pageOffset"), Some(json!(2)));
        assert_eq!(host.property(doc, "flags.pdf-pager.objects.page2"), None);
        assert_eq!(host.property(doc, "flags.pdf-pager.pageOffset.x"), None);
        assert!(set_path(&mut json!({}), "a..b", json!(1)).is_err());
    }

    #[tokio::test]
    async fn test_update_notifies_with_actor_and_paths() {
        let host = MemoryHost::new();
        let doc = DocumentRef::new(RecordKind::Item, "Scroll");
        host.register(&doc);

        let seen: Arc<Mutex<Vec<DocumentUpdate>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        host.events().subscribe(
            HostEventKind::Updated(RecordKind::Item),
            Arc::new(move |event: &HostEvent| {
                if let HostEvent::Updated(update) = event {
                    sink.lock().push(update.clone());
                }
            }),
        );

        let mut batch = UpdateBatch::new();
        batch.set_property("flags.pdf-pager.objects.page3", json!(""));
        host.client("player")
            .update(&doc, batch, UpdateOptions::annotation_flush())
            .await
            .unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].actor_id, "player");
        assert_eq!(seen[0].changed_paths, vec!["flags.pdf-pager.objects.page3"]);
        assert!(seen[0].options.update_pdf_editors);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_update_waits_for_resume() {
        let host = MemoryHost::new();
        let doc = DocumentRef::new(RecordKind::Item, "Scroll");
        host.register(&doc);
        host.pause_updates();

        let client = host.client("gm");
        let target = doc.clone();
        let pending = tokio::spawn(async move {
            let mut batch = UpdateBatch::new();
            batch.set_property("flags.pdf-pager.objects.page1", json!("[]"));
            client.update(&target, batch, UpdateOptions::annotation_flush()).await
        });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(host.update_count(), 1);
        assert!(!pending.is_finished());
        assert_eq!(host.property(doc.id, "flags.pdf-pager.objects.page1"), None);

        host.resume_updates();
        pending.await.unwrap().unwrap();
        assert_eq!(host.property(doc.id, "flags.pdf-pager.objects.page1"), Some(json!("[]")));
    }

    #[tokio::test]
    async fn test_unknown_document_and_rejection() {
        let host = MemoryHost::new();
        let client = host.client("gm");
        let doc = DocumentRef::new(RecordKind::Actor, "Ghost");

        let err = client
            .update(&doc, UpdateBatch::new(), UpdateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::DocumentNotFound(_)));

        host.register(&doc);
        host.set_reject_updates(true);
        let err = client
            .update(&doc, UpdateBatch::new(), UpdateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::Rejected(_)));
        assert_eq!(host.update_count(), 2);
    }
}
