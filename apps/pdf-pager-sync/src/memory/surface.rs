//! In-memory editing surface
//!
//! Mimics the behaviour of the viewer's annotation editor that matters for
//! synchronization: deserialized objects are treated as pastes (selected, and
//! offset by their own size when added), and adding or unselecting them
//! reports edit-state changes on the viewer bus.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::annotations::{AnnotationDescriptor, AnnotationKind, EditorMode};
use crate::events::EventBus;
use crate::surface::{AnnotationLayer, AnnotationObject, EditSurface, LiveObject, ViewerEvent};

#[derive(Debug)]
struct ObjectState {
    descriptor: AnnotationDescriptor,
    selected: bool,
    pasted: bool,
}

/// A live object held by a [`MemoryLayer`]
pub struct MemoryObject {
    page_number: u32,
    state: Mutex<ObjectState>,
    refuses_serialization: bool,
    layer: Mutex<Weak<MemoryLayer>>,
}

impl MemoryObject {
    /// A drawn, unselected object not yet attached to any layer
    pub fn new(page_number: u32, descriptor: AnnotationDescriptor) -> Self {
        Self {
            page_number,
            state: Mutex::new(ObjectState {
                descriptor,
                selected: false,
                pasted: false,
            }),
            refuses_serialization: false,
            layer: Mutex::new(Weak::new()),
        }
    }

    /// An object whose serializer returns nothing, like an empty ink editor
    pub fn refusing_serialization(mut self) -> Self {
        self.refuses_serialization = true;
        self
    }

    fn pasted(
        page_number: u32,
        descriptor: AnnotationDescriptor,
        layer: Weak<MemoryLayer>,
    ) -> Self {
        Self {
            page_number,
            state: Mutex::new(ObjectState {
                descriptor,
                selected: true,
                pasted: true,
            }),
            refuses_serialization: false,
            layer: Mutex::new(layer),
        }
    }

    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    /// Current state, including position
    pub fn descriptor(&self) -> AnnotationDescriptor {
        self.state.lock().descriptor.clone()
    }
}

impl AnnotationObject for MemoryObject {
    fn serialize(&self) -> Option<AnnotationDescriptor> {
        if self.refuses_serialization {
            return None;
        }
        Some(self.descriptor())
    }

    fn position(&self) -> (f64, f64) {
        let state = self.state.lock();
        (state.descriptor.x, state.descriptor.y)
    }

    fn set_position(&self, x: f64, y: f64) {
        let mut state = self.state.lock();
        state.descriptor.x = x;
        state.descriptor.y = y;
    }

    fn size(&self) -> (f64, f64) {
        self.state.lock().descriptor.size()
    }

    fn is_selected(&self) -> bool {
        self.state.lock().selected
    }

    fn unselect(&self) {
        let was_selected = std::mem::replace(&mut self.state.lock().selected, false);
        if !was_selected {
            return;
        }
        let layer = self.layer.lock().upgrade();
        if let Some(layer) = layer {
            layer.emit_edit_state(false);
        }
    }

    fn remove(&self) {
        let layer = self.layer.lock().upgrade();
        if let Some(layer) = layer {
            layer.detach(self);
        }
    }
}

/// The editor layer of one rendered page
pub struct MemoryLayer {
    page_number: u32,
    this: Weak<MemoryLayer>,
    objects: Mutex<Vec<Arc<MemoryObject>>>,
    /// Deserialized but not yet added
    staged: Mutex<Vec<Arc<MemoryObject>>>,
    events: Arc<EventBus<ViewerEvent>>,
}

impl MemoryLayer {
    fn new(page_number: u32, events: Arc<EventBus<ViewerEvent>>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            page_number,
            this: this.clone(),
            objects: Mutex::new(Vec::new()),
            staged: Mutex::new(Vec::new()),
            events,
        })
    }

    pub fn objects(&self) -> Vec<Arc<MemoryObject>> {
        self.objects.lock().clone()
    }

    /// Add an object directly, as the user drawing it would
    pub fn insert(&self, descriptor: AnnotationDescriptor) -> Arc<MemoryObject> {
        let object = Arc::new(MemoryObject::new(self.page_number, descriptor));
        *object.layer.lock() = self.this.clone();
        self.objects.lock().push(Arc::clone(&object));
        object
    }

    fn detach(&self, object: &MemoryObject) {
        self.objects
            .lock()
            .retain(|candidate| !std::ptr::eq(Arc::as_ptr(candidate), object));
    }

    fn emit_edit_state(&self, is_editing: bool) {
        self.events.emit(&ViewerEvent::EditStateChanged { is_editing });
    }
}

impl AnnotationLayer for MemoryLayer {
    fn page_number(&self) -> u32 {
        self.page_number
    }

    fn deserialize(&self, descriptor: &AnnotationDescriptor) -> Option<LiveObject> {
        if let AnnotationKind::Other(kind) = &descriptor.kind {
            tracing::debug!(page = self.page_number, kind = %kind, "No editor for annotation kind");
            return None;
        }
        let object = Arc::new(MemoryObject::pasted(
            self.page_number,
            descriptor.clone(),
            self.this.clone(),
        ));
        self.staged.lock().push(Arc::clone(&object));
        Some(object as LiveObject)
    }

    fn add(&self, object: LiveObject) {
        let target = Arc::as_ptr(&object) as *const ();
        let staged = {
            let mut staged = self.staged.lock();
            staged
                .iter()
                .position(|candidate| Arc::as_ptr(candidate) as *const () == target)
                .map(|index| staged.remove(index))
        };
        let Some(object) = staged else {
            tracing::warn!(page = self.page_number, "Ignoring object from another layer");
            return;
        };

        let pasted = {
            let mut state = object.state.lock();
            let pasted = std::mem::replace(&mut state.pasted, false);
            if pasted {
                let (width, height) = state.descriptor.size();
                state.descriptor.x += width;
                state.descriptor.y += height;
            }
            pasted
        };
        self.objects.lock().push(object);

        if pasted {
            self.emit_edit_state(true);
        }
    }
}

/// In-memory [`EditSurface`]
pub struct MemorySurface {
    page_count: u32,
    layers: RwLock<BTreeMap<u32, Arc<MemoryLayer>>>,
    modes: Mutex<Vec<EditorMode>>,
    events: Arc<EventBus<ViewerEvent>>,
}

impl MemorySurface {
    pub(crate) fn new(page_count: u32, events: Arc<EventBus<ViewerEvent>>) -> Self {
        Self {
            page_count,
            layers: RwLock::new(BTreeMap::new()),
            modes: Mutex::new(Vec::new()),
            events,
        }
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Create the layer for a page if it has not rendered before
    pub fn ensure_layer(&self, page_number: u32) -> Arc<MemoryLayer> {
        let mut layers = self.layers.write();
        let layer = layers
            .entry(page_number)
            .or_insert_with(|| MemoryLayer::new(page_number, Arc::clone(&self.events)));
        Arc::clone(layer)
    }

    pub fn objects(&self, page_number: u32) -> Vec<Arc<MemoryObject>> {
        self.layers
            .read()
            .get(&page_number)
            .map(|layer| layer.objects())
            .unwrap_or_default()
    }

    /// Add an object without any edit-state events
    pub fn add_object(
        &self,
        page_number: u32,
        descriptor: AnnotationDescriptor,
    ) -> Arc<MemoryObject> {
        self.ensure_layer(page_number).insert(descriptor)
    }

    /// Mode most recently set, `None` if never set
    pub fn current_mode(&self) -> EditorMode {
        self.modes.lock().last().copied().unwrap_or(EditorMode::None)
    }

    pub fn mode_history(&self) -> Vec<EditorMode> {
        self.modes.lock().clone()
    }
}

impl EditSurface for MemorySurface {
    fn objects_on_page(&self, page_number: u32) -> Vec<LiveObject> {
        self.objects(page_number)
            .into_iter()
            .map(|object| object as LiveObject)
            .collect()
    }

    fn layer(&self, page_number: u32) -> Option<Arc<dyn AnnotationLayer>> {
        self.layers
            .read()
            .get(&page_number)
            .map(|layer| Arc::clone(layer) as Arc<dyn AnnotationLayer>)
    }

    fn loaded_pages(&self) -> Vec<u32> {
        self.layers.read().keys().copied().collect()
    }

    fn set_global_mode(&self, mode: EditorMode) {
        self.modes.lock().push(mode);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventSource;
    use crate::surface::ViewerEventKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn surface() -> (MemorySurface, Arc<AtomicUsize>) {
        let events: Arc<EventBus<ViewerEvent>> = Arc::new(EventBus::new());
        let edits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&edits);
        events.subscribe(
            ViewerEventKind::EditStateChanged,
            Arc::new(move |_: &ViewerEvent| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        (MemorySurface::new(3, events), edits)
    }

    #[test]
    fn test_paste_is_offset_by_size() {
        let (surface, edits) = surface();
        let layer = surface.ensure_layer(1);
        let descriptor =
            AnnotationDescriptor::new(AnnotationKind::Ink, 10.0, 20.0).with_size(5.0, 4.0);

        let object = layer.deserialize(&descriptor).unwrap();
        assert!(object.is_selected());
        layer.add(Arc::clone(&object));
        assert_eq!(object.position(), (15.0, 24.0));

        object.unselect();
        object.unselect();
        assert_eq!(edits.load(Ordering::SeqCst), 2);
        assert_eq!(surface.objects(1).len(), 1);
    }

    #[test]
    fn test_unknown_kind_is_not_deserialized() {
        let (surface, _) = surface();
        let layer = surface.ensure_layer(1);
        let descriptor =
            AnnotationDescriptor::new(AnnotationKind::Other("signature".into()), 0.0, 0.0);
        assert!(layer.deserialize(&descriptor).is_none());
    }

    #[test]
    fn test_remove_detaches_only_that_object() {
        let (surface, _) = surface();
        let first =
            surface.add_object(2, AnnotationDescriptor::new(AnnotationKind::Stamp, 1.0, 1.0));
        surface.add_object(2, AnnotationDescriptor::new(AnnotationKind::Stamp, 2.0, 2.0));

        first.remove();
        let left = surface.objects(2);
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].descriptor().x, 2.0);
        assert_eq!(surface.loaded_pages(), vec![2]);
        assert!(surface.layer(1).is_none());
    }
}
