use egui::{Pos2, Vec2};

use super::persistence::{KeyValueStorage, PersistenceError};
use crate::asset::{AssetCatalog, AssetDescriptor};
use crate::config::{LayerDefaults, STORAGE_KEY};
use crate::layer::{AxisPatch, Layer, LayerId, LayerKind, LayerPatch, TransformTarget};

/// Owns the ordered layer sequence. Index order is paint order, last on top.
///
/// Every mutation writes the full sequence to storage before returning. A failed write is
/// logged and remembered, but the in-memory sequence is updated regardless.
pub struct LayerStore {
    layers: Vec<Layer>,
    storage: Box<dyn KeyValueStorage>,
    storage_key: String,
    defaults: LayerDefaults,
    last_persistence_error: Option<String>,
}

impl std::fmt::Debug for LayerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerStore")
            .field("layers", &self.layers.len())
            .field("storage_key", &self.storage_key)
            .field("last_persistence_error", &self.last_persistence_error)
            .finish()
    }
}

impl LayerStore {
    /// An empty store that persists under the default key
    pub fn new(storage: Box<dyn KeyValueStorage>) -> Self {
        Self::with_key(storage, STORAGE_KEY, LayerDefaults::default())
    }

    pub fn with_key(storage: Box<dyn KeyValueStorage>, storage_key: &str, defaults: LayerDefaults) -> Self {
        Self {
            layers: Vec::new(),
            storage,
            storage_key: storage_key.to_owned(),
            defaults,
            last_persistence_error: None,
        }
    }

    /// Restore the sequence persisted under `storage_key`.
    ///
    /// Unreadable data is logged and yields an empty store. Image sources are re-linked
    /// against `catalog` when one is given.
    pub fn load(
        storage: Box<dyn KeyValueStorage>,
        storage_key: &str,
        defaults: LayerDefaults,
        catalog: Option<&AssetCatalog>,
    ) -> Self {
        let mut store = Self::with_key(storage, storage_key, defaults);
        let Some(raw) = store.storage.get(storage_key) else {
            return store;
        };

        match serde_json::from_str::<Vec<Layer>>(&raw) {
            Ok(mut layers) => {
                if let Some(catalog) = catalog {
                    relink_sources(&mut layers, catalog);
                }
                log::info!("Loaded {} layers from storage", layers.len());
                store.layers = layers;
            }
            Err(err) => {
                log::error!("Error loading layers from storage key {}: {}", storage_key, err);
            }
        }
        store
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn get(&self, id: &LayerId) -> Option<&Layer> {
        self.layers.iter().find(|layer| &layer.id == id)
    }

    pub fn index_of(&self, id: &LayerId) -> Option<usize> {
        self.layers.iter().position(|layer| &layer.id == id)
    }

    /// Locked layers stay visible and exported but take no pointer interaction
    pub fn is_interactive(&self, id: &LayerId) -> bool {
        self.get(id).is_some_and(|layer| !layer.locked)
    }

    pub fn defaults(&self) -> &LayerDefaults {
        &self.defaults
    }

    /// Backing storage, shared with preferences
    pub fn storage(&self) -> &dyn KeyValueStorage {
        self.storage.as_ref()
    }

    pub fn storage_mut(&mut self) -> &mut dyn KeyValueStorage {
        self.storage.as_mut()
    }

    /// Last storage failure, cleared by the next successful write
    pub fn last_persistence_error(&self) -> Option<&str> {
        self.last_persistence_error.as_deref()
    }

    /// Append a new layer built from `asset`; it paints on top of everything
    pub fn create(&mut self, asset: &AssetDescriptor, position: Option<Pos2>) -> Layer {
        let layer = Layer::from_asset(asset, position, &self.defaults);
        log::debug!("Creating {:?} layer {} from {}", layer.kind(), layer.id, asset.id);
        self.layers.push(layer.clone());
        self.persist();
        layer
    }

    /// Merge `patch` into the layer with `id`. Unknown ids are ignored.
    pub fn update(&mut self, id: &LayerId, patch: LayerPatch) {
        let Some(layer) = self.layers.iter_mut().find(|layer| &layer.id == id) else {
            return;
        };
        layer.apply(patch);
        self.persist();
    }

    /// Merge `patch` into either the position or the scale of the layer with `id`
    pub fn update_transform(&mut self, id: &LayerId, patch: AxisPatch, target: TransformTarget) {
        let Some(layer) = self.layers.iter_mut().find(|layer| &layer.id == id) else {
            return;
        };
        layer.apply_axis(target, patch);
        self.persist();
    }

    pub fn delete(&mut self, id: &LayerId) {
        let before = self.layers.len();
        self.layers.retain(|layer| &layer.id != id);
        if self.layers.len() != before {
            self.persist();
        }
    }

    /// Clone the layer with `id` onto the top of the stack, offset by the configured amount
    pub fn duplicate(&mut self, id: &LayerId) -> Option<LayerId> {
        let [dx, dy] = self.defaults.duplicate_offset;
        let copy = self.get(id)?.duplicate(Vec2::new(dx, dy));
        let new_id = copy.id.clone();
        self.layers.push(copy);
        self.persist();
        Some(new_id)
    }

    /// Move `dragged` into the index `target` occupied, shifting the layers in between
    pub fn reorder(&mut self, dragged: &LayerId, target: &LayerId) {
        if dragged == target {
            return;
        }
        let (Some(from), Some(to)) = (self.index_of(dragged), self.index_of(target)) else {
            return;
        };
        let moved = self.layers.remove(from);
        self.layers.insert(to, moved);
        self.persist();
    }

    /// Atomically swap in a whole new sequence
    pub fn replace_all(&mut self, layers: Vec<Layer>) {
        self.layers = layers;
        self.persist();
    }

    pub fn clear(&mut self) {
        self.layers.clear();
        self.persist();
    }

    fn persist(&mut self) {
        match self.write_layers() {
            Ok(()) => self.last_persistence_error = None,
            Err(err) => {
                log::error!("Error saving layers to storage: {}", err);
                self.last_persistence_error = Some(err.to_string());
            }
        }
    }

    fn write_layers(&mut self) -> Result<(), PersistenceError> {
        let json = serde_json::to_string(&self.layers)?;
        self.storage.set(&self.storage_key, json)
    }
}

/// Point image layers at the catalog's current sources
pub fn relink_sources(layers: &mut [Layer], catalog: &AssetCatalog) {
    for layer in layers.iter_mut().filter(|l| l.kind() == LayerKind::Image) {
        let resolved = layer
            .asset_id
            .as_deref()
            .and_then(|id| catalog.resolve(id))
            .and_then(|asset| asset.src.clone());
        if resolved.is_none() {
            log::warn!("Asset not found for layer {}: {:?}", layer.name, layer.asset_id);
        }
        layer.src = resolved;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::persistence::MemoryStorage;

    fn card() -> AssetDescriptor {
        AssetDescriptor::image("../assets/cards/a.png", "a", "Cards", "/srv/a.png")
    }

    fn store_with(storage: &MemoryStorage) -> LayerStore {
        LayerStore::new(Box::new(storage.clone()))
    }

    fn persisted(storage: &MemoryStorage) -> Vec<Layer> {
        serde_json::from_str(&storage.get(STORAGE_KEY).unwrap()).unwrap()
    }

    #[test]
    fn test_every_mutation_is_persisted() {
        let storage = MemoryStorage::new();
        let mut store = store_with(&storage);

        let layer = store.create(&card(), None);
        assert_eq!(persisted(&storage), store.layers());

        store.update(&layer.id, LayerPatch::Rotation(30.0));
        assert_eq!(persisted(&storage)[0].rotation, 30.0);

        store.update_transform(&layer.id, AxisPatch::x(5.0), TransformTarget::Position);
        assert_eq!(persisted(&storage)[0].position, Pos2::new(5.0, 160.0));

        store.clear();
        assert!(persisted(&storage).is_empty());
    }

    #[test]
    fn test_persistence_failure_keeps_memory_state() {
        let storage = MemoryStorage::with_quota(8);
        let mut store = store_with(&storage);

        let layer = store.create(&card(), None);
        assert_eq!(store.len(), 1);
        assert!(store.last_persistence_error().is_some());
        assert!(storage.get(STORAGE_KEY).is_none());
        assert_eq!(store.get(&layer.id), Some(&layer));
    }

    #[test]
    fn test_unknown_ids_are_no_ops() {
        let storage = MemoryStorage::new();
        let mut store = store_with(&storage);
        store.create(&card(), None);
        let before = store.layers().to_vec();

        let missing = LayerId::from("missing");
        store.update(&missing, LayerPatch::Opacity(0.2));
        store.delete(&missing);
        assert!(store.duplicate(&missing).is_none());
        store.reorder(&missing, &before[0].id);
        assert_eq!(store.layers(), before.as_slice());
    }

    #[test]
    fn test_reorder_moves_into_target_slot() {
        let storage = MemoryStorage::new();
        let mut store = store_with(&storage);
        let ids: Vec<LayerId> = (0..4).map(|_| store.create(&card(), None).id).collect();

        store.reorder(&ids[0], &ids[2]);
        let order: Vec<&LayerId> = store.layers().iter().map(|l| &l.id).collect();
        assert_eq!(order, vec![&ids[1], &ids[2], &ids[0], &ids[3]]);

        store.reorder(&ids[3], &ids[1]);
        let order: Vec<&LayerId> = store.layers().iter().map(|l| &l.id).collect();
        assert_eq!(order, vec![&ids[3], &ids[1], &ids[2], &ids[0]]);
    }

    #[test]
    fn test_duplicate_appends_on_top() {
        let storage = MemoryStorage::new();
        let mut store = store_with(&storage);
        let first = store.create(&card(), Some(Pos2::new(100.0, 100.0)));
        store.create(&card(), None);

        let copy_id = store.duplicate(&first.id).unwrap();
        let copy = store.layers().last().unwrap();
        assert_eq!(copy.id, copy_id);
        assert_ne!(copy_id, first.id);
        assert_eq!(copy.position, Pos2::new(120.0, 120.0));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_load_restores_and_relinks() {
        let storage = MemoryStorage::new();
        let mut store = store_with(&storage);
        let mut layer = store.create(&card(), None);
        layer.src = Some("/old/location.png".to_owned());
        store.replace_all(vec![layer]);

        let catalog = AssetCatalog::from_paths([("cards/a.png", "/new/a.png")]);
        let restored = LayerStore::load(
            Box::new(storage.clone()),
            STORAGE_KEY,
            LayerDefaults::default(),
            Some(&catalog),
        );
        assert_eq!(restored.len(), 1);
        assert_eq!(restored.layers()[0].src.as_deref(), Some("/new/a.png"));
    }

    #[test]
    fn test_load_tolerates_garbage() {
        let mut storage = MemoryStorage::new();
        storage.set(STORAGE_KEY, "{\"not\": \"a list\"}".to_owned()).unwrap();
        let store = LayerStore::load(Box::new(storage), STORAGE_KEY, LayerDefaults::default(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_locked_layers_are_not_interactive() {
        let storage = MemoryStorage::new();
        let mut store = store_with(&storage);
        let layer = store.create(&card(), None);
        assert!(store.is_interactive(&layer.id));
        store.update(&layer.id, LayerPatch::Locked(true));
        assert!(!store.is_interactive(&layer.id));
    }
}
