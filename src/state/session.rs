use egui::{Pos2, Vec2};
use std::path::{Path, PathBuf};

use super::history::HistoryManager;
use super::persistence::KeyValueStorage;
use super::store::LayerStore;
use crate::asset::AssetCatalog;
use crate::config::{DEFAULT_CANVAS_TITLE, EditorConfig, StorageKeys, clamp_history_capacity};
use crate::document::{Document, export_document, import_document, document_file_name};
use crate::error::{EditorError, EditorResult};
use crate::export::batch::{self, BatchSummary, PromptSink, Throttle, read_json_documents};
use crate::export::{RasterExporter, SurfaceRenderer};
use crate::io::FilePrompt;
use crate::layer::{AxisPatch, Layer, LayerId, LayerPatch, TransformTarget};

/// User preferences that survive restarts
#[derive(Debug, Clone, PartialEq)]
pub struct Preferences {
    pub canvas_title: String,
    pub history_capacity: usize,
}

impl Preferences {
    fn load(storage: &dyn KeyValueStorage, keys: &StorageKeys, default_capacity: usize) -> Self {
        let canvas_title = storage
            .get(&keys.canvas_title)
            .unwrap_or_else(|| DEFAULT_CANVAS_TITLE.to_owned());

        let history_capacity = match storage.get(&keys.history_size) {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(value) => clamp_history_capacity(value),
                Err(err) => {
                    log::warn!("Ignoring stored undo history size {:?}: {}", raw, err);
                    clamp_history_capacity(default_capacity)
                }
            },
            None => clamp_history_capacity(default_capacity),
        };

        Self {
            canvas_title,
            history_capacity,
        }
    }
}

/// What an import from a file prompt produced
#[derive(Debug)]
pub struct ImportReport {
    pub path: PathBuf,
    pub layer_count: usize,
    pub unresolved: Vec<EditorError>,
}

/// The explicit application state: layers, history, preferences and selection.
///
/// Every layer mutation goes through the session so history observes it. Undo and redo
/// restore through the store without being recorded as edits.
pub struct EditorSession {
    store: LayerStore,
    history: HistoryManager,
    catalog: AssetCatalog,
    config: EditorConfig,
    preferences: Preferences,
    selected: Option<LayerId>,
    /// While set, edits are applied and persisted but recorded as one entry at the end
    gesture_active: bool,
}

impl std::fmt::Debug for EditorSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorSession")
            .field("store", &self.store)
            .field("history_len", &self.history.len())
            .field("preferences", &self.preferences)
            .field("selected", &self.selected)
            .finish()
    }
}

impl EditorSession {
    /// Restore layers and preferences from `storage`
    pub fn new(storage: Box<dyn KeyValueStorage>, catalog: AssetCatalog, config: EditorConfig) -> Self {
        let store = LayerStore::load(
            storage,
            &config.storage.layers,
            config.layer_defaults.clone(),
            Some(&catalog),
        );
        let preferences = Preferences::load(store.storage(), &config.storage, config.history.capacity);
        let history = HistoryManager::new(store.layers(), preferences.history_capacity);

        log::info!(
            "Session ready: {} layers, undo capacity {}",
            store.len(),
            history.capacity()
        );

        Self {
            store,
            history,
            catalog,
            config,
            preferences,
            selected: None,
            gesture_active: false,
        }
    }

    pub fn layers(&self) -> &[Layer] {
        self.store.layers()
    }

    pub fn store(&self) -> &LayerStore {
        &self.store
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn catalog(&self) -> &AssetCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn canvas_title(&self) -> &str {
        &self.preferences.canvas_title
    }

    pub fn selected(&self) -> Option<&LayerId> {
        self.selected.as_ref()
    }

    pub fn selected_layer(&self) -> Option<&Layer> {
        self.selected.as_ref().and_then(|id| self.store.get(id))
    }

    /// Select a layer. Locked layers cannot be selected.
    pub fn select(&mut self, id: Option<LayerId>) -> bool {
        match id {
            Some(id) if !self.store.is_interactive(&id) => false,
            id => {
                self.selected = id;
                true
            }
        }
    }

    fn record(&mut self) {
        if !self.gesture_active {
            self.history.observe(self.store.layers());
        }
    }

    /// Drop the selection if its layer is gone or locked
    fn sanitize_selection(&mut self) {
        if let Some(id) = &self.selected {
            if !self.store.is_interactive(id) {
                self.selected = None;
            }
        }
    }

    /// Start a continuous edit, such as a canvas drag.
    ///
    /// Every edit until [`Self::end_gesture`] is applied and persisted as usual, but the
    /// whole gesture becomes a single history entry.
    pub fn begin_gesture(&mut self) {
        self.gesture_active = true;
    }

    /// Record the finished gesture. Returns true when it changed anything.
    pub fn end_gesture(&mut self) -> bool {
        if !std::mem::replace(&mut self.gesture_active, false) {
            return false;
        }
        self.history.observe(self.store.layers())
    }


    /// Create a layer from the catalog entry `asset_id` and select it
    pub fn add_asset(&mut self, asset_id: &str, position: Option<Pos2>) -> EditorResult<LayerId> {
        let asset = self
            .catalog
            .get(asset_id)
            .cloned()
            .ok_or_else(|| EditorError::AssetUnresolved {
                layer: String::new(),
                reference: asset_id.to_owned(),
            })?;
        let layer = self.store.create(&asset, position);
        self.record();
        self.selected = Some(layer.id.clone());
        Ok(layer.id)
    }

    pub fn update_layer(&mut self, id: &LayerId, patch: LayerPatch) {
        self.store.update(id, patch);
        self.sanitize_selection();
        self.record();
    }

    pub fn update_transform(&mut self, id: &LayerId, patch: AxisPatch, target: TransformTarget) {
        self.store.update_transform(id, patch, target);
        self.record();
    }

    /// Delete an unlocked layer. Returns false for locked or unknown layers.
    pub fn delete_layer(&mut self, id: &LayerId) -> bool {
        if !self.store.is_interactive(id) {
            log::debug!("Refusing to delete locked or unknown layer {}", id);
            return false;
        }
        self.store.delete(id);
        self.sanitize_selection();
        self.record();
        true
    }

    /// Duplicate an unlocked layer onto the top of the stack and select the copy
    pub fn duplicate_layer(&mut self, id: &LayerId) -> Option<LayerId> {
        if !self.store.is_interactive(id) {
            log::debug!("Refusing to duplicate locked or unknown layer {}", id);
            return None;
        }
        let new_id = self.store.duplicate(id)?;
        self.record();
        self.selected = Some(new_id.clone());
        Some(new_id)
    }

    /// Move `dragged` to `target`'s slot. Locked layers neither move nor act as targets.
    pub fn reorder_layers(&mut self, dragged: &LayerId, target: &LayerId) -> bool {
        if !self.store.is_interactive(dragged) || !self.store.is_interactive(target) {
            return false;
        }
        self.store.reorder(dragged, target);
        self.record();
        true
    }

    pub fn clear_layers(&mut self) {
        self.store.clear();
        self.selected = None;
        self.record();
    }

    /// Move an unlocked layer by `delta`. Returns false for locked or unknown layers.
    pub fn drag_layer(&mut self, id: &LayerId, delta: Vec2) -> bool {
        let Some(position) = self.interactive_layer(id).map(|layer| layer.position) else {
            return false;
        };
        let target = position + delta;
        self.update_transform(id, AxisPatch::both(target.x, target.y), TransformTarget::Position);
        true
    }

    /// Set the scale of an unlocked layer. Returns false for locked or unknown layers.
    pub fn resize_layer(&mut self, id: &LayerId, scale: Vec2) -> bool {
        if self.interactive_layer(id).is_none() {
            return false;
        }
        self.update_transform(id, AxisPatch::both(scale.x, scale.y), TransformTarget::Scale);
        true
    }

    fn interactive_layer(&self, id: &LayerId) -> Option<&Layer> {
        self.store.get(id).filter(|layer| !layer.locked)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo(&mut self) -> bool {
        self.end_gesture();
        let Some(snapshot) = self.history.undo() else {
            return false;
        };
        self.store.replace_all(snapshot);
        self.sanitize_selection();
        true
    }

    pub fn redo(&mut self) -> bool {
        self.end_gesture();
        let Some(snapshot) = self.history.redo() else {
            return false;
        };
        self.store.replace_all(snapshot);
        self.sanitize_selection();
        true
    }

    /// Clamp and persist the undo capacity. Returns the value in effect.
    pub fn set_history_capacity(&mut self, requested: usize) -> usize {
        let capacity = self.history.set_capacity(requested);
        self.preferences.history_capacity = capacity;
        let key = self.config.storage.history_size.clone();
        if let Err(err) = self.store.storage_mut().set(&key, capacity.to_string()) {
            log::error!("Error saving undo history size: {}", err);
        }
        capacity
    }

    pub fn set_canvas_title(&mut self, title: &str) {
        self.preferences.canvas_title = title.to_owned();
        let key = self.config.storage.canvas_title.clone();
        if let Err(err) = self.store.storage_mut().set(&key, title.to_owned()) {
            log::error!("Error saving canvas title: {}", err);
        }
    }

    /// Replace every layer with `layers`, select the first one and record a history entry
    pub fn load_layers(&mut self, layers: Vec<Layer>, title: Option<&str>) {
        if let Some(title) = title {
            self.set_canvas_title(title);
        }
        self.end_gesture();
        log::info!("Loading {} layers into the canvas", layers.len());
        self.selected = layers.first().map(|layer| layer.id.clone());
        self.store.replace_all(layers);
        self.sanitize_selection();
        self.record();
    }

    pub fn export_document(&self) -> Document {
        export_document(self.store.layers(), self.config.canvas_size)
    }

    /// Parse, re-link and load a document; the title becomes the canvas title
    pub fn import_bytes(&mut self, raw: &[u8], title: Option<&str>) -> EditorResult<Vec<EditorError>> {
        let outcome = import_document(raw, &self.catalog)?;
        self.load_layers(outcome.layers, title);
        Ok(outcome.unresolved)
    }

    /// Build an exporter for this session's canvas and export settings
    pub fn exporter<R: SurfaceRenderer>(&self, renderer: R) -> RasterExporter<R> {
        RasterExporter::new(renderer, self.config.export, self.config.canvas_size)
    }

    pub fn export_png<R: SurfaceRenderer>(&self, exporter: &mut RasterExporter<R>) -> EditorResult<Vec<u8>> {
        Ok(exporter.export_png(self.store.layers())?)
    }

    pub fn import_from_prompt(&mut self, prompt: &mut dyn FilePrompt) -> EditorResult<Option<ImportReport>> {
        let Some(path) = cancellable(prompt.pick_open("json"))? else {
            return Ok(None);
        };
        let raw = std::fs::read(&path)?;
        let unresolved = self.import_bytes(&raw, Some(&file_stem(&path)))?;
        Ok(Some(ImportReport {
            path,
            layer_count: self.store.len(),
            unresolved,
        }))
    }

    pub fn export_json_to_prompt(&self, prompt: &mut dyn FilePrompt) -> EditorResult<Option<PathBuf>> {
        let json = self.export_document().to_json_pretty()?;
        let suggested = document_file_name(self.canvas_title(), "json");
        let Some(path) = cancellable(prompt.pick_save(&suggested))? else {
            return Ok(None);
        };
        std::fs::write(&path, json)?;
        log::info!("Exported document to {}", path.display());
        Ok(Some(path))
    }

    pub fn export_png_to_prompt<R: SurfaceRenderer>(
        &self,
        prompt: &mut dyn FilePrompt,
        exporter: &mut RasterExporter<R>,
    ) -> EditorResult<Option<PathBuf>> {
        if self.store.is_empty() {
            log::warn!("No layers to export");
            return Err(EditorError::NoContent);
        }
        let png = self.export_png(exporter)?;
        let suggested = document_file_name(self.canvas_title(), "png");
        let Some(path) = cancellable(prompt.pick_save(&suggested))? else {
            return Ok(None);
        };
        std::fs::write(&path, png)?;
        log::info!("Exported PNG to {}", path.display());
        Ok(Some(path))
    }

    /// Render every document in a picked directory into its `previews/` folder.
    /// The live layers are left untouched.
    pub async fn batch_export_from_prompt<R: SurfaceRenderer, T: Throttle>(
        &self,
        prompt: &mut dyn FilePrompt,
        exporter: &mut RasterExporter<R>,
        throttle: &mut T,
    ) -> EditorResult<Option<BatchSummary>> {
        let Some(dir) = cancellable(prompt.pick_directory())? else {
            return Ok(None);
        };
        let summary = batch::export_directory(&dir, &self.catalog, exporter, throttle, self.config.batch.directory).await?;
        Ok(Some(summary))
    }

    /// Render individually picked documents, saving each preview through its own save prompt.
    ///
    /// Paced with the slower download preset since every file is a separate save.
    pub async fn batch_export_files_from_prompt<R: SurfaceRenderer, T: Throttle>(
        &self,
        prompt: &mut dyn FilePrompt,
        exporter: &mut RasterExporter<R>,
        throttle: &mut T,
    ) -> EditorResult<Option<BatchSummary>> {
        let Some(paths) = cancellable(prompt.pick_files("json"))? else {
            return Ok(None);
        };
        let items = read_json_documents(&paths)?;
        let mut sink = PromptSink::new(prompt);
        let summary = batch::run(
            items,
            &self.catalog,
            exporter,
            &mut sink,
            throttle,
            self.config.batch.downloads,
        )
        .await;
        Ok(Some(summary))
    }
}

/// Turn a dismissed prompt into `None`
fn cancellable<T>(result: EditorResult<T>) -> EditorResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_cancellation() => Ok(None),
        Err(err) => Err(err),
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::TEXT_ASSET_ID;
    use crate::config::{CANVAS_TITLE_KEY, UNDO_HISTORY_SIZE_KEY};
    use crate::state::persistence::MemoryStorage;

    fn session_with(storage: &MemoryStorage) -> EditorSession {
        let catalog = AssetCatalog::from_paths([("cards/a.png", "/srv/a.png")]);
        EditorSession::new(Box::new(storage.clone()), catalog, EditorConfig::default())
    }

    #[test]
    fn test_preferences_are_persisted_and_restored() {
        let storage = MemoryStorage::new();
        let mut session = session_with(&storage);
        assert_eq!(session.canvas_title(), DEFAULT_CANVAS_TITLE);
        assert_eq!(session.preferences().history_capacity, 50);

        session.set_canvas_title("Fire Drake");
        assert_eq!(session.set_history_capacity(500), 200);
        assert_eq!(storage.get(CANVAS_TITLE_KEY).as_deref(), Some("Fire Drake"));
        assert_eq!(storage.get(UNDO_HISTORY_SIZE_KEY).as_deref(), Some("200"));

        let restored = session_with(&storage);
        assert_eq!(restored.canvas_title(), "Fire Drake");
        assert_eq!(restored.history().capacity(), 200);
    }

    #[test]
    fn test_locked_layers_refuse_interaction() {
        let storage = MemoryStorage::new();
        let mut session = session_with(&storage);
        let id = session.add_asset(TEXT_ASSET_ID, None).unwrap();
        session.update_layer(&id, LayerPatch::Locked(true));

        assert!(!session.drag_layer(&id, Vec2::new(10.0, 0.0)));
        assert!(!session.resize_layer(&id, Vec2::new(2.0, 2.0)));
        assert!(!session.select(Some(id.clone())));
        assert_eq!(session.layers()[0].position, Pos2::new(180.0, 160.0));

        session.update_layer(&id, LayerPatch::Locked(false));
        assert!(session.drag_layer(&id, Vec2::new(10.0, -10.0)));
        assert_eq!(session.layers()[0].position, Pos2::new(190.0, 150.0));
    }

    #[test]
    fn test_undo_clears_stale_selection() {
        let storage = MemoryStorage::new();
        let mut session = session_with(&storage);
        let id = session.add_asset("../assets/cards/a.png", None).unwrap();
        assert_eq!(session.selected(), Some(&id));

        assert!(session.undo());
        assert!(session.layers().is_empty());
        assert!(session.selected().is_none());
        assert!(session.redo());
        assert_eq!(session.layers()[0].id, id);
    }

    #[test]
    fn test_unknown_asset_is_reported() {
        let storage = MemoryStorage::new();
        let mut session = session_with(&storage);
        let err = session.add_asset("../assets/nope.png", None).unwrap_err();
        assert!(matches!(err, EditorError::AssetUnresolved { .. }));
        assert_eq!(session.history().len(), 1);
    }

    #[test]
    fn test_drag_gesture_is_one_history_entry() {
        let storage = MemoryStorage::new();
        let mut session = session_with(&storage);
        let id = session.add_asset(TEXT_ASSET_ID, Some(Pos2::ZERO)).unwrap();
        let len = session.history().len();

        session.begin_gesture();
        for _ in 0..60 {
            assert!(session.drag_layer(&id, Vec2::new(1.0, 0.0)));
        }
        assert_eq!(session.history().len(), len);
        assert!(session.end_gesture());

        assert_eq!(session.history().len(), len + 1);
        assert_eq!(session.layers()[0].position, Pos2::new(60.0, 0.0));
        assert!(session.undo());
        assert_eq!(session.layers()[0].position, Pos2::ZERO);
        assert!(session.undo());
        assert!(session.layers().is_empty());
    }

    #[test]
    fn test_empty_gesture_records_nothing() {
        let storage = MemoryStorage::new();
        let mut session = session_with(&storage);
        session.add_asset(TEXT_ASSET_ID, None).unwrap();
        let len = session.history().len();

        session.begin_gesture();
        assert!(!session.end_gesture());
        assert!(!session.end_gesture());
        assert_eq!(session.history().len(), len);
    }

    #[test]
    fn test_locked_layers_refuse_list_actions() {
        let storage = MemoryStorage::new();
        let mut session = session_with(&storage);
        let locked = session.add_asset(TEXT_ASSET_ID, None).unwrap();
        let free = session.add_asset("../assets/cards/a.png", None).unwrap();
        session.select(Some(locked.clone()));
        session.update_layer(&locked, LayerPatch::Locked(true));
        assert!(session.selected().is_none());
        let len = session.history().len();

        assert!(!session.delete_layer(&locked));
        assert!(session.duplicate_layer(&locked).is_none());
        assert!(!session.reorder_layers(&locked, &free));
        assert!(!session.reorder_layers(&free, &locked));

        assert_eq!(session.layers().len(), 2);
        assert_eq!(session.layers()[0].id, locked);
        assert_eq!(session.history().len(), len);
    }

    #[test]
    fn test_no_op_edits_are_not_recorded() {
        let storage = MemoryStorage::new();
        let mut session = session_with(&storage);
        let id = session.add_asset(TEXT_ASSET_ID, None).unwrap();
        let len = session.history().len();

        session.reorder_layers(&id, &id);
        session.update_layer(&LayerId::from("missing"), LayerPatch::Rotation(5.0));
        assert_eq!(session.history().len(), len);
    }
}
