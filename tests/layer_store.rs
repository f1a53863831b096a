use card_editor::asset::AssetDescriptor;
use card_editor::config::{EditorConfig, LayerDefaults};
use card_editor::state::{KeyValueStorage, LayerStore, MemoryStorage};
use card_editor::{AssetCatalog, EditorSession, LayerPatch};
use egui::{Pos2, Vec2};

fn catalog() -> AssetCatalog {
    AssetCatalog::from_paths([
        ("cards/dragon.png", "/srv/cards/dragon.png"),
        ("frames/gold.png", "/srv/frames/gold.png"),
    ])
}

fn session(storage: &MemoryStorage) -> EditorSession {
    EditorSession::new(Box::new(storage.clone()), catalog(), EditorConfig::default())
}

#[test]
fn test_duplicate_is_offset_and_appended_on_top() {
    let storage = MemoryStorage::new();
    let mut session = session(&storage);
    let first = session.add_asset("../assets/cards/dragon.png", Some(Pos2::new(100.0, 50.0))).unwrap();
    let last = session.add_asset("../assets/frames/gold.png", None).unwrap();

    let copy = session.duplicate_layer(&first).unwrap();
    let ids: Vec<_> = session.layers().iter().map(|layer| layer.id.clone()).collect();
    assert_eq!(ids, vec![first.clone(), last, copy.clone()]);

    let copy = &session.layers()[2];
    assert_eq!(copy.position, Pos2::new(120.0, 70.0));
    assert_eq!(copy.asset_id, session.layers()[0].asset_id);
}

#[test]
fn test_reorder_onto_itself_records_nothing() {
    let storage = MemoryStorage::new();
    let mut session = session(&storage);
    let a = session.add_asset("../assets/cards/dragon.png", None).unwrap();
    let b = session.add_asset("text-box", None).unwrap();
    let before = session.history().len();

    session.reorder_layers(&a, &a);
    session.update_layer(&b, LayerPatch::Name("Text Box".to_owned()));
    assert_eq!(session.history().len(), before);

    session.reorder_layers(&a, &b);
    assert_eq!(session.layers()[1].id, a);
    assert_eq!(session.history().len(), before + 1);
}

#[test]
fn test_layers_survive_a_restart() {
    let storage = MemoryStorage::new();
    let id = {
        let mut session = session(&storage);
        let id = session.add_asset("../assets/cards/dragon.png", None).unwrap();
        session.update_layer(&id, LayerPatch::Rotation(30.0));
        session.set_canvas_title("Fire Drake");
        id
    };

    let restored = session(&storage);
    assert_eq!(restored.canvas_title(), "Fire Drake");
    let layer = restored.store().get(&id).unwrap();
    assert_eq!(layer.rotation, 30.0);
    assert_eq!(layer.src.as_deref(), Some("/srv/cards/dragon.png"));
    assert!(!restored.can_undo());
}

#[test]
fn test_locked_layer_ignores_drag_but_accepts_unlock() {
    let storage = MemoryStorage::new();
    let mut session = session(&storage);
    let id = session.add_asset("../assets/cards/dragon.png", Some(Pos2::ZERO)).unwrap();
    session.update_layer(&id, LayerPatch::Locked(true));

    assert!(!session.drag_layer(&id, Vec2::new(10.0, 10.0)));
    assert_eq!(session.layers()[0].position, Pos2::ZERO);

    session.update_layer(&id, LayerPatch::Locked(false));
    assert!(session.drag_layer(&id, Vec2::new(10.0, 10.0)));
    assert_eq!(session.layers()[0].position, Pos2::new(10.0, 10.0));
}

#[test]
fn test_store_writes_through_on_every_mutation() {
    let storage = MemoryStorage::new();
    let mut store = LayerStore::with_key(Box::new(storage.clone()), "layers", LayerDefaults::default());
    let asset = AssetDescriptor::image("../assets/a.png", "a", "Uncategorized", "/srv/a.png");

    let layer = store.create(&asset, None);
    let saved = storage.get("layers").unwrap();
    assert!(saved.contains(layer.id.as_str()));

    store.delete(&layer.id);
    assert_eq!(storage.get("layers").as_deref(), Some("[]"));
}
