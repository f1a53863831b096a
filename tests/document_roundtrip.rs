use card_editor::config::EditorConfig;
use card_editor::layer::{LayerKind, Size, Tint};
use card_editor::{AssetCatalog, EditorError, EditorSession, LayerPatch, export_document, import_document};
use card_editor::state::MemoryStorage;
use egui::Pos2;

fn catalog() -> AssetCatalog {
    AssetCatalog::from_paths([
        ("cards/dragon.png", "/srv/cards/dragon.png"),
        ("frames/gold.png", "/srv/frames/gold.png"),
    ])
}

fn session_with(catalog: AssetCatalog) -> EditorSession {
    EditorSession::new(Box::new(MemoryStorage::new()), catalog, EditorConfig::default())
}

#[test]
fn test_export_then_import_preserves_layers() {
    let mut session = session_with(catalog());
    let dragon = session.add_asset("../assets/cards/dragon.png", Some(Pos2::new(40.0, 60.0))).unwrap();
    session.update_layer(&dragon, LayerPatch::Tint(Tint::from_rgb(255, 0, 0)));
    session.update_layer(&dragon, LayerPatch::Rotation(45.0));
    session.add_asset("text-box", None).unwrap();

    let json = session.export_document().to_json_pretty().unwrap();
    let outcome = import_document(json.as_bytes(), session.catalog()).unwrap();

    assert!(outcome.is_fully_resolved());
    assert_eq!(outcome.layers, session.layers());
    assert_eq!(outcome.canvas_size, Size::new(800.0, 600.0));
}

#[test]
fn test_import_keeps_layer_with_missing_asset() {
    let mut source = session_with(catalog());
    source.add_asset("../assets/frames/gold.png", None).unwrap();
    source.add_asset("../assets/cards/dragon.png", None).unwrap();
    let json = source.export_document().to_json_pretty().unwrap();

    let smaller = AssetCatalog::from_paths([("cards/dragon.png", "/srv/cards/dragon.png")]);
    let mut target = session_with(smaller);
    let warnings = target.import_bytes(json.as_bytes(), Some("Imported")).unwrap();

    assert_eq!(warnings.len(), 1);
    assert!(matches!(
        &warnings[0],
        EditorError::AssetUnresolved { reference, .. } if reference == "frames/gold.png"
    ));
    assert_eq!(target.layers().len(), 2);
    assert_eq!(target.layers()[0].kind(), LayerKind::Image);
    assert_eq!(target.layers()[0].src, None);
    assert_eq!(target.layers()[1].src.as_deref(), Some("/srv/cards/dragon.png"));
    assert_eq!(target.canvas_title(), "Imported");
}

#[test]
fn test_malformed_import_leaves_session_untouched() {
    let mut session = session_with(catalog());
    session.add_asset("../assets/cards/dragon.png", None).unwrap();
    let before = session.layers().to_vec();

    let err = session.import_bytes(br#"{"layers": 3}"#, Some("Broken")).unwrap_err();
    assert!(matches!(err, EditorError::MalformedDocument(_)));
    assert_eq!(session.layers(), before);
    assert_ne!(session.canvas_title(), "Broken");
}

#[test]
fn test_exported_document_shape() {
    let session = session_with(catalog());
    let document = export_document(session.layers(), Size::new(320.0, 240.0));
    let value = serde_json::to_value(&document).unwrap();

    assert_eq!(value["layers"], serde_json::json!([]));
    assert_eq!(value["metadata"]["canvasSize"]["height"], 240.0);
    let date = value["exportDate"].as_str().unwrap();
    assert!(date.ends_with('Z'), "{date}");
}
