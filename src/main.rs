#![warn(clippy::all, rust_2018_idioms)]
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")] // hide console window on Windows in release

use std::path::PathBuf;

use card_editor::{AppOptions, CardEditorApp, EditorConfig};

/// Config file read at startup when present
const CONFIG_ENV: &str = "CARD_EDITOR_CONFIG";

// When compiling natively:
#[cfg(not(target_arch = "wasm32"))]
fn main() -> eframe::Result {
    env_logger::init(); // Log to stderr (if you run with `RUST_LOG=debug`).

    // card_editor [assets dir] [workspace dir]
    let mut args = std::env::args().skip(1);
    let assets_dir = args.next().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("assets"));
    let workspace = args.next().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));

    let config = match std::env::var_os(CONFIG_ENV) {
        Some(path) => EditorConfig::load(&PathBuf::from(path)).unwrap_or_else(|err| {
            log::error!("Failed to load config, using defaults: {}", err);
            EditorConfig::default()
        }),
        None => EditorConfig::default(),
    };

    let options = AppOptions {
        assets_dir,
        workspace,
        config,
    };

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 800.0])
            .with_min_inner_size([640.0, 480.0]),
        ..Default::default()
    };
    eframe::run_native(
        "Card Editor",
        native_options,
        Box::new(|cc| Ok(Box::new(CardEditorApp::new(cc, options)))),
    )
}

// The editor reads assets and documents from the local file system.
#[cfg(target_arch = "wasm32")]
fn main() {}
