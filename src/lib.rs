#![warn(clippy::all, rust_2018_idioms)]

pub mod app;
pub mod asset;
pub mod bitmap;
pub mod config;
pub mod document;
pub mod error;
pub mod export;
pub mod geometry;
pub mod io;
pub mod layer;
pub mod state;
pub mod text_format;
pub mod util;

pub use app::{AppOptions, CardEditorApp};
pub use asset::{AssetCatalog, AssetDescriptor};
pub use config::EditorConfig;
pub use document::{Document, ImportOutcome, export_document, import_document};
pub use error::{EditorError, EditorResult};
pub use export::{RasterExporter, SoftwareRenderer, SurfaceRenderer};
pub use io::{FilePrompt, FixedPrompt};
pub use layer::{Layer, LayerContent, LayerId, LayerPatch};
pub use state::{EditorSession, HistoryManager, KeyValueStorage, LayerStore, MemoryStorage};
