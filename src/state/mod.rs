pub mod history;
pub mod persistence;
pub mod session;
pub mod store;

pub use history::{HistoryManager, Snapshot};
pub use persistence::{
    EframeStorage, FileStorage, KeyValueStorage, MemoryStorage, PersistenceError, PersistenceResult,
    copy_keys,
};
pub use session::{EditorSession, ImportReport, Preferences};
pub use store::LayerStore;
