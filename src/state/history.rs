use crate::config::{DEFAULT_UNDO_HISTORY_SIZE, clamp_history_capacity};
use crate::layer::Layer;

/// A deep, independent copy of the full layer sequence
pub type Snapshot = Vec<Layer>;

/// Bounded, linear undo/redo timeline over layer snapshots.
///
/// `index` always points at the snapshot matching the live sequence. Snapshots are owned
/// copies, so editing live layers never reaches back into the timeline.
#[derive(Debug, Clone)]
pub struct HistoryManager {
    snapshots: Vec<Snapshot>,
    index: usize,
    max_size: usize,
    /// Last sequence seen by `observe` or produced by a restore
    last_observed: Snapshot,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(&[], DEFAULT_UNDO_HISTORY_SIZE)
    }
}

impl HistoryManager {
    /// Start a timeline whose oldest entry is `initial`
    pub fn new(initial: &[Layer], max_size: usize) -> Self {
        Self {
            snapshots: vec![initial.to_vec()],
            index: 0,
            max_size: clamp_history_capacity(max_size),
            last_observed: initial.to_vec(),
        }
    }

    /// Record `layers` if they differ from the last observed sequence.
    ///
    /// Returns true when a snapshot was added. Anything after the cursor is discarded first.
    pub fn observe(&mut self, layers: &[Layer]) -> bool {
        if self.last_observed.as_slice() == layers {
            return false;
        }

        self.snapshots.truncate(self.index + 1);
        self.snapshots.push(layers.to_vec());
        self.index = self.snapshots.len() - 1;

        while self.snapshots.len() > self.max_size {
            self.snapshots.remove(0);
            self.index = self.index.saturating_sub(1);
        }

        self.last_observed = layers.to_vec();
        true
    }

    /// Step back and return a copy of the snapshot to restore.
    ///
    /// The returned sequence is already marked as observed, so writing it back into the store
    /// and observing again does not create an entry.
    pub fn undo(&mut self) -> Option<Snapshot> {
        if !self.can_undo() {
            return None;
        }
        self.index -= 1;
        log::info!("Undo performed: index {} of {}", self.index, self.snapshots.len());
        Some(self.restore_current())
    }

    /// Step forward and return a copy of the snapshot to restore
    pub fn redo(&mut self) -> Option<Snapshot> {
        if !self.can_redo() {
            return None;
        }
        self.index += 1;
        log::info!("Redo performed: index {} of {}", self.index, self.snapshots.len());
        Some(self.restore_current())
    }

    fn restore_current(&mut self) -> Snapshot {
        let snapshot = self.snapshots[self.index].clone();
        self.last_observed = snapshot.clone();
        snapshot
    }

    /// Clamp `requested` to the supported range and apply it to future recordings.
    /// Existing entries are only trimmed by the next recording.
    pub fn set_capacity(&mut self, requested: usize) -> usize {
        self.max_size = clamp_history_capacity(requested);
        log::info!("Max history size updated: {}", self.max_size);
        self.max_size
    }

    /// Drop every entry and start again from `layers`
    pub fn reset(&mut self, layers: &[Layer]) {
        *self = Self::new(layers, self.max_size);
    }

    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.index + 1 < self.snapshots.len()
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    /// Number of retained snapshots
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }
}
