//! In-memory doubles for the hardware and storage seams.

use std::sync::{Arc, Mutex};

use crate::{
    controller::lock_shared,
    error::{OutputError, StoreError},
    hook::StateChangeHook,
    outputs::{SpeedOutputs, StatusLed},
    store::LevelStore,
    types::{FanLevel, StateChange},
};

fn line_index(level: FanLevel) -> usize {
    match level {
        FanLevel::Low => 0,
        FanLevel::Medium => 1,
        FanLevel::High => 2,
    }
}

#[derive(Default)]
struct Lines {
    current: [bool; 3],
    history: Vec<[bool; 3]>,
}

/// Relay bank that remembers every intermediate line snapshot.
#[derive(Clone, Default)]
pub struct RecordingOutputs {
    lines: Arc<Mutex<Lines>>,
}

impl RecordingOutputs {
    /// Current `[low, medium, high]` line levels.
    pub fn lines(&self) -> [bool; 3] {
        lock_shared(&self.lines).current
    }

    pub fn history(&self) -> Vec<[bool; 3]> {
        lock_shared(&self.lines).history.clone()
    }
}

impl SpeedOutputs for RecordingOutputs {
    fn write_line(&mut self, level: FanLevel, asserted: bool) -> Result<(), OutputError> {
        let mut lines = lock_shared(&self.lines);
        lines.current[line_index(level)] = asserted;
        let snapshot = lines.current;
        lines.history.push(snapshot);
        Ok(())
    }
}

#[derive(Default)]
struct Record {
    value: Option<i32>,
    fail_reads: bool,
    fail_writes: bool,
}

#[derive(Clone, Default)]
pub struct MemoryLevelStore {
    record: Arc<Mutex<Record>>,
}

impl MemoryLevelStore {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_level(level: i32) -> Self {
        let store = Self::default();
        lock_shared(&store.record).value = Some(level);
        store
    }

    pub fn fail_reads(&self, fail: bool) {
        lock_shared(&self.record).fail_reads = fail;
    }

    pub fn fail_writes(&self, fail: bool) {
        lock_shared(&self.record).fail_writes = fail;
    }

    pub fn stored(&self) -> Option<i32> {
        lock_shared(&self.record).value
    }
}

impl LevelStore for MemoryLevelStore {
    fn load_level(&self) -> Result<Option<i32>, StoreError> {
        let record = lock_shared(&self.record);
        if record.fail_reads {
            return Err(StoreError::Backend("read refused".into()));
        }
        Ok(record.value)
    }

    fn save_level(&mut self, level: i32) -> Result<(), StoreError> {
        let mut record = lock_shared(&self.record);
        if record.fail_writes {
            return Err(StoreError::Backend("write refused".into()));
        }
        record.value = Some(level);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct RecordingLed {
    edges: Arc<Mutex<Vec<bool>>>,
}

impl RecordingLed {
    pub fn edges(&self) -> Vec<bool> {
        lock_shared(&self.edges).clone()
    }
}

impl StatusLed for RecordingLed {
    fn set_lit(&mut self, lit: bool) -> Result<(), OutputError> {
        lock_shared(&self.edges).push(lit);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct RecordingHook {
    changes: Arc<Mutex<Vec<StateChange>>>,
}

impl RecordingHook {
    pub fn changes(&self) -> Vec<StateChange> {
        lock_shared(&self.changes).clone()
    }
}

impl StateChangeHook for RecordingHook {
    fn on_state_change(&self, change: StateChange) {
        lock_shared(&self.changes).push(change);
    }
}
