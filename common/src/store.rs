use log::warn;

use crate::{error::StoreError, types::FanLevel};

pub const LEVEL_NAMESPACE: &str = "fan_cfg";
pub const LEVEL_KEY: &str = "fan_level";

/// Durable home of the last commanded speed level.
pub trait LevelStore: Send {
    fn load_level(&self) -> Result<Option<i32>, StoreError>;
    fn save_level(&mut self, level: i32) -> Result<(), StoreError>;
}

/// Never fails: a missing, unreadable or out-of-range record yields `default`.
pub fn read_persisted_level<S: LevelStore + ?Sized>(store: &S, default: FanLevel) -> FanLevel {
    match store.load_level() {
        Ok(Some(raw)) => FanLevel::try_from(raw).unwrap_or_else(|_| {
            warn!("stored fan level {raw} out of range; falling back to {default}");
            default
        }),
        Ok(None) => default,
        Err(err) => {
            warn!("failed to read persisted fan level: {err}");
            default
        }
    }
}

/// Best-effort write. Returns whether the record reached storage.
pub fn persist_level<S: LevelStore + ?Sized>(store: &mut S, level: FanLevel) -> bool {
    match store.save_level(level.as_i32()) {
        Ok(()) => true,
        Err(err) => {
            warn!("failed to persist fan level {level}: {err}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryLevelStore;

    #[test]
    fn missing_record_yields_default() {
        let store = MemoryLevelStore::empty();
        assert_eq!(read_persisted_level(&store, FanLevel::High), FanLevel::High);
    }

    #[test]
    fn stored_level_is_returned() {
        let store = MemoryLevelStore::with_level(2);
        assert_eq!(read_persisted_level(&store, FanLevel::High), FanLevel::Medium);
    }

    #[test]
    fn out_of_range_record_yields_default() {
        for raw in [0, -1, 4, 99] {
            let store = MemoryLevelStore::with_level(raw);
            assert_eq!(read_persisted_level(&store, FanLevel::High), FanLevel::High);
        }
    }

    #[test]
    fn read_failure_yields_default() {
        let store = MemoryLevelStore::with_level(1);
        store.fail_reads(true);
        assert_eq!(read_persisted_level(&store, FanLevel::Medium), FanLevel::Medium);
    }

    #[test]
    fn write_failure_is_reported_not_raised() {
        let mut store = MemoryLevelStore::empty();
        store.fail_writes(true);

        assert!(!persist_level(&mut store, FanLevel::Low));
        assert_eq!(store.stored(), None);

        store.fail_writes(false);
        assert!(persist_level(&mut store, FanLevel::Low));
        assert_eq!(store.stored(), Some(1));
    }
}
