//! HomeKit-style fan service mapping.
//!
//! The accessory exposes two characteristics, `On` and `RotationSpeed`
//! (percent). Speed tiers map onto fixed percentages and writes are bucketed
//! back into tiers.

use std::sync::Mutex;

use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    config::AccessoryConfig,
    controller::{lock_shared, FanController},
    hook::StateChangeHook,
    outputs::SpeedOutputs,
    store::LevelStore,
    types::{FanLevel, FanState, StateChange},
};

pub fn rotation_speed(on: bool, level: u8) -> f32 {
    if !on {
        return 0.0;
    }
    match level {
        1 => 33.0,
        2 => 66.0,
        3 => 100.0,
        _ => 0.0,
    }
}

/// `None` means the write asks for the fan to stop.
pub fn level_for_speed(speed: f32) -> Option<FanLevel> {
    if speed.is_nan() || speed <= 0.0 {
        None
    } else if speed < 34.0 {
        Some(FanLevel::Low)
    } else if speed < 67.0 {
        Some(FanLevel::Medium)
    } else {
        Some(FanLevel::High)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct AccessoryWrite {
    #[serde(default)]
    pub on: Option<bool>,
    #[serde(default, rename = "rotationSpeed")]
    pub rotation_speed: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessoryCommand {
    PowerOff,
    PowerOn(FanLevel),
}

impl AccessoryWrite {
    pub fn resolve(&self, current: FanLevel) -> AccessoryCommand {
        if self.on == Some(false) {
            return AccessoryCommand::PowerOff;
        }
        match self.rotation_speed {
            Some(speed) => match level_for_speed(speed) {
                Some(level) => AccessoryCommand::PowerOn(level),
                None => AccessoryCommand::PowerOff,
            },
            None => AccessoryCommand::PowerOn(current),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Characteristics {
    pub on: bool,
    #[serde(rename = "rotationSpeed")]
    pub rotation_speed: f32,
}

impl From<StateChange> for Characteristics {
    fn from(change: StateChange) -> Self {
        Self {
            on: change.on,
            rotation_speed: rotation_speed(change.on, change.level),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessorySnapshot {
    pub name: String,
    pub model: String,
    pub manufacturer: String,
    pub serial_number: String,
    pub firmware_revision: String,
    pub setup_id: String,
    pub characteristics: Characteristics,
}

/// Last values published to the accessory protocol.
pub struct AccessoryMirror {
    config: AccessoryConfig,
    values: Mutex<Characteristics>,
}

impl AccessoryMirror {
    pub fn new(config: AccessoryConfig, initial: FanState) -> Self {
        Self {
            config,
            values: Mutex::new(StateChange::from(initial).into()),
        }
    }

    pub fn characteristics(&self) -> Characteristics {
        *lock_shared(&self.values)
    }

    pub fn snapshot(&self) -> AccessorySnapshot {
        AccessorySnapshot {
            name: self.config.name.clone(),
            model: self.config.model.clone(),
            manufacturer: self.config.manufacturer.clone(),
            serial_number: self.config.serial_number.clone(),
            firmware_revision: self.config.firmware_revision.clone(),
            setup_id: self.config.setup_id.clone(),
            characteristics: self.characteristics(),
        }
    }

    pub fn sync(&self, change: StateChange) {
        let values = Characteristics::from(change);
        info!(
            "accessory sync: on={}, rotation_speed={}",
            values.on, values.rotation_speed
        );
        *lock_shared(&self.values) = values;
    }

    /// Applies a controller-side write coming from the accessory protocol and
    /// republishes the resulting state.
    pub fn apply_write<O: SpeedOutputs, S: LevelStore>(
        &self,
        controller: &Mutex<FanController<O, S>>,
        write: AccessoryWrite,
    ) -> FanState {
        let state = {
            let mut controller = lock_shared(controller);
            match write.resolve(controller.current_level()) {
                AccessoryCommand::PowerOff => controller.set_power(false),
                AccessoryCommand::PowerOn(level) => controller.power_on_at(level),
            }
        };
        self.sync(state.into());
        state
    }
}

impl StateChangeHook for AccessoryMirror {
    fn on_state_change(&self, change: StateChange) {
        self.sync(change);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        blink::blink_channel,
        config::FanConfig,
        controller::fire_expired_timer,
        outputs::LedHandle,
        testing::{MemoryLevelStore, RecordingLed, RecordingOutputs},
    };
    use pretty_assertions::assert_eq;

    fn shared_controller() -> Mutex<FanController<RecordingOutputs, MemoryLevelStore>> {
        let (blink, _) = blink_channel(4);
        Mutex::new(FanController::new(
            FanConfig::default(),
            RecordingOutputs::default(),
            MemoryLevelStore::empty(),
            LedHandle::new(RecordingLed::default()),
            blink,
        ))
    }

    #[test]
    fn rotation_speed_follows_level_tiers() {
        assert_eq!(rotation_speed(true, 1), 33.0);
        assert_eq!(rotation_speed(true, 2), 66.0);
        assert_eq!(rotation_speed(true, 3), 100.0);
        assert_eq!(rotation_speed(false, 3), 0.0);
        assert_eq!(rotation_speed(false, 0), 0.0);
    }

    #[test]
    fn speed_writes_bucket_into_levels() {
        assert_eq!(level_for_speed(0.0), None);
        assert_eq!(level_for_speed(1.0), Some(FanLevel::Low));
        assert_eq!(level_for_speed(33.9), Some(FanLevel::Low));
        assert_eq!(level_for_speed(34.0), Some(FanLevel::Medium));
        assert_eq!(level_for_speed(66.0), Some(FanLevel::Medium));
        assert_eq!(level_for_speed(67.0), Some(FanLevel::High));
        assert_eq!(level_for_speed(100.0), Some(FanLevel::High));
    }

    #[test]
    fn write_resolution() {
        let off = AccessoryWrite {
            on: Some(false),
            rotation_speed: Some(100.0),
        };
        assert_eq!(off.resolve(FanLevel::Low), AccessoryCommand::PowerOff);

        let zero = AccessoryWrite {
            on: Some(true),
            rotation_speed: Some(0.0),
        };
        assert_eq!(zero.resolve(FanLevel::Low), AccessoryCommand::PowerOff);

        let bare_on = AccessoryWrite {
            on: Some(true),
            rotation_speed: None,
        };
        assert_eq!(
            bare_on.resolve(FanLevel::Medium),
            AccessoryCommand::PowerOn(FanLevel::Medium)
        );

        let speed_only: AccessoryWrite = serde_json::from_str(r#"{"rotationSpeed":50}"#).unwrap();
        assert_eq!(
            speed_only.resolve(FanLevel::High),
            AccessoryCommand::PowerOn(FanLevel::Medium)
        );
    }

    #[test]
    fn apply_write_drives_controller_and_refreshes_mirror() {
        let controller = shared_controller();
        let mirror = AccessoryMirror::new(
            AccessoryConfig::default(),
            lock_shared(&controller).state(),
        );
        assert!(!mirror.characteristics().on);

        let write = AccessoryWrite {
            on: Some(true),
            rotation_speed: Some(20.0),
        };
        let state = mirror.apply_write(&controller, write);

        assert_eq!(
            state,
            FanState {
                on: true,
                level: FanLevel::Low
            }
        );
        assert_eq!(
            mirror.characteristics(),
            Characteristics {
                on: true,
                rotation_speed: 33.0
            }
        );
    }

    #[test]
    fn timer_expiry_reaches_mirror_through_hook() {
        let controller = shared_controller();
        let mirror = AccessoryMirror::new(AccessoryConfig::default(), FanState {
            on: false,
            level: FanLevel::High,
        });
        mirror.apply_write(&controller, AccessoryWrite {
            on: Some(true),
            rotation_speed: None,
        });
        lock_shared(&controller).arm_off_timer(1, 0).unwrap();

        assert!(fire_expired_timer(&controller, &mirror, 1_000));

        assert_eq!(
            mirror.characteristics(),
            Characteristics {
                on: false,
                rotation_speed: 0.0
            }
        );
    }

    #[test]
    fn snapshot_carries_identity() {
        let mirror = AccessoryMirror::new(AccessoryConfig::default(), FanState {
            on: true,
            level: FanLevel::Medium,
        });
        let snapshot = serde_json::to_value(mirror.snapshot()).unwrap();

        assert_eq!(snapshot["setup_id"], "7G9X");
        assert_eq!(snapshot["characteristics"]["rotationSpeed"], 66.0);
        assert_eq!(snapshot["characteristics"]["on"], true);
    }
}
