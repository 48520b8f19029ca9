pub mod accessory;
pub mod api;
pub mod blink;
pub mod button;
pub mod config;
pub mod controller;
pub mod error;
pub mod hook;
pub mod outputs;
pub mod store;
pub mod types;

#[cfg(test)]
mod testing;

pub use accessory::{AccessoryMirror, AccessoryWrite, Characteristics};
pub use blink::{blink_channel, run_blink_worker, BlinkReceiver, BlinkSender};
pub use button::LongPress;
pub use config::{AccessoryConfig, FanConfig, NetworkConfig, PinConfig, RuntimeConfig};
pub use controller::{fire_expired_timer, lock_shared, FanController};
pub use error::{OutputError, SetStateError, StoreError, TimerError};
pub use hook::StateChangeHook;
pub use outputs::{LedHandle, SpeedOutputs, StatusLed};
pub use store::{LevelStore, LEVEL_KEY, LEVEL_NAMESPACE};
pub use types::{FanLevel, FanState, FanStatus, StateChange, OFF_LEVEL};
