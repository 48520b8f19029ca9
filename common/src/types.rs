use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SetStateError;

/// Level reported to observers when the fan is switched off by the timer.
pub const OFF_LEVEL: u8 = 0;

/// Speed tier; each one owns exactly one relay line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum FanLevel {
    Low,
    Medium,
    High,
}

impl FanLevel {
    pub const ALL: [FanLevel; 3] = [Self::Low, Self::Medium, Self::High];

    pub fn as_i32(self) -> i32 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
        }
    }

    pub fn as_u8(self) -> u8 {
        self.as_i32() as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

impl TryFrom<i32> for FanLevel {
    type Error = SetStateError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Low),
            2 => Ok(Self::Medium),
            3 => Ok(Self::High),
            other => Err(SetStateError::InvalidLevel(other)),
        }
    }
}

impl From<FanLevel> for i32 {
    fn from(level: FanLevel) -> Self {
        level.as_i32()
    }
}

impl fmt::Display for FanLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i32())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanState {
    pub on: bool,
    pub level: FanLevel,
}

/// Payload handed to the notification hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub on: bool,
    pub level: u8,
}

impl StateChange {
    pub fn timer_off() -> Self {
        Self {
            on: false,
            level: OFF_LEVEL,
        }
    }
}

impl From<FanState> for StateChange {
    fn from(state: FanState) -> Self {
        Self {
            on: state.on,
            level: state.level.as_u8(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FanStatus {
    pub status: u8,
    pub timer_left: u64,
    pub level: i32,
    pub timer_armed: bool,
}
