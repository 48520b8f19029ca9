use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SetStateError {
    #[error("invalid fan speed level: {0}")]
    InvalidLevel(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TimerError {
    #[error("invalid timer duration: {0}s")]
    InvalidDuration(i64),
    #[error("no timer running")]
    NoActiveTimer,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend failure: {0}")]
    Backend(String),
    #[error("corrupt stored record: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to drive GPIO{pin}: {reason}")]
    Write { pin: i32, reason: String },
}
