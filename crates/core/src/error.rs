use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupt delta: {0}")]
    CorruptDelta(String),

    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    #[error("invalid cell key: {0}")]
    InvalidCellKey(String),

    #[error("system clock before epoch")]
    ClockUnavailable,
}
