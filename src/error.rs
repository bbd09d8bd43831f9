use thiserror::Error;

/// Hard precondition failures of the matching engine. The caller skips the
/// anchor; the engine never substitutes data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("insufficient history: need {required} bars, have {available}")]
    InsufficientHistory { required: usize, available: usize },
    #[error("anchor index {anchor_index} out of range for series of {len} bars")]
    AnchorOutOfRange { anchor_index: usize, len: usize },
    #[error("invalid engine config: {0}")]
    InvalidConfig(String),
}
