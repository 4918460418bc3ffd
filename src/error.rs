use thiserror::Error;

/// Errors the engine can report to its caller.
///
/// Per the error handling design: `Config` and `Fatal` terminate the daemon,
/// `WatchFailed` is logged and tolerated, and `FifoCorruption` represents a
/// collapse-rule violation that should never happen in a well-formed caller
/// and is therefore usually raised via `panic!` rather than returned here —
/// this variant exists for the rare spot (e.g. a user-supplied `collapse`
/// callback) where the violation can be attributed to external input instead
/// of an engine bug.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to add watch: {0}")]
    WatchFailed(String),

    #[error("FIFO corruption: {0}")]
    FifoCorruption(String),

    #[error("fatal: {0}")]
    Fatal(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
