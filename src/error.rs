//! Crate-wide error types.
//!
//! One variant per failure class, grounded on the narrow, per-source-crate
//! `thiserror` enums used elsewhere in this codebase (one `#[error(...)]`
//! per failure, `#[from]` where the source is unambiguous).

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("serial transport I/O error")]
    Io(#[from] std::io::Error),

    #[error("duplicate store error")]
    DuplicateStore(#[source] rusqlite::Error),

    #[error("hardware abstraction error: {0}")]
    Hal(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("protocol violation: {0}")]
    Protocol(&'static str),

    #[error("batch/log persistence error")]
    Logging(#[source] std::io::Error),
}

impl From<rusqlite::Error> for SupervisorError {
    fn from(err: rusqlite::Error) -> Self {
        SupervisorError::DuplicateStore(err)
    }
}

/// Error returned by batch configuration / QR parsing, kept separate from
/// [`SupervisorError`] because these are pure, synchronous parse failures
/// with no I/O involved.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("batch id '{0}' does not match the required MV<X><YY><NNNNN> format")]
    InvalidBatchId(String),

    #[error("mould name '{0}' must be 3 alphanumeric characters starting with a letter")]
    InvalidMouldName(String),

    #[error("mould range start '{0}' must be {1} alphanumeric characters")]
    InvalidRangeLength(String, usize),

    #[error("mould range for '{name}' has start {start} greater than end {end}")]
    RangeOutOfOrder {
        name: String,
        start: String,
        end: String,
    },

    #[error("mould range for '{name}' does not encode line '{line}' at position 1")]
    RangeLineMismatch { name: String, line: char },

    #[error("mould range bounds for '{name}' do not encode the mould name at positions 2..5")]
    RangeNameMismatch { name: String },

    #[error("duplicate mould name '{0}' in batch")]
    DuplicateMould(String),

    #[error("batch must have at least one mould range")]
    EmptyBatch,

    #[error("mould ranges for '{0}' and '{1}' overlap")]
    OverlappingRanges(String, String),
}
