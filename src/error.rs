//! Error taxonomy for the query core.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, QueryError>;

/// Errors the query core can raise.
///
/// Variants fall into two groups: caller-facing lookup misses
/// (`NoSuchName`, `NoSuchId`) that surface as-is, and programming-error /
/// I/O classes that are fatal to the in-flight query (everything else).
#[derive(Error, Debug)]
pub enum QueryError {
    /// A timestamp fell outside `[1, 2^32)`.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(u32),

    /// `start_time >= end_time`.
    #[error("time range invalid: start {start} >= end {end}")]
    TimeRangeInvalid {
        /// Requested start time.
        start: u32,
        /// Requested end time.
        end: u32,
    },

    /// A tag/metric name could not be resolved by the intern service.
    #[error("no such name: {kind} {name:?}")]
    NoSuchName {
        /// Which identifier space the lookup was against.
        kind: &'static str,
        /// The name that failed to resolve.
        name: String,
    },

    /// An id could not be reverse-resolved to a name.
    #[error("no such id: {kind} <{id:?}>")]
    NoSuchId {
        /// Which identifier space the lookup was against.
        kind: &'static str,
        /// The raw id bytes that failed to resolve.
        id: Vec<u8>,
    },

    /// A row added to a Span does not share the Span's series identity.
    #[error("row does not match the Span's series identity")]
    SeriesMismatch,

    /// A row was added whose first timestamp is not strictly after the
    /// Span's (or RowSeq's) last timestamp, and it cannot be merged.
    #[error("row out of order: cannot extend Span/RowSeq")]
    OutOfOrderRow,

    /// The store returned a row outside the requested metric range.
    #[error("scanner invariant violated: {0}")]
    ScannerInvariant(String),

    /// I/O failure from the store scanner. Fatal to the query.
    #[error("storage error: {0}")]
    StorageError(String),

    /// A row key's length does not match `W_m + T + k*(W_n+W_v)`.
    #[error("malformed row key: length {len} does not fit the row schema")]
    MalformedKey {
        /// The offending key's length in bytes.
        len: usize,
    },

    /// A cell's value bytes did not match the width the flag bits implied.
    #[error("malformed cell value: expected {expected} bytes, got {actual}")]
    MalformedValue {
        /// Expected value width in bytes.
        expected: usize,
        /// Actual value width in bytes.
        actual: usize,
    },

    /// An iterator was advanced past its last point.
    #[error("iterator exhausted")]
    Exhausted,

    /// Schema/`Config`-level validation failure (ambient addition; not
    /// part of the query-time taxonomy but needed to reject a malformed
    /// `Schema` at construction).
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// `run()` was called before the query was fully configured (ambient
    /// addition, the same "validate before use" class as `InvalidSchema`).
    #[error("query not fully configured: {0}")]
    QueryNotConfigured(&'static str),

    /// The filter builder produced a pattern the regex engine rejects.
    /// Since the builder only ever emits hex-escaped literals and fixed
    /// quantifiers over a merge walk it controls end to end, this
    /// indicates a builder bug rather than a malformed query.
    #[error("filter pattern failed to compile: {0}")]
    FilterCompileError(String),
}

impl QueryError {
    /// True for errors that are non-recoverable at the query level: the
    /// whole query must abort rather than continue with partial results.
    pub fn is_fatal_to_query(&self) -> bool {
        !matches!(self, Self::NoSuchName { .. } | Self::NoSuchId { .. })
    }

    /// A short, stable category label, useful for log fields / metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidTimestamp(_) | Self::TimeRangeInvalid { .. } => "time_range",
            Self::NoSuchName { .. } | Self::NoSuchId { .. } => "lookup",
            Self::SeriesMismatch | Self::OutOfOrderRow => "span_invariant",
            Self::ScannerInvariant(_) => "scanner_invariant",
            Self::StorageError(_) => "storage",
            Self::MalformedKey { .. } | Self::MalformedValue { .. } => "malformed_wire_data",
            Self::Exhausted => "iterator",
            Self::InvalidSchema(_) | Self::QueryNotConfigured(_) => "config",
            Self::FilterCompileError(_) => "filter_builder",
        }
    }
}
