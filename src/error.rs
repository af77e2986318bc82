//! Crate-wide error type.
//!
//! Mirrors the flat, `thiserror`-derived enum style used by the teacher's
//! `StreamError`/`ParseError`: one enum per failure domain, `#[error(...)]`
//! messages, and `#[from]` conversions for the lower-level I/O error.

use std::io;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CsvError>;

/// A single failure type carrying a message chain, per the error handling
/// design: any fatal error anywhere in the pipeline is wrapped as one of
/// these and propagates out of the coordinator.
#[derive(Debug, Error)]
pub enum CsvError {
    /// The raw byte stream does not tokenize as valid CSV.
    #[error("malformed input: {0}")]
    Malformed(#[from] MalformedError),

    /// Every parser in a column's ladder failed.
    #[error(
        "inference failed for column {column}: parser {parser} rejected the input \
         after successfully parsing {parsed_count} value(s)"
    )]
    Inference {
        column: usize,
        parser: &'static str,
        parsed_count: usize,
    },

    /// The caller-supplied parser ladder or sink factory is contradictory.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// A parser accepted a cell during the forward pass but rejected the same
    /// cell, or failed to advance, during the backfill pass. This is always a
    /// bug in that parser, not a problem with the input.
    #[error(
        "second-phase contract violated by parser {parser} on column {column}: \
         a parser that succeeds on the forward pass must also succeed when \
         backfilling the leading null run"
    )]
    SecondPhaseContract { column: usize, parser: &'static str },

    /// A producer or consumer thread was interrupted while blocked waiting on
    /// the dense-storage semaphore or condition variable.
    #[error("interrupted while waiting on column {column}")]
    Interrupted { column: usize },

    /// Propagated I/O error from the underlying byte stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Malformed-input failure kinds, from the cell grabbers and header resolvers.
#[derive(Debug, Error)]
pub enum MalformedError {
    #[error("unterminated quoted field starting at physical row {row}")]
    UnterminatedQuote { row: u64 },

    #[error(
        "unexpected byte {found:?} after closing quote at physical row {row}; \
         expected delimiter or end of line"
    )]
    ByteAfterQuote { row: u64, found: u8 },

    #[error("invalid UTF-8 starting byte {byte:#04x} at physical row {row}")]
    InvalidUtf8Start { row: u64, byte: u8 },

    #[error(
        "row {row} has {found} cell(s), expected {expected} (enable `allow_missing_columns` \
         or `ignore_excess_columns` to tolerate this)"
    )]
    RowShapeMismatch {
        row: u64,
        found: usize,
        expected: usize,
    },

    #[error("fixed-width header row starts with a delimiter byte at physical row {row}")]
    DelimiterAtRowStart { row: u64 },

    #[error(
        "character at offset {char_offset} on physical row {row} would split a \
         surrogate pair across fixed-width columns"
    )]
    SplitSurrogatePair { row: u64, char_offset: usize },
}

/// Configuration failures, detected before or during the first pass.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("column {column}: more than one floating-point parser in the parser ladder")]
    ConflictingFloatParsers { column: usize },

    #[error("column {column}: numeric parsers cannot be combined with timestamp parsers")]
    NumericTimestampConflict { column: usize },

    #[error("column {column}: parser ladder is empty")]
    EmptyParserLadder { column: usize },

    #[error("column {column}: contains only null cells and no null_parser is configured")]
    EmptyColumnNoNullParser { column: usize },

    #[error("headers override has {given} name(s) but the file has {found} column(s)")]
    HeaderCountMismatch { given: usize, found: usize },

    #[error("column {column}: parser ladder names unknown custom parser {name:?}")]
    UnknownCustomParser { column: usize, name: String },
}
