//! Streaming, type-inferring CSV reader with zero-copy cell storage.
//!
//! [`read`] tokenizes a byte stream into cells, fans them out column-wise
//! into dense append-only storage, and runs a two-pass type-inference engine
//! over each column independently, producing one typed [`Column`] per
//! header. See the crate's `SPEC_FULL.md` for the full design.

mod bytes;
mod config;
mod coordinator;
mod error;
mod grabber;
mod header;
mod parsers;
mod sink;
mod storage;
mod typing;

pub use config::{
    FixedWidthConfig, NullLiteralOverrides, ParserOverrides, ReaderConfig, ReaderConfigBuilder, RowShapePolicy,
};
pub use coordinator::{read, CsvReadResult};
pub use error::{ConfigError, CsvError, MalformedError, Result};
pub use grabber::CharCountConvention;
pub use header::HeaderOverrides;
pub use parsers::{
    BooleanParser, ByteParser, CharParser, DateTimeParser, DoubleParser, FloatParser, IntParser, LongParser,
    ShortParser, StringParser, TimestampParser, TimestampResolution,
};
pub use sink::{Column, ColumnData, Sink, SinkFactory, SinkKind, Value, VecSinkFactory};
pub use typing::{
    GlobalContext, NumericRank, Parser, ParserContext, ParserGroup, ParserName, ResolvedLadder, DEFAULT_CHUNK_SIZE,
};
