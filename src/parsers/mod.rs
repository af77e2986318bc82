//! Default leaf parsers and ladder resolution.
//!
//! `spec.md` §1 treats individual leaf parsers as external collaborators
//! whose numeric semantics are out of scope; this crate still ships working
//! defaults (plain `std::str::FromStr` for the numeric types, `chrono` for
//! date-time/timestamp) so the crate is directly usable, the same way the
//! teacher's `fast-export` ships concrete `Parser`/`DataReader`
//! implementations rather than only traits.

mod boolean;
mod char;
mod datetime;
mod numeric;
mod string;
mod support;
mod timestamp;

pub use boolean::BooleanParser;
pub use char::CharParser;
pub use datetime::DateTimeParser;
pub use numeric::{ByteParser, DoubleParser, FloatParser, IntParser, LongParser, ShortParser};
pub use string::StringParser;
pub use timestamp::{TimestampParser, TimestampResolution};

use std::sync::Arc;

use crate::config::ReaderConfig;
use crate::error::{ConfigError, Result};
use crate::typing::{NumericRank, Parser, ParserGroup, ParserName, ResolvedLadder};

/// Builds one concrete, ordered [`ResolvedLadder`] for a column from its
/// configured [`ParserName`] list, validating the configuration-failure
/// cases `spec.md` §7 names: two float parsers, numeric mixed with
/// timestamp, or an empty ladder.
pub(crate) fn resolve_ladder(
    names: &[ParserName],
    column: usize,
    config: &ReaderConfig,
) -> Result<ResolvedLadder> {
    if names.is_empty() {
        return Err(ConfigError::EmptyParserLadder { column }.into());
    }

    let parsers: Vec<Arc<dyn Parser>> = names
        .iter()
        .map(|name| resolve_one(name, column, config))
        .collect::<Result<_>>()?;

    let float_count = parsers
        .iter()
        .filter(|p| matches!(p.group(), ParserGroup::Numeric(NumericRank::FloatFast | NumericRank::FloatStrict)))
        .count();
    if float_count > 1 {
        return Err(ConfigError::ConflictingFloatParsers { column }.into());
    }

    let has_numeric = parsers.iter().any(|p| matches!(p.group(), ParserGroup::Numeric(_)));
    let has_timestamp = parsers.iter().any(|p| p.group() == ParserGroup::Timestamp);
    if has_numeric && has_timestamp {
        return Err(ConfigError::NumericTimestampConflict { column }.into());
    }

    Ok(ResolvedLadder { parsers })
}

/// Resolves a single [`ParserName`] to a concrete parser, consulting the
/// caller's custom-parser/double-parser/time-zone-parser overrides from
/// `config` where relevant.
pub(crate) fn resolve_one(name: &ParserName, column: usize, config: &ReaderConfig) -> Result<Arc<dyn Parser>> {
    Ok(match name {
        ParserName::Byte => Arc::new(ByteParser),
        ParserName::Short => Arc::new(ShortParser),
        ParserName::Int => Arc::new(IntParser),
        ParserName::Long => Arc::new(LongParser),
        ParserName::FloatFast => Arc::new(FloatParser {
            rank: NumericRank::FloatFast,
            name: "float_fast",
        }),
        ParserName::FloatStrict => Arc::new(FloatParser {
            rank: NumericRank::FloatStrict,
            name: "float_strict",
        }),
        ParserName::Double => Arc::new(DoubleParser {
            custom: config.custom_double_parser.clone(),
        }),
        ParserName::TimestampSeconds => Arc::new(TimestampParser {
            resolution: TimestampResolution::Seconds,
        }),
        ParserName::TimestampMillis => Arc::new(TimestampParser {
            resolution: TimestampResolution::Millis,
        }),
        ParserName::TimestampMicros => Arc::new(TimestampParser {
            resolution: TimestampResolution::Micros,
        }),
        ParserName::TimestampNanos => Arc::new(TimestampParser {
            resolution: TimestampResolution::Nanos,
        }),
        ParserName::DateTime => Arc::new(DateTimeParser {
            custom_time_zone: config.custom_time_zone_parser.clone(),
        }),
        ParserName::Boolean => Arc::new(BooleanParser),
        ParserName::Char => Arc::new(CharParser),
        ParserName::String => Arc::new(StringParser),
        ParserName::Custom(custom_name) => config
            .custom_parsers
            .get(custom_name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownCustomParser {
                column,
                name: custom_name.clone(),
            })?,
    })
}
