//! Parser ladder and two-pass typing engine.
//!
//! Grounded on the two-cursor structure `spec.md` §4.7 dictates directly:
//! two independent [`IteratorHolder`]s over the same column, one used for
//! trial parsing and one held in reserve for the backfill pass, mirroring
//! the clone semantics already built into `DenseStorageReader`
//! (`src/storage/reader.rs`). There is no teacher analog for the ladder
//! itself (the teacher has no typed-inference layer at all); the engine's
//! control flow below is written in the teacher's preferred style of small,
//! explicit functions over a loop rather than a generic visitor.

mod engine;

pub use engine::TypingEngine;

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::sink::{SinkFactory, Value};
use crate::storage::IteratorHolder;

/// Which precedence group a parser belongs to, used to order the ladder and
/// to enforce the "at most one float, never mixed with timestamp" rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserGroup {
    Numeric(NumericRank),
    Timestamp,
    DateTime,
    Boolean,
    Custom,
    Char,
    String,
}

/// Widening precedence within the numeric group, narrowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NumericRank {
    Byte,
    Short,
    Int,
    Long,
    FloatFast,
    FloatStrict,
    Double,
}

/// Names a parser the caller can put in a ladder. Built-in names resolve to
/// this crate's default leaf parsers (`src/parsers/`); `Custom` names one of
/// the caller's own parsers registered in
/// [`crate::config::ReaderConfig`]'s custom-parser map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParserName {
    Byte,
    Short,
    Int,
    Long,
    FloatFast,
    FloatStrict,
    Double,
    TimestampSeconds,
    TimestampMillis,
    TimestampMicros,
    TimestampNanos,
    DateTime,
    Boolean,
    Char,
    String,
    Custom(String),
}

impl ParserName {
    /// The ladder used by `ReaderConfig::default()`: a widening numeric
    /// chain with a string fallback, matching the ladder used throughout
    /// `spec.md` §8's concrete scenarios.
    pub fn default_numeric_ladder() -> Vec<ParserName> {
        vec![
            ParserName::Byte,
            ParserName::Short,
            ParserName::Int,
            ParserName::Long,
            ParserName::Double,
            ParserName::String,
        ]
    }
}

/// Per-parser scratch obtained from [`Parser::make_context`]: a sink handle
/// and the chunk size writes are batched into.
pub struct ParserContext {
    pub sink: Box<dyn crate::sink::Sink>,
    pub chunk_size: usize,
}

/// Default chunk size for buffered sink writes.
pub const DEFAULT_CHUNK_SIZE: usize = 65_536;

/// Shared per-column parsing state threaded through every parser call.
pub struct GlobalContext<'a> {
    pub column: usize,
    pub column_name: &'a str,
    pub null_literals: &'a [String],
    pub sink_factory: &'a mut dyn SinkFactory,
}

impl<'a> GlobalContext<'a> {
    pub fn is_null(&self, text: &[u8]) -> bool {
        self.null_literals.iter().any(|lit| lit.as_bytes() == text)
    }
}

/// One leaf parser in the ladder. Implementors are the external collaborator
/// named in `spec.md` §4.8; this crate ships default implementations in
/// `src/parsers/` so it is directly usable.
pub trait Parser: Send + Sync {
    /// Stable identifier used in error messages (`spec.md` §7's "parser
    /// identifier").
    fn name(&self) -> &'static str;

    fn group(&self) -> ParserGroup;

    fn sink_kind(&self) -> crate::sink::SinkKind;

    /// Cheap pre-check used by the engine's group-selection probes: does
    /// this cell's text look like a value this parser would accept? Used
    /// only to pick an initial ladder ordering, never as a substitute for
    /// `try_parse`'s own validation.
    fn tokenizes(&self, text: &[u8]) -> bool;

    fn make_context(&self, global: &mut GlobalContext) -> ParserContext {
        ParserContext {
            sink: global.sink_factory.make_sink(global.column, self.sink_kind()),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Consumes cells from `iter` starting at its current position, up to
    /// logical index `end` (exclusive), writing values and null flags to
    /// `ctx.sink` in chunks of `ctx.chunk_size`. Returns the logical index
    /// one past the last successfully-written cell: `end` on full success,
    /// or the index of the first cell this parser could not accept.
    ///
    /// `appending` is forwarded to the sink unchanged: `true` while
    /// extending the array forward, `false` while backfilling the leading
    /// null run during the second phase.
    fn try_parse(
        &self,
        global: &GlobalContext,
        ctx: &mut ParserContext,
        iter: &mut IteratorHolder,
        begin: usize,
        end: usize,
        appending: bool,
    ) -> Result<usize>;

    /// Converts an already-parsed value of another numeric parser's type
    /// into this parser's element type, for the widen-by-unification path.
    /// Only numeric parsers need to implement this meaningfully; the
    /// default panics, matching the invariant that unification is only ever
    /// attempted among numeric parsers.
    fn widen_from(&self, value: &Value) -> Value {
        let _ = value;
        panic!("{} does not support numeric widening", self.name())
    }
}

impl fmt::Debug for dyn Parser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Parser({})", self.name())
    }
}

/// A resolved, ordered ladder: the concrete parsers for one column, plus
/// which ones are "custom" (supplied by the caller rather than this crate).
#[derive(Clone)]
pub struct ResolvedLadder {
    pub parsers: Vec<Arc<dyn Parser>>,
}

impl ResolvedLadder {
    pub fn has_numeric(&self) -> bool {
        self.parsers
            .iter()
            .any(|p| matches!(p.group(), ParserGroup::Numeric(_)))
    }

    pub fn numeric_in_precedence_order(&self) -> Vec<Arc<dyn Parser>> {
        let mut numeric: Vec<Arc<dyn Parser>> = self
            .parsers
            .iter()
            .filter(|p| matches!(p.group(), ParserGroup::Numeric(_)))
            .cloned()
            .collect();
        numeric.sort_by_key(|p| match p.group() {
            ParserGroup::Numeric(rank) => rank,
            _ => unreachable!(),
        });
        numeric
    }

    pub fn find(&self, group: ParserGroup) -> Option<Arc<dyn Parser>> {
        self.parsers
            .iter()
            .find(|p| p.group() == group)
            .cloned()
    }

    pub fn customs(&self) -> Vec<Arc<dyn Parser>> {
        self.parsers
            .iter()
            .filter(|p| p.group() == ParserGroup::Custom)
            .cloned()
            .collect()
    }

    pub fn char_and_string(&self) -> Vec<Arc<dyn Parser>> {
        self.parsers
            .iter()
            .filter(|p| matches!(p.group(), ParserGroup::Char | ParserGroup::String))
            .cloned()
            .collect()
    }
}
