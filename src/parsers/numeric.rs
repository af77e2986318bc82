//! Integer and floating-point leaf parsers, in widening precedence order.
//!
//! Grounded on `spec.md` §4.7's numeric ladder (`byte -> short -> int -> long
//! -> float-fast | float-strict -> double`). "Fast" and "strict" float
//! parsers both parse the same textual grammar here (Rust's `f32::from_str`
//! has no locale/lenient-format distinction to differentiate them on); the
//! names are kept distinct because they are two mutually-exclusive slots in
//! the ladder per `spec.md`; a caller wanting a genuinely different fast/lossy
//! float grammar would supply a `Custom` parser in that slot instead.

use super::support::{run_parse_loop, trimmed_str};
use crate::error::Result;
use crate::sink::{SinkKind, Value};
use crate::storage::IteratorHolder;
use crate::typing::{GlobalContext, NumericRank, Parser, ParserContext, ParserGroup};

/// Widens an already-parsed integer `Value` to `i64`, for the unification
/// path in the typing engine's numeric fast path.
fn int_widen(value: &Value) -> i64 {
    match value {
        Value::I8(x) => *x as i64,
        Value::I16(x) => *x as i64,
        Value::I32(x) => *x as i64,
        Value::I64(x) => *x,
        other => panic!("cannot widen non-integer value {other:?} to an integer type"),
    }
}

/// Widens an already-parsed numeric `Value` (integer or float) to `f64`.
fn float_widen(value: &Value) -> f64 {
    match value {
        Value::I8(x) => *x as f64,
        Value::I16(x) => *x as f64,
        Value::I32(x) => *x as f64,
        Value::I64(x) => *x as f64,
        Value::F32(x) => *x as f64,
        Value::F64(x) => *x,
        other => panic!("cannot widen {other:?} to a floating-point type"),
    }
}

pub struct ByteParser;

impl Parser for ByteParser {
    fn name(&self) -> &'static str {
        "byte"
    }
    fn group(&self) -> ParserGroup {
        ParserGroup::Numeric(NumericRank::Byte)
    }
    fn sink_kind(&self) -> SinkKind {
        SinkKind::I8
    }
    fn tokenizes(&self, text: &[u8]) -> bool {
        trimmed_str(text).and_then(|s| s.parse::<i8>().ok()).is_some()
    }
    fn try_parse(
        &self,
        global: &GlobalContext,
        ctx: &mut ParserContext,
        iter: &mut IteratorHolder,
        begin: usize,
        end: usize,
        appending: bool,
    ) -> Result<usize> {
        run_parse_loop(global, ctx, iter, begin, end, appending, Value::I8(0), |bytes| {
            trimmed_str(bytes).and_then(|s| s.parse::<i8>().ok()).map(Value::I8)
        })
    }
}

pub struct ShortParser;

impl Parser for ShortParser {
    fn name(&self) -> &'static str {
        "short"
    }
    fn group(&self) -> ParserGroup {
        ParserGroup::Numeric(NumericRank::Short)
    }
    fn sink_kind(&self) -> SinkKind {
        SinkKind::I16
    }
    fn tokenizes(&self, text: &[u8]) -> bool {
        trimmed_str(text).and_then(|s| s.parse::<i16>().ok()).is_some()
    }
    fn try_parse(
        &self,
        global: &GlobalContext,
        ctx: &mut ParserContext,
        iter: &mut IteratorHolder,
        begin: usize,
        end: usize,
        appending: bool,
    ) -> Result<usize> {
        run_parse_loop(global, ctx, iter, begin, end, appending, Value::I16(0), |bytes| {
            trimmed_str(bytes).and_then(|s| s.parse::<i16>().ok()).map(Value::I16)
        })
    }
    fn widen_from(&self, value: &Value) -> Value {
        Value::I16(int_widen(value) as i16)
    }
}

pub struct IntParser;

impl Parser for IntParser {
    fn name(&self) -> &'static str {
        "int"
    }
    fn group(&self) -> ParserGroup {
        ParserGroup::Numeric(NumericRank::Int)
    }
    fn sink_kind(&self) -> SinkKind {
        SinkKind::I32
    }
    fn tokenizes(&self, text: &[u8]) -> bool {
        trimmed_str(text).and_then(|s| s.parse::<i32>().ok()).is_some()
    }
    fn try_parse(
        &self,
        global: &GlobalContext,
        ctx: &mut ParserContext,
        iter: &mut IteratorHolder,
        begin: usize,
        end: usize,
        appending: bool,
    ) -> Result<usize> {
        run_parse_loop(global, ctx, iter, begin, end, appending, Value::I32(0), |bytes| {
            trimmed_str(bytes).and_then(|s| s.parse::<i32>().ok()).map(Value::I32)
        })
    }
    fn widen_from(&self, value: &Value) -> Value {
        Value::I32(int_widen(value) as i32)
    }
}

pub struct LongParser;

impl Parser for LongParser {
    fn name(&self) -> &'static str {
        "long"
    }
    fn group(&self) -> ParserGroup {
        ParserGroup::Numeric(NumericRank::Long)
    }
    fn sink_kind(&self) -> SinkKind {
        SinkKind::I64
    }
    fn tokenizes(&self, text: &[u8]) -> bool {
        trimmed_str(text).and_then(|s| s.parse::<i64>().ok()).is_some()
    }
    fn try_parse(
        &self,
        global: &GlobalContext,
        ctx: &mut ParserContext,
        iter: &mut IteratorHolder,
        begin: usize,
        end: usize,
        appending: bool,
    ) -> Result<usize> {
        run_parse_loop(global, ctx, iter, begin, end, appending, Value::I64(0), |bytes| {
            trimmed_str(bytes).and_then(|s| s.parse::<i64>().ok()).map(Value::I64)
        })
    }
    fn widen_from(&self, value: &Value) -> Value {
        Value::I64(int_widen(value))
    }
}

/// Which of the two mutually-exclusive float-parser slots this is. Both
/// parse identical grammar; the distinction only matters for the
/// at-most-one-float configuration check in `src/parsers/mod.rs`.
pub struct FloatParser {
    pub(super) rank: NumericRank,
    pub(super) name: &'static str,
}

impl Parser for FloatParser {
    fn name(&self) -> &'static str {
        self.name
    }
    fn group(&self) -> ParserGroup {
        ParserGroup::Numeric(self.rank)
    }
    fn sink_kind(&self) -> SinkKind {
        SinkKind::F32
    }
    fn tokenizes(&self, text: &[u8]) -> bool {
        trimmed_str(text).and_then(|s| s.parse::<f32>().ok()).is_some()
    }
    fn try_parse(
        &self,
        global: &GlobalContext,
        ctx: &mut ParserContext,
        iter: &mut IteratorHolder,
        begin: usize,
        end: usize,
        appending: bool,
    ) -> Result<usize> {
        run_parse_loop(global, ctx, iter, begin, end, appending, Value::F32(0.0), |bytes| {
            trimmed_str(bytes).and_then(|s| s.parse::<f32>().ok()).map(Value::F32)
        })
    }
    fn widen_from(&self, value: &Value) -> Value {
        Value::F32(float_widen(value) as f32)
    }
}

pub struct DoubleParser {
    /// Overrides the default `f64::from_str` grammar, per the external
    /// interface's `custom_double_parser` option.
    pub(super) custom: Option<std::sync::Arc<dyn Fn(&[u8]) -> Option<f64> + Send + Sync>>,
}

impl DoubleParser {
    fn parse(&self, bytes: &[u8]) -> Option<f64> {
        if let Some(custom) = &self.custom {
            return custom(bytes);
        }
        trimmed_str(bytes).and_then(|s| s.parse::<f64>().ok())
    }
}

impl Parser for DoubleParser {
    fn name(&self) -> &'static str {
        "double"
    }
    fn group(&self) -> ParserGroup {
        ParserGroup::Numeric(NumericRank::Double)
    }
    fn sink_kind(&self) -> SinkKind {
        SinkKind::F64
    }
    fn tokenizes(&self, text: &[u8]) -> bool {
        self.parse(text).is_some()
    }
    fn try_parse(
        &self,
        global: &GlobalContext,
        ctx: &mut ParserContext,
        iter: &mut IteratorHolder,
        begin: usize,
        end: usize,
        appending: bool,
    ) -> Result<usize> {
        run_parse_loop(global, ctx, iter, begin, end, appending, Value::F64(0.0), |bytes| {
            self.parse(bytes).map(Value::F64)
        })
    }
    fn widen_from(&self, value: &Value) -> Value {
        Value::F64(float_widen(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_tokenizes_within_range_only() {
        let p = ByteParser;
        assert!(p.tokenizes(b"127"));
        assert!(!p.tokenizes(b"128"));
        assert!(!p.tokenizes(b"abc"));
    }

    #[test]
    fn int_widen_from_byte() {
        assert_eq!(IntParser.widen_from(&Value::I8(-5)), Value::I32(-5));
    }

    #[test]
    fn double_widen_from_long() {
        assert_eq!(DoubleParser { custom: None }.widen_from(&Value::I64(42)), Value::F64(42.0));
    }

    #[test]
    fn custom_double_parser_override_is_used() {
        let p = DoubleParser {
            custom: Some(std::sync::Arc::new(|b: &[u8]| {
                std::str::from_utf8(b).ok().and_then(|s| s.strip_suffix('%')).and_then(|s| s.trim().parse::<f64>().ok()).map(|v| v / 100.0)
            })),
        };
        assert!(p.tokenizes(b"12.5%"));
        assert!(!p.tokenizes(b"12.5"));
    }
}
