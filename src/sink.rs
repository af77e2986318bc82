//! Column sinks: the chunk-oriented output side of the typing engine.
//!
//! Grounded on `odbc-api`'s `buffers::columnar` (`ColumnarBuffer`/`ColumnBuffer`):
//! a capacity-bounded buffer per column, written in ranges, with a parallel
//! validity (here, null) array and a read-back view. This crate's sinks are
//! in-memory and unbounded rather than ODBC-bound and row-capacity-limited,
//! since there is no driver buffer to stay within here, but the shape —
//! one typed `Vec` plus one `Vec<bool>` of nulls, written by range rather
//! than by individual cell — is the same idea.

use chrono::NaiveDateTime;

use crate::error::Result;

/// The concrete primitive kinds a sink can hold. Mirrors the sink-factory
/// contract in the external-interfaces section: one entry per recognized
/// primitive group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Bool,
    Char,
    Utf8,
    TimestampSeconds,
    TimestampMillis,
    TimestampMicros,
    TimestampNanos,
    DateTime,
}

/// A single typed value, used to move data across the type-erased [`Sink`]
/// boundary without each parser needing a monomorphized sink type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Bool(bool),
    Char(char),
    Utf8(String),
    DateTime(NaiveDateTime),
}

/// The finished, typed contents of one column.
#[derive(Debug, Clone)]
pub enum ColumnData {
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    Bool(Vec<bool>),
    Char(Vec<char>),
    Utf8(Vec<String>),
    TimestampSeconds(Vec<i64>),
    TimestampMillis(Vec<i64>),
    TimestampMicros(Vec<i64>),
    TimestampNanos(Vec<i64>),
    DateTime(Vec<NaiveDateTime>),
}

/// A finished column: its typed data plus a parallel null-flag array.
#[derive(Debug, Clone)]
pub struct Column {
    pub data: ColumnData,
    pub nulls: Vec<bool>,
}

/// A chunk-oriented output buffer for one column's typed values.
///
/// Writes land in `[dest_begin, dest_begin + values.len())`. `appending`
/// tells the sink whether the range extends the previously written logical
/// array (monotonically increasing `dest_begin`, the common case during
/// forward parsing) or backfills an earlier range (the leading-null-run
/// second phase) — a sink backed by sequential storage normally does not
/// need to distinguish the two, but the flag is threaded through for sinks
/// that do (e.g. one that defers allocation until it knows the final type).
pub trait Sink: Send {
    fn write(&mut self, dest_begin: usize, values: &[Value], nulls: &[bool], appending: bool) -> Result<()>;

    fn len(&self) -> usize;

    /// Whether this sink can also act as a source, enabling numeric
    /// widening-by-unification instead of a second textual pass.
    fn readable(&self) -> bool {
        false
    }

    /// Reads back `[begin, end)`. Only called when `readable()` is true.
    fn read(&self, _begin: usize, _end: usize) -> (Vec<Value>, Vec<bool>) {
        panic!("read() called on a non-readable sink");
    }

    fn finish(self: Box<Self>) -> (ColumnData, Vec<bool>);
}

/// Supplies a sink for a column given its recognized primitive kind.
pub trait SinkFactory: Send {
    fn make_sink(&mut self, column: usize, kind: SinkKind) -> Box<dyn Sink>;
}

/// A sink backed by a plain in-memory `Vec`, used by [`VecSinkFactory`].
/// Always readable, since unifying in place is strictly cheaper than a
/// second pass and there is no external buffer to protect.
struct VecSink<T> {
    kind: SinkKind,
    values: Vec<T>,
    nulls: Vec<bool>,
}

impl<T: Clone + Default> VecSink<T> {
    fn new(kind: SinkKind) -> Self {
        VecSink {
            kind,
            values: Vec::new(),
            nulls: Vec::new(),
        }
    }

    fn ensure_len(&mut self, n: usize) {
        if self.values.len() < n {
            self.values.resize(n, T::default());
            self.nulls.resize(n, false);
        }
    }
}

macro_rules! vec_sink_impl {
    ($ty:ty, $variant:ident, $column_variant:ident) => {
        impl Sink for VecSink<$ty> {
            fn write(
                &mut self,
                dest_begin: usize,
                values: &[Value],
                nulls: &[bool],
                _appending: bool,
            ) -> Result<()> {
                debug_assert_eq!(values.len(), nulls.len());
                let end = dest_begin + values.len();
                self.ensure_len(end);
                for (i, (v, &is_null)) in values.iter().zip(nulls).enumerate() {
                    let slot = dest_begin + i;
                    self.nulls[slot] = is_null;
                    if !is_null {
                        self.values[slot] = match v {
                            Value::$variant(x) => x.clone(),
                            other => panic!(
                                "sink kind {:?} received mismatched value {:?}",
                                self.kind, other
                            ),
                        };
                    }
                }
                Ok(())
            }

            fn len(&self) -> usize {
                self.values.len()
            }

            fn readable(&self) -> bool {
                true
            }

            fn read(&self, begin: usize, end: usize) -> (Vec<Value>, Vec<bool>) {
                let values = self.values[begin..end]
                    .iter()
                    .cloned()
                    .map(Value::$variant)
                    .collect();
                let nulls = self.nulls[begin..end].to_vec();
                (values, nulls)
            }

            fn finish(self: Box<Self>) -> (ColumnData, Vec<bool>) {
                (ColumnData::$column_variant(self.values), self.nulls)
            }
        }
    };
}

vec_sink_impl!(i8, I8, I8);
vec_sink_impl!(i16, I16, I16);
vec_sink_impl!(i32, I32, I32);
vec_sink_impl!(i64, I64, I64);
vec_sink_impl!(f32, F32, F32);
vec_sink_impl!(f64, F64, F64);
vec_sink_impl!(bool, Bool, Bool);
vec_sink_impl!(char, Char, Char);

impl VecSink<String> {
    fn new_string() -> Self {
        VecSink {
            kind: SinkKind::Utf8,
            values: Vec::new(),
            nulls: Vec::new(),
        }
    }
}

impl Sink for VecSink<String> {
    fn write(&mut self, dest_begin: usize, values: &[Value], nulls: &[bool], _appending: bool) -> Result<()> {
        debug_assert_eq!(values.len(), nulls.len());
        let end = dest_begin + values.len();
        self.ensure_len(end);
        for (i, (v, &is_null)) in values.iter().zip(nulls).enumerate() {
            let slot = dest_begin + i;
            self.nulls[slot] = is_null;
            if !is_null {
                self.values[slot] = match v {
                    Value::Utf8(s) => s.clone(),
                    other => panic!("string sink received mismatched value {:?}", other),
                };
            }
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn readable(&self) -> bool {
        true
    }

    fn read(&self, begin: usize, end: usize) -> (Vec<Value>, Vec<bool>) {
        let values = self.values[begin..end]
            .iter()
            .cloned()
            .map(Value::Utf8)
            .collect();
        (values, self.nulls[begin..end].to_vec())
    }

    fn finish(self: Box<Self>) -> (ColumnData, Vec<bool>) {
        (ColumnData::Utf8(self.values), self.nulls)
    }
}

/// Timestamp sinks share a representation (`i64`, one per resolution) but
/// must tag their finished `ColumnData` variant by resolution, so they are
/// not generated by the numeric macro above.
struct TimestampSink {
    kind: SinkKind,
    values: Vec<i64>,
    nulls: Vec<bool>,
}

impl TimestampSink {
    fn new(kind: SinkKind) -> Self {
        TimestampSink {
            kind,
            values: Vec::new(),
            nulls: Vec::new(),
        }
    }

    fn ensure_len(&mut self, n: usize) {
        if self.values.len() < n {
            self.values.resize(n, 0);
            self.nulls.resize(n, false);
        }
    }
}

impl Sink for TimestampSink {
    fn write(&mut self, dest_begin: usize, values: &[Value], nulls: &[bool], _appending: bool) -> Result<()> {
        let end = dest_begin + values.len();
        self.ensure_len(end);
        for (i, (v, &is_null)) in values.iter().zip(nulls).enumerate() {
            let slot = dest_begin + i;
            self.nulls[slot] = is_null;
            if !is_null {
                self.values[slot] = match v {
                    Value::I64(x) => *x,
                    other => panic!("timestamp sink received mismatched value {:?}", other),
                };
            }
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn readable(&self) -> bool {
        true
    }

    fn read(&self, begin: usize, end: usize) -> (Vec<Value>, Vec<bool>) {
        let values = self.values[begin..end].iter().copied().map(Value::I64).collect();
        (values, self.nulls[begin..end].to_vec())
    }

    fn finish(self: Box<Self>) -> (ColumnData, Vec<bool>) {
        let data = match self.kind {
            SinkKind::TimestampSeconds => ColumnData::TimestampSeconds(self.values),
            SinkKind::TimestampMillis => ColumnData::TimestampMillis(self.values),
            SinkKind::TimestampMicros => ColumnData::TimestampMicros(self.values),
            SinkKind::TimestampNanos => ColumnData::TimestampNanos(self.values),
            other => unreachable!("TimestampSink constructed with non-timestamp kind {:?}", other),
        };
        (data, self.nulls)
    }
}

struct DateTimeSink {
    values: Vec<NaiveDateTime>,
    nulls: Vec<bool>,
}

impl DateTimeSink {
    fn new() -> Self {
        DateTimeSink {
            values: Vec::new(),
            nulls: Vec::new(),
        }
    }

    fn ensure_len(&mut self, n: usize) {
        if self.values.len() < n {
            self.values
                .resize(n, NaiveDateTime::from_timestamp_opt(0, 0).unwrap());
            self.nulls.resize(n, false);
        }
    }
}

impl Sink for DateTimeSink {
    fn write(&mut self, dest_begin: usize, values: &[Value], nulls: &[bool], _appending: bool) -> Result<()> {
        let end = dest_begin + values.len();
        self.ensure_len(end);
        for (i, (v, &is_null)) in values.iter().zip(nulls).enumerate() {
            let slot = dest_begin + i;
            self.nulls[slot] = is_null;
            if !is_null {
                self.values[slot] = match v {
                    Value::DateTime(x) => *x,
                    other => panic!("date-time sink received mismatched value {:?}", other),
                };
            }
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn finish(self: Box<Self>) -> (ColumnData, Vec<bool>) {
        (ColumnData::DateTime(self.values), self.nulls)
    }
}

/// The default, in-memory sink factory. Every sink it produces is readable,
/// so numeric unification is always preferred over a second textual pass.
#[derive(Default)]
pub struct VecSinkFactory;

impl SinkFactory for VecSinkFactory {
    fn make_sink(&mut self, _column: usize, kind: SinkKind) -> Box<dyn Sink> {
        match kind {
            SinkKind::I8 => Box::new(VecSink::<i8>::new(kind)),
            SinkKind::I16 => Box::new(VecSink::<i16>::new(kind)),
            SinkKind::I32 => Box::new(VecSink::<i32>::new(kind)),
            SinkKind::I64 => Box::new(VecSink::<i64>::new(kind)),
            SinkKind::F32 => Box::new(VecSink::<f32>::new(kind)),
            SinkKind::F64 => Box::new(VecSink::<f64>::new(kind)),
            SinkKind::Bool => Box::new(VecSink::<bool>::new(kind)),
            SinkKind::Char => Box::new(VecSink::<char>::new(kind)),
            SinkKind::Utf8 => Box::new(VecSink::new_string()),
            SinkKind::TimestampSeconds
            | SinkKind::TimestampMillis
            | SinkKind::TimestampMicros
            | SinkKind::TimestampNanos => Box::new(TimestampSink::new(kind)),
            SinkKind::DateTime => Box::new(DateTimeSink::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_sink_write_then_read_round_trips() {
        let mut sink: Box<dyn Sink> = Box::new(VecSink::<i32>::new(SinkKind::I32));
        sink.write(0, &[Value::I32(1), Value::I32(2)], &[false, false], true)
            .unwrap();
        let (values, nulls) = sink.read(0, 2);
        assert_eq!(values, vec![Value::I32(1), Value::I32(2)]);
        assert_eq!(nulls, vec![false, false]);
    }

    #[test]
    fn backfill_write_does_not_disturb_later_range() {
        let mut sink: Box<dyn Sink> = Box::new(VecSink::<i32>::new(SinkKind::I32));
        sink.write(2, &[Value::I32(30)], &[false], true).unwrap();
        sink.write(0, &[Value::I32(10), Value::I32(20)], &[false, false], false)
            .unwrap();
        let (values, _) = sink.read(0, 3);
        assert_eq!(values, vec![Value::I32(10), Value::I32(20), Value::I32(30)]);
    }

    #[test]
    fn null_flag_set_without_a_value() {
        let mut sink: Box<dyn Sink> = Box::new(VecSink::<i32>::new(SinkKind::I32));
        sink.write(0, &[Value::I32(0)], &[true], true).unwrap();
        let (_, nulls) = sink.read(0, 1);
        assert_eq!(nulls, vec![true]);
    }

    #[test]
    fn factory_produces_matching_sink_kinds() {
        let mut factory = VecSinkFactory;
        let sink = factory.make_sink(0, SinkKind::Bool);
        assert!(sink.readable());
        assert_eq!(sink.len(), 0);
    }
}
