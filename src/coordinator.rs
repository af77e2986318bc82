//! Wires the grabber, header resolver, dense storage and typing engine
//! together: one producer thread tokenizes and fans out to every column's
//! writer, one consumer thread per column runs that column's typing engine,
//! and the first fatal error anywhere fails the whole read.
//!
//! Grounded on `spec.md` §5: a fixed producer/consumer thread set, joined at
//! the end, with no ordering promised across columns. There is no teacher
//! analog (the teacher's crates are single-threaded pull parsers), so thread
//! spawn/join here uses plain `std::thread` directly, as `SPEC_FULL.md`'s
//! ambient-stack section records. `concurrent = false` runs the identical
//! pipeline on the calling thread instead of spawning any.

use std::io::{BufRead, BufReader, Read};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use crate::config::{ReaderConfig, RowShapePolicy};
use crate::error::{MalformedError, Result};
use crate::grabber::{CellSource, DelimitedConfig, DelimitedGrabber, FixedWidthGrabber, GrabbedCell, RowTerminators};
use crate::header::{self, ResolvedHeader};
use crate::parsers;
use crate::sink::{Column, ColumnData, Sink, SinkFactory};
use crate::storage::{self, DenseStorageReader, DenseStorageWriter};
use crate::typing::{Parser, ResolvedLadder, TypingEngine};

/// The finished result of a read: row/column counts and one named, typed
/// column per header, in header order.
pub struct CsvReadResult {
    pub num_rows: u64,
    pub num_cols: usize,
    pub columns: Vec<(String, Column)>,
}

/// One resolved per-column plan, computed up front from `ReaderConfig` before
/// any thread is spawned, so nothing about the column's typing depends on
/// `config` surviving past this point.
struct ColumnPlan {
    name: String,
    null_literals: Vec<String>,
    ladder: ResolvedLadder,
    null_parser: Option<Arc<dyn Parser>>,
}

/// The row-count and row-shape policy the producer needs, copied out of
/// `ReaderConfig` up front so the producer does not need to borrow the whole
/// config (which the per-column plans and custom parsers also draw from).
#[derive(Clone, Copy)]
struct ProducerPolicy {
    skip_rows: usize,
    num_rows: Option<u64>,
    ignore_empty_lines: bool,
    row_shape_policy: RowShapePolicy,
}

/// Either grabber flavor, dispatched without a trait object so the producer
/// loop stays monomorphic over `R`.
enum RowSource<R: BufRead> {
    Delimited(DelimitedGrabber<R>),
    FixedWidth(FixedWidthGrabber<R>),
}

impl<R: BufRead> RowSource<R> {
    fn next_cell(&mut self) -> Result<GrabbedCell<'_>> {
        match self {
            RowSource::Delimited(g) => CellSource::next_cell(g),
            RowSource::FixedWidth(g) => CellSource::next_cell(g),
        }
    }
}

/// Reads `input` as CSV per `config`, producing one typed column per header
/// via `sink_factory`. This is the crate's single public entry point.
pub fn read<R: Read + Send + 'static>(input: R, config: ReaderConfig, sink_factory: impl SinkFactory + 'static) -> Result<CsvReadResult> {
    let mut reader = BufReader::new(input);

    // `spec.md` §8: empty input yields zero rows, with columns determined
    // only by an explicit header override, if any. Handled directly here
    // rather than inside the grabbers, since "the stream never had any
    // bytes" is otherwise indistinguishable from "the header row happened
    // to be empty".
    if reader.fill_buf()?.is_empty() {
        return read_empty(config, sink_factory);
    }

    let cap = if config.concurrent {
        storage::MAX_UNOBSERVED_BLOCKS
    } else {
        usize::MAX
    };

    let (names, buffered_first_row, mut source) = match &config.fixed_width {
        Some(fw) => {
            let convention = fw.convention;
            let padding = config.delimiter;
            let mut grabber = FixedWidthGrabber::new_with_unresolved_widths(reader, convention, padding);
            let (resolved, widths) = header::resolve_fixed_width_headers(
                &mut grabber,
                config.has_header_row,
                config.skip_header_rows,
                fw.widths.clone(),
                padding,
                convention,
                &config.header_overrides,
            )?;
            grabber.set_widths(widths);
            (resolved.names, resolved.buffered_first_row, RowSource::FixedWidth(grabber))
        }
        None => {
            let delimited_config = DelimitedConfig {
                delimiter: config.delimiter,
                quote: config.quote,
                respect_quotes: config.respect_quotes,
                trim_unquoted: config.ignore_surrounding_spaces,
                trim_quoted: config.trim,
                terminators: RowTerminators::default(),
            };
            let mut grabber = DelimitedGrabber::new(reader, delimited_config);
            let resolved: ResolvedHeader = header::resolve_delimited_headers(
                &mut grabber,
                config.has_header_row,
                config.skip_header_rows,
                &config.header_overrides,
            )?;
            (resolved.names, resolved.buffered_first_row, RowSource::Delimited(grabber))
        }
    };

    let num_cols = names.len();

    let plans: Vec<ColumnPlan> = names
        .iter()
        .enumerate()
        .map(|(i, name)| -> Result<ColumnPlan> {
            let ladder_names = config.ladder_for(i, name);
            let ladder = parsers::resolve_ladder(&ladder_names, i, &config)?;
            let null_parser = config
                .null_parser
                .as_ref()
                .map(|n| parsers::resolve_one(n, i, &config))
                .transpose()?;
            Ok(ColumnPlan {
                name: name.clone(),
                null_literals: config.null_literals_for(i, name),
                ladder,
                null_parser,
            })
        })
        .collect::<Result<_>>()?;

    let policy = ProducerPolicy {
        skip_rows: config.skip_rows,
        num_rows: config.num_rows,
        ignore_empty_lines: config.ignore_empty_lines,
        row_shape_policy: config.row_shape_policy,
    };

    let mut writers: Vec<DenseStorageWriter> = Vec::with_capacity(num_cols);
    let mut readers: Vec<DenseStorageReader> = Vec::with_capacity(num_cols);
    for i in 0..num_cols {
        let (w, r) = storage::dense_storage_with_capacity(i, cap);
        writers.push(w);
        readers.push(r);
    }

    let shared_factory: Arc<Mutex<Box<dyn SinkFactory>>> = Arc::new(Mutex::new(Box::new(sink_factory)));

    let columns = if config.concurrent {
        run_concurrent(source, buffered_first_row, num_cols, policy, writers, readers, plans, shared_factory)?
    } else {
        run_sequential(&mut source, buffered_first_row, num_cols, policy, writers, readers, plans, shared_factory)?
    };

    let num_rows = columns.first().map(column_len).unwrap_or(0) as u64;
    Ok(CsvReadResult {
        num_rows,
        num_cols,
        columns: names.into_iter().zip(columns).collect(),
    })
}

fn read_empty(config: ReaderConfig, sink_factory: impl SinkFactory + 'static) -> Result<CsvReadResult> {
    let names = config.header_overrides.full.clone().unwrap_or_default();
    let mut factory = sink_factory;
    let columns = names
        .iter()
        .enumerate()
        .map(|(i, name)| -> Result<(String, Column)> {
            let ladder_names = config.ladder_for(i, name);
            let ladder = parsers::resolve_ladder(&ladder_names, i, &config)?;
            let kind = ladder.parsers[0].sink_kind();
            let sink = factory.make_sink(i, kind);
            let (data, nulls) = sink.finish();
            Ok((name.clone(), Column { data, nulls }))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(CsvReadResult {
        num_rows: 0,
        num_cols: names.len(),
        columns,
    })
}

/// Runs the producer on its own thread and every column's typing engine each
/// on its own thread, returning the finished columns in column order once
/// all of them have joined.
fn run_concurrent<R: BufRead + Send + 'static>(
    mut source: RowSource<R>,
    buffered_first_row: Option<Vec<Vec<u8>>>,
    num_cols: usize,
    policy: ProducerPolicy,
    writers: Vec<DenseStorageWriter>,
    readers: Vec<DenseStorageReader>,
    plans: Vec<ColumnPlan>,
    shared_factory: Arc<Mutex<Box<dyn SinkFactory>>>,
) -> Result<Vec<Column>> {
    // If a column's consumer thread dies before the producer is done, the
    // producer would otherwise block forever the next time it needs to
    // flush that column (no reader is left to release a permit). Poisoning
    // every semaphore as soon as any worker fails wakes it with an error
    // instead. The symmetric case - the producer failing first - needs no
    // such signal: `produce_rows` always finishes every writer, which is
    // itself enough to wake any reader still waiting on a future node.
    let semaphores: Vec<Arc<storage::BlockSemaphore>> = writers.iter().map(|w| w.semaphore()).collect();

    let (tx, rx) = mpsc::channel::<WorkerOutcome>();

    let producer_tx = tx.clone();
    let producer_handle = thread::Builder::new()
        .name("csv-columns-producer".into())
        .spawn(move || {
            let result = produce_rows(&mut source, num_cols, buffered_first_row, policy, writers);
            let _ = producer_tx.send(WorkerOutcome::Producer(result));
        })
        .expect("failed to spawn producer thread");

    let mut handles = Vec::with_capacity(num_cols);
    for (i, (reader, plan)) in readers.into_iter().zip(plans).enumerate() {
        let factory = shared_factory.clone();
        let consumer_tx = tx.clone();
        handles.push(
            thread::Builder::new()
                .name(format!("csv-columns-col{i}"))
                .spawn(move || {
                    let engine = TypingEngine {
                        column: i,
                        column_name: plan.name,
                        null_literals: plan.null_literals,
                        null_parser: plan.null_parser,
                        ladder: plan.ladder,
                    };
                    let mut sink_factory = SharedSinkFactory(factory);
                    let result = engine.run(reader, &mut sink_factory);
                    let _ = consumer_tx.send(WorkerOutcome::Consumer(i, result));
                })
                .expect("failed to spawn consumer thread"),
        );
    }
    drop(tx);

    let mut producer_result = None;
    let mut consumer_results: Vec<Option<Result<Column>>> = (0..num_cols).map(|_| None).collect();
    let mut poisoned = false;

    for outcome in rx {
        let failed = match &outcome {
            WorkerOutcome::Producer(res) => res.is_err(),
            WorkerOutcome::Consumer(_, res) => res.is_err(),
        };
        if failed && !poisoned {
            poisoned = true;
            for sem in &semaphores {
                sem.poison();
            }
        }
        match outcome {
            WorkerOutcome::Producer(res) => producer_result = Some(res),
            WorkerOutcome::Consumer(i, res) => consumer_results[i] = Some(res),
        }
    }

    producer_handle.join().expect("producer thread panicked");

    let mut columns = Vec::with_capacity(num_cols);
    let mut first_consumer_err = None;
    for (i, handle) in handles.into_iter().enumerate() {
        handle.join().expect("consumer thread panicked");
        match consumer_results[i]
            .take()
            .expect("consumer thread exited without reporting a result")
        {
            Ok(col) => columns.push(col),
            Err(e) => {
                if first_consumer_err.is_none() {
                    first_consumer_err = Some(e);
                }
            }
        }
    }

    producer_result.expect("producer thread exited without reporting a result")?;
    if let Some(err) = first_consumer_err {
        return Err(err);
    }

    Ok(columns)
}

enum WorkerOutcome {
    Producer(Result<()>),
    Consumer(usize, Result<Column>),
}

/// Runs the producer to completion, then every column's typing engine in
/// turn, all on the calling thread.
fn run_sequential<R: BufRead>(
    source: &mut RowSource<R>,
    buffered_first_row: Option<Vec<Vec<u8>>>,
    num_cols: usize,
    policy: ProducerPolicy,
    writers: Vec<DenseStorageWriter>,
    readers: Vec<DenseStorageReader>,
    plans: Vec<ColumnPlan>,
    shared_factory: Arc<Mutex<Box<dyn SinkFactory>>>,
) -> Result<Vec<Column>> {
    produce_rows(source, num_cols, buffered_first_row, policy, writers)?;

    let mut factory = shared_factory.lock().unwrap();
    let mut columns = Vec::with_capacity(num_cols);
    for (i, (reader, plan)) in readers.into_iter().zip(plans).enumerate() {
        let engine = TypingEngine {
            column: i,
            column_name: plan.name,
            null_literals: plan.null_literals,
            null_parser: plan.null_parser,
            ladder: plan.ladder,
        };
        columns.push(engine.run(reader, &mut **factory)?);
    }
    Ok(columns)
}

fn column_len(col: &Column) -> usize {
    match &col.data {
        ColumnData::I8(v) => v.len(),
        ColumnData::I16(v) => v.len(),
        ColumnData::I32(v) => v.len(),
        ColumnData::I64(v) => v.len(),
        ColumnData::F32(v) => v.len(),
        ColumnData::F64(v) => v.len(),
        ColumnData::Bool(v) => v.len(),
        ColumnData::Char(v) => v.len(),
        ColumnData::Utf8(v) => v.len(),
        ColumnData::TimestampSeconds(v) => v.len(),
        ColumnData::TimestampMillis(v) => v.len(),
        ColumnData::TimestampMicros(v) => v.len(),
        ColumnData::TimestampNanos(v) => v.len(),
        ColumnData::DateTime(v) => v.len(),
    }
}

/// Reads rows from `source` and fans each row's cells out to the matching
/// column writer, applying the skip/cap/empty-line/row-shape policy.
///
/// Every writer is finished no matter how the row loop ends: a writer
/// dropped mid-stream without `finish()` leaves its reader thread blocked
/// forever in `wait_for_next`, waiting on a queue node that will now never be
/// published, so a malformed-row error partway through still has to let
/// every column reach its end-of-stream marker before this function returns.
fn produce_rows<R: BufRead>(
    source: &mut RowSource<R>,
    num_cols: usize,
    buffered_first_row: Option<Vec<Vec<u8>>>,
    policy: ProducerPolicy,
    mut writers: Vec<DenseStorageWriter>,
) -> Result<()> {
    let result = produce_rows_inner(source, num_cols, buffered_first_row, policy, &mut writers);

    let mut finish_err = None;
    for writer in writers {
        if let Err(e) = writer.finish() {
            finish_err.get_or_insert(e);
        }
    }

    result.and(finish_err.map_or(Ok(()), Err))
}

fn produce_rows_inner<R: BufRead>(
    source: &mut RowSource<R>,
    num_cols: usize,
    buffered_first_row: Option<Vec<Vec<u8>>>,
    policy: ProducerPolicy,
    writers: &mut [DenseStorageWriter],
) -> Result<()> {
    let mut rows_emitted: u64 = 0;
    let mut rows_to_skip = policy.skip_rows;
    let mut pending_row = buffered_first_row;

    loop {
        if let Some(cap) = policy.num_rows {
            if rows_emitted >= cap {
                break;
            }
        }

        let mut row = match pending_row.take() {
            Some(row) => row,
            None => match read_row(source)? {
                Some(row) => row,
                None => break,
            },
        };

        if rows_to_skip > 0 {
            rows_to_skip -= 1;
            continue;
        }

        if policy.ignore_empty_lines && row.len() == 1 && row[0].is_empty() {
            continue;
        }

        if row.len() < num_cols {
            if policy.row_shape_policy.allow_missing_columns {
                row.resize(num_cols, Vec::new());
            } else {
                return Err(MalformedError::RowShapeMismatch {
                    row: rows_emitted + 1,
                    found: row.len(),
                    expected: num_cols,
                }
                .into());
            }
        } else if row.len() > num_cols {
            if policy.row_shape_policy.ignore_excess_columns {
                row.truncate(num_cols);
            } else {
                return Err(MalformedError::RowShapeMismatch {
                    row: rows_emitted + 1,
                    found: row.len(),
                    expected: num_cols,
                }
                .into());
            }
        }

        for (writer, cell) in writers.iter_mut().zip(row.iter()) {
            writer.append(cell)?;
        }
        rows_emitted += 1;
    }

    Ok(())
}

/// Reads one logical row of cells from `source`, or `None` if there is no
/// more input. A grabber signals "no more input" by returning an empty,
/// zero-th cell with `last_in_row` and `end_of_input` both set; distinguished
/// from a genuine trailing empty cell (e.g. a row ending in a bare trailing
/// delimiter with nothing after it) by requiring no cells to have been
/// collected yet for this row. `end_of_input` on a later, non-empty cell just
/// means the final row had no trailing row terminator; it is still a real
/// row and is returned normally.
fn read_row<R: BufRead>(source: &mut RowSource<R>) -> Result<Option<Vec<Vec<u8>>>> {
    let mut cells = Vec::new();
    loop {
        let cell = source.next_cell()?;
        if cells.is_empty() && cell.bytes.is_empty() && cell.last_in_row && cell.end_of_input {
            return Ok(None);
        }
        cells.push(cell.bytes.to_vec());
        if cell.last_in_row {
            return Ok(Some(cells));
        }
    }
}

/// Adapts a shared, lockable [`SinkFactory`] so each column's consumer
/// thread can hold its own lightweight handle to the one caller-supplied
/// factory (which is `Send` but, being a trait object behind a plain `&mut`
/// contract, not naturally safe to call from several threads at once).
struct SharedSinkFactory(Arc<Mutex<Box<dyn SinkFactory>>>);

impl SinkFactory for SharedSinkFactory {
    fn make_sink(&mut self, column: usize, kind: crate::sink::SinkKind) -> Box<dyn Sink> {
        self.0.lock().unwrap().make_sink(column, kind)
    }
}

/// End-to-end pipeline tests, covering `spec.md` §8's concrete scenarios by
/// driving the public [`read`] entry point directly rather than any one
/// layer in isolation.
#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::sink::VecSinkFactory;
    use crate::typing::ParserName;

    fn read_str(input: &str, config: ReaderConfig) -> CsvReadResult {
        read(Cursor::new(input.as_bytes().to_vec()), config, VecSinkFactory).unwrap()
    }

    #[test]
    fn simple_two_string_columns() {
        let result = read_str("Key,Value\nA,hello\n", ReaderConfig::default());
        assert_eq!(result.num_cols, 2);
        assert_eq!(result.num_rows, 1);
        let names: Vec<&str> = result.columns.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["Key", "Value"]);
        match &result.columns[0].1.data {
            ColumnData::Utf8(v) => assert_eq!(v, &["A".to_string()]),
            other => panic!("expected Utf8, got {other:?}"),
        }
        match &result.columns[1].1.data {
            ColumnData::Utf8(v) => assert_eq!(v, &["hello".to_string()]),
            other => panic!("expected Utf8, got {other:?}"),
        }
    }

    fn numeric_ladder() -> Vec<ParserName> {
        vec![
            ParserName::Byte,
            ParserName::Short,
            ParserName::Int,
            ParserName::Long,
            ParserName::Double,
        ]
    }

    #[test]
    fn narrowest_numeric_parser_that_fits_wins() {
        let config = ReaderConfig::builder().parsers(numeric_ladder()).build();
        let result = read_str("N\n1\n2\n3\n", config);
        match &result.columns[0].1.data {
            ColumnData::I8(v) => assert_eq!(v, &[1, 2, 3]),
            other => panic!("expected I8 (byte), got {other:?}"),
        }
        assert_eq!(result.columns[0].1.nulls, vec![false, false, false]);
    }

    #[test]
    fn widens_when_a_later_row_overflows_the_narrowest_parser() {
        let config = ReaderConfig::builder().parsers(numeric_ladder()).build();
        let result = read_str("N\n1\n2\n300\n", config);
        match &result.columns[0].1.data {
            ColumnData::I16(v) => assert_eq!(v, &[1, 2, 300]),
            other => panic!("expected I16 (short), got {other:?}"),
        }
    }

    #[test]
    fn leading_non_null_value_with_a_later_null_backfills_correctly() {
        let config = ReaderConfig::builder().parsers(numeric_ladder()).build();
        let result = read_str("N\n1\n\n2\n", config);
        match &result.columns[0].1.data {
            ColumnData::I8(v) => assert_eq!(v, &[1, 0, 2]),
            other => panic!("expected I8 (byte), got {other:?}"),
        }
        assert_eq!(result.columns[0].1.nulls, vec![false, true, false]);
    }

    #[test]
    fn falls_back_to_string_when_no_numeric_parser_accepts_the_value() {
        let config = ReaderConfig::builder()
            .parsers(vec![
                ParserName::Byte,
                ParserName::Short,
                ParserName::Int,
                ParserName::Long,
                ParserName::String,
            ])
            .build();
        let result = read_str("N\nhello\n", config);
        match &result.columns[0].1.data {
            ColumnData::Utf8(v) => assert_eq!(v, &["hello".to_string()]),
            other => panic!("expected Utf8 (string fallback), got {other:?}"),
        }
    }

    #[test]
    fn fixed_width_infers_widths_and_final_column_absorbs_remainder() {
        // Widths are left `None` so they are inferred from the header row.
        // The padding byte doubles as `delimiter` (spec.md §4.5), so it must
        // be set to the space this fixture pads with.
        let config = ReaderConfig {
            delimiter: b' ',
            fixed_width: Some(crate::config::FixedWidthConfig {
                widths: None,
                convention: crate::grabber::CharCountConvention::OneUnitPerCodePoint,
            }),
            ..ReaderConfig::default()
        };
        let result = read_str("AAA BBB\n111 222\n", config);
        let names: Vec<&str> = result.columns.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["AAA", "BBB"]);
        match &result.columns[0].1.data {
            ColumnData::I8(v) => assert_eq!(v, &[111]),
            other => panic!("expected I8 (byte), got {other:?}"),
        }
        match &result.columns[1].1.data {
            ColumnData::I16(v) => assert_eq!(v, &[222]),
            other => panic!("expected I16 (short), got {other:?}"),
        }
    }

    #[test]
    fn empty_input_yields_zero_rows_and_headers_only_from_override() {
        let config = ReaderConfig::builder()
            .headers(vec!["a".to_string(), "b".to_string()])
            .build();
        let result = read_str("", config);
        assert_eq!(result.num_rows, 0);
        assert_eq!(result.num_cols, 2);
    }

    #[test]
    fn sequential_and_concurrent_modes_produce_identical_columns() {
        let input = "N,S\n1,a\n2,b\n3,c\n";
        let seq = read_str(input, ReaderConfig::builder().concurrent(false).build());
        let conc = read_str(input, ReaderConfig::builder().concurrent(true).build());
        assert_eq!(seq.num_rows, conc.num_rows);
        for (a, b) in seq.columns.iter().zip(&conc.columns) {
            assert_eq!(format!("{:?}", a.1.data), format!("{:?}", b.1.data));
            assert_eq!(a.1.nulls, b.1.nulls);
        }
    }

    #[test]
    fn row_longer_than_header_is_rejected_unless_tolerated() {
        let strict = read(
            Cursor::new(b"a,b\n1,2,3\n".to_vec()),
            ReaderConfig::default(),
            VecSinkFactory,
        );
        assert!(strict.is_err());

        let tolerant = read_str(
            "a,b\n1,2,3\n",
            ReaderConfig::builder().ignore_excess_columns(true).build(),
        );
        match &tolerant.columns[0].1.data {
            ColumnData::I8(v) => assert_eq!(v, &[1]),
            other => panic!("expected I8 (default numeric ladder), got {other:?}"),
        }
    }
}
