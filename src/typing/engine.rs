use std::sync::Arc;

use crate::error::{CsvError, Result};
use crate::sink::{Column, SinkFactory, Value};
use crate::storage::{DenseStorageReader, IteratorHolder};

use super::{GlobalContext, Parser, ParserContext, ParserGroup, ResolvedLadder};

/// Runs the two-pass decision procedure for one column and produces its
/// finished, typed output.
pub struct TypingEngine {
    pub column: usize,
    pub column_name: String,
    pub null_literals: Vec<String>,
    pub null_parser: Option<Arc<dyn Parser>>,
    pub ladder: ResolvedLadder,
}

impl TypingEngine {
    pub fn run(&self, base_reader: DenseStorageReader, sink_factory: &mut dyn SinkFactory) -> Result<Column> {
        let mut global = GlobalContext {
            column: self.column,
            column_name: &self.column_name,
            null_literals: &self.null_literals,
            sink_factory,
        };

        let mut probe = IteratorHolder::new(base_reader.clone())?;

        if probe.is_exhausted() {
            return self.empty_parse(&mut global, base_reader);
        }

        if self.ladder.parsers.len() == 1 {
            let parser = self.ladder.parsers[0].clone();
            return self.one_phase_parse(&parser, &mut global, base_reader);
        }

        let mut first_non_null = 0usize;
        loop {
            match probe.current() {
                None => break,
                Some(slice) => {
                    if global.is_null(slice.as_bytes()) {
                        first_non_null += 1;
                        probe.advance()?;
                    } else {
                        break;
                    }
                }
            }
        }

        if probe.is_exhausted() {
            let parser = self.require_null_parser()?;
            return self.one_phase_parse(&parser, &mut global, base_reader);
        }

        let probe_text = probe.current().unwrap().as_bytes().to_vec();
        drop(probe);

        if self.ladder.has_numeric() && tokenizes_as_double(&probe_text) {
            return self.parse_numerics(&mut global, base_reader, first_non_null);
        }

        let mut before_custom = Vec::new();
        if let Some(p) = self.ladder.find(ParserGroup::Timestamp) {
            if p.tokenizes(&probe_text) {
                before_custom.push(p);
            }
        }
        if before_custom.is_empty() {
            if let Some(p) = self.ladder.find(ParserGroup::Boolean) {
                if p.tokenizes(&probe_text) {
                    before_custom.push(p);
                }
            }
        }
        if before_custom.is_empty() {
            if let Some(p) = self.ladder.find(ParserGroup::DateTime) {
                if p.tokenizes(&probe_text) {
                    before_custom.push(p);
                }
            }
        }

        let custom = self.ladder.customs();
        let after_custom = self.ladder.char_and_string();

        self.parse_from_curated_selections(
            &mut global,
            base_reader,
            first_non_null,
            before_custom,
            custom,
            after_custom,
        )
    }

    fn require_null_parser(&self) -> Result<Arc<dyn Parser>> {
        self.null_parser.clone().ok_or_else(|| {
            crate::error::ConfigError::EmptyColumnNoNullParser { column: self.column }.into()
        })
    }

    fn empty_parse(&self, global: &mut GlobalContext, base_reader: DenseStorageReader) -> Result<Column> {
        let parser = self.require_null_parser()?;
        self.one_phase_parse(&parser, global, base_reader)
    }

    /// Parses the entire column with a single parser, from beginning to end,
    /// with no fallback: failure is fatal.
    fn one_phase_parse(
        &self,
        parser: &Arc<dyn Parser>,
        global: &mut GlobalContext,
        base_reader: DenseStorageReader,
    ) -> Result<Column> {
        let mut iter = IteratorHolder::new(base_reader)?;
        let mut ctx = parser.make_context(global);
        let consumed = parser.try_parse(global, &mut ctx, &mut iter, 0, usize::MAX, true)?;
        if !iter.is_exhausted() {
            return Err(CsvError::Inference {
                column: self.column,
                parser: parser.name(),
                parsed_count: consumed,
            });
        }
        finish_sink(ctx)
    }

    /// Numeric fast path: widen through the numeric precedence chain,
    /// reusing each intermediate parser's readable sink when possible,
    /// otherwise falling back to a full second pass with the last candidate.
    fn parse_numerics(
        &self,
        global: &mut GlobalContext,
        base_reader: DenseStorageReader,
        first_non_null: usize,
    ) -> Result<Column> {
        let numeric = self.ladder.numeric_in_precedence_order();
        debug_assert!(!numeric.is_empty());

        let mut attempts: Vec<(Arc<dyn Parser>, ParserContext, usize)> = Vec::new();
        let mut exhausted_by = None;

        for parser in &numeric {
            let mut iter = IteratorHolder::new(base_reader.clone())?;
            // Skip the leading null run without writing anything yet; the
            // unification/backfill step below fills it in once we know the
            // final widest type.
            for _ in 0..first_non_null {
                iter.advance()?;
            }
            let mut ctx = parser.make_context(global);
            let consumed = parser.try_parse(global, &mut ctx, &mut iter, first_non_null, usize::MAX, true)?;
            let fully_consumed = iter.is_exhausted();
            attempts.push((parser.clone(), ctx, consumed));
            if fully_consumed {
                exhausted_by = Some(attempts.len() - 1);
                break;
            }
        }

        let Some(winner_idx) = exhausted_by else {
            // No numeric parser made it to the end of the column: fall back
            // to the non-numeric groups entirely, from scratch.
            let custom = self.ladder.customs();
            let after_custom = self.ladder.char_and_string();
            return self.parse_from_curated_selections(
                global,
                base_reader,
                first_non_null,
                Vec::new(),
                custom,
                after_custom,
            );
        };

        let all_readable = attempts.iter().all(|(_, ctx, _)| ctx.sink.readable());
        if !all_readable {
            let (parser, _discarded_ctx, _) = attempts.into_iter().nth(winner_idx).unwrap();
            return self.one_phase_parse(&parser, global, base_reader);
        }

        // Unify by widening: take the widest (winning) sink's values for the
        // range it covered, convert every earlier parser's covered range
        // through `widen_from`, and write null flags for the leading run.
        let (widest_parser, mut widest_ctx, widest_consumed) = attempts.pop().unwrap();
        debug_assert_eq!(attempts.len(), winner_idx);

        if first_non_null > 0 {
            let null_values: Vec<Value> = (0..first_non_null).map(|_| Value::Bool(false)).collect();
            let null_flags = vec![true; first_non_null];
            widest_ctx.sink.write(0, &null_values, &null_flags, false)?;
        }

        let mut boundary = first_non_null;
        for (_, narrower_ctx, consumed) in &attempts {
            if *consumed > boundary {
                let (values, nulls) = narrower_ctx.sink.read(boundary, *consumed);
                let widened: Vec<Value> = values.iter().map(|v| widest_parser.widen_from(v)).collect();
                widest_ctx.sink.write(boundary, &widened, &nulls, false)?;
                boundary = *consumed;
            }
        }
        debug_assert!(boundary <= widest_consumed);

        finish_sink(widest_ctx)
    }

    /// Tries each candidate in `[before_custom, custom, after_custom]` in
    /// order; every parser but the last is a two-phase candidate (forward
    /// trial, then backfill), the last is invoked with no fallback.
    fn parse_from_curated_selections(
        &self,
        global: &mut GlobalContext,
        base_reader: DenseStorageReader,
        first_non_null: usize,
        before_custom: Vec<Arc<dyn Parser>>,
        custom: Vec<Arc<dyn Parser>>,
        after_custom: Vec<Arc<dyn Parser>>,
    ) -> Result<Column> {
        let is_custom = |i: usize| i >= before_custom.len() && i < before_custom.len() + custom.len();

        let all: Vec<Arc<dyn Parser>> = before_custom
            .into_iter()
            .chain(custom)
            .chain(after_custom)
            .collect();

        if all.is_empty() {
            return Err(crate::error::ConfigError::EmptyParserLadder { column: self.column }.into());
        }

        for (i, parser) in all.iter().enumerate() {
            let is_last = i + 1 == all.len();
            if is_last {
                return self.one_phase_parse(parser, global, base_reader);
            }

            // Custom parsers see the whole column from position zero on
            // their first-phase trial, since they may handle nulls in their
            // own way; built-in parsers start at the first non-null cell.
            let trial_start = if is_custom(i) { 0 } else { first_non_null };

            let mut iter = IteratorHolder::new(base_reader.clone())?;
            for _ in 0..trial_start {
                iter.advance()?;
            }
            let mut ctx = parser.make_context(global);
            let consumed = parser.try_parse(global, &mut ctx, &mut iter, trial_start, usize::MAX, true)?;

            if !iter.is_exhausted() {
                // Failed before exhaustion: discard and move to the next
                // candidate.
                continue;
            }

            if trial_start == 0 {
                return finish_sink(ctx);
            }

            return self.backfill_with_context(parser, ctx, global, base_reader, trial_start);
        }

        unreachable!("loop above always returns on the last candidate");
    }

    fn backfill_with_context(
        &self,
        parser: &Arc<dyn Parser>,
        mut ctx: ParserContext,
        global: &mut GlobalContext,
        base_reader: DenseStorageReader,
        begin: usize,
    ) -> Result<Column> {
        let mut reserve = IteratorHolder::new(base_reader)?;
        let consumed = parser.try_parse(global, &mut ctx, &mut reserve, 0, begin, false)?;
        if consumed != begin {
            return Err(CsvError::SecondPhaseContract {
                column: self.column,
                parser: parser.name(),
            });
        }
        finish_sink(ctx)
    }
}

fn finish_sink(ctx: ParserContext) -> Result<Column> {
    let (data, nulls) = ctx.sink.finish();
    Ok(Column { data, nulls })
}

fn tokenizes_as_double(text: &[u8]) -> bool {
    std::str::from_utf8(text)
        .ok()
        .map(|s| s.trim().parse::<f64>().is_ok())
        .unwrap_or(false)
}
