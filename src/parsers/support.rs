//! Shared chunked-write loop used by every leaf parser's `try_parse`.
//!
//! Grounded on `spec.md` §4.8's chunked-write contract: writes land in
//! `ctx.chunk_size`-sized ranges, `[dest_begin, dest_end)` strictly
//! increasing while `appending`, arbitrary while backfilling. Each parser
//! below differs only in how it turns cell bytes into a value, so that
//! difference is the one thing passed in as a closure.

use crate::error::Result;
use crate::storage::IteratorHolder;
use crate::sink::Value;
use crate::typing::{GlobalContext, ParserContext};

/// Drives one parser's forward loop from the iterator's current position
/// through logical index `end` (exclusive), or until `parse_one` rejects a
/// non-null cell.
///
/// `null_value` is the placeholder written into a null slot; its contents are
/// never read back by the sink (null cells are skipped on read), so any value
/// of the parser's own variant will do.
///
/// Returns the logical index one past the last cell successfully written:
/// `end` (or the column's length, if it is exhausted before reaching `end`)
/// on full success, otherwise the index of the first rejected non-null cell.
pub(super) fn run_parse_loop(
    global: &GlobalContext,
    ctx: &mut ParserContext,
    iter: &mut IteratorHolder,
    begin: usize,
    end: usize,
    appending: bool,
    null_value: Value,
    mut parse_one: impl FnMut(&[u8]) -> Option<Value>,
) -> Result<usize> {
    let mut values: Vec<Value> = Vec::with_capacity(ctx.chunk_size.min(1024));
    let mut nulls: Vec<bool> = Vec::with_capacity(ctx.chunk_size.min(1024));
    let mut chunk_start = begin;
    let mut idx = begin;

    loop {
        if idx >= end || iter.is_exhausted() {
            break;
        }
        let cell = iter.current().expect("not exhausted implies a current cell").clone();
        if global.is_null(cell.as_bytes()) {
            values.push(null_value.clone());
            nulls.push(true);
            idx += 1;
            iter.advance()?;
        } else {
            match parse_one(cell.as_bytes()) {
                Some(v) => {
                    values.push(v);
                    nulls.push(false);
                    idx += 1;
                    iter.advance()?;
                }
                None => break,
            }
        }
        if values.len() >= ctx.chunk_size {
            ctx.sink.write(chunk_start, &values, &nulls, appending)?;
            chunk_start = idx;
            values.clear();
            nulls.clear();
        }
    }

    if !values.is_empty() {
        ctx.sink.write(chunk_start, &values, &nulls, appending)?;
    }
    Ok(idx)
}

/// Trims ASCII whitespace and decodes as UTF-8, used by every leaf parser
/// that parses textual numbers/dates/booleans (but not the string parser,
/// which keeps raw bytes verbatim).
pub(super) fn trimmed_str(bytes: &[u8]) -> Option<&str> {
    std::str::from_utf8(bytes).ok().map(str::trim)
}
