use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};

use super::support::{run_parse_loop, trimmed_str};
use crate::error::Result;
use crate::sink::{SinkKind, Value};
use crate::storage::IteratorHolder;
use crate::typing::{GlobalContext, Parser, ParserContext, ParserGroup};

/// Formats tried in order; the first one that parses the whole trimmed cell
/// wins. A bare date is treated as midnight.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
];

pub struct DateTimeParser {
    /// Overrides how a timezone offset is extracted from the cell text, per
    /// the external interface's `custom_time_zone_parser` option. Returns an
    /// offset in seconds east of UTC to subtract from the naive local value,
    /// normalizing it to the naive-UTC representation this crate stores.
    pub custom_time_zone: Option<Arc<dyn Fn(&[u8]) -> Option<i32> + Send + Sync>>,
}

fn parse_naive(text: &[u8]) -> Option<NaiveDateTime> {
    let s = trimmed_str(text)?;
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

impl DateTimeParser {
    fn parse(&self, text: &[u8]) -> Option<NaiveDateTime> {
        let mut dt = parse_naive(text)?;
        if let Some(tz_fn) = &self.custom_time_zone {
            if let Some(offset_secs) = tz_fn(text) {
                dt -= chrono::Duration::seconds(offset_secs as i64);
            }
        }
        Some(dt)
    }
}

impl Parser for DateTimeParser {
    fn name(&self) -> &'static str {
        "date_time"
    }
    fn group(&self) -> ParserGroup {
        ParserGroup::DateTime
    }
    fn sink_kind(&self) -> SinkKind {
        SinkKind::DateTime
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
        let epoch = NaiveDateTime::from_timestamp_opt(0, 0).unwrap();
        run_parse_loop(global, ctx, iter, begin, end, appending, Value::DateTime(epoch), |bytes| {
            self.parse(bytes).map(Value::DateTime)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_date_and_datetime_forms() {
        let p = DateTimeParser { custom_time_zone: None };
        assert!(p.tokenizes(b"2024-01-02"));
        assert!(p.tokenizes(b"2024-01-02T03:04:05"));
        assert!(p.tokenizes(b"2024-01-02 03:04:05.250"));
        assert!(!p.tokenizes(b"not a date"));
    }

    #[test]
    fn custom_time_zone_shifts_to_naive_utc() {
        let p = DateTimeParser {
            custom_time_zone: Some(Arc::new(|_: &[u8]| Some(3600))),
        };
        let parsed = p.parse(b"2024-01-02T03:00:00").unwrap();
        assert_eq!(parsed, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(2, 0, 0).unwrap());
    }
}
