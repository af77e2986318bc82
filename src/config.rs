//! Reader configuration. Holds exactly the fields tabulated in the external
//! interface contract; no file-format or CLI plumbing lives here.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::grabber::CharCountConvention;
use crate::header::HeaderOverrides;
use crate::typing::{Parser, ParserName};

/// Row-shape tolerance when a row has fewer or more cells than the header.
/// The two directions are independent, matching the external interface's two
/// separate `allow_missing_columns`/`ignore_excess_columns` options (a row
/// can be tolerantly padded and tolerantly truncated at the same time).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct RowShapePolicy {
    /// Pad a short row with empty cells instead of failing.
    pub allow_missing_columns: bool,
    /// Drop cells past the header count from a long row instead of failing.
    pub ignore_excess_columns: bool,
}

/// Fixed-width-mode specific configuration.
#[derive(Clone, Debug, Default)]
pub struct FixedWidthConfig {
    /// Explicit column widths, in `convention` units. `None` means infer from
    /// the header row.
    pub widths: Option<Vec<usize>>,
    pub convention: CharCountConvention,
}

/// Per-column parser ladder overrides, keyed by header name or index.
#[derive(Clone, Debug, Default)]
pub struct ParserOverrides {
    pub default_ladder: Vec<ParserName>,
    pub by_name: BTreeMap<String, Vec<ParserName>>,
    pub by_index: BTreeMap<usize, Vec<ParserName>>,
}

/// Per-column null-literal overrides, keyed by header name or index.
#[derive(Clone, Debug, Default)]
pub struct NullLiteralOverrides {
    pub default_literals: Vec<String>,
    pub by_name: BTreeMap<String, Vec<String>>,
    pub by_index: BTreeMap<usize, Vec<String>>,
}

/// Top-level reader configuration, matching the external-interface table.
///
/// Not `Debug`: the custom-parser and custom-double/time-zone-parser hooks
/// are trait objects/closures with no useful debug representation.
#[derive(Clone)]
pub struct ReaderConfig {
    pub delimiter: u8,
    pub quote: u8,
    pub respect_quotes: bool,
    pub ignore_surrounding_spaces: bool,
    pub trim: bool,

    pub has_header_row: bool,
    pub skip_header_rows: usize,
    pub skip_rows: usize,
    pub num_rows: Option<u64>,
    pub ignore_empty_lines: bool,
    pub row_shape_policy: RowShapePolicy,

    pub header_overrides: HeaderOverrides,

    pub parsers: ParserOverrides,
    pub null_literals: NullLiteralOverrides,
    pub null_parser: Option<ParserName>,

    pub concurrent: bool,

    pub fixed_width: Option<FixedWidthConfig>,

    /// User-supplied parsers, addressable from a ladder via
    /// `ParserName::Custom(name)`.
    pub custom_parsers: BTreeMap<String, Arc<dyn Parser>>,
    /// Overrides the default `double` parser's numeric grammar.
    pub custom_double_parser: Option<Arc<dyn Fn(&[u8]) -> Option<f64> + Send + Sync>>,
    /// Overrides how the default date-time parser extracts a timezone offset
    /// (in seconds east of UTC) from a cell's text.
    pub custom_time_zone_parser: Option<Arc<dyn Fn(&[u8]) -> Option<i32> + Send + Sync>>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            delimiter: b',',
            quote: b'"',
            respect_quotes: true,
            ignore_surrounding_spaces: false,
            trim: false,
            has_header_row: true,
            skip_header_rows: 0,
            skip_rows: 0,
            num_rows: None,
            ignore_empty_lines: false,
            row_shape_policy: RowShapePolicy::default(),
            header_overrides: HeaderOverrides::default(),
            parsers: ParserOverrides {
                default_ladder: ParserName::default_numeric_ladder(),
                by_name: BTreeMap::new(),
                by_index: BTreeMap::new(),
            },
            null_literals: NullLiteralOverrides {
                default_literals: vec![String::new()],
                by_name: BTreeMap::new(),
                by_index: BTreeMap::new(),
            },
            null_parser: None,
            concurrent: true,
            fixed_width: None,
            custom_parsers: BTreeMap::new(),
            custom_double_parser: None,
            custom_time_zone_parser: None,
        }
    }
}

impl ReaderConfig {
    pub fn builder() -> ReaderConfigBuilder {
        ReaderConfigBuilder(ReaderConfig::default())
    }

    pub(crate) fn ladder_for(&self, index: usize, name: &str) -> Vec<ParserName> {
        if let Some(l) = self.parsers.by_index.get(&index) {
            return l.clone();
        }
        if let Some(l) = self.parsers.by_name.get(name) {
            return l.clone();
        }
        self.parsers.default_ladder.clone()
    }

    pub(crate) fn null_literals_for(&self, index: usize, name: &str) -> Vec<String> {
        if let Some(l) = self.null_literals.by_index.get(&index) {
            return l.clone();
        }
        if let Some(l) = self.null_literals.by_name.get(name) {
            return l.clone();
        }
        self.null_literals.default_literals.clone()
    }
}

/// A small direct builder, in the style of constructing the teacher's
/// `Parser` directly rather than through a generated config layer.
pub struct ReaderConfigBuilder(ReaderConfig);

impl ReaderConfigBuilder {
    pub fn delimiter(mut self, b: u8) -> Self {
        self.0.delimiter = b;
        self
    }

    pub fn quote(mut self, b: u8) -> Self {
        self.0.quote = b;
        self
    }

    pub fn has_header_row(mut self, v: bool) -> Self {
        self.0.has_header_row = v;
        self
    }

    pub fn skip_header_rows(mut self, n: usize) -> Self {
        self.0.skip_header_rows = n;
        self
    }

    pub fn skip_rows(mut self, n: usize) -> Self {
        self.0.skip_rows = n;
        self
    }

    pub fn num_rows(mut self, n: u64) -> Self {
        self.0.num_rows = Some(n);
        self
    }

    pub fn ignore_empty_lines(mut self, v: bool) -> Self {
        self.0.ignore_empty_lines = v;
        self
    }

    pub fn row_shape_policy(mut self, p: RowShapePolicy) -> Self {
        self.0.row_shape_policy = p;
        self
    }

    pub fn allow_missing_columns(mut self, v: bool) -> Self {
        self.0.row_shape_policy.allow_missing_columns = v;
        self
    }

    pub fn ignore_excess_columns(mut self, v: bool) -> Self {
        self.0.row_shape_policy.ignore_excess_columns = v;
        self
    }

    pub fn headers(mut self, names: Vec<String>) -> Self {
        self.0.header_overrides.full = Some(names);
        self
    }

    pub fn header_for_index(mut self, index: usize, name: String) -> Self {
        self.0.header_overrides.by_index.insert(index, name);
        self
    }

    pub fn parsers(mut self, ladder: Vec<ParserName>) -> Self {
        self.0.parsers.default_ladder = ladder;
        self
    }

    pub fn parser_for_name(mut self, name: String, ladder: Vec<ParserName>) -> Self {
        self.0.parsers.by_name.insert(name, ladder);
        self
    }

    pub fn parser_for_index(mut self, index: usize, ladder: Vec<ParserName>) -> Self {
        self.0.parsers.by_index.insert(index, ladder);
        self
    }

    pub fn null_value_literals(mut self, literals: Vec<String>) -> Self {
        self.0.null_literals.default_literals = literals;
        self
    }

    pub fn null_parser(mut self, parser: ParserName) -> Self {
        self.0.null_parser = Some(parser);
        self
    }

    pub fn concurrent(mut self, v: bool) -> Self {
        self.0.concurrent = v;
        self
    }

    pub fn ignore_surrounding_spaces(mut self, v: bool) -> Self {
        self.0.ignore_surrounding_spaces = v;
        self
    }

    pub fn trim(mut self, v: bool) -> Self {
        self.0.trim = v;
        self
    }

    pub fn fixed_column_widths(mut self, widths: Vec<usize>) -> Self {
        let convention = self
            .0
            .fixed_width
            .as_ref()
            .map(|f| f.convention)
            .unwrap_or(CharCountConvention::OneUnitPerCodePoint);
        self.0.fixed_width = Some(FixedWidthConfig {
            widths: Some(widths),
            convention,
        });
        self
    }

    pub fn custom_parser(mut self, name: String, parser: Arc<dyn Parser>) -> Self {
        self.0.custom_parsers.insert(name, parser);
        self
    }

    pub fn custom_double_parser(mut self, f: Arc<dyn Fn(&[u8]) -> Option<f64> + Send + Sync>) -> Self {
        self.0.custom_double_parser = Some(f);
        self
    }

    pub fn custom_time_zone_parser(mut self, f: Arc<dyn Fn(&[u8]) -> Option<i32> + Send + Sync>) -> Self {
        self.0.custom_time_zone_parser = Some(f);
        self
    }

    pub fn use_utf16_counting_convention(mut self) -> Self {
        let widths = self.0.fixed_width.as_ref().and_then(|f| f.widths.clone());
        self.0.fixed_width = Some(FixedWidthConfig {
            widths,
            convention: CharCountConvention::Utf16,
        });
        self
    }

    pub fn build(self) -> ReaderConfig {
        self.0
    }
}
