//! Header resolver: determines column names and, in fixed-width mode,
//! column widths, from the first (post-skip) row.
//!
//! Grounded on `spec.md` §4.5. There is no teacher analog for this step
//! specifically (the teacher never reads tabular headers), so the control
//! flow here is written in the same style as the rest of the grabber layer:
//! small, direct functions over an explicit state machine rather than an
//! abstraction the spec doesn't ask for.

use std::collections::BTreeMap;
use std::io::BufRead;

use crate::error::{ConfigError, Result};
use crate::grabber::{
    infer_widths, split_line_by_widths, trim_padding, CellSource, CharCountConvention,
    FixedWidthGrabber,
};

/// Caller-supplied name overrides, applied after header names are read or
/// synthesized.
#[derive(Clone, Debug, Default)]
pub struct HeaderOverrides {
    /// Replaces the entire name list. Length must match the resolved column
    /// count.
    pub full: Option<Vec<String>>,
    /// Replaces individual names by column index.
    pub by_index: BTreeMap<usize, String>,
}

/// The outcome of header resolution.
pub struct ResolvedHeader {
    pub names: Vec<String>,
    /// When names were synthesized (no header row configured), the row that
    /// had to be read to count columns is the first row of actual data and
    /// must be fed to the column writers rather than discarded.
    pub buffered_first_row: Option<Vec<Vec<u8>>>,
}

/// Resolves headers for a delimited (non fixed-width) source.
pub fn resolve_delimited_headers<G: CellSource>(
    grabber: &mut G,
    has_header_row: bool,
    skip_header_rows: usize,
    overrides: &HeaderOverrides,
) -> Result<ResolvedHeader> {
    for _ in 0..skip_header_rows {
        read_row(grabber)?;
    }

    let (names, buffered_first_row) = if has_header_row {
        let row = read_row(grabber)?;
        (row_to_names(&row), None)
    } else {
        let row = read_row(grabber)?;
        let names = (1..=row.len()).map(|i| format!("Column{i}")).collect();
        (names, Some(row))
    };

    let names = apply_overrides(names, overrides)?;
    Ok(ResolvedHeader {
        names,
        buffered_first_row,
    })
}

/// Resolves headers (and, if not already known, widths) for a fixed-width
/// source. Returns the resolved header alongside the widths the grabber
/// should be configured with before reading data rows.
pub fn resolve_fixed_width_headers<R: BufRead>(
    grabber: &mut FixedWidthGrabber<R>,
    has_header_row: bool,
    skip_header_rows: usize,
    configured_widths: Option<Vec<usize>>,
    padding: u8,
    convention: CharCountConvention,
    overrides: &HeaderOverrides,
) -> Result<(ResolvedHeader, Vec<usize>)> {
    for _ in 0..skip_header_rows {
        grabber.read_raw_line()?;
    }

    let (header_line, header_row) = match grabber.read_raw_line()? {
        Some(line) => line,
        None => (String::new(), 1),
    };

    let widths = match configured_widths {
        Some(w) => w,
        None => infer_widths(&header_line, padding, convention, header_row)?,
    };

    let names = if has_header_row {
        let cols = split_header_line(&header_line, &widths, convention, header_row)?;
        cols.into_iter()
            .map(|s| trim_padding(s, padding).to_string())
            .collect()
    } else {
        (1..=widths.len()).map(|i| format!("Column{i}")).collect()
    };

    let buffered_first_row = if has_header_row {
        None
    } else {
        Some(
            split_header_line(&header_line, &widths, convention, header_row)?
                .into_iter()
                .map(|s| s.as_bytes().to_vec())
                .collect(),
        )
    };

    let names = apply_overrides(names, overrides)?;
    Ok((
        ResolvedHeader {
            names,
            buffered_first_row,
        },
        widths,
    ))
}

fn split_header_line<'a>(
    line: &'a str,
    widths: &[usize],
    convention: CharCountConvention,
    row: u64,
) -> Result<Vec<&'a str>> {
    let ranges = split_line_by_widths(line, widths, convention, row)?;
    Ok(ranges.into_iter().map(|(s, e)| &line[s..e]).collect())
}

fn read_row<G: CellSource>(grabber: &mut G) -> Result<Vec<Vec<u8>>> {
    let mut cells = Vec::new();
    loop {
        let cell = grabber.next_cell()?;
        cells.push(cell.bytes.to_vec());
        if cell.last_in_row {
            break;
        }
    }
    Ok(cells)
}

fn row_to_names(row: &[Vec<u8>]) -> Vec<String> {
    row.iter()
        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
        .collect()
}

fn apply_overrides(mut names: Vec<String>, overrides: &HeaderOverrides) -> Result<Vec<String>> {
    if let Some(full) = &overrides.full {
        if full.len() != names.len() {
            return Err(ConfigError::HeaderCountMismatch {
                given: full.len(),
                found: names.len(),
            }
            .into());
        }
        names = full.clone();
    }
    for (&idx, name) in &overrides.by_index {
        if idx < names.len() {
            names[idx] = name.clone();
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grabber::{DelimitedConfig, DelimitedGrabber};
    use std::io::Cursor;

    #[test]
    fn reads_header_row_as_names() {
        let mut g = DelimitedGrabber::new(
            Cursor::new(b"name,age\nAlice,30\n".to_vec()),
            DelimitedConfig::default(),
        );
        let resolved =
            resolve_delimited_headers(&mut g, true, 0, &HeaderOverrides::default()).unwrap();
        assert_eq!(resolved.names, vec!["name", "age"]);
        assert!(resolved.buffered_first_row.is_none());
    }

    #[test]
    fn synthesizes_names_from_first_row_and_buffers_it() {
        let mut g = DelimitedGrabber::new(
            Cursor::new(b"Alice,30,NY\n".to_vec()),
            DelimitedConfig::default(),
        );
        let resolved =
            resolve_delimited_headers(&mut g, false, 0, &HeaderOverrides::default()).unwrap();
        assert_eq!(resolved.names, vec!["Column1", "Column2", "Column3"]);
        let buffered = resolved.buffered_first_row.unwrap();
        assert_eq!(buffered[0], b"Alice");
        assert_eq!(buffered[1], b"30");
        assert_eq!(buffered[2], b"NY");
    }

    #[test]
    fn skip_header_rows_drops_rows_before_header() {
        let mut g = DelimitedGrabber::new(
            Cursor::new(b"preamble\nname,age\nAlice,30\n".to_vec()),
            DelimitedConfig::default(),
        );
        let resolved =
            resolve_delimited_headers(&mut g, true, 1, &HeaderOverrides::default()).unwrap();
        assert_eq!(resolved.names, vec!["name", "age"]);
    }

    #[test]
    fn full_override_replaces_names_when_length_matches() {
        let mut g = DelimitedGrabber::new(
            Cursor::new(b"a,b\n1,2\n".to_vec()),
            DelimitedConfig::default(),
        );
        let overrides = HeaderOverrides {
            full: Some(vec!["x".into(), "y".into()]),
            by_index: BTreeMap::new(),
        };
        let resolved = resolve_delimited_headers(&mut g, true, 0, &overrides).unwrap();
        assert_eq!(resolved.names, vec!["x", "y"]);
    }

    #[test]
    fn full_override_length_mismatch_is_a_config_error() {
        let mut g = DelimitedGrabber::new(
            Cursor::new(b"a,b\n1,2\n".to_vec()),
            DelimitedConfig::default(),
        );
        let overrides = HeaderOverrides {
            full: Some(vec!["x".into()]),
            by_index: BTreeMap::new(),
        };
        assert!(resolve_delimited_headers(&mut g, true, 0, &overrides).is_err());
    }

    #[test]
    fn per_index_override_replaces_a_single_name() {
        let mut g = DelimitedGrabber::new(
            Cursor::new(b"a,b,c\n1,2,3\n".to_vec()),
            DelimitedConfig::default(),
        );
        let mut by_index = BTreeMap::new();
        by_index.insert(1, "middle".to_string());
        let overrides = HeaderOverrides {
            full: None,
            by_index,
        };
        let resolved = resolve_delimited_headers(&mut g, true, 0, &overrides).unwrap();
        assert_eq!(resolved.names, vec!["a", "middle", "c"]);
    }

    #[test]
    fn infers_fixed_widths_from_header_row() {
        let mut g = FixedWidthGrabber::new_with_unresolved_widths(
            Cursor::new(b"name age\nAlicex30\n".to_vec()),
            CharCountConvention::OneUnitPerCodePoint,
            b' ',
        );
        let (resolved, widths) = resolve_fixed_width_headers(
            &mut g,
            true,
            0,
            None,
            b' ',
            CharCountConvention::OneUnitPerCodePoint,
            &HeaderOverrides::default(),
        )
        .unwrap();
        assert_eq!(widths, vec![5, 3]);
        assert_eq!(resolved.names, vec!["name", "age"]);
    }
}
