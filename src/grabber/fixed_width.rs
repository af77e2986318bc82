use std::io::BufRead;

use super::delimited::{DelimitedConfig, DelimitedGrabber, RowTerminators};
use super::GrabbedCell;
use crate::error::{MalformedError, Result};

/// How a configured column width is measured against a line's characters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CharCountConvention {
    /// One unit per Unicode scalar value (a 4-byte UTF-8 sequence counts as
    /// one column-width unit, matching how most fixed-width specs are
    /// authored).
    #[default]
    OneUnitPerCodePoint,
    /// One unit per UTF-16 code unit (a supplementary-plane character counts
    /// as two), matching specs ported from a UTF-16-native environment.
    Utf16,
}

impl CharCountConvention {
    fn units(self, ch: char) -> usize {
        match self {
            CharCountConvention::OneUnitPerCodePoint => 1,
            CharCountConvention::Utf16 => ch.len_utf16(),
        }
    }
}

/// A line-oriented grabber that splits each physical line into columns by
/// character width rather than by delimiter.
///
/// Reuses [`DelimitedGrabber`] as a line splitter by configuring it with
/// delimiter/quote bytes (`0xFF`/`0xFE`) that cannot occur in valid UTF-8, so
/// it never recognizes a delimiter or quote and returns exactly one cell per
/// physical row: the whole line.
pub struct FixedWidthGrabber<R> {
    lines: DelimitedGrabber<R>,
    widths: Vec<usize>,
    convention: CharCountConvention,
    /// The padding byte trimmed from both ends of every emitted cell, same
    /// byte the header resolver trims header names with (`spec.md` §4.5:
    /// "Trim the padding byte (= delimiter) from each header" — applied here
    /// to data cells too, since a column's declared width otherwise always
    /// includes the padding that separated it from its neighbor).
    padding: u8,
    line: String,
    cols: Vec<(usize, usize)>,
    col_idx: usize,
    physical_row: u64,
    pending_end_of_input: bool,
}

/// Delimiter/quote bytes that never occur in well-formed UTF-8, used to turn
/// [`DelimitedGrabber`] into a pure line splitter.
const SENTINEL_DELIMITER: u8 = 0xFF;
const SENTINEL_QUOTE: u8 = 0xFE;

impl<R: BufRead> FixedWidthGrabber<R> {
    /// Builds a grabber with already-known column widths (either
    /// caller-supplied or already inferred by [`infer_widths`]).
    pub fn new(r: R, widths: Vec<usize>, convention: CharCountConvention, padding: u8) -> Self {
        FixedWidthGrabber {
            lines: DelimitedGrabber::new(r, line_splitter_config()),
            widths,
            convention,
            padding,
            line: String::new(),
            cols: Vec::new(),
            col_idx: 0,
            physical_row: 0,
            pending_end_of_input: false,
        }
    }

    /// Builds a grabber whose widths are not yet known. The caller must read
    /// the header line with [`Self::read_raw_line`], compute widths (e.g. via
    /// [`infer_widths`]), then call [`Self::set_widths`] before the first
    /// call to [`Self::next_cell`].
    pub fn new_with_unresolved_widths(r: R, convention: CharCountConvention, padding: u8) -> Self {
        Self::new(r, Vec::new(), convention, padding)
    }

    /// Reads one raw physical line without splitting it into columns, for use
    /// by the header resolver before widths are known. Returns `None` at end
    /// of input.
    pub fn read_raw_line(&mut self) -> Result<Option<(String, u64)>> {
        let cell = self.lines.next_cell()?;
        let row = cell.physical_row;
        if cell.bytes.is_empty() && cell.end_of_input && self.lines.is_at_end() {
            return Ok(None);
        }
        let text = decode_utf8_line(cell.bytes, row)?.to_string();
        Ok(Some((text, row)))
    }

    pub fn set_widths(&mut self, widths: Vec<usize>) {
        self.widths = widths;
    }

    /// Reads one physical line and splits it into byte ranges, one per
    /// configured width, with the final column absorbing any remaining bytes.
    fn load_next_line(&mut self) -> Result<bool> {
        let cell = self.lines.next_cell()?;
        self.physical_row = cell.physical_row;
        if cell.bytes.is_empty() && cell.end_of_input && self.lines.is_at_end() {
            return Ok(false);
        }

        let row = cell.physical_row;
        let text = decode_utf8_line(cell.bytes, row)?;
        self.line.clear();
        self.line.push_str(text);
        self.pending_end_of_input = cell.end_of_input;

        self.cols = split_line_by_widths(&self.line, &self.widths, self.convention, row)?;
        self.col_idx = 0;
        Ok(true)
    }

    pub fn next_cell(&mut self) -> Result<GrabbedCell<'_>> {
        if self.col_idx >= self.cols.len() {
            if !self.load_next_line()? {
                return Ok(GrabbedCell {
                    bytes: &[],
                    last_in_row: true,
                    end_of_input: true,
                    physical_row: self.physical_row,
                });
            }
        }
        let (start, end) = self.cols[self.col_idx];
        let is_last = self.col_idx + 1 == self.cols.len();
        self.col_idx += 1;
        let trimmed = trim_padding(&self.line[start..end], self.padding);
        Ok(GrabbedCell {
            bytes: trimmed.as_bytes(),
            last_in_row: is_last,
            end_of_input: is_last && self.pending_end_of_input,
            physical_row: self.physical_row,
        })
    }
}

fn line_splitter_config() -> DelimitedConfig {
    DelimitedConfig {
        delimiter: SENTINEL_DELIMITER,
        quote: SENTINEL_QUOTE,
        respect_quotes: false,
        trim_unquoted: false,
        trim_quoted: false,
        terminators: RowTerminators {
            cr: true,
            lf: true,
            crlf: true,
        },
    }
}

fn decode_utf8_line(bytes: &[u8], row: u64) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| {
        MalformedError::InvalidUtf8Start {
            row,
            byte: bytes[e.valid_up_to()],
        }
        .into()
    })
}

/// Splits `line` into `(start, end)` byte ranges, one per entry in `widths`
/// (each measured in `convention` units), with the final range absorbing
/// whatever bytes remain after the last configured boundary. Used both for
/// ordinary data rows (`widths` already known) and, via [`infer_widths`], for
/// the header row itself.
pub(crate) fn split_line_by_widths(
    line: &str,
    widths: &[usize],
    convention: CharCountConvention,
    row: u64,
) -> Result<Vec<(usize, usize)>> {
    let mut cols = Vec::with_capacity(widths.len().max(1));
    let mut byte_offset = 0usize;
    let mut unit_count = 0usize;
    let mut width_idx = 0usize;
    let mut col_start_byte = 0usize;
    let mut col_start_units = 0usize;
    let last_width_idx = widths.len().saturating_sub(1);

    for ch in line.chars() {
        let ch_units = convention.units(ch);
        if width_idx < last_width_idx {
            let target = widths[width_idx];
            if unit_count - col_start_units + ch_units > target {
                if unit_count - col_start_units != target {
                    return Err(MalformedError::SplitSurrogatePair {
                        row,
                        char_offset: unit_count,
                    }
                    .into());
                }
                cols.push((col_start_byte, byte_offset));
                col_start_byte = byte_offset;
                col_start_units = unit_count;
                width_idx += 1;
            }
        }
        byte_offset += ch.len_utf8();
        unit_count += ch_units;
    }
    cols.push((col_start_byte, byte_offset));
    while cols.len() < widths.len() {
        cols.push((byte_offset, byte_offset));
    }
    Ok(cols)
}

/// Infers column widths from a header row: a column start is any non-padding
/// character preceded by the padding byte or by start-of-row (a padding byte
/// at the very start of the row is rejected as malformed); a column's width
/// is the distance, in `convention` units, from its start to the next
/// column's start, including trailing padding.
pub fn infer_widths(
    header_line: &str,
    padding: u8,
    convention: CharCountConvention,
    row: u64,
) -> Result<Vec<usize>> {
    if header_line.as_bytes().first() == Some(&padding) {
        return Err(MalformedError::DelimiterAtRowStart { row }.into());
    }
    let mut widths = Vec::new();
    let mut current = 0usize;
    let mut prev_is_padding = true;
    for ch in header_line.chars() {
        let is_padding = ch.is_ascii() && (ch as u8) == padding;
        if !is_padding && prev_is_padding && current > 0 {
            widths.push(current);
            current = 0;
        }
        current += convention.units(ch);
        prev_is_padding = is_padding;
    }
    if current > 0 {
        widths.push(current);
    }
    Ok(widths)
}

/// Trims leading and trailing `padding` bytes from a header name extracted
/// via [`infer_widths`] or a caller-supplied width.
pub fn trim_padding(mut name: &str, padding: u8) -> &str {
    if padding.is_ascii() {
        let pad = padding as char;
        name = name.trim_matches(pad);
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn grab_all(input: &str, widths: Vec<usize>) -> Vec<(String, bool, bool)> {
        let mut g = FixedWidthGrabber::new(
            Cursor::new(input.as_bytes().to_vec()),
            widths,
            CharCountConvention::OneUnitPerCodePoint,
            b' ',
        );
        let mut out = Vec::new();
        loop {
            let cell = g.next_cell().unwrap();
            let end = cell.end_of_input;
            out.push((
                String::from_utf8(cell.bytes.to_vec()).unwrap(),
                cell.last_in_row,
                end,
            ));
            if end {
                break;
            }
        }
        out
    }

    #[test]
    fn splits_by_configured_widths_with_final_column_absorbing_remainder() {
        let cells = grab_all("abXYZZZ\n", vec![2, 2]);
        assert_eq!(
            cells,
            vec![("ab".into(), false, false), ("XYZZZ".into(), true, false)]
        );
    }

    #[test]
    fn two_rows() {
        let cells = grab_all("aabbb\nccddd\n", vec![2, 3]);
        assert_eq!(
            cells,
            vec![
                ("aa".into(), false, false),
                ("bbb".into(), true, false),
                ("cc".into(), false, false),
                ("ddd".into(), true, false),
            ]
        );
    }

    #[test]
    fn last_row_without_trailing_newline() {
        let cells = grab_all("aabbb", vec![2, 3]);
        assert_eq!(
            cells,
            vec![("aa".into(), false, false), ("bbb".into(), true, true)]
        );
    }

    #[test]
    fn multibyte_characters_count_as_one_unit_per_code_point() {
        let cells = grab_all("a\u{00e9}bcd\n", vec![2, 3]);
        assert_eq!(cells[0].0, "a\u{00e9}");
        assert_eq!(cells[1].0, "bcd");
    }

    #[test]
    fn trailing_padding_within_a_column_width_is_trimmed_from_data_cells() {
        // Widths [4, 3] computed from a header like "AAA BBB" include the
        // padding space that separated the two columns in column one's
        // width; that space must not leak into the data cell's value.
        let cells = grab_all("111 222\n", vec![4, 3]);
        assert_eq!(cells[0].0, "111");
        assert_eq!(cells[1].0, "222");
    }

    #[test]
    fn infers_widths_from_padded_header_row() {
        let widths =
            infer_widths("AA   BB  CCC", b' ', CharCountConvention::OneUnitPerCodePoint, 1).unwrap();
        assert_eq!(widths, vec![5, 4, 3]);
    }

    #[test]
    fn infer_widths_rejects_padding_at_row_start() {
        let err = infer_widths(" AA BB", b' ', CharCountConvention::OneUnitPerCodePoint, 1);
        assert!(err.is_err());
    }

    #[test]
    fn trim_padding_strips_only_padding_byte() {
        assert_eq!(trim_padding("  name  ", b' '), "name");
        assert_eq!(trim_padding("--name--", b'-'), "name");
    }
}
