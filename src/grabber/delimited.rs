use std::io::{self, BufRead};

use memchr::{memchr, memchr3};

use super::cursor::ByteCursor;
use super::GrabbedCell;
use crate::error::{MalformedError, Result};

/// Which byte sequences are recognized as ending a row.
#[derive(Clone, Copy, Debug)]
pub struct RowTerminators {
    pub cr: bool,
    pub lf: bool,
    pub crlf: bool,
}

impl Default for RowTerminators {
    fn default() -> Self {
        RowTerminators {
            cr: true,
            lf: true,
            crlf: true,
        }
    }
}

/// Configuration for [`DelimitedGrabber`].
#[derive(Clone, Copy, Debug)]
pub struct DelimitedConfig {
    pub delimiter: u8,
    pub quote: u8,
    pub respect_quotes: bool,
    /// Trim ASCII whitespace surrounding unquoted cells.
    pub trim_unquoted: bool,
    /// Also trim ASCII whitespace just inside a quoted cell's quotes.
    pub trim_quoted: bool,
    pub terminators: RowTerminators,
}

impl Default for DelimitedConfig {
    fn default() -> Self {
        DelimitedConfig {
            delimiter: b',',
            quote: b'"',
            respect_quotes: true,
            trim_unquoted: false,
            trim_quoted: false,
            terminators: RowTerminators::default(),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    InUnquoted,
    InQuoted,
    AfterQuote,
}

/// A streaming state machine that turns delimited, optionally-quoted text
/// into one cell per call. See `spec.md` §4.3.
pub struct DelimitedGrabber<R> {
    cursor: ByteCursor<R>,
    config: DelimitedConfig,
    buf: Vec<u8>,
    physical_row: u64,
}

impl<R: BufRead> DelimitedGrabber<R> {
    pub fn new(r: R, config: DelimitedConfig) -> Self {
        DelimitedGrabber {
            cursor: ByteCursor::new(r),
            config,
            buf: Vec::with_capacity(64),
            physical_row: 1,
        }
    }

    /// Produces the next cell. Returns `end_of_input = true` on the call that
    /// consumes the final byte of input with no trailing terminator, and on
    /// every call afterward (an empty, already-ended cell).
    pub fn next_cell(&mut self) -> Result<GrabbedCell<'_>> {
        let row = self.physical_row;
        self.buf.clear();

        let started_quoted = match self.cursor.peek()? {
            Some(b) if b == self.config.quote && self.config.respect_quotes => {
                self.cursor.bump();
                true
            }
            _ => false,
        };
        let mut state = if started_quoted {
            State::InQuoted
        } else {
            State::InUnquoted
        };

        let mut last_in_row = false;
        let mut end_of_input = false;

        loop {
            match state {
                State::InUnquoted => {
                    // Bulk-copy everything up to the next byte that could
                    // possibly end the cell, one `memchr3` scan per buffered
                    // chunk instead of a peek/bump pair per byte. Mirrors the
                    // teacher's `memchr2`-based fast path in
                    // `unquote_c_style_string` (`fast-export/src/parse/quote.rs`):
                    // scan for the next byte that matters, copy everything
                    // before it in one shot.
                    copy_run(&mut self.cursor, &mut self.buf, |chunk| {
                        memchr3(self.config.delimiter, b'\r', b'\n', chunk)
                    })?;
                    match self.cursor.peek()? {
                        None => {
                            end_of_input = true;
                            last_in_row = true;
                            break;
                        }
                        Some(b) if b == self.config.delimiter => {
                            self.cursor.bump();
                            break;
                        }
                        Some(b'\r') => {
                            self.cursor.bump();
                            if self.config.terminators.crlf && self.cursor.peek()? == Some(b'\n') {
                                self.cursor.bump();
                                self.physical_row += 1;
                                last_in_row = true;
                                break;
                            } else if self.config.terminators.cr {
                                self.physical_row += 1;
                                last_in_row = true;
                                break;
                            } else {
                                self.buf.push(b'\r');
                            }
                        }
                        Some(b'\n') if self.config.terminators.lf => {
                            self.cursor.bump();
                            self.physical_row += 1;
                            last_in_row = true;
                            break;
                        }
                        Some(b) => {
                            // Only reachable for `\n` when `terminators.lf`
                            // is disabled: the scan above always stops at one
                            // of the delimiter/CR/LF bytes, so every other
                            // candidate above already matched and broke out.
                            debug_assert_eq!(b, b'\n');
                            self.cursor.bump();
                            self.buf.push(b);
                        }
                    }
                }
                State::InQuoted => {
                    copy_run(&mut self.cursor, &mut self.buf, |chunk| memchr(self.config.quote, chunk))?;
                    match self.cursor.peek()? {
                        None => return Err(MalformedError::UnterminatedQuote { row }.into()),
                        Some(b) => {
                            debug_assert_eq!(b, self.config.quote, "scan above only stops at the quote byte");
                            self.cursor.bump();
                            state = State::AfterQuote;
                        }
                    }
                }
                State::AfterQuote => match self.cursor.peek()? {
                    Some(b) if b == self.config.quote => {
                        // A doubled quote inside a quoted cell is a literal
                        // quote character, not the end of the cell.
                        self.cursor.bump();
                        self.buf.push(self.config.quote);
                        state = State::InQuoted;
                    }
                    Some(b) if b == self.config.delimiter => {
                        self.cursor.bump();
                        break;
                    }
                    None => {
                        end_of_input = true;
                        last_in_row = true;
                        break;
                    }
                    Some(b'\r') => {
                        self.cursor.bump();
                        if self.config.terminators.crlf && self.cursor.peek()? == Some(b'\n') {
                            self.cursor.bump();
                            self.physical_row += 1;
                            last_in_row = true;
                            break;
                        } else if self.config.terminators.cr {
                            self.physical_row += 1;
                            last_in_row = true;
                            break;
                        } else {
                            return Err(MalformedError::ByteAfterQuote { row, found: b'\r' }.into());
                        }
                    }
                    Some(b'\n') if self.config.terminators.lf => {
                        self.cursor.bump();
                        self.physical_row += 1;
                        last_in_row = true;
                        break;
                    }
                    Some(b) => {
                        return Err(MalformedError::ByteAfterQuote { row, found: b }.into());
                    }
                },
            }
        }

        if let Err(e) = std::str::from_utf8(&self.buf) {
            return Err(MalformedError::InvalidUtf8Start {
                row,
                byte: self.buf[e.valid_up_to()],
            }
            .into());
        }

        let trim = if started_quoted {
            self.config.trim_quoted
        } else {
            self.config.trim_unquoted
        };
        let bytes: &[u8] = if trim {
            trim_ascii_whitespace(&self.buf)
        } else {
            &self.buf
        };

        Ok(GrabbedCell {
            bytes,
            last_in_row,
            end_of_input,
            physical_row: row,
        })
    }

    pub fn is_at_end(&self) -> bool {
        self.cursor.eof()
    }
}

/// Copies bytes from `cursor` into `buf` up to (not including) the next byte
/// `scan` locates, scanning one buffered chunk at a time rather than peeking
/// byte by byte. Leaves the cursor positioned just before that byte (or at
/// EOF, if `scan` never finds one before the input ends).
fn copy_run<R: BufRead>(
    cursor: &mut ByteCursor<R>,
    buf: &mut Vec<u8>,
    mut scan: impl FnMut(&[u8]) -> Option<usize>,
) -> io::Result<()> {
    loop {
        let chunk = cursor.fill_buf()?;
        if chunk.is_empty() {
            return Ok(());
        }
        match scan(chunk) {
            Some(0) => return Ok(()),
            Some(pos) => {
                buf.extend_from_slice(&chunk[..pos]);
                cursor.consume(pos);
                return Ok(());
            }
            None => {
                let n = chunk.len();
                buf.extend_from_slice(chunk);
                cursor.consume(n);
            }
        }
    }
}

fn trim_ascii_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().take_while(|b| b.is_ascii_whitespace()).count();
    let end = bytes
        .iter()
        .rev()
        .take_while(|b| b.is_ascii_whitespace())
        .count();
    if start + end >= bytes.len() {
        &[]
    } else {
        &bytes[start..bytes.len() - end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn grab_all(input: &str, config: DelimitedConfig) -> Vec<(String, bool, bool)> {
        let mut g = DelimitedGrabber::new(Cursor::new(input.as_bytes().to_vec()), config);
        let mut out = Vec::new();
        // A row that ends via an explicit terminator reports `end_of_input:
        // false` (the grabber hasn't looked past the terminator yet); the
        // next call is what discovers there's nothing left, as an empty
        // cell at the start of a new row. Skip that sentinel rather than
        // recording it as a real trailing cell.
        let mut at_row_start = true;
        loop {
            let cell = g.next_cell().unwrap();
            if at_row_start && cell.bytes.is_empty() && cell.last_in_row && cell.end_of_input {
                break;
            }
            at_row_start = cell.last_in_row;
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
    fn simple_row() {
        let cells = grab_all("A,B,C\n", DelimitedConfig::default());
        assert_eq!(
            cells,
            vec![
                ("A".into(), false, false),
                ("B".into(), false, false),
                ("C".into(), true, false),
            ]
        );
    }

    #[test]
    fn last_cell_without_trailing_newline() {
        let cells = grab_all("A,B", DelimitedConfig::default());
        assert_eq!(
            cells,
            vec![("A".into(), false, false), ("B".into(), true, true)]
        );
    }

    #[test]
    fn quoted_cell_with_embedded_newline_and_doubled_quote() {
        let cells = grab_all("\"a\nb\"\"c\",d\n", DelimitedConfig::default());
        assert_eq!(
            cells,
            vec![("a\nb\"c".into(), false, false), ("d".into(), true, false)]
        );
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        let mut g = DelimitedGrabber::new(Cursor::new(b"\"abc".to_vec()), DelimitedConfig::default());
        assert!(g.next_cell().is_err());
    }

    #[test]
    fn byte_after_closing_quote_is_an_error() {
        let mut g =
            DelimitedGrabber::new(Cursor::new(b"\"abc\"x,y\n".to_vec()), DelimitedConfig::default());
        assert!(g.next_cell().is_err());
    }

    #[test]
    fn trim_applies_only_to_unquoted_when_not_configured_for_quoted() {
        let config = DelimitedConfig {
            trim_unquoted: true,
            trim_quoted: false,
            ..DelimitedConfig::default()
        };
        let cells = grab_all("  a  ,\"  b  \"\n", config);
        assert_eq!(cells[0].0, "a");
        assert_eq!(cells[1].0, "  b  ");
    }

    #[test]
    fn invalid_utf8_in_an_unquoted_cell_is_an_error() {
        let mut g = DelimitedGrabber::new(Cursor::new(vec![b'a', 0xFF, b','].to_vec()), DelimitedConfig::default());
        assert!(g.next_cell().is_err());
    }

    #[test]
    fn crlf_row_terminator() {
        let cells = grab_all("A,B\r\nC\r\n", DelimitedConfig::default());
        assert_eq!(
            cells,
            vec![
                ("A".into(), false, false),
                ("B".into(), true, false),
                ("C".into(), true, false),
            ]
        );
    }
}
