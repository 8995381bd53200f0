//! Incremental CSV decoder
//!
//! RFC 4180 parsing over arbitrary byte chunks. Fields, quoted sections,
//! and multi-byte characters may be split anywhere across chunk boundaries;
//! the parser carries its state between `push_chunk` calls and flushes the
//! final unterminated record in `finish`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Row {row} contains invalid UTF-8")]
    InvalidUtf8 { row: usize },

    #[error("Unterminated quoted field at end of input")]
    UnclosedQuote,

    #[error("Unexpected character {found:?} after closing quote in row {row}")]
    UnexpectedAfterQuote { found: char, row: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// At the start of a field, nothing consumed yet.
    FieldStart,
    Unquoted,
    Quoted,
    /// Saw a quote inside a quoted field; could be an escape or the close.
    QuoteInQuoted,
}

pub struct CsvParser {
    state: State,
    field: Vec<u8>,
    row: Vec<String>,
    rows_emitted: usize,
}

impl Default for CsvParser {
    fn default() -> Self {
        Self::new()
    }
}

impl CsvParser {
    pub fn new() -> Self {
        Self {
            state: State::FieldStart,
            field: Vec::new(),
            row: Vec::new(),
            rows_emitted: 0,
        }
    }

    /// Feed one chunk of bytes, returning the records completed by it.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Result<Vec<Vec<String>>, ParseError> {
        let mut rows = Vec::new();

        for &byte in chunk {
            match self.state {
                State::FieldStart => match byte {
                    b'"' => self.state = State::Quoted,
                    b',' => self.end_field()?,
                    b'\n' => self.end_record(&mut rows)?,
                    _ => {
                        self.field.push(byte);
                        self.state = State::Unquoted;
                    },
                },
                State::Unquoted => match byte {
                    b',' => self.end_field()?,
                    b'\n' => self.end_record(&mut rows)?,
                    _ => self.field.push(byte),
                },
                State::Quoted => match byte {
                    b'"' => self.state = State::QuoteInQuoted,
                    _ => self.field.push(byte),
                },
                State::QuoteInQuoted => match byte {
                    b'"' => {
                        self.field.push(b'"');
                        self.state = State::Quoted;
                    },
                    b',' => self.end_quoted_field()?,
                    b'\n' => self.end_quoted_record(&mut rows)?,
                    b'\r' => {
                        // Closing quote followed by CRLF; the CR is dropped
                        // again when the LF terminates the field.
                        self.field.push(b'\r');
                        self.state = State::Unquoted;
                    },
                    other => {
                        return Err(ParseError::UnexpectedAfterQuote {
                            found: other as char,
                            row: self.rows_emitted + 1,
                        });
                    },
                },
            }
        }

        Ok(rows)
    }

    /// Flush the final record, if the input did not end with a newline.
    pub fn finish(mut self) -> Result<Option<Vec<String>>, ParseError> {
        match self.state {
            State::Quoted => return Err(ParseError::UnclosedQuote),
            State::FieldStart if self.row.is_empty() => return Ok(None),
            _ => {},
        }

        self.end_field()?;
        let row = std::mem::take(&mut self.row);
        if row.iter().all(|f| f.is_empty()) && row.len() == 1 {
            return Ok(None);
        }
        Ok(Some(row))
    }

    fn end_field(&mut self) -> Result<(), ParseError> {
        let bytes = std::mem::take(&mut self.field);
        let text = String::from_utf8(bytes).map_err(|_| ParseError::InvalidUtf8 {
            row: self.rows_emitted + 1,
        })?;
        self.row.push(text);
        self.state = State::FieldStart;
        Ok(())
    }

    fn end_record(&mut self, rows: &mut Vec<Vec<String>>) -> Result<(), ParseError> {
        // CR immediately before the record terminator belongs to CRLF.
        if self.field.last() == Some(&b'\r') {
            self.field.pop();
        }
        self.end_field()?;
        let row = std::mem::take(&mut self.row);
        // Blank lines between records are skipped.
        if !(row.len() == 1 && row[0].is_empty()) {
            self.rows_emitted += 1;
            rows.push(row);
        }
        Ok(())
    }

    fn end_quoted_field(&mut self) -> Result<(), ParseError> {
        let bytes = std::mem::take(&mut self.field);
        let text = String::from_utf8(bytes).map_err(|_| ParseError::InvalidUtf8 {
            row: self.rows_emitted + 1,
        })?;
        self.row.push(text);
        self.state = State::FieldStart;
        Ok(())
    }

    fn end_quoted_record(&mut self, rows: &mut Vec<Vec<String>>) -> Result<(), ParseError> {
        self.end_quoted_field()?;
        let row = std::mem::take(&mut self.row);
        self.rows_emitted += 1;
        rows.push(row);
        Ok(())
    }
}
