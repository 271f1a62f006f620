//! Minimal CSV row handling for the flight log and the simulation fixture.
//!
//! Quoting follows the RFC 4180 conventions the ground software has always
//! used: a field is quoted when it holds a delimiter, a quote, a line break,
//! or starts with whitespace; inner quotes are doubled.

use alloc::string::String;
use alloc::vec::Vec;
use std::io::{self, Write};
use thiserror::Error;

pub const DELIMITER: char = ',';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CsvError {
    #[error("unterminated quoted field starting at column {column}")]
    UnterminatedQuote { column: usize },
    #[error("unexpected character {found:?} after closing quote at column {column}")]
    TrailingCharacter { column: usize, found: char },
}

fn needs_quotes(field: &str) -> bool {
    if field.is_empty() {
        return false;
    }
    field.starts_with([' ', '\t'])
        || field.contains([DELIMITER, '"', '\r', '\n'])
}

pub fn write_record<'a, W, I>(writer: &mut W, fields: I) -> io::Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a str>,
{
    for (index, field) in fields.into_iter().enumerate() {
        if index > 0 {
            writer.write_all(b",")?;
        }
        if needs_quotes(field) {
            writer.write_all(b"\"")?;
            writer.write_all(field.replace('"', "\"\"").as_bytes())?;
            writer.write_all(b"\"")?;
        } else {
            writer.write_all(field.as_bytes())?;
        }
    }
    writer.write_all(b"\n")
}

/// Split one line into fields. Line terminators must already be stripped;
/// quoted fields may not span lines.
pub fn parse_line(line: &str) -> Result<Vec<String>, CsvError> {
    let mut fields = Vec::new();
    let mut chars = line.chars().peekable();
    let mut column = 0;

    loop {
        let mut field = String::new();
        let start_column = column;

        if chars.peek() == Some(&'"') {
            chars.next();
            column += 1;
            let mut closed = false;
            while let Some(c) = chars.next() {
                column += 1;
                if c == '"' {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        column += 1;
                        field.push('"');
                    } else {
                        closed = true;
                        break;
                    }
                } else {
                    field.push(c);
                }
            }
            if !closed {
                return Err(CsvError::UnterminatedQuote { column: start_column });
            }
            match chars.next() {
                None => {
                    fields.push(field);
                    return Ok(fields);
                }
                Some(DELIMITER) => {
                    column += 1;
                    fields.push(field);
                    continue;
                }
                Some(found) => return Err(CsvError::TrailingCharacter { column, found }),
            }
        }

        loop {
            match chars.next() {
                None => {
                    fields.push(field);
                    return Ok(fields);
                }
                Some(DELIMITER) => {
                    column += 1;
                    fields.push(field);
                    break;
                }
                Some(c) => {
                    column += 1;
                    field.push(c);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(fields: &[&str]) -> String {
        let mut out = Vec::new();
        write_record(&mut out, fields.iter().copied()).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_plain_fields_joined() {
        assert_eq!(render(&["2078", "00:01:02", "GOAT"]), "2078,00:01:02,GOAT\n");
    }

    #[test]
    fn test_special_fields_quoted() {
        assert_eq!(render(&["a\"b", " lead", "x"]), "\"a\"\"b\",\" lead\",x\n");
        assert_eq!(render(&["", "line\nbreak"]), ",\"line\nbreak\"\n");
    }

    #[test]
    fn test_parse_plain_line() {
        assert_eq!(parse_line("2078,1,,F").unwrap(), vec!["2078", "1", "", "F"]);
        assert_eq!(parse_line("").unwrap(), vec![""]);
    }

    #[test]
    fn test_parse_quoted_fields() {
        assert_eq!(
            parse_line("\"a,b\",\"say \"\"hi\"\"\",c").unwrap(),
            vec!["a,b", "say \"hi\"", "c"]
        );
        assert_eq!(parse_line("x,\"\"").unwrap(), vec!["x", ""]);
    }

    #[test]
    fn test_parse_rejects_broken_quotes() {
        assert!(matches!(parse_line("\"open,field"), Err(CsvError::UnterminatedQuote { .. })));
        assert!(matches!(
            parse_line("\"closed\"x,y"),
            Err(CsvError::TrailingCharacter { found: 'x', .. })
        ));
    }
}
