//! Minimal CSV/TSV parser that produces a [`MemoryFrame`].
//!
//! The first record is the header row and names the columns; every
//! following record is one data row. Fields are sniffed into
//! [`CellValue`]s: empty becomes null, `true`/`false` become booleans,
//! anything `f64` can parse becomes a number, the rest stays text.

use crate::dataframe::{CellValue, ColumnDescriptor, MemoryFrame};
use crate::error::{Result, VgridError};

/// Delimiter for parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Comma,
    Semicolon,
    Tab,
}

impl Delimiter {
    /// Parse a host-supplied delimiter name.
    ///
    /// Accepts the names `comma`, `semicolon` and `tab` as well as the
    /// literal characters.
    ///
    /// # Errors
    ///
    /// `Configuration` for anything else.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "comma" | "," => Ok(Self::Comma),
            "semicolon" | ";" => Ok(Self::Semicolon),
            "tab" | "\t" => Ok(Self::Tab),
            other => Err(VgridError::Configuration(format!(
                "unknown delimiter {other:?}"
            ))),
        }
    }

    fn as_char(self) -> char {
        match self {
            Self::Comma => ',',
            Self::Semicolon => ';',
            Self::Tab => '\t',
        }
    }
}

/// Parse delimited bytes into a [`MemoryFrame`], guessing the delimiter
/// from the header row.
pub fn parse_auto(data: &[u8]) -> Result<MemoryFrame> {
    parse_delimited(data, sniff_delimiter(data))
}

/// Guess the delimiter by counting candidates in the first line,
/// outside quotes. Ties and quiet lines fall back to comma.
#[must_use]
pub fn sniff_delimiter(data: &[u8]) -> Delimiter {
    let text = String::from_utf8_lossy(data);
    let first_line = text.lines().next().unwrap_or_default();

    let mut commas = 0_u32;
    let mut semicolons = 0_u32;
    let mut tabs = 0_u32;
    let mut in_quotes = false;
    for ch in first_line.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => commas += 1,
            ';' if !in_quotes => semicolons += 1,
            '\t' if !in_quotes => tabs += 1,
            _ => {}
        }
    }

    if tabs > commas && tabs > semicolons {
        Delimiter::Tab
    } else if semicolons > commas {
        Delimiter::Semicolon
    } else {
        Delimiter::Comma
    }
}

/// Parse delimited bytes into a [`MemoryFrame`].
///
/// Rows shorter than the header are padded with nulls and rows longer
/// than it are truncated, so the frame is always rectangular.
pub fn parse_delimited(data: &[u8], delimiter: Delimiter) -> Result<MemoryFrame> {
    let text = String::from_utf8_lossy(data);
    let mut records = split_records(&text, delimiter.as_char()).into_iter();

    let Some(header) = records.next() else {
        return Ok(MemoryFrame::empty(Vec::new()));
    };
    let columns: Vec<ColumnDescriptor> = header_names(&header)
        .into_iter()
        .map(ColumnDescriptor::new)
        .collect();

    let mut rows: Vec<Vec<CellValue>> = Vec::new();
    for record in records {
        let row: Vec<CellValue> = (0..columns.len())
            .map(|position| record.get(position).map_or(CellValue::Null, |f| parse_cell(f)))
            .collect();
        rows.push(row);
    }

    MemoryFrame::new(columns, rows)
}

/// Split text into records of fields, respecting quoted fields.
///
/// A newline inside quotes belongs to the field; a newline outside
/// quotes ends the record. Records with no content at all are skipped.
fn split_records(text: &str, sep: char) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut fields: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            if ch == '"' {
                if chars.peek() == Some(&'"') {
                    // Escaped quote
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(ch);
            }
        } else if ch == '"' {
            in_quotes = true;
        } else if ch == sep {
            fields.push(std::mem::take(&mut current));
        } else if ch == '\n' {
            if current.ends_with('\r') {
                current.pop();
            }
            fields.push(std::mem::take(&mut current));
            if fields.iter().any(|f| !f.is_empty()) {
                records.push(std::mem::take(&mut fields));
            } else {
                fields.clear();
            }
        } else {
            current.push(ch);
        }
    }
    if current.ends_with('\r') {
        current.pop();
    }
    fields.push(current);
    if fields.iter().any(|f| !f.is_empty()) {
        records.push(fields);
    }
    records
}

/// Column names from the header record: blank headers get positional
/// names, repeats get a numeric suffix so every column stays
/// addressable.
fn header_names(header: &[String]) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(header.len());
    for (position, raw) in header.iter().enumerate() {
        let trimmed = raw.trim();
        let base = if trimmed.is_empty() {
            format!("column {}", position + 1)
        } else {
            trimmed.to_string()
        };
        let mut name = base.clone();
        let mut suffix = 2_u32;
        while names.contains(&name) {
            name = format!("{base} ({suffix})");
            suffix += 1;
        }
        names.push(name);
    }
    names
}

fn parse_cell(field: &str) -> CellValue {
    let value = field.trim();
    if value.is_empty() {
        return CellValue::Null;
    }
    match value {
        "true" | "True" | "TRUE" => return CellValue::Bool(true),
        "false" | "False" | "FALSE" => return CellValue::Bool(false),
        _ => {}
    }
    // Try to detect numbers
    if let Ok(number) = value.parse::<f64>() {
        return CellValue::Number(number);
    }
    CellValue::Text(value.to_string())
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp
)]
mod tests {
    use crate::dataframe::DataFrame;

    use super::*;

    #[test]
    fn test_parse_csv_basic() {
        let data = b"Name,Age,City\nAlice,30,NYC\nBob,25,LA";
        let frame = parse_delimited(data, Delimiter::Comma).unwrap();
        assert_eq!(
            frame
                .columns()
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>(),
            vec!["Name", "Age", "City"]
        );
        assert_eq!(frame.num_rows(), 2);
        assert_eq!(
            frame.get_cell(0, "Name", None).unwrap(),
            Some(CellValue::from("Alice"))
        );
        // "30" is parsed as number
        assert_eq!(
            frame.get_cell(0, "Age", None).unwrap(),
            Some(CellValue::from(30.0))
        );
    }

    #[test]
    fn test_parse_tsv() {
        let data = b"A\tB\n1\t2";
        let frame = parse_delimited(data, Delimiter::Tab).unwrap();
        assert_eq!(frame.columns().len(), 2);
        assert_eq!(frame.num_rows(), 1);
    }

    #[test]
    fn test_quoted_csv() {
        let data = b"text,count\n\"Hello, World\",42\n\"She said \"\"hi\"\"\",0";
        let frame = parse_delimited(data, Delimiter::Comma).unwrap();
        assert_eq!(
            frame.get_cell(0, "text", None).unwrap(),
            Some(CellValue::from("Hello, World"))
        );
        assert_eq!(
            frame.get_cell(1, "text", None).unwrap(),
            Some(CellValue::from("She said \"hi\""))
        );
    }

    #[test]
    fn test_quoted_field_keeps_newline() {
        let data = b"text,count\n\"line one\nline two\",5";
        let frame = parse_delimited(data, Delimiter::Comma).unwrap();
        assert_eq!(frame.num_rows(), 1);
        assert_eq!(
            frame.get_cell(0, "text", None).unwrap(),
            Some(CellValue::from("line one\nline two"))
        );
    }

    #[test]
    fn test_crlf_line_endings() {
        let data = b"a,b\r\n1,x\r\n";
        let frame = parse_delimited(data, Delimiter::Comma).unwrap();
        assert_eq!(frame.num_rows(), 1);
        assert_eq!(
            frame.get_cell(0, "b", None).unwrap(),
            Some(CellValue::from("x"))
        );
    }

    #[test]
    fn test_empty_csv() {
        let data = b"";
        let frame = parse_delimited(data, Delimiter::Comma).unwrap();
        assert_eq!(frame.columns().len(), 0);
        assert_eq!(frame.num_rows(), 0);
    }

    #[test]
    fn test_value_inference() {
        let data = b"flag,score,label,blank\ntrue,1.5,abc,\nFALSE,-2e3,def,";
        let frame = parse_delimited(data, Delimiter::Comma).unwrap();
        assert_eq!(
            frame.get_cell(0, "flag", None).unwrap(),
            Some(CellValue::Bool(true))
        );
        assert_eq!(
            frame.get_cell(1, "flag", None).unwrap(),
            Some(CellValue::Bool(false))
        );
        assert_eq!(
            frame.get_cell(1, "score", None).unwrap(),
            Some(CellValue::from(-2000.0))
        );
        assert_eq!(
            frame.get_cell(0, "label", None).unwrap(),
            Some(CellValue::from("abc"))
        );
        assert_eq!(frame.get_cell(0, "blank", None).unwrap(), Some(CellValue::Null));
    }

    #[test]
    fn test_ragged_rows_are_squared_off() {
        let data = b"a,b,c\n1,2\n1,2,3,4";
        let frame = parse_delimited(data, Delimiter::Comma).unwrap();
        assert_eq!(frame.num_rows(), 2);
        assert_eq!(frame.get_cell(0, "c", None).unwrap(), Some(CellValue::Null));
        assert_eq!(
            frame.get_cell(1, "c", None).unwrap(),
            Some(CellValue::from(3.0))
        );
    }

    #[test]
    fn test_header_names_stay_addressable() {
        let data = b"x,,x\n1,2,3";
        let frame = parse_delimited(data, Delimiter::Comma).unwrap();
        assert_eq!(
            frame
                .columns()
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>(),
            vec!["x", "column 2", "x (2)"]
        );
    }

    #[test]
    fn test_delimiter_names() {
        assert_eq!(Delimiter::from_name("tab").unwrap(), Delimiter::Tab);
        assert_eq!(Delimiter::from_name(";").unwrap(), Delimiter::Semicolon);
        assert!(Delimiter::from_name("pipe").is_err());
    }

    #[test]
    fn test_sniffing_picks_the_busiest_delimiter() {
        assert_eq!(sniff_delimiter(b"a;b;c\n1;2;3"), Delimiter::Semicolon);
        assert_eq!(sniff_delimiter(b"a\tb\n1\t2"), Delimiter::Tab);
        assert_eq!(sniff_delimiter(b"a,b\n1,2"), Delimiter::Comma);
        assert_eq!(sniff_delimiter(b"\"a;b\",c\n1,2"), Delimiter::Comma);

        let frame = parse_auto(b"name;age\nida;44").unwrap();
        assert_eq!(
            frame.get_cell(0, "age", None).unwrap(),
            Some(CellValue::from(44.0))
        );
    }
}
