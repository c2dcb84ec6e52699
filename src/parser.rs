use nom::{
    branch::alt,
    bytes::complete::{take_until, take_while},
    character::complete::char,
    multi::separated_list1,
    IResult,
};

use crate::model::LoadError;

/// Format discriminator supplied by the caller alongside the raw bytes.
/// Spreadsheet sources are ingested through their tab-separated export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Delimited,
    Spreadsheet,
}

impl TableFormat {
    fn delimiter(&self) -> char {
        match self {
            TableFormat::Delimited => ',',
            TableFormat::Spreadsheet => '\t',
        }
    }
}

/// Decoded tabular input: a header row plus data rows. Cells are raw
/// strings; typing happens in the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

// --- CELL PARSERS ---

fn parse_quoted_cell(input: &str) -> IResult<&str, String> {
    let (input, _) = char('"')(input)?;
    let (input, content) = take_until("\"")(input)?;
    let (input, _) = char('"')(input)?;
    Ok((input, content.to_string()))
}

fn parse_bare_cell(delim: char) -> impl Fn(&str) -> IResult<&str, String> {
    move |input| {
        let (input, content) = take_while(|c: char| c != delim && c != '\r' && c != '\n')(input)?;
        Ok((input, content.trim().to_string()))
    }
}

fn parse_row(delim: char) -> impl Fn(&str) -> IResult<&str, Vec<String>> {
    move |input| {
        separated_list1(char(delim), alt((parse_quoted_cell, parse_bare_cell(delim))))(input)
    }
}

/// Decode a tabular byte source.
///
/// Fails with `UnsupportedFormat` when the bytes are not valid UTF-8 or no
/// header row can be read. Short rows are padded with empty cells and long
/// rows truncated to the header width; row-level timestamp validation is
/// the store's job, not the decoder's.
pub fn decode_table(bytes: &[u8], format: TableFormat) -> Result<Table, LoadError> {
    let text = std::str::from_utf8(bytes).map_err(|_| LoadError::UnsupportedFormat)?;
    let delim = format.delimiter();

    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header = lines.next().ok_or(LoadError::UnsupportedFormat)?;

    let (rest, columns) = parse_row(delim)(header).map_err(|_| LoadError::UnsupportedFormat)?;
    if !rest.trim().is_empty() || columns.iter().all(|c| c.is_empty()) {
        return Err(LoadError::UnsupportedFormat);
    }

    let width = columns.len();
    let mut rows = Vec::new();
    for line in lines {
        let (_, mut cells) = parse_row(delim)(line).map_err(|_| LoadError::UnsupportedFormat)?;
        cells.resize(width, String::new());
        rows.push(cells);
    }

    Ok(Table { columns, rows })
}
