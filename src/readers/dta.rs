//! Gamry `.dta` dumps: tab-indented tables preceded by free-form header
//! blocks. A header line starting with `CURVE` announces a table whose first
//! two indented lines are the column names and units.

use anyhow::{anyhow, Result};
use tracing::{debug, trace};

use super::normalize_value;
use crate::model::{CanonicalTable, RawFile};

const SENTINEL: &str = "CURVE";
const INDENT: char = '\t';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Header,
    ColumnNames,
    ColumnUnits,
    Data,
}

pub fn sniff(file: &mut RawFile) -> bool {
    let result = !file.encoding().is_binary()
        && file.extension() == "dta"
        && file.mime_type() == "text/plain";
    debug!(
        file_name = %file.name(),
        content_type = %file.content_type(),
        mime_type = %file.mime_type(),
        encoding = %file.encoding(),
        result,
        "dta sniff"
    );
    result
}

pub fn parse(file: &mut RawFile) -> Result<Vec<CanonicalTable>> {
    let text = file
        .text()
        .ok_or_else(|| anyhow!("binary content cannot be read as DTA"))?;
    Ok(parse_lines(text.lines()))
}

/// Run the header/names/units/data state machine over `lines`.
pub fn parse_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Vec<CanonicalTable> {
    let mut tables = Vec::new();
    let mut table = CanonicalTable::new();
    let mut state = State::Header;
    let mut names_seen = false;
    let mut units_seen = false;

    for line in lines {
        let row = line.trim_end();

        if !row.starts_with(INDENT) {
            // a header line after data opens the next table
            if !table.rows.is_empty() {
                tables.push(std::mem::take(&mut table));
                names_seen = false;
                units_seen = false;
            }
            state = State::Header;
        }

        match state {
            State::Header => {
                table.header.push(row.to_string());
                let tokens: Vec<&str> = row.split_whitespace().collect();
                if tokens.len() >= 3 {
                    table
                        .metadata
                        .insert(tokens[0].to_string(), tokens[2].to_string());
                }
                if row.starts_with(SENTINEL) {
                    state = if !names_seen {
                        State::ColumnNames
                    } else if !units_seen {
                        State::ColumnUnits
                    } else {
                        State::Data
                    };
                    trace!(?state, "leaving header");
                }
            }
            State::ColumnNames => {
                for (idx, name) in row.split_whitespace().enumerate() {
                    table
                        .metadata
                        .insert(format!("column_{:02}", idx), name.to_string());
                    table.push_column(format!("Column #{} ({})", idx, name));
                }
                names_seen = true;
                state = if units_seen {
                    State::Data
                } else {
                    State::ColumnUnits
                };
            }
            State::ColumnUnits => {
                for (idx, unit) in row.split_whitespace().enumerate() {
                    table
                        .metadata
                        .insert(format!("column_{:02}_unit", idx), unit.to_string());
                }
                units_seen = true;
                state = State::Data;
            }
            State::Data => {
                table
                    .rows
                    .push(row.split_whitespace().map(normalize_value).collect());
            }
        }
    }

    if table.has_content() {
        tables.push(table);
    }
    debug!(tables = tables.len(), "dta parsed");
    tables
}
