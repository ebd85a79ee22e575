//! Plain text dumps of numeric columns, shared by the ascii reader and the
//! generic fallback. Free text lines form the header of the block that
//! follows them; runs of numeric rows of equal width form its data.

use anyhow::{anyhow, bail, Result};
use tracing::{debug, instrument, trace};

use super::normalize_value;
use crate::model::{CanonicalTable, RawFile};

const ASCII_EXTENSIONS: [&str; 5] = ["txt", "asc", "dat", "xy", "tsv"];
const SNIFF_LINES: usize = 64;

pub fn sniff_ascii(file: &mut RawFile) -> bool {
    let result = !file.encoding().is_binary()
        && ASCII_EXTENSIONS.contains(&file.extension().as_str())
        && file.head_text().is_some_and(|head| {
            head.lines()
                .take(SNIFF_LINES)
                .any(|line| numeric_row(line).is_some())
        });
    debug!(
        file_name = %file.name(),
        content_type = %file.content_type(),
        mime_type = %file.mime_type(),
        encoding = %file.encoding(),
        result,
        "ascii sniff"
    );
    result
}

/// The catch-all: accepts anything, `parse` decides.
pub fn sniff_generic(file: &mut RawFile) -> bool {
    debug!(
        file_name = %file.name(),
        content_type = %file.content_type(),
        mime_type = %file.mime_type(),
        encoding = %file.encoding(),
        result = true,
        "generic sniff"
    );
    true
}

/// Split `line` into at least two numeric cells, trying tab, `;`,
/// whitespace and `,` in that order. Values come back normalized.
pub fn numeric_row(line: &str) -> Option<Vec<String>> {
    let splits: [Vec<&str>; 4] = [
        split_on(line, '\t'),
        split_on(line, ';'),
        line.split_whitespace().collect(),
        split_on(line, ','),
    ];
    splits.into_iter().find_map(|tokens| {
        if tokens.len() < 2 {
            return None;
        }
        let values: Vec<String> = tokens.into_iter().map(normalize_value).collect();
        values
            .iter()
            .all(|v| v.parse::<f64>().is_ok())
            .then_some(values)
    })
}

fn split_on(line: &str, sep: char) -> Vec<&str> {
    line.split(sep)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .collect()
}

/// `key: value` or `key=value`, whichever separator comes first.
fn header_pair(line: &str) -> Option<(&str, &str)> {
    let at = line.find([':', '='])?;
    let key = line[..at].trim();
    let value = line[at + 1..].trim();
    (!key.is_empty() && !value.is_empty()).then_some((key, value))
}

#[instrument(level = "debug", skip(file), fields(file_name = %file.name()))]
pub fn parse(file: &mut RawFile) -> Result<Vec<CanonicalTable>> {
    let text = file
        .text()
        .ok_or_else(|| anyhow!("binary content has no text tables"))?;
    let tables = split_blocks(text.lines());

    if !tables.iter().any(|t| !t.columns.is_empty()) {
        bail!("no numeric table found");
    }
    debug!(tables = tables.len(), "text parsed");
    Ok(tables)
}

/// Group lines into tables. A header line after data, or a numeric row of
/// a different width, starts the next table.
pub fn split_blocks<'a>(lines: impl IntoIterator<Item = &'a str>) -> Vec<CanonicalTable> {
    let mut tables = Vec::new();
    let mut table = CanonicalTable::new();

    for line in lines {
        let line = line.trim_end();
        if line.trim().is_empty() {
            continue;
        }

        match numeric_row(line) {
            Some(row) => {
                if !table.rows.is_empty() && row.len() != table.columns.len() {
                    trace!(width = row.len(), "width changed, new table");
                    tables.push(std::mem::take(&mut table));
                }
                if table.columns.is_empty() {
                    table.push_numbered_columns(row.len());
                }
                table.rows.push(row);
            }
            None => {
                if !table.rows.is_empty() {
                    tables.push(std::mem::take(&mut table));
                }
                if let Some((key, value)) = header_pair(line) {
                    table.metadata.insert(key.to_string(), value.to_string());
                }
                table.header.push(line.to_string());
            }
        }
    }

    if table.has_content() {
        tables.push(table);
    }
    tables
}
