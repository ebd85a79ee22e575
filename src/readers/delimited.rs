//! Delimiter separated text. The delimiter is guessed from a sample of
//! leading lines, the records are then read with the `csv` crate.

use anyhow::{anyhow, bail, Context, Result};
use csv::ReaderBuilder;
use std::io::Cursor;
use tracing::{debug, instrument};

use crate::model::{CanonicalTable, RawFile};

/// Candidates in order of preference.
const DELIMITERS: [u8; 4] = [b'\t', b';', b',', b'|'];
const SAMPLE_LINES: usize = 16;

pub fn sniff(file: &mut RawFile) -> bool {
    let result = !file.encoding().is_binary()
        && (file.extension() == "csv" || file.content_type() == "text/csv");
    debug!(
        file_name = %file.name(),
        content_type = %file.content_type(),
        mime_type = %file.mime_type(),
        encoding = %file.encoding(),
        result,
        "csv sniff"
    );
    result
}

/// First candidate present on at least half of the sampled non-empty
/// lines, `,` otherwise.
pub fn detect_delimiter(text: &str) -> u8 {
    let sample: Vec<&str> = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(SAMPLE_LINES)
        .collect();

    DELIMITERS
        .into_iter()
        .find(|delimiter| {
            let hits = sample
                .iter()
                .filter(|line| line.as_bytes().contains(delimiter))
                .count();
            hits > 0 && hits * 2 >= sample.len()
        })
        .unwrap_or(b',')
}

#[instrument(level = "debug", skip(file), fields(file_name = %file.name()))]
pub fn parse(file: &mut RawFile) -> Result<Vec<CanonicalTable>> {
    let text = file
        .text()
        .ok_or_else(|| anyhow!("binary content cannot be read as CSV"))?;
    let delimiter = detect_delimiter(&text);
    debug!(delimiter = %(delimiter as char).escape_default(), "detected delimiter");

    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(Cursor::new(text.as_bytes()));

    let mut table = CanonicalTable::new();
    let mut in_header = true;
    for (idx, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("parsing CSV record {}", idx))?;
        let cells: Vec<String> = record.iter().map(|cell| cell.trim().to_string()).collect();
        let filled = cells.iter().filter(|cell| !cell.is_empty()).count();

        // leading single-value lines are free-form header text
        if in_header && filled <= 1 {
            if let Some(line) = cells.into_iter().find(|cell| !cell.is_empty()) {
                table.header.push(line);
            }
            continue;
        }
        in_header = false;
        table.rows.push(cells);
    }

    if table.rows.is_empty() && table.header.is_empty() {
        bail!("no records found");
    }

    let width = table.rows.iter().map(Vec::len).max().unwrap_or(0);
    table.push_numbered_columns(width);
    for row in &mut table.rows {
        row.resize(width, String::new());
    }
    table
        .metadata
        .insert("delimiter".to_string(), (delimiter as char).to_string());

    Ok(vec![table])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readers::ReaderKind;

    #[test]
    fn delimiter_detection_follows_preference_order() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3\n4;5;6\n"), b';');
        assert_eq!(detect_delimiter("a\tb\n1,5\t2,5\n"), b'\t');
        assert_eq!(detect_delimiter("x,y\n1,2\n3,4\n"), b',');
        assert_eq!(detect_delimiter("1|2\n3|4\n"), b'|');
        assert_eq!(detect_delimiter("no delimiters at all\n"), b',');
        assert_eq!(detect_delimiter(""), b',');
    }

    #[test]
    fn header_lines_then_padded_rows() -> anyhow::Result<()> {
        let body = "Sample: A1\n\nOperator: jd\nwave;abs;note\n400;0,1\n401;0,2;ok\n";
        let mut file = RawFile::new(body.as_bytes().to_vec(), "scan.csv", "text/csv");
        assert!(sniff(&mut file));

        let tables = ReaderKind::Delimited.parse(&mut file)?;
        assert_eq!(tables.len(), 1);
        let table = &tables[0];
        assert_eq!(table.header, vec!["Sample: A1", "Operator: jd"]);
        assert_eq!(table.columns.len(), 3);
        assert_eq!(table.columns[2].name, "Column #2");
        assert_eq!(table.rows[0], vec!["wave", "abs", "note"]);
        assert_eq!(table.rows[1], vec!["400", "0,1", ""]);
        assert_eq!(table.metadata["rows"], "3");
        assert_eq!(table.metadata["delimiter"], ";");
        Ok(())
    }

    #[test]
    fn quoted_fields_keep_delimiters() -> anyhow::Result<()> {
        let body = "name,value\n\"a, b\",1\n\"c\",2\n";
        let mut file = RawFile::new(body.as_bytes().to_vec(), "q.csv", "text/plain");
        let tables = ReaderKind::Delimited.parse(&mut file)?;
        assert_eq!(tables[0].rows[1], vec!["a, b", "1"]);
        Ok(())
    }

    #[test]
    fn empty_file_is_an_error() {
        let mut file = RawFile::new(Vec::new(), "empty.csv", "text/csv");
        assert!(ReaderKind::Delimited.parse(&mut file).is_err());
    }

    #[test]
    fn sniff_uses_content_type_too() {
        let mut by_type = RawFile::new(b"1,2\n".to_vec(), "upload", "text/csv");
        assert!(sniff(&mut by_type));
        let mut other = RawFile::new(b"1,2\n".to_vec(), "upload.txt", "text/plain");
        assert!(!sniff(&mut other));
    }
}
