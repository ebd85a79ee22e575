//! Office Open XML workbooks: one table per worksheet, in workbook order.

use anyhow::{anyhow, bail, Context, Result};
use roxmltree::{Document, Node};
use std::collections::HashMap;
use std::io::{Read, Seek};
use tracing::{debug, instrument, trace};
use zip::ZipArchive;

use super::{
    container::{children, read_entry},
    has_zip_magic,
};
use crate::model::{CanonicalTable, RawFile};

const WORKBOOK: &str = "xl/workbook.xml";
const WORKBOOK_RELS: &str = "xl/_rels/workbook.xml.rels";
const SHARED_STRINGS: &str = "xl/sharedStrings.xml";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
/// Column count of a worksheet (`A` to `XFD`).
const MAX_COLUMNS: usize = 16_384;

pub fn sniff(file: &mut RawFile) -> bool {
    let result = file.extension() == "xlsx" && has_zip_magic(file);
    debug!(
        file_name = %file.name(),
        content_type = %file.content_type(),
        mime_type = %file.mime_type(),
        encoding = %file.encoding(),
        result,
        "xlsx sniff"
    );
    result
}

#[instrument(level = "debug", skip(file), fields(file_name = %file.name()))]
pub fn parse(file: &mut RawFile) -> Result<Vec<CanonicalTable>> {
    let mut archive = ZipArchive::new(file).context("opening XLSX archive")?;

    // 1) sheet names and relationship ids, in workbook order
    let workbook = read_entry(&mut archive, WORKBOOK)?;
    let workbook = Document::parse(&workbook).with_context(|| format!("parsing {}", WORKBOOK))?;
    let sheets: Vec<(String, String)> = workbook
        .descendants()
        .filter(|node| node.has_tag_name("sheet"))
        .filter_map(|node| {
            let name = node.attribute("name")?;
            let rel = node.attribute((REL_NS, "id"))?;
            Some((name.to_string(), rel.to_string()))
        })
        .collect();

    // 2) relationship id -> worksheet part
    let rels = read_entry(&mut archive, WORKBOOK_RELS)?;
    let rels = Document::parse(&rels).with_context(|| format!("parsing {}", WORKBOOK_RELS))?;
    let targets: HashMap<&str, String> = rels
        .descendants()
        .filter(|node| node.has_tag_name("Relationship"))
        .filter_map(|node| Some((node.attribute("Id")?, part_path(node.attribute("Target")?))))
        .collect();

    // 3) shared string table, when the workbook has one
    let shared: Vec<String> = if archive.file_names().any(|name| name == SHARED_STRINGS) {
        let xml = read_entry(&mut archive, SHARED_STRINGS)?;
        let doc = Document::parse(&xml).with_context(|| format!("parsing {}", SHARED_STRINGS))?;
        children(doc.root_element(), "si").map(text_runs).collect()
    } else {
        Vec::new()
    };
    debug!(sheets = sheets.len(), shared_strings = shared.len(), "workbook indexed");

    // 4) one table per sheet
    let mut tables = Vec::with_capacity(sheets.len());
    for (name, rel) in sheets {
        let part = targets
            .get(rel.as_str())
            .ok_or_else(|| anyhow!("sheet {} has no relationship {}", name, rel))?;
        let mut table = read_sheet(&mut archive, part, &shared)
            .with_context(|| format!("reading sheet {}", name))?;
        table.metadata.insert("sheet_name".to_string(), name);
        tables.push(table);
    }
    Ok(tables)
}

fn read_sheet<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    part: &str,
    shared: &[String],
) -> Result<CanonicalTable> {
    let xml = read_entry(archive, part)?;
    let doc = Document::parse(&xml).with_context(|| format!("parsing {}", part))?;

    let mut table = CanonicalTable::new();
    for row in doc.descendants().filter(|node| node.has_tag_name("row")) {
        let mut cells: Vec<String> = Vec::new();
        for cell in children(row, "c") {
            let col = match cell.attribute("r") {
                Some(cell_ref) => column_index(cell_ref)?,
                None => None,
            }
            .unwrap_or(cells.len());
            if col >= MAX_COLUMNS {
                bail!("cell beyond column XFD in row {}", table.rows.len() + 1);
            }
            if cells.len() <= col {
                cells.resize(col + 1, String::new());
            }
            cells[col] = cell_value(cell, shared)?;
        }
        table.rows.push(cells);
    }

    let width = table.rows.iter().map(Vec::len).max().unwrap_or(0);
    table.push_numbered_columns(width);
    for row in &mut table.rows {
        row.resize(width, String::new());
    }
    trace!(part, rows = table.rows.len(), columns = width, "parsed sheet");
    Ok(table)
}

fn cell_value(cell: Node<'_, '_>, shared: &[String]) -> Result<String> {
    let raw = children(cell, "v")
        .next()
        .and_then(|v| v.text())
        .unwrap_or_default();
    match cell.attribute("t") {
        Some("s") => {
            let idx: usize = raw
                .trim()
                .parse()
                .with_context(|| format!("bad shared string index {:?}", raw))?;
            shared
                .get(idx)
                .cloned()
                .ok_or_else(|| anyhow!("shared string {} out of range", idx))
        }
        Some("inlineStr") => Ok(children(cell, "is").next().map(text_runs).unwrap_or_default()),
        _ => Ok(raw.trim().to_string()),
    }
}

/// Concatenated `<t>` runs of a string item.
fn text_runs(node: Node<'_, '_>) -> String {
    node.descendants()
        .filter(|n| n.has_tag_name("t"))
        .filter_map(|n| n.text())
        .collect()
}

/// Zero-based column of a cell reference such as `AB12`; `None` when the
/// reference has no column letters.
fn column_index(cell_ref: &str) -> Result<Option<usize>> {
    let mut n = 0usize;
    for b in cell_ref.bytes().take_while(u8::is_ascii_alphabetic) {
        let digit = (b.to_ascii_uppercase() - b'A' + 1) as usize;
        n = n
            .checked_mul(26)
            .and_then(|n| n.checked_add(digit))
            .filter(|&n| n <= MAX_COLUMNS)
            .ok_or_else(|| anyhow!("cell reference {:?} is beyond column XFD", cell_ref))?;
    }
    Ok(n.checked_sub(1))
}

/// Relationship targets are relative to `xl/` unless absolute.
fn part_path(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target),
    }
}
