//! Bruker `.brml` archives: a zip whose `Experiment0/DataContainer.xml`
//! lists raw-data documents, each holding one or more data routes of
//! comma-separated `Datum` rows.

use anyhow::{bail, Context, Result};
use roxmltree::{Document, Node};
use tracing::{debug, instrument, trace};
use zip::ZipArchive;

use super::{
    container::{children, read_entry},
    has_zip_magic,
};
use crate::model::{CanonicalTable, RawFile};

const DATA_CONTAINER: &str = "Experiment0/DataContainer.xml";

pub fn sniff(file: &mut RawFile) -> bool {
    let result = file.name().ends_with(".brml") && has_zip_magic(file);
    debug!(
        file_name = %file.name(),
        content_type = %file.content_type(),
        mime_type = %file.mime_type(),
        encoding = %file.encoding(),
        result,
        "brml sniff"
    );
    result
}

#[instrument(level = "debug", skip(file), fields(file_name = %file.name()))]
pub fn parse(file: &mut RawFile) -> Result<Vec<CanonicalTable>> {
    let mut archive = ZipArchive::new(file).context("opening BRML archive")?;

    let container = read_entry(&mut archive, DATA_CONTAINER)?;
    let container = Document::parse(&container)
        .with_context(|| format!("parsing {}", DATA_CONTAINER))?;

    let references: Vec<String> = children(container.root_element(), "RawDataReferenceList")
        .flat_map(|list| children(list, "string"))
        .filter_map(|node| node.text())
        .map(|name| name.trim().to_string())
        .collect();
    debug!(references = references.len(), "found raw data references");

    let mut tables = Vec::new();
    for data_file in references {
        let raw = read_entry(&mut archive, &data_file)?;
        let raw = Document::parse(&raw).with_context(|| format!("parsing {}", data_file))?;

        for (route_idx, route) in children(raw.root_element(), "DataRoutes")
            .flat_map(|routes| children(routes, "DataRoute"))
            .enumerate()
        {
            let mut table = parse_route(route)
                .with_context(|| format!("data route {} of {}", route_idx, data_file))?;
            table
                .metadata
                .insert("data_file".to_string(), data_file.clone());
            tables.push(table);
        }
    }

    Ok(tables)
}

/// One table per route; the first datum fixes the column count.
fn parse_route(route: Node<'_, '_>) -> Result<CanonicalTable> {
    let mut table = CanonicalTable::new();

    for (datum_idx, datum) in children(route, "Datum").enumerate() {
        let row: Vec<String> = datum
            .text()
            .unwrap_or_default()
            .split(',')
            .map(|cell| cell.trim().to_string())
            .collect();

        if datum_idx == 0 {
            table.push_numbered_columns(row.len());
        } else if row.len() != table.columns.len() {
            bail!(
                "datum {} has {} values, expected {}",
                datum_idx,
                row.len(),
                table.columns.len()
            );
        }
        table.rows.push(row);
    }

    trace!(rows = table.rows.len(), columns = table.columns.len(), "parsed route");
    Ok(table)
}
