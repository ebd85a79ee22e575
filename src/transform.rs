//! Projection of matched tables into `{header, x, y}` output series.

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, instrument, trace};

use crate::{
    error::{ConvertError, Result},
    matcher::{MatchRecord, ProfileMatch},
    model::FileData,
    profile::{ColumnRef, Operation, OutputTableSpec},
};

/// One output table, ready for an exchange-format writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConvertedTable {
    pub header: IndexMap<String, String>,
    pub x: Vec<String>,
    pub y: Vec<String>,
}

/// Run every output table spec of the matched profile. Any failing
/// operation fails the whole conversion.
#[instrument(level = "info", skip_all, fields(profile_id = %matched.profile.id()))]
pub fn process(matched: &ProfileMatch<'_>, data: &FileData) -> Result<Vec<ConvertedTable>> {
    let mut out = Vec::with_capacity(matched.profile.tables.len());
    for (output_index, spec) in matched.profile.tables.iter().enumerate() {
        let table = convert_table(spec, output_index, &matched.matches, data).map_err(|e| match e {
            ConvertError::ConversionFailed(reason) => {
                ConvertError::ConversionFailed(format!("output table {}: {}", output_index, reason))
            }
            other => other,
        })?;
        debug!(output_index, points = table.x.len(), "converted table");
        out.push(table);
    }
    Ok(out)
}

/// Header template overlaid with captured values routed to this table.
/// Later identifiers win on key collisions.
pub fn build_header(
    spec: &OutputTableSpec,
    output_index: usize,
    matches: &[MatchRecord<'_>],
) -> IndexMap<String, String> {
    let mut header = spec.header.clone();
    for record in matches {
        let Some(key) = &record.identifier.output_key else {
            continue;
        };
        if record
            .identifier
            .output_table_index
            .map_or(true, |target| target == output_index)
        {
            header.insert(key.clone(), record.result.value.clone());
        }
    }
    header
}

fn convert_table(
    spec: &OutputTableSpec,
    output_index: usize,
    matches: &[MatchRecord<'_>],
    data: &FileData,
) -> Result<ConvertedTable> {
    // 1) every referenced column has to exist
    let references = spec
        .x_column
        .iter()
        .chain(spec.y_column.iter())
        .chain(spec.x_operations.iter().chain(&spec.y_operations).filter_map(column_of));
    for column in references {
        check_column(column, data)?;
    }

    // 2) walk all cells once, collecting series and operation references
    let mut x = Vec::new();
    let mut y = Vec::new();
    let mut x_refs: Vec<Vec<String>> = vec![Vec::new(); spec.x_operations.len()];
    let mut y_refs: Vec<Vec<String>> = vec![Vec::new(); spec.y_operations.len()];

    for (table_index, table) in data.tables.iter().enumerate() {
        for (row_index, row) in table.rows.iter().enumerate() {
            if row_index == 0 && spec.skips_first_row(table_index) {
                continue;
            }
            for (column_index, cell) in row.iter().enumerate() {
                let here = ColumnRef {
                    table_index,
                    column_index,
                };
                let value = cell.replace(',', ".");
                if spec.x_column == Some(here) {
                    x.push(value.clone());
                }
                if spec.y_column == Some(here) {
                    y.push(value.clone());
                }
                collect_refs(&spec.x_operations, &mut x_refs, here, &value);
                collect_refs(&spec.y_operations, &mut y_refs, here, &value);
            }
        }
    }
    trace!(x = x.len(), y = y.len(), "collected series");

    // 3) operation chains, in declaration order
    apply_operations(&mut x, &spec.x_operations, &x_refs)?;
    apply_operations(&mut y, &spec.y_operations, &y_refs)?;

    Ok(ConvertedTable {
        header: build_header(spec, output_index, matches),
        x,
        y,
    })
}

fn column_of(operation: &Operation) -> Option<&ColumnRef> {
    match operation {
        Operation::Column { column, .. } => Some(column),
        Operation::Value { .. } => None,
    }
}

fn collect_refs(operations: &[Operation], refs: &mut [Vec<String>], here: ColumnRef, value: &str) {
    for (operation, list) in operations.iter().zip(refs.iter_mut()) {
        if column_of(operation) == Some(&here) {
            list.push(value.replace('e', "E"));
        }
    }
}

fn check_column(column: &ColumnRef, data: &FileData) -> Result<()> {
    let table = data.table(column.table_index).ok_or_else(|| {
        ConvertError::ConversionFailed(format!(
            "table {} does not exist ({} tables)",
            column.table_index,
            data.tables.len()
        ))
    })?;
    if column.column_index >= table.columns.len() {
        return Err(ConvertError::ConversionFailed(format!(
            "column {} does not exist in table {} ({} columns)",
            column.column_index,
            column.table_index,
            table.columns.len()
        )));
    }
    Ok(())
}

/// Apply `operations` to `series` in place. Column operations only touch
/// rows that have a reference value at the same index.
pub fn apply_operations(
    series: &mut [String],
    operations: &[Operation],
    refs: &[Vec<String>],
) -> Result<()> {
    for (idx, operation) in operations.iter().enumerate() {
        let operator = operation.operator();
        for (row, value) in series.iter_mut().enumerate() {
            let rhs = match operation {
                Operation::Value { value, .. } => *value,
                Operation::Column { .. } => match refs.get(idx).and_then(|r| r.get(row)) {
                    Some(reference) => parse_number(reference)?,
                    None => continue,
                },
            };
            let lhs = parse_number(value)?;
            let result = operator.apply(lhs, rhs).ok_or_else(|| {
                ConvertError::ConversionFailed(format!(
                    "{} {} {} is not a finite number",
                    lhs, operator, rhs
                ))
            })?;
            *value = format_number(result);
        }
    }
    Ok(())
}

fn parse_number(raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| ConvertError::ConversionFailed(format!("{:?} is not a number", raw)))
}

/// Shortest decimal form, integral values without a fraction.
fn format_number(value: f64) -> String {
    format!("{}", value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::match_profile;
    use crate::model::CanonicalTable;
    use crate::profile::{Operator, Profile};
    use serde_json::json;

    fn series(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn table(rows: &[&[&str]]) -> CanonicalTable {
        let mut table = CanonicalTable::new();
        table.push_numbered_columns(rows.first().map_or(0, |r| r.len()));
        table.rows = rows.iter().map(|r| series(r)).collect();
        table
    }

    #[test]
    fn operation_chain_in_order() -> anyhow::Result<()> {
        let mut x = series(&["5", "10"]);
        let operations = vec![
            Operation::Value {
                operator: Operator::Add,
                value: 2.0,
            },
            Operation::Column {
                operator: Operator::Add,
                column: ColumnRef {
                    table_index: 0,
                    column_index: 1,
                },
            },
        ];
        let refs = vec![Vec::new(), series(&["1"])];

        apply_operations(&mut x, &operations[..1], &refs[..1])?;
        assert_eq!(x, ["7", "12"]);
        apply_operations(&mut x[..], &operations[1..], &refs[1..])?;
        assert_eq!(x, ["8", "12"]);
        Ok(())
    }

    #[test]
    fn non_numeric_operand_fails() {
        let mut x = series(&["5", "n/a"]);
        let operations = vec![Operation::Value {
            operator: Operator::Multiply,
            value: 2.0,
        }];
        let err = apply_operations(&mut x, &operations, &[Vec::new()]).unwrap_err();
        assert_eq!(err.stage(), "ConversionFailed");

        let mut x = series(&["5"]);
        let operations = vec![Operation::Value {
            operator: Operator::Divide,
            value: 0.0,
        }];
        assert!(apply_operations(&mut x, &operations, &[Vec::new()]).is_err());
    }

    #[test]
    fn process_extracts_series_and_overlays_header() -> anyhow::Result<()> {
        let data = FileData {
            metadata: [("extension".to_string(), "csv".to_string())].into(),
            tables: vec![
                table(&[&["wave", "abs", "scale"], &["400", "0,5", "2"], &["401", "1e-1", "1E1"]]),
                table(&[&["9", "9"]]),
            ],
        };
        let profile = Profile::from_value(json!({
            "identifiers": [
                {"type": "fileMetadata", "key": "extension", "value": "csv",
                 "outputKey": "ORIGIN"},
                {"type": "fileMetadata", "key": "extension", "value": "csv",
                 "outputKey": "OWNER", "outputTableIndex": 1}
            ],
            "tables": [{
                "header": {"DATA TYPE": "UV-VIS", "ORIGIN": "template"},
                "xColumn": {"tableIndex": 0, "columnIndex": 0},
                "yColumn": {"tableIndex": 0, "columnIndex": 1},
                "yOperations": [
                    {"type": "column", "operator": "*", "column": {"tableIndex": 0, "columnIndex": 2}}
                ],
                "firstRowIsHeader": [true, false]
            }],
            "metadata": {}
        }))
        .map_err(|e| anyhow::anyhow!("{}", e))?;

        let matched = match_profile(&profile, &data).unwrap();
        let tables = process(&matched, &data)?;
        assert_eq!(tables.len(), 1);

        let out = &tables[0];
        assert_eq!(out.x, ["400", "401"]);
        assert_eq!(out.y, ["1", "1"]);
        assert_eq!(out.header["ORIGIN"], "csv");
        assert_eq!(out.header["DATA TYPE"], "UV-VIS");
        assert!(!out.header.contains_key("OWNER"));
        Ok(())
    }

    #[test]
    fn missing_column_is_a_conversion_failure() -> anyhow::Result<()> {
        let data = FileData {
            metadata: [("extension".to_string(), "csv".to_string())].into(),
            tables: vec![table(&[&["1", "2"]])],
        };
        let profile = Profile::from_value(json!({
            "identifiers": [{"type": "fileMetadata", "key": "extension", "value": "csv"}],
            "tables": [{"xColumn": {"tableIndex": 0, "columnIndex": 5}}],
            "metadata": {}
        }))
        .map_err(|e| anyhow::anyhow!("{}", e))?;

        let matched = match_profile(&profile, &data).unwrap();
        let err = process(&matched, &data).unwrap_err();
        assert_eq!(err.stage(), "ConversionFailed");
        assert!(err.to_string().contains("output table 0"));
        Ok(())
    }

    #[test]
    fn later_identifier_wins_on_same_output_key() -> anyhow::Result<()> {
        let mut source = table(&[&["1", "2"]]);
        source.metadata.insert("sample".to_string(), "S-17".to_string());
        let data = FileData {
            metadata: [("extension".to_string(), "csv".to_string())].into(),
            tables: vec![source],
        };
        let profile = Profile::from_value(json!({
            "identifiers": [
                {"type": "fileMetadata", "key": "extension", "value": "csv", "outputKey": "TITLE"},
                {"type": "tableMetadata", "tableIndex": 0, "key": "sample", "value": "S-(\\d+)",
                 "isRegex": true, "outputKey": "TITLE"}
            ],
            "tables": [{"header": {"TITLE": "template"}}],
            "metadata": {}
        }))
        .map_err(|e| anyhow::anyhow!("{}", e))?;

        let matched = match_profile(&profile, &data).unwrap();
        let header = build_header(&profile.tables[0], 0, &matched.matches);
        assert_eq!(header["TITLE"], "17");
        assert_eq!(header.len(), 1);
        Ok(())
    }

    #[test]
    fn output_table_index_routes_values() -> anyhow::Result<()> {
        let data = FileData {
            metadata: [("extension".to_string(), "csv".to_string())].into(),
            tables: vec![table(&[&["1", "2"], &["3", "4"]])],
        };
        let profile = Profile::from_value(json!({
            "identifiers": [
                {"type": "fileMetadata", "key": "extension", "value": "csv", "outputKey": "ORIGIN"},
                {"type": "fileMetadata", "key": "extension", "value": "csv",
                 "outputKey": "OWNER", "outputTableIndex": 1}
            ],
            "tables": [
                {"xColumn": {"tableIndex": 0, "columnIndex": 0}, "yColumn": {"tableIndex": 0, "columnIndex": 1}},
                {"xColumn": {"tableIndex": 0, "columnIndex": 1}, "yColumn": {"tableIndex": 0, "columnIndex": 0}}
            ],
            "metadata": {}
        }))
        .map_err(|e| anyhow::anyhow!("{}", e))?;

        let matched = match_profile(&profile, &data).unwrap();
        let tables = process(&matched, &data)?;
        assert_eq!(tables.len(), 2);

        assert_eq!(tables[0].header["ORIGIN"], "csv");
        assert!(!tables[0].header.contains_key("OWNER"));
        assert_eq!(tables[1].header["ORIGIN"], "csv");
        assert_eq!(tables[1].header["OWNER"], "csv");

        assert_eq!(tables[0].x, ["1", "3"]);
        assert_eq!(tables[1].x, ["2", "4"]);
        Ok(())
    }

    #[test]
    fn series_and_references_from_different_source_tables() -> anyhow::Result<()> {
        let data = FileData {
            metadata: [("extension".to_string(), "csv".to_string())].into(),
            tables: vec![
                table(&[&["1", "10"], &["2", "20"], &["3", "30"]]),
                table(&[&["a", "100"], &["b", "200"]]),
            ],
        };
        let profile = Profile::from_value(json!({
            "identifiers": [{"type": "fileMetadata", "key": "extension", "value": "csv"}],
            "tables": [{
                "xColumn": {"tableIndex": 1, "columnIndex": 1},
                "yColumn": {"tableIndex": 0, "columnIndex": 0},
                "yOperations": [
                    {"type": "column", "operator": "*", "column": {"tableIndex": 1, "columnIndex": 1}}
                ]
            }],
            "metadata": {}
        }))
        .map_err(|e| anyhow::anyhow!("{}", e))?;

        let matched = match_profile(&profile, &data).unwrap();
        let out = &process(&matched, &data)?[0];
        assert_eq!(out.x, ["100", "200"]);
        // third y row has no reference value and stays as read
        assert_eq!(out.y, ["100", "400", "3"]);
        Ok(())
    }
}
