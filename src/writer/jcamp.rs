//! JCAMP-DX 5.01 text output: one block per converted table, wrapped in a
//! `LINK` block when there is more than one.

use std::io::Write;
use tracing::{debug, instrument};

use crate::{
    error::{ConvertError, Result},
    transform::ConvertedTable,
};

pub const JCAMP_VERSION: &str = "5.01";
pub const DEFAULT_TITLE: &str = "labconvert";

/// Labels the writer emits itself; template entries with these names are
/// not repeated.
const RESERVED: [&str; 11] = [
    "TITLE",
    "JCAMP-DX",
    "DATA TYPE",
    "DATA CLASS",
    "BLOCK_ID",
    "NPOINTS",
    "FIRSTX",
    "LASTX",
    "FIRSTY",
    "LASTY",
    "XYPOINTS",
];

#[instrument(level = "debug", skip_all, fields(tables = tables.len()))]
pub fn write<W: Write>(tables: &[ConvertedTable], out: &mut W) -> Result<()> {
    let io_err = |e: std::io::Error| ConvertError::ConversionFailed(format!("writing JCAMP-DX: {}", e));

    match tables {
        [] => Err(ConvertError::ConversionFailed(
            "the profile produced no output tables".to_string(),
        )),
        [table] => write_block(table, None, out),
        _ => {
            let title = tables[0]
                .header
                .get("TITLE")
                .map(String::as_str)
                .unwrap_or(DEFAULT_TITLE);
            writeln!(out, "##TITLE={}", title).map_err(io_err)?;
            writeln!(out, "##JCAMP-DX={}", JCAMP_VERSION).map_err(io_err)?;
            writeln!(out, "##DATA TYPE=LINK").map_err(io_err)?;
            writeln!(out, "##BLOCKS={}", tables.len()).map_err(io_err)?;
            for (idx, table) in tables.iter().enumerate() {
                write_block(table, Some(idx + 1), out)?;
            }
            writeln!(out, "##END=").map_err(io_err)?;
            Ok(())
        }
    }
}

/// Render into a string.
pub fn to_string(tables: &[ConvertedTable]) -> Result<String> {
    let mut buf = Vec::new();
    write(tables, &mut buf)?;
    String::from_utf8(buf).map_err(|e| ConvertError::ConversionFailed(e.to_string()))
}

fn write_block<W: Write>(table: &ConvertedTable, block_id: Option<usize>, out: &mut W) -> Result<()> {
    if table.x.len() != table.y.len() {
        return Err(ConvertError::ConversionFailed(format!(
            "x has {} values but y has {}",
            table.x.len(),
            table.y.len()
        )));
    }
    let io_err = |e: std::io::Error| ConvertError::ConversionFailed(format!("writing JCAMP-DX: {}", e));
    let field = |key: &str, default: &'static str| -> String {
        table
            .header
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    };

    let mut lines = vec![
        format!("##TITLE={}", field("TITLE", DEFAULT_TITLE)),
        format!("##JCAMP-DX={}", JCAMP_VERSION),
    ];
    if let Some(id) = block_id {
        lines.push(format!("##BLOCK_ID={}", id));
    }
    lines.push(format!("##DATA TYPE={}", field("DATA TYPE", "UNKNOWN")));
    lines.push(format!("##DATA CLASS={}", field("DATA CLASS", "XYPOINTS")));
    for (key, value) in &table.header {
        if !RESERVED.contains(&key.as_str()) {
            lines.push(format!("##{}={}", key, value));
        }
    }

    lines.push(format!("##NPOINTS={}", table.x.len()));
    if let (Some(first_x), Some(last_x), Some(first_y), Some(last_y)) =
        (table.x.first(), table.x.last(), table.y.first(), table.y.last())
    {
        lines.push(format!("##FIRSTX={}", first_x));
        lines.push(format!("##LASTX={}", last_x));
        lines.push(format!("##FIRSTY={}", first_y));
        lines.push(format!("##LASTY={}", last_y));
    }
    lines.push("##XYPOINTS=(XY..XY)".to_string());
    for (x, y) in table.x.iter().zip(&table.y) {
        lines.push(format!("{}, {}", x, y));
    }
    lines.push("##END=".to_string());

    for line in &lines {
        writeln!(out, "{}", line).map_err(io_err)?;
    }
    debug!(points = table.x.len(), block_id, "wrote block");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn converted(header: &[(&str, &str)], x: &[&str], y: &[&str]) -> ConvertedTable {
        ConvertedTable {
            header: header
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<IndexMap<_, _>>(),
            x: x.iter().map(|v| v.to_string()).collect(),
            y: y.iter().map(|v| v.to_string()).collect(),
        }
    }

    #[test]
    fn single_block_layout() -> anyhow::Result<()> {
        let table = converted(
            &[("XUNITS", "NANOMETERS"), ("DATA TYPE", "UV-VIS"), ("YUNITS", "ABSORBANCE")],
            &["400", "401"],
            &["0.5", "0.7"],
        );
        let text = to_string(&[table])?;
        let expected = "\
##TITLE=labconvert
##JCAMP-DX=5.01
##DATA TYPE=UV-VIS
##DATA CLASS=XYPOINTS
##XUNITS=NANOMETERS
##YUNITS=ABSORBANCE
##NPOINTS=2
##FIRSTX=400
##LASTX=401
##FIRSTY=0.5
##LASTY=0.7
##XYPOINTS=(XY..XY)
400, 0.5
401, 0.7
##END=
";
        assert_eq!(text, expected);
        Ok(())
    }

    #[test]
    fn several_tables_are_linked() -> anyhow::Result<()> {
        let a = converted(&[("TITLE", "run 7")], &["1"], &["2"]);
        let b = converted(&[], &[], &[]);
        let text = to_string(&[a, b])?;

        assert!(text.starts_with("##TITLE=run 7\n##JCAMP-DX=5.01\n##DATA TYPE=LINK\n##BLOCKS=2\n"));
        assert!(text.contains("##BLOCK_ID=1\n"));
        assert!(text.contains("##BLOCK_ID=2\n##DATA TYPE=UNKNOWN\n"));
        assert!(text.contains("##NPOINTS=0\n##XYPOINTS=(XY..XY)\n##END=\n##END=\n"));
        Ok(())
    }

    #[test]
    fn uneven_series_are_rejected() {
        let table = converted(&[], &["1", "2"], &["1"]);
        let err = to_string(&[table]).unwrap_err();
        assert_eq!(err.stage(), "ConversionFailed");
        assert_eq!(to_string(&[]).unwrap_err().stage(), "ConversionFailed");
    }
}
