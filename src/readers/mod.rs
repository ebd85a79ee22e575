//! Format readers: a cheap `sniff` and a full `parse` per instrument format.

pub mod brml;
mod container;
pub mod delimited;
pub mod dta;
pub mod registry;
pub mod text;
pub mod xlsx;

pub use registry::{Reader, ReaderRegistry, RegistryError};

use anyhow::{Context, Result};
use std::io::{Read, Seek};

use crate::model::{CanonicalTable, RawFile};

/// The closed set of supported reader variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderKind {
    /// Delimiter-separated text (`.csv`).
    Delimited,
    /// Whitespace/tab separated numeric dumps (`.txt`, `.asc`, ...).
    Ascii,
    /// Office Open XML workbooks.
    Xlsx,
    /// Bruker BRML archives.
    Brml,
    /// Gamry DTA state-machine text dumps.
    Dta,
    /// Catch-all: accepts everything, extracts numeric blocks from text.
    Generic,
}

impl ReaderKind {
    /// Cheap heuristic check. May move the file cursor; the registry rewinds
    /// it afterwards.
    pub fn sniff(self, file: &mut RawFile) -> bool {
        match self {
            ReaderKind::Delimited => delimited::sniff(file),
            ReaderKind::Ascii => text::sniff_ascii(file),
            ReaderKind::Xlsx => xlsx::sniff(file),
            ReaderKind::Brml => brml::sniff(file),
            ReaderKind::Dta => dta::sniff(file),
            ReaderKind::Generic => text::sniff_generic(file),
        }
    }

    /// Full parse into finalized tables.
    pub fn parse(self, file: &mut RawFile) -> Result<Vec<CanonicalTable>> {
        let mut tables = match self {
            ReaderKind::Delimited => delimited::parse(file)?,
            ReaderKind::Ascii | ReaderKind::Generic => text::parse(file)?,
            ReaderKind::Xlsx => xlsx::parse(file)?,
            ReaderKind::Brml => brml::parse(file)?,
            ReaderKind::Dta => dta::parse(file)?,
        };
        for (idx, table) in tables.iter_mut().enumerate() {
            table
                .finalize()
                .with_context(|| format!("table {} is not rectangular", idx))?;
        }
        Ok(tables)
    }
}

/// Normalize a whitespace-tokenized cell: trimmed, and with a decimal comma
/// replaced when that makes it a number.
pub fn normalize_value(raw: &str) -> String {
    let trimmed = raw.trim();
    let dotted = trimmed.replace(',', ".");
    if dotted.parse::<f64>().is_ok() {
        dotted
    } else {
        trimmed.to_string()
    }
}

/// Consume the first four bytes and compare them with the zip local file
/// header magic.
pub(crate) fn has_zip_magic(file: &mut RawFile) -> bool {
    let mut magic = [0u8; 4];
    file.rewind().is_ok() && file.read_exact(&mut magic).is_ok() && &magic == b"PK\x03\x04"
}
