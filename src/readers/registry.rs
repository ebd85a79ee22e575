use std::collections::BTreeMap;
use std::io::Seek;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::ReaderKind;
use crate::{
    error::{ConvertError, Result},
    model::{FileData, RawFile},
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("identifier ({0}) is already registered")]
    DuplicateIdentifier(String),
}

/// A registered reader variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reader {
    pub identifier: String,
    pub priority: i32,
    pub kind: ReaderKind,
}

impl Reader {
    /// Parse `file` into [`FileData`]. Any failure is fatal for the request;
    /// no other reader is tried.
    #[instrument(level = "info", skip(self, file), fields(reader = %self.identifier, file_name = %file.name()))]
    pub fn read(&self, file: &mut RawFile) -> Result<FileData> {
        file.rewind()
            .map_err(|e| ConvertError::unparsable(&self.identifier, e))?;

        let tables = self
            .kind
            .parse(file)
            .map_err(|e| ConvertError::unparsable(&self.identifier, format!("{:#}", e)))?;
        if !tables.iter().any(|t| t.has_content()) {
            return Err(ConvertError::unparsable(
                &self.identifier,
                "no table could be extracted",
            ));
        }

        let mut metadata = BTreeMap::new();
        metadata.insert("file_name".to_string(), file.name().to_string());
        metadata.insert("content_type".to_string(), file.content_type().to_string());
        metadata.insert("mime_type".to_string(), file.mime_type().to_string());
        metadata.insert("encoding".to_string(), file.encoding().name());
        metadata.insert("extension".to_string(), file.extension());
        metadata.insert("reader".to_string(), self.identifier.clone());

        info!(tables = tables.len(), "parsed file");
        Ok(FileData { metadata, tables })
    }
}

/// Priority-ordered set of readers. Lower priority values are tried first,
/// ties keep registration order.
#[derive(Debug, Clone, Default)]
pub struct ReaderRegistry {
    readers: Vec<Reader>,
}

impl ReaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in reader.
    pub fn with_default_readers() -> Self {
        let mut registry = Self::new();
        let builtin = [
            ("csv_reader", 90, ReaderKind::Delimited),
            ("ascii_reader", 95, ReaderKind::Ascii),
            ("xlsx_reader", 20, ReaderKind::Xlsx),
            ("brml_reader", 10, ReaderKind::Brml),
            ("dta_reader", 10, ReaderKind::Dta),
            ("generic_reader", 1000, ReaderKind::Generic),
        ];
        for (identifier, priority, kind) in builtin {
            let registered = registry.register(identifier, priority, kind);
            debug_assert!(registered.is_ok(), "duplicate built-in reader {}", identifier);
        }
        registry
    }

    pub fn register(
        &mut self,
        identifier: impl Into<String>,
        priority: i32,
        kind: ReaderKind,
    ) -> Result<(), RegistryError> {
        let identifier = identifier.into();
        if self.readers.iter().any(|r| r.identifier == identifier) {
            return Err(RegistryError::DuplicateIdentifier(identifier));
        }
        let at = self.readers.partition_point(|r| r.priority <= priority);
        self.readers.insert(
            at,
            Reader {
                identifier,
                priority,
                kind,
            },
        );
        Ok(())
    }

    /// Readers in the order they are probed.
    pub fn readers(&self) -> &[Reader] {
        &self.readers
    }

    /// Probe the readers in priority order and return the first whose sniff
    /// accepts the file. The file is rewound after every sniff.
    #[instrument(level = "debug", skip(self, file), fields(file_name = %file.name()))]
    pub fn match_reader(&self, file: &mut RawFile) -> Option<Reader> {
        debug!(
            content_type = %file.content_type(),
            mime_type = %file.mime_type(),
            encoding = %file.encoding(),
            "matching reader"
        );
        if let Err(e) = file.rewind() {
            warn!("cannot rewind upload: {}", e);
            return None;
        }

        for reader in &self.readers {
            let accepted = reader.kind.sniff(file);
            if let Err(e) = file.rewind() {
                warn!(reader = %reader.identifier, "cannot rewind upload after sniff: {}", e);
                return None;
            }
            if accepted {
                info!(reader = %reader.identifier, "reader matched");
                return Some(reader.clone());
            }
        }

        debug!("no reader matched");
        None
    }
}
