//! The conversion service: reader dispatch, profile selection, transform
//! and JCAMP-DX output for one request at a time.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::{
    error::{ConvertError, Result},
    matcher::select_best,
    model::{FileData, RawFile},
    profile::{validate_client_id, Profile, ProfileId, ProfileStore},
    readers::ReaderRegistry,
    transform::{self, ConvertedTable},
    writer::jcamp,
};

/// One uploaded file, scoped to a client's profiles.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub file: RawFile,
    pub client_id: String,
}

impl ConversionRequest {
    pub fn new(
        content: impl Into<Vec<u8>>,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            file: RawFile::new(content, file_name, content_type),
            client_id: client_id.into(),
        }
    }
}

/// A finished conversion.
#[derive(Debug, Clone, Serialize)]
pub struct Conversion {
    pub file_name: String,
    pub client_id: String,
    pub reader: String,
    pub profile_id: ProfileId,
    pub tables: Vec<ConvertedTable>,
    /// The JCAMP-DX text.
    #[serde(skip)]
    pub document: String,
    pub converted_at: DateTime<Utc>,
}

/// Shares one read-only registry across requests; the store is the only
/// mutable state and handles its own concurrency.
#[derive(Debug, Clone)]
pub struct Converter<S> {
    registry: Arc<ReaderRegistry>,
    store: S,
}

impl<S: ProfileStore> Converter<S> {
    pub fn new(registry: impl Into<Arc<ReaderRegistry>>, store: S) -> Self {
        Self {
            registry: registry.into(),
            store,
        }
    }

    /// Converter over every built-in reader.
    pub fn with_default_readers(store: S) -> Self {
        Self::new(ReaderRegistry::with_default_readers(), store)
    }

    /// Parse a file with the first reader that recognizes it.
    pub fn read(&self, file: &mut RawFile) -> Result<FileData> {
        let reader = self
            .registry
            .match_reader(file)
            .ok_or_else(|| ConvertError::UnrecognizedFormat {
                file_name: file.name().to_string(),
            })?;
        reader.read(file)
    }

    #[instrument(level = "info", skip_all, fields(file_name = %request.file.name(), client_id = %request.client_id))]
    pub fn convert(&self, request: ConversionRequest) -> Result<Conversion> {
        let ConversionRequest {
            mut file,
            client_id,
        } = request;
        validate_client_id(&client_id)?;

        // 1) file -> canonical tables
        let data = self.read(&mut file)?;
        let reader = data.metadata.get("reader").cloned().unwrap_or_default();

        // 2) best profile of this client
        let profiles = self.store.list(&client_id)?;
        let matched = select_best(&profiles, &data).ok_or_else(|| {
            warn!(candidates = profiles.len(), "no profile matched");
            ConvertError::NoMatchingProfile {
                client_id: client_id.clone(),
            }
        })?;
        info!(profile_id = %matched.profile.id(), score = matched.score(), "profile selected");

        // 3) series and document
        let tables = transform::process(&matched, &data)?;
        let document = jcamp::to_string(&tables)?;

        Ok(Conversion {
            file_name: file.name().to_string(),
            client_id,
            reader,
            profile_id: matched.profile.id().clone(),
            tables,
            document,
            converted_at: Utc::now(),
        })
    }

    /// Validate and store a profile document.
    pub fn save_profile(&self, client_id: &str, json: &str) -> Result<ProfileId> {
        let profile = Profile::from_json(json)?;
        self.store.put(client_id, &profile)
    }

    pub fn list_profiles(&self, client_id: &str) -> Result<Vec<Profile>> {
        self.store.list(client_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::MemoryProfileStore;
    use crate::readers::test_support::init_test_logging;

    const PROFILE: &str = r#"{
        "title": "csv absorbance",
        "identifiers": [
            {"type": "fileMetadata", "key": "extension", "value": "csv"},
            {"type": "tableHeader", "tableIndex": 0, "value": "Sample: (\\w+)", "isRegex": true,
             "outputKey": "TITLE"}
        ],
        "tables": [{
            "header": {"DATA TYPE": "UV-VIS", "XUNITS": "NANOMETERS", "YUNITS": "ABSORBANCE"},
            "xColumn": {"tableIndex": 0, "columnIndex": 0},
            "yColumn": {"tableIndex": 0, "columnIndex": 1},
            "yOperations": [{"type": "value", "operator": "*", "value": 100}]
        }],
        "metadata": {}
    }"#;

    fn converter() -> anyhow::Result<Converter<MemoryProfileStore>> {
        let converter = Converter::with_default_readers(MemoryProfileStore::new());
        converter.save_profile("lab", PROFILE)?;
        Ok(converter)
    }

    #[test]
    fn converts_a_matching_file() -> anyhow::Result<()> {
        init_test_logging();
        let converter = converter()?;
        let request = ConversionRequest::new(
            "Sample: A1\n400;0,5\n401;0,25\n",
            "scan.csv",
            "text/csv",
            "lab",
        );

        let conversion = converter.convert(request)?;
        assert_eq!(conversion.reader, "csv_reader");
        assert_eq!(conversion.tables[0].x, ["400", "401"]);
        assert_eq!(conversion.tables[0].y, ["50", "25"]);
        assert!(conversion.document.starts_with("##TITLE=A1\n##JCAMP-DX=5.01\n##DATA TYPE=UV-VIS\n"));
        assert!(conversion.document.contains("400, 50\n401, 25\n##END=\n"));
        Ok(())
    }

    #[test]
    fn rejections_name_their_stage() -> anyhow::Result<()> {
        let converter = converter()?;

        let other_client = ConversionRequest::new("Sample: A1\n1;2\n", "scan.csv", "text/csv", "other");
        assert_eq!(converter.convert(other_client).unwrap_err().stage(), "NoMatchingProfile");

        let unmatched = ConversionRequest::new("1 2\n3 4\n", "scan.txt", "text/plain", "lab");
        assert_eq!(converter.convert(unmatched).unwrap_err().stage(), "NoMatchingProfile");

        let bad_client = ConversionRequest::new("1;2\n", "scan.csv", "text/csv", "../x");
        assert_eq!(converter.convert(bad_client).unwrap_err().stage(), "InvalidClient");

        let empty_registry = Converter::new(ReaderRegistry::new(), MemoryProfileStore::new());
        let request = ConversionRequest::new("1;2\n", "scan.csv", "text/csv", "lab");
        assert_eq!(empty_registry.convert(request).unwrap_err().stage(), "UnrecognizedFormat");
        Ok(())
    }

    #[test]
    fn invalid_profiles_are_not_stored() {
        let converter = Converter::with_default_readers(MemoryProfileStore::new());
        let err = converter.save_profile("lab", r#"{"identifiers": {}}"#).unwrap_err();
        assert_eq!(err.stage(), "InvalidProfileDocument");
        assert!(converter.list_profiles("lab").unwrap().is_empty());
    }
}
