//! Error taxonomy of a conversion request.

use serde::Serialize;
use std::{collections::BTreeMap, fmt};
use thiserror::Error;

/// Field path -> messages, collected over a whole profile document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    write!(f, "; ")?;
                }
                write!(f, "{}: {}", field, message)?;
                first = false;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConvertError {
    /// No reader's sniff accepted the file.
    #[error("no reader recognized file `{file_name}`")]
    UnrecognizedFormat { file_name: String },

    /// A reader accepted the file but could not parse it.
    #[error("{reader} could not parse the file: {reason}")]
    UnparsableContent { reader: String, reason: String },

    #[error("invalid profile document: {0}")]
    InvalidProfileDocument(ValidationErrors),

    #[error("no profile of client `{client_id}` matches the file")]
    NoMatchingProfile { client_id: String },

    #[error("conversion failed: {0}")]
    ConversionFailed(String),

    #[error("invalid client id `{0}`")]
    InvalidClient(String),

    #[error("profile storage error: {0}")]
    Storage(String),
}

impl ConvertError {
    pub fn unparsable(reader: impl Into<String>, reason: impl fmt::Display) -> Self {
        ConvertError::UnparsableContent {
            reader: reader.into(),
            reason: reason.to_string(),
        }
    }

    /// Stable name of the stage that rejected the request.
    pub fn stage(&self) -> &'static str {
        match self {
            ConvertError::UnrecognizedFormat { .. } => "UnrecognizedFormat",
            ConvertError::UnparsableContent { .. } => "UnparsableContent",
            ConvertError::InvalidProfileDocument(_) => "InvalidProfileDocument",
            ConvertError::NoMatchingProfile { .. } => "NoMatchingProfile",
            ConvertError::ConversionFailed(_) => "ConversionFailed",
            ConvertError::InvalidClient(_) => "InvalidClient",
            ConvertError::Storage(_) => "Storage",
        }
    }

    pub fn rejection(&self) -> Rejection {
        let details = match self {
            ConvertError::InvalidProfileDocument(errors) => serde_json::to_value(errors).ok(),
            _ => None,
        };
        Rejection {
            stage: self.stage(),
            message: self.to_string(),
            details,
        }
    }
}

/// Structured rejection returned to the caller instead of a document.
#[derive(Debug, Clone, Serialize)]
pub struct Rejection {
    pub stage: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

pub type Result<T, E = ConvertError> = std::result::Result<T, E>;
