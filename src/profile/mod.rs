//! Profile documents: identifiers that recognize a file and output table
//! specs that project its data. Documents arrive as loose JSON and are
//! validated into typed values once, collecting every error.

pub mod store;

pub use store::{validate_client_id, DirProfileStore, MemoryProfileStore, ProfileStore};

use indexmap::IndexMap;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{ser::PrettyFormatter, Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{ConvertError, ValidationErrors};

/// Content hash of a profile's canonical serialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ProfileId(String);

impl ProfileId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Operator {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Subtract,
    #[serde(rename = "*")]
    Multiply,
    #[serde(rename = "/", alias = ":")]
    Divide,
}

impl Operator {
    /// `None` when the result is not a finite number (division by zero).
    pub fn apply(self, lhs: f64, rhs: f64) -> Option<f64> {
        let result = match self {
            Operator::Add => lhs + rhs,
            Operator::Subtract => lhs - rhs,
            Operator::Multiply => lhs * rhs,
            Operator::Divide => lhs / rhs,
        };
        result.is_finite().then_some(result)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Operator::Add => "+",
            Operator::Subtract => "-",
            Operator::Multiply => "*",
            Operator::Divide => "/",
        };
        f.write_str(symbol)
    }
}

/// A cell column of one source table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnRef {
    pub table_index: usize,
    pub column_index: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Operation {
    /// Combine row `i` with row `i` of another column.
    Column { operator: Operator, column: ColumnRef },
    /// Combine every row with a literal.
    Value {
        operator: Operator,
        #[serde(deserialize_with = "number")]
        value: f64,
    },
}

impl Operation {
    pub fn operator(&self) -> Operator {
        match self {
            Operation::Column { operator, .. } | Operation::Value { operator, .. } => *operator,
        }
    }
}

/// Where an identifier looks for its candidate text.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum IdentifierTarget {
    FileMetadata {
        key: String,
    },
    #[serde(rename_all = "camelCase")]
    TableMetadata {
        table_index: usize,
        key: String,
    },
    #[serde(rename_all = "camelCase")]
    TableHeader {
        table_index: usize,
        /// 1-based header line; the whole header block when absent.
        #[serde(default, deserialize_with = "optional_index")]
        line_number: Option<usize>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identifier {
    #[serde(flatten)]
    pub target: IdentifierTarget,
    pub value: String,
    #[serde(default)]
    pub is_regex: bool,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub output_key: Option<String>,
    #[serde(default, deserialize_with = "optional_index")]
    pub output_table_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputTableSpec {
    #[serde(default)]
    pub header: IndexMap<String, String>,
    #[serde(default)]
    pub x_column: Option<ColumnRef>,
    #[serde(default)]
    pub y_column: Option<ColumnRef>,
    #[serde(default)]
    pub x_operations: Vec<Operation>,
    #[serde(default)]
    pub y_operations: Vec<Operation>,
    /// Per source table: skip its first row.
    #[serde(default)]
    pub first_row_is_header: Vec<bool>,
}

impl OutputTableSpec {
    pub fn skips_first_row(&self, table_index: usize) -> bool {
        self.first_row_is_header
            .get(table_index)
            .copied()
            .unwrap_or(false)
    }
}

/// A validated profile document. The original JSON is kept verbatim; it is
/// what gets stored and hashed.
#[derive(Debug, Clone)]
pub struct Profile {
    pub identifiers: Vec<Identifier>,
    pub tables: Vec<OutputTableSpec>,
    pub metadata: Map<String, Value>,
    id: ProfileId,
    canonical: String,
    document: Value,
}

impl Profile {
    pub fn from_json(text: &str) -> Result<Self, ConvertError> {
        let document: Value = serde_json::from_str(text).map_err(|e| {
            let mut errors = ValidationErrors::new();
            errors.add("document", e.to_string());
            ConvertError::InvalidProfileDocument(errors)
        })?;
        Self::from_value(document).map_err(ConvertError::InvalidProfileDocument)
    }

    /// Validate a loose document, reporting every problem at once.
    pub fn from_value(document: Value) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let Some(object) = document.as_object() else {
            errors.add("document", "This field has to be an object.");
            return Err(errors);
        };

        let mut identifiers = Vec::new();
        for (idx, item) in list_field(object, "identifiers", &mut errors)
            .iter()
            .enumerate()
        {
            let path = format!("identifiers[{}]", idx);
            match Identifier::deserialize(item) {
                Ok(identifier) => {
                    if identifier.is_regex {
                        if let Err(e) = regex::Regex::new(&identifier.value) {
                            errors.add(format!("{}.value", path), e.to_string());
                        }
                    }
                    identifiers.push(identifier);
                }
                Err(e) => errors.add(path, e.to_string()),
            }
        }

        let mut tables = Vec::new();
        for (idx, item) in list_field(object, "tables", &mut errors).iter().enumerate() {
            match OutputTableSpec::deserialize(item) {
                Ok(spec) => tables.push(spec),
                Err(e) => errors.add(format!("tables[{}]", idx), e.to_string()),
            }
        }

        let metadata = match object.get("metadata") {
            Some(Value::Object(map)) => map.clone(),
            Some(_) => {
                errors.add("metadata", "This field has to be an object.");
                Map::new()
            }
            None => {
                errors.add("metadata", "This field has to be provided.");
                Map::new()
            }
        };

        let canonical = match canonical_json(&document) {
            Ok(canonical) => canonical,
            Err(e) => {
                errors.add("document", e.to_string());
                String::new()
            }
        };

        if !errors.is_empty() {
            return Err(errors);
        }
        let id = ProfileId(hex::encode(Sha256::digest(canonical.as_bytes())));
        Ok(Profile {
            identifiers,
            tables,
            metadata,
            id,
            canonical,
            document,
        })
    }

    pub fn id(&self) -> &ProfileId {
        &self.id
    }

    /// Sorted keys, four-space indentation.
    pub fn canonical_json(&self) -> &str {
        &self.canonical
    }

    pub fn title(&self) -> Option<&str> {
        self.document.get("title").and_then(Value::as_str)
    }
}

impl PartialEq for Profile {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Serialize for Profile {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.document.serialize(serializer)
    }
}

fn list_field<'a>(
    object: &'a Map<String, Value>,
    field: &str,
    errors: &mut ValidationErrors,
) -> &'a [Value] {
    match object.get(field) {
        Some(Value::Array(items)) => items.as_slice(),
        Some(_) => {
            errors.add(field, "This field has to be a list.");
            &[]
        }
        None => {
            errors.add(field, "This field has to be provided.");
            &[]
        }
    }
}

fn canonical_json(document: &Value) -> serde_json::Result<String> {
    // serde_json maps keep their keys sorted
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    document.serialize(&mut ser)?;
    String::from_utf8(buf).map_err(serde_json::Error::custom)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Integer(u64),
    Float(f64),
    Text(String),
}

/// Number or numeric string.
fn number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Integer(n) => Ok(n as f64),
        NumberOrText::Float(n) => Ok(n),
        NumberOrText::Text(s) => s
            .trim()
            .replace(',', ".")
            .parse()
            .map_err(|_| D::Error::custom(format!("{:?} is not a number", s))),
    }
}

/// Index as number or numeric string; `null` and `""` mean absent.
fn optional_index<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<usize>, D::Error> {
    match Option::<NumberOrText>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrText::Integer(n)) => Ok(Some(n as usize)),
        Some(NumberOrText::Float(n)) => Err(D::Error::custom(format!("{} is not an index", n))),
        Some(NumberOrText::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(NumberOrText::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("{:?} is not an index", s))),
    }
}
