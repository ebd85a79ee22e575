//! Conversion of laboratory instrument files into JCAMP-DX.
//!
//! A [`RawFile`] is dispatched to the first [`readers::Reader`] whose sniff
//! accepts it, parsed into [`FileData`], scored against the client's stored
//! [`Profile`]s and projected into x/y series by the winning profile.

pub mod config;
pub mod convert;
pub mod error;
pub mod matcher;
pub mod model;
pub mod options;
pub mod profile;
pub mod readers;
pub mod transform;
pub mod writer;

pub use config::Config;
pub use convert::{Conversion, ConversionRequest, Converter};
pub use error::{ConvertError, Rejection, Result, ValidationErrors};
pub use model::{CanonicalTable, FileData, RawFile};
pub use profile::{DirProfileStore, MemoryProfileStore, Profile, ProfileId, ProfileStore};
pub use readers::{ReaderKind, ReaderRegistry};
pub use transform::ConvertedTable;
