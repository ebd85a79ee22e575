//! Canonical table model shared by readers, the matcher and the transform
//! pipeline.

pub mod raw_file;
pub mod table;

pub use raw_file::{FileEncoding, RawFile};
pub use table::{CanonicalTable, Column, FileData, ShapeError};
