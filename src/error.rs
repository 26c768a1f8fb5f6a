//! Structured error types for tablelink.
//!
//! Batch operations (watcher-triggered updates, multi-selection commands) catch these per
//! definition; single-shot operations surface them to the caller.

use std::path::PathBuf;

use crate::document::DefinitionIndex;

/// All errors that can occur while reading sources, laying out tables and updating documents.
#[derive(Debug, thiserror::Error)]
pub enum TableLinkError {
    /// The linked source file is missing or unreadable.
    #[error("Source unavailable: {}", .0.display())]
    SourceUnavailable(PathBuf),

    /// The requested worksheet does not exist in the workbook.
    #[error("Sheet '{0}' not found")]
    SheetNotFound(String),

    /// Neither a literal range nor a named range matched.
    #[error("Range or named range '{0}' not found")]
    RangeNotFound(String),

    /// The table has no rows or no columns, so there is no geometry to produce.
    #[error("Empty table: nothing to lay out")]
    EmptyTable,

    /// A tracked definition index no longer resolves to a definition.
    #[error("Definition index {0} no longer exists")]
    StaleIndex(DefinitionIndex),

    /// A `path|sheet|range` link specification could not be parsed.
    #[error("Invalid link spec '{0}': expected <file>|<sheet>|<range or name>")]
    InvalidLinkSpec(String),

    /// Invalid cell reference.
    #[error("Invalid cell reference: {0}")]
    CellRef(String),

    /// The document store rejected an operation.
    #[error("Document error: {0}")]
    Document(String),

    /// XML parsing error from quick-xml.
    #[error("XML parsing: {0}")]
    Xml(#[from] quick_xml::Error),

    /// ZIP archive error.
    #[error("ZIP archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Document or layout JSON (de)serialization error.
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Settings file could not be parsed.
    #[error("Config: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TableLinkError>;

impl TableLinkError {
    /// True for errors that mean "skip this link" rather than "this update failed".
    pub fn is_skippable(&self) -> bool {
        matches!(self, Self::SourceUnavailable(_) | Self::StaleIndex(_))
    }
}
