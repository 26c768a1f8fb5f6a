//! tablelink - spreadsheet ranges as linked vector tables
//!
//! Renders a rectangular range of an XLSX workbook into grid lines and positioned text inside a
//! host document, and keeps that rendering in step with the workbook:
//! - Deterministic table layout (row/column sizing, merges, alignment, wrapping)
//! - Regeneration in place that keeps every placement and its transform
//! - Link metadata stored as flat string attributes on definitions and placements
//! - Polled, debounced change detection with an optional grow-to-used-range policy
//!
//! # Usage
//!
//! ```no_run
//! use std::path::Path;
//! use tablelink::commands::{insert_new, InsertRequest};
//! use tablelink::{LinkUpdater, MemoryDocument, StandardNormalizer, SyncCoordinator, XlsxSource};
//! use tablelink::{RenderOptions, Transform, UnitSystem};
//!
//! # fn main() -> tablelink::Result<()> {
//! let mut doc = MemoryDocument::new(UnitSystem::Millimeters);
//! let mut sync = SyncCoordinator::default();
//! let updater = LinkUpdater::new(XlsxSource::new(), StandardNormalizer);
//! let request = InsertRequest {
//!     source_path: "/data/prices.xlsx".into(),
//!     sheet_name: "Sheet1".into(),
//!     range_spec: "A1:D12".into(),
//!     options: RenderOptions::default(),
//!     at: Transform::identity(),
//! };
//! insert_new(&mut doc, &mut sync, &updater, &request)?;
//! doc.save(Path::new("drawing.json"))?;
//! # Ok(())
//! # }
//! ```

pub mod cell_ref;
pub mod commands;
pub mod config;
pub mod document;
pub mod error;
pub mod layout;
pub mod lifecycle;
pub mod metadata;
pub mod normalize;
pub mod parser;
pub mod source;
pub mod sync;
pub mod types;
pub mod updater;

pub use document::{DefinitionIndex, DocumentStore, MemoryDocument, PlacementId};
pub use error::{Result, TableLinkError};
pub use layout::layout;
pub use metadata::LinkMetadata;
pub use normalize::{PassThroughNormalizer, StandardNormalizer, TableNormalizer};
pub use parser::XlsxSource;
pub use source::{SourceInspector, TableReader};
pub use sync::{ChangePrompt, SyncCoordinator, SyncDecision};
pub use types::*;
pub use updater::{BatchReport, LinkUpdater, UpdateOutcome};
