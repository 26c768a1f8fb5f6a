//! Integration tests for tablelink.
//!
//! This module provides the shared test infrastructure:
//!
//! - `fixtures`: Builders for creating valid XLSX files in memory
//! - `common`: Reading and assertion helpers
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use crate::fixtures::{SheetBuilder, StyleBuilder, XlsxBuilder};
//! use crate::common::{read, text_at};
//!
//! fn test_bold_text() {
//!     let dir = tempfile::tempdir().unwrap();
//!     let path = XlsxBuilder::new()
//!         .sheet(SheetBuilder::new("Sheet1").cell("A1", "Bold", Some(StyleBuilder::new().bold())))
//!         .write_to(dir.path(), "book.xlsx");
//!
//!     let model = read(&path, "Sheet1", "A1");
//!     assert_eq!(text_at(&model, 0, 0), "Bold");
//!     assert!(model.rows[0].cells[0].style.bold);
//! }
//! ```
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp,
    clippy::panic
)]

pub mod common;
pub mod fixtures;

pub use common::{assert_close, read, text_at, text_run, used_range};
pub use fixtures::{CellValue, SheetBuilder, StyleBuilder, XlsxBuilder};
