//! The read → normalize → layout → regenerate pipeline for linked definitions.

use log::{debug, info};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::document::{DefinitionIndex, DocumentStore, PlacementId};
use crate::error::{Result, TableLinkError};
use crate::layout::layout;
use crate::lifecycle::{regenerate_definition, stamp_metadata};
use crate::metadata::{LinkMetadata, KEY_PREFIX};
use crate::normalize::TableNormalizer;
use crate::source::{SourceInspector, TableReader};
use crate::types::{Primitive, Transform, UnitSystem};

/// Why a definition was left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The definition carries no source path.
    Unlinked,
    /// The source path does not point at an existing file.
    SourceMissing(PathBuf),
    /// The definition index no longer resolves.
    Stale,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Unlinked => write!(f, "not linked"),
            SkipReason::SourceMissing(path) => write!(f, "source missing: {}", path.display()),
            SkipReason::Stale => write!(f, "definition no longer exists"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    Updated {
        old: DefinitionIndex,
        new: DefinitionIndex,
        /// The source the definition was regenerated from.
        source: PathBuf,
        placements: usize,
        /// The range actually read; differs from the stored one after an extend.
        range: String,
    },
    Skipped(SkipReason),
}

/// A freshly inserted linked table.
#[derive(Debug, Clone, PartialEq)]
pub struct Inserted {
    pub index: DefinitionIndex,
    pub name: String,
    pub placement: PlacementId,
}

/// Per-definition results of a batch update.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// New indices of regenerated definitions.
    pub updated: Vec<DefinitionIndex>,
    pub skipped: Vec<(DefinitionIndex, SkipReason)>,
    pub failed: Vec<(DefinitionIndex, TableLinkError)>,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} updated, {} skipped, {} failed",
            self.updated.len(),
            self.skipped.len(),
            self.failed.len()
        )
    }
}

/// Regenerates linked definitions from their sources.
#[derive(Debug, Clone, Default)]
pub struct LinkUpdater<R, N> {
    reader: R,
    normalizer: N,
}

impl<R, N> LinkUpdater<R, N>
where
    R: TableReader + SourceInspector,
    N: TableNormalizer,
{
    pub fn new(reader: R, normalizer: N) -> Self {
        Self { reader, normalizer }
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    /// Geometry for `metadata` in the document's units. Nothing is written.
    pub fn render(&self, metadata: &LinkMetadata, units: UnitSystem) -> Result<Vec<Primitive>> {
        let raw = self.reader.read_table(
            &metadata.source_path,
            &metadata.sheet_name,
            &metadata.range_spec,
        )?;
        let model = self.normalizer.normalize(raw);
        let output = layout(&model, &metadata.to_render_options(), units)?;
        Ok(output.primitives())
    }

    /// Regenerate one definition from the metadata stored on it.
    ///
    /// With `extend`, the stored range is first replaced by the sheet's used range when the two
    /// differ. Unlinked definitions and missing sources are skipped, not errors.
    ///
    /// # Errors
    /// `StaleIndex` for a vanished definition; read and layout errors leave the document
    /// untouched.
    pub fn update_definition<D: DocumentStore + ?Sized>(
        &self,
        doc: &mut D,
        index: DefinitionIndex,
        extend: bool,
    ) -> Result<UpdateOutcome> {
        if !doc.definition_exists(index) {
            return Err(TableLinkError::StaleIndex(index));
        }
        let mut metadata = LinkMetadata::decode(&doc.definition_attributes(index)?);
        if !metadata.is_linked() {
            return Ok(UpdateOutcome::Skipped(SkipReason::Unlinked));
        }
        if !metadata.source_exists() {
            debug!(
                "skipping {index}: {} does not exist",
                metadata.source_path.display()
            );
            return Ok(UpdateOutcome::Skipped(SkipReason::SourceMissing(
                metadata.source_path,
            )));
        }

        if extend {
            self.extend_range(&mut metadata)?;
        }

        let geometry = self.render(&metadata, doc.model_units())?;
        let replacement = regenerate_definition(doc, index, &geometry, &metadata)?;
        info!(
            "updated {} -> {} from {} [{}!{}], {} placement(s)",
            index,
            replacement.new_index,
            metadata.source_path.display(),
            metadata.sheet_name,
            metadata.range_spec,
            replacement.placement_ids.len()
        );
        Ok(UpdateOutcome::Updated {
            old: index,
            new: replacement.new_index,
            source: metadata.source_path,
            placements: replacement.placement_ids.len(),
            range: metadata.range_spec,
        })
    }

    fn extend_range(&self, metadata: &mut LinkMetadata) -> Result<()> {
        let used = self
            .reader
            .used_range_of(&metadata.source_path, &metadata.sheet_name)?;
        if let Some(used) = used {
            if !used.eq_ignore_ascii_case(&metadata.range_spec) {
                debug!("extending range {} -> {}", metadata.range_spec, used);
                metadata.range_spec = used;
            }
        }
        Ok(())
    }

    /// Render `metadata` into a new uniquely named definition with one placement at `at`.
    pub fn insert<D: DocumentStore + ?Sized>(
        &self,
        doc: &mut D,
        metadata: &LinkMetadata,
        at: Transform,
    ) -> Result<Inserted> {
        let geometry = self.render(metadata, doc.model_units())?;
        let name = format!("{KEY_PREFIX}{}", Uuid::new_v4().simple());
        let index = doc.add_definition(&name, &geometry)?;
        let placement = doc.add_placement(index, at)?;
        stamp_metadata(doc, index, &[placement], metadata)?;
        info!(
            "inserted '{}' ({}) from {} [{}!{}]",
            name,
            index,
            metadata.source_path.display(),
            metadata.sheet_name,
            metadata.range_spec
        );
        Ok(Inserted {
            index,
            name,
            placement,
        })
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::document::MemoryDocument;
    use crate::metadata::KEY_RANGE;
    use crate::normalize::StandardNormalizer;
    use crate::types::{ColumnSpec, TableCell, TableModel, TableRow};
    use std::cell::RefCell;
    use std::path::Path;

    /// Serves a fixed 2x2 table and records the ranges it was asked for.
    #[derive(Default)]
    struct StubSource {
        used_range: Option<String>,
        requests: RefCell<Vec<String>>,
    }

    impl TableReader for StubSource {
        fn read_table(&self, _path: &Path, _sheet: &str, range: &str) -> Result<TableModel> {
            self.requests.borrow_mut().push(range.to_string());
            let row = || TableRow {
                height_mm: 5.0,
                cells: vec![TableCell::text("a"), TableCell::number(1.0)],
            };
            Ok(TableModel {
                columns: vec![ColumnSpec { width_mm: 20.0 }; 2],
                rows: vec![row(), row()],
                ..TableModel::default()
            })
        }
    }

    impl SourceInspector for StubSource {
        fn list_sheet_names(&self, _path: &Path) -> Result<Vec<String>> {
            Ok(vec!["Sheet1".to_string()])
        }

        fn used_range_of(&self, _path: &Path, _sheet: &str) -> Result<Option<String>> {
            Ok(self.used_range.clone())
        }
    }

    fn linked(range: &str, file: &Path) -> LinkMetadata {
        LinkMetadata {
            source_path: file.to_path_buf(),
            sheet_name: "Sheet1".to_string(),
            range_spec: range.to_string(),
            show_grid: true,
            ..LinkMetadata::default()
        }
    }

    fn updater(used_range: Option<&str>) -> LinkUpdater<StubSource, StandardNormalizer> {
        LinkUpdater::new(
            StubSource {
                used_range: used_range.map(str::to_string),
                ..StubSource::default()
            },
            StandardNormalizer,
        )
    }

    #[test]
    fn test_insert_then_update() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut doc = MemoryDocument::default();
        let up = updater(None);

        let inserted = up
            .insert(&mut doc, &linked("A1:B2", file.path()), Transform::translation(5.0, 5.0))
            .unwrap();
        assert!(inserted.name.starts_with("TableLink_"));
        assert_eq!(doc.placements_of(inserted.index), vec![inserted.placement]);
        // 3 + 3 grid lines and 4 texts
        assert_eq!(doc.definition_primitives(inserted.index).unwrap().len(), 10);

        let outcome = up.update_definition(&mut doc, inserted.index, false).unwrap();
        let UpdateOutcome::Updated { old, new, placements, .. } = outcome else {
            panic!("expected an update, got {outcome:?}");
        };
        assert_eq!(old, inserted.index);
        assert_ne!(new, old);
        assert_eq!(placements, 1);
        assert_eq!(doc.find_definition(&inserted.name), Some(new));
    }

    #[test]
    fn test_extend_replaces_range_on_mismatch() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut doc = MemoryDocument::default();
        let up = updater(Some("A1:C5"));
        let inserted = up
            .insert(&mut doc, &linked("A1:B2", file.path()), Transform::identity())
            .unwrap();

        let outcome = up.update_definition(&mut doc, inserted.index, true).unwrap();
        let UpdateOutcome::Updated { new, range, .. } = outcome else {
            panic!("expected an update");
        };
        assert_eq!(range, "A1:C5");
        assert_eq!(doc.definition_attributes(new).unwrap()[KEY_RANGE], "A1:C5");
        assert_eq!(*up.reader().requests.borrow(), vec!["A1:B2", "A1:C5"]);
    }

    #[test]
    fn test_extend_keeps_matching_range() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut doc = MemoryDocument::default();
        let up = updater(Some("A1:B2"));
        let inserted = up
            .insert(&mut doc, &linked("a1:b2", file.path()), Transform::identity())
            .unwrap();

        let outcome = up.update_definition(&mut doc, inserted.index, true).unwrap();
        let UpdateOutcome::Updated { range, .. } = outcome else {
            panic!("expected an update");
        };
        assert_eq!(range, "a1:b2");
    }

    #[test]
    fn test_unlinked_and_missing_are_skipped() {
        let mut doc = MemoryDocument::default();
        let plain = doc.add_definition("Plain", &[]).unwrap();
        let up = updater(None);
        assert_eq!(
            up.update_definition(&mut doc, plain, false).unwrap(),
            UpdateOutcome::Skipped(SkipReason::Unlinked)
        );

        let gone = doc.add_definition("Gone", &[]).unwrap();
        let metadata = linked("A1", Path::new("/nonexistent/book.xlsx"));
        stamp_metadata(&mut doc, gone, &[], &metadata).unwrap();
        assert!(matches!(
            up.update_definition(&mut doc, gone, false).unwrap(),
            UpdateOutcome::Skipped(SkipReason::SourceMissing(_))
        ));
        assert!(up.reader().requests.borrow().is_empty());
    }

    #[test]
    fn test_stale_index_is_an_error() {
        let mut doc = MemoryDocument::default();
        let index = doc.add_definition("T", &[]).unwrap();
        doc.delete_definition(index).unwrap();
        let err = updater(None)
            .update_definition(&mut doc, index, false)
            .unwrap_err();
        assert!(err.is_skippable());
    }
}
