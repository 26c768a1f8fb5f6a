//! User-facing commands.
//!
//! Each command runs against an explicitly passed document, coordinator and updater and redraws
//! the document once it is done.

use log::{info, warn};
use std::path::PathBuf;

use crate::document::{Attributes, DefinitionIndex, DocumentStore, PlacementId};
use crate::error::{Result, TableLinkError};
use crate::metadata::{link_keys, LinkMetadata, KEY_FILE, KEY_RANGE, KEY_SHEET};
use crate::normalize::TableNormalizer;
use crate::source::{parse_link_spec, LinkSpec, SourceInspector, TableReader};
use crate::sync::SyncCoordinator;
use crate::types::{RenderOptions, Transform};
use crate::updater::{BatchReport, Inserted, LinkUpdater, UpdateOutcome};

/// Input of [`insert_new`].
#[derive(Debug, Clone)]
pub struct InsertRequest {
    pub source_path: PathBuf,
    pub sheet_name: String,
    pub range_spec: String,
    pub options: RenderOptions,
    /// Where the first placement goes.
    pub at: Transform,
}

/// Render a new linked table, place it once and start watching its source.
pub fn insert_new<D, R, N>(
    doc: &mut D,
    sync: &mut SyncCoordinator,
    updater: &LinkUpdater<R, N>,
    request: &InsertRequest,
) -> Result<Inserted>
where
    D: DocumentStore + ?Sized,
    R: TableReader + SourceInspector,
    N: TableNormalizer,
{
    let metadata = LinkMetadata::from_render_options(
        &request.source_path,
        &request.sheet_name,
        &request.range_spec,
        &request.options,
    );
    let inserted = updater.insert(doc, &metadata, request.at)?;
    sync.register(inserted.index, &request.source_path);
    doc.redraw();
    Ok(inserted)
}

/// Regenerate every selected definition, continuing past individual failures.
///
/// Repeated indices are processed once.
pub fn update_selected<D, R, N>(
    doc: &mut D,
    sync: &mut SyncCoordinator,
    updater: &LinkUpdater<R, N>,
    selection: &[DefinitionIndex],
    extend: bool,
) -> BatchReport
where
    D: DocumentStore + ?Sized,
    R: TableReader + SourceInspector,
    N: TableNormalizer,
{
    let mut unique = Vec::with_capacity(selection.len());
    for index in selection {
        if !unique.contains(index) {
            unique.push(*index);
        }
    }
    let report = sync.run_batch(doc, updater, &unique, extend);
    for (index, err) in &report.failed {
        warn!("could not update {index}: {err}");
    }
    doc.redraw();
    info!("update selected: {}", report.summary());
    report
}

/// Push the link attributes edited on a placement back to its definition and regenerate.
///
/// Only non-empty placement values are copied. The range is not extended.
pub fn apply_attributes<D, R, N>(
    doc: &mut D,
    sync: &mut SyncCoordinator,
    updater: &LinkUpdater<R, N>,
    placement: PlacementId,
) -> Result<UpdateOutcome>
where
    D: DocumentStore + ?Sized,
    R: TableReader + SourceInspector,
    N: TableNormalizer,
{
    let info = doc
        .placement(placement)
        .ok_or_else(|| TableLinkError::Document(format!("placement {placement} not found")))?;
    let index = info.definition;
    let before = LinkMetadata::decode(&doc.definition_attributes(index)?);

    let edited: Attributes = link_keys()
        .iter()
        .filter_map(|key| {
            info.attributes
                .get(*key)
                .filter(|value| !value.trim().is_empty())
                .map(|value| ((*key).to_string(), value.clone()))
        })
        .collect();
    doc.set_definition_attributes(index, &edited)?;

    let after = LinkMetadata::decode(&doc.definition_attributes(index)?);
    if after.source_path != before.source_path {
        sync.update_definition_file(index, &before.source_path, &after.source_path);
    }

    let outcome = updater.update_definition(doc, index, false)?;
    if let UpdateOutcome::Updated {
        old, new, source, ..
    } = &outcome
    {
        sync.replace_definition_index(source, *old, *new);
    }
    doc.redraw();
    Ok(outcome)
}

/// Point a definition at another `path|sheet|range` source without regenerating it.
///
/// # Errors
/// `InvalidLinkSpec` for malformed input, `SourceUnavailable` when the new file does not exist.
pub fn relink<D: DocumentStore + ?Sized>(
    doc: &mut D,
    sync: &mut SyncCoordinator,
    index: DefinitionIndex,
    spec: &str,
) -> Result<LinkSpec> {
    let link = parse_link_spec(spec)?;
    if !link.path.is_file() {
        return Err(TableLinkError::SourceUnavailable(link.path));
    }
    let before = LinkMetadata::decode(&doc.definition_attributes(index)?);

    let mut attributes = Attributes::new();
    attributes.insert(KEY_FILE.to_string(), link.path.to_string_lossy().into_owned());
    attributes.insert(KEY_SHEET.to_string(), link.sheet.clone());
    attributes.insert(KEY_RANGE.to_string(), link.range.clone());
    doc.set_definition_attributes(index, &attributes)?;

    sync.update_definition_file(index, &before.source_path, &link.path);
    info!(
        "relinked {} to {} [{}!{}]",
        index,
        link.path.display(),
        link.sheet,
        link.range
    );
    Ok(link)
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
    use crate::metadata::{KEY_SCALE, KEY_SHOW_GRID};
    use crate::normalize::StandardNormalizer;
    use crate::types::{ColumnSpec, Primitive, TableCell, TableModel, TableRow};
    use std::path::Path;

    #[derive(Debug, Default)]
    struct TwoColumns;

    impl TableReader for TwoColumns {
        fn read_table(&self, _path: &Path, _sheet: &str, range: &str) -> Result<TableModel> {
            if range == "MISSING" {
                return Err(TableLinkError::RangeNotFound(range.to_string()));
            }
            Ok(TableModel {
                columns: vec![ColumnSpec { width_mm: 20.0 }; 2],
                rows: vec![TableRow {
                    height_mm: 6.0,
                    cells: vec![TableCell::text("a"), TableCell::text("b")],
                }],
                ..TableModel::default()
            })
        }
    }

    impl SourceInspector for TwoColumns {
        fn list_sheet_names(&self, _path: &Path) -> Result<Vec<String>> {
            Ok(vec!["S".to_string()])
        }

        fn used_range_of(&self, _path: &Path, _sheet: &str) -> Result<Option<String>> {
            Ok(Some("A1:B1".to_string()))
        }
    }

    fn request(path: &Path, range: &str) -> InsertRequest {
        InsertRequest {
            source_path: path.to_path_buf(),
            sheet_name: "S".to_string(),
            range_spec: range.to_string(),
            options: RenderOptions::default(),
            at: Transform::translation(100.0, 50.0),
        }
    }

    fn updater() -> LinkUpdater<TwoColumns, StandardNormalizer> {
        LinkUpdater::new(TwoColumns, StandardNormalizer)
    }

    #[test]
    fn test_insert_registers_source() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut doc = MemoryDocument::default();
        let mut sync = SyncCoordinator::default();
        let inserted = insert_new(&mut doc, &mut sync, &updater(), &request(file.path(), "A1:B1"))
            .unwrap();

        assert_eq!(sync.indices_for(file.path()), vec![inserted.index]);
        let placed = doc.placement(inserted.placement).unwrap();
        assert_eq!(placed.transform, Transform::translation(100.0, 50.0));
        assert_eq!(placed.attributes[KEY_RANGE], "A1:B1");
        assert_eq!(doc.redraw_count(), 1);
    }

    #[test]
    fn test_insert_failure_leaves_document_untouched() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut doc = MemoryDocument::default();
        let mut sync = SyncCoordinator::default();
        let err = insert_new(&mut doc, &mut sync, &updater(), &request(file.path(), "MISSING"));
        assert!(matches!(err, Err(TableLinkError::RangeNotFound(_))));
        assert!(doc.definitions().is_empty());
        assert!(sync.watched_paths().is_empty());
    }

    #[test]
    fn test_update_selected_dedupes_and_isolates() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut doc = MemoryDocument::default();
        let mut sync = SyncCoordinator::default();
        let up = updater();
        let good = insert_new(&mut doc, &mut sync, &up, &request(file.path(), "A1:B1")).unwrap();
        let plain = doc.add_definition("Plain", &[]).unwrap();

        let report = update_selected(
            &mut doc,
            &mut sync,
            &up,
            &[good.index, good.index, plain],
            false,
        );
        assert_eq!(report.updated.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert!(report.failed.is_empty());
        assert_eq!(sync.indices_for(file.path()), report.updated);
    }

    #[test]
    fn test_apply_attributes_from_placement() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut doc = MemoryDocument::default();
        let mut sync = SyncCoordinator::default();
        let up = updater();
        let inserted = insert_new(&mut doc, &mut sync, &up, &request(file.path(), "A1:B1")).unwrap();
        let lines_before = doc
            .definition_primitives(inserted.index)
            .unwrap()
            .iter()
            .filter(|p| matches!(p, Primitive::Line(_)))
            .count();
        assert_eq!(lines_before, 5);

        let mut edits = Attributes::new();
        edits.insert(KEY_SHOW_GRID.to_string(), "0".to_string());
        edits.insert(KEY_SCALE.to_string(), "2".to_string());
        edits.insert(KEY_SHEET.to_string(), String::new());
        doc.set_placement_attributes(inserted.placement, &edits).unwrap();

        let outcome = apply_attributes(&mut doc, &mut sync, &up, inserted.placement).unwrap();
        let UpdateOutcome::Updated { new, placements, .. } = outcome else {
            panic!("expected an update");
        };
        assert_eq!(placements, 1);
        let attributes = doc.definition_attributes(new).unwrap();
        assert_eq!(attributes[KEY_SCALE], "2");
        assert_eq!(attributes[KEY_SHEET], "S");
        assert!(doc
            .definition_primitives(new)
            .unwrap()
            .iter()
            .all(|p| matches!(p, Primitive::Text(_))));
        assert_eq!(sync.indices_for(file.path()), vec![new]);
    }

    #[test]
    fn test_relink_moves_watch_without_regenerating() {
        let old_file = tempfile::NamedTempFile::new().unwrap();
        let new_file = tempfile::NamedTempFile::new().unwrap();
        let mut doc = MemoryDocument::default();
        let mut sync = SyncCoordinator::default();
        let inserted =
            insert_new(&mut doc, &mut sync, &updater(), &request(old_file.path(), "A1:B1"))
                .unwrap();

        let spec = format!("\"{}\"|Other|Named|Range", new_file.path().display());
        let link = relink(&mut doc, &mut sync, inserted.index, &spec).unwrap();
        assert_eq!(link.range, "Named|Range");

        assert!(doc.definition_exists(inserted.index));
        let attributes = doc.definition_attributes(inserted.index).unwrap();
        assert_eq!(attributes[KEY_SHEET], "Other");
        assert_eq!(attributes[KEY_RANGE], "Named|Range");
        assert!(!sync.is_watching(old_file.path()));
        assert_eq!(sync.indices_for(new_file.path()), vec![inserted.index]);
    }

    #[test]
    fn test_relink_rejects_missing_file() {
        let mut doc = MemoryDocument::default();
        let mut sync = SyncCoordinator::default();
        let index = doc.add_definition("T", &[]).unwrap();
        let err = relink(&mut doc, &mut sync, index, "/nonexistent/x.xlsx|S|A1");
        assert!(matches!(err, Err(TableLinkError::SourceUnavailable(_))));
    }
}
