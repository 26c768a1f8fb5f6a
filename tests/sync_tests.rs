//! Linked-table workflow against real workbooks on disk: insert, edit the source, detect the
//! change, regenerate, relink and persist.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp,
    clippy::panic
)]

mod common;
mod fixtures;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fixtures::{SheetBuilder, XlsxBuilder};
use tablelink::commands::{insert_new, relink, update_selected, InsertRequest};
use tablelink::metadata::{KEY_FILE, KEY_RANGE};
use tablelink::sync::FixedPrompt;
use tablelink::updater::Inserted;
use tablelink::{
    DocumentStore, LinkUpdater, MemoryDocument, Primitive, RenderOptions, StandardNormalizer,
    SyncCoordinator, SyncDecision, Transform, UnitSystem, XlsxSource,
};

type Updater = LinkUpdater<XlsxSource, StandardNormalizer>;

fn updater() -> Updater {
    LinkUpdater::new(XlsxSource::new(), StandardNormalizer)
}

fn book(rows: u32) -> XlsxBuilder {
    let mut sheet = SheetBuilder::new("Prices")
        .cell("A1", "Item", None)
        .cell("B1", "Price", None);
    for r in 2..=rows {
        sheet = sheet
            .cell(&format!("A{r}"), format!("item {r}").as_str(), None)
            .cell(&format!("B{r}"), f64::from(r) * 1.5, None);
    }
    XlsxBuilder::new().sheet(sheet)
}

/// Rewrite the workbook so its modification stamp changes even on coarse-grained filesystems.
fn rewrite(path: &Path, rows: u32) {
    let bytes = book(rows).build();
    std::fs::write(path, bytes).unwrap();
    let later = std::time::SystemTime::now() + Duration::from_secs(5);
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(later).unwrap();
}

fn texts(doc: &MemoryDocument, index: tablelink::DefinitionIndex) -> Vec<String> {
    doc.definition_primitives(index)
        .unwrap()
        .into_iter()
        .filter_map(|p| match p {
            Primitive::Text(t) => Some(t.content),
            Primitive::Line(_) => None,
        })
        .collect()
}

fn insert(
    doc: &mut MemoryDocument,
    sync: &mut SyncCoordinator,
    path: &Path,
    range: &str,
) -> Inserted {
    let request = InsertRequest {
        source_path: path.to_path_buf(),
        sheet_name: "Prices".to_string(),
        range_spec: range.to_string(),
        options: RenderOptions::default(),
        at: Transform::translation(10.0, 20.0),
    };
    insert_new(doc, sync, &updater(), &request).unwrap()
}

fn setup(rows: u32) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = book(rows).write_to(dir.path(), "prices.xlsx");
    (dir, path)
}

#[test]
fn test_change_detected_and_regenerated() {
    let (_dir, path) = setup(3);
    let mut doc = MemoryDocument::new(UnitSystem::Millimeters);
    let mut sync = SyncCoordinator::default();
    let inserted = insert(&mut doc, &mut sync, &path, "A1:B3");
    let extra = doc
        .add_placement(inserted.index, Transform::rotation(90.0))
        .unwrap();
    assert_eq!(texts(&doc, inserted.index).len(), 6);
    assert!(sync.scan().is_empty());

    rewrite(&path, 3);
    let changed = sync.scan();
    assert_eq!(changed, vec![path.clone()]);

    let report = sync
        .handle_change(
            &mut doc,
            &updater(),
            &mut FixedPrompt(SyncDecision::Update),
            &path,
            Instant::now(),
        )
        .unwrap();
    assert_eq!(report.updated.len(), 1);
    let new_index = report.updated[0];
    assert!(!doc.definition_exists(inserted.index));
    assert_eq!(doc.find_definition(&inserted.name), Some(new_index));
    assert_eq!(sync.indices_for(&path), vec![new_index]);

    let transforms: Vec<Transform> = doc
        .placements_of(new_index)
        .into_iter()
        .map(|id| doc.placement(id).unwrap().transform)
        .collect();
    assert_eq!(
        transforms,
        vec![Transform::translation(10.0, 20.0), Transform::rotation(90.0)]
    );
    assert!(doc.placement(extra).is_none());
}

#[test]
fn test_extend_grows_to_new_rows() {
    let (_dir, path) = setup(3);
    let mut doc = MemoryDocument::default();
    let mut sync = SyncCoordinator::default();
    let inserted = insert(&mut doc, &mut sync, &path, "A1:B3");

    rewrite(&path, 5);
    sync.scan();
    let report = sync
        .handle_change(
            &mut doc,
            &updater(),
            &mut FixedPrompt(SyncDecision::UpdateAndExtend),
            &path,
            Instant::now(),
        )
        .unwrap();
    let new_index = report.updated[0];
    assert_ne!(new_index, inserted.index);
    assert_eq!(doc.definition_attributes(new_index).unwrap()[KEY_RANGE], "A1:B5");
    assert_eq!(texts(&doc, new_index).len(), 10);

    let placement = doc.placements_of(new_index)[0];
    assert_eq!(doc.placement_attributes(placement).unwrap()[KEY_RANGE], "A1:B5");
}

#[test]
fn test_update_without_extend_keeps_range() {
    let (_dir, path) = setup(3);
    let mut doc = MemoryDocument::default();
    let mut sync = SyncCoordinator::default();
    let inserted = insert(&mut doc, &mut sync, &path, "A1:B3");

    rewrite(&path, 5);
    let report = update_selected(&mut doc, &mut sync, &updater(), &[inserted.index], false);
    let new_index = report.updated[0];
    assert_eq!(doc.definition_attributes(new_index).unwrap()[KEY_RANGE], "A1:B3");
    assert_eq!(texts(&doc, new_index).len(), 6);
}

#[test]
fn test_debounced_second_event_is_dropped() {
    let (_dir, path) = setup(2);
    let mut doc = MemoryDocument::default();
    let mut sync = SyncCoordinator::new(Duration::from_millis(500));
    insert(&mut doc, &mut sync, &path, "A1:B2");

    let t0 = Instant::now();
    let up = updater();
    let mut prompt = FixedPrompt(SyncDecision::Update);
    assert!(sync
        .handle_change(&mut doc, &up, &mut prompt, &path, t0)
        .is_some());
    assert!(sync
        .handle_change(&mut doc, &up, &mut prompt, &path, t0 + Duration::from_millis(200))
        .is_none());
    assert!(sync
        .handle_change(&mut doc, &up, &mut prompt, &path, t0 + Duration::from_millis(700))
        .is_some());
}

#[test]
fn test_deleted_source_is_skipped() {
    let (_dir, path) = setup(2);
    let mut doc = MemoryDocument::default();
    let mut sync = SyncCoordinator::default();
    let inserted = insert(&mut doc, &mut sync, &path, "A1:B2");

    std::fs::remove_file(&path).unwrap();
    assert_eq!(sync.scan(), vec![path.clone()]);
    let report = sync
        .handle_change(
            &mut doc,
            &updater(),
            &mut FixedPrompt(SyncDecision::Update),
            &path,
            Instant::now(),
        )
        .unwrap();
    assert!(report.updated.is_empty());
    assert_eq!(report.skipped.len(), 1);
    assert!(doc.definition_exists(inserted.index));
}

#[test]
fn test_relink_then_update_reads_new_source() {
    let (dir, path) = setup(2);
    let other = XlsxBuilder::new()
        .sheet(SheetBuilder::new("Other").cell("C3", "moved", None))
        .write_to(dir.path(), "other.xlsx");

    let mut doc = MemoryDocument::default();
    let mut sync = SyncCoordinator::default();
    let inserted = insert(&mut doc, &mut sync, &path, "A1:B2");

    let spec = format!("{}|Other|C3", other.display());
    relink(&mut doc, &mut sync, inserted.index, &spec).unwrap();
    assert_eq!(texts(&doc, inserted.index).len(), 4);
    assert_eq!(
        doc.definition_attributes(inserted.index).unwrap()[KEY_FILE],
        other.to_string_lossy()
    );

    let report = update_selected(&mut doc, &mut sync, &updater(), &[inserted.index], false);
    let new_index = report.updated[0];
    assert_eq!(texts(&doc, new_index), vec!["moved"]);
    assert_eq!(sync.indices_for(&other), vec![new_index]);
    assert!(!sync.is_watching(&path));
}

#[test]
fn test_document_round_trip_keeps_links() {
    let (dir, path) = setup(2);
    let doc_path = dir.path().join("drawing.json");

    let mut doc = MemoryDocument::default();
    let mut sync = SyncCoordinator::default();
    let inserted = insert(&mut doc, &mut sync, &path, "A1:B2");
    doc.save(&doc_path).unwrap();

    let mut reloaded = MemoryDocument::load(&doc_path).unwrap();
    let mut fresh = SyncCoordinator::default();
    assert_eq!(fresh.register_document(&reloaded), 1);
    assert_eq!(fresh.indices_for(&path), vec![inserted.index]);

    let all = reloaded.definitions();
    let report = update_selected(&mut reloaded, &mut fresh, &updater(), &all, false);
    assert_eq!(report.updated.len(), 1);
    assert!(report.updated[0].0 > inserted.index.0);
}
