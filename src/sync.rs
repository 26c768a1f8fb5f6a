//! Change synchronization between source files and linked definitions.
//!
//! [`SyncCoordinator`] keeps a registry of watched source paths and the definitions read from
//! them. File changes are found by polling (`scan`), debounced per path, confirmed through a
//! [`ChangePrompt`] and then turned into one regeneration per registered definition. Every
//! regeneration hands out a new definition index, which is substituted into the registry before
//! the next definition is processed.

use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use crate::document::{DefinitionIndex, DocumentStore};
use crate::error::TableLinkError;
use crate::metadata::LinkMetadata;
use crate::normalize::TableNormalizer;
use crate::source::{SourceInspector, TableReader};
use crate::updater::{BatchReport, LinkUpdater, SkipReason, UpdateOutcome};

/// Minimum gap between two processed change events for one path.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// What to do after a source file changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDecision {
    Cancel,
    /// Regenerate with the stored ranges.
    Update,
    /// Grow each range to the sheet's used range, then regenerate.
    UpdateAndExtend,
}

/// Asks whether a changed source should be pulled into the document.
pub trait ChangePrompt {
    fn confirm(&mut self, path: &Path, affected: usize) -> SyncDecision;
}

impl<F> ChangePrompt for F
where
    F: FnMut(&Path, usize) -> SyncDecision,
{
    fn confirm(&mut self, path: &Path, affected: usize) -> SyncDecision {
        self(path, affected)
    }
}

/// Answers every prompt the same way.
#[derive(Debug, Clone, Copy)]
pub struct FixedPrompt(pub SyncDecision);

impl ChangePrompt for FixedPrompt {
    fn confirm(&mut self, _path: &Path, _affected: usize) -> SyncDecision {
        self.0
    }
}

/// Polled state of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    pub exists: bool,
    pub len: u64,
    pub modified: Option<SystemTime>,
}

impl FileStamp {
    pub fn of(path: &Path) -> Self {
        match fs::metadata(path) {
            Ok(meta) => Self {
                exists: true,
                len: meta.len(),
                modified: meta.modified().ok(),
            },
            Err(_) => Self {
                exists: false,
                len: 0,
                modified: None,
            },
        }
    }
}

#[derive(Debug)]
struct WatchEntry {
    indices: BTreeSet<DefinitionIndex>,
    stamp: FileStamp,
    last_event: Option<Instant>,
}

/// Registry of watched sources and their definitions.
#[derive(Debug)]
pub struct SyncCoordinator {
    watches: BTreeMap<PathBuf, WatchEntry>,
    debounce: Duration,
}

impl Default for SyncCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl SyncCoordinator {
    pub fn new(debounce: Duration) -> Self {
        Self {
            watches: BTreeMap::new(),
            debounce,
        }
    }

    /// Watch `path` on behalf of `index`. Empty and relative paths are ignored.
    pub fn register(&mut self, index: DefinitionIndex, path: &Path) -> bool {
        if path.as_os_str().is_empty() || !path.is_absolute() {
            debug!("not watching '{}' for {index}", path.display());
            return false;
        }
        let entry = self
            .watches
            .entry(path.to_path_buf())
            .or_insert_with(|| {
                debug!("watching {}", path.display());
                WatchEntry {
                    indices: BTreeSet::new(),
                    stamp: FileStamp::of(path),
                    last_event: None,
                }
            });
        entry.indices.insert(index);
        true
    }

    /// Stop watching `path` for `index`; the watch goes away with its last definition.
    pub fn unregister(&mut self, index: DefinitionIndex, path: &Path) {
        let Some(entry) = self.watches.get_mut(path) else {
            return;
        };
        entry.indices.remove(&index);
        if entry.indices.is_empty() {
            self.watches.remove(path);
            debug!("stopped watching {}", path.display());
        }
    }

    /// Drop `index` from every watch.
    pub fn forget(&mut self, index: DefinitionIndex) {
        let paths: Vec<PathBuf> = self
            .watches
            .iter()
            .filter(|(_, entry)| entry.indices.contains(&index))
            .map(|(path, _)| path.clone())
            .collect();
        for path in paths {
            self.unregister(index, &path);
        }
    }

    /// Move `index` from `old_path` to `new_path`.
    pub fn update_definition_file(
        &mut self,
        index: DefinitionIndex,
        old_path: &Path,
        new_path: &Path,
    ) {
        if old_path != new_path {
            self.unregister(index, old_path);
        }
        self.register(index, new_path);
    }

    /// Substitute `new` for `old` after a regeneration.
    pub fn replace_definition_index(
        &mut self,
        path: &Path,
        old: DefinitionIndex,
        new: DefinitionIndex,
    ) {
        if let Some(entry) = self.watches.get_mut(path) {
            if entry.indices.remove(&old) {
                entry.indices.insert(new);
            }
        }
    }

    /// Definitions registered for `path`, in index order.
    pub fn indices_for(&self, path: &Path) -> Vec<DefinitionIndex> {
        self.watches
            .get(path)
            .map(|entry| entry.indices.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_watching(&self, path: &Path) -> bool {
        self.watches.contains_key(path)
    }

    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.watches.keys().cloned().collect()
    }

    /// Register every linked definition of `doc`. Returns how many were registered.
    pub fn register_document<D: DocumentStore + ?Sized>(&mut self, doc: &D) -> usize {
        let mut count = 0;
        for index in doc.definitions() {
            let Ok(attributes) = doc.definition_attributes(index) else {
                continue;
            };
            let metadata = LinkMetadata::decode(&attributes);
            if metadata.is_linked() && self.register(index, &metadata.source_path) {
                count += 1;
            }
        }
        info!(
            "registered {count} linked definition(s) across {} source(s)",
            self.watches.len()
        );
        count
    }

    /// Paths whose file stamp changed since the last scan, deletion and re-creation included.
    pub fn scan(&mut self) -> Vec<PathBuf> {
        let mut changed = Vec::new();
        for (path, entry) in &mut self.watches {
            let stamp = FileStamp::of(path);
            if stamp != entry.stamp {
                entry.stamp = stamp;
                changed.push(path.clone());
            }
        }
        changed
    }

    /// Record a change event at `now`; false when it falls inside the debounce window.
    pub fn notify_change(&mut self, path: &Path, now: Instant) -> bool {
        let Some(entry) = self.watches.get_mut(path) else {
            return false;
        };
        if let Some(last) = entry.last_event {
            if now.saturating_duration_since(last) < self.debounce {
                debug!("debounced change of {}", path.display());
                return false;
            }
        }
        entry.last_event = Some(now);
        true
    }

    /// Process a change of `path` seen at `now`.
    ///
    /// Returns `None` when the event is debounced, nothing live is registered for the path, or
    /// the prompt declines. Redraws the document once after the batch.
    pub fn handle_change<D, R, N, P>(
        &mut self,
        doc: &mut D,
        updater: &LinkUpdater<R, N>,
        prompt: &mut P,
        path: &Path,
        now: Instant,
    ) -> Option<BatchReport>
    where
        D: DocumentStore + ?Sized,
        R: TableReader + SourceInspector,
        N: TableNormalizer,
        P: ChangePrompt + ?Sized,
    {
        if !self.notify_change(path, now) {
            return None;
        }

        let mut stale = Vec::new();
        let live: Vec<DefinitionIndex> = self
            .indices_for(path)
            .into_iter()
            .filter(|index| {
                let exists = doc.definition_exists(*index);
                if !exists {
                    stale.push(*index);
                }
                exists
            })
            .collect();
        for index in &stale {
            self.unregister(*index, path);
        }
        if live.is_empty() {
            return None;
        }

        let extend = match prompt.confirm(path, live.len()) {
            SyncDecision::Cancel => {
                debug!("update of {} declined", path.display());
                return None;
            }
            SyncDecision::Update => false,
            SyncDecision::UpdateAndExtend => true,
        };

        let mut report = self.run_batch(doc, updater, &live, extend);
        report
            .skipped
            .extend(stale.into_iter().map(|index| (index, SkipReason::Stale)));
        doc.redraw();
        info!("{}: {}", path.display(), report.summary());
        Some(report)
    }

    /// Regenerate `indices` one by one, keeping the registry in step and isolating failures.
    pub fn run_batch<D, R, N>(
        &mut self,
        doc: &mut D,
        updater: &LinkUpdater<R, N>,
        indices: &[DefinitionIndex],
        extend: bool,
    ) -> BatchReport
    where
        D: DocumentStore + ?Sized,
        R: TableReader + SourceInspector,
        N: TableNormalizer,
    {
        let mut report = BatchReport::default();
        for &index in indices {
            match updater.update_definition(doc, index, extend) {
                Ok(UpdateOutcome::Updated {
                    old, new, source, ..
                }) => {
                    self.replace_definition_index(&source, old, new);
                    report.updated.push(new);
                }
                Ok(UpdateOutcome::Skipped(reason)) => {
                    debug!("skipped {index}: {reason}");
                    report.skipped.push((index, reason));
                }
                Err(err) if err.is_skippable() && !doc.definition_exists(index) => {
                    self.forget(index);
                    report.skipped.push((index, SkipReason::Stale));
                }
                Err(TableLinkError::SourceUnavailable(path)) => {
                    debug!("skipped {index}: {} became unavailable", path.display());
                    report.skipped.push((index, SkipReason::SourceMissing(path)));
                }
                Err(err) => {
                    warn!("update of {index} failed: {err}");
                    report.failed.push((index, err));
                }
            }
        }
        report
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
    use crate::error::{Result, TableLinkError};
    use crate::lifecycle::stamp_metadata;
    use crate::normalize::PassThroughNormalizer;
    use crate::types::{ColumnSpec, TableCell, TableModel, TableRow};

    #[derive(Debug, Default)]
    struct OneCell;

    impl TableReader for OneCell {
        fn read_table(&self, path: &Path, _sheet: &str, range: &str) -> Result<TableModel> {
            if range == "BAD" {
                return Err(TableLinkError::RangeNotFound(range.to_string()));
            }
            if range == "GONE" {
                return Err(TableLinkError::SourceUnavailable(path.to_path_buf()));
            }
            Ok(TableModel {
                columns: vec![ColumnSpec { width_mm: 20.0 }],
                rows: vec![TableRow {
                    height_mm: 5.0,
                    cells: vec![TableCell::text("x")],
                }],
                ..TableModel::default()
            })
        }
    }

    impl SourceInspector for OneCell {
        fn list_sheet_names(&self, _path: &Path) -> Result<Vec<String>> {
            Ok(vec!["S".to_string()])
        }

        fn used_range_of(&self, _path: &Path, _sheet: &str) -> Result<Option<String>> {
            Ok(Some("A1".to_string()))
        }
    }

    fn linked_definition(
        doc: &mut MemoryDocument,
        name: &str,
        file: &Path,
        range: &str,
    ) -> DefinitionIndex {
        let index = doc.add_definition(name, &[]).unwrap();
        let metadata = LinkMetadata {
            source_path: file.to_path_buf(),
            sheet_name: "S".to_string(),
            range_spec: range.to_string(),
            ..LinkMetadata::default()
        };
        stamp_metadata(doc, index, &[], &metadata).unwrap();
        index
    }

    #[test]
    fn test_register_requires_absolute_path() {
        let mut sync = SyncCoordinator::default();
        assert!(!sync.register(DefinitionIndex(0), Path::new("")));
        assert!(!sync.register(DefinitionIndex(0), Path::new("relative/book.xlsx")));
        assert!(sync.watched_paths().is_empty());
    }

    #[test]
    fn test_unregister_tears_down_on_empty() {
        let mut sync = SyncCoordinator::default();
        let path = Path::new("/data/book.xlsx");
        sync.register(DefinitionIndex(1), path);
        sync.register(DefinitionIndex(2), path);
        sync.unregister(DefinitionIndex(1), path);
        assert!(sync.is_watching(path));
        sync.unregister(DefinitionIndex(2), path);
        assert!(!sync.is_watching(path));
    }

    #[test]
    fn test_update_definition_file_moves_index() {
        let mut sync = SyncCoordinator::default();
        let (a, b) = (Path::new("/data/a.xlsx"), Path::new("/data/b.xlsx"));
        sync.register(DefinitionIndex(4), a);
        sync.update_definition_file(DefinitionIndex(4), a, b);
        assert!(!sync.is_watching(a));
        assert_eq!(sync.indices_for(b), vec![DefinitionIndex(4)]);
    }

    #[test]
    fn test_replace_definition_index() {
        let mut sync = SyncCoordinator::default();
        let path = Path::new("/data/book.xlsx");
        sync.register(DefinitionIndex(1), path);
        sync.replace_definition_index(path, DefinitionIndex(1), DefinitionIndex(7));
        assert_eq!(sync.indices_for(path), vec![DefinitionIndex(7)]);
        // Unknown old index changes nothing.
        sync.replace_definition_index(path, DefinitionIndex(3), DefinitionIndex(9));
        assert_eq!(sync.indices_for(path), vec![DefinitionIndex(7)]);
    }

    #[test]
    fn test_debounce_window() {
        let mut sync = SyncCoordinator::default();
        let path = Path::new("/data/book.xlsx");
        sync.register(DefinitionIndex(1), path);
        let t0 = Instant::now();
        assert!(sync.notify_change(path, t0));
        assert!(!sync.notify_change(path, t0 + Duration::from_millis(100)));
        assert!(!sync.notify_change(path, t0 + Duration::from_millis(499)));
        assert!(sync.notify_change(path, t0 + Duration::from_millis(500)));
        assert!(!sync.notify_change(Path::new("/data/other.xlsx"), t0));
    }

    #[test]
    fn test_scan_detects_rewrite_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.xlsx");
        fs::write(&path, b"one").unwrap();

        let mut sync = SyncCoordinator::default();
        sync.register(DefinitionIndex(0), &path);
        assert!(sync.scan().is_empty());

        fs::write(&path, b"longer contents").unwrap();
        assert_eq!(sync.scan(), vec![path.clone()]);
        assert!(sync.scan().is_empty());

        fs::remove_file(&path).unwrap();
        assert_eq!(sync.scan(), vec![path.clone()]);
    }

    #[test]
    fn test_handle_change_updates_and_substitutes() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut doc = MemoryDocument::default();
        let first = linked_definition(&mut doc, "A", file.path(), "A1");
        let second = linked_definition(&mut doc, "B", file.path(), "A1");
        let mut sync = SyncCoordinator::default();
        assert_eq!(sync.register_document(&doc), 2);

        let updater = LinkUpdater::new(OneCell, PassThroughNormalizer);
        let mut asked = 0;
        let mut prompt = |_: &Path, affected: usize| {
            asked += 1;
            assert_eq!(affected, 2);
            SyncDecision::Update
        };
        let report = sync
            .handle_change(&mut doc, &updater, &mut prompt, file.path(), Instant::now())
            .unwrap();
        assert_eq!(asked, 1);
        assert_eq!(report.updated.len(), 2);
        assert!(report.is_clean());

        let registered = sync.indices_for(file.path());
        assert!(!registered.contains(&first));
        assert!(!registered.contains(&second));
        assert_eq!(registered.len(), 2);
        assert!(registered.iter().all(|i| doc.definition_exists(*i)));
        assert_eq!(doc.redraw_count(), 1);
    }

    #[test]
    fn test_handle_change_declined_is_noop() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut doc = MemoryDocument::default();
        let index = linked_definition(&mut doc, "A", file.path(), "A1");
        let mut sync = SyncCoordinator::default();
        sync.register_document(&doc);

        let updater = LinkUpdater::new(OneCell, PassThroughNormalizer);
        let report = sync.handle_change(
            &mut doc,
            &updater,
            &mut FixedPrompt(SyncDecision::Cancel),
            file.path(),
            Instant::now(),
        );
        assert!(report.is_none());
        assert!(doc.definition_exists(index));
        assert_eq!(sync.indices_for(file.path()), vec![index]);
        assert_eq!(doc.redraw_count(), 0);
    }

    #[test]
    fn test_stale_indices_dropped() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut doc = MemoryDocument::default();
        let kept = linked_definition(&mut doc, "A", file.path(), "A1");
        let removed = linked_definition(&mut doc, "B", file.path(), "A1");
        let mut sync = SyncCoordinator::default();
        sync.register_document(&doc);
        doc.delete_definition(removed).unwrap();

        let updater = LinkUpdater::new(OneCell, PassThroughNormalizer);
        let report = sync
            .handle_change(
                &mut doc,
                &updater,
                &mut FixedPrompt(SyncDecision::Update),
                file.path(),
                Instant::now(),
            )
            .unwrap();
        assert_eq!(report.updated.len(), 1);
        assert_eq!(report.skipped, vec![(removed, SkipReason::Stale)]);
        assert!(!sync.indices_for(file.path()).contains(&kept));
        assert_eq!(sync.indices_for(file.path()).len(), 1);
    }

    #[test]
    fn test_failures_are_isolated() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut doc = MemoryDocument::default();
        let bad = linked_definition(&mut doc, "Bad", file.path(), "BAD");
        let good = linked_definition(&mut doc, "Good", file.path(), "A1");
        let mut sync = SyncCoordinator::default();
        sync.register_document(&doc);

        let updater = LinkUpdater::new(OneCell, PassThroughNormalizer);
        let report = sync.run_batch(&mut doc, &updater, &[bad, good], false);
        assert_eq!(report.updated.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, bad);
        assert!(doc.definition_exists(bad));
        assert!(!doc.definition_exists(good));
    }

    #[test]
    fn test_source_vanishing_mid_update_is_skipped() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut doc = MemoryDocument::default();
        let gone = linked_definition(&mut doc, "Gone", file.path(), "GONE");
        let mut sync = SyncCoordinator::default();
        sync.register_document(&doc);

        let updater = LinkUpdater::new(OneCell, PassThroughNormalizer);
        let report = sync.run_batch(&mut doc, &updater, &[gone], false);
        assert!(report.failed.is_empty());
        assert_eq!(
            report.skipped,
            vec![(gone, SkipReason::SourceMissing(file.path().to_path_buf()))]
        );
        assert!(doc.definition_exists(gone));
        assert_eq!(sync.indices_for(file.path()), vec![gone]);
    }

    #[test]
    fn test_paths_differing_in_case_are_separate_watches() {
        let mut sync = SyncCoordinator::default();
        sync.register(DefinitionIndex(1), Path::new("/data/Book.xlsx"));
        sync.register(DefinitionIndex(2), Path::new("/data/book.xlsx"));
        assert_eq!(sync.watched_paths().len(), 2);
        assert_eq!(
            sync.indices_for(Path::new("/data/Book.xlsx")),
            vec![DefinitionIndex(1)]
        );
    }
}
