//! Host document abstraction.
//!
//! A document holds named, indexed *definitions* (reusable geometry) and *placements* (one
//! occurrence of a definition at a transform). Both carry free-form string attributes, which is
//! where link metadata lives.
//!
//! [`MemoryDocument`] is a complete in-memory store that round-trips through JSON.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TableLinkError};
use crate::types::{Primitive, Transform, UnitSystem};

/// String attributes attached to a definition or placement.
pub type Attributes = BTreeMap<String, String>;

/// Position of a definition in the document's definition table.
///
/// Indices are never reused: replacing a definition always yields a new index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DefinitionIndex(pub usize);

impl fmt::Display for DefinitionIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlacementId(pub u64);

impl fmt::Display for PlacementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Snapshot of a placement.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementInfo {
    pub id: PlacementId,
    pub definition: DefinitionIndex,
    pub transform: Transform,
    pub attributes: Attributes,
}

/// The object store of a host document.
pub trait DocumentStore {
    /// Unit system of model space.
    fn model_units(&self) -> UnitSystem;

    fn find_definition(&self, name: &str) -> Option<DefinitionIndex>;

    fn definition_name(&self, index: DefinitionIndex) -> Option<String>;

    fn definition_exists(&self, index: DefinitionIndex) -> bool {
        self.definition_name(index).is_some()
    }

    /// Live definitions in index order.
    fn definitions(&self) -> Vec<DefinitionIndex>;

    fn definition_primitives(&self, index: DefinitionIndex) -> Result<Vec<Primitive>>;

    /// Add a definition; fails if the name is taken.
    fn add_definition(&mut self, name: &str, primitives: &[Primitive]) -> Result<DefinitionIndex>;

    /// Remove a definition together with every placement still referencing it.
    fn delete_definition(&mut self, index: DefinitionIndex) -> Result<()>;

    /// Placements of `index` in creation order.
    fn placements_of(&self, index: DefinitionIndex) -> Vec<PlacementId>;

    fn placement(&self, id: PlacementId) -> Option<PlacementInfo>;

    fn add_placement(&mut self, index: DefinitionIndex, transform: Transform)
        -> Result<PlacementId>;

    fn delete_placement(&mut self, id: PlacementId) -> Result<()>;

    fn definition_attributes(&self, index: DefinitionIndex) -> Result<Attributes>;

    /// Insert or overwrite each given attribute; other attributes are left alone.
    fn set_definition_attributes(
        &mut self,
        index: DefinitionIndex,
        attributes: &Attributes,
    ) -> Result<()>;

    fn placement_attributes(&self, id: PlacementId) -> Result<Attributes>;

    fn set_placement_attributes(&mut self, id: PlacementId, attributes: &Attributes)
        -> Result<()>;

    /// Ask the host to repaint.
    fn redraw(&mut self);
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredDefinition {
    name: String,
    primitives: Vec<Primitive>,
    #[serde(default)]
    attributes: Attributes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredPlacement {
    id: PlacementId,
    definition: DefinitionIndex,
    transform: Transform,
    #[serde(default)]
    attributes: Attributes,
}

/// In-memory document, persisted as JSON.
///
/// Deleted definitions leave a tombstone so indices stay unique for the document's lifetime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryDocument {
    #[serde(default)]
    units: UnitSystem,
    #[serde(default)]
    definitions: Vec<Option<StoredDefinition>>,
    #[serde(default)]
    placements: Vec<StoredPlacement>,
    #[serde(default)]
    next_placement_id: u64,
    #[serde(skip)]
    redraws: usize,
}

impl MemoryDocument {
    pub fn new(units: UnitSystem) -> Self {
        Self {
            units,
            ..Self::default()
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let doc: Self = serde_json::from_reader(reader)?;
        debug!(
            "loaded document {} ({} definitions, {} placements)",
            path.display(),
            doc.definitions().len(),
            doc.placements.len()
        );
        Ok(doc)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Number of redraw requests since the document was created or loaded.
    pub fn redraw_count(&self) -> usize {
        self.redraws
    }

    /// Every live placement in creation order.
    pub fn all_placements(&self) -> Vec<PlacementId> {
        self.placements.iter().map(|p| p.id).collect()
    }

    fn stored(&self, index: DefinitionIndex) -> Result<&StoredDefinition> {
        self.definitions
            .get(index.0)
            .and_then(Option::as_ref)
            .ok_or(TableLinkError::StaleIndex(index))
    }

    fn stored_mut(&mut self, index: DefinitionIndex) -> Result<&mut StoredDefinition> {
        self.definitions
            .get_mut(index.0)
            .and_then(Option::as_mut)
            .ok_or(TableLinkError::StaleIndex(index))
    }

    fn stored_placement(&self, id: PlacementId) -> Result<&StoredPlacement> {
        self.placements
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| missing_placement(id))
    }
}

fn missing_placement(id: PlacementId) -> TableLinkError {
    TableLinkError::Document(format!("placement {id} not found"))
}

impl DocumentStore for MemoryDocument {
    fn model_units(&self) -> UnitSystem {
        self.units
    }

    fn find_definition(&self, name: &str) -> Option<DefinitionIndex> {
        self.definitions
            .iter()
            .position(|d| d.as_ref().is_some_and(|d| d.name == name))
            .map(DefinitionIndex)
    }

    fn definition_name(&self, index: DefinitionIndex) -> Option<String> {
        self.stored(index).ok().map(|d| d.name.clone())
    }

    fn definitions(&self) -> Vec<DefinitionIndex> {
        self.definitions
            .iter()
            .enumerate()
            .filter(|(_, d)| d.is_some())
            .map(|(i, _)| DefinitionIndex(i))
            .collect()
    }

    fn definition_primitives(&self, index: DefinitionIndex) -> Result<Vec<Primitive>> {
        Ok(self.stored(index)?.primitives.clone())
    }

    fn add_definition(&mut self, name: &str, primitives: &[Primitive]) -> Result<DefinitionIndex> {
        if name.trim().is_empty() {
            return Err(TableLinkError::Document(
                "definition name must not be empty".to_string(),
            ));
        }
        if self.find_definition(name).is_some() {
            return Err(TableLinkError::Document(format!(
                "definition '{name}' already exists"
            )));
        }
        self.definitions.push(Some(StoredDefinition {
            name: name.to_string(),
            primitives: primitives.to_vec(),
            attributes: Attributes::new(),
        }));
        Ok(DefinitionIndex(self.definitions.len() - 1))
    }

    fn delete_definition(&mut self, index: DefinitionIndex) -> Result<()> {
        self.stored(index)?;
        self.placements.retain(|p| p.definition != index);
        if let Some(slot) = self.definitions.get_mut(index.0) {
            *slot = None;
        }
        Ok(())
    }

    fn placements_of(&self, index: DefinitionIndex) -> Vec<PlacementId> {
        self.placements
            .iter()
            .filter(|p| p.definition == index)
            .map(|p| p.id)
            .collect()
    }

    fn placement(&self, id: PlacementId) -> Option<PlacementInfo> {
        self.stored_placement(id).ok().map(|p| PlacementInfo {
            id: p.id,
            definition: p.definition,
            transform: p.transform,
            attributes: p.attributes.clone(),
        })
    }

    fn add_placement(
        &mut self,
        index: DefinitionIndex,
        transform: Transform,
    ) -> Result<PlacementId> {
        self.stored(index)?;
        let id = PlacementId(self.next_placement_id);
        self.next_placement_id += 1;
        self.placements.push(StoredPlacement {
            id,
            definition: index,
            transform,
            attributes: Attributes::new(),
        });
        Ok(id)
    }

    fn delete_placement(&mut self, id: PlacementId) -> Result<()> {
        let before = self.placements.len();
        self.placements.retain(|p| p.id != id);
        if self.placements.len() == before {
            return Err(missing_placement(id));
        }
        Ok(())
    }

    fn definition_attributes(&self, index: DefinitionIndex) -> Result<Attributes> {
        Ok(self.stored(index)?.attributes.clone())
    }

    fn set_definition_attributes(
        &mut self,
        index: DefinitionIndex,
        attributes: &Attributes,
    ) -> Result<()> {
        let stored = self.stored_mut(index)?;
        for (key, value) in attributes {
            stored.attributes.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn placement_attributes(&self, id: PlacementId) -> Result<Attributes> {
        Ok(self.stored_placement(id)?.attributes.clone())
    }

    fn set_placement_attributes(
        &mut self,
        id: PlacementId,
        attributes: &Attributes,
    ) -> Result<()> {
        let stored = self
            .placements
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| missing_placement(id))?;
        for (key, value) in attributes {
            stored.attributes.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn redraw(&mut self) {
        self.redraws += 1;
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
    use crate::types::{LineSegment, Point2D};

    fn line() -> Primitive {
        Primitive::Line(LineSegment {
            start: Point2D::ORIGIN,
            end: Point2D::new(5.0, 0.0),
        })
    }

    #[test]
    fn test_indices_never_reused() {
        let mut doc = MemoryDocument::default();
        let first = doc.add_definition("T", &[line()]).unwrap();
        doc.delete_definition(first).unwrap();
        let second = doc.add_definition("T", &[line()]).unwrap();
        assert_ne!(first, second);
        assert!(!doc.definition_exists(first));
        assert_eq!(doc.find_definition("T"), Some(second));
        assert_eq!(doc.definitions(), vec![second]);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut doc = MemoryDocument::default();
        doc.add_definition("T", &[]).unwrap();
        assert!(matches!(
            doc.add_definition("T", &[]),
            Err(TableLinkError::Document(_))
        ));
    }

    #[test]
    fn test_delete_definition_drops_placements() {
        let mut doc = MemoryDocument::default();
        let a = doc.add_definition("A", &[line()]).unwrap();
        let b = doc.add_definition("B", &[line()]).unwrap();
        doc.add_placement(a, Transform::identity()).unwrap();
        let keep = doc.add_placement(b, Transform::translation(1.0, 2.0)).unwrap();
        doc.delete_definition(a).unwrap();
        assert_eq!(doc.all_placements(), vec![keep]);
        assert!(matches!(
            doc.add_placement(a, Transform::identity()),
            Err(TableLinkError::StaleIndex(_))
        ));
    }

    #[test]
    fn test_attributes_merge() {
        let mut doc = MemoryDocument::default();
        let idx = doc.add_definition("A", &[]).unwrap();
        let mut attrs = Attributes::new();
        attrs.insert("k1".to_string(), "v1".to_string());
        doc.set_definition_attributes(idx, &attrs).unwrap();
        attrs.clear();
        attrs.insert("k2".to_string(), "v2".to_string());
        doc.set_definition_attributes(idx, &attrs).unwrap();
        let stored = doc.definition_attributes(idx).unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[test]
    fn test_json_round_trip() {
        let mut doc = MemoryDocument::new(UnitSystem::Inches);
        let idx = doc.add_definition("A", &[line()]).unwrap();
        let id = doc.add_placement(idx, Transform::translation(3.0, 4.5)).unwrap();
        let mut attrs = Attributes::new();
        attrs.insert("k".to_string(), "v".to_string());
        doc.set_placement_attributes(id, &attrs).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        doc.save(&path).unwrap();
        let loaded = MemoryDocument::load(&path).unwrap();

        assert_eq!(loaded.model_units(), UnitSystem::Inches);
        assert_eq!(loaded.definition_primitives(idx).unwrap(), vec![line()]);
        assert_eq!(loaded.placement(id), doc.placement(id));
    }

    #[test]
    fn test_next_id_survives_reload() {
        let mut doc = MemoryDocument::default();
        let idx = doc.add_definition("A", &[]).unwrap();
        let first = doc.add_placement(idx, Transform::identity()).unwrap();
        let json = serde_json::to_string(&doc).unwrap();
        let mut loaded: MemoryDocument = serde_json::from_str(&json).unwrap();
        let second = loaded.add_placement(idx, Transform::identity()).unwrap();
        assert_ne!(first, second);
    }
}
