//! Regenerating a definition in place.
//!
//! A definition cannot be edited, only replaced, and replacement hands out a new index. The
//! helpers here keep every placement of the old definition alive across that swap: snapshot the
//! transforms, delete the old placements, replace the geometry, re-create one placement per
//! snapshot in the prior order and re-stamp the link metadata on all of them.

use log::debug;

use crate::document::{DefinitionIndex, DocumentStore, PlacementId};
use crate::error::{Result, TableLinkError};
use crate::metadata::LinkMetadata;
use crate::types::{Primitive, Transform};

/// Result of replacing a definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Replacement {
    pub new_index: DefinitionIndex,
    /// New placements, in the order of the transforms they were created from.
    pub placement_ids: Vec<PlacementId>,
}

/// Snapshot the placements of `index` in creation order.
pub fn capture_placements<D: DocumentStore + ?Sized>(
    doc: &D,
    index: DefinitionIndex,
) -> Vec<(PlacementId, Transform)> {
    doc.placements_of(index)
        .into_iter()
        .filter_map(|id| doc.placement(id).map(|p| (id, p.transform)))
        .collect()
}

/// Replace (or create) the definition called `name` and place it once per prior transform.
///
/// Any placements still referencing the old definition go with it.
pub fn replace_definition<D: DocumentStore + ?Sized>(
    doc: &mut D,
    name: &str,
    primitives: &[Primitive],
    prior_placements: &[Transform],
) -> Result<Replacement> {
    if let Some(existing) = doc.find_definition(name) {
        doc.delete_definition(existing)?;
    }
    let new_index = doc.add_definition(name, primitives)?;
    let placement_ids = prior_placements
        .iter()
        .map(|transform| doc.add_placement(new_index, *transform))
        .collect::<Result<Vec<_>>>()?;

    debug!(
        "replaced definition '{}' -> {} ({} primitives, {} placements)",
        name,
        new_index,
        primitives.len(),
        placement_ids.len()
    );
    Ok(Replacement {
        new_index,
        placement_ids,
    })
}

/// Write `metadata` onto the definition and each listed placement.
pub fn stamp_metadata<D: DocumentStore + ?Sized>(
    doc: &mut D,
    index: DefinitionIndex,
    placements: &[PlacementId],
    metadata: &LinkMetadata,
) -> Result<()> {
    let encoded = metadata.encode();
    doc.set_definition_attributes(index, &encoded)?;
    for id in placements {
        doc.set_placement_attributes(*id, &encoded)?;
    }
    Ok(())
}

/// Swap the geometry of an existing definition, keeping its name, placements and metadata.
///
/// # Errors
/// `StaleIndex` when `index` no longer resolves.
pub fn regenerate_definition<D: DocumentStore + ?Sized>(
    doc: &mut D,
    index: DefinitionIndex,
    primitives: &[Primitive],
    metadata: &LinkMetadata,
) -> Result<Replacement> {
    let name = doc
        .definition_name(index)
        .ok_or(TableLinkError::StaleIndex(index))?;
    let prior = capture_placements(doc, index);
    for (id, _) in &prior {
        doc.delete_placement(*id)?;
    }

    let transforms: Vec<Transform> = prior.iter().map(|(_, t)| *t).collect();
    let replacement = replace_definition(doc, &name, primitives, &transforms)?;
    stamp_metadata(
        doc,
        replacement.new_index,
        &replacement.placement_ids,
        metadata,
    )?;
    Ok(replacement)
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
    use crate::types::{LineSegment, Point2D};

    fn geometry(len: f64) -> Vec<Primitive> {
        vec![Primitive::Line(LineSegment {
            start: Point2D::ORIGIN,
            end: Point2D::new(len, 0.0),
        })]
    }

    #[test]
    fn test_replace_preserves_placements_in_order() {
        let mut doc = MemoryDocument::default();
        let old = doc.add_definition("T", &geometry(1.0)).unwrap();
        let transforms = [
            Transform::translation(10.0, 0.0),
            Transform::rotation(45.0),
            Transform::scaling(2.0),
        ];
        for t in &transforms {
            doc.add_placement(old, *t).unwrap();
        }

        let metadata = LinkMetadata {
            range_spec: "A1:B2".to_string(),
            ..LinkMetadata::default()
        };
        let replacement = regenerate_definition(&mut doc, old, &geometry(2.0), &metadata).unwrap();

        assert_ne!(replacement.new_index, old);
        assert!(!doc.definition_exists(old));
        assert_eq!(doc.find_definition("T"), Some(replacement.new_index));
        assert_eq!(doc.placements_of(replacement.new_index), replacement.placement_ids);
        let got: Vec<Transform> = replacement
            .placement_ids
            .iter()
            .map(|id| doc.placement(*id).unwrap().transform)
            .collect();
        assert_eq!(got, transforms);
        assert_eq!(
            doc.definition_primitives(replacement.new_index).unwrap(),
            geometry(2.0)
        );

        for id in &replacement.placement_ids {
            assert_eq!(doc.placement_attributes(*id).unwrap()[KEY_RANGE], "A1:B2");
        }
        assert_eq!(
            doc.definition_attributes(replacement.new_index).unwrap()[KEY_RANGE],
            "A1:B2"
        );
    }

    #[test]
    fn test_zero_placements_is_valid() {
        let mut doc = MemoryDocument::default();
        let old = doc.add_definition("Lib", &geometry(1.0)).unwrap();
        let replacement =
            regenerate_definition(&mut doc, old, &geometry(3.0), &LinkMetadata::default()).unwrap();
        assert!(replacement.placement_ids.is_empty());
        assert!(doc.definition_exists(replacement.new_index));
    }

    #[test]
    fn test_replace_creates_missing_definition() {
        let mut doc = MemoryDocument::default();
        let replacement =
            replace_definition(&mut doc, "Fresh", &geometry(1.0), &[Transform::identity()]).unwrap();
        assert_eq!(replacement.placement_ids.len(), 1);
    }

    #[test]
    fn test_replace_drops_leftover_placements() {
        let mut doc = MemoryDocument::default();
        let old = doc.add_definition("T", &geometry(1.0)).unwrap();
        doc.add_placement(old, Transform::identity()).unwrap();
        let replacement = replace_definition(&mut doc, "T", &geometry(1.0), &[]).unwrap();
        assert!(doc.placements_of(replacement.new_index).is_empty());
        assert!(doc.all_placements().is_empty());
    }

    #[test]
    fn test_stale_index_rejected() {
        let mut doc = MemoryDocument::default();
        let old = doc.add_definition("T", &[]).unwrap();
        doc.delete_definition(old).unwrap();
        let err = regenerate_definition(&mut doc, old, &[], &LinkMetadata::default());
        assert!(matches!(err, Err(TableLinkError::StaleIndex(i)) if i == old));
    }
}
