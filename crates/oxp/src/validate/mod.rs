//! Structural validation for manifests.
//!
//! Decoding only guarantees the bytes were well formed. These checks cover
//! the cross-table invariants: every linkset entry has a prim record, roots
//! come first, children point at their root, and content items have
//! inventory records.

use rustc_hash::FxHashSet;

use crate::error::ValidationError;
use crate::model::{ExportManifest, Id};

/// Checks the linkset, prim and inventory tables agree with each other.
pub fn validate_manifest(manifest: &ExportManifest) -> Result<(), ValidationError> {
    let mut seen: FxHashSet<Id> = FxHashSet::default();

    for (index, linkset) in manifest.linksets.iter().enumerate() {
        let Some(root) = linkset.first() else {
            return Err(ValidationError::EmptyLinkset { index });
        };

        for (slot, id) in linkset.iter().enumerate() {
            if !seen.insert(*id) {
                return Err(ValidationError::DuplicatePrim { id: *id });
            }
            let prim = manifest
                .prims
                .get(id)
                .ok_or(ValidationError::MissingPrim { index, id: *id })?;

            match (slot, prim.parent) {
                (0, Some(_)) => return Err(ValidationError::RootHasParent { id: *id }),
                (0, None) => {}
                (_, parent) if parent != Some(*root) => {
                    return Err(ValidationError::WrongParent { id: *id, root: *root });
                }
                _ => {}
            }

            for item in &prim.content {
                if !manifest.inventory.contains_key(item) {
                    return Err(ValidationError::MissingInventory { prim: *id, item: *item });
                }
            }
        }
    }

    Ok(())
}

/// Asset ids referenced by prims or inventory but missing from the asset
/// table, in id order.
pub fn unresolved_assets(manifest: &ExportManifest) -> Vec<Id> {
    manifest
        .referenced_assets()
        .into_iter()
        .filter(|id| !manifest.assets.contains_key(id))
        .collect()
}

/// Structural checks plus full asset resolution.
pub fn validate_complete(manifest: &ExportManifest) -> Result<(), ValidationError> {
    validate_manifest(manifest)?;
    match unresolved_assets(manifest).first() {
        Some(id) => Err(ValidationError::UnresolvedAsset { id: *id }),
        None => Ok(()),
    }
}
