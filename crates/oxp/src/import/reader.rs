//! Reading an archive into an import plan.
//!
//! The plan holds the validated manifest and the upload queues derived from
//! it. Building a plan talks to no host, so a bad or too-new archive is
//! rejected before a single request is made.

use std::collections::VecDeque;
use std::fmt;
use std::path::Path;

use rustc_hash::FxHashSet;
use tracing::{debug, info};

use crate::codec::{decode_manifest, read_archive};
use crate::composite::{discover_references, is_composite};
use crate::error::ImportError;
use crate::limits::FORMAT_VERSION;
use crate::model::{AssetType, ExportManifest, Id, ManifestHeader};
use crate::validate::validate_manifest;

/// Four de-duplicated, insertion-ordered upload queues.
///
/// [`pop_next`](Self::pop_next) drains them in strict priority: textures,
/// sounds, animations, then everything else. Composite payloads always sit
/// in the last queue, so the assets they reference are uploaded first.
#[derive(Debug, Clone, Default)]
pub struct UploadQueues {
    textures: VecDeque<Id>,
    sounds: VecDeque<Id>,
    animations: VecDeque<Id>,
    generic: VecDeque<Id>,
    queued: FxHashSet<Id>,
}

impl UploadQueues {
    /// Queues every archived asset referenced by a prim, by an item a prim
    /// holds, or by a composite payload among those items. Ids without an
    /// archived payload are left out.
    pub fn build(manifest: &ExportManifest) -> Self {
        let mut queues = Self::default();
        for id in manifest.linksets.iter().flatten() {
            let Some(prim) = manifest.prims.get(id) else {
                continue;
            };
            for texture in prim.texture_refs() {
                queues.queue(manifest, texture);
            }
            for item_id in &prim.content {
                let Some(record) = manifest.inventory.get(item_id) else {
                    continue;
                };
                let Some(blob) = manifest.assets.get(&record.asset_id) else {
                    debug!(item = %item_id, asset = %record.asset_id, "item payload not in archive");
                    continue;
                };
                if is_composite(blob.asset_type) {
                    for reference in discover_references(blob.asset_type, &blob.data) {
                        queues.queue(manifest, reference.id);
                    }
                }
                queues.queue(manifest, record.asset_id);
            }
        }
        queues
    }

    fn queue(&mut self, manifest: &ExportManifest, id: Id) {
        let Some(blob) = manifest.assets.get(&id) else {
            return;
        };
        if !self.queued.insert(id) {
            return;
        }
        match blob.asset_type {
            AssetType::Texture => self.textures.push_back(id),
            AssetType::Sound => self.sounds.push_back(id),
            AssetType::Animation => self.animations.push_back(id),
            _ => self.generic.push_back(id),
        }
    }

    /// Next asset to upload, highest priority first.
    pub fn pop_next(&mut self) -> Option<Id> {
        self.textures
            .pop_front()
            .or_else(|| self.sounds.pop_front())
            .or_else(|| self.animations.pop_front())
            .or_else(|| self.generic.pop_front())
    }

    pub fn textures(&self) -> usize {
        self.textures.len()
    }

    pub fn sounds(&self) -> usize {
        self.sounds.len()
    }

    pub fn animations(&self) -> usize {
        self.animations.len()
    }

    pub fn generic(&self) -> usize {
        self.generic.len()
    }

    /// Queued uploads charged the per-upload price.
    pub fn paid_uploads(&self) -> usize {
        self.textures.len() + self.sounds.len() + self.animations.len()
    }

    pub fn len(&self) -> usize {
        self.paid_uploads() + self.generic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What an archive contains, for display before importing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImportSummary {
    pub header: ManifestHeader,
    pub format_version: u32,
    pub linksets: usize,
    pub prims: usize,
    pub inventory_items: usize,
    pub textures: usize,
    pub sounds: usize,
    pub animations: usize,
    pub generic: usize,
}

impl ImportSummary {
    pub fn paid_uploads(&self) -> usize {
        self.textures + self.sounds + self.animations
    }

    pub fn total_uploads(&self) -> usize {
        self.paid_uploads() + self.generic
    }
}

impl fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} {} archive v{}, by {} on {} ({})",
            self.header.client,
            self.header.client_version,
            self.format_version,
            self.header.author,
            self.header.creation_date,
            self.header.grid
        )?;
        writeln!(
            f,
            "  {} linksets, {} prims, {} inventory items",
            self.linksets, self.prims, self.inventory_items
        )?;
        write!(
            f,
            "  uploads: {} textures, {} sounds, {} animations, {} other",
            self.textures, self.sounds, self.animations, self.generic
        )
    }
}

/// A validated archive ready to import.
#[derive(Debug, Clone)]
pub struct ImportPlan {
    manifest: ExportManifest,
    queues: UploadQueues,
    summary: ImportSummary,
}

impl ImportPlan {
    /// Reads the archive at `path`.
    pub fn open(path: &Path) -> Result<Self, ImportError> {
        let manifest = read_archive(path)?;
        info!(path = %path.display(), "archive read");
        Self::from_manifest(manifest)
    }

    /// Decodes an archive held in memory, compressed or not.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ImportError> {
        Self::from_manifest(decode_manifest(bytes)?)
    }

    pub fn from_manifest(manifest: ExportManifest) -> Result<Self, ImportError> {
        if manifest.format_version > FORMAT_VERSION {
            return Err(ImportError::UnsupportedVersion {
                found: manifest.format_version,
                supported: FORMAT_VERSION,
            });
        }
        validate_manifest(&manifest)?;

        let queues = UploadQueues::build(&manifest);
        let summary = ImportSummary {
            header: manifest.header.clone(),
            format_version: manifest.format_version,
            linksets: manifest.linksets.len(),
            prims: manifest.prim_count(),
            inventory_items: manifest.inventory.len(),
            textures: queues.textures(),
            sounds: queues.sounds(),
            animations: queues.animations(),
            generic: queues.generic(),
        };
        debug!(
            linksets = summary.linksets,
            prims = summary.prims,
            uploads = summary.total_uploads(),
            "import plan built"
        );

        Ok(Self {
            manifest,
            queues,
            summary,
        })
    }

    pub fn manifest(&self) -> &ExportManifest {
        &self.manifest
    }

    pub fn queues(&self) -> &UploadQueues {
        &self.queues
    }

    pub fn summary(&self) -> &ImportSummary {
        &self.summary
    }

    pub fn into_parts(self) -> (ExportManifest, UploadQueues, ImportSummary) {
        (self.manifest, self.queues, self.summary)
    }
}
