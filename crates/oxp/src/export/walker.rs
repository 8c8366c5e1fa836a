//! Per-prim serialization and texture dependency discovery.
//!
//! The walker turns a live prim into the record an archive stores. Every
//! texture the record references is run through the export policy once per
//! operation; refused textures are replaced by defaults so the archive never
//! carries an id it may not carry.

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::model::id::{DEFAULT_TEXTURE_ID, is_library_texture};
use crate::model::{Id, NIL_ID, PrimRecord, SculptParams};
use crate::policy::{AssetDirectory, ExportPolicy, GridKind, PrimSnapshot};

/// A texture the walker approved that still has to be downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureFetch {
    pub id: Id,
    pub name: String,
    pub description: String,
}

/// Output of [`AssetDependencyWalker::serialize_prim`].
#[derive(Debug, Clone, PartialEq)]
pub struct SerializedPrim {
    pub record: PrimRecord,
    /// False when the policy refused the prim and `record` is a placeholder.
    pub exportable: bool,
}

#[derive(Debug)]
pub struct AssetDependencyWalker {
    policy: ExportPolicy,
    decisions: FxHashMap<Id, bool>,
    fetches: Vec<TextureFetch>,
}

impl AssetDependencyWalker {
    pub fn new(policy: ExportPolicy) -> Self {
        Self {
            policy,
            decisions: FxHashMap::default(),
            fetches: Vec::new(),
        }
    }

    pub fn policy(&self) -> &ExportPolicy {
        &self.policy
    }

    /// Number of distinct textures checked so far.
    pub fn checked_textures(&self) -> usize {
        self.decisions.len()
    }

    /// Decides whether a texture may be exported. The first approval of a
    /// texture that is not shipped with the client queues a fetch, see
    /// [`take_fetches`](Self::take_fetches).
    pub fn export_texture(&mut self, id: &Id, directory: &dyn AssetDirectory) -> bool {
        if id.is_nil() {
            return false;
        }
        if let Some(&decision) = self.decisions.get(id) {
            return decision;
        }

        let (decision, fetch) = if is_library_texture(id) || directory.is_static_asset(id) {
            (true, None)
        } else if self.policy.grid == GridKind::Managed && directory.texture_author(id) == Some(self.policy.agent_id) {
            (true, Some((String::new(), String::new())))
        } else {
            let verdict = self.policy.can_export_asset(id, directory);
            if verdict.exportable {
                (true, Some((verdict.name, verdict.description)))
            } else {
                debug!(texture = %id, "texture fails export check");
                (false, None)
            }
        };

        self.decisions.insert(*id, decision);
        if let Some((name, description)) = fetch {
            self.fetches.push(TextureFetch {
                id: *id,
                name,
                description,
            });
        }
        decision
    }

    /// Drains the fetches queued since the last call.
    pub fn take_fetches(&mut self) -> Vec<TextureFetch> {
        std::mem::take(&mut self.fetches)
    }

    /// Produces the archive record for `prim`.
    ///
    /// `parent` is the linkset root for children and `None` for roots. A
    /// refused prim keeps only its transform and link structure. Content is
    /// left empty; it is filled in as inventory arrives.
    pub fn serialize_prim(&mut self, prim: &PrimSnapshot, parent: Option<Id>, directory: &dyn AssetDirectory) -> SerializedPrim {
        let params = &prim.params;
        let attachment_point = if parent.is_none() { params.attachment_point } else { None };

        if !self.policy.can_export_prim(Some(prim), directory) {
            return SerializedPrim {
                record: PrimRecord::placeholder(params.position, params.scale, params.rotation, parent, attachment_point),
                exportable: false,
            };
        }

        let mut record = params.clone();
        record.parent = parent;
        record.attachment_point = attachment_point;
        record.content.clear();

        for face in &mut record.textures {
            if !face.image_id.is_nil() && !self.export_texture(&face.image_id, directory) {
                face.image_id = DEFAULT_TEXTURE_ID;
            }
        }

        record.materials.retain(|material| {
            let maps: Vec<Id> = material.maps().collect();
            maps.iter().all(|map| self.export_texture(map, directory))
        });

        if let Some(sculpt) = record.sculpt.as_mut() {
            if !sculpt.is_mesh() && !self.export_texture(&sculpt.texture, directory) {
                debug!(prim = %prim.id, "sculpt map replaced by default");
                *sculpt = SculptParams::default();
            }
        }

        if let Some(image) = record.light_image.as_mut() {
            if !image.texture.is_nil() && !self.export_texture(&image.texture, directory) {
                image.texture = NIL_ID;
            }
        }

        if let Some(particles) = record.particles.as_mut() {
            if !particles.image.is_nil() && !self.export_texture(&particles.image, directory) {
                particles.image = NIL_ID;
            }
        }

        SerializedPrim {
            record,
            exportable: true,
        }
    }
}
