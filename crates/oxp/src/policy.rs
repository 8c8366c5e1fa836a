//! Export permission policy.
//!
//! Pure predicates deciding whether the requesting agent may export a prim,
//! an asset or an inventory item. Nothing here performs I/O; inventory and
//! asset metadata come from an [`AssetDirectory`] supplied by the host.
//! Missing data always means "no".

use tracing::debug;
use uuid::Uuid;

use crate::model::{Id, InventoryRecord, Permissions, PrimRecord};

/// Creator allowed to hand out oversized prims on the managed grid.
pub const MEGAPRIM_CREATOR_ID: Id = Uuid::from_u128(0x7ffd02d0_12f4_48b4_9640_695708fd4ae4);

/// Default largest prim scale the region permits on any axis.
pub const DEFAULT_MAX_PRIM_SCALE: f32 = 64.0;

/// How an alternate grid treats exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportPolicyMode {
    /// The grid sets an explicit export permission bit.
    Allowed,
    /// The grid has no export bit; full permissions stand in for it.
    Undefined,
    /// Only the creator may export.
    Denied,
}

/// The grid the agent is connected to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridKind {
    Managed,
    Alternate(ExportPolicyMode),
}

/// Archive flavour being produced. Mesh handling differs between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArchiveFormat {
    #[default]
    Oxp,
    Collada,
}

/// Read-only metadata the policy and walker need from the host.
pub trait AssetDirectory {
    /// Inventory items (agent inventory or loaded object contents) whose
    /// payload is `asset_id`.
    fn items_with_asset(&self, asset_id: &Id) -> Vec<InventoryRecord>;

    /// Author marker embedded in a cached texture's comment, if the texture
    /// is cached and carries one.
    fn texture_author(&self, texture_id: &Id) -> Option<Id>;

    /// Creator recorded in a mesh asset header, if the header is loaded.
    fn mesh_creator(&self, mesh_id: &Id) -> Option<Id>;

    /// Returns true if the asset ships with the client and never needs
    /// fetching.
    fn is_static_asset(&self, _asset_id: &Id) -> bool {
        false
    }
}

/// A prim as the host currently sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimSnapshot {
    pub id: Id,
    /// Live parameters. `permissions` is `None` until the host has them.
    pub params: PrimRecord,
}

/// Outcome of [`ExportPolicy::can_export_asset`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AssetVerdict {
    pub exportable: bool,
    /// Name of the first inventory item holding the asset.
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportPolicy {
    pub agent_id: Id,
    pub grid: GridKind,
    pub format: ArchiveFormat,
    pub region_max_prim_scale: f32,
    pub privileged_creators: Vec<Id>,
}

impl ExportPolicy {
    pub fn new(agent_id: Id, grid: GridKind) -> Self {
        Self {
            agent_id,
            grid,
            format: ArchiveFormat::Oxp,
            region_max_prim_scale: DEFAULT_MAX_PRIM_SCALE,
            privileged_creators: vec![MEGAPRIM_CREATOR_ID],
        }
    }

    pub fn with_format(mut self, format: ArchiveFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_max_prim_scale(mut self, scale: f32) -> Self {
        self.region_max_prim_scale = scale;
        self
    }

    /// Decides whether a prim may be exported with its full parameters.
    pub fn can_export_prim(&self, prim: Option<&PrimSnapshot>, directory: &dyn AssetDirectory) -> bool {
        let Some(prim) = prim else {
            return false;
        };
        let Some(perms) = prim.params.permissions.as_ref() else {
            debug!(prim = %prim.id, "no permissions known, refusing export");
            return false;
        };

        let owner_ok = match self.grid {
            GridKind::Managed => {
                perms.is_owned_by(&self.agent_id)
                    && (perms.is_created_by(&self.agent_id) || self.is_privileged_megaprim(prim, perms))
            }
            GridKind::Alternate(mode) => self.object_mode_check(mode, perms),
        };
        if !owner_ok {
            debug!(prim = %prim.id, "prim fails ownership check");
            return false;
        }

        match prim.params.sculpt.as_ref() {
            Some(sculpt) if sculpt.is_mesh() => match self.format {
                ArchiveFormat::Oxp => {
                    debug!(prim = %prim.id, "mesh prims cannot be archived");
                    false
                }
                ArchiveFormat::Collada => directory.mesh_creator(&sculpt.texture) == Some(self.agent_id),
            },
            Some(sculpt) => {
                let ok = self.sculpt_map_ok(&sculpt.texture, directory);
                if !ok {
                    debug!(prim = %prim.id, sculpt = %sculpt.texture, "sculpt map fails creator check");
                }
                ok
            }
            None => true,
        }
    }

    /// Decides whether a standalone asset may be exported, judging by the
    /// inventory items that hold it.
    pub fn can_export_asset(&self, asset_id: &Id, directory: &dyn AssetDirectory) -> AssetVerdict {
        if asset_id.is_nil() {
            return AssetVerdict::default();
        }
        let items = directory.items_with_asset(asset_id);
        let Some(first) = items.first() else {
            debug!(asset = %asset_id, "no inventory item holds asset");
            return AssetVerdict::default();
        };
        AssetVerdict {
            exportable: items.iter().any(|item| self.can_export_item(&item.permissions)),
            name: first.name.clone(),
            description: first.description.clone(),
        }
    }

    /// Decides whether an inventory item may be exported.
    pub fn can_export_item(&self, perms: &Permissions) -> bool {
        match self.grid {
            GridKind::Managed => perms.is_created_by(&self.agent_id),
            GridKind::Alternate(ExportPolicyMode::Allowed) => perms.allow_export_by(&self.agent_id),
            GridKind::Alternate(ExportPolicyMode::Undefined) => perms.base_has_full_perm(),
            GridKind::Alternate(ExportPolicyMode::Denied) => perms.is_created_by(&self.agent_id),
        }
    }

    fn object_mode_check(&self, mode: ExportPolicyMode, perms: &Permissions) -> bool {
        match mode {
            ExportPolicyMode::Allowed => perms.allow_export_by(&self.agent_id),
            ExportPolicyMode::Undefined => perms.is_owned_by(&self.agent_id) && perms.owner_has_full_perm(),
            ExportPolicyMode::Denied => {
                perms.is_owned_by(&self.agent_id) && perms.is_created_by(&self.agent_id)
            }
        }
    }

    fn is_privileged_megaprim(&self, prim: &PrimSnapshot, perms: &Permissions) -> bool {
        prim.params.scale.max_component() > self.region_max_prim_scale
            && self.privileged_creators.contains(&perms.creator)
    }

    fn sculpt_map_ok(&self, sculpt_id: &Id, directory: &dyn AssetDirectory) -> bool {
        if self.grid == GridKind::Managed && directory.texture_author(sculpt_id) == Some(self.agent_id) {
            return true;
        }
        self.can_export_asset(sculpt_id, directory).exportable
    }
}
