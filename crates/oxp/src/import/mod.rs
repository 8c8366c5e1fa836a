//! Rebuilding linksets from archives.
//!
//! An import reads and validates an archive into an [`ImportPlan`], then,
//! once started, re-uploads the archived assets one at a time
//! ([`AssetRehydrator`]) and recreates the prims linkset by linkset
//! ([`ObjectRehydrator`]). Like export, it never performs I/O itself: the
//! host carries out requests and reports completions through the `on_*`
//! methods of [`ImportOperation`].

pub mod objects;
pub mod reader;
pub mod remap;
pub mod session;
pub mod uploader;

use std::time::Instant;

pub use objects::{BuildPhase, ObjectRehydrator};
pub use reader::{ImportPlan, ImportSummary, UploadQueues};
pub use remap::RemapTable;
pub use session::{ImportOperation, ImportState};
pub use uploader::AssetRehydrator;

use crate::config::ScriptTarget;
use crate::error::{ImportError, SkippedContent};
use crate::model::{
    AssetType, FaceMaterial, FlexibleParams, Id, InventoryType, LightImageParams, LightParams, ParticleParams,
    PhysicsParams, Quaternion, SaleInfo, SculptParams, TextureEntry, Vector3, VolumeParams,
};

// =============================================================================
// UPLOADS
// =============================================================================

/// Optional server features an upload may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Two-step upload of a new asset.
    NewAssetUpload,
    /// Upload of a free, session-scoped texture.
    TemporaryUpload,
}

/// How an upload reaches the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadTransport {
    NewAsset,
    Temporary,
    /// Store by transaction id, used when the upload capability is missing.
    LegacyStore { temporary: bool },
    UpdateNotecard { item_id: Id },
    UpdateScript { item_id: Id, target: ScriptTarget },
    UpdateGesture { item_id: Id },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    /// Asset id in the archive. Completions are reported under this id.
    pub old_asset_id: Id,
    pub transaction_id: Id,
    pub asset_type: AssetType,
    pub inventory_type: InventoryType,
    pub name: String,
    pub description: String,
    pub data: Vec<u8>,
    pub transport: UploadTransport,
    /// Wearable type code, for clothing and body parts.
    pub wearable_type: Option<u32>,
    pub next_owner_mask: u32,
    /// Id the grid derives for a store keyed by transaction. Set for legacy
    /// and temporary stores, whose payload is kept under this id.
    pub expected_asset_id: Option<Id>,
}

/// Creates the inventory item a notecard, script or gesture payload is
/// pushed into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateItemRequest {
    pub old_asset_id: Id,
    pub transaction_id: Id,
    pub asset_type: AssetType,
    pub inventory_type: InventoryType,
    pub name: String,
    pub description: String,
    pub next_owner_mask: u32,
}

/// Upload side of the host.
pub trait AssetUploader {
    fn secure_session_id(&self) -> Id;

    fn has_capability(&self, capability: Capability) -> bool;

    /// Price of one texture, sound or animation upload.
    fn upload_price(&self) -> u32;

    fn balance(&self) -> i64;

    /// Answered with [`ImportOperation::on_item_created`].
    fn create_inventory_item(&mut self, request: &CreateItemRequest);

    /// Answered with [`ImportOperation::on_upload_complete`], carrying the
    /// asset id the grid assigned.
    fn upload(&mut self, request: &UploadRequest);

    /// Offers the user to buy the missing currency.
    fn prompt_buy_currency(&mut self, cost: u32);
}

// =============================================================================
// OBJECTS
// =============================================================================

/// An object the host created, with its region-local handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CreatedObject {
    pub id: Id,
    pub local_id: u32,
}

/// Creates one prim. Answered with [`ImportOperation::on_object_created`].
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectCreateRequest {
    /// The prim's id in the archive.
    pub archive_id: Id,
    pub position: Vector3,
    pub rotation: Quaternion,
    pub scale: Vector3,
    pub volume: VolumeParams,
    pub material: u8,
    pub flags: u32,
    pub is_root: bool,
}

/// Permission masks applied to created objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionChange {
    pub group_mask: u32,
    pub everyone_mask: u32,
    pub next_owner_mask: u32,
}

/// A follow-up applied to a created object.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectUpdate {
    Select,
    Deselect,
    /// Authoritative transform once the object exists.
    Placement {
        position: Vector3,
        rotation: Quaternion,
        scale: Vector3,
    },
    /// Absolute region position of a finished root.
    RegionPosition(Vector3),
    Textures(Vec<TextureEntry>),
    Materials(Vec<FaceMaterial>),
    Sculpt(SculptParams),
    Flexible(FlexibleParams),
    Light(LightParams),
    LightImage(LightImageParams),
    Particles(ParticleParams),
    ClickAction(u8),
    Name(String),
    Description(String),
    Permissions(PermissionChange),
    SaleInfo(SaleInfo),
    Physics(PhysicsParams),
}

/// Object side of the host.
pub trait ObjectBuilder {
    fn agent_position(&self) -> Vector3;

    fn agent_rotation(&self) -> Quaternion;

    fn region_supports_physics_shapes(&self) -> bool {
        true
    }

    /// False once the object has been deleted or left view.
    fn object_exists(&self, id: &Id) -> bool;

    /// An item in the agent's inventory whose payload is `asset_id`.
    fn find_inventory_item(&self, asset_id: &Id) -> Option<Id>;

    fn create_object(&mut self, request: &ObjectCreateRequest);

    fn update_object(&mut self, object: &CreatedObject, update: &ObjectUpdate);

    fn drop_inventory(&mut self, object: &CreatedObject, item_id: &Id);

    fn drop_script(&mut self, object: &CreatedObject, item_id: &Id);

    /// Links `objects`, the first becoming the root.
    fn link(&mut self, objects: &[CreatedObject]);

    /// Roots currently selected. Linking has completed once this drops
    /// below two.
    fn selected_root_count(&self) -> usize;

    fn attach(&mut self, object: &CreatedObject, attachment_point: u8);
}

// =============================================================================
// HOST
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportProgress {
    Uploading {
        index: usize,
        total: usize,
    },
    Building {
        linkset: usize,
        linksets: usize,
        prim: usize,
        prims: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImportReport {
    pub uploaded: usize,
    pub linksets: usize,
    pub objects_created: usize,
    pub items_dropped: usize,
    pub skipped: Vec<SkippedContent>,
}

/// Everything an import needs from the embedding application.
pub trait ImportHost: AssetUploader + ObjectBuilder {
    fn now(&self) -> Instant;

    fn is_connected(&self) -> bool {
        true
    }

    fn progress(&mut self, _progress: &ImportProgress) {}

    fn finished(&mut self, report: &ImportReport);

    fn failed(&mut self, error: &ImportError);
}

#[cfg(test)]
pub(crate) mod testing {
    //! A host that records every request and answers queries from fields.

    use std::time::Instant;

    use rustc_hash::{FxHashMap, FxHashSet};
    use uuid::Uuid;

    use super::*;

    pub(crate) struct RecordingHost {
        pub now: Instant,
        pub connected: bool,
        pub session: Id,
        pub capabilities: Vec<Capability>,
        pub price: u32,
        pub balance: i64,
        pub item_requests: Vec<CreateItemRequest>,
        pub uploads: Vec<UploadRequest>,
        pub prompts: Vec<u32>,

        pub agent_position: Vector3,
        pub agent_rotation: Quaternion,
        pub physics_shapes: bool,
        pub objects: FxHashSet<Id>,
        /// Asset id to item id, for live inventory searches.
        pub inventory: FxHashMap<Id, Id>,
        pub created: Vec<ObjectCreateRequest>,
        pub updates: Vec<(CreatedObject, ObjectUpdate)>,
        pub drops: Vec<(CreatedObject, Id, bool)>,
        pub links: Vec<Vec<CreatedObject>>,
        /// When true a link request completes at once.
        pub instant_link: bool,
        pub selected_roots: usize,
        pub attached: Vec<(CreatedObject, u8)>,

        pub progress: Vec<ImportProgress>,
        pub finished: Vec<ImportReport>,
        pub failed: usize,
        next_local_id: u32,
    }

    impl RecordingHost {
        pub fn new() -> Self {
            Self {
                now: Instant::now(),
                connected: true,
                session: Uuid::from_u128(0x5e55_1011),
                capabilities: vec![Capability::NewAssetUpload, Capability::TemporaryUpload],
                price: 10,
                balance: 1_000,
                item_requests: Vec::new(),
                uploads: Vec::new(),
                prompts: Vec::new(),
                agent_position: Vector3::new(128.0, 128.0, 25.0),
                agent_rotation: Quaternion::IDENTITY,
                physics_shapes: true,
                objects: FxHashSet::default(),
                inventory: FxHashMap::default(),
                created: Vec::new(),
                updates: Vec::new(),
                drops: Vec::new(),
                links: Vec::new(),
                instant_link: true,
                selected_roots: 0,
                attached: Vec::new(),
                progress: Vec::new(),
                finished: Vec::new(),
                failed: 0,
                next_local_id: 1,
            }
        }

        /// Makes a new object exist, as the region would on creation.
        pub fn spawn(&mut self) -> CreatedObject {
            let object = CreatedObject {
                id: Uuid::new_v4(),
                local_id: self.next_local_id,
            };
            self.next_local_id += 1;
            self.objects.insert(object.id);
            object
        }

        pub fn updates_for(&self, object: &CreatedObject) -> Vec<&ObjectUpdate> {
            self.updates
                .iter()
                .filter(|(o, _)| o == object)
                .map(|(_, u)| u)
                .collect()
        }
    }

    impl AssetUploader for RecordingHost {
        fn secure_session_id(&self) -> Id {
            self.session
        }
        fn has_capability(&self, capability: Capability) -> bool {
            self.capabilities.contains(&capability)
        }
        fn upload_price(&self) -> u32 {
            self.price
        }
        fn balance(&self) -> i64 {
            self.balance
        }
        fn create_inventory_item(&mut self, request: &CreateItemRequest) {
            self.item_requests.push(request.clone());
        }
        fn upload(&mut self, request: &UploadRequest) {
            self.uploads.push(request.clone());
        }
        fn prompt_buy_currency(&mut self, cost: u32) {
            self.prompts.push(cost);
        }
    }

    impl ObjectBuilder for RecordingHost {
        fn agent_position(&self) -> Vector3 {
            self.agent_position
        }
        fn agent_rotation(&self) -> Quaternion {
            self.agent_rotation
        }
        fn region_supports_physics_shapes(&self) -> bool {
            self.physics_shapes
        }
        fn object_exists(&self, id: &Id) -> bool {
            self.objects.contains(id)
        }
        fn find_inventory_item(&self, asset_id: &Id) -> Option<Id> {
            self.inventory.get(asset_id).copied()
        }
        fn create_object(&mut self, request: &ObjectCreateRequest) {
            self.created.push(request.clone());
        }
        fn update_object(&mut self, object: &CreatedObject, update: &ObjectUpdate) {
            self.updates.push((*object, update.clone()));
        }
        fn drop_inventory(&mut self, object: &CreatedObject, item_id: &Id) {
            self.drops.push((*object, *item_id, false));
        }
        fn drop_script(&mut self, object: &CreatedObject, item_id: &Id) {
            self.drops.push((*object, *item_id, true));
        }
        fn link(&mut self, objects: &[CreatedObject]) {
            self.links.push(objects.to_vec());
            self.selected_roots = if self.instant_link { 1 } else { objects.len() };
        }
        fn selected_root_count(&self) -> usize {
            self.selected_roots
        }
        fn attach(&mut self, object: &CreatedObject, attachment_point: u8) {
            self.attached.push((*object, attachment_point));
        }
    }

    impl ImportHost for RecordingHost {
        fn now(&self) -> Instant {
            self.now
        }
        fn is_connected(&self) -> bool {
            self.connected
        }
        fn progress(&mut self, progress: &ImportProgress) {
            self.progress.push(*progress);
        }
        fn finished(&mut self, report: &ImportReport) {
            self.finished.push(report.clone());
        }
        fn failed(&mut self, _error: &ImportError) {
            self.failed += 1;
        }
    }
}
