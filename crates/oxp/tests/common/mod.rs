//! In-memory hosts standing in for the grid on both sides of an archive.

#![allow(dead_code)]

use std::mem;
use std::time::{Duration, Instant};

use oxp::export::{AssetRequest, ExportHost, ExportProgress, FetchedAsset};
use oxp::import::{
    AssetUploader, Capability, CreateItemRequest, CreatedObject, ImportProgress, ObjectBuilder, ObjectCreateRequest,
    ObjectUpdate, UploadRequest, UploadTransport,
};
use oxp::model::{AssetType, Permissions, Quaternion, Vector3};
use oxp::{
    AssetDirectory, ExportError, ExportOperation, ExportReport, Id, ImportError, ImportHost, ImportOperation,
    ImportReport, ImportState, InventoryRecord,
};
use rustc_hash::{FxHashMap, FxHashSet};
use uuid::Uuid;

pub const AGENT: Id = Uuid::from_u128(0xa9e47);
pub const STRANGER: Id = Uuid::from_u128(0x5742);

/// The source region: live objects, their contents and asset payloads.
pub struct SourceGrid {
    pub now: Instant,
    /// Agent inventory, by asset id.
    pub items: FxHashMap<Id, Vec<InventoryRecord>>,
    /// Object contents, by object id.
    pub contents: FxHashMap<Id, Vec<InventoryRecord>>,
    pub payloads: FxHashMap<Id, Vec<u8>>,
    pub inventory_requests: Vec<Id>,
    pub texture_requests: Vec<Id>,
    pub asset_requests: Vec<AssetRequest>,
    pub progress: Vec<ExportProgress>,
    pub finished: Vec<ExportReport>,
    pub failed: usize,
}

impl SourceGrid {
    pub fn new() -> Self {
        Self {
            now: Instant::now(),
            items: FxHashMap::default(),
            contents: FxHashMap::default(),
            payloads: FxHashMap::default(),
            inventory_requests: Vec::new(),
            texture_requests: Vec::new(),
            asset_requests: Vec::new(),
            progress: Vec::new(),
            finished: Vec::new(),
            failed: 0,
        }
    }

    /// Puts an asset the agent created into inventory, with its payload.
    pub fn own(&mut self, asset: Id, asset_type: AssetType, name: &str, data: Vec<u8>) {
        let item = InventoryRecord::new(Uuid::new_v4(), name, asset_type, asset, Permissions::created_by(AGENT));
        self.items.entry(asset).or_default().push(item);
        self.payloads.insert(asset, data);
    }

    /// Answers every outstanding request until the export stops asking.
    pub fn serve(&mut self, op: &mut ExportOperation) {
        loop {
            let inventory = mem::take(&mut self.inventory_requests);
            let assets = mem::take(&mut self.asset_requests);
            let textures = mem::take(&mut self.texture_requests);
            if inventory.is_empty() && assets.is_empty() && textures.is_empty() {
                return;
            }
            for object_id in inventory {
                let items = self.contents.get(&object_id).cloned().unwrap_or_default();
                op.on_inventory(self, &object_id, items);
            }
            for request in assets {
                let result = self
                    .payloads
                    .get(&request.asset_id)
                    .map(|data| FetchedAsset::new(request.asset_id, data.clone()))
                    .ok_or(oxp::FailureKind::NotFound);
                op.on_asset(self, &request.key, result);
            }
            for texture_id in textures {
                let result = self.payloads.get(&texture_id).cloned().ok_or(oxp::FailureKind::NotFound);
                op.on_texture(self, &texture_id, result);
            }
        }
    }
}

impl AssetDirectory for SourceGrid {
    fn items_with_asset(&self, asset_id: &Id) -> Vec<InventoryRecord> {
        self.items.get(asset_id).cloned().unwrap_or_default()
    }
    fn texture_author(&self, _texture_id: &Id) -> Option<Id> {
        None
    }
    fn mesh_creator(&self, _mesh_id: &Id) -> Option<Id> {
        None
    }
}

impl ExportHost for SourceGrid {
    fn now(&self) -> Instant {
        self.now
    }
    fn request_inventory(&mut self, object_id: &Id) {
        self.inventory_requests.push(*object_id);
    }
    fn request_texture(&mut self, texture_id: &Id) {
        self.texture_requests.push(*texture_id);
    }
    fn request_asset(&mut self, request: &AssetRequest) {
        self.asset_requests.push(request.clone());
    }
    fn progress(&mut self, progress: &ExportProgress) {
        self.progress.push(*progress);
    }
    fn finished(&mut self, report: &ExportReport) {
        self.finished.push(report.clone());
    }
    fn failed(&mut self, _error: &ExportError) {
        self.failed += 1;
    }
}

/// The destination region, answering every request successfully.
pub struct TargetGrid {
    pub now: Instant,
    pub session: Id,
    pub price: u32,
    pub balance: i64,
    pub capabilities: Vec<Capability>,
    pub agent_position: Vector3,
    pub item_requests: Vec<CreateItemRequest>,
    pub uploads: Vec<UploadRequest>,
    pub prompts: Vec<u32>,
    pub objects: FxHashSet<Id>,
    pub inventory: FxHashMap<Id, Id>,
    pub created: Vec<(ObjectCreateRequest, CreatedObject)>,
    pub updates: Vec<(CreatedObject, ObjectUpdate)>,
    pub drops: Vec<(CreatedObject, Id)>,
    pub links: Vec<Vec<CreatedObject>>,
    /// Asset ids this grid handed out, by archive id.
    pub assigned: FxHashMap<Id, Id>,
    selected_roots: usize,
    pending_items: Vec<Id>,
    pending_uploads: Vec<Id>,
    pending_objects: Vec<ObjectCreateRequest>,
    pub progress: Vec<ImportProgress>,
    pub finished: Vec<ImportReport>,
    pub failed: usize,
}

impl TargetGrid {
    pub fn new() -> Self {
        Self {
            now: Instant::now(),
            session: Uuid::from_u128(0x5e55_1011),
            price: 10,
            balance: 1_000,
            capabilities: vec![Capability::NewAssetUpload, Capability::TemporaryUpload],
            agent_position: Vector3::new(128.0, 128.0, 25.0),
            item_requests: Vec::new(),
            uploads: Vec::new(),
            prompts: Vec::new(),
            objects: FxHashSet::default(),
            inventory: FxHashMap::default(),
            created: Vec::new(),
            updates: Vec::new(),
            drops: Vec::new(),
            links: Vec::new(),
            assigned: FxHashMap::default(),
            selected_roots: 0,
            pending_items: Vec::new(),
            pending_uploads: Vec::new(),
            pending_objects: Vec::new(),
            progress: Vec::new(),
            finished: Vec::new(),
            failed: 0,
        }
    }

    /// Total requests of any kind sent to this grid.
    pub fn requests(&self) -> usize {
        self.item_requests.len() + self.uploads.len() + self.created.len() + self.pending_objects.len()
    }

    /// Completes requests and advances time until the import is finished.
    pub fn serve(&mut self, op: &mut ImportOperation) {
        for _ in 0..10_000 {
            if op.state() != ImportState::Uploading && op.state() != ImportState::Building {
                return;
            }
            if let Some(old) = self.pending_items.pop() {
                let item = Uuid::new_v4();
                op.on_item_created(self, &old, Ok(item));
            } else if let Some(old) = self.pending_uploads.pop() {
                let new_id = self.assigned[&old];
                op.on_upload_complete(self, &old, Ok(new_id));
            } else if let Some(request) = self.pending_objects.pop() {
                let object = CreatedObject {
                    id: Uuid::new_v4(),
                    local_id: self.created.len() as u32 + 1,
                };
                self.objects.insert(object.id);
                self.created.push((request, object));
                op.on_object_created(self, object);
            } else {
                self.now += Duration::from_secs(1);
                op.tick(self);
            }
        }
        panic!("import did not finish");
    }

    pub fn upload_for(&self, old: &Id) -> Option<&UploadRequest> {
        self.uploads.iter().find(|u| u.old_asset_id == *old)
    }

    /// The id the grid assigned to the re-upload of `old`.
    pub fn new_id_of(&self, old: &Id) -> Option<Id> {
        self.assigned.get(old).copied()
    }

    pub fn updates_for(&self, object: &CreatedObject) -> Vec<&ObjectUpdate> {
        self.updates
            .iter()
            .filter(|(o, _)| o == object)
            .map(|(_, u)| u)
            .collect()
    }
}

impl AssetUploader for TargetGrid {
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
        self.pending_items.push(request.old_asset_id);
    }
    fn upload(&mut self, request: &UploadRequest) {
        // keyed stores land where the transaction says; everything else gets a fresh id
        let new_id = request.expected_asset_id.unwrap_or_else(Uuid::new_v4);
        self.assigned.insert(request.old_asset_id, new_id);
        if let UploadTransport::UpdateNotecard { item_id }
        | UploadTransport::UpdateScript { item_id, .. }
        | UploadTransport::UpdateGesture { item_id } = request.transport
        {
            self.inventory.insert(new_id, item_id);
        }
        self.uploads.push(request.clone());
        self.pending_uploads.push(request.old_asset_id);
    }
    fn prompt_buy_currency(&mut self, cost: u32) {
        self.prompts.push(cost);
    }
}

impl ObjectBuilder for TargetGrid {
    fn agent_position(&self) -> Vector3 {
        self.agent_position
    }
    fn agent_rotation(&self) -> Quaternion {
        Quaternion::IDENTITY
    }
    fn object_exists(&self, id: &Id) -> bool {
        self.objects.contains(id)
    }
    fn find_inventory_item(&self, asset_id: &Id) -> Option<Id> {
        self.inventory.get(asset_id).copied()
    }
    fn create_object(&mut self, request: &ObjectCreateRequest) {
        self.pending_objects.push(request.clone());
    }
    fn update_object(&mut self, object: &CreatedObject, update: &ObjectUpdate) {
        self.updates.push((*object, update.clone()));
    }
    fn drop_inventory(&mut self, object: &CreatedObject, item_id: &Id) {
        self.drops.push((*object, *item_id));
    }
    fn drop_script(&mut self, object: &CreatedObject, item_id: &Id) {
        self.drops.push((*object, *item_id));
    }
    fn link(&mut self, objects: &[CreatedObject]) {
        self.links.push(objects.to_vec());
        self.selected_roots = objects.len();
    }
    fn selected_root_count(&self) -> usize {
        // links settle at once
        self.selected_roots.min(1)
    }
    fn attach(&mut self, _object: &CreatedObject, _attachment_point: u8) {}
}

impl ImportHost for TargetGrid {
    fn now(&self) -> Instant {
        self.now
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
