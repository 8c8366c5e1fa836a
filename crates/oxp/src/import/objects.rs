//! Recreating prims, their contents and their links.
//!
//! Linksets are built one after another. Within a linkset, prims are created
//! strictly one at a time, root first; each acknowledgement triggers the
//! follow-up updates for that prim and queues its contents for dropping.
//! Drops are throttled. Once every prim of the linkset exists and every drop
//! has gone out, the linkset is linked (if it has more than one prim),
//! attached or moved into place, and deselected.

use std::collections::{BTreeMap, VecDeque};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::ImportOptions;
use crate::error::{FailureKind, SkippedContent};
use crate::import::{
    CreatedObject, ImportHost, ImportProgress, ObjectCreateRequest, ObjectUpdate, PermissionChange, RemapTable,
};
use crate::model::permissions::{PERM_COPY, PERM_MODIFY, PERM_MOVE};
use crate::model::{AssetType, ExportManifest, Id, InventoryRecord, PrimRecord, Quaternion, Vector3};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
    Idle,
    Creating,
    InventoryTransfer,
    Linking,
    Done,
}

#[derive(Debug, Clone, Copy)]
struct PendingCreate {
    archive_id: Id,
    is_root: bool,
    position: Vector3,
    rotation: Quaternion,
}

#[derive(Debug, Clone, Copy)]
struct PendingDrop {
    object: CreatedObject,
    item_id: Id,
    script: bool,
}

#[derive(Debug)]
pub struct ObjectRehydrator {
    options: ImportOptions,
    linksets: Vec<Vec<Id>>,
    prims: BTreeMap<Id, PrimRecord>,
    inventory: BTreeMap<Id, InventoryRecord>,
    remap: RemapTable,
    phase: BuildPhase,
    linkset: usize,
    next_prim: usize,
    awaiting: Option<PendingCreate>,
    /// Objects of the current linkset, in link order.
    created: Vec<CreatedObject>,
    /// The object created for the current linkset's root record.
    root: Option<CreatedObject>,
    /// Where the first root goes, and where it was when archived.
    origin: Option<(Vector3, Vector3)>,
    root_placement: (Vector3, Quaternion),
    drops: VecDeque<PendingDrop>,
    next_drop_at: Option<Instant>,
    objects_created: usize,
    items_dropped: usize,
    linksets_done: usize,
    skipped: Vec<SkippedContent>,
}

impl ObjectRehydrator {
    /// `manifest` needs no asset payloads; only prims, linksets and
    /// inventory records are read.
    pub fn new(manifest: ExportManifest, remap: RemapTable, options: ImportOptions) -> Self {
        Self {
            options,
            linksets: manifest.linksets,
            prims: manifest.prims,
            inventory: manifest.inventory,
            remap,
            phase: BuildPhase::Idle,
            linkset: 0,
            next_prim: 0,
            awaiting: None,
            created: Vec::new(),
            root: None,
            origin: None,
            root_placement: (Vector3::ZERO, Quaternion::IDENTITY),
            drops: VecDeque::new(),
            next_drop_at: None,
            objects_created: 0,
            items_dropped: 0,
            linksets_done: 0,
            skipped: Vec::new(),
        }
    }

    pub fn phase(&self) -> BuildPhase {
        self.phase
    }

    pub fn is_done(&self) -> bool {
        self.phase == BuildPhase::Done
    }

    pub fn objects_created(&self) -> usize {
        self.objects_created
    }

    pub fn items_dropped(&self) -> usize {
        self.items_dropped
    }

    pub fn linksets_done(&self) -> usize {
        self.linksets_done
    }

    pub fn skipped(&self) -> &[SkippedContent] {
        &self.skipped
    }

    pub fn remap(&self) -> &RemapTable {
        &self.remap
    }

    pub fn into_remap(self) -> RemapTable {
        self.remap
    }

    /// Archive id of the prim whose creation is outstanding.
    pub fn awaiting(&self) -> Option<Id> {
        self.awaiting.map(|p| p.archive_id)
    }

    pub fn start<H: ImportHost>(&mut self, host: &mut H) {
        if self.phase != BuildPhase::Idle {
            return;
        }
        info!(linksets = self.linksets.len(), "building objects");
        self.begin_linkset(host);
    }

    /// The region created the prim requested last.
    pub fn on_object_created<H: ImportHost>(&mut self, host: &mut H, object: CreatedObject) {
        let Some(pending) = self.awaiting.take() else {
            debug!(object = %object.id, "ignoring unrequested object");
            return;
        };
        if !host.object_exists(&object.id) {
            debug!(object = %object.id, prim = %pending.archive_id, "created object vanished");
            self.skipped.push(SkippedContent::new(pending.archive_id, FailureKind::NotFound));
            self.after_prim(host);
            return;
        }

        self.created.push(object);
        if pending.is_root {
            self.root = Some(object);
        }
        self.objects_created += 1;

        let (updates, drops) = match self.prims.get(&pending.archive_id) {
            Some(record) => (
                self.follow_ups(host, record, &pending),
                self.resolve_content(host, record),
            ),
            None => (Vec::new(), Vec::new()),
        };
        for update in &updates {
            host.update_object(&object, update);
        }

        if self.drops.is_empty() {
            self.next_drop_at = Some(host.now());
        }
        self.drops.extend(drops.into_iter().map(|(item_id, script)| PendingDrop {
            object,
            item_id,
            script,
        }));
        self.drop_next(host);
        self.after_prim(host);
    }

    /// Drops the next queued item when its interval has passed, and
    /// completes linking once the region reports it.
    pub fn tick<H: ImportHost>(&mut self, host: &mut H) {
        match self.phase {
            BuildPhase::Creating | BuildPhase::InventoryTransfer => {
                self.drop_next(host);
                self.check_linkset(host);
            }
            BuildPhase::Linking => {
                if host.selected_root_count() < 2 {
                    debug!(linkset = self.linkset, "link complete");
                    self.finish_linkset(host);
                }
            }
            BuildPhase::Idle | BuildPhase::Done => {}
        }
    }

    // =========================================================================
    // PLACEMENT AND FOLLOW-UPS
    // =========================================================================

    fn placement<H: ImportHost>(&mut self, host: &H, record: &PrimRecord, is_root: bool) -> (Vector3, Quaternion) {
        if !is_root {
            let (root_position, root_rotation) = self.root_placement;
            return (
                record.position * root_rotation + root_position,
                record.rotation * root_rotation,
            );
        }

        let (start, first_root) = match self.origin {
            Some(origin) => origin,
            None => {
                let start = host.agent_position() + self.options.build_offset * host.agent_rotation();
                let origin = (start, record.position);
                self.origin = Some(origin);
                origin
            }
        };
        let position = start + (record.position - first_root);
        self.root_placement = (position, record.rotation);
        (position, record.rotation)
    }

    fn follow_ups<H: ImportHost>(&self, host: &H, record: &PrimRecord, pending: &PendingCreate) -> Vec<ObjectUpdate> {
        let remap = &self.remap;
        let mut updates = vec![
            ObjectUpdate::Select,
            ObjectUpdate::Placement {
                position: pending.position,
                rotation: pending.rotation,
                scale: record.scale,
            },
        ];

        if !record.textures.is_empty() {
            let mut faces = record.textures.clone();
            for face in &mut faces {
                face.image_id = remap.resolve(&face.image_id);
            }
            updates.push(ObjectUpdate::Textures(faces));
        }
        if !record.materials.is_empty() {
            let mut materials = record.materials.clone();
            for material in &mut materials {
                material.normal_map = remap.resolve(&material.normal_map);
                material.specular_map = remap.resolve(&material.specular_map);
            }
            updates.push(ObjectUpdate::Materials(materials));
        }
        if let Some(mut sculpt) = record.sculpt {
            if !sculpt.is_mesh() {
                sculpt.texture = remap.resolve(&sculpt.texture);
            }
            updates.push(ObjectUpdate::Sculpt(sculpt));
        }
        if let Some(flexible) = record.flexible {
            updates.push(ObjectUpdate::Flexible(flexible));
        }
        if let Some(light) = record.light {
            updates.push(ObjectUpdate::Light(light));
        }
        if let Some(mut image) = record.light_image {
            image.texture = remap.resolve(&image.texture);
            updates.push(ObjectUpdate::LightImage(image));
        }
        if let Some(mut particles) = record.particles {
            particles.image = remap.resolve(&particles.image);
            updates.push(ObjectUpdate::Particles(particles));
        }
        if let Some(action) = record.click_action {
            updates.push(ObjectUpdate::ClickAction(action));
        }
        if !record.name.is_empty() {
            updates.push(ObjectUpdate::Name(record.name.clone()));
        }
        if !record.description.is_empty() {
            updates.push(ObjectUpdate::Description(record.description.clone()));
        }
        updates.push(ObjectUpdate::Permissions(PermissionChange {
            group_mask: PERM_MODIFY,
            everyone_mask: PERM_MOVE | PERM_COPY,
            next_owner_mask: self.options.next_owner_mask,
        }));
        if let Some(sale) = record.sale_info.filter(|s| s.is_for_sale()) {
            updates.push(ObjectUpdate::SaleInfo(sale));
        }
        if let Some(physics) = record.physics {
            if host.region_supports_physics_shapes() {
                updates.push(ObjectUpdate::Physics(physics));
            }
        }
        updates
    }

    /// Live inventory items to drop for `record`'s contents, in archive
    /// order, with whether each is a script.
    fn resolve_content<H: ImportHost>(&self, host: &H, record: &PrimRecord) -> Vec<(Id, bool)> {
        let mut out = Vec::with_capacity(record.content.len());
        for item_id in &record.content {
            let Some(item) = self.inventory.get(item_id) else {
                continue;
            };
            let old_asset = item.asset_id;
            let resolved = self
                .remap
                .item(&old_asset)
                .or_else(|| self.remap.asset(&old_asset).and_then(|new| host.find_inventory_item(&new)))
                .or_else(|| host.find_inventory_item(&old_asset));
            match resolved {
                Some(live) => out.push((live, item.asset_type == AssetType::LslText)),
                None => debug!(item = %item_id, name = %item.name, "no inventory item to drop"),
            }
        }
        out
    }

    // =========================================================================
    // SEQUENCING
    // =========================================================================

    fn begin_linkset<H: ImportHost>(&mut self, host: &mut H) {
        if self.linkset >= self.linksets.len() {
            info!(linksets = self.linksets_done, objects = self.objects_created, "objects built");
            self.phase = BuildPhase::Done;
            return;
        }
        self.phase = BuildPhase::Creating;
        self.next_prim = 0;
        self.created.clear();
        self.root = None;
        self.create_next(host);
    }

    fn create_next<H: ImportHost>(&mut self, host: &mut H) {
        let Some(ids) = self.linksets.get(self.linkset) else {
            return;
        };
        let prims = ids.len();
        let Some(archive_id) = ids.get(self.next_prim).copied() else {
            return;
        };
        let Some(record) = self.prims.get(&archive_id).cloned() else {
            // validated manifests always have the record
            self.next_prim += 1;
            return self.after_prim(host);
        };

        let is_root = self.next_prim == 0;
        let (position, rotation) = self.placement(host, &record, is_root);
        self.next_prim += 1;
        host.progress(&ImportProgress::Building {
            linkset: self.linkset + 1,
            linksets: self.linksets.len(),
            prim: self.next_prim,
            prims,
        });
        host.create_object(&ObjectCreateRequest {
            archive_id,
            position,
            rotation,
            scale: record.scale,
            volume: record.volume,
            material: record.material,
            flags: record.flags,
            is_root,
        });
        self.awaiting = Some(PendingCreate {
            archive_id,
            is_root,
            position,
            rotation,
        });
    }

    fn after_prim<H: ImportHost>(&mut self, host: &mut H) {
        let remaining = self
            .linksets
            .get(self.linkset)
            .is_some_and(|ids| self.next_prim < ids.len());
        if remaining {
            self.create_next(host);
        } else {
            self.phase = BuildPhase::InventoryTransfer;
            self.check_linkset(host);
        }
    }

    fn drop_next<H: ImportHost>(&mut self, host: &mut H) {
        let now = host.now();
        if self.next_drop_at.is_some_and(|at| now < at) {
            return;
        }
        let queued = self.drops.len();
        let Some(pending) = self.drops.pop_front() else {
            return;
        };
        if host.object_exists(&pending.object.id) {
            if pending.script {
                host.drop_script(&pending.object, &pending.item_id);
            } else {
                host.drop_inventory(&pending.object, &pending.item_id);
            }
            self.items_dropped += 1;
        } else {
            debug!(object = %pending.object.id, "object vanished before drop");
            self.skipped.push(SkippedContent::new(pending.item_id, FailureKind::NotFound));
        }
        self.next_drop_at = Some(now + self.options.drop_interval_for(queued));
    }

    fn check_linkset<H: ImportHost>(&mut self, host: &mut H) {
        if self.phase != BuildPhase::InventoryTransfer || !self.drops.is_empty() {
            return;
        }
        let live: Vec<CreatedObject> = self
            .created
            .iter()
            .copied()
            .filter(|o| host.object_exists(&o.id))
            .collect();
        if live.len() < 2 {
            self.finish_linkset(host);
            return;
        }
        // without its root the first child would take over as link root
        let Some(root) = self.root.filter(|r| live.first() == Some(r)) else {
            warn!(linkset = self.linkset, prims = live.len(), "root prim missing, leaving prims unlinked");
            self.finish_linkset(host);
            return;
        };
        debug!(linkset = self.linkset, root = %root.id, "link root");
        info!(linkset = self.linkset, prims = live.len(), "linking");
        host.link(&live);
        self.phase = BuildPhase::Linking;
        if host.selected_root_count() < 2 {
            self.finish_linkset(host);
        }
    }

    fn finish_linkset<H: ImportHost>(&mut self, host: &mut H) {
        let root_record = self
            .linksets
            .get(self.linkset)
            .and_then(|ids| ids.first())
            .and_then(|id| self.prims.get(id));
        if let (Some(root), Some(record)) = (self.root.as_ref(), root_record) {
            if host.object_exists(&root.id) {
                match record.attachment_point {
                    Some(point) if !self.options.do_not_attach => host.attach(root, point),
                    None if self.options.restore_region_position => {
                        host.update_object(root, &ObjectUpdate::RegionPosition(record.position))
                    }
                    _ => {}
                }
            }
        }
        for object in &self.created {
            if host.object_exists(&object.id) {
                host.update_object(object, &ObjectUpdate::Deselect);
            }
        }

        self.linksets_done += 1;
        self.linkset += 1;
        self.begin_linkset(host);
    }
}
