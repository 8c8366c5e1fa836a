//! Re-uploading archived assets.
//!
//! Uploads run one at a time in queue priority order. Notecards, scripts and
//! gestures cannot be uploaded as bare assets: an inventory item is created
//! first and the payload is pushed into it. Composite payloads have their
//! references rewritten to the already re-uploaded ids just before they go
//! out.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::composite::{is_composite, rewrite_references, wearable_type};
use crate::config::ImportOptions;
use crate::error::{FailureKind, SkippedContent};
use crate::fetch::{StageStatus, StageTracker};
use crate::import::{
    Capability, CreateItemRequest, ImportHost, ImportProgress, RemapTable, UploadQueues, UploadRequest,
    UploadTransport,
};
use crate::model::id::transaction_asset_id;
use crate::model::{AssetBlob, AssetType, Id, InventoryType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    CreatingItem,
    Uploading,
}

#[derive(Debug, Clone)]
struct InFlight {
    request: UploadRequest,
    item_id: Option<Id>,
    step: Step,
}

/// Returns true if payloads of this type are pushed into a freshly created
/// inventory item instead of uploaded directly.
fn needs_item(asset_type: AssetType) -> bool {
    matches!(asset_type, AssetType::Notecard | AssetType::LslText | AssetType::Gesture)
}

#[derive(Debug)]
pub struct AssetRehydrator {
    queues: UploadQueues,
    assets: BTreeMap<Id, AssetBlob>,
    options: ImportOptions,
    total: usize,
    index: usize,
    in_flight: Option<InFlight>,
    tracker: StageTracker<Id, ()>,
    remap: RemapTable,
    uploaded: usize,
    skipped: Vec<SkippedContent>,
}

impl AssetRehydrator {
    pub fn new(queues: UploadQueues, assets: BTreeMap<Id, AssetBlob>, options: ImportOptions) -> Self {
        Self {
            total: queues.len(),
            queues,
            assets,
            tracker: StageTracker::new("upload", options.fetch.upload_ceiling, options.fetch.max_reissue_cycles),
            options,
            index: 0,
            in_flight: None,
            remap: RemapTable::new(),
            uploaded: 0,
            skipped: Vec::new(),
        }
    }

    /// Nothing queued and nothing in flight.
    pub fn is_done(&self) -> bool {
        self.in_flight.is_none() && self.queues.is_empty()
    }

    /// Archive id of the asset currently in flight.
    pub fn in_flight(&self) -> Option<Id> {
        self.in_flight.as_ref().map(|f| f.request.old_asset_id)
    }

    pub fn remap(&self) -> &RemapTable {
        &self.remap
    }

    pub fn uploaded(&self) -> usize {
        self.uploaded
    }

    pub fn skipped(&self) -> &[SkippedContent] {
        &self.skipped
    }

    /// Hands over the remap table and skip list once uploads are done.
    pub fn into_results(self) -> (RemapTable, usize, Vec<SkippedContent>) {
        (self.remap, self.uploaded, self.skipped)
    }

    /// Issues the next upload if none is in flight.
    pub fn pump<H: ImportHost>(&mut self, host: &mut H) {
        while self.in_flight.is_none() {
            let Some(old_id) = self.queues.pop_next() else {
                return;
            };
            self.issue(host, old_id);
        }
    }

    /// The inventory item for the asset in flight was created.
    pub fn on_item_created<H: ImportHost>(&mut self, host: &mut H, old_asset_id: &Id, result: Result<Id, FailureKind>) {
        let Some(flight) = self
            .in_flight
            .as_mut()
            .filter(|f| f.request.old_asset_id == *old_asset_id && f.step == Step::CreatingItem)
        else {
            debug!(asset = %old_asset_id, "ignoring unexpected item creation");
            return;
        };

        match result {
            Ok(item_id) => {
                flight.request.transport = match flight.request.asset_type {
                    AssetType::LslText => UploadTransport::UpdateScript {
                        item_id,
                        target: self.options.script_target,
                    },
                    AssetType::Gesture => UploadTransport::UpdateGesture { item_id },
                    _ => UploadTransport::UpdateNotecard { item_id },
                };
                flight.item_id = Some(item_id);
                flight.step = Step::Uploading;
                host.upload(&flight.request);
                self.tracker.restart(host.now());
            }
            Err(kind) => {
                warn!(asset = %old_asset_id, ?kind, "creating inventory item failed");
                self.abandon(kind);
                self.pump(host);
            }
        }
    }

    /// The upload of the asset in flight finished. `result` carries the
    /// asset id the grid reported; a nil id leaves the asset unmapped.
    pub fn on_upload_complete<H: ImportHost>(&mut self, host: &mut H, old_asset_id: &Id, result: Result<Id, FailureKind>) {
        let matches = self
            .in_flight
            .as_ref()
            .is_some_and(|f| f.request.old_asset_id == *old_asset_id && f.step == Step::Uploading);
        if !matches {
            debug!(asset = %old_asset_id, "ignoring unexpected upload completion");
            return;
        }

        match result {
            Ok(new_id) => {
                if let Some(flight) = self.in_flight.take() {
                    self.tracker.complete(old_asset_id);
                    if let Some(expected) = flight.request.expected_asset_id.filter(|e| *e != new_id) {
                        warn!(asset = %old_asset_id, %expected, reported = %new_id, "grid reported an unexpected asset id");
                    }
                    if new_id.is_nil() {
                        warn!(asset = %old_asset_id, "upload finished without an asset id");
                    } else {
                        self.remap.record_asset(*old_asset_id, new_id);
                    }
                    if let Some(item_id) = flight.item_id {
                        self.remap.record_item(*old_asset_id, item_id);
                    }
                    self.uploaded += 1;
                    debug!(old = %old_asset_id, new = %new_id, "asset uploaded");
                }
            }
            Err(kind) => {
                warn!(asset = %old_asset_id, ?kind, "upload failed");
                self.abandon(kind);
            }
        }
        self.pump(host);
    }

    /// Watches the upload in flight. Stalls are logged; an upload is never
    /// sent twice, but with a reissue bound configured a stalled upload is
    /// eventually abandoned.
    pub fn tick<H: ImportHost>(&mut self, host: &mut H) {
        match self.tracker.poll(host.now()) {
            StageStatus::Reissue(_) => {
                if let Some(old_id) = self.in_flight() {
                    warn!(asset = %old_id, "upload has not completed, still waiting");
                }
            }
            StageStatus::Abandoned(_) => {
                self.abandon(FailureKind::Timeout);
                self.pump(host);
            }
            StageStatus::Drained | StageStatus::Waiting => {}
        }
    }

    fn abandon(&mut self, kind: FailureKind) {
        if let Some(flight) = self.in_flight.take() {
            let old_id = flight.request.old_asset_id;
            self.tracker.complete(&old_id);
            self.skipped.push(SkippedContent::new(old_id, kind));
        }
    }

    fn issue<H: ImportHost>(&mut self, host: &mut H, old_id: Id) {
        self.index += 1;
        host.progress(&ImportProgress::Uploading {
            index: self.index,
            total: self.total,
        });

        let Some(blob) = self.assets.get(&old_id) else {
            self.skipped.push(SkippedContent::new(old_id, FailureKind::NotFound));
            return;
        };
        let asset_type = blob.asset_type;
        if self.options.temporary_assets && matches!(asset_type, AssetType::Sound | AssetType::Animation) {
            debug!(asset = %old_id, ?asset_type, "not uploaded in temporary mode");
            self.skipped.push(SkippedContent::new(old_id, FailureKind::Unsupported));
            return;
        }

        let data = self.prepare_payload(blob);
        let wearable_type = if asset_type.is_wearable() { wearable_type(&data) } else { None };
        let transaction_id = Uuid::new_v4();
        let transport = self.plain_transport(host, asset_type);
        let expected_asset_id = match transport {
            UploadTransport::LegacyStore { .. } | UploadTransport::Temporary if !needs_item(asset_type) => {
                Some(transaction_asset_id(&transaction_id, &host.secure_session_id()))
            }
            _ => None,
        };
        let request = UploadRequest {
            old_asset_id: old_id,
            transaction_id,
            asset_type,
            inventory_type: InventoryType::for_asset(asset_type),
            name: blob.name.clone(),
            description: blob.description.clone(),
            data,
            transport,
            wearable_type,
            next_owner_mask: self.options.next_owner_mask,
            expected_asset_id,
        };

        let step = if needs_item(asset_type) {
            host.create_inventory_item(&CreateItemRequest {
                old_asset_id: old_id,
                transaction_id,
                asset_type,
                inventory_type: request.inventory_type,
                name: request.name.clone(),
                description: request.description.clone(),
                next_owner_mask: request.next_owner_mask,
            });
            Step::CreatingItem
        } else {
            host.upload(&request);
            Step::Uploading
        };
        info!(asset = %old_id, ?asset_type, index = self.index, total = self.total, "uploading");

        self.tracker.insert(old_id, ());
        self.tracker.restart(host.now());
        self.in_flight = Some(InFlight {
            request,
            item_id: None,
            step,
        });
    }

    fn prepare_payload(&self, blob: &AssetBlob) -> Vec<u8> {
        let asset_type = blob.asset_type;
        if !is_composite(asset_type) || (self.options.temporary_assets && asset_type.is_wearable()) {
            return blob.data.clone();
        }
        match rewrite_references(asset_type, &blob.data, |id| self.remap.asset(id)) {
            Some(rewritten) => {
                debug!(replaced = rewritten.replaced, ?asset_type, "rewrote composite references");
                rewritten.data
            }
            None => blob.data.clone(),
        }
    }

    fn plain_transport<H: ImportHost>(&self, host: &H, asset_type: AssetType) -> UploadTransport {
        if self.options.temporary_assets && asset_type == AssetType::Texture {
            if host.has_capability(Capability::TemporaryUpload) {
                UploadTransport::Temporary
            } else {
                UploadTransport::LegacyStore { temporary: true }
            }
        } else if host.has_capability(Capability::NewAssetUpload) {
            UploadTransport::NewAsset
        } else {
            UploadTransport::LegacyStore { temporary: false }
        }
    }
}
