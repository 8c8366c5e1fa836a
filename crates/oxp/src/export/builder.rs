//! The export operation.
//!
//! Stages run in order: contents of exportable prims, then the assets those
//! contents (and any gestures among them) point at, then textures. Textures
//! are requested as soon as they are discovered, but the texture stage only
//! completes once everything before it has. A stage advances the moment its
//! last outstanding request completes, never while anything is outstanding.

use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::codec::write_archive;
use crate::composite::discover_references;
use crate::config::ExportOptions;
use crate::error::{ExportError, FailureKind, SkippedContent};
use crate::export::walker::{AssetDependencyWalker, TextureFetch};
use crate::export::{
    AssetRequest, AssetSource, ExportHost, ExportProgress, ExportReport, ExportState, FetchedAsset, LinksetSnapshot,
};
use crate::fetch::{StageStatus, StageTracker};
use crate::model::{AssetBlob, AssetType, EMPTY_NOTECARD, ExportManifest, Id, InventoryRecord, ManifestHeader};
use crate::operation::OperationHandle;
use crate::policy::ExportPolicy;
use crate::validate::unresolved_assets;

#[derive(Debug)]
pub struct ExportOperation {
    handle: OperationHandle,
    options: ExportOptions,
    path: PathBuf,
    walker: AssetDependencyWalker,
    manifest: ExportManifest,
    state: ExportState,
    inventory: StageTracker<Id, ()>,
    assets: StageTracker<Id, AssetRequest>,
    textures: StageTracker<Id, TextureFetch>,
    /// Asset ids already requested, for de-duplication across items.
    requested_assets: FxHashSet<Id>,
    report: ExportReport,
}

impl ExportOperation {
    /// Starts exporting `selection` to `path`.
    ///
    /// Every prim gets a record; prims the policy refuses get placeholders.
    /// Fails without writing anything when the selection is empty or no prim
    /// passes the policy. May complete before returning when nothing needs
    /// fetching.
    #[allow(clippy::too_many_arguments)]
    pub fn begin<H: ExportHost>(
        handle: OperationHandle,
        policy: ExportPolicy,
        options: ExportOptions,
        header: ManifestHeader,
        selection: Vec<LinksetSnapshot>,
        path: impl Into<PathBuf>,
        host: &mut H,
    ) -> Result<Self, ExportError> {
        if selection.is_empty() {
            handle.close();
            return Err(ExportError::NothingSelected);
        }

        let fetch = options.fetch;
        let mut op = Self {
            handle,
            options,
            path: path.into(),
            walker: AssetDependencyWalker::new(policy),
            manifest: ExportManifest::new(header),
            state: ExportState::Idle,
            inventory: StageTracker::new("inventory", fetch.inventory_ceiling, fetch.max_reissue_cycles),
            assets: StageTracker::new("asset", fetch.asset_ceiling, fetch.max_reissue_cycles),
            textures: StageTracker::new("texture", fetch.texture_ceiling, fetch.max_reissue_cycles),
            requested_assets: FxHashSet::default(),
            report: ExportReport::default(),
        };

        let mut exportable = Vec::new();
        for linkset in &selection {
            let root_id = linkset.root.id;
            let mut ids = Vec::with_capacity(linkset.prim_count());
            for prim in linkset.prims() {
                let parent = (prim.id != root_id).then_some(root_id);
                let serialized = op.walker.serialize_prim(prim, parent, &*host);
                if serialized.exportable {
                    exportable.push(prim.id);
                } else {
                    op.report.placeholder_prims += 1;
                    op.report.skipped.push(SkippedContent::new(prim.id, FailureKind::PermissionDenied));
                }
                ids.push(prim.id);
                op.manifest.prims.insert(prim.id, serialized.record);
            }
            op.manifest.linksets.push(ids);
        }

        if exportable.is_empty() {
            info!(prims = op.manifest.prim_count(), "no selected prim passes the export policy");
            op.handle.close();
            return Err(ExportError::NothingExportable);
        }

        info!(
            linksets = op.manifest.linksets.len(),
            prims = op.manifest.prim_count(),
            exportable = exportable.len(),
            path = %op.path.display(),
            "export started"
        );

        op.request_textures(host);
        if op.options.include_inventory {
            for id in &exportable {
                if op.inventory.insert(*id, ()) {
                    host.request_inventory(id);
                }
            }
        }

        op.enter(ExportState::InventoryDownload, host);
        op.advance(host);
        Ok(op)
    }

    pub fn state(&self) -> ExportState {
        self.state
    }

    pub fn handle(&self) -> &OperationHandle {
        &self.handle
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The manifest built so far.
    pub fn manifest(&self) -> &ExportManifest {
        &self.manifest
    }

    pub fn report(&self) -> &ExportReport {
        &self.report
    }

    /// Outstanding requests across all stages.
    pub fn outstanding(&self) -> usize {
        self.inventory.len() + self.assets.len() + self.textures.len()
    }

    /// Stops the export. Later callbacks are ignored and nothing is written.
    pub fn cancel(&mut self) {
        if !self.state.is_terminal() {
            info!(operation = self.handle.id(), "export cancelled");
            self.state = ExportState::Cancelled;
        }
        self.handle.close();
    }

    // =========================================================================
    // COMPLETIONS
    // =========================================================================

    /// Contents of `object_id` arrived.
    pub fn on_inventory<H: ExportHost>(&mut self, host: &mut H, object_id: &Id, items: Vec<InventoryRecord>) {
        if !self.is_live(host) {
            return;
        }
        if self.inventory.complete(object_id).is_none() {
            debug!(object = %object_id, "ignoring unrequested inventory");
            return;
        }
        for item in items {
            self.add_item(host, object_id, item);
        }
        self.advance(host);
    }

    /// An asset fetch keyed by `key` finished.
    pub fn on_asset<H: ExportHost>(&mut self, host: &mut H, key: &Id, result: Result<FetchedAsset, FailureKind>) {
        if !self.is_live(host) {
            return;
        }
        let Some(request) = self.assets.complete(key) else {
            debug!(key = %key, "ignoring unrequested asset");
            return;
        };
        match result {
            Ok(fetched) => self.store_asset(host, request, fetched),
            Err(kind) => {
                warn!(asset = %request.asset_id, item = %request.key, ?kind, "asset download failed");
                self.report.skipped.push(SkippedContent::new(request.key, kind));
            }
        }
        self.advance(host);
    }

    /// A texture download finished.
    pub fn on_texture<H: ExportHost>(&mut self, host: &mut H, texture_id: &Id, result: Result<Vec<u8>, FailureKind>) {
        if !self.is_live(host) {
            return;
        }
        let Some(fetch) = self.textures.complete(texture_id) else {
            debug!(texture = %texture_id, "ignoring unrequested texture");
            return;
        };
        match result {
            Ok(data) => {
                self.manifest
                    .assets
                    .insert(fetch.id, AssetBlob::new(AssetType::Texture, fetch.name, fetch.description, data));
            }
            Err(kind) => {
                warn!(texture = %texture_id, ?kind, "texture download failed");
                self.report.skipped.push(SkippedContent::new(fetch.id, kind));
            }
        }
        self.advance(host);
    }

    /// Checks the current stage for stalls, re-sending or abandoning
    /// requests as configured.
    pub fn tick<H: ExportHost>(&mut self, host: &mut H) {
        if !self.is_live(host) {
            return;
        }
        let now = host.now();
        let abandoned: Vec<Id> = match self.state {
            ExportState::InventoryDownload => match self.inventory.poll(now) {
                StageStatus::Reissue(entries) => {
                    for (object_id, ()) in entries {
                        host.request_inventory(&object_id);
                    }
                    Vec::new()
                }
                StageStatus::Abandoned(entries) => entries.into_iter().map(|(id, ())| id).collect(),
                _ => Vec::new(),
            },
            ExportState::AssetDownload => match self.assets.poll(now) {
                StageStatus::Reissue(entries) => {
                    for (_, request) in entries {
                        host.request_asset(&request);
                    }
                    Vec::new()
                }
                StageStatus::Abandoned(entries) => entries.into_iter().map(|(key, _)| key).collect(),
                _ => Vec::new(),
            },
            ExportState::TextureDownload => match self.textures.poll(now) {
                StageStatus::Reissue(entries) => {
                    for (texture_id, _) in entries {
                        host.request_texture(&texture_id);
                    }
                    Vec::new()
                }
                StageStatus::Abandoned(entries) => entries.into_iter().map(|(id, _)| id).collect(),
                _ => Vec::new(),
            },
            _ => return,
        };
        self.report
            .skipped
            .extend(abandoned.into_iter().map(|id| SkippedContent::new(id, FailureKind::Timeout)));
        self.advance(host);
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    fn is_live<H: ExportHost>(&mut self, host: &H) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        if !self.handle.is_open() {
            self.state = ExportState::Cancelled;
            return false;
        }
        host.is_connected()
    }

    fn already_have(&self, asset_id: &Id) -> bool {
        self.requested_assets.contains(asset_id)
            || self.textures.contains(asset_id)
            || self.manifest.assets.contains_key(asset_id)
    }

    fn request_textures<H: ExportHost>(&mut self, host: &mut H) {
        for fetch in self.walker.take_fetches() {
            if self.manifest.assets.contains_key(&fetch.id) {
                continue;
            }
            let id = fetch.id;
            if self.textures.insert(id, fetch) {
                host.request_texture(&id);
            }
        }
    }

    fn request_asset<H: ExportHost>(&mut self, host: &mut H, request: AssetRequest) {
        if self.assets.insert(request.key, request.clone()) {
            host.request_asset(&request);
        }
    }

    fn add_item<H: ExportHost>(&mut self, host: &mut H, object_id: &Id, item: InventoryRecord) {
        if matches!(item.asset_type, AssetType::Object | AssetType::None) {
            debug!(item = %item.item_id, name = %item.name, "skipping object or untyped item");
            self.skip_item(item.item_id, FailureKind::Unsupported);
            return;
        }
        if !self.walker.policy().can_export_item(&item.permissions) {
            debug!(item = %item.item_id, name = %item.name, "item fails export check");
            self.skip_item(item.item_id, FailureKind::PermissionDenied);
            return;
        }
        let Some(prim) = self.manifest.prims.get_mut(object_id) else {
            return;
        };
        prim.content.push(item.item_id);

        let mut record = item;
        if record.asset_type == AssetType::Notecard && record.asset_id.is_nil() {
            // never saved, so there is nothing to fetch
            let asset_id = Uuid::new_v4();
            record.asset_id = asset_id;
            self.manifest.assets.insert(
                asset_id,
                AssetBlob::new(AssetType::Notecard, &record.name, &record.description, EMPTY_NOTECARD.to_vec()),
            );
        } else if record.asset_id.is_nil() {
            self.request_asset(host, AssetRequest::for_item(*object_id, &record));
        } else if !self.already_have(&record.asset_id) {
            self.requested_assets.insert(record.asset_id);
            let request = if record.asset_type.fetched_via_inventory() {
                AssetRequest::for_item(*object_id, &record)
            } else {
                AssetRequest::direct(record.asset_id, record.asset_type, &record.name, &record.description)
            };
            self.request_asset(host, request);
        }
        self.manifest.inventory.insert(record.item_id, record);
    }

    fn skip_item(&mut self, item_id: Id, kind: FailureKind) {
        self.report.skipped_items += 1;
        self.report.skipped.push(SkippedContent::new(item_id, kind));
    }

    fn store_asset<H: ExportHost>(&mut self, host: &mut H, request: AssetRequest, fetched: FetchedAsset) {
        let asset_id = [request.asset_id, fetched.asset_id]
            .into_iter()
            .find(|id| !id.is_nil())
            .unwrap_or_else(Uuid::new_v4);

        if let AssetSource::ObjectInventory { item_id, .. } = request.source {
            if let Some(record) = self.manifest.inventory.get_mut(&item_id) {
                if record.asset_id.is_nil() {
                    record.asset_id = asset_id;
                }
            }
        }

        let asset_type = request.asset_type;
        if asset_type.is_wearable() {
            for reference in discover_references(asset_type, &fetched.data) {
                self.walker.export_texture(&reference.id, &*host);
            }
            self.request_textures(host);
        } else if asset_type == AssetType::Gesture {
            for reference in discover_references(asset_type, &fetched.data) {
                let part_type = reference
                    .hint
                    .or_else(|| host.items_with_asset(&reference.id).first().map(|item| item.asset_type));
                match part_type {
                    Some(part_type @ (AssetType::Animation | AssetType::Sound)) => {
                        self.request_gesture_part(host, reference.id, part_type)
                    }
                    _ => debug!(asset = %reference.id, "gesture reference of unknown type"),
                }
            }
        }

        self.manifest
            .assets
            .insert(asset_id, AssetBlob::new(asset_type, request.name, request.description, fetched.data));
    }

    fn request_gesture_part<H: ExportHost>(&mut self, host: &mut H, asset_id: Id, asset_type: AssetType) {
        if self.already_have(&asset_id) {
            return;
        }
        let verdict = self.walker.policy().can_export_asset(&asset_id, &*host);
        if !verdict.exportable {
            debug!(asset = %asset_id, "gesture asset fails export check");
            self.report
                .skipped
                .push(SkippedContent::new(asset_id, FailureKind::PermissionDenied));
            return;
        }
        self.requested_assets.insert(asset_id);
        self.request_asset(
            host,
            AssetRequest::direct(asset_id, asset_type, verdict.name, verdict.description),
        );
    }

    fn enter<H: ExportHost>(&mut self, state: ExportState, host: &mut H) {
        self.state = state;
        let now = host.now();
        let outstanding = match state {
            ExportState::InventoryDownload => {
                self.inventory.restart(now);
                self.inventory.len()
            }
            ExportState::AssetDownload => {
                self.assets.restart(now);
                self.assets.len()
            }
            ExportState::TextureDownload => {
                self.textures.restart(now);
                self.textures.len()
            }
            _ => 0,
        };
        info!(?state, outstanding, "export stage");
        host.progress(&ExportProgress { state, outstanding });
    }

    fn advance<H: ExportHost>(&mut self, host: &mut H) {
        loop {
            let next = match self.state {
                ExportState::InventoryDownload if self.inventory.is_empty() => ExportState::AssetDownload,
                ExportState::AssetDownload if self.assets.is_empty() => ExportState::TextureDownload,
                ExportState::TextureDownload if self.textures.is_empty() => {
                    self.finish(host);
                    return;
                }
                _ => return,
            };
            self.enter(next, host);
        }
    }

    fn finish<H: ExportHost>(&mut self, host: &mut H) {
        let missing = unresolved_assets(&self.manifest);
        if !missing.is_empty() {
            debug!(count = missing.len(), "archive references assets it does not carry");
        }

        match write_archive(&self.path, &self.manifest, self.options.compression_level) {
            Ok(bytes_written) => {
                self.state = ExportState::Done;
                self.report.path = self.path.clone();
                self.report.bytes_written = bytes_written;
                self.report.linksets = self.manifest.linksets.len();
                self.report.prims = self.manifest.prim_count();
                self.report.inventory_items = self.manifest.inventory.len();
                self.report.assets = self.manifest.assets.len();
                info!(
                    path = %self.path.display(),
                    bytes = bytes_written,
                    prims = self.report.prims,
                    assets = self.report.assets,
                    skipped_items = self.report.skipped_items,
                    "export finished"
                );
                host.progress(&ExportProgress {
                    state: ExportState::Done,
                    outstanding: 0,
                });
                host.finished(&self.report);
            }
            Err(err) => {
                warn!(path = %self.path.display(), %err, "writing archive failed");
                self.state = ExportState::Failed;
                host.failed(&ExportError::Archive(err));
            }
        }
        self.handle.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::read_archive;
    use crate::composite::{Gesture, GestureStep};
    use crate::config::FetchConfig;
    use crate::model::{Permissions, PrimRecord, Quaternion, TextureEntry, Vector3};
    use crate::model::id::DEFAULT_TEXTURE_ID;
    use crate::operation::OperationKind;
    use crate::policy::{AssetDirectory, GridKind, PrimSnapshot};
    use rustc_hash::FxHashMap;
    use std::time::{Duration, Instant};

    const AGENT: Id = Uuid::from_u128(0xa9e47);
    const STRANGER: Id = Uuid::from_u128(0x5742);
    const TEX: Id = Uuid::from_u128(0x7e1);
    const TEX2: Id = Uuid::from_u128(0x7e2);

    struct Host {
        now: Instant,
        connected: bool,
        items: FxHashMap<Id, Vec<InventoryRecord>>,
        inventory_requests: Vec<Id>,
        texture_requests: Vec<Id>,
        asset_requests: Vec<AssetRequest>,
        states: Vec<ExportState>,
        finished: Vec<ExportReport>,
        failed: usize,
    }

    impl Host {
        fn new() -> Self {
            let mut host = Self {
                now: Instant::now(),
                connected: true,
                items: FxHashMap::default(),
                inventory_requests: Vec::new(),
                texture_requests: Vec::new(),
                asset_requests: Vec::new(),
                states: Vec::new(),
                finished: Vec::new(),
                failed: 0,
            };
            host.own(TEX, AssetType::Texture);
            host.own(TEX2, AssetType::Texture);
            host
        }

        fn own(&mut self, asset: Id, asset_type: AssetType) {
            let item = InventoryRecord::new(Uuid::new_v4(), "mine", asset_type, asset, Permissions::created_by(AGENT));
            self.items.entry(asset).or_default().push(item);
        }
    }

    impl AssetDirectory for Host {
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

    impl ExportHost for Host {
        fn now(&self) -> Instant {
            self.now
        }
        fn is_connected(&self) -> bool {
            self.connected
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
            self.states.push(progress.state);
        }
        fn finished(&mut self, report: &ExportReport) {
            self.finished.push(report.clone());
        }
        fn failed(&mut self, _error: &ExportError) {
            self.failed += 1;
        }
    }

    fn prim(id: u128, creator: Id, textures: &[Id], position: Vector3) -> PrimSnapshot {
        let mut params = PrimRecord::placeholder(position, Vector3::new(0.5, 0.5, 0.5), Quaternion::IDENTITY, None, None);
        params.textures = textures.iter().copied().map(TextureEntry::with_image).collect();
        params.permissions = Some(Permissions {
            creator,
            owner: AGENT,
            ..Permissions::default()
        });
        params.material = 0;
        params.name = format!("prim {id}");
        PrimSnapshot {
            id: Uuid::from_u128(id),
            params,
        }
    }

    fn begin(
        host: &mut Host,
        selection: Vec<LinksetSnapshot>,
        options: ExportOptions,
        path: &Path,
    ) -> Result<ExportOperation, ExportError> {
        ExportOperation::begin(
            OperationHandle::detached(OperationKind::Export),
            ExportPolicy::new(AGENT, GridKind::Managed),
            options,
            ManifestHeader::default(),
            selection,
            path,
            host,
        )
    }

    #[test]
    fn test_single_prim_single_texture() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.oxp");
        let mut host = Host::new();
        let selection = vec![LinksetSnapshot::single(prim(1, AGENT, &[TEX, TEX, TEX], Vector3::ZERO))];

        let mut op = begin(&mut host, selection, ExportOptions::default(), &path).unwrap();
        assert_eq!(op.state(), ExportState::TextureDownload);
        assert_eq!(host.texture_requests, vec![TEX]);
        assert!(!path.exists());

        op.on_texture(&mut host, &TEX, Ok(vec![1, 2, 3]));
        assert_eq!(op.state(), ExportState::Done);
        assert_eq!(host.finished.len(), 1);
        assert!(!op.handle().is_open());

        let manifest = read_archive(&path).unwrap();
        assert_eq!(manifest.linksets, vec![vec![Uuid::from_u128(1)]]);
        assert_eq!(manifest.prims.len(), 1);
        assert_eq!(manifest.assets.len(), 1);
        assert_eq!(manifest.assets[&TEX].data, vec![1, 2, 3]);
        assert!(manifest.inventory.is_empty());
        assert_eq!(
            host.states,
            vec![
                ExportState::InventoryDownload,
                ExportState::AssetDownload,
                ExportState::TextureDownload,
                ExportState::Done
            ]
        );
    }

    #[test]
    fn test_failing_middle_child_is_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("three.oxp");
        let mut host = Host::new();
        let linkset = LinksetSnapshot {
            root: prim(1, AGENT, &[TEX], Vector3::new(100.0, 100.0, 20.0)),
            children: vec![
                prim(2, STRANGER, &[TEX2], Vector3::new(0.0, 0.0, 1.0)),
                prim(3, AGENT, &[TEX2], Vector3::new(0.0, 0.0, 2.0)),
            ],
        };

        let mut op = begin(&mut host, vec![linkset], ExportOptions::default(), &path).unwrap();
        op.on_texture(&mut host, &TEX, Ok(vec![1]));
        op.on_texture(&mut host, &TEX2, Ok(vec![2]));
        assert_eq!(op.state(), ExportState::Done);

        let manifest = read_archive(&path).unwrap();
        let ids: Vec<Id> = (1..=3).map(Uuid::from_u128).collect();
        assert_eq!(manifest.linksets, vec![ids.clone()]);
        let middle = &manifest.prims[&ids[1]];
        assert!(middle.is_placeholder());
        assert_eq!(middle.parent, Some(ids[0]));
        assert_eq!(middle.position, Vector3::new(0.0, 0.0, 1.0));
        assert_eq!(manifest.prims[&ids[0]].texture_refs(), vec![TEX]);
        assert_eq!(manifest.prims[&ids[2]].texture_refs(), vec![TEX2]);
        assert_eq!(host.finished[0].placeholder_prims, 1);
    }

    #[test]
    fn test_nothing_exportable_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("none.oxp");
        let mut host = Host::new();
        let selection = vec![LinksetSnapshot::single(prim(1, STRANGER, &[TEX], Vector3::ZERO))];

        let err = begin(&mut host, selection, ExportOptions::default(), &path).unwrap_err();
        assert!(matches!(err, ExportError::NothingExportable));
        assert!(!path.exists());
        assert!(host.texture_requests.is_empty());

        let err = begin(&mut host, Vec::new(), ExportOptions::default(), &path).unwrap_err();
        assert!(matches!(err, ExportError::NothingSelected));
    }

    #[test]
    fn test_replaced_faces_use_default_texture() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faces.oxp");
        let mut host = Host::new();
        let foreign = Uuid::from_u128(0xf0);
        let selection = vec![LinksetSnapshot::single(prim(1, AGENT, &[foreign], Vector3::ZERO))];

        // nothing to fetch: the default texture ships with the client
        let op = begin(&mut host, selection, ExportOptions::default(), &path).unwrap();
        assert_eq!(op.state(), ExportState::Done);
        assert!(host.texture_requests.is_empty());
        let manifest = read_archive(&path).unwrap();
        assert_eq!(manifest.prims[&Uuid::from_u128(1)].textures[0].image_id, DEFAULT_TEXTURE_ID);
    }

    #[test]
    fn test_inventory_items() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inv.oxp");
        let mut host = Host::new();
        let object = Uuid::from_u128(1);
        let selection = vec![LinksetSnapshot::single(prim(1, AGENT, &[], Vector3::ZERO))];
        let options = ExportOptions::default().with_inventory(true);

        let mut op = begin(&mut host, selection, options, &path).unwrap();
        assert_eq!(op.state(), ExportState::InventoryDownload);
        assert_eq!(host.inventory_requests, vec![object]);

        let mine = Permissions::created_by(AGENT);
        let sound = Uuid::from_u128(0x50);
        let script = Uuid::from_u128(0x51);
        let items = vec![
            InventoryRecord::new(Uuid::from_u128(0x10), "blank note", AssetType::Notecard, Id::nil(), mine.clone()),
            InventoryRecord::new(Uuid::from_u128(0x11), "script", AssetType::LslText, script, mine.clone()),
            InventoryRecord::new(Uuid::from_u128(0x12), "boing", AssetType::Sound, sound, mine.clone()),
            InventoryRecord::new(Uuid::from_u128(0x13), "boing copy", AssetType::Sound, sound, mine.clone()),
            InventoryRecord::new(Uuid::from_u128(0x14), "chair", AssetType::Object, Uuid::from_u128(0x52), mine),
            InventoryRecord::new(
                Uuid::from_u128(0x15),
                "theirs",
                AssetType::Sound,
                Uuid::from_u128(0x53),
                Permissions::created_by(STRANGER),
            ),
        ];
        op.on_inventory(&mut host, &object, items);
        assert_eq!(op.state(), ExportState::AssetDownload);

        // the sound is fetched once, the script through its object
        assert_eq!(host.asset_requests.len(), 2);
        let script_request = host.asset_requests.iter().find(|r| r.asset_type == AssetType::LslText).unwrap();
        assert_eq!(
            script_request.source,
            AssetSource::ObjectInventory { object_id: object, item_id: Uuid::from_u128(0x11) }
        );
        assert_eq!(op.report().skipped_items, 2);

        op.on_asset(&mut host, &Uuid::from_u128(0x11), Ok(FetchedAsset::new(script, b"default {}".to_vec())));
        // stage must not advance while the sound is outstanding
        assert_eq!(op.state(), ExportState::AssetDownload);
        op.on_asset(&mut host, &sound, Ok(FetchedAsset::new(sound, vec![9; 16])));
        assert_eq!(op.state(), ExportState::Done);

        let manifest = read_archive(&path).unwrap();
        let content = &manifest.prims[&object].content;
        assert_eq!(content.len(), 4);
        assert_eq!(manifest.inventory.len(), 4);
        let note = &manifest.inventory[&Uuid::from_u128(0x10)];
        assert!(!note.asset_id.is_nil());
        assert_eq!(manifest.assets[&note.asset_id].data, EMPTY_NOTECARD);
        assert_eq!(host.finished[0].skipped_items, 2);
    }

    #[test]
    fn test_nil_asset_item_is_back_filled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fill.oxp");
        let mut host = Host::new();
        let object = Uuid::from_u128(1);
        let selection = vec![LinksetSnapshot::single(prim(1, AGENT, &[], Vector3::ZERO))];
        let mut op = begin(&mut host, selection, ExportOptions::default().with_inventory(true), &path).unwrap();

        let item = Uuid::from_u128(0x20);
        let record = InventoryRecord::new(item, "script", AssetType::LslText, Id::nil(), Permissions::created_by(AGENT));
        op.on_inventory(&mut host, &object, vec![record]);
        let resolved = Uuid::from_u128(0x21);
        op.on_asset(&mut host, &item, Ok(FetchedAsset::new(resolved, b"state_entry".to_vec())));

        let manifest = read_archive(&path).unwrap();
        assert_eq!(manifest.inventory[&item].asset_id, resolved);
        assert!(manifest.assets.contains_key(&resolved));
    }

    #[test]
    fn test_gesture_parts_fetched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gesture.oxp");
        let mut host = Host::new();
        let anim = Uuid::from_u128(0x60);
        let theirs = Uuid::from_u128(0x61);
        host.own(anim, AssetType::Animation);
        let gesture_asset = Uuid::from_u128(0x62);
        let object = Uuid::from_u128(1);

        let selection = vec![LinksetSnapshot::single(prim(1, AGENT, &[], Vector3::ZERO))];
        let mut op = begin(&mut host, selection, ExportOptions::default().with_inventory(true), &path).unwrap();
        let record = InventoryRecord::new(
            Uuid::from_u128(0x30),
            "wave",
            AssetType::Gesture,
            gesture_asset,
            Permissions::created_by(AGENT),
        );
        op.on_inventory(&mut host, &object, vec![record]);

        let gesture = Gesture {
            version: 2,
            key: 0,
            mask: 0,
            trigger: "/wave".to_string(),
            replace: String::new(),
            steps: vec![
                GestureStep::Animation { name: "wave".to_string(), asset_id: anim, flags: 0 },
                GestureStep::Animation { name: "nope".to_string(), asset_id: theirs, flags: 0 },
            ],
        };
        op.on_asset(&mut host, &gesture_asset, Ok(FetchedAsset::new(gesture_asset, gesture.to_text().into_bytes())));
        assert_eq!(op.state(), ExportState::AssetDownload);
        let last = host.asset_requests.last().unwrap();
        assert_eq!(last.asset_id, anim);
        assert_eq!(last.asset_type, AssetType::Animation);
        assert_eq!(last.source, AssetSource::Direct);
        assert!(op.report().skipped.contains(&SkippedContent::new(theirs, FailureKind::PermissionDenied)));

        op.on_asset(&mut host, &anim, Ok(FetchedAsset::new(anim, vec![0; 8])));
        assert_eq!(op.state(), ExportState::Done);
    }

    #[test]
    fn test_stall_reissues_then_abandons() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stall.oxp");
        let mut host = Host::new();
        let options = ExportOptions::default().with_fetch(FetchConfig::bounded(1));
        let selection = vec![LinksetSnapshot::single(prim(1, AGENT, &[TEX], Vector3::ZERO))];
        let mut op = begin(&mut host, selection, options, &path).unwrap();

        host.now += Duration::from_secs(10);
        op.tick(&mut host);
        assert_eq!(host.texture_requests.len(), 1);

        host.now += Duration::from_secs(30);
        op.tick(&mut host);
        assert_eq!(host.texture_requests, vec![TEX, TEX]);
        assert_eq!(op.state(), ExportState::TextureDownload);

        host.now += Duration::from_secs(30);
        op.tick(&mut host);
        assert_eq!(op.state(), ExportState::Done);
        assert!(host.finished[0].skipped.contains(&SkippedContent::new(TEX, FailureKind::Timeout)));
    }

    #[test]
    fn test_cancel_and_disconnect_halt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("halt.oxp");
        let mut host = Host::new();
        let selection = vec![LinksetSnapshot::single(prim(1, AGENT, &[TEX], Vector3::ZERO))];
        let mut op = begin(&mut host, selection.clone(), ExportOptions::default(), &path).unwrap();

        host.connected = false;
        op.on_texture(&mut host, &TEX, Ok(vec![1]));
        assert_eq!(op.state(), ExportState::TextureDownload);
        host.connected = true;

        op.cancel();
        op.on_texture(&mut host, &TEX, Ok(vec![1]));
        assert_eq!(op.state(), ExportState::Cancelled);
        assert!(!path.exists());

        // closing the handle from outside has the same effect
        let mut op = begin(&mut host, selection, ExportOptions::default(), &path).unwrap();
        op.handle().clone().close();
        op.on_texture(&mut host, &TEX, Ok(vec![1]));
        assert_eq!(op.state(), ExportState::Cancelled);
        assert!(host.finished.is_empty());
        assert_eq!(host.failed, 0);
    }
}
