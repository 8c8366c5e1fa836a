//! The import operation: economic gate, uploads, then object building.

use std::mem;
use std::path::Path;

use tracing::{info, warn};

use crate::config::ImportOptions;
use crate::error::{FailureKind, ImportError};
use crate::import::{
    AssetRehydrator, CreatedObject, ImportHost, ImportPlan, ImportReport, ImportSummary, ObjectRehydrator,
    RemapTable,
};
use crate::model::{ExportManifest, Id};
use crate::operation::OperationHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportState {
    Idle,
    Uploading,
    Building,
    Done,
    Cancelled,
}

impl ImportState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ImportState::Done | ImportState::Cancelled)
    }
}

/// One import, from a validated plan to rebuilt objects.
#[derive(Debug)]
pub struct ImportOperation {
    handle: OperationHandle,
    options: ImportOptions,
    state: ImportState,
    summary: ImportSummary,
    plan: Option<ImportPlan>,
    /// Manifest waiting for the build phase, assets taken out.
    pending: Option<ExportManifest>,
    uploader: Option<AssetRehydrator>,
    objects: Option<ObjectRehydrator>,
    remap: RemapTable,
    report: ImportReport,
}

impl ImportOperation {
    pub fn new(handle: OperationHandle, plan: ImportPlan, options: ImportOptions) -> Self {
        Self {
            handle,
            options,
            state: ImportState::Idle,
            summary: plan.summary().clone(),
            plan: Some(plan),
            pending: None,
            uploader: None,
            objects: None,
            remap: RemapTable::new(),
            report: ImportReport::default(),
        }
    }

    /// Reads and validates the archive at `path`. Nothing is sent to the host.
    pub fn open(handle: OperationHandle, path: &Path, options: ImportOptions) -> Result<Self, ImportError> {
        Ok(Self::new(handle, ImportPlan::open(path)?, options))
    }

    pub fn from_bytes(handle: OperationHandle, bytes: &[u8], options: ImportOptions) -> Result<Self, ImportError> {
        Ok(Self::new(handle, ImportPlan::from_bytes(bytes)?, options))
    }

    pub fn state(&self) -> ImportState {
        self.state
    }

    pub fn handle(&self) -> &OperationHandle {
        &self.handle
    }

    pub fn summary(&self) -> &ImportSummary {
        &self.summary
    }

    /// Ids re-uploaded so far, or all of them once building has started.
    pub fn remap(&self) -> &RemapTable {
        if let Some(uploader) = &self.uploader {
            return uploader.remap();
        }
        match &self.objects {
            Some(objects) => objects.remap(),
            None => &self.remap,
        }
    }

    pub fn report(&self) -> &ImportReport {
        &self.report
    }

    /// Currency needed to upload the archive's assets with `options`.
    pub fn cost(&self, price: u32) -> u32 {
        if !self.options.upload_assets || self.options.temporary_assets {
            return 0;
        }
        let paid = u32::try_from(self.summary.paid_uploads()).unwrap_or(u32::MAX);
        paid.saturating_mul(price)
    }

    /// Starts the import.
    ///
    /// When the uploads cost more than the agent's balance, the host is asked
    /// to offer a currency purchase and the import stays idle.
    pub fn start<H: ImportHost>(&mut self, host: &mut H) -> Result<(), ImportError> {
        if self.state != ImportState::Idle {
            return Err(ImportError::AlreadyStarted);
        }
        if !self.handle.is_open() {
            self.state = ImportState::Cancelled;
            let err = ImportError::Cancelled;
            host.failed(&err);
            return Err(err);
        }

        let cost = self.cost(host.upload_price());
        if i64::from(cost) > host.balance() {
            warn!(cost, balance = host.balance(), "not enough currency to upload assets");
            host.prompt_buy_currency(cost);
            let err = ImportError::InsufficientFunds { cost };
            host.failed(&err);
            return Err(err);
        }

        let Some(plan) = self.plan.take() else {
            return Err(ImportError::AlreadyStarted);
        };
        let (mut manifest, queues, _) = plan.into_parts();
        let assets = mem::take(&mut manifest.assets);
        info!(
            operation = self.handle.id(),
            uploads = queues.len(),
            prims = manifest.prim_count(),
            "import started"
        );

        if self.options.upload_assets && !queues.is_empty() {
            self.state = ImportState::Uploading;
            self.pending = Some(manifest);
            let mut uploader = AssetRehydrator::new(queues, assets, self.options);
            uploader.pump(host);
            self.uploader = Some(uploader);
            self.after_uploads(host);
        } else {
            self.begin_building(host, manifest);
        }
        Ok(())
    }

    /// Stops the import. Later callbacks are ignored.
    pub fn cancel(&mut self) {
        if !self.state.is_terminal() {
            info!(operation = self.handle.id(), "import cancelled");
            self.state = ImportState::Cancelled;
        }
        self.handle.close();
    }

    // =========================================================================
    // COMPLETIONS
    // =========================================================================

    pub fn on_item_created<H: ImportHost>(&mut self, host: &mut H, old_asset_id: &Id, result: Result<Id, FailureKind>) {
        if !self.is_live(host) {
            return;
        }
        if let Some(uploader) = self.uploader.as_mut() {
            uploader.on_item_created(host, old_asset_id, result);
        }
        self.after_uploads(host);
    }

    /// An upload finished; `result` carries the asset id the grid assigned.
    pub fn on_upload_complete<H: ImportHost>(&mut self, host: &mut H, old_asset_id: &Id, result: Result<Id, FailureKind>) {
        if !self.is_live(host) {
            return;
        }
        if let Some(uploader) = self.uploader.as_mut() {
            uploader.on_upload_complete(host, old_asset_id, result);
        }
        self.after_uploads(host);
    }

    pub fn on_object_created<H: ImportHost>(&mut self, host: &mut H, object: CreatedObject) {
        if !self.is_live(host) {
            return;
        }
        if let Some(objects) = self.objects.as_mut() {
            objects.on_object_created(host, object);
        }
        self.check_done(host);
    }

    /// Drives throttled drops, link completion and stall detection.
    pub fn tick<H: ImportHost>(&mut self, host: &mut H) {
        if !self.is_live(host) {
            return;
        }
        match self.state {
            ImportState::Uploading => {
                if let Some(uploader) = self.uploader.as_mut() {
                    uploader.tick(host);
                }
                self.after_uploads(host);
            }
            ImportState::Building => {
                if let Some(objects) = self.objects.as_mut() {
                    objects.tick(host);
                }
                self.check_done(host);
            }
            _ => {}
        }
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    fn is_live<H: ImportHost>(&mut self, host: &H) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        if !self.handle.is_open() {
            self.state = ImportState::Cancelled;
            return false;
        }
        host.is_connected()
    }

    fn after_uploads<H: ImportHost>(&mut self, host: &mut H) {
        if self.state != ImportState::Uploading || !self.uploader.as_ref().is_some_and(|u| u.is_done()) {
            return;
        }
        if let Some(uploader) = self.uploader.take() {
            let (remap, uploaded, skipped) = uploader.into_results();
            info!(uploaded, skipped = skipped.len(), "uploads finished");
            self.remap = remap;
            self.report.uploaded = uploaded;
            self.report.skipped.extend(skipped);
        }
        if let Some(manifest) = self.pending.take() {
            self.begin_building(host, manifest);
        }
    }

    fn begin_building<H: ImportHost>(&mut self, host: &mut H, manifest: ExportManifest) {
        self.state = ImportState::Building;
        let mut objects = ObjectRehydrator::new(manifest, mem::take(&mut self.remap), self.options);
        objects.start(host);
        self.objects = Some(objects);
        self.check_done(host);
    }

    fn check_done<H: ImportHost>(&mut self, host: &mut H) {
        if self.state != ImportState::Building || !self.objects.as_ref().is_some_and(|o| o.is_done()) {
            return;
        }
        if let Some(objects) = self.objects.take() {
            self.report.linksets = objects.linksets_done();
            self.report.objects_created = objects.objects_created();
            self.report.items_dropped = objects.items_dropped();
            self.report.skipped.extend_from_slice(objects.skipped());
            self.remap = objects.into_remap();
        }
        self.state = ImportState::Done;
        info!(
            operation = self.handle.id(),
            linksets = self.report.linksets,
            objects = self.report.objects_created,
            skipped = self.report.skipped.len(),
            "import finished"
        );
        host.finished(&self.report);
        self.handle.close();
    }
}
