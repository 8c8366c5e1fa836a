//! Exporting linksets to archives.
//!
//! [`ExportOperation`] is an event-driven state machine. The host starts it
//! with the current selection, performs the inventory, asset and texture
//! requests it asks for, and feeds every completion back through the
//! `on_*` methods. [`ExportOperation::tick`] drives stall detection. When all
//! stages have drained the archive is written and the host is told through
//! [`ExportHost::finished`].

pub mod builder;
pub mod walker;

use std::path::PathBuf;
use std::time::Instant;

pub use builder::ExportOperation;
pub use walker::{AssetDependencyWalker, SerializedPrim, TextureFetch};

use crate::error::{ExportError, SkippedContent};
use crate::model::{AssetType, Id, InventoryRecord};
use crate::policy::{AssetDirectory, PrimSnapshot};

/// Everything an export needs from the embedding application.
pub trait ExportHost: AssetDirectory {
    fn now(&self) -> Instant;

    /// When false, callbacks and ticks do nothing until the connection is back.
    fn is_connected(&self) -> bool {
        true
    }

    /// Asks for the contents of `object_id`. Answered with
    /// [`ExportOperation::on_inventory`].
    fn request_inventory(&mut self, object_id: &Id);

    /// Asks for a texture at high priority. Answered with
    /// [`ExportOperation::on_texture`].
    fn request_texture(&mut self, texture_id: &Id);

    /// Asks for a non-texture asset. Answered with
    /// [`ExportOperation::on_asset`] under `request.key`.
    fn request_asset(&mut self, request: &AssetRequest);

    fn progress(&mut self, _progress: &ExportProgress) {}

    fn finished(&mut self, report: &ExportReport);

    fn failed(&mut self, error: &ExportError);
}

/// One linkset of the selection: its root and children in link order.
#[derive(Debug, Clone, PartialEq)]
pub struct LinksetSnapshot {
    pub root: PrimSnapshot,
    pub children: Vec<PrimSnapshot>,
}

impl LinksetSnapshot {
    pub fn single(root: PrimSnapshot) -> Self {
        Self {
            root,
            children: Vec::new(),
        }
    }

    pub fn prim_count(&self) -> usize {
        1 + self.children.len()
    }

    /// Root first, then children.
    pub fn prims(&self) -> impl Iterator<Item = &PrimSnapshot> {
        std::iter::once(&self.root).chain(self.children.iter())
    }
}

/// Where an asset is fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetSource {
    /// Through the object holding the item. Required for notecards,
    /// scripts and items whose asset id is not yet known.
    ObjectInventory { object_id: Id, item_id: Id },
    /// Directly by asset id.
    Direct,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRequest {
    /// Completion key: the item id for inventory fetches, the asset id for
    /// direct ones.
    pub key: Id,
    /// Nil when the item has not been resolved yet.
    pub asset_id: Id,
    pub asset_type: AssetType,
    pub source: AssetSource,
    pub name: String,
    pub description: String,
}

impl AssetRequest {
    pub fn direct(asset_id: Id, asset_type: AssetType, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            key: asset_id,
            asset_id,
            asset_type,
            source: AssetSource::Direct,
            name: name.into(),
            description: description.into(),
        }
    }

    pub fn for_item(object_id: Id, item: &InventoryRecord) -> Self {
        Self {
            key: item.item_id,
            asset_id: item.asset_id,
            asset_type: item.asset_type,
            source: AssetSource::ObjectInventory {
                object_id,
                item_id: item.item_id,
            },
            name: item.name.clone(),
            description: item.description.clone(),
        }
    }
}

/// A completed asset fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedAsset {
    /// The asset's id as reported by the fetch. May be nil when the source
    /// does not say.
    pub asset_id: Id,
    pub data: Vec<u8>,
}

impl FetchedAsset {
    pub fn new(asset_id: Id, data: Vec<u8>) -> Self {
        Self { asset_id, data }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportState {
    Idle,
    InventoryDownload,
    AssetDownload,
    TextureDownload,
    Done,
    Failed,
    Cancelled,
}

impl ExportState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ExportState::Done | ExportState::Failed | ExportState::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportProgress {
    pub state: ExportState,
    /// Requests still outstanding in the current stage.
    pub outstanding: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExportReport {
    pub path: PathBuf,
    pub bytes_written: usize,
    pub linksets: usize,
    pub prims: usize,
    /// Prims written as placeholders because the policy refused them.
    pub placeholder_prims: usize,
    pub inventory_items: usize,
    pub assets: usize,
    /// Inventory items left out: object and untyped items, and items the
    /// policy refused.
    pub skipped_items: usize,
    pub skipped: Vec<SkippedContent>,
}
