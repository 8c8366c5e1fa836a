//! The archive manifest: header, linksets, prims, inventory and assets.

use std::collections::{BTreeMap, BTreeSet};

use crate::limits::FORMAT_VERSION;
use crate::model::asset::{AssetBlob, AssetType, InventoryType};
use crate::model::id::Id;
use crate::model::permissions::{Permissions, SaleInfo};
use crate::model::prim::PrimRecord;
use crate::util::datetime::today_utc;

/// Descriptive header strings written at the top of an archive.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ManifestHeader {
    pub client: String,
    pub client_version: String,
    /// Account name of the exporting resident.
    pub author: String,
    /// Export day, `YYYY-MM-DD`.
    pub creation_date: String,
    pub grid: String,
}

impl ManifestHeader {
    /// Header for an archive written today.
    pub fn stamped(
        client: impl Into<String>,
        client_version: impl Into<String>,
        author: impl Into<String>,
        grid: impl Into<String>,
    ) -> Self {
        Self {
            client: client.into(),
            client_version: client_version.into(),
            author: author.into(),
            creation_date: today_utc(),
            grid: grid.into(),
        }
    }
}

/// An inventory item held by a prim.
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryRecord {
    pub item_id: Id,
    pub name: String,
    pub description: String,
    pub asset_type: AssetType,
    pub inventory_type: InventoryType,
    pub permissions: Permissions,
    pub sale_info: SaleInfo,
    pub flags: u32,
    /// Seconds since the Unix epoch.
    pub creation_date: i64,
    /// Nil until the payload has been resolved.
    pub asset_id: Id,
}

impl InventoryRecord {
    pub fn new(item_id: Id, name: impl Into<String>, asset_type: AssetType, asset_id: Id, permissions: Permissions) -> Self {
        Self {
            item_id,
            name: name.into(),
            description: String::new(),
            asset_type,
            inventory_type: InventoryType::for_asset(asset_type),
            permissions,
            sale_info: SaleInfo::default(),
            flags: 0,
            creation_date: 0,
            asset_id,
        }
    }
}

/// A complete archive.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportManifest {
    pub format_version: u32,
    pub header: ManifestHeader,
    /// Prim ids per linkset, root first, then children in link order.
    pub linksets: Vec<Vec<Id>>,
    pub prims: BTreeMap<Id, PrimRecord>,
    pub inventory: BTreeMap<Id, InventoryRecord>,
    pub assets: BTreeMap<Id, AssetBlob>,
}

impl ExportManifest {
    pub fn new(header: ManifestHeader) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            header,
            linksets: Vec::new(),
            prims: BTreeMap::new(),
            inventory: BTreeMap::new(),
            assets: BTreeMap::new(),
        }
    }

    pub fn prim_count(&self) -> usize {
        self.linksets.iter().map(Vec::len).sum()
    }

    /// Root record of the linkset at `index`.
    pub fn root_of(&self, index: usize) -> Option<&PrimRecord> {
        self.linksets
            .get(index)
            .and_then(|ids| ids.first())
            .and_then(|id| self.prims.get(id))
    }

    /// Every asset id referenced by a prim or an inventory record.
    pub fn referenced_assets(&self) -> BTreeSet<Id> {
        let mut refs = BTreeSet::new();
        for prim in self.prims.values() {
            refs.extend(prim.texture_refs());
        }
        for record in self.inventory.values() {
            if !record.asset_id.is_nil() {
                refs.insert(record.asset_id);
            }
        }
        refs
    }
}
