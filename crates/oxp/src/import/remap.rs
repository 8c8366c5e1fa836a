//! Old-to-new id mapping built up while assets are re-uploaded.

use rustc_hash::FxHashMap;

use crate::model::Id;

#[derive(Debug, Clone, Default)]
pub struct RemapTable {
    assets: FxHashMap<Id, Id>,
    items: FxHashMap<Id, Id>,
}

impl RemapTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the id an archived asset was re-uploaded under. Nil ids mean
    /// the upload was skipped or failed and are not recorded.
    pub fn record_asset(&mut self, old: Id, new: Id) {
        if !new.is_nil() {
            self.assets.insert(old, new);
        }
    }

    /// Records the inventory item created to hold the archived asset `old`.
    pub fn record_item(&mut self, old_asset: Id, item: Id) {
        if !item.is_nil() {
            self.items.insert(old_asset, item);
        }
    }

    pub fn asset(&self, old: &Id) -> Option<Id> {
        self.assets.get(old).copied()
    }

    pub fn item(&self, old_asset: &Id) -> Option<Id> {
        self.items.get(old_asset).copied()
    }

    /// The new id of `old`, or `old` itself when it was not re-uploaded.
    pub fn resolve(&self, old: &Id) -> Id {
        self.asset(old).unwrap_or(*old)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}
