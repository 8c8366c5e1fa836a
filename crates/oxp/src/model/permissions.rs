//! Ownership, permission masks and sale terms.

use crate::model::id::{Id, NIL_ID};

pub const PERM_EXPORT: u32 = 1 << 11;
pub const PERM_TRANSFER: u32 = 1 << 13;
pub const PERM_MODIFY: u32 = 1 << 14;
pub const PERM_COPY: u32 = 1 << 15;
pub const PERM_MOVE: u32 = 1 << 19;
pub const PERM_NONE: u32 = 0;
pub const PERM_ALL: u32 = 0x7FFF_FFFF;

/// Modify, copy and transfer: what "full permissions" means for an item.
pub const PERM_ITEM_UNRESTRICTED: u32 = PERM_MODIFY | PERM_COPY | PERM_TRANSFER;

/// Identities and masks attached to an object or inventory item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions {
    pub creator: Id,
    pub owner: Id,
    pub group: Id,
    pub last_owner: Id,
    pub base_mask: u32,
    pub owner_mask: u32,
    pub group_mask: u32,
    pub everyone_mask: u32,
    pub next_owner_mask: u32,
}

impl Default for Permissions {
    fn default() -> Self {
        Self {
            creator: NIL_ID,
            owner: NIL_ID,
            group: NIL_ID,
            last_owner: NIL_ID,
            base_mask: PERM_ALL,
            owner_mask: PERM_ALL,
            group_mask: PERM_NONE,
            everyone_mask: PERM_NONE,
            next_owner_mask: PERM_MOVE | PERM_TRANSFER,
        }
    }
}

impl Permissions {
    /// Full-permission record created and owned by `agent`.
    pub fn created_by(agent: Id) -> Self {
        Self {
            creator: agent,
            owner: agent,
            last_owner: agent,
            ..Self::default()
        }
    }

    pub fn is_owned_by(&self, agent: &Id) -> bool {
        !agent.is_nil() && self.owner == *agent
    }

    pub fn is_created_by(&self, agent: &Id) -> bool {
        !agent.is_nil() && self.creator == *agent
    }

    /// Owner holds the export bit.
    pub fn allow_export_by(&self, agent: &Id) -> bool {
        self.is_owned_by(agent) && self.owner_mask & PERM_EXPORT != 0
    }

    /// Owner may modify, copy and transfer.
    pub fn owner_has_full_perm(&self) -> bool {
        self.owner_mask & PERM_ITEM_UNRESTRICTED == PERM_ITEM_UNRESTRICTED
    }

    /// Base mask grants modify, copy and transfer.
    pub fn base_has_full_perm(&self) -> bool {
        self.base_mask & PERM_ITEM_UNRESTRICTED == PERM_ITEM_UNRESTRICTED
    }
}

/// How an object or item is offered for sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SaleType {
    #[default]
    NotForSale = 0,
    Original = 1,
    Copy = 2,
    Contents = 3,
}

impl SaleType {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(SaleType::NotForSale),
            1 => Some(SaleType::Original),
            2 => Some(SaleType::Copy),
            3 => Some(SaleType::Contents),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SaleInfo {
    pub sale_type: SaleType,
    pub price: i32,
}

impl SaleInfo {
    pub fn is_for_sale(&self) -> bool {
        self.sale_type != SaleType::NotForSale
    }
}
