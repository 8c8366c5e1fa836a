//! Options for export and import operations.

use std::time::Duration;

use crate::limits::{
    ASSET_WAIT, DEFAULT_COMPRESSION_LEVEL, DROP_INTERVAL, DROP_INTERVAL_SLOW, DROP_SLOWDOWN_THRESHOLD,
    INVENTORY_WAIT, TEXTURE_WAIT, UPLOAD_WAIT,
};
use crate::model::Vector3;
use crate::model::permissions::{PERM_COPY, PERM_MODIFY, PERM_TRANSFER};

/// Stall detection for outstanding requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchConfig {
    pub inventory_ceiling: Duration,
    pub asset_ceiling: Duration,
    pub texture_ceiling: Duration,
    /// Uploads are never re-sent; a stall past this ceiling is only logged.
    pub upload_ceiling: Duration,
    /// Reissue cycles before outstanding requests are abandoned.
    /// `None` waits indefinitely.
    pub max_reissue_cycles: Option<u32>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            inventory_ceiling: INVENTORY_WAIT,
            asset_ceiling: ASSET_WAIT,
            texture_ceiling: TEXTURE_WAIT,
            upload_ceiling: UPLOAD_WAIT,
            max_reissue_cycles: None,
        }
    }
}

impl FetchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gives up on outstanding requests after `cycles` reissues.
    pub fn bounded(cycles: u32) -> Self {
        Self {
            max_reissue_cycles: Some(cycles),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportOptions {
    /// Also archive the contents of each exportable prim.
    pub include_inventory: bool,
    pub compression_level: i32,
    pub fetch: FetchConfig,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_inventory: false,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            fetch: FetchConfig::default(),
        }
    }
}

impl ExportOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_inventory(mut self, include: bool) -> Self {
        self.include_inventory = include;
        self
    }

    pub fn with_fetch(mut self, fetch: FetchConfig) -> Self {
        self.fetch = fetch;
        self
    }
}

/// Script compilation target for re-uploaded scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScriptTarget {
    #[default]
    Mono,
    Lsl2,
}

impl ScriptTarget {
    pub fn name(self) -> &'static str {
        match self {
            ScriptTarget::Mono => "mono",
            ScriptTarget::Lsl2 => "lsl2",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImportOptions {
    /// Re-upload archived assets. When off, objects are rebuilt with the
    /// archive's original ids.
    pub upload_assets: bool,
    /// Upload textures as free temporary assets; sounds and animations are
    /// skipped.
    pub temporary_assets: bool,
    /// Rez worn objects in world instead of attaching them.
    pub do_not_attach: bool,
    /// Move each root back to its recorded region position after linking.
    pub restore_region_position: bool,
    /// Offset from the agent, in the agent's frame, where the first root is built.
    pub build_offset: Vector3,
    pub script_target: ScriptTarget,
    /// Next-owner mask granted to created objects and items.
    pub next_owner_mask: u32,
    pub drop_interval: Duration,
    pub drop_interval_slow: Duration,
    pub drop_slowdown_threshold: usize,
    pub fetch: FetchConfig,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            upload_assets: true,
            temporary_assets: false,
            do_not_attach: false,
            restore_region_position: false,
            build_offset: Vector3::new(1.5, 0.0, 1.0),
            script_target: ScriptTarget::Mono,
            next_owner_mask: PERM_MODIFY | PERM_COPY | PERM_TRANSFER,
            drop_interval: DROP_INTERVAL,
            drop_interval_slow: DROP_INTERVAL_SLOW,
            drop_slowdown_threshold: DROP_SLOWDOWN_THRESHOLD,
            fetch: FetchConfig::default(),
        }
    }
}

impl ImportOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_uploads() -> Self {
        Self {
            upload_assets: false,
            ..Self::default()
        }
    }

    pub fn temporary() -> Self {
        Self {
            temporary_assets: true,
            ..Self::default()
        }
    }

    /// Drop interval for a prim with `queued` pending items.
    pub fn drop_interval_for(&self, queued: usize) -> Duration {
        if queued < self.drop_slowdown_threshold {
            self.drop_interval
        } else {
            self.drop_interval_slow
        }
    }
}
