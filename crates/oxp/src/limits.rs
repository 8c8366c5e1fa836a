//! Wire constants, decoding limits and pipeline timing.
//!
//! The decoder treats archives as untrusted input; every count and length
//! read from the wire is checked against the limits below before allocating.

use std::time::Duration;

// =============================================================================
// WIRE FORMAT
// =============================================================================

/// Magic bytes of an uncompressed archive body.
pub const MAGIC_UNCOMPRESSED: &[u8; 4] = b"OXPA";

/// Magic bytes of a zstd-compressed archive.
pub const MAGIC_COMPRESSED: &[u8; 5] = b"OXPAZ";

/// Newest archive format version this crate reads and writes.
pub const FORMAT_VERSION: u32 = 1;

/// Conventional file extension for archives.
pub const ARCHIVE_EXTENSION: &str = "oxp";

/// Default zstd level used when writing archives.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

// =============================================================================
// DECODING LIMITS
// =============================================================================

/// Maximum bytes in a LEB128 varint.
pub const MAX_VARINT_BYTES: usize = 10;

/// Maximum length of header, name and description strings.
pub const MAX_STRING_LEN: usize = 64 * 1024;

/// Maximum size of a single asset payload.
pub const MAX_ASSET_SIZE: usize = 64 * 1024 * 1024;

/// Maximum size of a decompressed archive.
pub const MAX_ARCHIVE_SIZE: usize = 1024 * 1024 * 1024;

/// Maximum number of linksets in one archive.
pub const MAX_LINKSETS: usize = 4096;

/// Maximum number of prims in one archive.
pub const MAX_PRIMS: usize = 65_536;

/// Maximum number of prims in one linkset.
pub const MAX_PRIMS_PER_LINKSET: usize = 256;

/// Maximum number of texture faces on a prim.
pub const MAX_FACES: usize = 45;

/// Maximum number of inventory records or assets in one archive.
pub const MAX_ENTRIES: usize = 1_000_000;

/// Maximum number of content items in one prim.
pub const MAX_CONTENT_ITEMS: usize = 10_000;

// =============================================================================
// PIPELINE TIMING
// =============================================================================

/// Time without progress before outstanding inventory requests are reissued.
pub const INVENTORY_WAIT: Duration = Duration::from_secs(30);

/// Time without progress before outstanding asset requests are reissued.
pub const ASSET_WAIT: Duration = Duration::from_secs(60);

/// Time without progress before outstanding texture requests are reissued.
pub const TEXTURE_WAIT: Duration = Duration::from_secs(30);

/// Time without an upload completion before a stall is logged.
pub const UPLOAD_WAIT: Duration = Duration::from_secs(120);

/// Interval between inventory drops into a freshly created prim.
pub const DROP_INTERVAL: Duration = Duration::from_millis(250);

/// Interval between inventory drops once a prim has a large queue.
pub const DROP_INTERVAL_SLOW: Duration = Duration::from_millis(500);

/// Queue length at which drops switch to [`DROP_INTERVAL_SLOW`].
pub const DROP_SLOWDOWN_THRESHOLD: usize = 20;
