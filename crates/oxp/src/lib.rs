//! OXP: portable archives of linksets and the assets they reference.
//!
//! This crate exports a selection of linked objects, their contents and every
//! asset those reference into a single archive file, and rebuilds them from
//! such an archive on another region or grid.
//!
//! # Overview
//!
//! - **Permission-gated**: only prims, items and assets the exporting agent
//!   may take out of the grid end up in an archive; the rest become
//!   placeholders or are skipped
//! - **Sans-IO**: export and import are event-driven state machines; the host
//!   application performs every network request and feeds completions back
//! - **Self-contained**: an archive carries the asset payloads it needs, and
//!   import re-uploads them and rewrites every reference to the new ids
//!
//! # Quick Start
//!
//! ```rust
//! use oxp::codec::{decode_manifest, encode_manifest};
//! use oxp::model::{ExportManifest, ManifestHeader, PrimRecord, Quaternion, Vector3};
//!
//! let mut manifest = ExportManifest::new(ManifestHeader::default());
//! let root = uuid::Uuid::new_v4();
//! manifest.prims.insert(
//!     root,
//!     PrimRecord::placeholder(Vector3::ZERO, Vector3::new(1.0, 1.0, 1.0), Quaternion::IDENTITY, None, None),
//! );
//! manifest.linksets.push(vec![root]);
//!
//! let bytes = encode_manifest(&manifest).unwrap();
//! let decoded = decode_manifest(&bytes).unwrap();
//! assert_eq!(decoded.linksets, manifest.linksets);
//! ```
//!
//! # Modules
//!
//! - [`model`]: Archive data types (prims, inventory records, asset blobs)
//! - [`codec`]: Binary encoding/decoding with compression support
//! - [`policy`]: Export permission checks
//! - [`export`]: The export state machine and dependency walker
//! - [`import`]: Archive reading, asset re-upload and object rebuilding
//! - [`composite`]: Wearable and gesture payloads that reference other assets
//! - [`validate`]: Structural validation of decoded manifests
//! - [`error`]: Error types
//! - [`limits`]: Format constants and decoding limits
//!
//! # Wire Format
//!
//! Archives use a binary format with optional zstd compression:
//! - Uncompressed: `OXPA` magic + version + data
//! - Compressed: `OXPAZ` magic + uncompressed size + zstd data
//!
//! The decoder automatically detects and handles both formats.

pub mod codec;
pub mod composite;
pub mod config;
pub mod error;
pub mod export;
pub mod fetch;
pub mod import;
pub mod limits;
pub mod model;
pub mod operation;
pub mod policy;
pub mod util;
pub mod validate;

// Re-export commonly used types at crate root
pub use codec::{decode_manifest, encode_manifest, encode_manifest_compressed, read_archive, write_archive};
pub use config::{ExportOptions, FetchConfig, ImportOptions, ScriptTarget};
pub use error::{
    ArchiveError, DecodeError, EncodeError, ExportError, FailureKind, ImportError, SkippedContent, ValidationError,
};
pub use export::{ExportHost, ExportOperation, ExportReport, ExportState, LinksetSnapshot};
pub use import::{ImportHost, ImportOperation, ImportPlan, ImportReport, ImportState, ImportSummary};
pub use model::id::{format_id, parse_id, transaction_asset_id};
pub use model::{AssetBlob, AssetType, ExportManifest, Id, InventoryRecord, ManifestHeader, PrimRecord, NIL_ID};
pub use operation::{OperationHandle, OperationKind, OperationRegistry};
pub use policy::{ArchiveFormat, AssetDirectory, ExportPolicy, ExportPolicyMode, GridKind, PrimSnapshot};
pub use validate::validate_manifest;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
