//! Error types for archive encoding/decoding, payload parsing, validation
//! and the export/import operations.

use std::path::PathBuf;

use thiserror::Error;

use crate::model::Id;
use crate::operation::OperationKind;

/// Error codes reported by the archive decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// E001: Invalid magic/version
    InvalidMagicOrVersion,
    /// E004: Invalid UTF-8 encoding
    InvalidUtf8,
    /// E005: Malformed varint/length/reserved bits/encoding
    MalformedEncoding,
    /// E006: Duplicate or dangling entry
    InconsistentEntries,
}

impl ErrorCode {
    /// Returns the error code string (e.g., "E001").
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCode::InvalidMagicOrVersion => "E001",
            ErrorCode::InvalidUtf8 => "E004",
            ErrorCode::MalformedEncoding => "E005",
            ErrorCode::InconsistentEntries => "E006",
        }
    }
}

/// Error during archive decoding.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    // === E001: Invalid magic/version ===
    #[error("[E001] invalid magic bytes: expected OXPA or OXPAZ, found {found:?}")]
    InvalidMagic { found: [u8; 4] },

    #[error("[E001] unsupported format version {version} (newest supported: {supported})")]
    UnsupportedVersion { version: u32, supported: u32 },

    // === E004: Invalid UTF-8 ===
    #[error("[E004] invalid UTF-8 in {field}")]
    InvalidUtf8 { field: &'static str },

    // === E005: Malformed encoding ===
    #[error("[E005] unexpected end of input while reading {context}")]
    UnexpectedEof { context: &'static str },

    #[error("[E005] varint exceeds maximum length (10 bytes)")]
    VarintTooLong,

    #[error("[E005] varint overflow (value exceeds u64)")]
    VarintOverflow,

    #[error("[E005] {field} value {value} out of range")]
    ValueOutOfRange { field: &'static str, value: u64 },

    #[error("[E005] {field} length {len} exceeds maximum {max}")]
    LengthExceedsLimit {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("[E005] unknown asset type {name:?}")]
    InvalidAssetType { name: String },

    #[error("[E005] unknown inventory type {code}")]
    InvalidInventoryType { code: i8 },

    #[error("[E005] unknown sale type {code}")]
    InvalidSaleType { code: u8 },

    #[error("[E005] reserved bits are non-zero in {context}")]
    ReservedBitsSet { context: &'static str },

    // === E006: Inconsistent entries ===
    #[error("[E006] duplicate {map} entry {id}")]
    DuplicateEntry { map: &'static str, id: Id },

    // === Compression errors ===
    #[error("[E005] zstd decompression failed: {0}")]
    DecompressionFailed(String),

    #[error("[E005] decompressed size {actual} doesn't match declared {declared}")]
    UncompressedSizeMismatch { declared: usize, actual: usize },
}

impl DecodeError {
    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            DecodeError::InvalidMagic { .. } | DecodeError::UnsupportedVersion { .. } => {
                ErrorCode::InvalidMagicOrVersion
            }
            DecodeError::InvalidUtf8 { .. } => ErrorCode::InvalidUtf8,
            DecodeError::DuplicateEntry { .. } => ErrorCode::InconsistentEntries,
            _ => ErrorCode::MalformedEncoding,
        }
    }
}

/// Error during archive encoding.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    #[error("{field} length {len} exceeds maximum {max}")]
    LengthExceedsLimit {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("format version {version} is newer than this encoder ({supported})")]
    UnsupportedVersion { version: u32, supported: u32 },

    #[error("zstd compression failed: {0}")]
    CompressionFailed(String),
}

/// Error reading or writing an archive file.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("cannot access archive {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Error parsing a wearable or gesture payload.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompositeError {
    #[error("payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("missing {context}")]
    UnexpectedEnd { context: &'static str },

    #[error("line {line}: expected {expected}")]
    Malformed { line: usize, expected: &'static str },

    #[error("line {line}: invalid id {text:?}")]
    InvalidId { line: usize, text: String },

    #[error("unknown gesture step type {code}")]
    UnknownStep { code: u32 },

    #[error("{field} count {count} exceeds maximum {max}")]
    TooMany {
        field: &'static str,
        count: usize,
        max: usize,
    },
}

/// Structural problem in a manifest.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("linkset {index} is empty")]
    EmptyLinkset { index: usize },

    #[error("linkset {index} lists prim {id} which has no record")]
    MissingPrim { index: usize, id: Id },

    #[error("prim {id} appears in more than one linkset slot")]
    DuplicatePrim { id: Id },

    #[error("root prim {id} has a parent")]
    RootHasParent { id: Id },

    #[error("child prim {id} does not point at its linkset root {root}")]
    WrongParent { id: Id, root: Id },

    #[error("prim {prim} holds item {item} which has no inventory record")]
    MissingInventory { prim: Id, item: Id },

    #[error("asset {id} is referenced but not present")]
    UnresolvedAsset { id: Id },
}

/// Why a single piece of content was skipped or abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    PermissionDenied,
    Unsupported,
    Timeout,
    NotFound,
    InsufficientFunds,
    TransportFailure,
}

/// A prim, item or asset left out of an operation, and why.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkippedContent {
    pub id: Id,
    pub kind: FailureKind,
}

impl SkippedContent {
    pub fn new(id: Id, kind: FailureKind) -> Self {
        Self { id, kind }
    }
}

/// Fatal error of an export operation.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("nothing is selected")]
    NothingSelected,

    #[error("no selected prim may be exported")]
    NothingExportable,

    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

/// Fatal error of an import operation.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("archive format version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error(transparent)]
    Archive(ArchiveError),

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("uploading the archive's assets costs {cost}, more than the available balance")]
    InsufficientFunds { cost: u32 },

    #[error("import has already started")]
    AlreadyStarted,

    #[error("import was cancelled")]
    Cancelled,
}

impl From<DecodeError> for ImportError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::UnsupportedVersion { version, supported } => ImportError::UnsupportedVersion {
                found: version,
                supported,
            },
            other => ImportError::Archive(ArchiveError::Decode(other)),
        }
    }
}

impl From<ArchiveError> for ImportError {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::Decode(decode) => decode.into(),
            other => ImportError::Archive(other),
        }
    }
}

/// Error from the operation registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("an {0} operation is already running")]
    Busy(OperationKind),
}
