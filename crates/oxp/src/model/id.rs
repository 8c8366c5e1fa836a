//! Identifiers and well-known ids.
//!
//! Every object, item and asset is addressed by an RFC 4122 UUID. The nil
//! UUID means "no reference".

use md5::{Digest, Md5};
use uuid::Uuid;

/// A 16-byte UUID identifier.
pub type Id = Uuid;

/// The zero/nil UUID.
pub const NIL_ID: Id = Uuid::nil();

/// Plywood texture substituted for faces whose texture may not be exported.
pub const DEFAULT_TEXTURE_ID: Id = Uuid::from_u128(0x89556747_24cb_43ed_920b_47caed15465f);

/// Blank white library texture.
pub const BLANK_TEXTURE_ID: Id = Uuid::from_u128(0x5748decc_f629_461c_9a36_a35a221fe21f);

/// Transparent library texture.
pub const TRANSPARENT_TEXTURE_ID: Id = Uuid::from_u128(0x8dcd4a48_2d37_4909_9f78_f7a9eb4ef903);

/// Invisible-prim library texture.
pub const INVISIBLE_TEXTURE_ID: Id = Uuid::from_u128(0x38b86f85_2575_52a9_a531_23108d8da837);

/// Sculpt map used when a prim's own sculpt map may not be exported.
pub const DEFAULT_SCULPT_ID: Id = Uuid::from_u128(0xbe293869_d0d9_0a69_5989_ad27f1946fd4);

/// Library textures every resident may use; these never need fetching.
pub const LIBRARY_TEXTURES: [Id; 4] = [
    DEFAULT_TEXTURE_ID,
    BLANK_TEXTURE_ID,
    TRANSPARENT_TEXTURE_ID,
    INVISIBLE_TEXTURE_ID,
];

/// Returns true if `id` is one of the [`LIBRARY_TEXTURES`].
pub fn is_library_texture(id: &Id) -> bool {
    LIBRARY_TEXTURES.contains(id)
}

/// Combines two ids the way the grid does: the raw MD5 digest of both
/// ids' bytes, taken as a UUID without version or variant adjustment.
pub fn combine_ids(a: &Id, b: &Id) -> Id {
    let mut hasher = Md5::new();
    hasher.update(a.as_bytes());
    hasher.update(b.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest);
    Uuid::from_bytes(bytes)
}

/// The asset id the grid assigns to a store keyed by transaction.
///
/// ```text
/// asset_id = MD5(transaction_id || secure_session_id)
/// ```
///
/// Only legacy and temporary stores are addressed this way. Capability
/// uploads report their new id in the response.
pub fn transaction_asset_id(transaction_id: &Id, secure_session_id: &Id) -> Id {
    combine_ids(transaction_id, secure_session_id)
}

/// Formats an id in lowercase hyphenated form.
pub fn format_id(id: &Id) -> String {
    id.hyphenated().to_string()
}

/// Parses an id from hex text, with or without hyphens.
pub fn parse_id(s: &str) -> Option<Id> {
    Uuid::try_parse(s.trim()).ok()
}
