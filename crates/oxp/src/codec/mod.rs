//! Binary encoding/decoding for linkset archives.

pub mod manifest;
pub mod prim;
pub mod primitives;

pub use manifest::{
    decode_manifest, decompress, encode_manifest, encode_manifest_compressed, read_archive,
    write_archive,
};
pub use primitives::{Reader, Writer};
