//! Archive encoding/decoding.
//!
//! Uncompressed body: `OXPA` magic, format version, header strings, then the
//! linkset, prim, inventory and asset tables. On disk the body is wrapped as
//! `OXPAZ` + uncompressed size + zstd frame.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::codec::prim::{decode_permissions, decode_prim, decode_sale_info, encode_permissions, encode_prim, encode_sale_info};
use crate::codec::primitives::{Reader, Writer};
use crate::error::{ArchiveError, DecodeError, EncodeError};
use crate::limits::{
    FORMAT_VERSION, MAGIC_COMPRESSED, MAGIC_UNCOMPRESSED, MAX_ARCHIVE_SIZE, MAX_ASSET_SIZE,
    MAX_ENTRIES, MAX_LINKSETS, MAX_PRIMS, MAX_PRIMS_PER_LINKSET, MAX_STRING_LEN,
};
use crate::model::{
    AssetBlob, AssetType, ExportManifest, InventoryRecord, InventoryType, ManifestHeader,
};

// =============================================================================
// DECODING
// =============================================================================

/// Decompresses an `OXPAZ` archive, returning the uncompressed body.
pub fn decompress(input: &[u8]) -> Result<Vec<u8>, DecodeError> {
    if input.len() < MAGIC_COMPRESSED.len() {
        return Err(DecodeError::UnexpectedEof { context: "magic" });
    }
    if &input[..MAGIC_COMPRESSED.len()] != MAGIC_COMPRESSED {
        return Err(invalid_magic(input));
    }
    decompress_zstd(&input[MAGIC_COMPRESSED.len()..])
}

/// Decodes an archive, compressed or not.
pub fn decode_manifest(input: &[u8]) -> Result<ExportManifest, DecodeError> {
    if input.len() < MAGIC_UNCOMPRESSED.len() {
        return Err(DecodeError::UnexpectedEof { context: "magic" });
    }

    if input.starts_with(MAGIC_COMPRESSED) {
        let body = decompress_zstd(&input[MAGIC_COMPRESSED.len()..])?;
        decode_body(&body)
    } else if input.starts_with(MAGIC_UNCOMPRESSED) {
        if input.len() > MAX_ARCHIVE_SIZE {
            return Err(DecodeError::LengthExceedsLimit {
                field: "archive",
                len: input.len(),
                max: MAX_ARCHIVE_SIZE,
            });
        }
        decode_body(input)
    } else {
        Err(invalid_magic(input))
    }
}

fn invalid_magic(input: &[u8]) -> DecodeError {
    let mut found = [0u8; 4];
    found.copy_from_slice(&input[..4]);
    DecodeError::InvalidMagic { found }
}

fn decode_body(data: &[u8]) -> Result<ExportManifest, DecodeError> {
    let mut reader = Reader::new(data);
    reader.read_bytes(MAGIC_UNCOMPRESSED.len(), "magic")?;

    let format_version = reader.read_u32("format_version")?;
    if format_version == 0 || format_version > FORMAT_VERSION {
        return Err(DecodeError::UnsupportedVersion {
            version: format_version,
            supported: FORMAT_VERSION,
        });
    }

    let header = ManifestHeader {
        client: reader.read_string(MAX_STRING_LEN, "client")?,
        client_version: reader.read_string(MAX_STRING_LEN, "client_version")?,
        author: reader.read_string(MAX_STRING_LEN, "author")?,
        creation_date: reader.read_string(MAX_STRING_LEN, "creation_date")?,
        grid: reader.read_string(MAX_STRING_LEN, "grid")?,
    };

    let linkset_count = reader.read_count(MAX_LINKSETS, "linksets")?;
    let mut linksets = Vec::with_capacity(linkset_count);
    for _ in 0..linkset_count {
        linksets.push(reader.read_id_vec(MAX_PRIMS_PER_LINKSET, "linkset")?);
    }

    let prim_count = reader.read_count(MAX_PRIMS, "prims")?;
    let mut prims = BTreeMap::new();
    for _ in 0..prim_count {
        let id = reader.read_id("prim_id")?;
        let prim = decode_prim(&mut reader)?;
        if prims.insert(id, prim).is_some() {
            return Err(DecodeError::DuplicateEntry { map: "prims", id });
        }
    }

    let inventory_count = reader.read_count(MAX_ENTRIES, "inventory")?;
    let mut inventory = BTreeMap::new();
    for _ in 0..inventory_count {
        let record = decode_inventory_record(&mut reader)?;
        let id = record.item_id;
        if inventory.insert(id, record).is_some() {
            return Err(DecodeError::DuplicateEntry { map: "inventory", id });
        }
    }

    let asset_count = reader.read_count(MAX_ENTRIES, "assets")?;
    let mut assets = BTreeMap::new();
    for _ in 0..asset_count {
        let id = reader.read_id("asset_id")?;
        let blob = decode_asset_blob(&mut reader)?;
        if assets.insert(id, blob).is_some() {
            return Err(DecodeError::DuplicateEntry { map: "assets", id });
        }
    }

    if !reader.is_empty() {
        debug!(trailing = reader.remaining().len(), "ignoring trailing archive bytes");
    }

    Ok(ExportManifest {
        format_version,
        header,
        linksets,
        prims,
        inventory,
        assets,
    })
}

fn decode_asset_type(reader: &mut Reader<'_>) -> Result<AssetType, DecodeError> {
    let name = reader.read_string(16, "asset_type")?;
    AssetType::from_name(&name).ok_or(DecodeError::InvalidAssetType { name })
}

fn decode_inventory_record(reader: &mut Reader<'_>) -> Result<InventoryRecord, DecodeError> {
    let item_id = reader.read_id("item_id")?;
    let name = reader.read_string(MAX_STRING_LEN, "item_name")?;
    let description = reader.read_string(MAX_STRING_LEN, "item_description")?;
    let asset_type = decode_asset_type(reader)?;
    let code = reader.read_byte("inventory_type")? as i8;
    let inventory_type = InventoryType::from_code(code).ok_or(DecodeError::InvalidInventoryType { code })?;
    let permissions = decode_permissions(reader)?;
    let sale_info = decode_sale_info(reader)?;
    let flags = reader.read_u32("item_flags")?;
    let creation_date = reader.read_signed_varint("item_creation_date")?;
    let asset_id = reader.read_id("item_asset_id")?;
    Ok(InventoryRecord {
        item_id,
        name,
        description,
        asset_type,
        inventory_type,
        permissions,
        sale_info,
        flags,
        creation_date,
        asset_id,
    })
}

fn decode_asset_blob(reader: &mut Reader<'_>) -> Result<AssetBlob, DecodeError> {
    let asset_type = decode_asset_type(reader)?;
    let name = reader.read_string(MAX_STRING_LEN, "asset_name")?;
    let description = reader.read_string(MAX_STRING_LEN, "asset_description")?;
    let data = reader.read_bytes_prefixed(MAX_ASSET_SIZE, "asset_data")?;
    Ok(AssetBlob {
        name,
        description,
        asset_type,
        data,
    })
}

fn decompress_zstd(compressed: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut reader = Reader::new(compressed);
    let declared_size = reader.read_varint("uncompressed_size")? as usize;

    if declared_size > MAX_ARCHIVE_SIZE {
        return Err(DecodeError::LengthExceedsLimit {
            field: "uncompressed_size",
            len: declared_size,
            max: MAX_ARCHIVE_SIZE,
        });
    }

    let decoder = zstd::Decoder::new(reader.remaining())
        .map_err(|e| DecodeError::DecompressionFailed(e.to_string()))?;

    // One byte past the declared size is enough to detect a lying header.
    let mut body = Vec::with_capacity(declared_size);
    decoder
        .take(declared_size as u64 + 1)
        .read_to_end(&mut body)
        .map_err(|e| DecodeError::DecompressionFailed(e.to_string()))?;

    if body.len() != declared_size {
        return Err(DecodeError::UncompressedSizeMismatch {
            declared: declared_size,
            actual: body.len(),
        });
    }

    Ok(body)
}

// =============================================================================
// ENCODING
// =============================================================================

fn check_len(field: &'static str, len: usize, max: usize) -> Result<(), EncodeError> {
    if len > max {
        return Err(EncodeError::LengthExceedsLimit { field, len, max });
    }
    Ok(())
}

fn validate_manifest_limits(manifest: &ExportManifest) -> Result<(), EncodeError> {
    if manifest.format_version > FORMAT_VERSION {
        return Err(EncodeError::UnsupportedVersion {
            version: manifest.format_version,
            supported: FORMAT_VERSION,
        });
    }
    check_len("linksets", manifest.linksets.len(), MAX_LINKSETS)?;
    for linkset in &manifest.linksets {
        check_len("linkset", linkset.len(), MAX_PRIMS_PER_LINKSET)?;
    }
    check_len("prims", manifest.prims.len(), MAX_PRIMS)?;
    check_len("inventory", manifest.inventory.len(), MAX_ENTRIES)?;
    check_len("assets", manifest.assets.len(), MAX_ENTRIES)?;
    for blob in manifest.assets.values() {
        check_len("asset_data", blob.data.len(), MAX_ASSET_SIZE)?;
    }
    Ok(())
}

/// Encodes a manifest to the uncompressed body form.
pub fn encode_manifest(manifest: &ExportManifest) -> Result<Vec<u8>, EncodeError> {
    validate_manifest_limits(manifest)?;

    let asset_bytes: usize = manifest.assets.values().map(|b| b.data.len()).sum();
    let mut writer = Writer::with_capacity(1024 + asset_bytes);
    writer.write_bytes(MAGIC_UNCOMPRESSED);
    writer.write_varint(u64::from(manifest.format_version));

    let header = &manifest.header;
    for s in [
        &header.client,
        &header.client_version,
        &header.author,
        &header.creation_date,
        &header.grid,
    ] {
        writer.write_string(s);
    }

    writer.write_varint(manifest.linksets.len() as u64);
    for linkset in &manifest.linksets {
        writer.write_id_vec(linkset);
    }

    writer.write_varint(manifest.prims.len() as u64);
    for (id, prim) in &manifest.prims {
        writer.write_id(id);
        encode_prim(&mut writer, prim);
    }

    writer.write_varint(manifest.inventory.len() as u64);
    for record in manifest.inventory.values() {
        writer.write_id(&record.item_id);
        writer.write_string(&record.name);
        writer.write_string(&record.description);
        writer.write_string(record.asset_type.name());
        writer.write_byte(record.inventory_type.code() as u8);
        encode_permissions(&mut writer, &record.permissions);
        encode_sale_info(&mut writer, &record.sale_info);
        writer.write_varint(u64::from(record.flags));
        writer.write_signed_varint(record.creation_date);
        writer.write_id(&record.asset_id);
    }

    writer.write_varint(manifest.assets.len() as u64);
    for (id, blob) in &manifest.assets {
        writer.write_id(id);
        writer.write_string(blob.asset_type.name());
        writer.write_string(&blob.name);
        writer.write_string(&blob.description);
        writer.write_bytes_prefixed(&blob.data);
    }

    Ok(writer.into_bytes())
}

/// Encodes a manifest with zstd compression.
pub fn encode_manifest_compressed(manifest: &ExportManifest, level: i32) -> Result<Vec<u8>, EncodeError> {
    let body = encode_manifest(manifest)?;

    let compressed = zstd::encode_all(body.as_slice(), level)
        .map_err(|e| EncodeError::CompressionFailed(e.to_string()))?;

    let mut writer = Writer::with_capacity(MAGIC_COMPRESSED.len() + 10 + compressed.len());
    writer.write_bytes(MAGIC_COMPRESSED);
    writer.write_varint(body.len() as u64);
    writer.write_bytes(&compressed);

    Ok(writer.into_bytes())
}

// =============================================================================
// FILES
// =============================================================================

/// Compresses and writes a manifest to `path`, returning the bytes written.
pub fn write_archive(path: &Path, manifest: &ExportManifest, level: i32) -> Result<usize, ArchiveError> {
    let bytes = encode_manifest_compressed(manifest, level)?;
    std::fs::write(path, &bytes).map_err(|source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(bytes.len())
}

/// Reads and decodes the archive at `path`.
pub fn read_archive(path: &Path) -> Result<ExportManifest, ArchiveError> {
    let bytes = std::fs::read(path).map_err(|source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(decode_manifest(&bytes)?)
}
