//! Core data types for linkset archives.

pub mod asset;
pub mod id;
pub mod manifest;
pub mod math;
pub mod permissions;
pub mod prim;

pub use asset::{AssetBlob, AssetType, InventoryType, EMPTY_NOTECARD};
pub use id::{Id, NIL_ID};
pub use manifest::{ExportManifest, InventoryRecord, ManifestHeader};
pub use math::{Quaternion, Vector3};
pub use permissions::{Permissions, SaleInfo, SaleType};
pub use prim::{
    FaceMaterial, FlexibleParams, LightImageParams, LightParams, ParticleParams, PathParams,
    PhysicsParams, PrimRecord, ProfileParams, SculptParams, TextureEntry, VolumeParams,
};
