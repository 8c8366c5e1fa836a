//! Prim records: shape, surface and optional parameter blocks of one object.

use crate::model::id::{DEFAULT_SCULPT_ID, Id, NIL_ID};
use crate::model::math::{Quaternion, Vector3};
use crate::model::permissions::{Permissions, SaleInfo};

/// Material code of the wood preset.
pub const MATERIAL_WOOD: u8 = 3;

/// Sculpt type marking a mesh rather than a sculpt map.
pub const SCULPT_TYPE_MESH: u8 = 5;

/// Sculpt type of the default sphere sculpt.
pub const SCULPT_TYPE_SPHERE: u8 = 1;

pub const PATH_CURVE_LINE: u8 = 0x10;
pub const PROFILE_CURVE_SQUARE: u8 = 0x01;

/// Extrusion path of a volume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathParams {
    pub curve: u8,
    pub begin: f32,
    pub end: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub shear_x: f32,
    pub shear_y: f32,
    pub twist_begin: f32,
    pub twist_end: f32,
    pub radius_offset: f32,
    pub taper_x: f32,
    pub taper_y: f32,
    pub revolutions: f32,
    pub skew: f32,
}

impl Default for PathParams {
    fn default() -> Self {
        Self {
            curve: PATH_CURVE_LINE,
            begin: 0.0,
            end: 1.0,
            scale_x: 1.0,
            scale_y: 1.0,
            shear_x: 0.0,
            shear_y: 0.0,
            twist_begin: 0.0,
            twist_end: 0.0,
            radius_offset: 0.0,
            taper_x: 0.0,
            taper_y: 0.0,
            revolutions: 1.0,
            skew: 0.0,
        }
    }
}

/// Cross-section profile of a volume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileParams {
    pub curve: u8,
    pub begin: f32,
    pub end: f32,
    pub hollow: f32,
}

impl Default for ProfileParams {
    fn default() -> Self {
        Self {
            curve: PROFILE_CURVE_SQUARE,
            begin: 0.0,
            end: 1.0,
            hollow: 0.0,
        }
    }
}

/// Volume shape. The default is a plain box.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VolumeParams {
    pub path: PathParams,
    pub profile: ProfileParams,
}

/// Surface of one face.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureEntry {
    pub image_id: Id,
    pub color: [f32; 4],
    pub repeats: [f32; 2],
    pub offsets: [f32; 2],
    pub rotation: f32,
    /// Packed bump, shiny and fullbright bits.
    pub bump_shiny: u8,
    pub media_flags: u8,
    pub glow: f32,
}

impl TextureEntry {
    pub fn with_image(image_id: Id) -> Self {
        Self {
            image_id,
            ..Self::default()
        }
    }
}

impl Default for TextureEntry {
    fn default() -> Self {
        Self {
            image_id: NIL_ID,
            color: [1.0, 1.0, 1.0, 1.0],
            repeats: [1.0, 1.0],
            offsets: [0.0, 0.0],
            rotation: 0.0,
            bump_shiny: 0,
            media_flags: 0,
            glow: 0.0,
        }
    }
}

/// Normal/specular material overrides on one face.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceMaterial {
    pub face: u8,
    pub normal_map: Id,
    pub normal_offset: [f32; 2],
    pub normal_repeat: [f32; 2],
    pub normal_rotation: f32,
    pub specular_map: Id,
    pub specular_offset: [f32; 2],
    pub specular_repeat: [f32; 2],
    pub specular_rotation: f32,
    pub specular_color: [u8; 4],
    pub specular_exponent: u8,
    pub environment_intensity: u8,
    pub diffuse_alpha_mode: u8,
    pub alpha_mask_cutoff: u8,
}

impl FaceMaterial {
    pub fn new(face: u8, normal_map: Id, specular_map: Id) -> Self {
        Self {
            face,
            normal_map,
            normal_offset: [0.0, 0.0],
            normal_repeat: [1.0, 1.0],
            normal_rotation: 0.0,
            specular_map,
            specular_offset: [0.0, 0.0],
            specular_repeat: [1.0, 1.0],
            specular_rotation: 0.0,
            specular_color: [255, 255, 255, 255],
            specular_exponent: 51,
            environment_intensity: 0,
            diffuse_alpha_mode: 1,
            alpha_mask_cutoff: 0,
        }
    }

    /// Non-nil texture maps referenced by this material.
    pub fn maps(&self) -> impl Iterator<Item = Id> + '_ {
        [self.normal_map, self.specular_map]
            .into_iter()
            .filter(|id| !id.is_nil())
    }
}

/// Sculpt map or mesh reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SculptParams {
    pub texture: Id,
    pub sculpt_type: u8,
}

impl SculptParams {
    pub fn is_mesh(&self) -> bool {
        self.sculpt_type & 0x07 == SCULPT_TYPE_MESH
    }
}

impl Default for SculptParams {
    fn default() -> Self {
        Self {
            texture: DEFAULT_SCULPT_ID,
            sculpt_type: SCULPT_TYPE_SPHERE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FlexibleParams {
    pub softness: i32,
    pub gravity: f32,
    pub tension: f32,
    pub air_friction: f32,
    pub wind_sensitivity: f32,
    pub user_force: Vector3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightParams {
    pub color: [f32; 4],
    pub radius: f32,
    pub cutoff: f32,
    pub falloff: f32,
}

impl Default for LightParams {
    fn default() -> Self {
        Self {
            color: [1.0, 1.0, 1.0, 1.0],
            radius: 10.0,
            cutoff: 0.0,
            falloff: 0.75,
        }
    }
}

/// Projector texture for a light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightImageParams {
    pub texture: Id,
    /// Field of view, focus and ambiance.
    pub params: Vector3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleParams {
    pub pattern: u8,
    pub flags: u32,
    pub max_age: f32,
    pub start_age: f32,
    pub inner_angle: f32,
    pub outer_angle: f32,
    pub burst_rate: f32,
    pub burst_radius: f32,
    pub burst_speed_min: f32,
    pub burst_speed_max: f32,
    pub burst_part_count: u8,
    pub angular_velocity: Vector3,
    pub acceleration: Vector3,
    pub image: Id,
    pub target: Id,
    pub part_flags: u32,
    pub part_max_age: f32,
    pub start_color: [f32; 4],
    pub end_color: [f32; 4],
    pub start_scale: [f32; 2],
    pub end_scale: [f32; 2],
}

impl Default for ParticleParams {
    fn default() -> Self {
        Self {
            pattern: 0x02,
            flags: 0,
            max_age: 0.0,
            start_age: 0.0,
            inner_angle: 0.0,
            outer_angle: 0.0,
            burst_rate: 0.1,
            burst_radius: 0.0,
            burst_speed_min: 1.0,
            burst_speed_max: 1.0,
            burst_part_count: 1,
            angular_velocity: Vector3::ZERO,
            acceleration: Vector3::ZERO,
            image: NIL_ID,
            target: NIL_ID,
            part_flags: 0,
            part_max_age: 10.0,
            start_color: [1.0, 1.0, 1.0, 1.0],
            end_color: [1.0, 1.0, 1.0, 1.0],
            start_scale: [1.0, 1.0],
            end_scale: [1.0, 1.0],
        }
    }
}

/// Physics shape and material overrides.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicsParams {
    pub shape_type: u8,
    pub density: f32,
    pub friction: f32,
    pub restitution: f32,
    pub gravity_multiplier: f32,
}

impl Default for PhysicsParams {
    fn default() -> Self {
        Self {
            shape_type: 0,
            density: 1000.0,
            friction: 0.6,
            restitution: 0.5,
            gravity_multiplier: 1.0,
        }
    }
}

/// Everything an archive records about one prim.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimRecord {
    /// Root prim of the linkset; `None` on the root itself.
    pub parent: Option<Id>,
    /// Attachment point, recorded on worn roots only.
    pub attachment_point: Option<u8>,
    /// Region position for roots, offset from the root for children.
    pub position: Vector3,
    pub scale: Vector3,
    /// Region rotation for roots, rotation relative to the root for children.
    pub rotation: Quaternion,
    pub flags: u32,
    pub volume: VolumeParams,
    pub material: u8,
    pub click_action: Option<u8>,
    pub textures: Vec<TextureEntry>,
    pub materials: Vec<FaceMaterial>,
    pub sculpt: Option<SculptParams>,
    pub flexible: Option<FlexibleParams>,
    pub light: Option<LightParams>,
    pub light_image: Option<LightImageParams>,
    pub particles: Option<ParticleParams>,
    pub physics: Option<PhysicsParams>,
    pub permissions: Option<Permissions>,
    pub sale_info: Option<SaleInfo>,
    /// Inventory item ids held by this prim, in their original order.
    pub content: Vec<Id>,
    pub name: String,
    pub description: String,
    pub touch_name: String,
    pub sit_name: String,
    /// Creation time in microseconds since the Unix epoch.
    pub creation_date: u64,
}

impl PrimRecord {
    /// The minimal record emitted for a prim that may not be exported.
    ///
    /// Keeps the transform and link structure so the linkset keeps its shape.
    pub fn placeholder(
        position: Vector3,
        scale: Vector3,
        rotation: Quaternion,
        parent: Option<Id>,
        attachment_point: Option<u8>,
    ) -> Self {
        Self {
            parent,
            attachment_point,
            position,
            scale,
            rotation,
            flags: 0,
            volume: VolumeParams::default(),
            material: MATERIAL_WOOD,
            click_action: None,
            textures: Vec::new(),
            materials: Vec::new(),
            sculpt: None,
            flexible: None,
            light: None,
            light_image: None,
            particles: None,
            physics: None,
            permissions: None,
            sale_info: None,
            content: Vec::new(),
            name: String::new(),
            description: String::new(),
            touch_name: String::new(),
            sit_name: String::new(),
            creation_date: 0,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Returns true if this record is a placeholder: no surface, no extra
    /// parameter blocks, no ownership.
    pub fn is_placeholder(&self) -> bool {
        self.flags == 0
            && self.material == MATERIAL_WOOD
            && self.volume == VolumeParams::default()
            && self.textures.is_empty()
            && self.materials.is_empty()
            && self.sculpt.is_none()
            && self.flexible.is_none()
            && self.light.is_none()
            && self.light_image.is_none()
            && self.particles.is_none()
            && self.permissions.is_none()
            && self.content.is_empty()
    }

    /// Every texture id this prim references, in face order, duplicates
    /// included, nil excluded. Mesh references are not textures and are
    /// left out.
    pub fn texture_refs(&self) -> Vec<Id> {
        let mut refs: Vec<Id> = self.textures.iter().map(|te| te.image_id).collect();
        for material in &self.materials {
            refs.extend(material.maps());
        }
        if let Some(sculpt) = &self.sculpt {
            if !sculpt.is_mesh() {
                refs.push(sculpt.texture);
            }
        }
        if let Some(image) = &self.light_image {
            refs.push(image.texture);
        }
        if let Some(particles) = &self.particles {
            refs.push(particles.image);
        }
        refs.retain(|id| !id.is_nil());
        refs
    }
}
