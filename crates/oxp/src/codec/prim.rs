//! Prim record encoding/decoding.
//!
//! A record starts with two presence bytes. Each bit announces one optional
//! block; the blocks follow in bit order after the fixed fields.

use crate::codec::primitives::{Reader, Writer};
use crate::error::DecodeError;
use crate::limits::{MAX_CONTENT_ITEMS, MAX_FACES, MAX_STRING_LEN};
use crate::model::{
    FaceMaterial, FlexibleParams, LightImageParams, LightParams, ParticleParams, PathParams,
    Permissions, PhysicsParams, PrimRecord, ProfileParams, SaleInfo, SaleType, SculptParams,
    TextureEntry, VolumeParams,
};

const HAS_PARENT: u8 = 0x01;
const HAS_ATTACHMENT: u8 = 0x02;
const HAS_CLICK_ACTION: u8 = 0x04;
const HAS_SCULPT: u8 = 0x08;
const HAS_FLEXIBLE: u8 = 0x10;
const HAS_LIGHT: u8 = 0x20;
const HAS_LIGHT_IMAGE: u8 = 0x40;
const HAS_PARTICLES: u8 = 0x80;

const HAS_PHYSICS: u8 = 0x01;
const HAS_PERMISSIONS: u8 = 0x02;
const HAS_SALE_INFO: u8 = 0x04;
const EXTRA_RESERVED_MASK: u8 = 0xF8;

// =============================================================================
// DECODING
// =============================================================================

pub fn decode_prim(reader: &mut Reader<'_>) -> Result<PrimRecord, DecodeError> {
    let flags = reader.read_byte("prim_presence")?;
    let extra = reader.read_byte("prim_presence")?;
    if extra & EXTRA_RESERVED_MASK != 0 {
        return Err(DecodeError::ReservedBitsSet { context: "prim_presence" });
    }

    let parent = if flags & HAS_PARENT != 0 {
        Some(reader.read_id("parent")?)
    } else {
        None
    };
    let attachment_point = if flags & HAS_ATTACHMENT != 0 {
        Some(reader.read_byte("attachment_point")?)
    } else {
        None
    };

    let position = reader.read_vector("position")?;
    let scale = reader.read_vector("scale")?;
    let rotation = reader.read_quaternion("rotation")?;
    let prim_flags = reader.read_u32("flags")?;
    let volume = decode_volume(reader)?;
    let material = reader.read_byte("material")?;

    let face_count = reader.read_count(MAX_FACES, "textures")?;
    let mut textures = Vec::with_capacity(face_count);
    for _ in 0..face_count {
        textures.push(decode_texture_entry(reader)?);
    }
    let material_count = reader.read_count(MAX_FACES, "materials")?;
    let mut materials = Vec::with_capacity(material_count);
    for _ in 0..material_count {
        materials.push(decode_face_material(reader)?);
    }

    let content = reader.read_id_vec(MAX_CONTENT_ITEMS, "content")?;
    let name = reader.read_string(MAX_STRING_LEN, "prim_name")?;
    let description = reader.read_string(MAX_STRING_LEN, "prim_description")?;
    let touch_name = reader.read_string(MAX_STRING_LEN, "touch_name")?;
    let sit_name = reader.read_string(MAX_STRING_LEN, "sit_name")?;
    let creation_date = reader.read_varint("creation_date")?;

    let click_action = if flags & HAS_CLICK_ACTION != 0 {
        Some(reader.read_byte("click_action")?)
    } else {
        None
    };
    let sculpt = if flags & HAS_SCULPT != 0 {
        Some(SculptParams {
            texture: reader.read_id("sculpt")?,
            sculpt_type: reader.read_byte("sculpt")?,
        })
    } else {
        None
    };
    let flexible = if flags & HAS_FLEXIBLE != 0 {
        Some(FlexibleParams {
            softness: reader.read_signed_varint("flexible")? as i32,
            gravity: reader.read_f32("flexible")?,
            tension: reader.read_f32("flexible")?,
            air_friction: reader.read_f32("flexible")?,
            wind_sensitivity: reader.read_f32("flexible")?,
            user_force: reader.read_vector("flexible")?,
        })
    } else {
        None
    };
    let light = if flags & HAS_LIGHT != 0 {
        Some(LightParams {
            color: reader.read_f32_array("light")?,
            radius: reader.read_f32("light")?,
            cutoff: reader.read_f32("light")?,
            falloff: reader.read_f32("light")?,
        })
    } else {
        None
    };
    let light_image = if flags & HAS_LIGHT_IMAGE != 0 {
        Some(LightImageParams {
            texture: reader.read_id("light_image")?,
            params: reader.read_vector("light_image")?,
        })
    } else {
        None
    };
    let particles = if flags & HAS_PARTICLES != 0 {
        Some(decode_particles(reader)?)
    } else {
        None
    };
    let physics = if extra & HAS_PHYSICS != 0 {
        Some(PhysicsParams {
            shape_type: reader.read_byte("physics")?,
            density: reader.read_f32("physics")?,
            friction: reader.read_f32("physics")?,
            restitution: reader.read_f32("physics")?,
            gravity_multiplier: reader.read_f32("physics")?,
        })
    } else {
        None
    };
    let permissions = if extra & HAS_PERMISSIONS != 0 {
        Some(decode_permissions(reader)?)
    } else {
        None
    };
    let sale_info = if extra & HAS_SALE_INFO != 0 {
        Some(decode_sale_info(reader)?)
    } else {
        None
    };

    Ok(PrimRecord {
        parent,
        attachment_point,
        position,
        scale,
        rotation,
        flags: prim_flags,
        volume,
        material,
        click_action,
        textures,
        materials,
        sculpt,
        flexible,
        light,
        light_image,
        particles,
        physics,
        permissions,
        sale_info,
        content,
        name,
        description,
        touch_name,
        sit_name,
        creation_date,
    })
}

fn decode_volume(reader: &mut Reader<'_>) -> Result<VolumeParams, DecodeError> {
    let path_curve = reader.read_byte("path")?;
    let [begin, end, scale_x, scale_y, shear_x, shear_y, twist_begin, twist_end] =
        reader.read_f32_array::<8>("path")?;
    let [radius_offset, taper_x, taper_y, revolutions, skew] = reader.read_f32_array::<5>("path")?;
    let profile_curve = reader.read_byte("profile")?;
    let [p_begin, p_end, hollow] = reader.read_f32_array::<3>("profile")?;

    Ok(VolumeParams {
        path: PathParams {
            curve: path_curve,
            begin,
            end,
            scale_x,
            scale_y,
            shear_x,
            shear_y,
            twist_begin,
            twist_end,
            radius_offset,
            taper_x,
            taper_y,
            revolutions,
            skew,
        },
        profile: ProfileParams {
            curve: profile_curve,
            begin: p_begin,
            end: p_end,
            hollow,
        },
    })
}

fn decode_texture_entry(reader: &mut Reader<'_>) -> Result<TextureEntry, DecodeError> {
    Ok(TextureEntry {
        image_id: reader.read_id("texture_entry")?,
        color: reader.read_f32_array("texture_entry")?,
        repeats: reader.read_f32_array("texture_entry")?,
        offsets: reader.read_f32_array("texture_entry")?,
        rotation: reader.read_f32("texture_entry")?,
        bump_shiny: reader.read_byte("texture_entry")?,
        media_flags: reader.read_byte("texture_entry")?,
        glow: reader.read_f32("texture_entry")?,
    })
}

fn decode_face_material(reader: &mut Reader<'_>) -> Result<FaceMaterial, DecodeError> {
    let face = reader.read_byte("material")?;
    let normal_map = reader.read_id("material")?;
    let normal_offset = reader.read_f32_array("material")?;
    let normal_repeat = reader.read_f32_array("material")?;
    let normal_rotation = reader.read_f32("material")?;
    let specular_map = reader.read_id("material")?;
    let specular_offset = reader.read_f32_array("material")?;
    let specular_repeat = reader.read_f32_array("material")?;
    let specular_rotation = reader.read_f32("material")?;
    let tail = reader.read_bytes(8, "material")?;
    Ok(FaceMaterial {
        face,
        normal_map,
        normal_offset,
        normal_repeat,
        normal_rotation,
        specular_map,
        specular_offset,
        specular_repeat,
        specular_rotation,
        specular_color: [tail[0], tail[1], tail[2], tail[3]],
        specular_exponent: tail[4],
        environment_intensity: tail[5],
        diffuse_alpha_mode: tail[6],
        alpha_mask_cutoff: tail[7],
    })
}

fn decode_particles(reader: &mut Reader<'_>) -> Result<ParticleParams, DecodeError> {
    let pattern = reader.read_byte("particles")?;
    let flags = reader.read_u32("particles")?;
    let [max_age, start_age, inner_angle, outer_angle, burst_rate, burst_radius, burst_speed_min, burst_speed_max] =
        reader.read_f32_array::<8>("particles")?;
    let burst_part_count = reader.read_byte("particles")?;
    let angular_velocity = reader.read_vector("particles")?;
    let acceleration = reader.read_vector("particles")?;
    let image = reader.read_id("particles")?;
    let target = reader.read_id("particles")?;
    let part_flags = reader.read_u32("particles")?;
    let part_max_age = reader.read_f32("particles")?;
    Ok(ParticleParams {
        pattern,
        flags,
        max_age,
        start_age,
        inner_angle,
        outer_angle,
        burst_rate,
        burst_radius,
        burst_speed_min,
        burst_speed_max,
        burst_part_count,
        angular_velocity,
        acceleration,
        image,
        target,
        part_flags,
        part_max_age,
        start_color: reader.read_f32_array("particles")?,
        end_color: reader.read_f32_array("particles")?,
        start_scale: reader.read_f32_array("particles")?,
        end_scale: reader.read_f32_array("particles")?,
    })
}

pub(crate) fn decode_permissions(reader: &mut Reader<'_>) -> Result<Permissions, DecodeError> {
    Ok(Permissions {
        creator: reader.read_id("permissions")?,
        owner: reader.read_id("permissions")?,
        group: reader.read_id("permissions")?,
        last_owner: reader.read_id("permissions")?,
        base_mask: reader.read_u32("permissions")?,
        owner_mask: reader.read_u32("permissions")?,
        group_mask: reader.read_u32("permissions")?,
        everyone_mask: reader.read_u32("permissions")?,
        next_owner_mask: reader.read_u32("permissions")?,
    })
}

pub(crate) fn decode_sale_info(reader: &mut Reader<'_>) -> Result<SaleInfo, DecodeError> {
    let code = reader.read_byte("sale_info")?;
    let sale_type = SaleType::from_code(code).ok_or(DecodeError::InvalidSaleType { code })?;
    let price = reader.read_signed_varint("sale_info")? as i32;
    Ok(SaleInfo { sale_type, price })
}

// =============================================================================
// ENCODING
// =============================================================================

pub fn encode_prim(writer: &mut Writer, prim: &PrimRecord) {
    let mut flags = 0u8;
    let mut extra = 0u8;
    if prim.parent.is_some() {
        flags |= HAS_PARENT;
    }
    if prim.attachment_point.is_some() {
        flags |= HAS_ATTACHMENT;
    }
    if prim.click_action.is_some() {
        flags |= HAS_CLICK_ACTION;
    }
    if prim.sculpt.is_some() {
        flags |= HAS_SCULPT;
    }
    if prim.flexible.is_some() {
        flags |= HAS_FLEXIBLE;
    }
    if prim.light.is_some() {
        flags |= HAS_LIGHT;
    }
    if prim.light_image.is_some() {
        flags |= HAS_LIGHT_IMAGE;
    }
    if prim.particles.is_some() {
        flags |= HAS_PARTICLES;
    }
    if prim.physics.is_some() {
        extra |= HAS_PHYSICS;
    }
    if prim.permissions.is_some() {
        extra |= HAS_PERMISSIONS;
    }
    if prim.sale_info.is_some() {
        extra |= HAS_SALE_INFO;
    }
    writer.write_byte(flags);
    writer.write_byte(extra);

    if let Some(parent) = &prim.parent {
        writer.write_id(parent);
    }
    if let Some(point) = prim.attachment_point {
        writer.write_byte(point);
    }

    writer.write_vector(&prim.position);
    writer.write_vector(&prim.scale);
    writer.write_quaternion(&prim.rotation);
    writer.write_varint(u64::from(prim.flags));
    encode_volume(writer, &prim.volume);
    writer.write_byte(prim.material);

    writer.write_varint(prim.textures.len() as u64);
    for te in &prim.textures {
        encode_texture_entry(writer, te);
    }
    writer.write_varint(prim.materials.len() as u64);
    for material in &prim.materials {
        encode_face_material(writer, material);
    }

    writer.write_id_vec(&prim.content);
    writer.write_string(&prim.name);
    writer.write_string(&prim.description);
    writer.write_string(&prim.touch_name);
    writer.write_string(&prim.sit_name);
    writer.write_varint(prim.creation_date);

    if let Some(action) = prim.click_action {
        writer.write_byte(action);
    }
    if let Some(sculpt) = &prim.sculpt {
        writer.write_id(&sculpt.texture);
        writer.write_byte(sculpt.sculpt_type);
    }
    if let Some(flex) = &prim.flexible {
        writer.write_signed_varint(i64::from(flex.softness));
        writer.write_f32_slice(&[flex.gravity, flex.tension, flex.air_friction, flex.wind_sensitivity]);
        writer.write_vector(&flex.user_force);
    }
    if let Some(light) = &prim.light {
        writer.write_f32_slice(&light.color);
        writer.write_f32_slice(&[light.radius, light.cutoff, light.falloff]);
    }
    if let Some(image) = &prim.light_image {
        writer.write_id(&image.texture);
        writer.write_vector(&image.params);
    }
    if let Some(particles) = &prim.particles {
        encode_particles(writer, particles);
    }
    if let Some(physics) = &prim.physics {
        writer.write_byte(physics.shape_type);
        writer.write_f32_slice(&[
            physics.density,
            physics.friction,
            physics.restitution,
            physics.gravity_multiplier,
        ]);
    }
    if let Some(perms) = &prim.permissions {
        encode_permissions(writer, perms);
    }
    if let Some(sale) = &prim.sale_info {
        encode_sale_info(writer, sale);
    }
}

fn encode_volume(writer: &mut Writer, volume: &VolumeParams) {
    let path = &volume.path;
    writer.write_byte(path.curve);
    writer.write_f32_slice(&[
        path.begin,
        path.end,
        path.scale_x,
        path.scale_y,
        path.shear_x,
        path.shear_y,
        path.twist_begin,
        path.twist_end,
        path.radius_offset,
        path.taper_x,
        path.taper_y,
        path.revolutions,
        path.skew,
    ]);
    let profile = &volume.profile;
    writer.write_byte(profile.curve);
    writer.write_f32_slice(&[profile.begin, profile.end, profile.hollow]);
}

fn encode_texture_entry(writer: &mut Writer, te: &TextureEntry) {
    writer.write_id(&te.image_id);
    writer.write_f32_slice(&te.color);
    writer.write_f32_slice(&te.repeats);
    writer.write_f32_slice(&te.offsets);
    writer.write_f32(te.rotation);
    writer.write_byte(te.bump_shiny);
    writer.write_byte(te.media_flags);
    writer.write_f32(te.glow);
}

fn encode_face_material(writer: &mut Writer, m: &FaceMaterial) {
    writer.write_byte(m.face);
    writer.write_id(&m.normal_map);
    writer.write_f32_slice(&m.normal_offset);
    writer.write_f32_slice(&m.normal_repeat);
    writer.write_f32(m.normal_rotation);
    writer.write_id(&m.specular_map);
    writer.write_f32_slice(&m.specular_offset);
    writer.write_f32_slice(&m.specular_repeat);
    writer.write_f32(m.specular_rotation);
    writer.write_bytes(&m.specular_color);
    writer.write_bytes(&[
        m.specular_exponent,
        m.environment_intensity,
        m.diffuse_alpha_mode,
        m.alpha_mask_cutoff,
    ]);
}

fn encode_particles(writer: &mut Writer, p: &ParticleParams) {
    writer.write_byte(p.pattern);
    writer.write_varint(u64::from(p.flags));
    writer.write_f32_slice(&[
        p.max_age,
        p.start_age,
        p.inner_angle,
        p.outer_angle,
        p.burst_rate,
        p.burst_radius,
        p.burst_speed_min,
        p.burst_speed_max,
    ]);
    writer.write_byte(p.burst_part_count);
    writer.write_vector(&p.angular_velocity);
    writer.write_vector(&p.acceleration);
    writer.write_id(&p.image);
    writer.write_id(&p.target);
    writer.write_varint(u64::from(p.part_flags));
    writer.write_f32(p.part_max_age);
    writer.write_f32_slice(&p.start_color);
    writer.write_f32_slice(&p.end_color);
    writer.write_f32_slice(&p.start_scale);
    writer.write_f32_slice(&p.end_scale);
}

pub(crate) fn encode_permissions(writer: &mut Writer, perms: &Permissions) {
    writer.write_id(&perms.creator);
    writer.write_id(&perms.owner);
    writer.write_id(&perms.group);
    writer.write_id(&perms.last_owner);
    for mask in [
        perms.base_mask,
        perms.owner_mask,
        perms.group_mask,
        perms.everyone_mask,
        perms.next_owner_mask,
    ] {
        writer.write_varint(u64::from(mask));
    }
}

pub(crate) fn encode_sale_info(writer: &mut Writer, sale: &SaleInfo) {
    writer.write_byte(sale.sale_type as u8);
    writer.write_signed_varint(i64::from(sale.price));
}
