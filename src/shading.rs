//! CPU reference of the shader math, formula for formula.
//!
//! The WGSL in [`crate::shaders`] is the shipped implementation; these
//! functions mirror it so the lighting equations can be exercised under
//! `cargo test` without a GPU. The arithmetic masks (multiply by 0 or 1
//! instead of branching) are kept here as well, so the tested formulas are
//! the ones that run on the hardware.

use glam::{Vec2, Vec3, Vec4};

use crate::material::{MaterialFlags, UniformMaterial};
use crate::probe::ProbeVolume;

/// Threshold for the material gate weights. A channel with `w` at or below
/// this is treated as absent.
pub const GATE_EPSILON: f32 = 1e-4;

/// Tolerance for the back-facing test on `dot(view, normal)`.
pub const FACING_EPSILON: f32 = 1e-6;

/// 0.0 below `edge`, 1.0 at or above it. Mirror of WGSL `step`.
fn step(edge: f32, value: f32) -> f32 {
    (value >= edge) as u32 as f32
}

/// Texture coordinates are stored with the vertical axis flipped.
pub fn flip_texcoord(uv: Vec2) -> Vec2 {
    Vec2::new(uv.x, 1.0 - uv.y)
}

/// Base color selection, a branchless blend on bit 0 of the flags.
pub fn decode_base_color(vertex_color: Vec3, sampled: Vec3, flags: MaterialFlags) -> Vec3 {
    let m = flags.color_texture_mask();
    vertex_color * (1.0 - m) + sampled * m
}

/// Shading normal selection on bit 1 of the flags: either the normalized
/// vertex normal or the normal-map sample remapped to [-1, 1] and carried
/// into world space through the tangent basis.
pub fn decode_normal(
    normal: Vec3,
    tangent: Vec3,
    bitangent: Vec3,
    sampled: Vec3,
    flags: MaterialFlags,
) -> Vec3 {
    let coef = (sampled * 2.0 - Vec3::ONE).normalize();
    let mapped = (coef.x * tangent + coef.y * bitangent + coef.z * normal).normalize();
    let m = flags.normal_map_mask();
    normal.normalize() * (1.0 - m) + mapped * m
}

/// Flips the normal when it faces away from the viewer. Returns the
/// corrected normal and the corrected (non-negative) `dot(view, normal)`.
pub fn facing_flip(view_dir: Vec3, normal: Vec3) -> (Vec3, f32) {
    let n_dot_v = view_dir.dot(normal);
    let sign = step(FACING_EPSILON, n_dot_v) * 2.0 - 1.0;
    (normal * sign, n_dot_v * sign)
}

/// Mirrors the view vector about the corrected normal.
pub fn reflect_view(view_dir: Vec3, normal: Vec3, n_dot_v: f32) -> Vec3 {
    2.0 * n_dot_v * normal - view_dir
}

/// Probe-variant shading: the reflection of the reference direction is fed
/// to the probe volume and drives the diffuse-like term. The specular term
/// is deliberately disabled in this variant; the reflection query already
/// carries the mirrored environment radiance.
pub fn shade_probe(
    base_color: Vec3,
    normal: Vec3,
    world_pos: Vec3,
    reference_dir: Vec3,
    material: &UniformMaterial,
    probe: &ProbeVolume,
) -> Vec4 {
    let view_dir = (-reference_dir).normalize();
    let (normal, n_dot_v) = facing_flip(view_dir, normal);
    let reflection = reflect_view(view_dir, normal, n_dot_v);
    let radiance = probe.sample(world_pos, reflection);

    let ambient_gate = step(GATE_EPSILON, material.ambient().w);
    let mut light = material.ambient().truncate() * 0.05 * ambient_gate;
    light += material.diffuse().w * 0.7 * reflection.dot(normal).max(0.0) * radiance;

    ((light + Vec3::splat(unlit_passthrough(material))) * base_color).extend(1.0)
}

/// Direct-lighting sibling of [`shade_probe`]: a point light, a Lambert
/// diffuse term and a Blinn-Phong half-vector specular term gated by the
/// pre-flip facing test. The two variants keep distinct formulas on purpose.
pub fn shade_direct(
    base_color: Vec3,
    normal: Vec3,
    world_pos: Vec3,
    eye: Vec3,
    light_pos: Vec3,
    material: &UniformMaterial,
) -> Vec4 {
    let view_dir = (eye - world_pos).normalize();
    let light_dir = (light_pos - world_pos).normalize();
    let facing_gate = step(FACING_EPSILON, view_dir.dot(normal));
    let (normal, _) = facing_flip(view_dir, normal);
    let half_dir = (view_dir + light_dir).normalize();

    let ambient_gate = step(GATE_EPSILON, material.ambient().w);
    let mut light = material.ambient().truncate() * 0.05 * ambient_gate;
    light += material.diffuse().w
        * 0.7
        * normal.dot(light_dir).max(0.0)
        * material.diffuse().truncate();
    light += material.specular().w
        * normal.dot(half_dir).max(0.0).powf(material.shininess())
        * material.specular().truncate()
        * facing_gate;

    ((light + Vec3::splat(unlit_passthrough(material))) * base_color).extend(1.0)
}

/// 1.0 when every gate weight is at or below the epsilon threshold, so a
/// material with no enabled channel passes the base color through at full
/// brightness instead of rendering black.
fn unlit_passthrough(material: &UniformMaterial) -> f32 {
    (1.0 - step(GATE_EPSILON, material.ambient().w))
        * (1.0 - step(GATE_EPSILON, material.diffuse().w))
        * (1.0 - step(GATE_EPSILON, material.specular().w))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::Material;
    use crate::probe::ProbeGridConfig;

    fn volume(color: Vec3) -> ProbeVolume {
        ProbeVolume::solid(
            ProbeGridConfig {
                origin: Vec3::ZERO,
                side: 4.0,
                spacing: 1.0,
            },
            color,
        )
    }

    fn uniform(ambient: Option<Vec3>, diffuse: Option<Vec3>, specular: Option<Vec3>) -> UniformMaterial {
        Material {
            ambient,
            diffuse,
            specular,
            shininess: Some(8.0),
        }
        .into()
    }

    #[test]
    fn flip_texcoord_mirrors_vertically() {
        assert_eq!(flip_texcoord(Vec2::new(0.25, 0.0)), Vec2::new(0.25, 1.0));
        assert_eq!(flip_texcoord(Vec2::new(0.5, 0.75)), Vec2::new(0.5, 0.25));
    }

    #[test]
    fn decode_base_color_blends_on_bit_zero() {
        let vertex = Vec3::new(0.1, 0.2, 0.3);
        let sampled = Vec3::new(0.9, 0.8, 0.7);
        assert_eq!(
            decode_base_color(vertex, sampled, MaterialFlags::new(false, true)),
            vertex
        );
        assert_eq!(
            decode_base_color(vertex, sampled, MaterialFlags::new(true, false)),
            sampled
        );
    }

    #[test]
    fn decode_normal_uses_tangent_basis_when_mapped() {
        let normal = Vec3::Z;
        let tangent = Vec3::X;
        let bitangent = Vec3::Y;
        // Flat normal-map texel (0.5, 0.5, 1.0) decodes to +Z.
        let flat = Vec3::new(0.5, 0.5, 1.0);
        let decoded = decode_normal(normal, tangent, bitangent, flat, MaterialFlags::new(false, true));
        assert!((decoded - Vec3::Z).length() < 1e-6);
        // A texel leaning along +u tilts the normal towards the tangent.
        let tilted = Vec3::new(1.0, 0.5, 0.5);
        let decoded =
            decode_normal(normal, tangent, bitangent, tilted, MaterialFlags::new(false, true));
        assert!(decoded.x > 0.5);
        assert!((decoded.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn decode_normal_ignores_sample_when_bit_clear() {
        let decoded = decode_normal(
            Vec3::new(0.0, 2.0, 0.0),
            Vec3::X,
            Vec3::Z,
            Vec3::new(1.0, 0.0, 0.0),
            MaterialFlags::new(true, false),
        );
        assert!((decoded - Vec3::Y).length() < 1e-6);
    }

    #[test]
    fn facing_flip_yields_non_negative_dot() {
        let view = Vec3::Z;
        for normal in [
            Vec3::new(0.0, 0.0, -1.0),
            Vec3::new(0.5, 0.5, -0.2).normalize(),
            Vec3::Z,
            Vec3::new(0.3, -0.4, 0.86).normalize(),
        ] {
            let (corrected, n_dot_v) = facing_flip(view, normal);
            assert!(view.dot(corrected) >= 0.0, "normal {normal:?}");
            assert!(n_dot_v >= 0.0);
        }
    }

    #[test]
    fn reflection_preserves_angle_to_normal() {
        let view = Vec3::new(0.2, 0.3, 0.93).normalize();
        let (normal, n_dot_v) = facing_flip(view, Vec3::new(0.1, -0.2, 0.97).normalize());
        let reflection = reflect_view(view, normal, n_dot_v);
        assert!((reflection.dot(normal) - n_dot_v).abs() < 1e-6);
        assert!((reflection.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn ambient_only_material_scales_base_by_five_percent() {
        // Enable bits clear, ambient gate open, diffuse/specular closed.
        let material = uniform(Some(Vec3::ONE), None, None);
        let base = Vec3::new(0.25, 0.5, 0.75);
        let out = shade_probe(
            base,
            Vec3::Z,
            Vec3::ZERO,
            Vec3::new(0.0, 0.0, -1.0),
            &material,
            &volume(Vec3::ONE),
        );
        assert!((out.truncate() - base * 0.05).length() < 1e-6);
        assert_eq!(out.w, 1.0);
    }

    #[test]
    fn fully_gated_material_passes_base_through() {
        let material = uniform(None, None, None);
        let base = Vec3::new(0.6, 0.1, 0.9);
        let probe_out = shade_probe(
            base,
            Vec3::Z,
            Vec3::ZERO,
            Vec3::new(0.3, -1.0, -0.4),
            &material,
            &volume(Vec3::new(0.2, 0.9, 0.4)),
        );
        assert!((probe_out.truncate() - base).length() < 1e-6);

        let direct_out = shade_direct(
            base,
            Vec3::Z,
            Vec3::ZERO,
            Vec3::new(0.0, 1.0, 3.0),
            Vec3::new(2.0, 2.0, 2.0),
            &material,
        );
        assert!((direct_out.truncate() - base).length() < 1e-6);
    }

    #[test]
    fn probe_diffuse_uses_reflected_radiance() {
        let radiance = Vec3::new(0.2, 0.4, 0.8);
        let material = uniform(None, Some(Vec3::ONE), None);
        // Reference direction straight at the surface: view (0,0,1),
        // reflection equals the normal, dot(reflection, normal) = 1.
        let out = shade_probe(
            Vec3::ONE,
            Vec3::Z,
            Vec3::ZERO,
            Vec3::new(0.0, 0.0, -1.0),
            &material,
            &volume(radiance),
        );
        assert!((out.truncate() - radiance * 0.7).length() < 1e-6);
    }

    #[test]
    fn direct_specular_gated_by_facing() {
        let material = uniform(None, None, Some(Vec3::ONE));
        // Viewer behind the surface: the pre-flip gate kills the specular
        // term entirely, leaving black (not passthrough, the gate weight
        // itself is open).
        let out = shade_direct(
            Vec3::ONE,
            Vec3::Z,
            Vec3::ZERO,
            Vec3::new(0.0, 0.0, -2.0),
            Vec3::new(0.0, 0.0, -4.0),
            &material,
        );
        assert!(out.truncate().length() < 1e-6);

        // Viewer in front: specular shows up.
        let out = shade_direct(
            Vec3::ONE,
            Vec3::Z,
            Vec3::ZERO,
            Vec3::new(0.0, 0.0, 2.0),
            Vec3::new(0.0, 0.0, 4.0),
            &material,
        );
        assert!(out.truncate().max_element() > 0.9);
    }
}
