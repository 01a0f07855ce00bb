//! WGSL sources for the surface pipelines.
//!
//! Every fragment path is branchless: texture and channel selections are
//! arithmetic blends on 0/1 masks, and the back-facing correction is a sign
//! flip derived from `step`. The probe shader exists in two storage flavours
//! ([`crate::probe::ProbeLayout`]), assembled from shared chunks by
//! [`probe_shader`].

use crate::probe::ProbeLayout;

/// Camera/material plumbing shared by every surface shader: uniform
/// declarations, the vertex stage and the decode helpers.
const SURFACE_COMMON: &str = r#"
const GATE_EPSILON: f32 = 1e-4;
const FACING_EPSILON: f32 = 1e-6;

struct CameraUniform {
    views: array<mat4x4<f32>, 2>,
    eye: vec4<f32>,
    view_index: vec4<u32>,
}

struct MaterialUniform {
    ambient: vec4<f32>,
    diffuse: vec4<f32>,
    specular: vec4<f32>,
    shininess: f32,
}

struct LightUniform {
    position: vec4<f32>,
}

@group(0) @binding(0)
var<uniform> camera: CameraUniform;

@group(1) @binding(0)
var<uniform> material: MaterialUniform;
@group(1) @binding(1)
var<uniform> enable_bits: u32;
@group(1) @binding(2)
var color_texture: texture_2d<f32>;
@group(1) @binding(3)
var color_sampler: sampler;
@group(1) @binding(4)
var normal_texture: texture_2d<f32>;
@group(1) @binding(5)
var normal_sampler: sampler;

@group(2) @binding(0)
var<uniform> light: LightUniform;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) color: vec3<f32>,
    @location(2) normal: vec3<f32>,
    @location(3) tangent: vec3<f32>,
    @location(4) bitangent: vec3<f32>,
    @location(5) texcoord: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) world_pos: vec3<f32>,
    @location(1) color: vec3<f32>,
    @location(2) normal: vec3<f32>,
    @location(3) tangent: vec3<f32>,
    @location(4) bitangent: vec3<f32>,
    @location(5) texcoord: vec2<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.position = camera.views[camera.view_index.x] * vec4<f32>(input.position, 1.0);
    out.world_pos = input.position;
    out.color = input.color;
    out.normal = input.normal;
    out.tangent = input.tangent;
    out.bitangent = input.bitangent;
    out.texcoord = input.texcoord;
    return out;
}

// Blend weight per enable bit: 0.0 or 1.0, never anything in between.
fn color_texture_mask() -> f32 {
    return f32(enable_bits & 1u);
}

fn normal_map_mask() -> f32 {
    return f32((enable_bits >> 1u) & 1u);
}

fn decode_base_color(vertex_color: vec3<f32>, sampled: vec3<f32>, mask: f32) -> vec3<f32> {
    return vertex_color * (1.0 - mask) + sampled * mask;
}

fn decode_normal(
    normal: vec3<f32>,
    tangent: vec3<f32>,
    bitangent: vec3<f32>,
    sampled: vec3<f32>,
    mask: f32,
) -> vec3<f32> {
    let coef = normalize(sampled * 2.0 - vec3<f32>(1.0));
    let mapped = normalize(coef.x * tangent + coef.y * bitangent + coef.z * normal);
    return normalize(normal) * (1.0 - mask) + mapped * mask;
}

// 1.0 when every channel gate is closed: the base color passes through at
// full brightness instead of going black.
fn unlit_passthrough() -> f32 {
    return (1.0 - step(GATE_EPSILON, material.ambient.w))
        * (1.0 - step(GATE_EPSILON, material.diffuse.w))
        * (1.0 - step(GATE_EPSILON, material.specular.w));
}
"#;

/// Probe lattice uniform plus the six-array resources and sampling code.
const PROBE_SIX_BINDINGS: &str = r#"
struct ProbeGrid {
    base: vec4<f32>,
    // x = 1 / spacing, y = lattice resolution
    params: vec4<f32>,
}

@group(2) @binding(1)
var<uniform> probe_grid: ProbeGrid;
@group(2) @binding(2)
var probe_pos_x: texture_2d_array<f32>;
@group(2) @binding(3)
var probe_neg_x: texture_2d_array<f32>;
@group(2) @binding(4)
var probe_pos_y: texture_2d_array<f32>;
@group(2) @binding(5)
var probe_neg_y: texture_2d_array<f32>;
@group(2) @binding(6)
var probe_pos_z: texture_2d_array<f32>;
@group(2) @binding(7)
var probe_neg_z: texture_2d_array<f32>;
@group(2) @binding(8)
var probe_sampler: sampler;

// In-slice lookup at a continuous depth. The clamped linear sampler covers
// the bilinear part; the two nearest slices are mixed by hand.
fn slice_lerp(tex: texture_2d_array<f32>, depth: f32, uv: vec2<f32>) -> vec3<f32> {
    let res = probe_grid.params.y;
    let s0 = floor(depth);
    let frac = depth - s0;
    let i0 = i32(s0);
    let i1 = min(i0 + 1, i32(res) - 1);
    let st = (uv + vec2<f32>(0.5)) / res;
    let a = textureSampleLevel(tex, probe_sampler, st, i0, 0.0).rgb;
    let b = textureSampleLevel(tex, probe_sampler, st, i1, 0.0).rgb;
    return mix(a, b, frac);
}

fn sample_probe(world: vec3<f32>, dir: vec3<f32>) -> vec3<f32> {
    let d = normalize(dir);
    let max_coord = probe_grid.params.y - 1.0;
    let c = clamp(
        (world - probe_grid.base.xyz) * probe_grid.params.x,
        vec3<f32>(0.0),
        vec3<f32>(max_coord),
    );

    // Both signs of every axis are sampled and blended by a step mask, so
    // control flow stays uniform.
    let sx = step(0.0, d.x);
    let sy = step(0.0, d.y);
    let sz = step(0.0, d.z);
    let rx = slice_lerp(probe_pos_x, c.x, vec2<f32>(c.y, c.z)) * sx
        + slice_lerp(probe_neg_x, c.x, vec2<f32>(c.y, c.z)) * (1.0 - sx);
    let ry = slice_lerp(probe_pos_y, c.y, vec2<f32>(c.x, c.z)) * sy
        + slice_lerp(probe_neg_y, c.y, vec2<f32>(c.x, c.z)) * (1.0 - sy);
    let rz = slice_lerp(probe_pos_z, c.z, vec2<f32>(c.x, c.y)) * sz
        + slice_lerp(probe_neg_z, c.z, vec2<f32>(c.x, c.y)) * (1.0 - sz);

    let a = abs(d);
    let w = a / (a.x + a.y + a.z);
    return rx * w.x + ry * w.y + rz * w.z;
}
"#;

/// Combined-atlas flavour of the probe resources: one array texture holds
/// all six directions, layer = direction slot * resolution + depth slice.
const PROBE_ATLAS_BINDINGS: &str = r#"
struct ProbeGrid {
    base: vec4<f32>,
    // x = 1 / spacing, y = lattice resolution
    params: vec4<f32>,
}

@group(2) @binding(1)
var<uniform> probe_grid: ProbeGrid;
@group(2) @binding(2)
var probe_atlas: texture_2d_array<f32>;
@group(2) @binding(3)
var probe_sampler: sampler;

fn slice_lerp(slot: u32, depth: f32, uv: vec2<f32>) -> vec3<f32> {
    let res = probe_grid.params.y;
    let base_layer = i32(slot) * i32(res);
    let s0 = floor(depth);
    let frac = depth - s0;
    let i0 = i32(s0);
    let i1 = min(i0 + 1, i32(res) - 1);
    let st = (uv + vec2<f32>(0.5)) / res;
    let a = textureSampleLevel(probe_atlas, probe_sampler, st, base_layer + i0, 0.0).rgb;
    let b = textureSampleLevel(probe_atlas, probe_sampler, st, base_layer + i1, 0.0).rgb;
    return mix(a, b, frac);
}

fn sample_probe(world: vec3<f32>, dir: vec3<f32>) -> vec3<f32> {
    let d = normalize(dir);
    let max_coord = probe_grid.params.y - 1.0;
    let c = clamp(
        (world - probe_grid.base.xyz) * probe_grid.params.x,
        vec3<f32>(0.0),
        vec3<f32>(max_coord),
    );

    let slot_x = select(1u, 0u, d.x >= 0.0);
    let slot_y = select(3u, 2u, d.y >= 0.0);
    let slot_z = select(5u, 4u, d.z >= 0.0);
    let rx = slice_lerp(slot_x, c.x, vec2<f32>(c.y, c.z));
    let ry = slice_lerp(slot_y, c.y, vec2<f32>(c.x, c.z));
    let rz = slice_lerp(slot_z, c.z, vec2<f32>(c.x, c.y));

    let a = abs(d);
    let w = a / (a.x + a.y + a.z);
    return rx * w.x + ry * w.y + rz * w.z;
}
"#;

/// Indirect-lighting fragment stage: the reflection of the reference
/// direction is looked up in the probe lattice and drives the diffuse term.
const PROBE_FRAGMENT: &str = r#"
@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let uv = vec2<f32>(input.texcoord.x, 1.0 - input.texcoord.y);
    let sampled_color = textureSample(color_texture, color_sampler, uv).rgb;
    let sampled_normal = textureSample(normal_texture, normal_sampler, uv).rgb;
    let base_color = decode_base_color(input.color, sampled_color, color_texture_mask());
    let surface_normal = decode_normal(
        input.normal,
        input.tangent,
        input.bitangent,
        sampled_normal,
        normal_map_mask(),
    );

    // The light position doubles as the incident reference direction here.
    let view_dir = normalize(-light.position.xyz);
    let n_dot_v = dot(view_dir, surface_normal);
    let flip = step(FACING_EPSILON, n_dot_v) * 2.0 - 1.0;
    let normal = surface_normal * flip;
    let ndv = n_dot_v * flip;
    let reflection = 2.0 * ndv * normal - view_dir;
    let radiance = sample_probe(input.world_pos, reflection);

    let ambient_gate = step(GATE_EPSILON, material.ambient.w);
    var shade = material.ambient.rgb * 0.05 * ambient_gate;
    shade += material.diffuse.w * 0.7 * max(dot(reflection, normal), 0.0) * radiance;
    // Specular stays off in this variant; the reflection lookup above
    // already carries the mirrored environment radiance.
    // let half_dir = normalize(view_dir + reflection);
    // shade += material.specular.w
    //     * pow(max(dot(normal, half_dir), 0.0), material.shininess)
    //     * radiance;

    return vec4<f32>((shade + vec3<f32>(unlit_passthrough())) * base_color, 1.0);
}
"#;

/// Direct-lighting fragment stage: point light, Lambert diffuse and a
/// Blinn-Phong specular term gated by the pre-flip facing test.
const DIRECT_FRAGMENT: &str = r#"
@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let uv = vec2<f32>(input.texcoord.x, 1.0 - input.texcoord.y);
    let sampled_color = textureSample(color_texture, color_sampler, uv).rgb;
    let sampled_normal = textureSample(normal_texture, normal_sampler, uv).rgb;
    let base_color = decode_base_color(input.color, sampled_color, color_texture_mask());
    let surface_normal = decode_normal(
        input.normal,
        input.tangent,
        input.bitangent,
        sampled_normal,
        normal_map_mask(),
    );

    let view_dir = normalize(camera.eye.xyz - input.world_pos);
    let light_dir = normalize(light.position.xyz - input.world_pos);
    let facing_gate = step(FACING_EPSILON, dot(view_dir, surface_normal));
    let flip = facing_gate * 2.0 - 1.0;
    let normal = surface_normal * flip;
    let half_dir = normalize(view_dir + light_dir);

    let ambient_gate = step(GATE_EPSILON, material.ambient.w);
    var shade = material.ambient.rgb * 0.05 * ambient_gate;
    shade += material.diffuse.w * 0.7 * max(dot(normal, light_dir), 0.0) * material.diffuse.rgb;
    shade += material.specular.w
        * pow(max(dot(normal, half_dir), 0.0), material.shininess)
        * material.specular.rgb
        * facing_gate;

    return vec4<f32>((shade + vec3<f32>(unlit_passthrough())) * base_color, 1.0);
}
"#;

/// Small unlit cube marking the light position (or the reference direction)
/// in the demo scene.
pub const MARKER_SHADER: &str = r#"
struct CameraUniform {
    views: array<mat4x4<f32>, 2>,
    eye: vec4<f32>,
    view_index: vec4<u32>,
}

struct LightUniform {
    position: vec4<f32>,
}

@group(0) @binding(0)
var<uniform> camera: CameraUniform;
@group(1) @binding(0)
var<uniform> light: LightUniform;

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    let world = position * 0.2 + light.position.xyz;
    return camera.views[camera.view_index.x] * vec4<f32>(world, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0, 1.0, 0.8, 1.0);
}
"#;

/// Full WGSL for the probe shading variant in the requested storage layout.
pub fn probe_shader(layout: ProbeLayout) -> String {
    let bindings = match layout {
        ProbeLayout::SixArrays => PROBE_SIX_BINDINGS,
        ProbeLayout::CombinedAtlas => PROBE_ATLAS_BINDINGS,
    };
    format!("{SURFACE_COMMON}{bindings}{PROBE_FRAGMENT}")
}

/// Full WGSL for the direct-lighting shading variant.
pub fn direct_shader() -> String {
    format!("{SURFACE_COMMON}{DIRECT_FRAGMENT}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_assemble_with_both_entry_points() {
        for source in [
            probe_shader(ProbeLayout::SixArrays),
            probe_shader(ProbeLayout::CombinedAtlas),
            direct_shader(),
        ] {
            assert!(source.contains("fn vs_main"));
            assert!(source.contains("fn fs_main"));
        }
    }

    #[test]
    fn layouts_declare_their_own_resources() {
        let six = probe_shader(ProbeLayout::SixArrays);
        assert!(six.contains("probe_neg_z"));
        assert!(!six.contains("probe_atlas"));
        let atlas = probe_shader(ProbeLayout::CombinedAtlas);
        assert!(atlas.contains("probe_atlas"));
        assert!(!atlas.contains("probe_pos_x"));
        let direct = direct_shader();
        assert!(!direct.contains("probe_grid"));
    }
}
