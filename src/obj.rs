use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use glam::{Vec2, Vec3};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::material::MaterialFlags;

/// Floats per interleaved vertex: position, color, normal, tangent,
/// bitangent, texcoord.
pub const VERTEX_STRIDE: usize = 17;

/// Material description parsed from an MTL library. Texture entries hold
/// resolved paths; decoding the images is the renderer's job.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObjMaterial {
    pub name: String,
    pub ambient: Option<Vec3>,
    pub diffuse: Option<Vec3>,
    pub specular: Option<Vec3>,
    pub shininess: Option<f32>,
    pub color_texture: Option<PathBuf>,
    pub normal_texture: Option<PathBuf>,
}

/// GPU ready mesh buffers produced from one OBJ group.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MeshData {
    pub name: String,
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
    pub material: Option<ObjMaterial>,
}

impl MeshData {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / VERTEX_STRIDE
    }

    pub fn position(&self, index: usize) -> Vec3 {
        let at = index * VERTEX_STRIDE;
        Vec3::from_slice(&self.vertices[at..at + 3])
    }

    /// Enable bitmask declared by the material's texture references. The
    /// renderer downgrades bits whose images fail to load.
    pub fn declared_flags(&self) -> MaterialFlags {
        match &self.material {
            Some(material) => MaterialFlags::new(
                material.color_texture.is_some(),
                material.normal_texture.is_some(),
            ),
            None => MaterialFlags::default(),
        }
    }
}

/// All meshes loaded from one OBJ file, split per `usemtl` group.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObjModel {
    pub meshes: Vec<MeshData>,
}

impl ObjModel {
    /// Axis-aligned bounds over every mesh, if any vertex exists.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let mut bounds: Option<(Vec3, Vec3)> = None;
        for mesh in &self.meshes {
            for i in 0..mesh.vertex_count() {
                let p = mesh.position(i);
                bounds = Some(match bounds {
                    Some((min, max)) => (min.min(p), max.max(p)),
                    None => (p, p),
                });
            }
        }
        bounds
    }
}

/// Loads an OBJ file from disk, resolving `mtllib` references against the
/// file's directory.
pub fn load_obj_file<P: AsRef<Path>>(path: P) -> Result<ObjModel> {
    let path = path.as_ref();
    let data = fs::read_to_string(path)
        .with_context(|| format!("unable to read {}", path.display()))?;
    let base_dir = path.parent().unwrap_or(Path::new(""));

    let mut materials = HashMap::new();
    for line in data.lines() {
        let trimmed = line.trim();
        if let Some(lib) = trimmed.strip_prefix("mtllib ") {
            let lib_path = base_dir.join(lib.trim());
            match fs::read_to_string(&lib_path) {
                Ok(mtl) => {
                    for material in load_mtl_from_str(&mtl, base_dir)? {
                        materials.insert(material.name.clone(), material);
                    }
                }
                Err(err) => {
                    warn!("skipping material library {}: {err}", lib_path.display());
                }
            }
        }
    }

    load_obj_from_str(&data, &materials)
}

/// Parses an OBJ file from memory and returns interleaved vertex/index
/// arrays, one mesh per object/material group. Missing normals are
/// synthesized flat per face; tangents and bitangents are solved from the
/// texture-coordinate deltas and averaged per vertex.
pub fn load_obj_from_str(
    data: &str,
    materials: &HashMap<String, ObjMaterial>,
) -> Result<ObjModel> {
    let mut positions = Vec::new();
    let mut texcoords = Vec::new();
    let mut normals = Vec::new();

    let mut groups: Vec<Group> = Vec::new();
    let mut object_name = String::from("mesh");
    let mut current_material: Option<String> = None;

    for (line_no, line) in data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        let Some(tag) = parts.next() else {
            continue;
        };
        match tag {
            "v" => positions.push(
                parse_vec3(parts)
                    .with_context(|| format!("invalid vertex on line {}", line_no + 1))?,
            ),
            "vt" => texcoords.push(
                parse_vec2(parts)
                    .with_context(|| format!("invalid texcoord on line {}", line_no + 1))?,
            ),
            "vn" => normals.push(
                parse_vec3(parts)
                    .with_context(|| format!("invalid normal on line {}", line_no + 1))?,
            ),
            "o" | "g" => {
                if let Some(name) = parts.next() {
                    object_name = name.to_string();
                }
                current_material = None;
            }
            "usemtl" => {
                current_material = parts.next().map(str::to_string);
            }
            "f" => {
                let polygon = parse_face(parts)
                    .with_context(|| format!("invalid face on line {}", line_no + 1))?;
                let group =
                    current_group(&mut groups, &object_name, current_material.as_deref());
                triangulate_face(&polygon, &mut group.faces);
            }
            _ => {}
        }
    }

    if positions.is_empty() {
        return Err(anyhow!("OBJ file does not define any vertices"));
    }

    let mut meshes = Vec::new();
    for group in groups {
        if group.faces.is_empty() {
            continue;
        }
        let mut mesh = build_mesh(&positions, &texcoords, &normals, &group.faces)?;
        mesh.name = group.name;
        mesh.material = group
            .material
            .as_deref()
            .and_then(|name| materials.get(name))
            .cloned();
        if needs_normals(&mesh.vertices) {
            compute_normals(&mut mesh);
        }
        compute_tangents(&mut mesh);
        meshes.push(mesh);
    }

    if meshes.is_empty() {
        return Err(anyhow!("OBJ file does not define any faces"));
    }

    Ok(ObjModel { meshes })
}

/// Parses an MTL library, resolving texture paths against `base_dir`.
pub fn load_mtl_from_str(data: &str, base_dir: &Path) -> Result<Vec<ObjMaterial>> {
    let mut materials: Vec<ObjMaterial> = Vec::new();

    for (line_no, line) in data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        let Some(tag) = parts.next() else {
            continue;
        };
        if tag == "newmtl" {
            let name = parts
                .next()
                .ok_or_else(|| anyhow!("newmtl without a name on line {}", line_no + 1))?;
            materials.push(ObjMaterial {
                name: name.to_string(),
                ..ObjMaterial::default()
            });
            continue;
        }
        let Some(material) = materials.last_mut() else {
            continue;
        };
        match tag {
            "Ka" => {
                material.ambient = Some(parse_vec3(parts).with_context(|| {
                    format!("invalid ambient color on line {}", line_no + 1)
                })?)
            }
            "Kd" => {
                material.diffuse = Some(parse_vec3(parts).with_context(|| {
                    format!("invalid diffuse color on line {}", line_no + 1)
                })?)
            }
            "Ks" => {
                material.specular = Some(parse_vec3(parts).with_context(|| {
                    format!("invalid specular color on line {}", line_no + 1)
                })?)
            }
            "Ns" => {
                material.shininess = Some(
                    parts
                        .next()
                        .ok_or_else(|| anyhow!("missing shininess value"))?
                        .parse::<f32>()
                        .with_context(|| format!("invalid shininess on line {}", line_no + 1))?,
                )
            }
            "map_Kd" => {
                // Map statements may carry options; the file name is last.
                material.color_texture = parts.last().map(|file| base_dir.join(file));
            }
            "map_Bump" | "map_bump" | "bump" | "norm" => {
                material.normal_texture = parts.last().map(|file| base_dir.join(file));
            }
            _ => {}
        }
    }

    Ok(materials)
}

struct Group {
    name: String,
    material: Option<String>,
    faces: Vec<[FaceIndex; 3]>,
}

fn current_group<'a>(
    groups: &'a mut Vec<Group>,
    object_name: &str,
    material: Option<&str>,
) -> &'a mut Group {
    let matches = groups
        .last()
        .map(|group| group.name == object_name && group.material.as_deref() == material)
        .unwrap_or(false);
    if !matches {
        groups.push(Group {
            name: object_name.to_string(),
            material: material.map(str::to_string),
            faces: Vec::new(),
        });
    }
    groups.last_mut().expect("group was just pushed")
}

fn parse_vec3<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Vec3> {
    let x = parts
        .next()
        .ok_or_else(|| anyhow!("missing vector component"))?
        .parse::<f32>()?;
    let y = parts
        .next()
        .ok_or_else(|| anyhow!("missing vector component"))?
        .parse::<f32>()?;
    let z = parts
        .next()
        .ok_or_else(|| anyhow!("missing vector component"))?
        .parse::<f32>()?;
    Ok(Vec3::new(x, y, z))
}

fn parse_vec2<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Vec2> {
    let x = parts
        .next()
        .ok_or_else(|| anyhow!("missing texcoord component"))?
        .parse::<f32>()?;
    let y = parts
        .next()
        .ok_or_else(|| anyhow!("missing texcoord component"))?
        .parse::<f32>()?;
    Ok(Vec2::new(x, y))
}

fn parse_face<'a>(parts: impl Iterator<Item = &'a str>) -> Result<Vec<FaceIndex>> {
    let mut indices = Vec::new();
    for part in parts {
        let mut segments = part.split('/');
        let v = segments
            .next()
            .ok_or_else(|| anyhow!("missing vertex index"))?
            .parse::<i32>()?;
        let vt = segments
            .next()
            .map(|s| if s.is_empty() { 0 } else { s.parse::<i32>().unwrap_or(0) })
            .unwrap_or(0);
        let vn = segments
            .next()
            .map(|s| if s.is_empty() { 0 } else { s.parse::<i32>().unwrap_or(0) })
            .unwrap_or(0);
        indices.push(FaceIndex { v, vt, vn });
    }
    if indices.len() < 3 {
        return Err(anyhow!("faces must reference at least 3 vertices"));
    }
    Ok(indices)
}

fn triangulate_face(polygon: &[FaceIndex], faces: &mut Vec<[FaceIndex; 3]>) {
    if polygon.len() < 3 {
        return;
    }
    for i in 1..(polygon.len() - 1) {
        faces.push([polygon[0], polygon[i], polygon[i + 1]]);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Key {
    position: usize,
    texcoord: Option<usize>,
    normal: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
struct FaceIndex {
    v: i32,
    vt: i32,
    vn: i32,
}

fn build_mesh(
    positions: &[Vec3],
    texcoords: &[Vec2],
    normals: &[Vec3],
    faces: &[[FaceIndex; 3]],
) -> Result<MeshData> {
    let mut lookup: HashMap<Key, u32> = HashMap::new();
    let mut vertices = Vec::new();
    let mut indices = Vec::new();

    for face in faces {
        for idx in face {
            let pos_index = fix_index(idx.v, positions.len())
                .ok_or_else(|| anyhow!("invalid vertex index"))?;
            let texcoord_index = fix_index(idx.vt, texcoords.len());
            let normal_index = fix_index(idx.vn, normals.len());
            let key = Key {
                position: pos_index,
                texcoord: texcoord_index,
                normal: normal_index,
            };
            let next_index = (vertices.len() / VERTEX_STRIDE) as u32;
            let entry = lookup.entry(key).or_insert_with(|| {
                let position = positions[pos_index];
                let normal = normal_index.map(|i| normals[i]).unwrap_or(Vec3::ZERO);
                let uv = texcoord_index.map(|i| texcoords[i]).unwrap_or(Vec2::ZERO);
                vertices.extend_from_slice(&[position.x, position.y, position.z]);
                // Vertex color defaults to white; OBJ rarely carries one.
                vertices.extend_from_slice(&[1.0, 1.0, 1.0]);
                vertices.extend_from_slice(&[normal.x, normal.y, normal.z]);
                // Tangent basis placeholders, filled by compute_tangents.
                vertices.extend_from_slice(&[1.0, 0.0, 0.0]);
                vertices.extend_from_slice(&[0.0, 1.0, 0.0]);
                vertices.extend_from_slice(&[uv.x, uv.y]);
                next_index
            });
            indices.push(*entry);
        }
    }

    Ok(MeshData {
        name: String::new(),
        vertices,
        indices,
        material: None,
    })
}

fn fix_index(index: i32, len: usize) -> Option<usize> {
    if index > 0 {
        let zero_based = index as usize - 1;
        (zero_based < len).then_some(zero_based)
    } else if index < 0 {
        let abs = (-index) as usize;
        (abs <= len).then_some(len - abs)
    } else {
        None
    }
}

fn needs_normals(vertices: &[f32]) -> bool {
    vertices
        .chunks_exact(VERTEX_STRIDE)
        .any(|chunk| chunk[6] == 0.0 && chunk[7] == 0.0 && chunk[8] == 0.0)
}

fn compute_normals(mesh: &mut MeshData) {
    let vertex_count = mesh.vertex_count();
    let mut accum = vec![Vec3::ZERO; vertex_count];

    for triangle in mesh.indices.chunks_exact(3) {
        let p0 = mesh.position(triangle[0] as usize);
        let p1 = mesh.position(triangle[1] as usize);
        let p2 = mesh.position(triangle[2] as usize);
        let normal = (p1 - p0).cross(p2 - p0);
        if normal.length_squared() > f32::EPSILON {
            let normal = normal.normalize();
            accum[triangle[0] as usize] += normal;
            accum[triangle[1] as usize] += normal;
            accum[triangle[2] as usize] += normal;
        }
    }

    for (i, normal) in accum.into_iter().enumerate() {
        let normal = normal.normalize_or_zero();
        let at = i * VERTEX_STRIDE + 6;
        mesh.vertices[at..at + 3].copy_from_slice(&normal.to_array());
    }
}

/// Solves the tangent and bitangent of each triangle from its texcoord
/// deltas and averages them per vertex. Triangles with degenerate texcoords
/// are skipped; untouched vertices keep the X/Y axis fallbacks.
fn compute_tangents(mesh: &mut MeshData) {
    let vertex_count = mesh.vertex_count();
    let mut tangents = vec![Vec3::ZERO; vertex_count];
    let mut bitangents = vec![Vec3::ZERO; vertex_count];
    let mut counts = vec![0u32; vertex_count];

    for triangle in mesh.indices.chunks_exact(3) {
        let i = [
            triangle[0] as usize,
            triangle[1] as usize,
            triangle[2] as usize,
        ];
        let p0 = mesh.position(i[0]);
        let p1 = mesh.position(i[1]);
        let p2 = mesh.position(i[2]);
        let uv = |index: usize| {
            let at = index * VERTEX_STRIDE + 15;
            Vec2::new(mesh.vertices[at], mesh.vertices[at + 1])
        };
        let delta_pos1 = p1 - p0;
        let delta_pos2 = p2 - p0;
        let delta_uv1 = uv(i[1]) - uv(i[0]);
        let delta_uv2 = uv(i[2]) - uv(i[0]);

        // delta_pos1 = delta_uv1.x * T + delta_uv1.y * B
        // delta_pos2 = delta_uv2.x * T + delta_uv2.y * B
        let det = delta_uv1.x * delta_uv2.y - delta_uv1.y * delta_uv2.x;
        if det.abs() < 1e-8 {
            debug!(
                "degenerate texcoords, skipping tangent solve: uv {delta_uv1} {delta_uv2}"
            );
            continue;
        }
        let tangent = (delta_pos1 * delta_uv2.y - delta_pos2 * delta_uv1.y) / det;
        let bitangent = (delta_pos2 * delta_uv1.x - delta_pos1 * delta_uv2.x) / det;

        for index in i {
            tangents[index] += tangent;
            bitangents[index] += bitangent;
            counts[index] += 1;
        }
    }

    for index in 0..vertex_count {
        if counts[index] == 0 {
            continue;
        }
        let scale = 1.0 / counts[index] as f32;
        let tangent = (tangents[index] * scale).normalize_or_zero();
        let bitangent = (bitangents[index] * scale).normalize_or_zero();
        if tangent != Vec3::ZERO {
            let at = index * VERTEX_STRIDE + 9;
            mesh.vertices[at..at + 3].copy_from_slice(&tangent.to_array());
        }
        if bitangent != Vec3::ZERO {
            let at = index * VERTEX_STRIDE + 12;
            mesh.vertices[at..at + 3].copy_from_slice(&bitangent.to_array());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(data: &str) -> ObjModel {
        load_obj_from_str(data, &HashMap::new()).unwrap()
    }

    #[test]
    fn parses_simple_triangle() {
        let model = load("\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n");
        assert_eq!(model.meshes.len(), 1);
        let mesh = &model.meshes[0];
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert_eq!(mesh.vertices.len(), 3 * VERTEX_STRIDE);
    }

    #[test]
    fn computes_missing_normals() {
        let model = load("\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n");
        for chunk in model.meshes[0].vertices.chunks_exact(VERTEX_STRIDE) {
            let normal = Vec3::new(chunk[6], chunk[7], chunk[8]);
            assert!((normal.length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn negative_indices_resolve_from_the_end() {
        let model = load("v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n");
        assert_eq!(model.meshes[0].indices, vec![0, 1, 2]);
    }

    #[test]
    fn quads_are_fan_triangulated() {
        let model = load("v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n");
        assert_eq!(model.meshes[0].indices.len(), 6);
        assert_eq!(model.meshes[0].vertex_count(), 4);
    }

    #[test]
    fn usemtl_splits_groups_and_attaches_materials() {
        let mut materials = HashMap::new();
        materials.insert(
            "Red".to_string(),
            ObjMaterial {
                name: "Red".to_string(),
                diffuse: Some(Vec3::X),
                ..ObjMaterial::default()
            },
        );
        let data = "o Thing\nv 0 0 0\nv 1 0 0\nv 0 1 0\nv 1 1 0\n\
                    usemtl Red\nf 1 2 3\nusemtl Missing\nf 2 4 3\n";
        let model = load_obj_from_str(data, &materials).unwrap();
        assert_eq!(model.meshes.len(), 2);
        assert_eq!(model.meshes[0].name, "Thing");
        assert_eq!(
            model.meshes[0].material.as_ref().map(|m| m.name.as_str()),
            Some("Red")
        );
        assert!(model.meshes[1].material.is_none());
    }

    #[test]
    fn tangent_basis_follows_texcoords() {
        // Unit quad with uv aligned to the position axes: tangent must come
        // out along +X and bitangent along +Y.
        let data = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\n\
                    vt 0 0\nvt 1 0\nvt 1 1\nvt 0 1\n\
                    vn 0 0 1\n\
                    f 1/1/1 2/2/1 3/3/1 4/4/1\n";
        let model = load(data);
        let mesh = &model.meshes[0];
        for i in 0..mesh.vertex_count() {
            let at = i * VERTEX_STRIDE;
            let tangent = Vec3::from_slice(&mesh.vertices[at + 9..at + 12]);
            let bitangent = Vec3::from_slice(&mesh.vertices[at + 12..at + 15]);
            assert!((tangent - Vec3::X).length() < 1e-5, "tangent {tangent}");
            assert!((bitangent - Vec3::Y).length() < 1e-5, "bitangent {bitangent}");
        }
    }

    #[test]
    fn mtl_parser_reads_channels_and_maps() {
        let mtl = "newmtl Wood\nKa 0.1 0.1 0.1\nKd 0.6 0.4 0.2\nNs 32\n\
                   map_Kd wood.png\nmap_Bump -bm 0.5 wood_n.png\n\
                   newmtl Plain\nKd 1 1 1\n";
        let materials = load_mtl_from_str(mtl, Path::new("assets")).unwrap();
        assert_eq!(materials.len(), 2);
        let wood = &materials[0];
        assert_eq!(wood.name, "Wood");
        assert_eq!(wood.diffuse, Some(Vec3::new(0.6, 0.4, 0.2)));
        assert_eq!(wood.specular, None);
        assert_eq!(wood.shininess, Some(32.0));
        assert_eq!(wood.color_texture, Some(PathBuf::from("assets/wood.png")));
        assert_eq!(
            wood.normal_texture,
            Some(PathBuf::from("assets/wood_n.png"))
        );
        assert!(materials[1].color_texture.is_none());
    }

    #[test]
    fn declared_flags_follow_texture_references() {
        let mesh = MeshData {
            material: Some(ObjMaterial {
                name: "M".into(),
                color_texture: Some("a.png".into()),
                ..ObjMaterial::default()
            }),
            ..MeshData::default()
        };
        assert_eq!(mesh.declared_flags().bits(), MaterialFlags::COLOR_TEXTURE);
    }

    #[test]
    fn bounds_cover_all_meshes() {
        let model = load("v -1 0 0\nv 2 3 0\nv 0 1 -4\nf 1 2 3\n");
        let (min, max) = model.bounds().unwrap();
        assert_eq!(min, Vec3::new(-1.0, 0.0, -4.0));
        assert_eq!(max, Vec3::new(2.0, 3.0, 0.0));
    }
}
