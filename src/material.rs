use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::obj::ObjMaterial;

/// Host-side material description. Each channel is optional; a missing
/// channel is encoded with a zero gate weight in the uniform block so the
/// shader can keep the term arithmetic instead of branching on presence.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Material {
    pub ambient: Option<Vec3>,
    pub diffuse: Option<Vec3>,
    pub specular: Option<Vec3>,
    pub shininess: Option<f32>,
}

impl From<&ObjMaterial> for Material {
    fn from(value: &ObjMaterial) -> Self {
        Self {
            ambient: value.ambient,
            diffuse: value.diffuse,
            specular: value.specular,
            shininess: value.shininess,
        }
    }
}

/// GPU mirror of [`Material`]. The `w` component of each color is the gate
/// weight: 1.0 when the channel is present, 0.0 otherwise.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct UniformMaterial {
    ambient: [f32; 4],
    diffuse: [f32; 4],
    specular: [f32; 4],
    shininess: f32,
    _padding: [u32; 3],
}

impl From<&Material> for UniformMaterial {
    fn from(value: &Material) -> Self {
        let gated = |channel: Option<Vec3>| -> [f32; 4] {
            channel
                .map(|color| color.extend(1.0))
                .unwrap_or(Vec4::ZERO)
                .into()
        };
        Self {
            ambient: gated(value.ambient),
            diffuse: gated(value.diffuse),
            specular: gated(value.specular),
            shininess: value.shininess.unwrap_or(1.0),
            _padding: [0; 3],
        }
    }
}

impl From<Material> for UniformMaterial {
    fn from(value: Material) -> Self {
        (&value).into()
    }
}

impl Default for UniformMaterial {
    fn default() -> Self {
        (&Material::default()).into()
    }
}

impl UniformMaterial {
    pub fn ambient(&self) -> Vec4 {
        Vec4::from_array(self.ambient)
    }

    pub fn diffuse(&self) -> Vec4 {
        Vec4::from_array(self.diffuse)
    }

    pub fn specular(&self) -> Vec4 {
        Vec4::from_array(self.specular)
    }

    pub fn shininess(&self) -> f32 {
        self.shininess
    }
}

/// Per-draw enable bitmask. Bit 0 selects the sampled base color over the
/// vertex color, bit 1 selects the normal map over the vertex normal. The
/// shader decodes both bits arithmetically, so any combination is valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MaterialFlags(u32);

impl MaterialFlags {
    pub const COLOR_TEXTURE: u32 = 1 << 0;
    pub const NORMAL_MAP: u32 = 1 << 1;

    pub fn new(color_texture: bool, normal_map: bool) -> Self {
        Self((color_texture as u32) | ((normal_map as u32) << 1))
    }

    pub fn from_bits(bits: u32) -> Self {
        Self(bits & (Self::COLOR_TEXTURE | Self::NORMAL_MAP))
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    /// 0.0 or 1.0 blend weight for the base-color selection.
    pub fn color_texture_mask(self) -> f32 {
        (self.0 & Self::COLOR_TEXTURE) as f32
    }

    /// 0.0 or 1.0 blend weight for the normal-map selection.
    pub fn normal_map_mask(self) -> f32 {
        ((self.0 & Self::NORMAL_MAP) >> 1) as f32
    }

    /// Returns the flags with the normal-map bit forced on or off while
    /// keeping the base-color bit untouched.
    pub fn with_normal_map(self, enabled: bool) -> Self {
        Self(self.0 & (Self::COLOR_TEXTURE | ((enabled as u32) << 1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_gates_follow_presence() {
        let material = Material {
            ambient: Some(Vec3::new(0.1, 0.2, 0.3)),
            diffuse: None,
            specular: Some(Vec3::ONE),
            shininess: None,
        };
        let uniform = UniformMaterial::from(&material);
        assert_eq!(uniform.ambient().w, 1.0);
        assert_eq!(uniform.diffuse().w, 0.0);
        assert_eq!(uniform.specular().w, 1.0);
        assert_eq!(uniform.shininess(), 1.0);
    }

    #[test]
    fn default_material_is_fully_gated_off() {
        let uniform = UniformMaterial::default();
        assert_eq!(uniform.ambient().w, 0.0);
        assert_eq!(uniform.diffuse().w, 0.0);
        assert_eq!(uniform.specular().w, 0.0);
    }

    #[test]
    fn flag_masks_are_independent_bits() {
        assert_eq!(MaterialFlags::new(false, false).bits(), 0);
        assert_eq!(MaterialFlags::new(true, false).color_texture_mask(), 1.0);
        assert_eq!(MaterialFlags::new(true, false).normal_map_mask(), 0.0);
        assert_eq!(MaterialFlags::new(false, true).color_texture_mask(), 0.0);
        assert_eq!(MaterialFlags::new(false, true).normal_map_mask(), 1.0);
        assert_eq!(MaterialFlags::new(true, true).bits(), 3);
    }

    #[test]
    fn with_normal_map_toggles_only_bit_one() {
        let flags = MaterialFlags::new(true, true);
        assert_eq!(flags.with_normal_map(false).bits(), 1);
        assert_eq!(flags.with_normal_map(true).bits(), 3);
        let flags = MaterialFlags::new(false, true);
        assert_eq!(flags.with_normal_map(false).bits(), 0);
    }
}
