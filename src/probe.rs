//! Radiance probe grid: a cubic lattice of directional radiance samples used
//! to approximate indirect illumination.
//!
//! Radiance is stored per principal direction in six depth-indexed slice
//! arrays. A query projects the world position onto the lattice, picks the
//! slice array matching the sign of each direction component, interpolates
//! bilinearly inside the slice and linearly between neighbouring slices, and
//! finally blends the three axis results by the L1-normalized direction
//! weights. The blend is a cheap directional approximation, not a hemisphere
//! integral.

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One of the six principal probe directions. Each variant owns a slice
/// array; `index` is the resource slot and the combined-atlas layer block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProbeAxis {
    PosX,
    NegX,
    PosY,
    NegY,
    PosZ,
    NegZ,
}

impl ProbeAxis {
    pub const ALL: [ProbeAxis; 6] = [
        ProbeAxis::PosX,
        ProbeAxis::NegX,
        ProbeAxis::PosY,
        ProbeAxis::NegY,
        ProbeAxis::PosZ,
        ProbeAxis::NegZ,
    ];

    pub fn index(self) -> usize {
        match self {
            ProbeAxis::PosX => 0,
            ProbeAxis::NegX => 1,
            ProbeAxis::PosY => 2,
            ProbeAxis::NegY => 3,
            ProbeAxis::PosZ => 4,
            ProbeAxis::NegZ => 5,
        }
    }

    pub fn direction(self) -> Vec3 {
        match self {
            ProbeAxis::PosX => Vec3::X,
            ProbeAxis::NegX => Vec3::NEG_X,
            ProbeAxis::PosY => Vec3::Y,
            ProbeAxis::NegY => Vec3::NEG_Y,
            ProbeAxis::PosZ => Vec3::Z,
            ProbeAxis::NegZ => Vec3::NEG_Z,
        }
    }

    /// Slice array slot for one axis of a direction: non-negative components
    /// map to the positive slot.
    fn slot(component: f32, positive: ProbeAxis, negative: ProbeAxis) -> ProbeAxis {
        if component >= 0.0 {
            positive
        } else {
            negative
        }
    }
}

/// GPU storage layout for the six directional arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProbeLayout {
    /// One `texture_2d_array` per direction.
    #[default]
    SixArrays,
    /// A single `texture_2d_array` holding all six directions back to back,
    /// layer = direction index * resolution + depth slice.
    CombinedAtlas,
}

/// Placement of the probe lattice: a cube of `side` units centred on
/// `origin`, with lattice points every `spacing` units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbeGridConfig {
    pub origin: Vec3,
    pub side: f32,
    pub spacing: f32,
}

impl Default for ProbeGridConfig {
    fn default() -> Self {
        Self {
            origin: Vec3::ZERO,
            side: 10.0,
            spacing: 0.1,
        }
    }
}

impl ProbeGridConfig {
    /// Lattice points per axis. The reference configuration (side 10.0,
    /// spacing 0.1) yields a 100^3 lattice.
    pub fn resolution(&self) -> usize {
        ((self.side / self.spacing).round() as usize).max(1)
    }

    /// Corner of the lattice; queries are expressed relative to it.
    pub fn base_corner(&self) -> Vec3 {
        self.origin - Vec3::splat(self.side * 0.5)
    }

    /// World position of the lattice point at integer coordinates.
    pub fn lattice_point(&self, x: usize, y: usize, z: usize) -> Vec3 {
        self.base_corner() + Vec3::new(x as f32, y as f32, z as f32) * self.spacing
    }
}

#[derive(Debug, Error)]
pub enum ProbeVolumeError {
    #[error("{axis:?} slice array holds {got} texels, expected {expected}")]
    DataLength {
        axis: ProbeAxis,
        expected: usize,
        got: usize,
    },
}

/// CPU-side probe volume. The baking policy stays with the caller: the
/// volume is filled through [`ProbeVolume::from_fn`] or raw data and is
/// immutable afterwards. The renderer uploads it in either [`ProbeLayout`].
#[derive(Debug, Clone)]
pub struct ProbeVolume {
    config: ProbeGridConfig,
    resolution: usize,
    data: [Vec<[f32; 3]>; 6],
}

impl ProbeVolume {
    /// Fills every directional array by evaluating `fill` at each lattice
    /// point. `fill` receives the direction the texel stores radiance for
    /// and the world position of the lattice point.
    pub fn from_fn<F>(config: ProbeGridConfig, mut fill: F) -> Self
    where
        F: FnMut(ProbeAxis, Vec3) -> Vec3,
    {
        let resolution = config.resolution();
        let texels = resolution * resolution * resolution;
        let data = ProbeAxis::ALL.map(|axis| {
            let mut slices = Vec::with_capacity(texels);
            for slice in 0..resolution {
                for v in 0..resolution {
                    for u in 0..resolution {
                        let (x, y, z) = lattice_coords(axis, slice, u, v);
                        let world = config.lattice_point(x, y, z);
                        slices.push(fill(axis, world).to_array());
                    }
                }
            }
            slices
        });
        Self {
            config,
            resolution,
            data,
        }
    }

    /// Every texel of every direction set to one color.
    pub fn solid(config: ProbeGridConfig, color: Vec3) -> Self {
        Self::from_fn(config, |_, _| color)
    }

    /// Wraps externally baked data, one slice array per direction in
    /// [`ProbeAxis::ALL`] order, each `resolution^3` texels laid out
    /// slice-major with rows along the second in-slice coordinate.
    pub fn from_raw(
        config: ProbeGridConfig,
        data: [Vec<[f32; 3]>; 6],
    ) -> Result<Self, ProbeVolumeError> {
        let resolution = config.resolution();
        let expected = resolution * resolution * resolution;
        for axis in ProbeAxis::ALL {
            let got = data[axis.index()].len();
            if got != expected {
                return Err(ProbeVolumeError::DataLength {
                    axis,
                    expected,
                    got,
                });
            }
        }
        Ok(Self {
            config,
            resolution,
            data,
        })
    }

    pub fn config(&self) -> &ProbeGridConfig {
        &self.config
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    /// Raw texel of one directional array. `slice` runs along the axis,
    /// `(u, v)` are the two orthogonal in-slice coordinates.
    pub fn texel(&self, axis: ProbeAxis, slice: usize, u: usize, v: usize) -> Vec3 {
        let r = self.resolution;
        Vec3::from_array(self.data[axis.index()][slice * r * r + v * r + u])
    }

    /// Interpolated incident radiance at `world` from direction `dir`.
    ///
    /// `dir` must be non-zero; a zero direction is a caller contract
    /// violation and only checked in debug builds.
    pub fn sample(&self, world: Vec3, dir: Vec3) -> Vec3 {
        debug_assert!(
            dir.length_squared() > 0.0,
            "probe sample direction must be non-zero"
        );
        let d = dir.normalize();
        let max_coord = (self.resolution - 1) as f32;
        let c = ((world - self.config.base_corner()) / self.config.spacing)
            .clamp(Vec3::ZERO, Vec3::splat(max_coord));

        let slot_x = ProbeAxis::slot(d.x, ProbeAxis::PosX, ProbeAxis::NegX);
        let slot_y = ProbeAxis::slot(d.y, ProbeAxis::PosY, ProbeAxis::NegY);
        let slot_z = ProbeAxis::slot(d.z, ProbeAxis::PosZ, ProbeAxis::NegZ);

        let rx = self.slice_lerp(slot_x, c.x, Vec2::new(c.y, c.z));
        let ry = self.slice_lerp(slot_y, c.y, Vec2::new(c.x, c.z));
        let rz = self.slice_lerp(slot_z, c.z, Vec2::new(c.x, c.y));

        let w = axis_weights(d);
        rx * w.x + ry * w.y + rz * w.z
    }

    /// Samples one directional array at a continuous depth, interpolating
    /// between the floor and ceil slices.
    fn slice_lerp(&self, axis: ProbeAxis, depth: f32, uv: Vec2) -> Vec3 {
        let s0 = depth.floor();
        let frac = depth - s0;
        let i0 = s0 as usize;
        let i1 = (i0 + 1).min(self.resolution - 1);
        let a = self.bilinear(axis, i0, uv);
        let b = self.bilinear(axis, i1, uv);
        a * (1.0 - frac) + b * frac
    }

    fn bilinear(&self, axis: ProbeAxis, slice: usize, uv: Vec2) -> Vec3 {
        let max = self.resolution - 1;
        let u0 = uv.x.floor();
        let v0 = uv.y.floor();
        let fu = uv.x - u0;
        let fv = uv.y - v0;
        let u0 = u0 as usize;
        let v0 = v0 as usize;
        let u1 = (u0 + 1).min(max);
        let v1 = (v0 + 1).min(max);
        let t00 = self.texel(axis, slice, u0, v0);
        let t10 = self.texel(axis, slice, u1, v0);
        let t01 = self.texel(axis, slice, u0, v1);
        let t11 = self.texel(axis, slice, u1, v1);
        let bottom = t00 * (1.0 - fu) + t10 * fu;
        let top = t01 * (1.0 - fu) + t11 * fu;
        bottom * (1.0 - fv) + top * fv
    }

    /// RGBA8 texel rows for one directional array, ready for upload.
    pub fn layer_bytes(&self, axis: ProbeAxis) -> Vec<u8> {
        self.data[axis.index()]
            .iter()
            .flat_map(|texel| {
                let quantize = |value: f32| (value.clamp(0.0, 1.0) * 255.0 + 0.5) as u8;
                [
                    quantize(texel[0]),
                    quantize(texel[1]),
                    quantize(texel[2]),
                    255,
                ]
            })
            .collect()
    }
}

/// Directional blend weights: |d| per axis over the L1 norm of `d`. For any
/// non-zero direction the weights form a partition of unity; axis-aligned
/// directions degenerate to fewer active terms without dividing by zero.
pub fn axis_weights(dir: Vec3) -> Vec3 {
    let a = dir.abs();
    a / (a.x + a.y + a.z)
}

/// Grid coordinates of a texel: `slice` along the axis, `(u, v)` covering
/// the two remaining coordinates in x-before-y-before-z order.
fn lattice_coords(axis: ProbeAxis, slice: usize, u: usize, v: usize) -> (usize, usize, usize) {
    match axis {
        ProbeAxis::PosX | ProbeAxis::NegX => (slice, u, v),
        ProbeAxis::PosY | ProbeAxis::NegY => (u, slice, v),
        ProbeAxis::PosZ | ProbeAxis::NegZ => (u, v, slice),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> ProbeGridConfig {
        ProbeGridConfig {
            origin: Vec3::ZERO,
            side: 4.0,
            spacing: 1.0,
        }
    }

    /// Encodes the texel coordinates so every texel is distinguishable.
    fn coded_volume() -> ProbeVolume {
        ProbeVolume::from_fn(small_config(), |axis, world| {
            let g = (world - small_config().base_corner()) / small_config().spacing;
            Vec3::new(
                (axis.index() as f32 + 1.0) / 10.0,
                (g.x * 16.0 + g.y * 4.0 + g.z) / 100.0,
                0.5,
            )
        })
    }

    #[test]
    fn axis_weights_partition_unity() {
        for dir in [
            Vec3::new(0.3, -0.7, 0.2),
            Vec3::new(-1.0, 2.0, -3.0),
            Vec3::X,
            Vec3::new(1.0, 1.0, 0.0),
        ] {
            let w = axis_weights(dir.normalize());
            assert!((w.x + w.y + w.z - 1.0).abs() < 1e-6, "weights {w:?}");
            assert!(w.min_element() >= 0.0);
        }
    }

    #[test]
    fn axis_aligned_query_reads_exact_pos_x_texel() {
        let volume = coded_volume();
        let point = volume.config().lattice_point(2, 1, 3);
        let sampled = volume.sample(point, Vec3::X);
        let expected = volume.texel(ProbeAxis::PosX, 2, 1, 3);
        assert!((sampled - expected).length() < 1e-6);
    }

    #[test]
    fn negative_component_selects_negative_slot() {
        let volume = coded_volume();
        let point = volume.config().lattice_point(1, 2, 0);
        let sampled = volume.sample(point, Vec3::NEG_Y);
        let expected = volume.texel(ProbeAxis::NegY, 2, 1, 0);
        assert!((sampled - expected).length() < 1e-6);
    }

    #[test]
    fn lattice_point_blends_exact_texels_of_three_axes() {
        let volume = coded_volume();
        let point = volume.config().lattice_point(1, 2, 3);
        let dir = Vec3::new(1.0, 1.0, 1.0).normalize();
        let sampled = volume.sample(point, dir);
        let expected = (volume.texel(ProbeAxis::PosX, 1, 2, 3)
            + volume.texel(ProbeAxis::PosY, 2, 1, 3)
            + volume.texel(ProbeAxis::PosZ, 3, 1, 2))
            / 3.0;
        assert!((sampled - expected).length() < 1e-6);
    }

    #[test]
    fn depth_midpoint_interpolates_adjacent_slices() {
        let volume = coded_volume();
        let a = volume.config().lattice_point(1, 0, 0);
        let b = volume.config().lattice_point(2, 0, 0);
        let sampled = volume.sample((a + b) * 0.5, Vec3::X);
        let expected = (volume.texel(ProbeAxis::PosX, 1, 0, 0)
            + volume.texel(ProbeAxis::PosX, 2, 0, 0))
            * 0.5;
        assert!((sampled - expected).length() < 1e-6);
    }

    #[test]
    fn queries_outside_volume_clamp_to_boundary() {
        let volume = coded_volume();
        let far = volume.config().origin + Vec3::splat(100.0);
        let corner = volume.config().lattice_point(3, 3, 3);
        let dir = Vec3::new(0.2, 0.5, 0.9);
        let sampled = volume.sample(far, dir);
        let expected = volume.sample(corner, dir);
        assert!((sampled - expected).length() < 1e-6);
    }

    #[test]
    fn from_raw_rejects_wrong_texel_count() {
        let config = small_config();
        let texels = config.resolution().pow(3);
        let mut data: [Vec<[f32; 3]>; 6] =
            std::array::from_fn(|_| vec![[0.0; 3]; texels]);
        data[ProbeAxis::NegZ.index()].pop();
        let err = ProbeVolume::from_raw(config, data).unwrap_err();
        assert!(matches!(
            err,
            ProbeVolumeError::DataLength {
                axis: ProbeAxis::NegZ,
                ..
            }
        ));
    }

    #[test]
    fn layer_bytes_quantizes_rgba8() {
        let volume = ProbeVolume::solid(small_config(), Vec3::new(0.0, 0.5, 1.0));
        let bytes = volume.layer_bytes(ProbeAxis::PosZ);
        assert_eq!(bytes.len(), small_config().resolution().pow(3) * 4);
        assert_eq!(&bytes[..4], &[0, 128, 255, 255]);
    }
}
