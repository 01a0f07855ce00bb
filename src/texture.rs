use anyhow::{Context, Result};
use image::GenericImageView;

use crate::probe::{ProbeAxis, ProbeVolume};

/// Depth format shared by every pipeline in the crate.
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

/// A texture bundled with its view and sampler.
pub struct Texture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
}

impl Texture {
    /// Decodes an image file and uploads it as an RGBA8 texture with a
    /// linear repeat sampler.
    pub fn from_path(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        path: &std::path::Path,
        label: &str,
    ) -> Result<Self> {
        let img = image::open(path)
            .with_context(|| format!("unable to decode texture {}", path.display()))?;
        Ok(Self::from_image(device, queue, &img, label))
    }

    pub fn from_image(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        img: &image::DynamicImage,
        label: &str,
    ) -> Self {
        let (width, height) = img.dimensions();
        let rgba = img.to_rgba8();
        Self::from_rgba8(device, queue, &rgba, width, height, label)
    }

    /// 1x1 texture of one color, used when a material declares a map the
    /// loader could not resolve. `(255, 255, 255)` is the neutral base color
    /// and `(128, 128, 255)` the flat tangent-space normal.
    pub fn solid_color(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        rgba: [u8; 4],
        label: &str,
    ) -> Self {
        Self::from_rgba8(device, queue, &rgba, 1, 1, label)
    }

    fn from_rgba8(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        pixels: &[u8],
        width: u32,
        height: u32,
        label: &str,
    ) -> Self {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(label),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        Self {
            texture,
            view,
            sampler,
        }
    }

    /// Depth attachment matching the render target size.
    pub fn create_depth_texture(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth-texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("depth-sampler"),
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });
        Self {
            texture,
            view,
            sampler,
        }
    }

    /// Uploads one directional slice array of a probe volume as an RGBA8
    /// `texture_2d_array`, one layer per depth slice. The sampler clamps and
    /// filters linearly so in-slice lookups match the CPU bilinear filter.
    pub fn probe_array(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        volume: &ProbeVolume,
        axis: ProbeAxis,
    ) -> Self {
        let resolution = volume.resolution() as u32;
        let bytes = volume.layer_bytes(axis);
        Self::upload_layers(
            device,
            queue,
            &bytes,
            resolution,
            resolution,
            &format!("probe-{axis:?}"),
        )
    }

    /// Uploads all six directional arrays back to back into one
    /// `texture_2d_array`, layer = direction index * resolution + slice.
    pub fn probe_atlas(device: &wgpu::Device, queue: &wgpu::Queue, volume: &ProbeVolume) -> Self {
        let resolution = volume.resolution() as u32;
        let mut bytes = Vec::with_capacity(
            ProbeAxis::ALL.len() * (resolution * resolution * resolution * 4) as usize,
        );
        for axis in ProbeAxis::ALL {
            bytes.extend_from_slice(&volume.layer_bytes(axis));
        }
        Self::upload_layers(
            device,
            queue,
            &bytes,
            resolution,
            resolution * 6,
            "probe-atlas",
        )
    }

    fn upload_layers(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        bytes: &[u8],
        resolution: u32,
        layers: u32,
        label: &str,
    ) -> Self {
        let size = wgpu::Extent3d {
            width: resolution,
            height: resolution,
            depth_or_array_layers: layers,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytes,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * resolution),
                rows_per_image: Some(resolution),
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            ..Default::default()
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(label),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        Self {
            texture,
            view,
            sampler,
        }
    }
}
