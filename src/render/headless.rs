use std::sync::mpsc;

use anyhow::{anyhow, Context, Result};
use bytemuck::{bytes_of, Pod, Zeroable};
use glam::{Mat4, Vec3};
use log::warn;
use wgpu::util::DeviceExt;

use crate::camera::{UniformCamera, MAX_VIEWS};
use crate::material::{Material, MaterialFlags, UniformMaterial};
use crate::obj::{MeshData, ObjModel, VERTEX_STRIDE};
use crate::probe::{ProbeLayout, ProbeVolume};
use crate::shaders;
use crate::texture::{Texture, DEPTH_FORMAT};

const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Shared GPU handles. Created once without a surface; every renderer in the
/// process can clone the device and queue out of it.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    pub async fn new(limits: wgpu::Limits) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: Default::default(),
            backend_options: Default::default(),
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .context("failed to acquire GPU adapter")?;

        let device_descriptor = wgpu::DeviceDescriptor {
            label: Some("renderer-device"),
            required_features: wgpu::Features::empty(),
            required_limits: limits,
            memory_hints: Default::default(),
            trace: Default::default(),
        };
        let (device, queue) = adapter
            .request_device(&device_descriptor)
            .await
            .context("failed to create GPU device")?;

        Ok(Self { device, queue })
    }

    pub fn new_blocking(limits: wgpu::Limits) -> Result<Self> {
        pollster::block_on(Self::new(limits))
    }
}

/// Which fragment path the surface pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShadingVariant {
    /// Indirect lighting from the probe lattice.
    #[default]
    Probe,
    /// Point-light Blinn-Phong.
    Direct,
}

#[derive(Debug, Clone, Copy)]
pub struct RendererOptions {
    pub width: u32,
    pub height: u32,
    pub variant: ShadingVariant,
    pub layout: ProbeLayout,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            width: 512,
            height: 512,
            variant: ShadingVariant::Probe,
            layout: ProbeLayout::SixArrays,
        }
    }
}

impl RendererOptions {
    /// Device limits the renderer needs. The combined atlas packs six
    /// directions times the lattice resolution into one array texture, which
    /// overflows the default layer limit at useful resolutions.
    pub fn required_limits(&self, probe_resolution: usize) -> wgpu::Limits {
        let mut limits = wgpu::Limits::default();
        if self.variant == ShadingVariant::Probe && self.layout == ProbeLayout::CombinedAtlas {
            let layers = (probe_resolution as u32) * 6;
            limits.max_texture_array_layers = limits.max_texture_array_layers.max(layers);
        }
        limits
    }
}

/// Camera state consumed by the renderer's uniform buffer.
pub struct CameraParams {
    pub views: [Mat4; MAX_VIEWS],
    pub active: u32,
    pub position: Vec3,
}

impl CameraParams {
    /// Single view replicated into every slot.
    pub fn single(view_proj: Mat4, position: Vec3) -> Self {
        Self {
            views: [view_proj; MAX_VIEWS],
            active: 0,
            position,
        }
    }
}

/// Light state consumed by the renderer's uniform buffer. The probe variant
/// reads `position` as the incident reference direction instead.
pub struct LightParams {
    pub position: Vec3,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct LightUniform {
    position: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct ProbeGridUniform {
    base: [f32; 4],
    // x = 1 / spacing, y = lattice resolution
    params: [f32; 4],
}

impl ProbeGridUniform {
    fn new(volume: &ProbeVolume) -> Self {
        let config = volume.config();
        Self {
            base: config.base_corner().extend(0.0).into(),
            params: [
                1.0 / config.spacing,
                volume.resolution() as f32,
                0.0,
                0.0,
            ],
        }
    }
}

/// Offscreen renderer: one surface pipeline in the configured shading
/// variant plus a marker pipeline flagging the light position.
pub struct Renderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    options: RendererOptions,
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth: Texture,
    surface_pipeline: wgpu::RenderPipeline,
    marker_pipeline: wgpu::RenderPipeline,
    camera_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    light_buffer: wgpu::Buffer,
    scene_bind_group: wgpu::BindGroup,
    marker_light_bind_group: wgpu::BindGroup,
    meshes: Vec<GpuMesh>,
    marker_vertices: wgpu::Buffer,
    marker_indices: wgpu::Buffer,
    marker_index_count: u32,
}

struct GpuMesh {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    index_count: u32,
    bind_group: wgpu::BindGroup,
    flags_buffer: wgpu::Buffer,
    flags: MaterialFlags,
}

impl Renderer {
    /// Builds the pipelines and uploads the model and, for the probe
    /// variant, the probe volume. `probe` must be `Some` in that variant.
    pub fn new(
        context: &GpuContext,
        model: &ObjModel,
        probe: Option<&ProbeVolume>,
        options: RendererOptions,
    ) -> Result<Self> {
        let device = context.device.clone();
        let queue = context.queue.clone();

        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("color-target"),
            size: wgpu::Extent3d {
                width: options.width.max(1),
                height: options.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());
        let depth = Texture::create_depth_texture(&device, options.width, options.height);

        let shader_source = match options.variant {
            ShadingVariant::Probe => shaders::probe_shader(options.layout),
            ShadingVariant::Direct => shaders::direct_shader(),
        };
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("surface-shader"),
            source: wgpu::ShaderSource::Wgsl(shader_source.into()),
        });

        let camera_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("camera-bind-layout"),
            entries: &[uniform_entry::<UniformCamera>(
                0,
                wgpu::ShaderStages::VERTEX_FRAGMENT,
            )],
        });
        let material_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("material-bind-layout"),
            entries: &[
                uniform_entry::<UniformMaterial>(0, wgpu::ShaderStages::FRAGMENT),
                uniform_entry::<u32>(1, wgpu::ShaderStages::FRAGMENT),
                texture_entry(2, wgpu::TextureViewDimension::D2),
                sampler_entry(3),
                texture_entry(4, wgpu::TextureViewDimension::D2),
                sampler_entry(5),
            ],
        });
        let scene_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("scene-bind-layout"),
            entries: &scene_layout_entries(options),
        });
        let marker_light_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("marker-light-bind-layout"),
                entries: &[uniform_entry::<LightUniform>(
                    0,
                    wgpu::ShaderStages::VERTEX,
                )],
            });

        let camera_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("camera-uniform"),
            size: std::mem::size_of::<UniformCamera>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("camera-bind-group"),
            layout: &camera_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
        });
        let light_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("light-uniform"),
            size: std::mem::size_of::<LightUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let scene_bind_group = match options.variant {
            ShadingVariant::Probe => {
                let volume =
                    probe.ok_or_else(|| anyhow!("probe shading requires a probe volume"))?;
                build_probe_scene_group(
                    &device,
                    &queue,
                    &scene_layout,
                    &light_buffer,
                    volume,
                    options.layout,
                )
            }
            ShadingVariant::Direct => device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("scene-bind-group"),
                layout: &scene_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: light_buffer.as_entire_binding(),
                }],
            }),
        };
        let marker_light_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("marker-light-bind-group"),
            layout: &marker_light_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: light_buffer.as_entire_binding(),
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("surface-pipeline-layout"),
            bind_group_layouts: &[&camera_layout, &material_layout, &scene_layout],
            push_constant_ranges: &[],
        });
        let surface_pipeline = create_pipeline(
            &device,
            &pipeline_layout,
            &shader,
            wgpu::VertexBufferLayout {
                array_stride: (VERTEX_STRIDE * std::mem::size_of::<f32>()) as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &SURFACE_ATTRIBUTES,
            },
            "surface-pipeline",
        );

        let marker_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("marker-shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::MARKER_SHADER.into()),
        });
        let marker_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("marker-pipeline-layout"),
                bind_group_layouts: &[&camera_layout, &marker_light_layout],
                push_constant_ranges: &[],
            });
        let marker_pipeline = create_pipeline(
            &device,
            &marker_pipeline_layout,
            &marker_shader,
            wgpu::VertexBufferLayout {
                array_stride: (3 * std::mem::size_of::<f32>()) as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &MARKER_ATTRIBUTES,
            },
            "marker-pipeline",
        );

        let meshes = model
            .meshes
            .iter()
            .map(|mesh| GpuMesh::new(&device, &queue, &material_layout, mesh))
            .collect::<Result<Vec<_>>>()?;

        let marker_vertices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("marker-vertices"),
            contents: bytemuck::cast_slice(MARKER_CUBE_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let marker_indices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("marker-indices"),
            contents: bytemuck::cast_slice(MARKER_CUBE_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });

        Ok(Self {
            device,
            queue,
            options,
            color,
            color_view,
            depth,
            surface_pipeline,
            marker_pipeline,
            camera_buffer,
            camera_bind_group,
            light_buffer,
            scene_bind_group,
            marker_light_bind_group,
            meshes,
            marker_vertices,
            marker_indices,
            marker_index_count: MARKER_CUBE_INDICES.len() as u32,
        })
    }

    pub fn options(&self) -> &RendererOptions {
        &self.options
    }

    /// Writes the camera and light uniforms for the next frame.
    pub fn update_globals(&self, camera: &CameraParams, light: &LightParams) {
        let uniform = UniformCamera::from_views(camera.views, camera.active, camera.position);
        self.queue
            .write_buffer(&self.camera_buffer, 0, bytes_of(&uniform));
        let light = LightUniform {
            position: light.position.extend(1.0).into(),
        };
        self.queue
            .write_buffer(&self.light_buffer, 0, bytes_of(&light));
    }

    /// Toggles normal mapping on every mesh without touching the base-color
    /// bit. A mesh whose normal map never loaded stays unmapped.
    pub fn set_normal_maps_enabled(&mut self, enabled: bool) {
        for mesh in &mut self.meshes {
            let flags = mesh.flags.with_normal_map(enabled);
            self.queue
                .write_buffer(&mesh.flags_buffer, 0, bytes_of(&flags.bits()));
        }
    }

    /// Draws every mesh plus the light marker into the offscreen target.
    pub fn render(&self) -> Result<()> {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("renderer-encoder"),
            });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("main-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.color_view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        pass.set_pipeline(&self.surface_pipeline);
        pass.set_bind_group(0, &self.camera_bind_group, &[]);
        pass.set_bind_group(2, &self.scene_bind_group, &[]);
        for mesh in &self.meshes {
            pass.set_bind_group(1, &mesh.bind_group, &[]);
            pass.set_vertex_buffer(0, mesh.vertex.slice(..));
            pass.set_index_buffer(mesh.index.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..mesh.index_count, 0, 0..1);
        }

        pass.set_pipeline(&self.marker_pipeline);
        pass.set_bind_group(0, &self.camera_bind_group, &[]);
        pass.set_bind_group(1, &self.marker_light_bind_group, &[]);
        pass.set_vertex_buffer(0, self.marker_vertices.slice(..));
        pass.set_index_buffer(self.marker_indices.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..self.marker_index_count, 0, 0..1);

        drop(pass);
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    /// Downloads the color target as tightly packed RGBA8 rows.
    pub fn read_pixels(&self) -> Result<Vec<u8>> {
        let width = self.options.width as usize;
        let height = self.options.height as usize;
        let tight_bpr = width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as usize;
        let padded_bpr = (tight_bpr + align - 1) / align * align;

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback-staging"),
            size: (padded_bpr * height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback-encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.color,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bpr as u32),
                    rows_per_image: Some(self.options.height),
                },
            },
            wgpu::Extent3d {
                width: self.options.width,
                height: self.options.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait)
            .map_err(|err| anyhow!("device poll failed: {err}"))?;
        receiver
            .recv()
            .context("map_async callback dropped")?
            .context("staging buffer map failed")?;

        let data = slice.get_mapped_range();
        let mut tight = vec![0u8; tight_bpr * height];
        for row in 0..height {
            let src = row * padded_bpr;
            let dst = row * tight_bpr;
            tight[dst..dst + tight_bpr].copy_from_slice(&data[src..src + tight_bpr]);
        }
        drop(data);
        staging.unmap();

        Ok(tight)
    }
}

impl GpuMesh {
    fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        mesh: &MeshData,
    ) -> Result<Self> {
        let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{}-vertices", mesh.name)),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{}-indices", mesh.name)),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        let material = mesh
            .material
            .as_ref()
            .map(Material::from)
            .unwrap_or_default();
        let uniform = UniformMaterial::from(&material);
        let material_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{}-material", mesh.name)),
            contents: bytes_of(&uniform),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        // Declared maps that fail to decode fall back to neutral texels with
        // their enable bit cleared.
        let load = |path: Option<&std::path::Path>, neutral: [u8; 4], kind: &str| {
            match path {
                Some(path) => match Texture::from_path(device, queue, path, kind) {
                    Ok(texture) => (texture, true),
                    Err(err) => {
                        warn!("{}: {err:?}", mesh.name);
                        (Texture::solid_color(device, queue, neutral, kind), false)
                    }
                },
                None => (Texture::solid_color(device, queue, neutral, kind), false),
            }
        };
        let (color_texture, color_loaded) = load(
            mesh.material
                .as_ref()
                .and_then(|m| m.color_texture.as_deref()),
            [255, 255, 255, 255],
            "color-texture",
        );
        let (normal_texture, normal_loaded) = load(
            mesh.material
                .as_ref()
                .and_then(|m| m.normal_texture.as_deref()),
            [128, 128, 255, 255],
            "normal-texture",
        );
        let flags = MaterialFlags::new(color_loaded, normal_loaded);
        let flags_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{}-flags", mesh.name)),
            contents: bytes_of(&flags.bits()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{}-material-bind-group", mesh.name)),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: material_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: flags_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&color_texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&color_texture.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(&normal_texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::Sampler(&normal_texture.sampler),
                },
            ],
        });

        Ok(Self {
            vertex,
            index,
            index_count: mesh.indices.len() as u32,
            bind_group,
            flags_buffer,
            flags,
        })
    }
}

const SURFACE_ATTRIBUTES: [wgpu::VertexAttribute; 6] = wgpu::vertex_attr_array![
    0 => Float32x3,
    1 => Float32x3,
    2 => Float32x3,
    3 => Float32x3,
    4 => Float32x3,
    5 => Float32x2,
];

const MARKER_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];

fn uniform_entry<T>(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: Some(
                std::num::NonZeroU64::new(std::mem::size_of::<T>() as u64)
                    .expect("uniform types are non-empty"),
            ),
        },
        count: None,
    }
}

fn texture_entry(binding: u32, dimension: wgpu::TextureViewDimension) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: dimension,
            multisampled: false,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

fn scene_layout_entries(options: RendererOptions) -> Vec<wgpu::BindGroupLayoutEntry> {
    let mut entries = vec![uniform_entry::<LightUniform>(
        0,
        wgpu::ShaderStages::FRAGMENT,
    )];
    if options.variant != ShadingVariant::Probe {
        return entries;
    }
    entries.push(uniform_entry::<ProbeGridUniform>(
        1,
        wgpu::ShaderStages::FRAGMENT,
    ));
    match options.layout {
        ProbeLayout::SixArrays => {
            for binding in 2..8 {
                entries.push(texture_entry(binding, wgpu::TextureViewDimension::D2Array));
            }
            entries.push(sampler_entry(8));
        }
        ProbeLayout::CombinedAtlas => {
            entries.push(texture_entry(2, wgpu::TextureViewDimension::D2Array));
            entries.push(sampler_entry(3));
        }
    }
    entries
}

fn build_probe_scene_group(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layout: &wgpu::BindGroupLayout,
    light_buffer: &wgpu::Buffer,
    volume: &ProbeVolume,
    probe_layout: ProbeLayout,
) -> wgpu::BindGroup {
    let grid = ProbeGridUniform::new(volume);
    let grid_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("probe-grid-uniform"),
        contents: bytes_of(&grid),
        usage: wgpu::BufferUsages::UNIFORM,
    });

    match probe_layout {
        ProbeLayout::SixArrays => {
            let arrays = crate::probe::ProbeAxis::ALL
                .map(|axis| Texture::probe_array(device, queue, volume, axis));
            let mut entries = vec![
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: light_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: grid_buffer.as_entire_binding(),
                },
            ];
            for (i, texture) in arrays.iter().enumerate() {
                entries.push(wgpu::BindGroupEntry {
                    binding: 2 + i as u32,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                });
            }
            entries.push(wgpu::BindGroupEntry {
                binding: 8,
                resource: wgpu::BindingResource::Sampler(&arrays[0].sampler),
            });
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("scene-bind-group"),
                layout,
                entries: &entries,
            })
        }
        ProbeLayout::CombinedAtlas => {
            let atlas = Texture::probe_atlas(device, queue, volume);
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("scene-bind-group"),
                layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: light_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: grid_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::TextureView(&atlas.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: wgpu::BindingResource::Sampler(&atlas.sampler),
                    },
                ],
            })
        }
    }
}

fn create_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    vertex_layout: wgpu::VertexBufferLayout,
    label: &str,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers: &[vertex_layout],
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: Default::default(),
            bias: Default::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: COLOR_FORMAT,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        multiview: None,
        cache: None,
    })
}

// Unit cube for the light marker, positions only.
const MARKER_CUBE_VERTICES: &[f32] = &[
    -0.5, -0.5, -0.5, //
    0.5, -0.5, -0.5, //
    0.5, 0.5, -0.5, //
    -0.5, 0.5, -0.5, //
    -0.5, -0.5, 0.5, //
    0.5, -0.5, 0.5, //
    0.5, 0.5, 0.5, //
    -0.5, 0.5, 0.5,
];

const MARKER_CUBE_INDICES: &[u32] = &[
    0, 2, 1, 0, 3, 2, // back
    4, 5, 6, 4, 6, 7, // front
    0, 4, 7, 0, 7, 3, // left
    1, 6, 5, 1, 2, 6, // right
    0, 1, 5, 0, 5, 4, // bottom
    3, 6, 2, 3, 7, 6, // top
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeGridConfig;

    #[test]
    fn probe_grid_uniform_encodes_corner_and_spacing() {
        let volume = ProbeVolume::solid(
            ProbeGridConfig {
                origin: Vec3::new(1.0, 2.0, 3.0),
                side: 4.0,
                spacing: 0.5,
            },
            Vec3::ONE,
        );
        let grid = ProbeGridUniform::new(&volume);
        assert_eq!(grid.base, [-1.0, 0.0, 1.0, 0.0]);
        assert_eq!(grid.params[0], 2.0);
        assert_eq!(grid.params[1], 8.0);
    }

    #[test]
    fn combined_atlas_raises_layer_limit() {
        let options = RendererOptions {
            layout: ProbeLayout::CombinedAtlas,
            ..RendererOptions::default()
        };
        let limits = options.required_limits(100);
        assert!(limits.max_texture_array_layers >= 600);

        let six = RendererOptions::default().required_limits(100);
        assert_eq!(
            six.max_texture_array_layers,
            wgpu::Limits::default().max_texture_array_layers
        );
    }

    #[test]
    fn marker_cube_is_watertight() {
        assert_eq!(MARKER_CUBE_VERTICES.len(), 8 * 3);
        assert_eq!(MARKER_CUBE_INDICES.len(), 36);
        assert!(MARKER_CUBE_INDICES.iter().all(|&i| i < 8));
    }
}
