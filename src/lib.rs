//! Offscreen mesh renderer with two lighting paths: a point-light
//! Blinn-Phong shader and a probe-lattice shader that approximates indirect
//! illumination from pre-baked directional radiance.
//!
//! The building blocks are exposed individually so tools can import OBJ
//! scenes, bake probe volumes or evaluate the shading math on the CPU
//! without touching the GPU. [`render::Renderer`] ties them together for
//! headless image generation.

pub mod camera;
pub mod material;
pub mod obj;
pub mod probe;
pub mod render;
pub mod shaders;
pub mod shading;
pub mod texture;

pub use camera::{Camera, Projection, UniformCamera, MAX_VIEWS};
pub use material::{Material, MaterialFlags, UniformMaterial};
pub use obj::{load_obj_file, load_obj_from_str, MeshData, ObjMaterial, ObjModel};
pub use probe::{ProbeAxis, ProbeGridConfig, ProbeLayout, ProbeVolume};
pub use render::{
    CameraParams, GpuContext, LightParams, Renderer, RendererOptions, ShadingVariant,
};
pub use shading::{FACING_EPSILON, GATE_EPSILON};
