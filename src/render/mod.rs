mod headless;

pub use headless::{
    CameraParams, GpuContext, LightParams, Renderer, RendererOptions, ShadingVariant,
};
