use std::env;

use anyhow::{anyhow, Context, Result};
use glam::Vec3;
use log::info;

use probelit::{
    load_obj_file, Camera, CameraParams, GpuContext, LightParams, ObjModel, ProbeGridConfig,
    ProbeLayout, ProbeVolume, Projection, Renderer, RendererOptions, ShadingVariant,
};

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse()?;
    let model = load_obj_file(&options.path)
        .with_context(|| format!("failed to load {}", options.path))?;
    print_summary(&model);

    if options.summary_only {
        return Ok(());
    }

    let (min, max) = model
        .bounds()
        .ok_or_else(|| anyhow!("model has no vertices"))?;
    let center = (min + max) * 0.5;
    let extent = (max - min).max(Vec3::splat(1.0));

    let render_options = RendererOptions {
        width: options.width,
        height: options.height,
        variant: options.variant,
        layout: options.layout,
    };
    let volume = demo_probe_volume(center, extent);

    let context =
        match GpuContext::new_blocking(render_options.required_limits(volume.resolution())) {
            Ok(context) => context,
            Err(err) => {
                eprintln!("{err:?}");
                eprintln!("No usable GPU; skipping image output.");
                return Ok(());
            }
        };

    let probe = (options.variant == ShadingVariant::Probe).then_some(&volume);
    let mut renderer = Renderer::new(&context, &model, probe, render_options)?;
    if !options.normal_maps {
        renderer.set_normal_maps_enabled(false);
    }

    let camera = Camera::looking_at(center + extent * Vec3::new(0.8, 0.6, 1.4), center);
    let projection = Projection::new(
        options.width,
        options.height,
        45.0,
        0.05,
        extent.length() * 10.0,
    );
    let view_proj = projection.calc_matrix() * camera.calc_matrix();
    let light_pos = center + extent * Vec3::new(0.6, 1.0, 0.8);
    let light = match options.variant {
        // The probe shader reads the light slot as the incident reference
        // direction.
        ShadingVariant::Probe => LightParams {
            position: (center - light_pos).normalize(),
        },
        ShadingVariant::Direct => LightParams {
            position: light_pos,
        },
    };
    renderer.update_globals(&CameraParams::single(view_proj, camera.position), &light);
    info!(
        "rendering {:?} variant at {}x{}",
        options.variant, options.width, options.height
    );

    renderer.render()?;
    let pixels = renderer.read_pixels()?;
    let lit = pixels
        .chunks_exact(4)
        .filter(|px| px[0].max(px[1]).max(px[2]) > 0)
        .count();
    println!(
        "Rendered {}x{} frame, {lit} lit pixels",
        options.width, options.height
    );

    if let Some(path) = &options.render {
        let image = image::RgbaImage::from_raw(options.width, options.height, pixels)
            .ok_or_else(|| anyhow!("pixel buffer does not match the frame size"))?;
        image
            .save(path)
            .with_context(|| format!("failed to write {path}"))?;
        println!("Wrote {path}");
    }

    Ok(())
}

fn print_summary(model: &ObjModel) {
    let vertices: usize = model.meshes.iter().map(|mesh| mesh.vertex_count()).sum();
    let triangles: usize = model.meshes.iter().map(|mesh| mesh.indices.len() / 3).sum();
    println!(
        "Loaded {} mesh(es), {vertices} vertices, {triangles} triangles",
        model.meshes.len()
    );
    for mesh in &model.meshes {
        match &mesh.material {
            Some(material) => println!(
                " - {} ({} triangles, material {})",
                mesh.name,
                mesh.indices.len() / 3,
                material.name
            ),
            None => println!(" - {} ({} triangles)", mesh.name, mesh.indices.len() / 3),
        }
    }
    if let Some((min, max)) = model.bounds() {
        println!("Bounds: {min} to {max}");
    }
}

/// Demo radiance bake: cool sky above, warm ground below, lightly tinted by
/// the stored direction so the six arrays are distinguishable in the output.
fn demo_probe_volume(center: Vec3, extent: Vec3) -> ProbeVolume {
    let side = extent.max_element() * 2.0;
    let config = ProbeGridConfig {
        origin: center,
        side,
        spacing: side / 32.0,
    };
    let floor = center.y - side * 0.5;
    ProbeVolume::from_fn(config, |axis, world| {
        let up = ((world.y - floor) / side).clamp(0.0, 1.0);
        let sky = Vec3::new(0.35, 0.55, 0.9);
        let ground = Vec3::new(0.45, 0.35, 0.25);
        let base = ground * (1.0 - up) + sky * up;
        base * (axis.direction() * 0.15 + Vec3::splat(0.85))
    })
}

struct CliOptions {
    path: String,
    variant: ShadingVariant,
    layout: ProbeLayout,
    width: u32,
    height: u32,
    render: Option<String>,
    normal_maps: bool,
    summary_only: bool,
}

impl CliOptions {
    fn parse() -> Result<Self> {
        let mut args = env::args().skip(1);
        let Some(path) = args.next() else {
            return Err(anyhow!(
                "Usage: probelit <scene.obj> [--direct] [--combined-atlas] [--size WxH] \
                 [--render out.png] [--no-normal-maps] [--summary-only]"
            ));
        };
        let mut options = Self {
            path,
            variant: ShadingVariant::Probe,
            layout: ProbeLayout::SixArrays,
            width: 512,
            height: 512,
            render: None,
            normal_maps: true,
            summary_only: false,
        };
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--direct" => options.variant = ShadingVariant::Direct,
                "--combined-atlas" => options.layout = ProbeLayout::CombinedAtlas,
                "--size" => {
                    let value = args.next().ok_or_else(|| anyhow!("--size expects WxH"))?;
                    (options.width, options.height) = parse_size(&value)?;
                }
                "--render" => {
                    options.render =
                        Some(args.next().ok_or_else(|| anyhow!("--render expects a path"))?);
                }
                "--no-normal-maps" => options.normal_maps = false,
                "--summary-only" => options.summary_only = true,
                other => {
                    return Err(anyhow!("Unknown argument: {other}"));
                }
            }
        }
        Ok(options)
    }
}

fn parse_size(value: &str) -> Result<(u32, u32)> {
    let (width, height) = value
        .split_once('x')
        .ok_or_else(|| anyhow!("size must look like 640x480, got {value}"))?;
    let width = width
        .parse::<u32>()
        .with_context(|| format!("invalid width in {value}"))?;
    let height = height
        .parse::<u32>()
        .with_context(|| format!("invalid height in {value}"))?;
    if width == 0 || height == 0 {
        return Err(anyhow!("size must be positive, got {value}"));
    }
    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_size_accepts_wxh() {
        assert_eq!(parse_size("640x480").unwrap(), (640, 480));
        assert!(parse_size("640").is_err());
        assert!(parse_size("0x480").is_err());
        assert!(parse_size("640xhigh").is_err());
    }

    #[test]
    fn demo_volume_spans_the_scene() {
        let volume = demo_probe_volume(Vec3::new(0.0, 2.0, 0.0), Vec3::splat(4.0));
        assert_eq!(volume.resolution(), 32);
        // Texels above the scene lean towards the sky blue.
        let top = volume.sample(Vec3::new(0.0, 5.5, 0.0), Vec3::Y);
        let bottom = volume.sample(Vec3::new(0.0, -1.5, 0.0), Vec3::Y);
        assert!(top.z > bottom.z);
        assert!(bottom.x > top.x);
    }
}
