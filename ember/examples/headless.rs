//! Renders a few frames of a floor lit by random point lights on the
//! software device and reports what the reservoirs ended up with.
//!
//! Run with `RUST_LOG=info cargo run --example headless`.

use std::sync::Arc;

use ember::{
    gpu, Camera, LightPopulation, Renderer, RendererConfig, RestirParams,
    SoftwareDevice, SoftwareTlas, TriangleOccluder,
};
use glam::{uvec2, vec3, Vec3};
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;

const FRAMES: usize = 16;

fn main() -> ember::Result<()> {
    env_logger::init();

    let device = Arc::new(SoftwareDevice::new());
    let mut rng = StdRng::seed_from_u64(1234);

    let floor: TriangleOccluder = [
        [
            vec3(-50.0, 0.0, -50.0),
            vec3(50.0, 0.0, 50.0),
            vec3(50.0, 0.0, -50.0),
        ],
        [
            vec3(-50.0, 0.0, -50.0),
            vec3(-50.0, 0.0, 50.0),
            vec3(50.0, 0.0, 50.0),
        ],
    ]
    .into_iter()
    .collect();

    let lights = LightPopulation::new().or_random_point_lights(
        64,
        vec3(-20.0, 1.0, -20.0),
        vec3(20.0, 6.0, 20.0),
        &mut rng,
    )?;

    let camera = Camera::new(
        vec3(0.0, 15.0, 15.0),
        Vec3::ZERO,
        Vec3::Y,
        uvec2(320, 240),
    );

    let surfaces: Vec<_> = (0..camera.resolution.y)
        .flat_map(|y| (0..camera.resolution.x).map(move |x| uvec2(x, y)))
        .map(|pos| {
            let ray = camera.ray(pos);

            match floor.intersect(ray) {
                Some((_, t)) => gpu::GBufferEntry::new(
                    ray.origin() + ray.direction() * t,
                    Vec3::Y,
                    t,
                ),
                None => Default::default(),
            }
        })
        .collect();

    let mut renderer = Renderer::new(
        device.clone(),
        RendererConfig::default(),
        RestirParams::default(),
        camera.resolution,
    )?;

    let tlas: SoftwareTlas = Arc::new(floor);

    renderer.load_scene(&lights, Some(tlas))?;

    for _ in 0..FRAMES {
        let Some(output) = renderer.render(&camera, &surfaces)? else {
            continue;
        };

        renderer.wait(&output)?;

        let reservoirs =
            device.read_buffer::<gpu::DiReservoirData>(&output.reservoirs)?;

        let lit: Vec<_> =
            reservoirs.iter().filter(|res| res.w > 0.0).collect();

        let avg_m = lit.iter().map(|res| res.m).sum::<f32>()
            / (lit.len().max(1) as f32);

        info!(
            "frame={}, lit pixels={}/{}, average m={avg_m:.1}",
            output.frame,
            lit.len(),
            reservoirs.len(),
        );
    }

    Ok(())
}
