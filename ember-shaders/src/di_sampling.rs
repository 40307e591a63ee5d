use ember_gpu::prelude::*;

/// Draws `light_sample_count` candidates out of the alias table and streams
/// them into a fresh reservoir.
#[allow(clippy::too_many_arguments)]
pub fn main<O>(
    global_id: UVec2,
    params: &PassParams,
    uniforms: &RestirUniforms,
    lights: &[Light],
    alias_table: &[AliasBucket],
    surfaces: &[GBufferEntry],
    occluder: &O,
    out: &mut DiReservoirData,
) where
    O: Occluder + ?Sized,
{
    let screen_pos = global_id;
    let screen_idx = uniforms.camera.screen_to_idx(screen_pos);
    let mut wnoise = WhiteNoise::new(params.seed, screen_pos);
    let lights = uniforms.lights(lights);
    let alias_table = uniforms.alias_table(alias_table);
    let surface = surfaces[screen_idx];

    if !surface.is_some() {
        *out = DiReservoirData::default();
        return;
    }

    // ---

    let mut main = DiReservoir::default();

    for _ in 0..uniforms.light_sample_count {
        let Some((light_id, light_pdf)) = alias_table.sample(&mut wnoise)
        else {
            break;
        };

        let Some(light) = lights.get(light_id) else {
            main.m += 1.0;
            continue;
        };

        let light_sample = light.sample(&mut wnoise);

        let sample = DiSample {
            pdf: light.target_pdf(
                light_sample.point,
                surface.position,
                surface.normal,
            ),
            light_id,
            light_point: light_sample.point,
        };

        let source_pdf = light_pdf
            * light.solid_angle_pdf(
                light_sample.point,
                surface.position,
                light_sample.area_pdf,
            );

        let mut weight = if source_pdf > 0.0 {
            (sample.pdf / source_pdf).positive_or_zero()
        } else {
            0.0
        };

        if weight > 0.0 && !sample.is_visible_from(occluder, &surface) {
            weight = 0.0;
        }

        main.update(&mut wnoise, sample, weight);
    }

    main.finalize();

    *out = main.pack();
}
