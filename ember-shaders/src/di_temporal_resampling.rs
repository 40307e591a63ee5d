use ember_gpu::prelude::*;

/// Merges the fresh reservoir (already present in `out`) with the previous
/// frame's reservoir of the same surface point.
#[allow(clippy::too_many_arguments)]
pub fn main<O>(
    global_id: UVec2,
    params: &PassParams,
    uniforms: &RestirUniforms,
    lights: &[Light],
    curr_surfaces: &[GBufferEntry],
    prev_surfaces: &[GBufferEntry],
    prev_reservoirs: &[DiReservoirData],
    occluder: &O,
    out: &mut DiReservoirData,
) where
    O: Occluder + ?Sized,
{
    if !uniforms.is_temporal_reuse_enabled() || params.frame == 0 {
        return;
    }

    let lhs_pos = global_id;
    let lhs_idx = uniforms.camera.screen_to_idx(lhs_pos);
    let lhs_surface = curr_surfaces[lhs_idx];
    let lights = uniforms.lights(lights);

    if !lhs_surface.is_some() {
        return;
    }

    // -------------------------------------------------------------------------

    let Some(rhs_pos) = uniforms.prev_camera.reproject(lhs_surface.position)
    else {
        return;
    };

    let rhs_idx = uniforms.prev_camera.screen_to_idx(rhs_pos);
    let rhs_surface = prev_surfaces[rhs_idx];

    if !uniforms.gate().accepts(&lhs_surface, &rhs_surface) {
        return;
    }

    let mut rhs = DiReservoir::read(prev_reservoirs, rhs_idx);

    if rhs.m <= 0.0 {
        return;
    }

    // ---

    let lhs = DiReservoir::unpack(*out);
    let mut wnoise = WhiteNoise::new(params.seed, lhs_pos);

    rhs.clamp_m(uniforms.temporal_history_multiplier * lhs.m.max(1.0));

    let mut rhs_pdf = rhs.sample.pdf(lights, &lhs_surface);

    if rhs_pdf > 0.0
        && uniforms.is_visibility_reuse_enabled()
        && !rhs.sample.is_visible_from(occluder, &lhs_surface)
    {
        rhs_pdf = 0.0;
    }

    let rhs_jacobian = rhs.sample.jacobian(
        lights,
        lhs_surface.position,
        rhs_surface.position,
    );

    // ---

    let mut main = DiReservoir::default();

    main.merge_from(&mut wnoise, &lhs, lhs.sample.pdf, 1.0);
    main.merge_from(&mut wnoise, &rhs, rhs_pdf, rhs_jacobian);
    main.finalize();

    *out = main.pack();
}
