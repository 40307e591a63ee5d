use ember_gpu::prelude::*;

/// Merges the pixel's reservoir with reservoirs of a few randomly chosen,
/// geometrically similar neighbours.
///
/// Reads from `input` and writes into `out`, which must belong to a different
/// buffer; a single invocation of this kernel is one iteration of spatial
/// reuse.
#[allow(clippy::too_many_arguments)]
pub fn main<O>(
    global_id: UVec2,
    params: &PassParams,
    uniforms: &RestirUniforms,
    lights: &[Light],
    surfaces: &[GBufferEntry],
    input: &[DiReservoirData],
    occluder: &O,
    out: &mut DiReservoirData,
) where
    O: Occluder + ?Sized,
{
    let camera = &uniforms.camera;
    let lhs_pos = global_id;
    let lhs_idx = camera.screen_to_idx(lhs_pos);
    let lhs_surface = surfaces[lhs_idx];
    let lights = uniforms.lights(lights);
    let gate = uniforms.gate();

    *out = input[lhs_idx];

    if !lhs_surface.is_some() {
        return;
    }

    // -------------------------------------------------------------------------

    let lhs = DiReservoir::read(input, lhs_idx);
    let mut wnoise = WhiteNoise::new(params.seed, lhs_pos);
    let mut main = DiReservoir::default();
    let mut merged = false;

    main.merge_from(&mut wnoise, &lhs, lhs.sample.pdf, 1.0);

    for _ in 0..uniforms.spatial_neighbours {
        let offset = wnoise.sample_disk() * uniforms.spatial_radius;
        let rhs_pos = camera.contain(lhs_pos.as_ivec2() + offset.as_ivec2());

        if rhs_pos == lhs_pos {
            continue;
        }

        let rhs_idx = camera.screen_to_idx(rhs_pos);
        let rhs_surface = surfaces[rhs_idx];

        if !gate.accepts(&lhs_surface, &rhs_surface) {
            continue;
        }

        let rhs = DiReservoir::read(input, rhs_idx);

        if rhs.m <= 0.0 {
            continue;
        }

        // ---

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

        main.merge_from(&mut wnoise, &rhs, rhs_pdf, rhs_jacobian);
        merged = true;
    }

    // No valid neighbours, so there's nothing to add
    if !merged {
        return;
    }

    main.finalize();

    *out = main.pack();
}
