use derivative::Derivative;
use glam::UVec2;
use log::debug;
use rand::Rng;

use super::{FrameSlot, Scene, FRAMES_IN_FLIGHT};
use crate::{
    gpu, BindingTable, Command, Device, Pass, Resource, RestirParams, Result,
};

/// Bindings and the recorded list of commands of a single frame slot.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub(crate) struct SlotPasses<D>
where
    D: Device,
{
    sampling: D::Bindings,
    temporal: D::Bindings,

    /// Spatial reuse going from `reservoirs` into `scratch`.
    spatial_fwd: D::Bindings,

    /// Spatial reuse going from `scratch` back into `reservoirs`.
    spatial_bwd: D::Bindings,

    steps: Vec<Step>,
}

impl<D> SlotPasses<D>
where
    D: Device,
{
    pub fn new(
        device: &D,
        scene: &Scene<D>,
        params: &RestirParams,
        slots: &[FrameSlot<D>],
        idx: usize,
    ) -> Result<Self> {
        debug!("Initializing passes for frame slot #{idx}");

        let curr = &slots[idx];
        let prev = &slots[(idx + FRAMES_IN_FLIGHT - 1) % FRAMES_IN_FLIGHT];

        let sampling = bind(
            device,
            scene,
            Pass::DiSampling,
            [
                (Resource::Uniforms, curr.uniforms.handle()),
                (Resource::Lights, scene.lights()),
                (Resource::AliasTable, scene.alias_table()),
                (Resource::Surfaces, curr.surfaces.handle()),
                (Resource::Reservoirs, curr.reservoirs.handle()),
            ],
        )?;

        let temporal = bind(
            device,
            scene,
            Pass::DiTemporalResampling,
            [
                (Resource::Uniforms, curr.uniforms.handle()),
                (Resource::Lights, scene.lights()),
                (Resource::Surfaces, curr.surfaces.handle()),
                (Resource::PrevSurfaces, prev.surfaces.handle()),
                (Resource::PrevReservoirs, prev.reservoirs.handle()),
                (Resource::Reservoirs, curr.reservoirs.handle()),
            ],
        )?;

        let spatial = |input, output| {
            bind(
                device,
                scene,
                Pass::DiSpatialResampling,
                [
                    (Resource::Uniforms, curr.uniforms.handle()),
                    (Resource::Lights, scene.lights()),
                    (Resource::Surfaces, curr.surfaces.handle()),
                    (Resource::Input, input),
                    (Resource::Output, output),
                ],
            )
        };

        let spatial_fwd =
            spatial(curr.reservoirs.handle(), curr.scratch.handle())?;

        let spatial_bwd =
            spatial(curr.scratch.handle(), curr.reservoirs.handle())?;

        Ok(Self {
            sampling,
            temporal,
            spatial_fwd,
            spatial_bwd,
            steps: record(params),
        })
    }

    /// Re-records the commands, keeping the bindings.
    pub fn rerecord(&mut self, params: &RestirParams) {
        self.steps = record(params);
    }

    /// Returns the recorded commands, ready to be submitted; every dispatch
    /// gets its own random seed.
    pub fn commands<'a>(
        &'a self,
        slot: &'a FrameSlot<D>,
        size: UVec2,
        frame: u32,
        rng: &mut impl Rng,
    ) -> Vec<Command<'a, D>> {
        self.steps
            .iter()
            .map(|step| match step {
                Step::Dispatch(stage) => {
                    let (pass, bindings) = match stage {
                        Stage::Sampling => (Pass::DiSampling, &self.sampling),
                        Stage::Temporal => {
                            (Pass::DiTemporalResampling, &self.temporal)
                        }
                        Stage::SpatialFwd => {
                            (Pass::DiSpatialResampling, &self.spatial_fwd)
                        }
                        Stage::SpatialBwd => {
                            (Pass::DiSpatialResampling, &self.spatial_bwd)
                        }
                    };

                    Command::Dispatch {
                        pass,
                        bindings,
                        params: gpu::PassParams {
                            seed: rng.gen(),
                            frame,
                        },
                        size,
                    }
                }

                Step::Barrier => Command::Barrier,

                Step::CopyScratch => Command::Copy {
                    src: slot.scratch.handle(),
                    dst: slot.reservoirs.handle(),
                },
            })
            .collect()
    }
}

fn bind<'a, D>(
    device: &D,
    scene: &Scene<D>,
    pass: Pass,
    entries: impl IntoIterator<Item = (Resource, &'a D::Buffer)>,
) -> Result<D::Bindings>
where
    D: Device,
{
    let entries = entries
        .into_iter()
        .map(|(resource, buffer)| (resource, buffer.clone()));

    device.create_bindings(&BindingTable::new(pass, entries)?, scene.tlas())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Step {
    Dispatch(Stage),
    Barrier,

    /// Copies spatial reuse's output from `scratch` into `reservoirs`.
    CopyScratch,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    Sampling,
    Temporal,
    SpatialFwd,
    SpatialBwd,
}

/// Records the pipeline for given parameters.
///
/// Spatial iterations ping-pong between `reservoirs` and `scratch`; when
/// their count is odd, the result is copied back so that the frame's output
/// always ends up in `reservoirs`.
fn record(params: &RestirParams) -> Vec<Step> {
    let mut steps = vec![Step::Dispatch(Stage::Sampling), Step::Barrier];

    if params.temporal_reuse {
        steps.extend([Step::Dispatch(Stage::Temporal), Step::Barrier]);
    }

    for iter in 0..params.spatial_iterations {
        let stage = if iter % 2 == 0 {
            Stage::SpatialFwd
        } else {
            Stage::SpatialBwd
        };

        steps.extend([Step::Dispatch(stage), Step::Barrier]);
    }

    if params.spatial_iterations % 2 == 1 {
        steps.push(Step::CopyScratch);
    }

    steps
}
