mod frame;
mod passes;
mod scene;
mod slot;

use std::sync::Arc;

use derivative::Derivative;
use glam::UVec2;
use log::{debug, info, trace, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

pub use self::frame::*;
use self::passes::*;
use self::scene::*;
use self::slot::*;
use crate::utils::measure;
use crate::{
    gpu, Camera, Command, Device, Error, LightPopulation, RendererConfig,
    RestirParams, Result,
};

/// Number of frames that can be in flight at once; each gets its own set of
/// buffers.
pub const FRAMES_IN_FLIGHT: usize = 2;

/// Drives the resampling passes frame after frame.
///
/// The renderer owns every buffer the passes work on; the caller provides
/// the lights, the surfaces seen by the camera (through [`Frame`]) and gets
/// back a buffer of resampled reservoirs ready to be shaded.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct Renderer<D>
where
    D: Device,
{
    #[derivative(Debug = "ignore")]
    device: Arc<D>,

    config: RendererConfig,
    params: RestirParams,
    resolution: UVec2,
    scene: Scene<D>,
    slots: Vec<FrameSlot<D>>,
    passes: Vec<SlotPasses<D>>,

    /// Number of frames rendered since the history got reset.
    frame: u32,

    /// Number of frames submitted since the slots got allocated; selects the
    /// slot for the next frame.
    frame_number: u64,

    prev_camera: Option<gpu::Camera>,

    #[derivative(Debug = "ignore")]
    rng: StdRng,
}

impl<D> Renderer<D>
where
    D: Device,
{
    pub fn new(
        device: Arc<D>,
        config: RendererConfig,
        params: RestirParams,
        resolution: UVec2,
    ) -> Result<Self> {
        info!(
            "Creating renderer; resolution={}x{}",
            resolution.x, resolution.y
        );

        params.validate()?;
        validate_resolution(resolution)?;

        let scene = Scene::empty(&device)?;
        let slots = Self::create_slots(&device, &config, resolution)?;
        let passes = Self::create_passes(&device, &scene, &params, &slots)?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        debug!("Renderer created");

        Ok(Self {
            device,
            config,
            params,
            resolution,
            scene,
            slots,
            passes,
            frame: 0,
            frame_number: 0,
            prev_camera: None,
            rng,
        })
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn params(&self) -> &RestirParams {
        &self.params
    }

    pub fn resolution(&self) -> UVec2 {
        self.resolution
    }

    /// Returns the number of frames rendered since the history got reset.
    pub fn frame(&self) -> u32 {
        self.frame
    }

    /// Replaces the lights and the acceleration structure.
    ///
    /// Fails with [`Error::InvalidWeights`] if the lights can't be sampled,
    /// in which case the previous scene stays in place.
    pub fn load_scene(
        &mut self,
        lights: &LightPopulation,
        tlas: Option<D::Tlas>,
    ) -> Result<()> {
        info!("Loading scene; lights={}", lights.len());

        let alias_table = lights.build_alias_table()?;

        self.wait_idle()?;

        let scene =
            Scene::new(&self.device, lights.serialize(), alias_table, tlas)?;

        self.passes = Self::create_passes(
            &self.device,
            &scene,
            &self.params,
            &self.slots,
        )?;

        self.scene = scene;
        self.reset_history();

        Ok(())
    }

    pub fn set_params(&mut self, params: RestirParams) -> Result<()> {
        params.validate()?;

        if self.params.is_invalidated_by(&params) {
            debug!("Parameters changed; re-recording passes");

            self.wait_idle()?;

            for passes in &mut self.passes {
                passes.rerecord(&params);
            }

            self.reset_history();
        }

        self.params = params;

        Ok(())
    }

    /// Reallocates every frame slot for given resolution, dropping the
    /// history.
    ///
    /// If the allocation fails, the renderer stays without any frame slot and
    /// the next [`Self::begin_frame()`] tries again.
    pub fn resize(&mut self, resolution: UVec2) -> Result<()> {
        info!("Resizing to {}x{}", resolution.x, resolution.y);

        validate_resolution(resolution)?;

        self.wait_idle()?;
        self.release_slots();
        self.resolution = resolution;
        self.reset_history();
        self.allocate()
    }

    /// Rebuilds every frame slot, as if the renderer got resized to its
    /// current resolution.
    pub fn reinitialize(&mut self) -> Result<()> {
        self.resize(self.resolution)
    }

    /// Starts a new frame.
    ///
    /// Waits until the frame slot used by `camera` becomes available; if the
    /// camera's resolution differs from the renderer's, the renderer gets
    /// resized first.
    pub fn begin_frame(&mut self, camera: &Camera) -> Result<Frame<'_, D>> {
        if camera.resolution != self.resolution || self.slots.is_empty() {
            debug!("Camera doesn't match frame slots: {}", camera.describe());

            if let Err(err) = self.resize(camera.resolution) {
                if !err.needs_reacquire() {
                    return Err(err);
                }

                warn!("Couldn't resize: {err}");

                self.reacquire()?;
            }
        }

        let slot = (self.frame_number % FRAMES_IN_FLIGHT as u64) as usize;

        if let Some(fence) = self.slots[slot].fence.take() {
            let result = measure("fence wait", || {
                self.device.wait(&fence, self.config.fence_timeout)
            });

            match result {
                Ok(()) => {}

                Err(err) if err.needs_reacquire() => {
                    warn!("Frame slot #{slot} failed: {err}");

                    self.reacquire()?;
                }

                Err(err) => {
                    return Err(err);
                }
            }
        }

        Ok(Frame {
            slot: (self.frame_number % FRAMES_IN_FLIGHT as u64) as usize,
            camera: camera.serialize(),
            renderer: self,
        })
    }

    /// Renders a frame of surfaces prepared on the host.
    pub fn render(
        &mut self,
        camera: &Camera,
        surfaces: &[gpu::GBufferEntry],
    ) -> Result<Option<FrameOutput<D>>> {
        let frame = self.begin_frame(camera)?;

        frame.upload_surfaces(surfaces)?;
        frame.submit()
    }

    /// Waits until given frame's reservoirs are ready.
    pub fn wait(&self, output: &FrameOutput<D>) -> Result<()> {
        self.device.wait(&output.fence, self.config.fence_timeout)
    }

    pub fn wait_idle(&self) -> Result<()> {
        self.device.wait_idle(self.config.fence_timeout)
    }

    fn submit(
        &mut self,
        slot: usize,
        camera: gpu::Camera,
    ) -> Result<Option<FrameOutput<D>>> {
        match self.try_submit(slot, camera) {
            Ok(output) => Ok(Some(output)),

            Err(err) if err.needs_reacquire() => {
                warn!("Dropping frame: {err}");

                self.reacquire()?;

                Ok(None)
            }

            Err(err) => Err(err),
        }
    }

    fn try_submit(
        &mut self,
        slot_idx: usize,
        camera: gpu::Camera,
    ) -> Result<FrameOutput<D>> {
        let slot = &self.slots[slot_idx];

        let uniforms = self.params.serialize(
            camera,
            self.prev_camera.unwrap_or(camera),
            self.scene.light_count(),
        );

        self.device.write_buffer(
            &slot.uniforms,
            0,
            bytemuck::bytes_of(&uniforms),
        )?;

        let commands = self.passes[slot_idx].commands(
            slot,
            self.resolution,
            self.frame,
            &mut self.rng,
        );

        trace!(
            "Submitting frame #{} into slot #{slot_idx}; commands={}",
            self.frame_number,
            commands.len(),
        );

        let fence =
            measure("frame submission", || self.device.submit(&commands))?;

        let output = FrameOutput {
            slot: slot_idx,
            frame: self.frame,
            reservoirs: slot.reservoirs.handle().clone(),
            fence: fence.clone(),
        };

        drop(commands);

        self.slots[slot_idx].fence = Some(fence);
        self.frame = self.frame.saturating_add(1);
        self.frame_number += 1;
        self.prev_camera = Some(camera);

        Ok(output)
    }

    /// Allocates everything from scratch after the device's resources got
    /// lost.
    fn reacquire(&mut self) -> Result<()> {
        warn!("Re-acquiring device resources");

        if let Err(err) = self.wait_idle() {
            warn!("Couldn't wait for the device: {err}");
        }

        self.release_slots();
        self.reset_history();
        self.scene = self.scene.reupload(&self.device)?;
        self.allocate()
    }

    /// Allocates frame slots for the current resolution; on failure the
    /// renderer is left without any slot, so that the next frame retries.
    fn allocate(&mut self) -> Result<()> {
        let slots =
            Self::create_slots(&self.device, &self.config, self.resolution)?;

        let passes = Self::create_passes(
            &self.device,
            &self.scene,
            &self.params,
            &slots,
        )?;

        self.slots = slots;
        self.passes = passes;

        Ok(())
    }

    fn release_slots(&mut self) {
        self.passes.clear();
        self.slots.clear();
        self.frame_number = 0;
    }

    fn reset_history(&mut self) {
        debug!("Resetting history");

        self.frame = 0;
        self.prev_camera = None;
    }

    fn create_slots(
        device: &Arc<D>,
        config: &RendererConfig,
        resolution: UVec2,
    ) -> Result<Vec<FrameSlot<D>>> {
        let slots = (0..FRAMES_IN_FLIGHT)
            .map(|idx| FrameSlot::new(device, resolution, idx))
            .collect::<Result<Vec<_>>>()?;

        let commands: Vec<_> = slots
            .iter()
            .flat_map(|slot| {
                [
                    Command::Clear(slot.surfaces.handle()),
                    Command::Clear(slot.reservoirs.handle()),
                    Command::Clear(slot.scratch.handle()),
                ]
            })
            .collect();

        let fence = device.submit(&commands)?;

        device.wait(&fence, config.fence_timeout)?;

        Ok(slots)
    }

    fn create_passes(
        device: &Arc<D>,
        scene: &Scene<D>,
        params: &RestirParams,
        slots: &[FrameSlot<D>],
    ) -> Result<Vec<SlotPasses<D>>> {
        (0..slots.len())
            .map(|idx| {
                SlotPasses::new(device.as_ref(), scene, params, slots, idx)
            })
            .collect()
    }
}

fn validate_resolution(resolution: UVec2) -> Result<()> {
    if resolution.x == 0 || resolution.y == 0 {
        return Err(Error::InvalidParams(format!(
            "resolution must be non-zero, got {}x{}",
            resolution.x, resolution.y
        )));
    }

    Ok(())
}
