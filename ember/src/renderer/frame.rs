use derivative::Derivative;

use crate::{gpu, Device, Error, Renderer, Result};

/// Frame that's being prepared; dropping it without submitting skips the
/// frame.
pub struct Frame<'a, D>
where
    D: Device,
{
    pub(super) renderer: &'a mut Renderer<D>,
    pub(super) slot: usize,
    pub(super) camera: gpu::Camera,
}

impl<D> Frame<'_, D>
where
    D: Device,
{
    /// Index of the frame slot this frame is rendered into.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Returns the buffer the geometry pass should write this frame's
    /// surfaces into, one [`gpu::GBufferEntry`] per pixel.
    pub fn surfaces(&self) -> &D::Buffer {
        &self.renderer.slots[self.slot].surfaces
    }

    /// Uploads surfaces prepared on the host.
    pub fn upload_surfaces(
        &self,
        surfaces: &[gpu::GBufferEntry],
    ) -> Result<()> {
        let resolution = self.renderer.resolution;
        let pixels = (resolution.x as usize) * (resolution.y as usize);

        if surfaces.len() != pixels {
            return Err(Error::InvalidParams(format!(
                "got {} surfaces, but the frame has {pixels} pixels",
                surfaces.len(),
            )));
        }

        self.renderer.device.write_buffer(
            self.surfaces(),
            0,
            bytemuck::cast_slice(surfaces),
        )
    }

    /// Submits the frame.
    ///
    /// Returns `Ok(None)` when the device got lost and the renderer had to
    /// re-acquire its resources; the frame is dropped then.
    pub fn submit(self) -> Result<Option<FrameOutput<D>>> {
        self.renderer.submit(self.slot, self.camera)
    }
}

/// Result of a submitted frame.
#[derive(Derivative)]
#[derivative(Clone(bound = ""), Debug(bound = ""))]
pub struct FrameOutput<D>
where
    D: Device,
{
    pub slot: usize,

    /// Number of frames rendered since the history got reset, zero meaning
    /// that this frame couldn't reuse anything from the previous ones.
    pub frame: u32,

    /// Resampled reservoirs, one [`gpu::DiReservoirData`] per pixel; valid
    /// once `fence` is signaled and until this slot gets rendered into again.
    pub reservoirs: D::Buffer,

    pub fence: D::Fence,
}
