use std::mem;
use std::sync::Arc;

use derivative::Derivative;
use glam::UVec2;
use log::debug;

use crate::{gpu, BufferUsage, Device, Error, Owned, OwnedBuffer, Result};

/// Buffers used by a single frame in flight.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub(crate) struct FrameSlot<D>
where
    D: Device,
{
    pub uniforms: OwnedBuffer<D>,

    /// Written by the geometry pass, one [`gpu::GBufferEntry`] per pixel.
    pub surfaces: OwnedBuffer<D>,

    /// Final reservoirs of this slot's frame, one [`gpu::DiReservoirData`]
    /// per pixel; read back by the next frame's temporal reuse.
    pub reservoirs: OwnedBuffer<D>,

    /// Ping-pong partner of `reservoirs` for the spatial reuse.
    pub scratch: OwnedBuffer<D>,

    /// Signaled once the last frame submitted into this slot completes.
    pub fence: Option<D::Fence>,
}

impl<D> FrameSlot<D>
where
    D: Device,
{
    pub fn new(device: &Arc<D>, resolution: UVec2, idx: usize) -> Result<Self> {
        debug!("Allocating frame slot #{idx} for {resolution}");

        let pixels = (resolution.x as usize) * (resolution.y as usize);

        let alloc = |name, usage, size| alloc(device, idx, name, usage, size);

        let uniforms = alloc(
            "uniforms",
            BufferUsage::Uniform,
            mem::size_of::<gpu::RestirUniforms>(),
        )?;

        let surfaces = alloc(
            "surfaces",
            BufferUsage::Storage,
            pixels * mem::size_of::<gpu::GBufferEntry>(),
        )?;

        let reservoirs = alloc(
            "reservoirs",
            BufferUsage::Storage,
            pixels * mem::size_of::<gpu::DiReservoirData>(),
        )?;

        let scratch = alloc(
            "scratch",
            BufferUsage::Storage,
            pixels * mem::size_of::<gpu::DiReservoirData>(),
        )?;

        Ok(Self {
            uniforms,
            surfaces,
            reservoirs,
            scratch,
            fence: None,
        })
    }
}

fn alloc<D>(
    device: &Arc<D>,
    slot: usize,
    name: &str,
    usage: BufferUsage,
    size: usize,
) -> Result<OwnedBuffer<D>>
where
    D: Device,
{
    let label = format!("ember_slot{slot}_{name}");

    if size > device.limits().max_buffer_size {
        return Err(Error::OutOfMemory { label, size });
    }

    let buffer = device.create_buffer(&label, usage, size)?;

    Ok(Owned::new(device.clone(), buffer))
}

#[cfg(test)]
mod tests {
    use glam::uvec2;

    use super::*;
    use crate::{DeviceLimits, SoftwareDevice};

    #[test]
    fn respects_device_limits() {
        let device = Arc::new(SoftwareDevice::new().with_limits(DeviceLimits {
            max_buffer_size: 1024,
        }));

        let target = FrameSlot::new(&device, uvec2(2, 2), 0).unwrap();

        assert_eq!(
            4 * mem::size_of::<gpu::GBufferEntry>(),
            target.surfaces.size()
        );

        // ---

        let err = FrameSlot::new(&device, uvec2(16, 12), 1).unwrap_err();

        assert_eq!(
            Error::OutOfMemory {
                label: "ember_slot1_surfaces".into(),
                size: 16 * 12 * mem::size_of::<gpu::GBufferEntry>(),
            },
            err
        );
    }
}
