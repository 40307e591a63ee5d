use std::mem;
use std::sync::Arc;

use bytemuck::Pod;
use derivative::Derivative;
use log::info;

use crate::{
    gpu, AliasTable, BufferUsage, Device, Owned, OwnedBuffer, Result,
};

/// Lights, their alias table and the acceleration structure, as uploaded
/// into the device.
///
/// Host copies are kept around so that everything can be uploaded again
/// after the device's resources get lost.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub(crate) struct Scene<D>
where
    D: Device,
{
    lights: Vec<gpu::Light>,
    alias_table: AliasTable,

    #[derivative(Debug = "ignore")]
    tlas: Option<D::Tlas>,

    lights_buf: OwnedBuffer<D>,
    alias_table_buf: OwnedBuffer<D>,
}

impl<D> Scene<D>
where
    D: Device,
{
    pub fn empty(device: &Arc<D>) -> Result<Self> {
        Self::new(device, Vec::new(), AliasTable::default(), None)
    }

    pub fn new(
        device: &Arc<D>,
        lights: Vec<gpu::Light>,
        alias_table: AliasTable,
        tlas: Option<D::Tlas>,
    ) -> Result<Self> {
        debug_assert_eq!(lights.len(), alias_table.len());

        info!("Uploading scene; lights={}", lights.len());

        let lights_buf = upload(device, "ember_lights", &lights)?;

        let alias_table_buf =
            upload(device, "ember_alias_table", alias_table.buckets())?;

        Ok(Self {
            lights,
            alias_table,
            tlas,
            lights_buf,
            alias_table_buf,
        })
    }

    /// Uploads the same scene once again, into freshly allocated buffers.
    pub fn reupload(&self, device: &Arc<D>) -> Result<Self> {
        Self::new(
            device,
            self.lights.clone(),
            self.alias_table.clone(),
            self.tlas.clone(),
        )
    }

    pub fn light_count(&self) -> u32 {
        self.lights.len() as u32
    }

    pub fn tlas(&self) -> Option<&D::Tlas> {
        self.tlas.as_ref()
    }

    pub fn lights(&self) -> &D::Buffer {
        &self.lights_buf
    }

    pub fn alias_table(&self) -> &D::Buffer {
        &self.alias_table_buf
    }
}

/// Allocates a storage buffer holding given items.
///
/// The buffer always has room for at least one item, since some devices
/// can't bind empty buffers; the passes learn the actual number of items
/// from the uniforms.
fn upload<D, T>(
    device: &Arc<D>,
    label: &str,
    items: &[T],
) -> Result<OwnedBuffer<D>>
where
    D: Device,
    T: Pod,
{
    let size = items.len().max(1) * mem::size_of::<T>();
    let buffer = device.create_buffer(label, BufferUsage::Storage, size)?;
    let buffer = Owned::new(device.clone(), buffer);

    if !items.is_empty() {
        device.write_buffer(&buffer, 0, bytemuck::cast_slice(items))?;
    }

    Ok(buffer)
}
