mod software;
mod wgpu_device;

use std::fmt::Debug;
use std::time::Duration;

use glam::UVec2;

pub use self::software::*;
pub use self::wgpu_device::*;
use crate::{gpu, BindingTable, Owned, Pass, Release, Result};

/// Narrow interface to whatever executes the passes.
///
/// Everything submitted through [`Device::submit()`] executes in submission
/// order; [`Device::write_buffer()`] is ordered before any batch submitted
/// after it.
pub trait Device: Send + Sync + 'static {
    /// Raw handle of a buffer; cloning it doesn't duplicate the buffer.
    type Buffer: Clone + Debug + PartialEq + Send + Sync;

    type Bindings: Debug + Send + Sync;
    type Fence: Clone + Debug + Send + Sync;

    /// The scene's top-level acceleration structure, as understood by this
    /// device.
    type Tlas: Clone + Send + Sync;

    fn limits(&self) -> DeviceLimits;

    /// Allocates a zero-filled buffer.
    fn create_buffer(
        &self,
        label: &str,
        usage: BufferUsage,
        size: usize,
    ) -> Result<Self::Buffer>;

    fn destroy_buffer(&self, buffer: &Self::Buffer);

    fn write_buffer(
        &self,
        buffer: &Self::Buffer,
        offset: usize,
        data: &[u8],
    ) -> Result<()>;

    fn create_bindings(
        &self,
        table: &BindingTable<Self::Buffer>,
        tlas: Option<&Self::Tlas>,
    ) -> Result<Self::Bindings>;

    fn submit(&self, commands: &[Command<'_, Self>]) -> Result<Self::Fence>;

    fn wait(&self, fence: &Self::Fence, timeout: Duration) -> Result<()>;

    /// Waits until everything submitted so far has finished executing.
    fn wait_idle(&self, timeout: Duration) -> Result<()>;
}

pub enum Command<'a, D>
where
    D: Device + ?Sized,
{
    Clear(&'a D::Buffer),

    Dispatch {
        pass: Pass,
        bindings: &'a D::Bindings,
        params: gpu::PassParams,

        /// Number of pixels to process.
        size: UVec2,
    },

    /// Makes writes of everything before visible to everything after.
    Barrier,

    Copy {
        src: &'a D::Buffer,
        dst: &'a D::Buffer,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    Uniform,
    Storage,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceLimits {
    pub max_buffer_size: usize,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_buffer_size: 256 * 1024 * 1024,
        }
    }
}

pub type OwnedBuffer<D> = Owned<<D as Device>::Buffer, D>;

impl<D> Release<D::Buffer> for D
where
    D: Device,
{
    fn release(&self, buffer: &D::Buffer) {
        self.destroy_buffer(buffer);
    }
}
