use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};
use std::{fmt, mem, thread};

use bytemuck::Pod;
use derivative::Derivative;
use glam::{UVec2, Vec4};
use log::{debug, info, trace, warn};
use parking_lot::{Condvar, Mutex, RwLock};
use rayon::prelude::*;

use crate::gpu::{self, Occluder};
use crate::{
    BindingTable, BufferUsage, Command, Device, DeviceLimits, Error, Pass,
    Resource, Result, Unoccluded,
};

/// Device that runs the kernels on the CPU.
///
/// Batches execute one after another on a dedicated queue thread, while each
/// dispatch spreads its pixels across rayon's thread pool.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct SoftwareDevice {
    limits: DeviceLimits,
    budget: Option<usize>,
    allocated: Mutex<usize>,

    #[derivative(Debug = "ignore")]
    queue: Mutex<Option<mpsc::Sender<Batch>>>,

    #[derivative(Debug = "ignore")]
    worker: Mutex<Option<thread::JoinHandle<()>>>,

    /// When set, the next submission fails with [`Error::DeviceLost`].
    lost: AtomicBool,
}

impl SoftwareDevice {
    pub fn new() -> Self {
        info!("Initializing software device");

        let (tx, rx) = mpsc::channel();
        let worker = thread::spawn(move || Self::run(rx));

        Self {
            limits: DeviceLimits::default(),
            budget: None,
            allocated: Default::default(),
            queue: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            lost: AtomicBool::new(false),
        }
    }

    /// Limits the total size of buffers alive at once; allocations above it
    /// fail with [`Error::OutOfMemory`].
    pub fn with_budget(mut self, budget: usize) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn with_limits(mut self, limits: DeviceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Returns the buffer's current contents.
    ///
    /// Doesn't synchronize with the queue; wait for the fence of whatever
    /// writes into the buffer first.
    pub fn read_buffer<T>(&self, buffer: &SoftwareBuffer) -> Result<Vec<T>>
    where
        T: Pod,
    {
        let data = buffer.inner.data.read_recursive();

        view::<T>(&data, buffer.inner.size).map(<[T]>::to_vec)
    }

    /// Makes the next submission fail as if the device was lost; used to
    /// exercise the renderer's recovery path.
    pub fn simulate_device_loss(&self) {
        self.lost.store(true, Ordering::SeqCst);
    }

    fn enqueue(&self, batch: Batch) -> Result<()> {
        self.queue
            .lock()
            .as_ref()
            .ok_or(Error::DeviceLost)?
            .send(batch)
            .map_err(|_| Error::DeviceLost)
    }

    fn run(batches: mpsc::Receiver<Batch>) {
        debug!("Software queue started");

        for batch in batches {
            let result = batch.jobs.into_iter().try_for_each(Job::execute);

            if let Err(err) = &result {
                warn!("Software queue failed to execute a batch: {err}");
            }

            if let Some(fence) = batch.fence {
                fence.signal(result);
            }
        }

        debug!("Software queue stopped");
    }
}

impl Default for SoftwareDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for SoftwareDevice {
    type Buffer = SoftwareBuffer;
    type Bindings = SoftwareBindings;
    type Fence = SoftwareFence;
    type Tlas = SoftwareTlas;

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn create_buffer(
        &self,
        label: &str,
        usage: BufferUsage,
        size: usize,
    ) -> Result<Self::Buffer> {
        info!("Allocating buffer `{label}`; usage={usage:?}, size={size}");

        let oom = || Error::OutOfMemory {
            label: label.to_string(),
            size,
        };

        if size > self.limits.max_buffer_size {
            return Err(oom());
        }

        {
            let mut allocated = self.allocated.lock();

            if let Some(budget) = self.budget {
                if *allocated + size > budget {
                    return Err(oom());
                }
            }

            *allocated += size;
        }

        Ok(SoftwareBuffer {
            inner: Arc::new(SoftwareBufferInner {
                label: label.to_string(),
                size,
                data: RwLock::new(vec![Vec4::ZERO; size.div_ceil(16)]),
            }),
        })
    }

    fn destroy_buffer(&self, buffer: &Self::Buffer) {
        debug!("Releasing buffer `{}`", buffer.inner.label);

        let mut allocated = self.allocated.lock();

        *allocated = allocated.saturating_sub(buffer.inner.size);
    }

    fn write_buffer(
        &self,
        buffer: &Self::Buffer,
        offset: usize,
        data: &[u8],
    ) -> Result<()> {
        if offset + data.len() > buffer.inner.size {
            return Err(Error::InvalidParams(format!(
                "writing {} bytes at {offset} overflows buffer `{}` ({} bytes)",
                data.len(),
                buffer.inner.label,
                buffer.inner.size,
            )));
        }

        self.enqueue(Batch {
            jobs: vec![Job::Write {
                buffer: buffer.clone(),
                offset,
                data: data.to_vec(),
            }],
            fence: None,
        })
    }

    fn create_bindings(
        &self,
        table: &BindingTable<Self::Buffer>,
        tlas: Option<&Self::Tlas>,
    ) -> Result<Self::Bindings> {
        Ok(SoftwareBindings {
            table: table.clone(),
            tlas: tlas.cloned(),
        })
    }

    fn submit(&self, commands: &[Command<'_, Self>]) -> Result<Self::Fence> {
        if self.lost.swap(false, Ordering::SeqCst) {
            return Err(Error::DeviceLost);
        }

        let jobs = commands
            .iter()
            .filter_map(|command| match command {
                Command::Clear(buffer) => Some(Job::Clear((*buffer).clone())),

                Command::Dispatch {
                    pass,
                    bindings,
                    params,
                    size,
                } => {
                    debug_assert_eq!(*pass, bindings.table.pass());

                    Some(Job::Dispatch {
                        bindings: (*bindings).clone(),
                        params: *params,
                        size: *size,
                    })
                }

                // The queue runs one job at a time anyway
                Command::Barrier => None,

                Command::Copy { src, dst } => Some(Job::Copy {
                    src: (*src).clone(),
                    dst: (*dst).clone(),
                }),
            })
            .collect();

        let fence = SoftwareFence::default();

        trace!("Submitting batch");

        self.enqueue(Batch {
            jobs,
            fence: Some(fence.clone()),
        })?;

        Ok(fence)
    }

    fn wait(&self, fence: &Self::Fence, timeout: Duration) -> Result<()> {
        fence.wait(timeout)
    }

    fn wait_idle(&self, timeout: Duration) -> Result<()> {
        let fence = SoftwareFence::default();

        self.enqueue(Batch {
            jobs: Vec::new(),
            fence: Some(fence.clone()),
        })?;

        fence.wait(timeout)
    }
}

impl Drop for SoftwareDevice {
    fn drop(&mut self) {
        self.queue.lock().take();

        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                warn!("Software queue panicked");
            }
        }
    }
}

#[derive(Clone)]
pub struct SoftwareBuffer {
    inner: Arc<SoftwareBufferInner>,
}

struct SoftwareBufferInner {
    label: String,
    size: usize,

    /// Stored as `Vec4`s so that the contents are aligned well enough to be
    /// viewed as any of the structs shared with the kernels.
    data: RwLock<Vec<Vec4>>,
}

impl SoftwareBuffer {
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn size(&self) -> usize {
        self.inner.size
    }
}

impl PartialEq for SoftwareBuffer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for SoftwareBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftwareBuffer")
            .field("label", &self.inner.label)
            .field("size", &self.inner.size)
            .finish()
    }
}

pub type SoftwareTlas = Arc<dyn Occluder + Send + Sync>;

#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct SoftwareBindings {
    table: BindingTable<SoftwareBuffer>,

    #[derivative(Debug = "ignore")]
    tlas: Option<SoftwareTlas>,
}

#[derive(Clone, Debug, Default)]
pub struct SoftwareFence {
    state: Arc<FenceState>,
}

#[derive(Debug, Default)]
struct FenceState {
    result: Mutex<Option<Result<()>>>,
    signal: Condvar,
}

impl SoftwareFence {
    pub fn is_signaled(&self) -> bool {
        self.state.result.lock().is_some()
    }

    fn signal(&self, result: Result<()>) {
        *self.state.result.lock() = Some(result);
        self.state.signal.notify_all();
    }

    fn wait(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut result = self.state.result.lock();

        loop {
            if let Some(result) = &*result {
                return result.clone();
            }

            if self.state.signal.wait_until(&mut result, deadline).timed_out()
            {
                return result.clone().unwrap_or(Err(Error::DeviceLost));
            }
        }
    }
}

struct Batch {
    jobs: Vec<Job>,
    fence: Option<SoftwareFence>,
}

enum Job {
    Write {
        buffer: SoftwareBuffer,
        offset: usize,
        data: Vec<u8>,
    },

    Clear(SoftwareBuffer),

    Dispatch {
        bindings: SoftwareBindings,
        params: gpu::PassParams,
        size: UVec2,
    },

    Copy {
        src: SoftwareBuffer,
        dst: SoftwareBuffer,
    },
}

impl Job {
    fn execute(self) -> Result<()> {
        match self {
            Job::Write {
                buffer,
                offset,
                data,
            } => {
                let mut words = buffer.inner.data.write();
                let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut words);

                bytes[offset..][..data.len()].copy_from_slice(&data);
            }

            Job::Clear(buffer) => {
                buffer.inner.data.write().fill(Vec4::ZERO);
            }

            Job::Dispatch {
                bindings,
                params,
                size,
            } => {
                dispatch(&bindings, &params, size)?;
            }

            Job::Copy { src, dst } => {
                if src == dst {
                    return Ok(());
                }

                let len = src.inner.size.min(dst.inner.size);
                let src_words = src.inner.data.read_recursive();
                let mut dst_words = dst.inner.data.write();
                let src_bytes: &[u8] = bytemuck::cast_slice(&src_words);
                let dst_bytes: &mut [u8] =
                    bytemuck::cast_slice_mut(&mut dst_words);

                dst_bytes[..len].copy_from_slice(&src_bytes[..len]);
            }
        }

        Ok(())
    }
}

fn dispatch(
    bindings: &SoftwareBindings,
    params: &gpu::PassParams,
    size: UVec2,
) -> Result<()> {
    let table = &bindings.table;
    let pass = table.pass();

    let buffer = |resource| {
        table.get(resource).ok_or_else(|| {
            Error::InvalidBindings(format!(
                "pass `{}` is missing {resource:?}",
                pass.label()
            ))
        })
    };

    let occluder: &(dyn Occluder + Send + Sync) = match &bindings.tlas {
        Some(tlas) => tlas.as_ref(),
        None => &Unoccluded,
    };

    let uniforms_buf = buffer(Resource::Uniforms)?;
    let uniforms = uniforms_buf.inner.data.read_recursive();

    let uniforms =
        *view::<gpu::RestirUniforms>(&uniforms, uniforms_buf.size())?
            .first()
            .ok_or_else(|| {
                Error::InvalidBindings("uniforms buffer is too small".into())
            })?;

    if uniforms.camera.screen_size() != size {
        return Err(Error::InvalidBindings(format!(
            "pass `{}` dispatched for {size}, but the camera sees {}",
            pass.label(),
            uniforms.camera.screen_size(),
        )));
    }

    let pixels = (size.x * size.y) as usize;

    let lights_buf = buffer(Resource::Lights)?;
    let lights = lights_buf.inner.data.read_recursive();
    let lights = view::<gpu::Light>(&lights, lights_buf.size())?;

    let surfaces_buf = buffer(Resource::Surfaces)?;
    let surfaces = surfaces_buf.inner.data.read_recursive();
    let surfaces = view::<gpu::GBufferEntry>(&surfaces, surfaces_buf.size())?;
    let surfaces = pixels_of(surfaces, pixels)?;

    trace!("Dispatching `{}` for {size}", pass.label());

    match pass {
        Pass::DiSampling => {
            let alias_table_buf = buffer(Resource::AliasTable)?;
            let alias_table = alias_table_buf.inner.data.read_recursive();
            let alias_table = view::<gpu::AliasBucket>(
                &alias_table,
                alias_table_buf.size(),
            )?;

            let out_buf = buffer(Resource::Reservoirs)?;
            let mut out = out_buf.inner.data.write();
            let out =
                view_mut::<gpu::DiReservoirData>(&mut out, out_buf.size())?;

            pixels_of_mut(out, pixels)?.par_iter_mut().enumerate().for_each(
                |(idx, out)| {
                    ember_shaders::di_sampling::main(
                        uniforms.camera.idx_to_screen(idx),
                        params,
                        &uniforms,
                        lights,
                        alias_table,
                        surfaces,
                        occluder,
                        out,
                    );
                },
            );
        }

        Pass::DiTemporalResampling => {
            let prev_surfaces_buf = buffer(Resource::PrevSurfaces)?;
            let prev_surfaces = prev_surfaces_buf.inner.data.read_recursive();
            let prev_surfaces = view::<gpu::GBufferEntry>(
                &prev_surfaces,
                prev_surfaces_buf.size(),
            )?;
            let prev_surfaces = pixels_of(prev_surfaces, pixels)?;

            let prev_reservoirs_buf = buffer(Resource::PrevReservoirs)?;
            let prev_reservoirs =
                prev_reservoirs_buf.inner.data.read_recursive();
            let prev_reservoirs = view::<gpu::DiReservoirData>(
                &prev_reservoirs,
                prev_reservoirs_buf.size(),
            )?;
            let prev_reservoirs = pixels_of(prev_reservoirs, pixels)?;

            let out_buf = buffer(Resource::Reservoirs)?;
            let mut out = out_buf.inner.data.write();
            let out =
                view_mut::<gpu::DiReservoirData>(&mut out, out_buf.size())?;

            pixels_of_mut(out, pixels)?.par_iter_mut().enumerate().for_each(
                |(idx, out)| {
                    ember_shaders::di_temporal_resampling::main(
                        uniforms.camera.idx_to_screen(idx),
                        params,
                        &uniforms,
                        lights,
                        surfaces,
                        prev_surfaces,
                        prev_reservoirs,
                        occluder,
                        out,
                    );
                },
            );
        }

        Pass::DiSpatialResampling => {
            let input_buf = buffer(Resource::Input)?;
            let input = input_buf.inner.data.read_recursive();
            let input =
                view::<gpu::DiReservoirData>(&input, input_buf.size())?;
            let input = pixels_of(input, pixels)?;

            let out_buf = buffer(Resource::Output)?;
            let mut out = out_buf.inner.data.write();
            let out =
                view_mut::<gpu::DiReservoirData>(&mut out, out_buf.size())?;

            pixels_of_mut(out, pixels)?.par_iter_mut().enumerate().for_each(
                |(idx, out)| {
                    ember_shaders::di_spatial_resampling::main(
                        uniforms.camera.idx_to_screen(idx),
                        params,
                        &uniforms,
                        lights,
                        surfaces,
                        input,
                        occluder,
                        out,
                    );
                },
            );
        }
    }

    Ok(())
}

/// Views first `size` bytes of given buffer as a slice of `T`s, ignoring any
/// trailing bytes that don't form a whole item.
fn view<T>(words: &[Vec4], size: usize) -> Result<&[T]>
where
    T: Pod,
{
    let bytes: &[u8] = bytemuck::cast_slice(words);
    let len = size / mem::size_of::<T>() * mem::size_of::<T>();

    bytemuck::try_cast_slice(&bytes[..len])
        .map_err(|err| Error::InvalidBindings(err.to_string()))
}

fn view_mut<T>(words: &mut [Vec4], size: usize) -> Result<&mut [T]>
where
    T: Pod,
{
    let bytes: &mut [u8] = bytemuck::cast_slice_mut(words);
    let len = size / mem::size_of::<T>() * mem::size_of::<T>();

    bytemuck::try_cast_slice_mut(&mut bytes[..len])
        .map_err(|err| Error::InvalidBindings(err.to_string()))
}

fn pixels_of<T>(items: &[T], pixels: usize) -> Result<&[T]> {
    items.get(..pixels).ok_or_else(|| too_small(items.len(), pixels))
}

fn pixels_of_mut<T>(items: &mut [T], pixels: usize) -> Result<&mut [T]> {
    let len = items.len();

    items.get_mut(..pixels).ok_or_else(|| too_small(len, pixels))
}

fn too_small(len: usize, pixels: usize) -> Error {
    Error::InvalidBindings(format!(
        "buffer holds {len} items, but {pixels} pixels are being processed"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers() {
        let device = SoftwareDevice::new();
        let timeout = Duration::from_secs(1);

        let buf = device
            .create_buffer("ember_test", BufferUsage::Storage, 12)
            .unwrap();

        assert_eq!(vec![0u32; 3], device.read_buffer::<u32>(&buf).unwrap());

        device
            .write_buffer(&buf, 4, bytemuck::cast_slice(&[7u32, 8u32]))
            .unwrap();

        device.wait_idle(timeout).unwrap();

        assert_eq!(vec![0, 7, 8], device.read_buffer::<u32>(&buf).unwrap());

        // ---

        let buf2 = device
            .create_buffer("ember_test2", BufferUsage::Storage, 16)
            .unwrap();

        let fence = device
            .submit(&[Command::Copy {
                src: &buf,
                dst: &buf2,
            }])
            .unwrap();

        device.wait(&fence, timeout).unwrap();

        assert!(fence.is_signaled());

        assert_eq!(
            vec![0, 7, 8, 0],
            device.read_buffer::<u32>(&buf2).unwrap()
        );

        let fence = device.submit(&[Command::Clear(&buf2)]).unwrap();

        device.wait(&fence, timeout).unwrap();

        assert_eq!(vec![0; 4], device.read_buffer::<u32>(&buf2).unwrap());

        // ---

        assert!(matches!(
            device.write_buffer(&buf, 8, &[0; 8]),
            Err(Error::InvalidParams(_))
        ));
    }

    #[test]
    fn budget() {
        let device = SoftwareDevice::new().with_budget(100);

        let buf = device
            .create_buffer("ember_a", BufferUsage::Storage, 60)
            .unwrap();

        assert_eq!(
            Err(Error::OutOfMemory {
                label: "ember_b".into(),
                size: 60,
            }),
            device.create_buffer("ember_b", BufferUsage::Storage, 60)
        );

        device.destroy_buffer(&buf);

        assert!(device
            .create_buffer("ember_b", BufferUsage::Storage, 60)
            .is_ok());
    }

    #[test]
    fn lost_device() {
        let device = SoftwareDevice::new();

        device.simulate_device_loss();

        assert_eq!(Some(Error::DeviceLost), device.submit(&[]).err());
        assert!(device.submit(&[]).is_ok());
    }
}
