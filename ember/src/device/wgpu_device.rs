use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use std::{fmt, mem, thread};

use fxhash::FxHashMap;
use log::{debug, info, trace, warn};
use parking_lot::Mutex;

use crate::{
    gpu, BindingTable, BufferUsage, Command, Device, DeviceLimits, Error, Pass,
    Resource, Result,
};

/// Shader modules (and their entry points) implementing each pass.
#[derive(Debug)]
pub struct WgpuShaders {
    pub di_sampling: (wgpu::ShaderModule, &'static str),
    pub di_temporal_resampling: (wgpu::ShaderModule, &'static str),
    pub di_spatial_resampling: (wgpu::ShaderModule, &'static str),
}

impl WgpuShaders {
    fn get(&self, pass: Pass) -> &(wgpu::ShaderModule, &'static str) {
        match pass {
            Pass::DiSampling => &self.di_sampling,
            Pass::DiTemporalResampling => &self.di_temporal_resampling,
            Pass::DiSpatialResampling => &self.di_spatial_resampling,
        }
    }
}

/// Device that maps the passes onto wgpu compute pipelines.
///
/// Requires [`wgpu::Features::PUSH_CONSTANTS`], since that's how the
/// per-dispatch [`gpu::PassParams`] get delivered.
pub struct WgpuDevice {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    shaders: WgpuShaders,
    pipelines: Mutex<FxHashMap<Pass, Arc<WgpuPipeline>>>,

    /// Bound in place of the acceleration structure when there's none.
    empty_tlas: WgpuTlas,

    lost: Arc<AtomicBool>,
}

impl WgpuDevice {
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        shaders: WgpuShaders,
    ) -> Self {
        info!("Initializing wgpu device");

        let lost = Arc::new(AtomicBool::new(false));

        device.set_device_lost_callback({
            let lost = lost.clone();

            move |reason, msg| {
                warn!("Device lost: {reason:?} ({msg})");
                lost.store(true, Ordering::SeqCst);
            }
        });

        let empty_tlas = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("ember_empty_tlas"),
            size: mem::size_of::<[glam::Vec4; 3]>() as u64,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });

        Self {
            device,
            queue,
            shaders,
            pipelines: Default::default(),
            empty_tlas: Arc::new(empty_tlas),
            lost,
        }
    }

    fn pipeline(&self, pass: Pass) -> Arc<WgpuPipeline> {
        self.pipelines
            .lock()
            .entry(pass)
            .or_insert_with(|| {
                Arc::new(WgpuPipeline::new(
                    &self.device,
                    pass,
                    self.shaders.get(pass),
                ))
            })
            .clone()
    }

    fn check_lost(&self) -> Result<()> {
        if self.lost.load(Ordering::SeqCst) {
            Err(Error::DeviceLost)
        } else {
            Ok(())
        }
    }

    fn fence(&self) -> WgpuFence {
        let fence = WgpuFence::default();

        self.queue.on_submitted_work_done({
            let done = fence.done.clone();

            move || {
                done.store(true, Ordering::SeqCst);
            }
        });

        fence
    }
}

impl fmt::Debug for WgpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WgpuDevice")
            .field("lost", &self.lost.load(Ordering::SeqCst))
            .finish()
    }
}

impl Device for WgpuDevice {
    type Buffer = WgpuBuffer;
    type Bindings = WgpuBindings;
    type Fence = WgpuFence;
    type Tlas = WgpuTlas;

    fn limits(&self) -> DeviceLimits {
        let limits = self.device.limits();

        DeviceLimits {
            max_buffer_size: limits.max_storage_buffer_binding_size as usize,
        }
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

        if size > self.limits().max_buffer_size {
            return Err(oom());
        }

        self.check_lost()?;

        let usages = match usage {
            BufferUsage::Uniform => {
                wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST
            }
            BufferUsage::Storage => {
                wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC
            }
        };

        // wgpu doesn't support empty buffers, and copies have to be aligned
        let aligned_size = size
            .max(16)
            .next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT as usize);

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: aligned_size as u64,
            usage: usages,
            mapped_at_creation: false,
        });

        if futures::executor::block_on(self.device.pop_error_scope()).is_some()
        {
            buffer.destroy();

            return Err(oom());
        }

        Ok(WgpuBuffer {
            inner: Arc::new(WgpuBufferInner {
                label: label.to_string(),
                size,
                buffer,
            }),
        })
    }

    fn destroy_buffer(&self, buffer: &Self::Buffer) {
        debug!("Releasing buffer `{}`", buffer.inner.label);

        buffer.inner.buffer.destroy();
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

        self.check_lost()?;

        let align = wgpu::COPY_BUFFER_ALIGNMENT as usize;

        if offset % align != 0 {
            return Err(Error::InvalidParams(format!(
                "writes into buffer `{}` must start at a multiple of {align}",
                buffer.inner.label,
            )));
        }

        if data.len() % align == 0 {
            self.queue
                .write_buffer(&buffer.inner.buffer, offset as u64, data);
        } else {
            let mut padded = data.to_vec();

            padded.resize(data.len().next_multiple_of(align), 0);

            self.queue
                .write_buffer(&buffer.inner.buffer, offset as u64, &padded);
        }

        Ok(())
    }

    fn create_bindings(
        &self,
        table: &BindingTable<Self::Buffer>,
        tlas: Option<&Self::Tlas>,
    ) -> Result<Self::Bindings> {
        let pass = table.pass();
        let pipeline = self.pipeline(pass);
        let tlas = tlas.unwrap_or(&self.empty_tlas);

        let mut entries: Vec<_> = table
            .iter()
            .enumerate()
            .map(|(binding, (_, _, buffer))| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: buffer.inner.buffer.as_entire_binding(),
            })
            .collect();

        entries.push(wgpu::BindGroupEntry {
            binding: entries.len() as u32,
            resource: tlas.as_entire_binding(),
        });

        let label = format!("ember_{}_bind_group", pass.label());

        let bind_group =
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&label),
                layout: &pipeline.bind_group_layout,
                entries: &entries,
            });

        Ok(WgpuBindings {
            pass,
            pipeline,
            bind_group,
        })
    }

    fn submit(&self, commands: &[Command<'_, Self>]) -> Result<Self::Fence> {
        self.check_lost()?;

        let mut encoder = self.device.create_command_encoder(
            &wgpu::CommandEncoderDescriptor {
                label: Some("ember_frame"),
            },
        );

        for command in commands {
            match command {
                Command::Clear(buffer) => {
                    encoder.clear_buffer(&buffer.inner.buffer, 0, None);
                }

                Command::Dispatch {
                    pass,
                    bindings,
                    params,
                    size,
                } => {
                    debug_assert_eq!(*pass, bindings.pass);

                    let label = format!("ember_{}_pass", pass.label());

                    let mut cpass = encoder.begin_compute_pass(
                        &wgpu::ComputePassDescriptor {
                            label: Some(&label),
                            timestamp_writes: None,
                        },
                    );

                    cpass.set_pipeline(&bindings.pipeline.pipeline);
                    cpass.set_push_constants(0, bytemuck::bytes_of(params));
                    cpass.set_bind_group(0, &bindings.bind_group, &[]);

                    // Each pass uses 8x8 workgroups
                    let size = (*size + gpu::WORKGROUP_SIZE - 1)
                        / gpu::WORKGROUP_SIZE;

                    cpass.dispatch_workgroups(size.x, size.y, 1);
                }

                // wgpu tracks hazards between passes on its own
                Command::Barrier => {}

                Command::Copy { src, dst } => {
                    let len = src.inner.size.min(dst.inner.size) as u64;

                    encoder.copy_buffer_to_buffer(
                        &src.inner.buffer,
                        0,
                        &dst.inner.buffer,
                        0,
                        len.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT),
                    );
                }
            }
        }

        trace!("Submitting batch");

        self.queue.submit([encoder.finish()]);

        Ok(self.fence())
    }

    fn wait(&self, fence: &Self::Fence, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;

        loop {
            self.device.poll(wgpu::Maintain::Poll);

            if fence.is_signaled() {
                return Ok(());
            }

            self.check_lost()?;

            if Instant::now() >= deadline {
                return Err(Error::DeviceLost);
            }

            thread::sleep(Duration::from_micros(100));
        }
    }

    fn wait_idle(&self, timeout: Duration) -> Result<()> {
        self.check_lost()?;

        let fence = self.fence();

        self.wait(&fence, timeout)
    }
}

#[derive(Debug)]
struct WgpuPipeline {
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
}

impl WgpuPipeline {
    fn new(
        device: &wgpu::Device,
        pass: Pass,
        (module, entry_point): &(wgpu::ShaderModule, &'static str),
    ) -> Self {
        debug!("Initializing pass: {}:{}", pass.label(), entry_point);

        let storage = |read_only| wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        };

        let mut entries: Vec<_> = pass
            .layout()
            .iter()
            .enumerate()
            .map(|(binding, &(resource, access))| {
                let ty = if resource == Resource::Uniforms {
                    wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    }
                } else {
                    storage(!access.writes())
                };

                wgpu::BindGroupLayoutEntry {
                    binding: binding as u32,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty,
                    count: None,
                }
            })
            .collect();

        entries.push(wgpu::BindGroupLayoutEntry {
            binding: entries.len() as u32,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: storage(true),
            count: None,
        });

        let bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("ember_{}_layout", pass.label())),
                entries: &entries,
            });

        let pipeline_layout_label =
            format!("ember_{}_pipeline_layout", pass.label());

        let pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&pipeline_layout_label),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[wgpu::PushConstantRange {
                    stages: wgpu::ShaderStages::COMPUTE,
                    range: Range {
                        start: 0,
                        end: mem::size_of::<gpu::PassParams>() as u32,
                    },
                }],
            });

        let pipeline_label = format!("ember_{}_pipeline", pass.label());

        let pipeline =
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(&pipeline_label),
                layout: Some(&pipeline_layout),
                module,
                entry_point: *entry_point,
                compilation_options: wgpu::PipelineCompilationOptions {
                    zero_initialize_workgroup_memory: false,
                    ..Default::default()
                },
                cache: None,
            });

        Self {
            bind_group_layout,
            pipeline,
        }
    }
}

#[derive(Clone)]
pub struct WgpuBuffer {
    inner: Arc<WgpuBufferInner>,
}

struct WgpuBufferInner {
    label: String,
    size: usize,
    buffer: wgpu::Buffer,
}

impl WgpuBuffer {
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn size(&self) -> usize {
        self.inner.size
    }

    pub fn raw(&self) -> &wgpu::Buffer {
        &self.inner.buffer
    }
}

impl PartialEq for WgpuBuffer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for WgpuBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WgpuBuffer")
            .field("label", &self.inner.label)
            .field("size", &self.inner.size)
            .finish()
    }
}

/// Triangles of the scene's occluders, as read by the passes' visibility
/// tests.
pub type WgpuTlas = Arc<wgpu::Buffer>;

#[derive(Debug)]
pub struct WgpuBindings {
    pass: Pass,
    pipeline: Arc<WgpuPipeline>,
    bind_group: wgpu::BindGroup,
}

#[derive(Clone, Debug, Default)]
pub struct WgpuFence {
    done: Arc<AtomicBool>,
}

impl WgpuFence {
    pub fn is_signaled(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use futures::executor::block_on;

    use super::*;

    const SHADER: &str = "@compute @workgroup_size(8, 8) fn main() {}";

    /// Returns a device backed by any available adapter, or `None` when the
    /// machine has no adapter at all.
    fn device() -> Option<WgpuDevice> {
        let _ = env_logger::builder().is_test(true).try_init();

        let instance =
            wgpu::Instance::new(wgpu::InstanceDescriptor::default());

        let Some(adapter) = block_on(
            instance.request_adapter(&wgpu::RequestAdapterOptions::default()),
        ) else {
            warn!("No adapter available; skipping test");
            return None;
        };

        let (device, queue) = block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("ember_test"),
                required_limits: adapter.limits(),
                ..Default::default()
            },
            None,
        ))
        .ok()?;

        let shader = || {
            let module =
                device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some("ember_test_shader"),
                    source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(SHADER)),
                });

            (module, "main")
        };

        let shaders = WgpuShaders {
            di_sampling: shader(),
            di_temporal_resampling: shader(),
            di_spatial_resampling: shader(),
        };

        Some(WgpuDevice::new(Arc::new(device), Arc::new(queue), shaders))
    }

    fn read(target: &WgpuDevice, buffer: &WgpuBuffer) -> Vec<u32> {
        let size = buffer.raw().size();

        let staging = target.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("ember_test_staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = target.device.create_command_encoder(
            &wgpu::CommandEncoderDescriptor { label: None },
        );

        encoder.copy_buffer_to_buffer(buffer.raw(), 0, &staging, 0, size);
        target.queue.submit([encoder.finish()]);

        let slice = staging.slice(..);

        slice.map_async(wgpu::MapMode::Read, |result| {
            result.unwrap();
        });

        target.device.poll(wgpu::Maintain::Wait);

        let data: Vec<_> = slice
            .get_mapped_range()
            .chunks_exact(4)
            .map(|word| u32::from_le_bytes(word.try_into().unwrap()))
            .collect();

        data[..buffer.size() / 4].to_vec()
    }

    #[test]
    fn buffers() {
        let Some(target) = device() else {
            return;
        };

        let timeout = Duration::from_secs(5);

        let a = target
            .create_buffer("ember_test_a", BufferUsage::Storage, 16)
            .unwrap();

        let b = target
            .create_buffer("ember_test_b", BufferUsage::Storage, 16)
            .unwrap();

        assert_eq!("ember_test_a", a.label());
        assert_eq!(16, a.size());
        assert!(a == a.clone());
        assert!(a != b);

        // ---

        target
            .write_buffer(&a, 0, bytemuck::cast_slice(&[1u32, 2, 3, 4]))
            .unwrap();

        target.write_buffer(&a, 8, &[5]).unwrap();

        let fence = target.submit(&[Command::Copy { src: &a, dst: &b }]);
        let fence = fence.unwrap();

        target.wait(&fence, timeout).unwrap();

        assert!(fence.is_signaled());
        assert_eq!(vec![1, 2, 5, 4], read(&target, &b));

        // ---

        let fence = target.submit(&[Command::Clear(&a)]).unwrap();

        target.wait(&fence, timeout).unwrap();

        assert_eq!(vec![0, 0, 0, 0], read(&target, &a));
        assert_eq!(vec![1, 2, 5, 4], read(&target, &b));

        // ---

        target.wait_idle(timeout).unwrap();
        target.destroy_buffer(&a);
        target.destroy_buffer(&b);
    }

    #[test]
    fn invalid_writes() {
        let Some(target) = device() else {
            return;
        };

        let buffer = target
            .create_buffer("ember_test", BufferUsage::Uniform, 8)
            .unwrap();

        let err = target.write_buffer(&buffer, 4, &[0; 8]).unwrap_err();

        assert!(matches!(err, Error::InvalidParams(_)));

        let err = target.write_buffer(&buffer, 2, &[0; 2]).unwrap_err();

        assert!(matches!(err, Error::InvalidParams(_)));
    }

    #[test]
    fn oversized_buffers() {
        let Some(target) = device() else {
            return;
        };

        let size = target.limits().max_buffer_size + 1;

        let err = target
            .create_buffer("ember_test", BufferUsage::Storage, size)
            .unwrap_err();

        assert_eq!(
            Error::OutOfMemory {
                label: "ember_test".into(),
                size,
            },
            err
        );
    }
}
