//! GPU device: the WGSL SHA-2 kernel in `sha2.wgsl`, dispatched through wgpu.
//!
//! Each block is one submission: a compute pass writing the storage buffer,
//! then a copy into a mappable staging buffer. The copy-back barrier maps the
//! staging buffer and blocks on `Maintain::Wait`.

use crate::algorithm::HashAlgorithm;
use crate::arena::Lease;
use crate::engine::{BlockJob, Device, InFlight};
use crate::utils::format_bytes;
use anyhow::{anyhow, ensure, Context, Result};
use bytemuck::{Pod, Zeroable};

const WORKGROUP_SIZE: u64 = 64;

/// Mirrors `Params` in the shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Params {
    base_lo: u32,
    base_hi: u32,
    count: u32,
    digest_words: u32,
}

pub struct GpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::ComputePipeline,
    info: wgpu::AdapterInfo,
    limits: wgpu::Limits,
}

pub struct GpuScratch {
    storage: wgpu::Buffer,
    staging: wgpu::Buffer,
    params: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    hashes: u64,
    algorithm: HashAlgorithm,
    digest_words: u32,
}

impl GpuDevice {
    /// Picks the high-performance adapter and compiles the kernel.
    pub fn new() -> Result<Self> {
        pollster::block_on(Self::request())
    }

    async fn request() -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .ok_or_else(|| anyhow!("no compatible GPU adapter found"))?;

        // Ask for everything the adapter offers; blocks are sized against it.
        let limits = adapter.limits();
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("hash-benchmark"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits.clone(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .context("requesting GPU device")?;

        let module = device.create_shader_module(wgpu::include_wgsl!("sha2.wgsl"));
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("sha2"),
            layout: None,
            module: &module,
            entry_point: "main",
            compilation_options: Default::default(),
            cache: None,
        });

        Ok(Self {
            device,
            queue,
            pipeline,
            info: adapter.get_info(),
            limits,
        })
    }
}

/// Workgroup grid covering `hashes` invocations, spilling into y once x is
/// at the per-dimension limit.
fn dispatch_size(hashes: u64, max_per_dimension: u32) -> Result<(u32, u32)> {
    let groups = hashes.div_ceil(WORKGROUP_SIZE).max(1);
    let x = groups.min(u64::from(max_per_dimension));
    let y = groups.div_ceil(x);
    ensure!(
        y <= u64::from(max_per_dimension),
        "{} digests need more workgroups than the adapter can dispatch",
        hashes
    );
    Ok((x as u32, y as u32))
}

impl Device for GpuDevice {
    type Scratch = GpuScratch;

    fn name(&self) -> String {
        format!("gpu ({}, {:?})", self.info.name, self.info.backend)
    }

    fn allocate(&self, hashes: u64, algorithm: HashAlgorithm) -> Result<GpuScratch> {
        let digest_words = algorithm
            .gpu_digest_words()
            .ok_or_else(|| anyhow!("the gpu runner has no {} kernel", algorithm))?;
        ensure!(hashes > 0, "cannot allocate an empty block");
        ensure!(
            hashes <= u64::from(u32::MAX),
            "block of {} digests is too large for the gpu runner",
            hashes
        );

        let size = hashes * algorithm.digest_size() as u64;
        let limit = u64::from(self.limits.max_storage_buffer_binding_size).min(self.limits.max_buffer_size);
        ensure!(
            size <= limit,
            "block needs a {} device buffer, adapter allows {}",
            format_bytes(size),
            format_bytes(limit)
        );

        let storage = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("digests"),
            size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("digests staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let params = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("params"),
            size: std::mem::size_of::<Params>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("sha2"),
            layout: &self.pipeline.get_bind_group_layout(0),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: storage.as_entire_binding(),
                },
            ],
        });

        Ok(GpuScratch {
            storage,
            staging,
            params,
            bind_group,
            hashes,
            algorithm,
            digest_words,
        })
    }

    fn launch(&self, lease: Lease<GpuScratch>, job: BlockJob) -> Result<InFlight<GpuScratch>> {
        let scratch = lease.buffer();
        ensure!(
            scratch.hashes == job.hashes && scratch.algorithm == job.algorithm,
            "scratch buffer does not fit block {}",
            job.index
        );
        let (x, y) = dispatch_size(job.hashes, self.limits.max_compute_workgroups_per_dimension)?;

        let params = Params {
            base_lo: job.base as u32,
            base_hi: (job.base >> 32) as u32,
            count: job.hashes as u32,
            digest_words: scratch.digest_words,
        };
        self.queue
            .write_buffer(&scratch.params, 0, bytemuck::bytes_of(&params));

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("hash block"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("sha2"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &scratch.bind_group, &[]);
            pass.dispatch_workgroups(x, y, 1);
        }
        // Same submission, so the copy starts after every invocation finished.
        encoder.copy_buffer_to_buffer(&scratch.storage, 0, &scratch.staging, 0, scratch.storage.size());
        self.queue.submit(Some(encoder.finish()));

        Ok(InFlight { lease, job })
    }

    fn copy_back(&self, in_flight: InFlight<GpuScratch>, dst: &mut [u8]) -> Result<Lease<GpuScratch>> {
        let InFlight { lease, job } = in_flight;
        let staging = &lease.buffer().staging;
        ensure!(
            dst.len() as u64 == staging.size(),
            "block {} copy-back: {} byte destination for {} byte scratch",
            job.index,
            dst.len(),
            staging.size()
        );

        let slice = staging.slice(..);
        let (sender, receiver) = crossbeam_channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .context("GPU dropped the map callback")?
            .with_context(|| format!("mapping block {} for copy-back", job.index))?;

        dst.copy_from_slice(&slice.get_mapped_range());
        staging.unmap();
        Ok(lease)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ScratchArena;

    // Most CI machines have no adapter; those tests pass vacuously there.
    fn device() -> Option<GpuDevice> {
        match GpuDevice::new() {
            Ok(device) => Some(device),
            Err(e) => {
                eprintln!("skipping gpu test: {:#}", e);
                None
            }
        }
    }

    fn run_block(device: &GpuDevice, job: BlockJob) -> Result<Vec<u8>> {
        let mut arena = ScratchArena::new(1);
        let lease = arena.acquire(|| device.allocate(job.hashes, job.algorithm))?;
        let in_flight = device.launch(lease, job)?;
        let mut dst = vec![0u8; job.hashes as usize * job.algorithm.digest_size()];
        let lease = device.copy_back(in_flight, &mut dst)?;
        arena.release(lease);
        Ok(dst)
    }

    fn cpu_digests(job: &BlockJob) -> Vec<u8> {
        let size = job.algorithm.digest_size();
        let mut out = vec![0u8; job.hashes as usize * size];
        for (local, slot) in out.chunks_exact_mut(size).enumerate() {
            job.algorithm.digest_index(job.base + local as u64, slot);
        }
        out
    }

    #[test]
    fn test_dispatch_size() -> Result<()> {
        assert_eq!(dispatch_size(1, 65535)?, (1, 1));
        assert_eq!(dispatch_size(64, 65535)?, (1, 1));
        assert_eq!(dispatch_size(65, 65535)?, (2, 1));
        assert_eq!(dispatch_size(64 * 65535 + 1, 65535)?, (65535, 2));
        assert!(dispatch_size(64 * 4 * 4 + 1, 4).is_err());
        Ok(())
    }

    #[test]
    fn test_kernel_matches_cpu() -> Result<()> {
        let Some(device) = device() else {
            return Ok(());
        };
        for algorithm in [HashAlgorithm::Sha224, HashAlgorithm::Sha256] {
            // Straddles the 32-bit carry in the index.
            let job = BlockJob {
                index: 0,
                base: u64::from(u32::MAX) - 70,
                hashes: 130,
                algorithm,
            };
            assert_eq!(run_block(&device, job)?, cpu_digests(&job), "{algorithm}");
        }
        Ok(())
    }

    #[test]
    fn test_no_kernel_for_md5() {
        let Some(device) = device() else {
            return;
        };
        let err = device.allocate(4, HashAlgorithm::Md5).err().map(|e| e.to_string());
        assert_eq!(err.as_deref(), Some("the gpu runner has no md5 kernel"));
    }
}
