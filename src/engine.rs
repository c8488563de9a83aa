//! Block-streaming execution strategies.
//!
//! Both strategies fill an [`OutputBuffer`] one block at a time and hand every
//! finished block to a [`Sink`] exactly once. A block is only reported after
//! all of its slots are written. Runs with no digests report no blocks.

use crate::algorithm::HashAlgorithm;
use crate::arena::{Lease, ScratchArena};
use crate::cpu::CpuDevice;
use crate::output::OutputBuffer;
use crate::plan::{ExecutionPlan, Runner};
use crate::sink::Sink;
use anyhow::{ensure, Result};
use std::ops::Range;

#[cfg(feature = "gpu")]
use crate::gpu::GpuDevice;

/// One block's worth of work for a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockJob {
    pub index: u64,
    pub base: u64,
    pub hashes: u64,
    pub algorithm: HashAlgorithm,
}

impl BlockJob {
    pub fn new(plan: &ExecutionPlan, index: u64) -> Self {
        Self {
            index,
            base: plan.block_slots(index).start,
            hashes: plan.hashes_per_block,
            algorithm: plan.algorithm,
        }
    }

    pub fn slots(&self) -> Range<u64> {
        self.base..self.base + self.hashes
    }
}

/// A launched block. Owns its scratch lease until [`Device::copy_back`]
/// returns it, so the host cannot reuse the buffer early.
pub struct InFlight<S> {
    pub(crate) lease: Lease<S>,
    pub(crate) job: BlockJob,
}

/// Parallel compute target used by the accelerated strategy.
pub trait Device {
    type Scratch;

    fn name(&self) -> String;

    /// Allocates scratch space for `hashes` digests of `algorithm`.
    fn allocate(&self, hashes: u64, algorithm: HashAlgorithm) -> Result<Self::Scratch>;

    /// Starts one task per slot of `job`; each task writes only its own slot.
    fn launch(&self, lease: Lease<Self::Scratch>, job: BlockJob) -> Result<InFlight<Self::Scratch>>;

    /// Waits for the block to finish and copies its digests into `dst`.
    fn copy_back(
        &self,
        in_flight: InFlight<Self::Scratch>,
        dst: &mut [u8],
    ) -> Result<Lease<Self::Scratch>>;
}

/// Computes every digest on the calling thread, in index order.
pub fn run_serial(plan: &ExecutionPlan, output: &mut OutputBuffer, sink: &mut dyn Sink) -> Result<()> {
    let total = output.slots();
    let mut flushed = 0u64;
    let mut block = 0u64;

    for i in 0..total {
        plan.algorithm.digest_index(i, output.slot_mut(i));
        if (i + 1) % plan.hashes_per_block == 0 {
            sink.consume(output.completed(block, flushed..i + 1))?;
            flushed = i + 1;
            block += 1;
        }
    }

    // Unflushed tail; empty for whole blocks.
    if flushed < total {
        sink.consume(output.completed(block, flushed..total))?;
    }
    Ok(())
}

/// Runs the plan block by block on `device`, with a full barrier between
/// blocks.
pub fn run_accelerated<D: Device>(
    device: &D,
    plan: &ExecutionPlan,
    output: &mut OutputBuffer,
    sink: &mut dyn Sink,
) -> Result<()> {
    if plan.hashes_per_block == 0 || plan.num_blocks == 0 {
        return Ok(());
    }
    ensure!(
        output.digest_size() == plan.algorithm.digest_size(),
        "output buffer slots are {} bytes, {} digests are {}",
        output.digest_size(),
        plan.algorithm,
        plan.algorithm.digest_size()
    );

    let mut arena = ScratchArena::new(1);
    for index in 0..plan.num_blocks {
        let job = BlockJob::new(plan, index);
        let lease = arena.acquire(|| device.allocate(job.hashes, job.algorithm))?;
        let in_flight = device.launch(lease, job)?;
        let lease = device.copy_back(in_flight, output.slots_mut(job.slots()))?;
        arena.release(lease);
        sink.consume(output.completed(index, job.slots()))?;
    }
    Ok(())
}

/// Runner resolved to something that can execute.
pub enum Strategy {
    Serial,
    Cpu(CpuDevice),
    #[cfg(feature = "gpu")]
    Gpu(GpuDevice),
}

impl Strategy {
    /// Sets up the device behind `runner`. Device discovery happens here,
    /// outside the timed section.
    pub fn for_runner(runner: Runner) -> Result<Self> {
        match runner {
            Runner::Serial => Ok(Strategy::Serial),
            Runner::Cpu => Ok(Strategy::Cpu(CpuDevice::new())),
            #[cfg(feature = "gpu")]
            Runner::Gpu => Ok(Strategy::Gpu(GpuDevice::new()?)),
            #[cfg(not(feature = "gpu"))]
            Runner::Gpu => anyhow::bail!("this build has no gpu support (enable the `gpu` feature)"),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Strategy::Serial => "serial (1 thread)".to_string(),
            Strategy::Cpu(device) => device.name(),
            #[cfg(feature = "gpu")]
            Strategy::Gpu(device) => device.name(),
        }
    }

    pub fn execute(&self, plan: &ExecutionPlan, output: &mut OutputBuffer, sink: &mut dyn Sink) -> Result<()> {
        match self {
            Strategy::Serial => run_serial(plan, output, sink),
            Strategy::Cpu(device) => run_accelerated(device, plan, output, sink),
            #[cfg(feature = "gpu")]
            Strategy::Gpu(device) => run_accelerated(device, plan, output, sink),
        }
    }
}
