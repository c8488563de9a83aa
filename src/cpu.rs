//! CPU-parallel device backed by rayon's global thread pool.

use crate::algorithm::HashAlgorithm;
use crate::arena::Lease;
use crate::engine::{BlockJob, Device, InFlight};
use anyhow::{anyhow, ensure, Context, Result};
use rayon::prelude::*;

#[derive(Debug, Default)]
pub struct CpuDevice;

impl CpuDevice {
    pub fn new() -> Self {
        CpuDevice
    }
}

/// Host memory standing in for device memory.
pub struct CpuScratch {
    bytes: Vec<u8>,
    digest_size: usize,
}

impl Device for CpuDevice {
    type Scratch = CpuScratch;

    fn name(&self) -> String {
        format!("cpu (rayon, {} threads)", rayon::current_num_threads())
    }

    fn allocate(&self, hashes: u64, algorithm: HashAlgorithm) -> Result<CpuScratch> {
        let digest_size = algorithm.digest_size();
        let len = usize::try_from(hashes)
            .ok()
            .and_then(|hashes| hashes.checked_mul(digest_size))
            .ok_or_else(|| anyhow!("block of {} digests exceeds the address space", hashes))?;

        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(len)
            .with_context(|| format!("allocating {} byte scratch buffer", len))?;
        bytes.resize(len, 0);
        Ok(CpuScratch { bytes, digest_size })
    }

    fn launch(&self, mut lease: Lease<CpuScratch>, job: BlockJob) -> Result<InFlight<CpuScratch>> {
        let scratch = lease.buffer_mut();
        ensure!(
            scratch.digest_size == job.algorithm.digest_size()
                && scratch.bytes.len() as u64 == job.hashes * scratch.digest_size as u64,
            "scratch buffer does not fit block {}",
            job.index
        );

        // rayon returns once every task has run, so the block is complete
        // before launch hands it back.
        scratch
            .bytes
            .par_chunks_mut(scratch.digest_size)
            .enumerate()
            .for_each(|(local, slot)| job.algorithm.digest_index(job.base + local as u64, slot));

        Ok(InFlight { lease, job })
    }

    fn copy_back(&self, in_flight: InFlight<CpuScratch>, dst: &mut [u8]) -> Result<Lease<CpuScratch>> {
        let InFlight { lease, job } = in_flight;
        let src = &lease.buffer().bytes;
        ensure!(
            dst.len() == src.len(),
            "block {} copy-back: {} byte destination for {} byte scratch",
            job.index,
            dst.len(),
            src.len()
        );
        dst.copy_from_slice(src);
        Ok(lease)
    }
}
