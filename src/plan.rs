use crate::algorithm::HashAlgorithm;
use std::fmt;
use std::ops::Range;

/// Execution strategy selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Runner {
    Serial,
    Cpu,
    Gpu,
}

impl Runner {
    pub const ALL: [Runner; 3] = [Runner::Serial, Runner::Cpu, Runner::Gpu];

    pub fn name(self) -> &'static str {
        match self {
            Runner::Serial => "serial",
            Runner::Cpu => "cpu",
            Runner::Gpu => "gpu",
        }
    }

    /// Older names for the accelerated runners, still accepted on input.
    pub const ALIASES: [(&'static str, Runner); 2] =
        [("sycl-cpu", Runner::Cpu), ("sycl-gpu", Runner::Gpu)];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|runner| runner.name() == name)
            .or_else(|| {
                Self::ALIASES
                    .iter()
                    .find(|(alias, _)| *alias == name)
                    .map(|&(_, runner)| runner)
            })
    }
}

impl fmt::Display for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A validated benchmark run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionPlan {
    pub algorithm: HashAlgorithm,
    pub runner: Runner,
    pub hashes_per_block: u64,
    pub num_blocks: u64,
}

impl ExecutionPlan {
    /// Total digests in the run, or `None` if the product overflows u64.
    pub fn total_count(&self) -> Option<u64> {
        self.hashes_per_block.checked_mul(self.num_blocks)
    }

    /// Iteration indices covered by block `index`.
    pub fn block_slots(&self, index: u64) -> Range<u64> {
        let base = index * self.hashes_per_block;
        base..base + self.hashes_per_block
    }
}
