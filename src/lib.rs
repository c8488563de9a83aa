pub mod algorithm;
pub mod arena;
pub mod cli;
pub mod cpu;
pub mod engine;
#[cfg(feature = "gpu")]
pub mod gpu;
pub mod output;
pub mod plan;
pub mod sink;
pub mod timing;
pub mod utils;

use anyhow::{anyhow, Result};
use std::fmt;
use std::io;

use cli::Invocation;
use engine::Strategy;
use output::OutputBuffer;
use plan::ExecutionPlan;
use sink::{Discard, HexLines, Sink};
use timing::{time_execution, Elapsed};
use utils::{format_bytes, HashHex, Logger};

/// Outcome of one run; `Display` renders the summary line.
#[derive(Debug, Clone, Copy)]
pub struct Report {
    pub plan: ExecutionPlan,
    pub elapsed: Elapsed,
}

impl Report {
    /// Digests per second; zero for empty runs.
    pub fn hashes_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        let total = self.plan.total_count().unwrap_or(0) as f64;
        if secs > 0.0 {
            total / secs
        } else {
            0.0
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hashes_per_block =\t{}\tnum_blocks =\t{}\talgo =\t{}\trunner =\t{}\telapsed (s) =\t{:.6}",
            self.plan.hashes_per_block,
            self.plan.num_blocks,
            self.plan.algorithm,
            self.plan.runner,
            self.elapsed.as_secs_f64()
        )
    }
}

/// Allocates the output buffer and times `strategy` over the whole plan.
/// The buffer is returned so callers can inspect the digests.
pub fn execute(
    plan: &ExecutionPlan,
    strategy: &Strategy,
    sink: &mut dyn Sink,
) -> Result<(OutputBuffer, Elapsed)> {
    let total = plan.total_count().ok_or_else(|| {
        anyhow!(
            "{} blocks of {} digests overflow a 64-bit count",
            plan.num_blocks,
            plan.hashes_per_block
        )
    })?;
    let mut output = OutputBuffer::allocate(total, plan.algorithm.digest_size())?;

    let (result, elapsed) = time_execution(|| strategy.execute(plan, &mut output, sink));
    result?;
    Ok((output, elapsed))
}

/// Runs a parsed invocation end to end. Digests go to stderr when requested;
/// the summary is left to the caller.
pub fn run(invocation: &Invocation) -> Result<Report> {
    let Invocation { config, plan } = invocation;
    let logger = config.log_path.as_ref().map(Logger::new);
    let log = |message: String| -> Result<()> {
        match &logger {
            Some(logger) => logger.log(&message),
            None => Ok(()),
        }
    };

    let strategy = Strategy::for_runner(plan.runner)?;
    log(format!(
        "Starting: {} x {} {} digests on {}, output buffer {}",
        plan.num_blocks,
        plan.hashes_per_block,
        plan.algorithm,
        strategy.describe(),
        format_bytes(
            plan.total_count()
                .unwrap_or(u64::MAX)
                .saturating_mul(plan.algorithm.digest_size() as u64)
        )
    ))?;

    let (output, elapsed) = if config.print_hashes {
        let mut sink = HexLines::new(io::stderr().lock());
        execute(plan, &strategy, &mut sink)?
    } else {
        execute(plan, &strategy, &mut Discard)?
    };

    let report = Report {
        plan: *plan,
        elapsed,
    };
    let last = match output.slots() {
        0 => "none".to_string(),
        n => HashHex::new(output.slot(n - 1)).to_string(),
    };
    log(format!(
        "Finished in {:.6}s ({:.0} hashes/s), last digest {}",
        elapsed.as_secs_f64(),
        report.hashes_per_second(),
        last
    ))?;

    Ok(report)
}
