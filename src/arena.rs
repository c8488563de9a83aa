//! Reusable device scratch buffers.
//!
//! A scratch buffer is leased before a block is launched and handed back only
//! after that block's copy-back barrier. While leased it belongs to exactly one
//! in-flight block, so a second block can never overwrite digests that have
//! not reached the host yet.

use anyhow::{bail, Result};

pub struct ScratchArena<S> {
    free: Vec<S>,
    capacity: usize,
    allocated: usize,
    leased: usize,
}

/// Exclusive use of one scratch buffer.
#[derive(Debug)]
pub struct Lease<S> {
    buffer: S,
}

impl<S> Lease<S> {
    pub fn buffer(&self) -> &S {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut S {
        &mut self.buffer
    }
}

impl<S> ScratchArena<S> {
    pub fn new(capacity: usize) -> Self {
        Self {
            free: Vec::with_capacity(capacity),
            capacity,
            allocated: 0,
            leased: 0,
        }
    }

    /// Leases a free buffer, calling `allocate` only when none is free and
    /// the arena is below capacity.
    pub fn acquire(&mut self, allocate: impl FnOnce() -> Result<S>) -> Result<Lease<S>> {
        let buffer = match self.free.pop() {
            Some(buffer) => buffer,
            None if self.allocated < self.capacity => {
                let buffer = allocate()?;
                self.allocated += 1;
                buffer
            }
            None => bail!(
                "scratch arena exhausted: all {} buffers are in flight",
                self.capacity
            ),
        };
        self.leased += 1;
        Ok(Lease { buffer })
    }

    pub fn release(&mut self, lease: Lease<S>) {
        debug_assert!(self.leased > 0, "release without a matching acquire");
        self.leased -= 1;
        self.free.push(lease.buffer);
    }

    pub fn allocated(&self) -> usize {
        self.allocated
    }

    pub fn leased(&self) -> usize {
        self.leased
    }
}
