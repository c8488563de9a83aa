//! Host-side storage for every digest of one run.

use crate::sink::CompletedBlock;
use anyhow::{anyhow, Context, Result};
use std::ops::Range;

/// Contiguous `slots × digest_size` bytes; slot `i` holds the digest of
/// iteration `i`.
#[derive(Debug)]
pub struct OutputBuffer {
    bytes: Vec<u8>,
    digest_size: usize,
    slots: u64,
}

impl OutputBuffer {
    pub fn allocate(slots: u64, digest_size: usize) -> Result<Self> {
        let len = usize::try_from(slots)
            .ok()
            .and_then(|slots| slots.checked_mul(digest_size))
            .ok_or_else(|| anyhow!("{} digests of {} bytes exceed the address space", slots, digest_size))?;

        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(len)
            .with_context(|| format!("allocating output buffer of {} bytes", len))?;
        bytes.resize(len, 0);

        Ok(Self {
            bytes,
            digest_size,
            slots,
        })
    }

    pub fn slots(&self) -> u64 {
        self.slots
    }

    pub fn digest_size(&self) -> usize {
        self.digest_size
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn slot(&self, slot: u64) -> &[u8] {
        &self.bytes[self.byte_range(slot..slot + 1)]
    }

    pub fn slot_mut(&mut self, slot: u64) -> &mut [u8] {
        let range = self.byte_range(slot..slot + 1);
        &mut self.bytes[range]
    }

    /// Bytes backing `slots`, the destination of a block copy-back.
    pub fn slots_mut(&mut self, slots: Range<u64>) -> &mut [u8] {
        let range = self.byte_range(slots);
        &mut self.bytes[range]
    }

    /// View of a fully written block for the sink.
    pub fn completed(&self, index: u64, slots: Range<u64>) -> CompletedBlock<'_> {
        let first_slot = slots.start;
        CompletedBlock {
            index,
            first_slot,
            digest_size: self.digest_size,
            digests: &self.bytes[self.byte_range(slots)],
        }
    }

    fn byte_range(&self, slots: Range<u64>) -> Range<usize> {
        assert!(
            slots.start <= slots.end && slots.end <= self.slots,
            "slots {:?} outside buffer of {} slots",
            slots,
            self.slots
        );
        // In bounds of an allocated Vec, so the casts cannot truncate.
        slots.start as usize * self.digest_size..slots.end as usize * self.digest_size
    }
}
