//! Block-granular consumers of computed digests.

use crate::utils::HashHex;
use anyhow::Result;
use std::io::Write;
use std::ops::Range;

/// A block whose digests are all written and visible in the output buffer.
#[derive(Debug, Clone, Copy)]
pub struct CompletedBlock<'a> {
    pub index: u64,
    pub first_slot: u64,
    pub digest_size: usize,
    pub digests: &'a [u8],
}

impl<'a> CompletedBlock<'a> {
    pub fn len(&self) -> usize {
        self.digests.len() / self.digest_size
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    pub fn slots(&self) -> Range<u64> {
        self.first_slot..self.first_slot + self.len() as u64
    }

    /// Digests in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &'a [u8]> + 'a {
        self.digests.chunks_exact(self.digest_size)
    }
}

/// Invoked once per completed block, after the block's barrier.
pub trait Sink {
    fn consume(&mut self, block: CompletedBlock<'_>) -> Result<()>;
}

impl<F> Sink for F
where
    F: FnMut(CompletedBlock<'_>) -> Result<()>,
{
    fn consume(&mut self, block: CompletedBlock<'_>) -> Result<()> {
        self(block)
    }
}

/// Drops every block; used when digests are not printed.
pub struct Discard;

impl Sink for Discard {
    fn consume(&mut self, _block: CompletedBlock<'_>) -> Result<()> {
        Ok(())
    }
}

/// Writes `- <hex>` per digest, one line each.
pub struct HexLines<W: Write> {
    out: W,
}

impl<W: Write> HexLines<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Sink for HexLines<W> {
    fn consume(&mut self, block: CompletedBlock<'_>) -> Result<()> {
        for digest in block.iter() {
            writeln!(self.out, "- {}", HashHex::new(digest))?;
        }
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_lines() -> Result<()> {
        let digests = [0x00, 0x1a, 0xff, 0x10];
        let block = CompletedBlock {
            index: 3,
            first_slot: 6,
            digest_size: 2,
            digests: &digests,
        };
        assert_eq!(block.slots(), 6..8);

        let mut sink = HexLines::new(Vec::new());
        sink.consume(block)?;
        let out = String::from_utf8(sink.into_inner())?;
        assert_eq!(out, "- 001a\n- ff10\n");
        Ok(())
    }

    #[test]
    fn test_closure_sink() -> Result<()> {
        let mut seen = Vec::new();
        let mut sink = |block: CompletedBlock<'_>| -> Result<()> {
            seen.push(block.slots());
            Ok(())
        };
        let digests = [0u8; 8];
        sink.consume(CompletedBlock {
            index: 0,
            first_slot: 0,
            digest_size: 4,
            digests: &digests,
        })?;
        assert_eq!(seen, vec![0..2]);
        Ok(())
    }
}
