use blake2::{Blake2b512, Blake2s256};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256};
use std::fmt;

/// Width in bytes of the encoded iteration index fed to the digest.
pub const INPUT_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha224,
    Sha256,
    Sha1,
    Md5,
    Blake2b,
    Blake2s,
}

impl HashAlgorithm {
    pub const ALL: [HashAlgorithm; 6] = [
        HashAlgorithm::Sha224,
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha1,
        HashAlgorithm::Md5,
        HashAlgorithm::Blake2b,
        HashAlgorithm::Blake2s,
    ];

    pub fn name(self) -> &'static str {
        match self {
            HashAlgorithm::Sha224 => "sha224",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Blake2b => "blake2b",
            HashAlgorithm::Blake2s => "blake2s",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|algo| algo.name() == name)
    }

    /// Digest length in bytes; one output slot is exactly this wide.
    pub fn digest_size(self) -> usize {
        match self {
            HashAlgorithm::Sha224 => 28,
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Md5 => 16,
            HashAlgorithm::Blake2b => 64,
            HashAlgorithm::Blake2s => 32,
        }
    }

    /// Number of 32-bit words the GPU kernel writes per digest, or `None`
    /// when there is no kernel for this algorithm.
    pub fn gpu_digest_words(self) -> Option<u32> {
        match self {
            HashAlgorithm::Sha224 => Some(7),
            HashAlgorithm::Sha256 => Some(8),
            _ => None,
        }
    }

    /// Computes the digest of `input` into `out`, which must be exactly
    /// `digest_size()` bytes long.
    pub fn digest_into(self, input: &[u8], out: &mut [u8]) {
        match self {
            HashAlgorithm::Sha224 => digest_with::<Sha224>(input, out),
            HashAlgorithm::Sha256 => digest_with::<Sha256>(input, out),
            HashAlgorithm::Sha1 => digest_with::<Sha1>(input, out),
            HashAlgorithm::Md5 => digest_with::<Md5>(input, out),
            HashAlgorithm::Blake2b => digest_with::<Blake2b512>(input, out),
            HashAlgorithm::Blake2s => digest_with::<Blake2s256>(input, out),
        }
    }

    /// Digest of iteration `index`, the unit of work every runner performs.
    pub fn digest_index(self, index: u64, out: &mut [u8]) {
        self.digest_into(&encode_index(index), out);
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Canonical hash input for an iteration: the index as 8 little-endian bytes.
pub fn encode_index(index: u64) -> [u8; INPUT_SIZE] {
    index.to_le_bytes()
}

fn digest_with<D: Digest>(input: &[u8], out: &mut [u8]) {
    out.copy_from_slice(&D::digest(input));
}
