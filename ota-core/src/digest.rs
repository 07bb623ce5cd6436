/// SHA256 accumulation over streamed chunks and over stored regions
use core::fmt;

use sha2::{Digest as _, Sha256};

use crate::error::IoError;
use crate::partition::RegionStorage;

pub const DIGEST_LEN: usize = 32;

/// A SHA256 value as carried in the update header
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Digest(pub [u8; DIGEST_LEN]);

impl Digest {
    pub const ZERO: Digest = Digest([0u8; DIGEST_LEN]);

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Lowercase hex, 64 characters
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// One-shot digest of an in-memory buffer
    pub fn of(data: &[u8]) -> Self {
        let mut engine = DigestEngine::new();
        engine.update(data);
        engine.finalize()
    }
}

impl From<[u8; DIGEST_LEN]> for Digest {
    fn from(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

/// Streaming hash accumulator
#[derive(Clone, Default)]
pub struct DigestEngine {
    hasher: Sha256,
    consumed: u64,
}

impl DigestEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.consumed += data.len() as u64;
    }

    /// Bytes fed so far
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    pub fn finalize(self) -> Digest {
        Digest(self.hasher.finalize().into())
    }
}

/// Recompute the digest of the first `len` bytes of a stored region.
///
/// Reads back through `buffer` so no allocation beyond the caller's scratch
/// space is needed.
pub fn digest_region<S: RegionStorage + ?Sized>(
    storage: &S,
    label: &str,
    len: usize,
    buffer: &mut [u8],
) -> Result<Digest, IoError> {
    let mut engine = DigestEngine::new();
    let mut offset = 0;

    while offset < len {
        let chunk = (len - offset).min(buffer.len());
        storage.read(label, offset, &mut buffer[..chunk])?;
        engine.update(&buffer[..chunk]);
        offset += chunk;
    }

    Ok(engine.finalize())
}
