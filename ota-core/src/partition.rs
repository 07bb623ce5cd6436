/// Partition writer: erase, bounded-chunk write and read-back of raw regions
///
/// `RegionStorage` is the storage engine's primitive surface. The firmware
/// implements it over `esp_partition_*`, tests over `sim::MemoryStorage`.
use std::sync::Arc;

use crate::digest::{digest_region, Digest, DigestEngine};
use crate::error::{ConfigError, IoError, NetworkError, UpdateError};
use crate::transport::{receive_exactly, ReceivePolicy, UpdateTransport};

pub trait RegionStorage {
    /// Size of the region in bytes
    fn capacity(&self, label: &str) -> Result<usize, IoError>;

    /// Erase the whole region
    fn erase(&self, label: &str) -> Result<(), IoError>;

    fn write(&self, label: &str, offset: usize, data: &[u8]) -> Result<(), IoError>;

    fn read(&self, label: &str, offset: usize, buf: &mut [u8]) -> Result<(), IoError>;
}

impl<T: RegionStorage + ?Sized> RegionStorage for &T {
    fn capacity(&self, label: &str) -> Result<usize, IoError> {
        (**self).capacity(label)
    }

    fn erase(&self, label: &str) -> Result<(), IoError> {
        (**self).erase(label)
    }

    fn write(&self, label: &str, offset: usize, data: &[u8]) -> Result<(), IoError> {
        (**self).write(label, offset, data)
    }

    fn read(&self, label: &str, offset: usize, buf: &mut [u8]) -> Result<(), IoError> {
        (**self).read(label, offset, buf)
    }
}

impl<T: RegionStorage + ?Sized> RegionStorage for Arc<T> {
    fn capacity(&self, label: &str) -> Result<usize, IoError> {
        (**self).capacity(label)
    }

    fn erase(&self, label: &str) -> Result<(), IoError> {
        (**self).erase(label)
    }

    fn write(&self, label: &str, offset: usize, data: &[u8]) -> Result<(), IoError> {
        (**self).write(label, offset, data)
    }

    fn read(&self, label: &str, offset: usize, buf: &mut [u8]) -> Result<(), IoError> {
        (**self).read(label, offset, buf)
    }
}

/// How a region is checked after streaming
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verify {
    /// Hash chunks as they arrive; no second pass over flash
    Incremental,
    /// Read the whole region back after writing
    ReadBack,
}

/// Writes one region from the request body
pub struct PartitionWriter<'a, S: RegionStorage + ?Sized> {
    storage: &'a S,
    label: &'a str,
}

impl<'a, S: RegionStorage + ?Sized> PartitionWriter<'a, S> {
    pub fn new(storage: &'a S, label: &'a str) -> Self {
        Self { storage, label }
    }

    /// Erase, stream `total_size` bytes from `source`, then verify against
    /// `expected`.
    ///
    /// A receive or write failure erases the region again before returning.
    /// A digest mismatch does not: the region is fully written and the next
    /// attempt erases it up front anyway.
    pub fn write_region<T: UpdateTransport + ?Sized>(
        &self,
        source: &mut T,
        policy: &ReceivePolicy,
        total_size: usize,
        expected: &Digest,
        verify: Verify,
        buffer: &mut [u8],
    ) -> Result<(), UpdateError> {
        log::info!(
            "Writing region '{}': {} bytes ({:?} verify)",
            self.label,
            total_size,
            verify
        );

        // Nothing could ever be received into an empty buffer
        if buffer.is_empty() && total_size > 0 {
            return Err(ConfigError::ZeroBufferSize.into());
        }

        self.storage.erase(self.label)?;

        let streamed = match self.stream(source, policy, total_size, verify, buffer) {
            Ok(digest) => digest,
            Err(e) => {
                log::error!("Streaming into '{}' failed: {}", self.label, e);
                self.scrub();
                return Err(e);
            }
        };

        let actual = match streamed {
            Some(digest) => digest,
            None => digest_region(self.storage, self.label, total_size, buffer)?,
        };

        if actual != *expected {
            log::error!(
                "SHA256 mismatch on '{}': expected {}, got {}",
                self.label,
                expected,
                actual
            );
            return Err(UpdateError::Integrity {
                region: self.label.to_string(),
                expected: *expected,
                actual,
            });
        }

        log::info!("Region '{}' verified ({})", self.label, actual);
        Ok(())
    }

    fn stream<T: UpdateTransport + ?Sized>(
        &self,
        source: &mut T,
        policy: &ReceivePolicy,
        total_size: usize,
        verify: Verify,
        buffer: &mut [u8],
    ) -> Result<Option<Digest>, UpdateError> {
        let mut engine = match verify {
            Verify::Incremental => Some(DigestEngine::new()),
            Verify::ReadBack => None,
        };
        let mut offset = 0;
        let mut last_progress = 0;

        while offset < total_size {
            let chunk = (total_size - offset).min(buffer.len());
            receive_exactly(source, &mut buffer[..chunk], policy).map_err(|e| match e {
                NetworkError::ConnectionClosed { received, .. } => NetworkError::ConnectionClosed {
                    received: offset + received,
                    expected: total_size,
                },
                other => other,
            })?;

            if let Some(engine) = engine.as_mut() {
                engine.update(&buffer[..chunk]);
            }
            self.storage.write(self.label, offset, &buffer[..chunk])?;
            offset += chunk;

            let progress = offset * 100 / total_size;
            if progress / 10 > last_progress / 10 {
                log::debug!("'{}' progress: {}%", self.label, progress);
                last_progress = progress;
            }
        }

        Ok(engine.map(DigestEngine::finalize))
    }

    /// Best-effort erase after a failed stream; the stream error is what gets reported
    fn scrub(&self) {
        match self.storage.erase(self.label) {
            Ok(()) => log::warn!("Region '{}' erased after failed write", self.label),
            Err(e) => log::error!("Cleanup erase of '{}' failed: {}", self.label, e),
        }
    }
}
