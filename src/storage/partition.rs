// Raw flash regions backed by the ESP-IDF partition API

use core::ffi::c_void;

use esp_idf_sys::{esp, esp_partition_erase_range, esp_partition_read, esp_partition_t, esp_partition_write};
use ota_core::error::{IoError, IoOp};
use ota_core::RegionStorage;

use super::find_partition;

/// Partitions are looked up by label on every call; the table lookup is a
/// short linear scan and avoids holding raw pointers across threads.
#[derive(Debug, Default, Clone, Copy)]
pub struct EspRegionStorage;

impl EspRegionStorage {
    pub fn new() -> Self {
        Self
    }

    fn partition(&self, op: IoOp, label: &str) -> Result<&'static esp_partition_t, IoError> {
        find_partition(label, None).ok_or_else(|| {
            log::error!("Partition '{}' not found", label);
            IoError::new(op, label, "ESP_ERR_NOT_FOUND")
        })
    }
}

impl RegionStorage for EspRegionStorage {
    fn capacity(&self, label: &str) -> Result<usize, IoError> {
        Ok(self.partition(IoOp::Lookup, label)?.size as usize)
    }

    fn erase(&self, label: &str) -> Result<(), IoError> {
        let partition = self.partition(IoOp::Erase, label)?;
        log::debug!("Erasing '{}' ({} bytes)", label, partition.size);

        esp!(unsafe { esp_partition_erase_range(partition, 0, partition.size as usize) })
            .map_err(|e| IoError::new(IoOp::Erase, label, e.to_string()))
    }

    fn write(&self, label: &str, offset: usize, data: &[u8]) -> Result<(), IoError> {
        let partition = self.partition(IoOp::Write, label)?;

        esp!(unsafe {
            esp_partition_write(partition, offset, data.as_ptr() as *const c_void, data.len())
        })
        .map_err(|e| IoError::new(IoOp::Write, label, e.to_string()))
    }

    fn read(&self, label: &str, offset: usize, buf: &mut [u8]) -> Result<(), IoError> {
        let partition = self.partition(IoOp::Read, label)?;

        esp!(unsafe {
            esp_partition_read(partition, offset, buf.as_mut_ptr() as *mut c_void, buf.len())
        })
        .map_err(|e| IoError::new(IoOp::Read, label, e.to_string()))
    }
}
