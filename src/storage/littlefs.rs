// LittleFS mounting of the assets regions (joltwallet/littlefs component)

use std::ffi::CString;

use esp_idf_sys::esp;
use esp_idf_sys::littlefs::{esp_littlefs_info, esp_vfs_littlefs_conf_t, esp_vfs_littlefs_register};
use ota_core::error::{IoError, IoOp, MountError};
use ota_core::{RegionMounter, RegionUsage};

#[derive(Debug, Default, Clone, Copy)]
pub struct LittleFsMounter;

impl LittleFsMounter {
    pub fn new() -> Self {
        Self
    }
}

impl RegionMounter for LittleFsMounter {
    fn mount(&self, label: &str, mount_point: &str) -> Result<(), MountError> {
        let mount_error = |detail: String| MountError::Mount {
            label: label.to_string(),
            mount_point: mount_point.to_string(),
            detail,
        };
        let base_path = CString::new(mount_point).map_err(|e| mount_error(e.to_string()))?;
        let partition_label = CString::new(label).map_err(|e| mount_error(e.to_string()))?;

        // Images are built on the host; a mount failure must not reformat them
        let mut conf: esp_vfs_littlefs_conf_t = unsafe { core::mem::zeroed() };
        conf.base_path = base_path.as_ptr();
        conf.partition_label = partition_label.as_ptr();
        conf.set_format_if_mount_failed(0);
        conf.set_read_only(0);
        conf.set_dont_mount(0);
        conf.set_grow_on_mount(1);

        esp!(unsafe { esp_vfs_littlefs_register(&conf) }).map_err(|e| {
            log::error!(
                "Failed to mount LittleFS partition '{}' at {}: {}",
                label,
                mount_point,
                e
            );
            mount_error(e.to_string())
        })?;

        log::info!("Mounted '{}' at {}", label, mount_point);
        Ok(())
    }

    fn usage(&self, label: &str) -> Result<RegionUsage, IoError> {
        let partition_label =
            CString::new(label).map_err(|e| IoError::new(IoOp::Info, label, e.to_string()))?;
        let mut total_bytes = 0usize;
        let mut used_bytes = 0usize;

        esp!(unsafe { esp_littlefs_info(partition_label.as_ptr(), &mut total_bytes, &mut used_bytes) })
            .map_err(|e| IoError::new(IoOp::Info, label, e.to_string()))?;

        Ok(RegionUsage {
            total_bytes,
            used_bytes,
        })
    }
}
