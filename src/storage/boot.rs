// Boot label persistence through the ESP-IDF OTA data partition

use esp_idf_sys::{
    esp, esp_ota_get_running_partition, esp_ota_set_boot_partition,
    esp_partition_subtype_t_ESP_PARTITION_SUBTYPE_ANY, esp_partition_type_t_ESP_PARTITION_TYPE_APP,
};
use ota_core::error::{CommitError, IoError, IoOp};
use ota_core::BootControl;

use super::{find_partition, partition_label};

#[derive(Debug, Default, Clone, Copy)]
pub struct EspBootControl;

impl EspBootControl {
    pub fn new() -> Self {
        Self
    }
}

impl BootControl for EspBootControl {
    fn running_boot_label(&self) -> Result<String, IoError> {
        let running = unsafe { esp_ota_get_running_partition().as_ref() };
        running
            .map(partition_label)
            .ok_or_else(|| IoError::new(IoOp::Lookup, "running", "ESP_ERR_NOT_FOUND"))
    }

    fn set_boot_label(&self, label: &str) -> Result<(), CommitError> {
        let partition = find_partition(
            label,
            Some((
                esp_partition_type_t_ESP_PARTITION_TYPE_APP,
                esp_partition_subtype_t_ESP_PARTITION_SUBTYPE_ANY,
            )),
        )
        .ok_or_else(|| CommitError {
            label: label.to_string(),
            detail: "ESP_ERR_NOT_FOUND".to_string(),
        })?;

        esp!(unsafe { esp_ota_set_boot_partition(partition) }).map_err(|e| CommitError {
            label: label.to_string(),
            detail: e.to_string(),
        })
    }
}
