// ESP-IDF backends for the update pipeline's storage capabilities

pub mod boot;
pub mod littlefs;
pub mod partition;

pub use boot::EspBootControl;
pub use littlefs::LittleFsMounter;
pub use partition::EspRegionStorage;

use std::ffi::CString;

use esp_idf_sys::{
    esp_partition_find_first, esp_partition_subtype_t, esp_partition_subtype_t_ESP_PARTITION_SUBTYPE_ANY,
    esp_partition_t, esp_partition_type_t, esp_partition_type_t_ESP_PARTITION_TYPE_ANY,
};

/// Look up a partition by label. The returned pointer refers to the static
/// partition table and stays valid for the lifetime of the program.
pub(crate) fn find_partition(
    label: &str,
    kind: Option<(esp_partition_type_t, esp_partition_subtype_t)>,
) -> Option<&'static esp_partition_t> {
    let label = CString::new(label).ok()?;
    let (kind, subtype) = kind.unwrap_or((
        esp_partition_type_t_ESP_PARTITION_TYPE_ANY,
        esp_partition_subtype_t_ESP_PARTITION_SUBTYPE_ANY,
    ));

    let partition = unsafe { esp_partition_find_first(kind, subtype, label.as_ptr()) };
    unsafe { partition.as_ref() }
}

/// Label of a partition as a Rust string
pub(crate) fn partition_label(partition: &esp_partition_t) -> String {
    let bytes: Vec<u8> = partition
        .label
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}
