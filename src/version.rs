// Centralized version information

// Cargo package version from Cargo.toml
pub const CARGO_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version string the device reports and advertises over mDNS.
/// Must fit the 20-byte version field of an update header.
pub const FIRMWARE_VERSION: &str = CARGO_VERSION;

// Version info string for logging
pub fn version_info() -> String {
    format!(
        "Firmware: {}, IDF: {}",
        FIRMWARE_VERSION,
        idf_version().unwrap_or_else(|| "unknown".to_string())
    )
}

fn idf_version() -> Option<String> {
    let raw = unsafe { esp_idf_sys::esp_get_idf_version() };
    if raw.is_null() {
        return None;
    }
    Some(unsafe { std::ffi::CStr::from_ptr(raw) }.to_string_lossy().into_owned())
}
