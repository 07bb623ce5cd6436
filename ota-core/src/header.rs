/// Update bundle header, layout v1
///
/// The header is the first `HEADER_SIZE` bytes of the request body. All
/// integers are little-endian u32, the width of `size_t` on the device.
/// The layout carries no version field of its own; `HEADER_LAYOUT_VERSION`
/// names the layout this codec reads and writes.
use crate::digest::{Digest, DIGEST_LEN};
use crate::error::ProtocolError;

pub const HEADER_LAYOUT_VERSION: u8 = 1;
pub const VERSION_LEN: usize = 20;
pub const HEADER_SIZE: usize = 132;

const APP_SIZE: usize = 0;
const APP_DIGEST: usize = 4;
const ASSETS_SIZE: usize = 36;
const ASSETS_DIGEST: usize = 40;
const HAS_STATIC: usize = 72;
const STATIC_SIZE: usize = 76;
const STATIC_DIGEST: usize = 80;
const FIRMWARE_VERSION: usize = 112;

pub type FirmwareVersion = heapless::String<VERSION_LEN>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateHeader {
    pub app_size: u32,
    pub app_digest: Digest,
    pub assets_size: u32,
    pub assets_digest: Digest,
    pub has_static_assets: bool,
    pub static_assets_size: u32,
    pub static_assets_digest: Digest,
    pub firmware_version: FirmwareVersion,
}

impl UpdateHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < HEADER_SIZE {
            return Err(ProtocolError::Truncated {
                got: bytes.len(),
                expected: HEADER_SIZE,
            });
        }

        let has_static_assets = match bytes[HAS_STATIC] {
            0 => false,
            1 => true,
            _ => return Err(ProtocolError::Malformed("static assets flag is not 0 or 1")),
        };

        Ok(Self {
            app_size: read_u32(bytes, APP_SIZE),
            app_digest: read_digest(bytes, APP_DIGEST),
            assets_size: read_u32(bytes, ASSETS_SIZE),
            assets_digest: read_digest(bytes, ASSETS_DIGEST),
            has_static_assets,
            static_assets_size: read_u32(bytes, STATIC_SIZE),
            static_assets_digest: read_digest(bytes, STATIC_DIGEST),
            firmware_version: read_version(&bytes[FIRMWARE_VERSION..FIRMWARE_VERSION + VERSION_LEN])?,
        })
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[APP_SIZE..APP_SIZE + 4].copy_from_slice(&self.app_size.to_le_bytes());
        out[APP_DIGEST..APP_DIGEST + DIGEST_LEN].copy_from_slice(self.app_digest.as_bytes());
        out[ASSETS_SIZE..ASSETS_SIZE + 4].copy_from_slice(&self.assets_size.to_le_bytes());
        out[ASSETS_DIGEST..ASSETS_DIGEST + DIGEST_LEN].copy_from_slice(self.assets_digest.as_bytes());
        out[HAS_STATIC] = self.has_static_assets as u8;
        out[STATIC_SIZE..STATIC_SIZE + 4].copy_from_slice(&self.static_assets_size.to_le_bytes());
        out[STATIC_DIGEST..STATIC_DIGEST + DIGEST_LEN]
            .copy_from_slice(self.static_assets_digest.as_bytes());
        let version = self.firmware_version.as_bytes();
        out[FIRMWARE_VERSION..FIRMWARE_VERSION + version.len()].copy_from_slice(version);
        out
    }

    /// Static assets size as counted by the size invariant
    pub fn effective_static_size(&self) -> u32 {
        if self.has_static_assets {
            self.static_assets_size
        } else {
            0
        }
    }

    /// Payload bytes following the header
    pub fn payload_len(&self) -> u64 {
        self.app_size as u64 + self.assets_size as u64 + self.effective_static_size() as u64
    }

    /// Total body length the request must declare
    pub fn expected_content_length(&self) -> u64 {
        HEADER_SIZE as u64 + self.payload_len()
    }

    pub fn check_content_length(&self, content_length: usize) -> Result<(), ProtocolError> {
        let declared = self.expected_content_length();
        if declared != content_length as u64 {
            return Err(ProtocolError::SizeMismatch {
                declared,
                content_length,
            });
        }
        Ok(())
    }
}

/// Build a fixed-width version field value, truncating to `VERSION_LEN` bytes
/// on a character boundary.
pub fn firmware_version(version: &str) -> FirmwareVersion {
    let mut out = FirmwareVersion::new();
    for c in version.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(raw)
}

fn read_digest(bytes: &[u8], offset: usize) -> Digest {
    let mut raw = [0u8; DIGEST_LEN];
    raw.copy_from_slice(&bytes[offset..offset + DIGEST_LEN]);
    Digest(raw)
}

fn read_version(field: &[u8]) -> Result<FirmwareVersion, ProtocolError> {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    let text = core::str::from_utf8(&field[..end])
        .map_err(|_| ProtocolError::Malformed("firmware version is not UTF-8"))?;
    // Field width equals capacity, so this cannot overflow
    let mut version = FirmwareVersion::new();
    version
        .push_str(text)
        .map_err(|_| ProtocolError::Malformed("firmware version too long"))?;
    Ok(version)
}
