/// Update bundle packing and inspection (host side)
///
/// A bundle is the header followed by the app image, the slot assets image
/// and optionally the static assets image, with nothing in between.
use crate::digest::Digest;
use crate::error::ProtocolError;
use crate::header::{firmware_version, UpdateHeader, HEADER_SIZE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    pub version: String,
    pub app: Vec<u8>,
    pub assets: Vec<u8>,
    pub static_assets: Option<Vec<u8>>,
}

impl Bundle {
    pub fn new(
        version: impl Into<String>,
        app: Vec<u8>,
        assets: Vec<u8>,
        static_assets: Option<Vec<u8>>,
    ) -> Self {
        Self {
            version: version.into(),
            app,
            assets,
            static_assets,
        }
    }

    pub fn header(&self) -> UpdateHeader {
        let (static_size, static_digest) = match &self.static_assets {
            Some(data) => (data.len() as u32, Digest::of(data)),
            None => (0, Digest::ZERO),
        };

        UpdateHeader {
            app_size: self.app.len() as u32,
            app_digest: Digest::of(&self.app),
            assets_size: self.assets.len() as u32,
            assets_digest: Digest::of(&self.assets),
            has_static_assets: self.static_assets.is_some(),
            static_assets_size: static_size,
            static_assets_digest: static_digest,
            firmware_version: firmware_version(&self.version),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let static_len = self.static_assets.as_ref().map_or(0, Vec::len);
        let mut out = Vec::with_capacity(HEADER_SIZE + self.app.len() + self.assets.len() + static_len);
        out.extend_from_slice(&self.header().to_bytes());
        out.extend_from_slice(&self.app);
        out.extend_from_slice(&self.assets);
        if let Some(data) = &self.static_assets {
            out.extend_from_slice(data);
        }
        out
    }
}

/// Digest check of one payload section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionCheck {
    pub name: &'static str,
    pub size: usize,
    pub expected: Digest,
    pub actual: Digest,
}

impl RegionCheck {
    pub fn is_valid(&self) -> bool {
        self.expected == self.actual
    }
}

/// Parse a packed bundle, check its length against the header and digest
/// every section.
pub fn inspect(bytes: &[u8]) -> Result<(UpdateHeader, Vec<RegionCheck>), ProtocolError> {
    let header = UpdateHeader::parse(bytes)?;
    header.check_content_length(bytes.len())?;

    let mut checks = Vec::with_capacity(3);
    let mut offset = HEADER_SIZE;
    let mut section = |name: &'static str, size: u32, expected: Digest| {
        let size = size as usize;
        let data = &bytes[offset..offset + size];
        offset += size;
        checks.push(RegionCheck {
            name,
            size,
            expected,
            actual: Digest::of(data),
        });
    };

    section("app", header.app_size, header.app_digest);
    section("assets", header.assets_size, header.assets_digest);
    if header.has_static_assets {
        section("static_assets", header.static_assets_size, header.static_assets_digest);
    }

    Ok((header, checks))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_layout() {
        let bundle = Bundle::new("2.0.0", vec![1; 10], vec![2; 5], None);
        let bytes = bundle.to_bytes();
        assert_eq!(bytes.len(), HEADER_SIZE + 15);
        assert_eq!(&bytes[HEADER_SIZE..HEADER_SIZE + 10], &[1; 10]);
        assert_eq!(&bytes[HEADER_SIZE + 10..], &[2; 5]);
        assert!(!bundle.header().has_static_assets);
        assert_eq!(bundle.header().static_assets_digest, Digest::ZERO);
    }

    #[test]
    fn test_inspect_valid_bundle() {
        let bundle = Bundle::new("2.0.0", vec![1; 10], vec![2; 5], Some(vec![3; 7]));
        let (header, checks) = inspect(&bundle.to_bytes()).unwrap();
        assert_eq!(header.firmware_version.as_str(), "2.0.0");
        assert_eq!(checks.len(), 3);
        assert!(checks.iter().all(RegionCheck::is_valid));
        assert_eq!(checks[2].name, "static_assets");
        assert_eq!(checks[2].size, 7);
    }

    #[test]
    fn test_inspect_detects_corruption() {
        let bundle = Bundle::new("2.0.0", vec![1; 10], vec![2; 5], None);
        let mut bytes = bundle.to_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;

        let (_, checks) = inspect(&bytes).unwrap();
        assert!(checks[0].is_valid());
        assert!(!checks[1].is_valid());
    }

    #[test]
    fn test_inspect_rejects_trailing_bytes() {
        let mut bytes = Bundle::new("2.0.0", vec![1; 10], vec![2; 5], None).to_bytes();
        bytes.push(0);
        assert!(matches!(inspect(&bytes), Err(ProtocolError::SizeMismatch { .. })));
    }
}
