/// Update receiver: drives one update request from header to restart.
///
/// Order of operations:
/// 1. Check declared content length covers the header
/// 2. Receive and parse the header
/// 3. Validate version, region capacities and the total size
/// 4. Write + verify app, then slot assets, then static assets if present
/// 5. Commit the target slot, schedule the restart, answer 200
///
/// Any failure answers with the error's status and stops. Nothing is ever
/// written to the currently booted slot.
use crate::commit::{BootCommitter, BootControl};
use crate::config::OtaConfig;
use crate::error::{ConfigError, ProtocolError, UpdateError};
use crate::header::{UpdateHeader, HEADER_SIZE};
use crate::partition::{PartitionWriter, RegionStorage, Verify};
use crate::restart::{Restart, RestartCoordinator};
use crate::slot::{Slot, STATIC_ASSETS_LABEL};
use crate::transport::{receive_exactly, ReceivePolicy, UpdateTransport};

pub const SUCCESS_BODY: &str = "Update successful, restarting";

/// Decides whether an incoming firmware version may be installed
pub trait VersionPolicy {
    fn accept(&self, version: &str) -> bool;
}

/// Accepts any version. Downgrade and compatibility rules are not defined yet.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl VersionPolicy for AcceptAll {
    fn accept(&self, _version: &str) -> bool {
        true
    }
}

pub struct UpdateReceiver<'a, S, B, R, V = AcceptAll> {
    config: &'a OtaConfig,
    target: Slot,
    storage: S,
    committer: BootCommitter<B>,
    restart: &'a RestartCoordinator<R>,
    version_policy: V,
}

impl<'a, S, B, R> UpdateReceiver<'a, S, B, R, AcceptAll>
where
    S: RegionStorage,
    B: BootControl,
    R: Restart,
{
    /// Fails when `config` does not pass `OtaConfig::validate`.
    pub fn new(
        config: &'a OtaConfig,
        target: Slot,
        storage: S,
        boot: B,
        restart: &'a RestartCoordinator<R>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            target,
            storage,
            committer: BootCommitter::new(boot),
            restart,
            version_policy: AcceptAll,
        })
    }
}

impl<'a, S, B, R, V> UpdateReceiver<'a, S, B, R, V>
where
    S: RegionStorage,
    B: BootControl,
    R: Restart,
    V: VersionPolicy,
{
    pub fn with_version_policy<P: VersionPolicy>(self, version_policy: P) -> UpdateReceiver<'a, S, B, R, P> {
        UpdateReceiver {
            config: self.config,
            target: self.target,
            storage: self.storage,
            committer: self.committer,
            restart: self.restart,
            version_policy,
        }
    }

    pub fn target(&self) -> &Slot {
        &self.target
    }

    /// Handle one update request, answering on `transport` either way.
    pub fn handle_update_request<T: UpdateTransport + ?Sized>(
        &self,
        transport: &mut T,
    ) -> Result<(), UpdateError> {
        match self.apply(transport) {
            Ok(header) => {
                log::info!(
                    "OTA update to {} ({}) complete",
                    header.firmware_version,
                    self.target.boot_label
                );
                if let Err(e) = self.restart.schedule() {
                    log::error!("Could not schedule restart ({}); new slot boots on next reset", e);
                }
                if let Err(e) = transport.send_response(200, SUCCESS_BODY) {
                    log::warn!("Failed to send OTA success response: {:?}", e);
                }
                Ok(())
            }
            Err(e) => {
                log::error!("OTA update failed ({}): {}", e.kind(), e);
                let body = format!("OTA update failed: {e}");
                if let Err(send_err) = transport.send_response(e.status_code(), &body) {
                    log::warn!("Failed to send OTA error response: {:?}", send_err);
                }
                Err(e)
            }
        }
    }

    fn apply<T: UpdateTransport + ?Sized>(&self, transport: &mut T) -> Result<UpdateHeader, UpdateError> {
        let policy = ReceivePolicy::from(self.config);
        let content_length = transport.content_length();

        if content_length < HEADER_SIZE {
            return Err(ProtocolError::ContentTooShort {
                content_length,
                header_size: HEADER_SIZE,
            }
            .into());
        }

        let mut header_buf = [0u8; HEADER_SIZE];
        receive_exactly(transport, &mut header_buf, &policy)?;
        let header = UpdateHeader::parse(&header_buf)?;

        log::info!(
            "OTA header: version '{}', app {} bytes, assets {} bytes, static assets {}",
            header.firmware_version,
            header.app_size,
            header.assets_size,
            if header.has_static_assets {
                format!("{} bytes", header.static_assets_size)
            } else {
                "none".to_string()
            }
        );

        self.validate(&header, content_length)?;

        // One scratch buffer for all regions of this request
        let mut buffer = vec![0u8; self.config.buffer_size];

        PartitionWriter::new(&self.storage, self.target.app_region).write_region(
            transport,
            &policy,
            header.app_size as usize,
            &header.app_digest,
            Verify::Incremental,
            &mut buffer,
        )?;

        PartitionWriter::new(&self.storage, self.target.assets_region).write_region(
            transport,
            &policy,
            header.assets_size as usize,
            &header.assets_digest,
            Verify::ReadBack,
            &mut buffer,
        )?;

        if header.has_static_assets {
            PartitionWriter::new(&self.storage, STATIC_ASSETS_LABEL).write_region(
                transport,
                &policy,
                header.static_assets_size as usize,
                &header.static_assets_digest,
                Verify::ReadBack,
                &mut buffer,
            )?;
        }

        self.committer.commit(&self.target)?;
        Ok(header)
    }

    fn validate(&self, header: &UpdateHeader, content_length: usize) -> Result<(), UpdateError> {
        if !self.version_policy.accept(&header.firmware_version) {
            return Err(ProtocolError::VersionRejected(header.firmware_version.to_string()).into());
        }

        self.check_capacity(self.target.app_region, header.app_size)?;
        self.check_capacity(self.target.assets_region, header.assets_size)?;
        if header.has_static_assets {
            self.check_capacity(STATIC_ASSETS_LABEL, header.static_assets_size)?;
        }

        header.check_content_length(content_length)?;
        Ok(())
    }

    fn check_capacity(&self, region: &str, size: u32) -> Result<(), UpdateError> {
        let capacity = self.storage.capacity(region)?;
        if size as usize > capacity {
            return Err(UpdateError::Capacity {
                region: region.to_string(),
                size: size as usize,
                capacity,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::Bundle;
    use crate::sim::{MemoryBoot, MemoryStorage, NoRestart, ScriptedTransport};
    use crate::slot::SLOT_B;
    use std::time::Duration;

    struct RejectAll;

    impl VersionPolicy for RejectAll {
        fn accept(&self, _version: &str) -> bool {
            false
        }
    }

    #[test]
    fn test_version_policy_rejects_before_writing() {
        let config = OtaConfig::default();
        let storage = MemoryStorage::slot_layout(4096, 4096, 4096);
        let boot = MemoryBoot::new("ota_a");
        let restart = RestartCoordinator::new(NoRestart, Duration::ZERO);
        let receiver = UpdateReceiver::new(&config, SLOT_B, &storage, &boot, &restart)
            .unwrap()
            .with_version_policy(RejectAll);

        let bundle = Bundle::new("0.0.1", vec![1; 10], vec![2; 10], None).to_bytes();
        let mut transport = ScriptedTransport::new(bundle.len()).with_body(&bundle, 64);

        let err = receiver.handle_update_request(&mut transport).unwrap_err();
        assert_eq!(err, UpdateError::Protocol(ProtocolError::VersionRejected("0.0.1".into())));
        assert_eq!(transport.response().unwrap().0, 400);
        assert_eq!(storage.total_erases(), 0);
    }

    #[test]
    fn test_invalid_config_is_refused() {
        let config = OtaConfig {
            buffer_size: 0,
            ..OtaConfig::default()
        };
        let storage = MemoryStorage::slot_layout(4096, 4096, 4096);
        let boot = MemoryBoot::new("ota_a");
        let restart = RestartCoordinator::new(NoRestart, Duration::ZERO);

        let result = UpdateReceiver::new(&config, SLOT_B, &storage, &boot, &restart);
        assert_eq!(result.err(), Some(ConfigError::ZeroBufferSize));
    }

    #[test]
    fn test_oversized_app_is_capacity_error() {
        let config = OtaConfig::default();
        let storage = MemoryStorage::slot_layout(64, 4096, 4096);
        let boot = MemoryBoot::new("ota_a");
        let restart = RestartCoordinator::new(NoRestart, Duration::ZERO);
        let receiver = UpdateReceiver::new(&config, SLOT_B, &storage, &boot, &restart).unwrap();

        let bundle = Bundle::new("1.0.0", vec![1; 65], vec![2; 10], None).to_bytes();
        let mut transport = ScriptedTransport::new(bundle.len()).with_body(&bundle, 64);

        let err = receiver.handle_update_request(&mut transport).unwrap_err();
        assert!(matches!(err, UpdateError::Capacity { ref region, size: 65, capacity: 64 } if region == "ota_b"));
        assert_eq!(err.status_code(), 400);
        assert_eq!(storage.total_erases(), 0);
    }

    #[test]
    fn test_oversized_static_assets_is_capacity_error() {
        let config = OtaConfig::default();
        let storage = MemoryStorage::slot_layout(4096, 4096, 16);
        let boot = MemoryBoot::new("ota_a");
        let restart = RestartCoordinator::new(NoRestart, Duration::ZERO);
        let receiver = UpdateReceiver::new(&config, SLOT_B, &storage, &boot, &restart).unwrap();

        let bundle = Bundle::new("1.0.0", vec![1; 8], vec![2; 8], Some(vec![3; 17])).to_bytes();
        let mut transport = ScriptedTransport::new(bundle.len()).with_body(&bundle, 64);

        let err = receiver.handle_update_request(&mut transport).unwrap_err();
        assert!(matches!(err, UpdateError::Capacity { ref region, .. } if region == STATIC_ASSETS_LABEL));
    }

    #[test]
    fn test_content_shorter_than_header() {
        let config = OtaConfig::default();
        let storage = MemoryStorage::slot_layout(4096, 4096, 4096);
        let boot = MemoryBoot::new("ota_a");
        let restart = RestartCoordinator::new(NoRestart, Duration::ZERO);
        let receiver = UpdateReceiver::new(&config, SLOT_B, &storage, &boot, &restart).unwrap();

        let mut transport = ScriptedTransport::new(HEADER_SIZE - 1).with_body(&[0u8; 10], 10);

        let err = receiver.handle_update_request(&mut transport).unwrap_err();
        assert!(matches!(err, UpdateError::Protocol(ProtocolError::ContentTooShort { .. })));
        // Rejected without touching the body
        assert_eq!(transport.receive_calls(), 0);
    }
}
