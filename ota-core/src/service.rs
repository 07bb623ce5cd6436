/// Lifecycle wrapper the firmware's component host drives:
/// initialize → run → stop, with a status query and a mounted flag.
use serde::Serialize;
use std::sync::Mutex;

use crate::commit::BootControl;
use crate::config::OtaConfig;
use crate::error::{ConfigError, MountError};
use crate::mount::{MountManager, RegionMounter, RegionUsage};
use crate::partition::RegionStorage;
use crate::receiver::UpdateReceiver;
use crate::restart::{Restart, RestartCoordinator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Uninitialized,
    Initialized,
    Running,
    Stopped,
    Error,
}

/// Snapshot served to the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct StorageReport {
    pub status: ComponentStatus,
    pub active_slot: Option<&'static str>,
    pub target_slot: Option<&'static str>,
    pub ota_assets: Option<RegionUsage>,
    pub static_assets: Option<RegionUsage>,
}

impl StorageReport {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

pub struct UpdateService<S, B, M, R> {
    config: OtaConfig,
    storage: S,
    mount: MountManager<M, B>,
    restart: RestartCoordinator<R>,
    status: Mutex<ComponentStatus>,
}

impl<S, B, M, R> UpdateService<S, B, M, R>
where
    S: RegionStorage,
    B: BootControl,
    M: RegionMounter,
    R: Restart,
{
    pub fn new(
        config: OtaConfig,
        storage: S,
        boot: B,
        mounter: M,
        restarter: R,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let restart = RestartCoordinator::new(restarter, config.restart_delay());
        Ok(Self {
            config,
            storage,
            mount: MountManager::new(mounter, boot),
            restart,
            status: Mutex::new(ComponentStatus::Uninitialized),
        })
    }

    pub fn config(&self) -> &OtaConfig {
        &self.config
    }

    pub fn status(&self) -> ComponentStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_status(&self, status: ComponentStatus) -> ComponentStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner()) = status;
        status
    }

    pub fn is_mounted(&self) -> bool {
        self.mount.is_mounted()
    }

    /// Mount partitions (once per boot) and make the update handler available
    pub fn initialize(&self) -> Result<(), MountError> {
        match self.mount.initialize() {
            Ok(state) => {
                log::info!("OTA service initialized, running from '{}'", state.active_boot_label);
                self.set_status(ComponentStatus::Initialized);
                Ok(())
            }
            Err(e) => {
                log::error!("OTA service initialization failed: {}", e);
                self.set_status(ComponentStatus::Error);
                Err(e)
            }
        }
    }

    pub fn run(&self) -> ComponentStatus {
        if !self.mount.is_mounted() {
            log::warn!("OTA service cannot run before a successful initialize");
            return self.status();
        }
        self.set_status(ComponentStatus::Running)
    }

    /// Partitions stay mounted; only the handler goes away
    pub fn stop(&self) -> ComponentStatus {
        self.set_status(ComponentStatus::Stopped)
    }

    /// Receiver for one request, available while initialized or running
    pub fn receiver(&self) -> Option<UpdateReceiver<'_, &S, &B, R>> {
        if !matches!(
            self.status(),
            ComponentStatus::Initialized | ComponentStatus::Running
        ) {
            return None;
        }
        let selection = self.mount.state()?.selection().ok()?;
        UpdateReceiver::new(
            &self.config,
            selection.target,
            &self.storage,
            self.mount.boot_control(),
            &self.restart,
        )
        .ok()
    }

    pub fn storage_report(&self) -> StorageReport {
        let selection = self.mount.state().and_then(|s| s.selection().ok());
        StorageReport {
            status: self.status(),
            active_slot: selection.map(|s| s.current.boot_label),
            target_slot: selection.map(|s| s.target.boot_label),
            ota_assets: self.mount.ota_assets_usage().ok(),
            static_assets: self.mount.static_assets_usage().ok(),
        }
    }
}
