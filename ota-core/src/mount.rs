/// Mount manager: mounts the filesystem regions once per boot and derives the
/// active slot from the persisted boot label.
use serde::Serialize;
use std::sync::{Arc, Mutex};

use crate::commit::BootControl;
use crate::error::{IoError, IoOp, MountError};
use crate::slot::{SlotSelection, SLOT_ASSETS_MOUNT_POINT, STATIC_ASSETS_LABEL, STATIC_ASSETS_MOUNT_POINT};

/// Filesystem layer over the raw regions
pub trait RegionMounter {
    fn mount(&self, label: &str, mount_point: &str) -> Result<(), MountError>;

    fn usage(&self, label: &str) -> Result<RegionUsage, IoError>;
}

impl<T: RegionMounter + ?Sized> RegionMounter for &T {
    fn mount(&self, label: &str, mount_point: &str) -> Result<(), MountError> {
        (**self).mount(label, mount_point)
    }

    fn usage(&self, label: &str) -> Result<RegionUsage, IoError> {
        (**self).usage(label)
    }
}

impl<T: RegionMounter + ?Sized> RegionMounter for Arc<T> {
    fn mount(&self, label: &str, mount_point: &str) -> Result<(), MountError> {
        (**self).mount(label, mount_point)
    }

    fn usage(&self, label: &str) -> Result<RegionUsage, IoError> {
        (**self).usage(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegionUsage {
    pub total_bytes: usize,
    pub used_bytes: usize,
}

impl RegionUsage {
    pub fn free_bytes(&self) -> usize {
        self.total_bytes.saturating_sub(self.used_bytes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MountState {
    pub mounted: bool,
    pub active_boot_label: &'static str,
    pub active_assets_label: &'static str,
}

impl MountState {
    pub fn selection(&self) -> Result<SlotSelection, MountError> {
        SlotSelection::from_boot_label(self.active_boot_label)
    }
}

pub struct MountManager<M, B> {
    mounter: M,
    boot: B,
    // Held across the whole initialization so mounting happens at most once
    state: Mutex<Option<MountState>>,
}

impl<M: RegionMounter, B: BootControl> MountManager<M, B> {
    pub fn new(mounter: M, boot: B) -> Self {
        Self {
            mounter,
            boot,
            state: Mutex::new(None),
        }
    }

    /// Mount the active slot's assets region and the static assets region.
    ///
    /// Repeated calls in the same boot only re-derive the active slot.
    pub fn initialize(&self) -> Result<MountState, MountError> {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(state) = *guard {
            log::info!("Partitions are already mounted");
            state.selection()?;
            return Ok(state);
        }

        let label = self.boot.running_boot_label().map_err(MountError::BootLabel)?;
        let selection = SlotSelection::from_boot_label(&label).map_err(|e| {
            log::error!("Unknown partition label: {}", label);
            e
        })?;
        log::info!(
            "Currently running from '{}', updates target '{}'",
            selection.current.boot_label,
            selection.target.boot_label
        );

        self.mounter
            .mount(selection.current.assets_region, SLOT_ASSETS_MOUNT_POINT)?;
        self.mounter
            .mount(STATIC_ASSETS_LABEL, STATIC_ASSETS_MOUNT_POINT)?;

        let state = MountState {
            mounted: true,
            active_boot_label: selection.current.boot_label,
            active_assets_label: selection.current.assets_region,
        };
        *guard = Some(state);
        Ok(state)
    }

    pub fn state(&self) -> Option<MountState> {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn boot_control(&self) -> &B {
        &self.boot
    }

    pub fn is_mounted(&self) -> bool {
        self.state().is_some()
    }

    pub fn usage(&self, label: &str) -> Result<RegionUsage, IoError> {
        if !self.is_mounted() {
            return Err(IoError::new(IoOp::Info, label, "partitions not mounted"));
        }
        self.mounter.usage(label)
    }

    /// Usage of the active slot's assets region
    pub fn ota_assets_usage(&self) -> Result<RegionUsage, IoError> {
        match self.state() {
            Some(state) => self.mounter.usage(state.active_assets_label),
            None => Err(IoError::new(IoOp::Info, "ota assets", "partitions not mounted")),
        }
    }

    pub fn static_assets_usage(&self) -> Result<RegionUsage, IoError> {
        self.usage(STATIC_ASSETS_LABEL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{MemoryBoot, MemoryMounter};

    #[test]
    fn test_mounts_active_slot_and_static_assets() {
        let mounter = MemoryMounter::new();
        let boot = MemoryBoot::new("ota_b");
        let manager = MountManager::new(&mounter, &boot);

        let state = manager.initialize().unwrap();
        assert!(state.mounted);
        assert_eq!(state.active_boot_label, "ota_b");
        assert_eq!(state.active_assets_label, "ota_b_assets");
        assert_eq!(
            mounter.mounts(),
            vec![
                ("ota_b_assets".to_string(), "/main".to_string()),
                ("static_assets".to_string(), "/static_assets".to_string()),
            ]
        );
    }

    #[test]
    fn test_second_initialize_does_not_remount() {
        let mounter = MemoryMounter::new();
        let boot = MemoryBoot::new("ota_a");
        let manager = MountManager::new(&mounter, &boot);

        let first = manager.initialize().unwrap();
        let second = manager.initialize().unwrap();
        assert_eq!(first, second);
        assert_eq!(mounter.mounts().len(), 2);
        assert_eq!(boot.label_reads(), 1);
    }

    #[test]
    fn test_unknown_label_mounts_nothing() {
        let mounter = MemoryMounter::new();
        let boot = MemoryBoot::new("factory");
        let manager = MountManager::new(&mounter, &boot);

        assert_eq!(
            manager.initialize(),
            Err(MountError::UnknownBootLabel("factory".into()))
        );
        assert!(mounter.mounts().is_empty());
        assert!(!manager.is_mounted());
    }

    #[test]
    fn test_failed_mount_is_not_marked_mounted() {
        let mounter = MemoryMounter::new();
        mounter.fail_mount("static_assets");
        let boot = MemoryBoot::new("ota_a");
        let manager = MountManager::new(&mounter, &boot);

        assert!(matches!(manager.initialize(), Err(MountError::Mount { .. })));
        assert!(!manager.is_mounted());
        assert!(manager.static_assets_usage().is_err());
    }

    #[test]
    fn test_usage_queries_after_mount() {
        let mounter = MemoryMounter::new();
        mounter.set_usage("ota_a_assets", RegionUsage { total_bytes: 1000, used_bytes: 250 });
        mounter.set_usage("static_assets", RegionUsage { total_bytes: 4000, used_bytes: 4000 });
        let boot = MemoryBoot::new("ota_a");
        let manager = MountManager::new(&mounter, &boot);

        assert!(manager.ota_assets_usage().is_err());
        manager.initialize().unwrap();

        let ota = manager.ota_assets_usage().unwrap();
        assert_eq!(ota.free_bytes(), 750);
        assert_eq!(manager.static_assets_usage().unwrap().free_bytes(), 0);
    }
}
