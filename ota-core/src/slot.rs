/// The two redundant firmware slots and the shared static assets region
use serde::Serialize;

use crate::error::MountError;

pub const STATIC_ASSETS_LABEL: &str = "static_assets";
pub const SLOT_ASSETS_MOUNT_POINT: &str = "/main";
pub const STATIC_ASSETS_MOUNT_POINT: &str = "/static_assets";

/// A boot label with its paired regions. The app region shares the boot
/// label, since the bootloader selects app partitions by label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Slot {
    pub boot_label: &'static str,
    pub app_region: &'static str,
    pub assets_region: &'static str,
}

pub const SLOT_A: Slot = Slot {
    boot_label: "ota_a",
    app_region: "ota_a",
    assets_region: "ota_a_assets",
};

pub const SLOT_B: Slot = Slot {
    boot_label: "ota_b",
    app_region: "ota_b",
    assets_region: "ota_b_assets",
};

pub const SLOTS: [Slot; 2] = [SLOT_A, SLOT_B];

impl Slot {
    /// The statically paired alternate
    pub fn other(&self) -> Slot {
        if *self == SLOT_A {
            SLOT_B
        } else {
            SLOT_A
        }
    }

    pub fn by_boot_label(label: &str) -> Option<Slot> {
        SLOTS.into_iter().find(|slot| slot.boot_label == label)
    }
}

/// Result of slot selection: where we run and where updates go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotSelection {
    pub current: Slot,
    pub target: Slot,
}

impl SlotSelection {
    pub fn from_boot_label(label: &str) -> Result<Self, MountError> {
        let current =
            Slot::by_boot_label(label).ok_or_else(|| MountError::UnknownBootLabel(label.to_string()))?;
        Ok(Self {
            current,
            target: current.other(),
        })
    }
}
