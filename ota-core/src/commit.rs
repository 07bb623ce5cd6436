/// Boot committer: flips the next-boot slot once every region verified
use std::sync::Arc;

use crate::error::{CommitError, IoError};
use crate::slot::Slot;

/// The storage engine's persisted boot record
pub trait BootControl {
    /// Label of the image currently executing
    fn running_boot_label(&self) -> Result<String, IoError>;

    /// Persist `label` as the image to boot next
    fn set_boot_label(&self, label: &str) -> Result<(), CommitError>;
}

impl<T: BootControl + ?Sized> BootControl for &T {
    fn running_boot_label(&self) -> Result<String, IoError> {
        (**self).running_boot_label()
    }

    fn set_boot_label(&self, label: &str) -> Result<(), CommitError> {
        (**self).set_boot_label(label)
    }
}

impl<T: BootControl + ?Sized> BootControl for Arc<T> {
    fn running_boot_label(&self) -> Result<String, IoError> {
        (**self).running_boot_label()
    }

    fn set_boot_label(&self, label: &str) -> Result<(), CommitError> {
        (**self).set_boot_label(label)
    }
}

pub struct BootCommitter<B> {
    boot: B,
}

impl<B: BootControl> BootCommitter<B> {
    pub fn new(boot: B) -> Self {
        Self { boot }
    }

    /// Mark `target` as the next boot image.
    ///
    /// Callers must only get here after every required region verified; no
    /// checks happen at this point. On failure the previous label stays.
    pub fn commit(&self, target: &Slot) -> Result<(), CommitError> {
        log::info!("Setting boot partition to '{}'", target.boot_label);
        self.boot.set_boot_label(target.boot_label).map_err(|e| {
            log::error!("Boot partition commit failed: {}", e);
            e
        })
    }

    pub fn boot_control(&self) -> &B {
        &self.boot
    }
}
