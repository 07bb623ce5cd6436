// Wiring of the update pipeline onto the ESP-IDF backends

use ota_core::{ConfigError, OtaConfig, UpdateService};

use crate::storage::{EspBootControl, EspRegionStorage, LittleFsMounter};
use crate::system::EspRestart;

pub type FirmwareUpdateService =
    UpdateService<EspRegionStorage, EspBootControl, LittleFsMounter, EspRestart>;

pub fn create_service(config: OtaConfig) -> Result<FirmwareUpdateService, ConfigError> {
    UpdateService::new(
        config,
        EspRegionStorage::new(),
        EspBootControl::new(),
        LittleFsMounter::new(),
        EspRestart,
    )
}
