use anyhow::Result;
use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::prelude::*;
use esp_idf_svc::{eventloop::EspSystemEventLoop, nvs::EspDefaultNvsPartition};
use esp_idf_sys as _; // Binstart
use std::sync::Arc;

use log::info;

// Generate ESP-IDF app descriptor
#[allow(unexpected_cfgs)]
mod app_desc {
    esp_idf_sys::esp_app_desc!();
}

mod config;
mod logging;
mod network;
mod ota;
mod storage;
mod system;
mod version;

use crate::network::web_server::{OtaWebServer, HTTP_PORT};
use crate::network::NetworkManager;

fn main() -> Result<()> {
    // Initialize ESP-IDF
    esp_idf_svc::sys::link_patches();

    logging::init_logger().map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;

    info!("ESP32-S3 OTA {}", version::version_info());
    info!("Boot reason: {}", system::reset::get_reset_reason());
    if system::reset::was_software_reset() {
        info!("Software reset, possibly the restart after a committed update");
    }

    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    let config = config::load_or_default(&nvs)?;
    if !logging::set_max_level_from_str(&config.log_level) {
        log::warn!("Unknown log level '{}', keeping default", config.log_level);
    }
    info!("Configuration loaded");

    // Mount before anything queries region usage. A failure leaves the rest of
    // the firmware running; the update endpoint then answers 503.
    let service = Arc::new(ota::create_service(config.ota.clone())?);
    if let Err(e) = service.initialize() {
        log::error!("OTA service unavailable: {}", e);
    }

    let mut network_manager =
        NetworkManager::new(peripherals.modem, sys_loop, nvs.clone(), &config, HTTP_PORT)?;

    let _web_server = match network_manager.connect() {
        Ok(()) => match OtaWebServer::new(service.clone()) {
            Ok(server) => {
                info!(
                    "Update endpoint: http://{}{}",
                    network_manager.get_ip().unwrap_or_default(),
                    config.ota.post_path
                );
                Some(server)
            }
            Err(e) => {
                log::error!("Failed to start web server: {:?}", e);
                None
            }
        },
        Err(e) => {
            log::warn!("WiFi connection failed: {:?}", e);
            log::warn!("Continuing without network connectivity");
            None
        }
    };

    let status = service.run();
    info!("OTA service status: {:?}", status);

    loop {
        FreeRtos::delay_ms(30_000);
        log::debug!(
            "Free heap: {} bytes, network: {}, OTA: {:?}",
            unsafe { esp_idf_sys::esp_get_free_heap_size() },
            if network_manager.is_connected() { "up" } else { "down" },
            service.status()
        );
    }
}
