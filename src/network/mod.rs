pub mod http_transport;
pub mod web_server;
pub mod wifi;

use anyhow::Result;
use esp_idf_hal::modem::Modem;
use esp_idf_svc::{eventloop::EspSystemEventLoop, mdns::EspMdns, nvs::EspDefaultNvsPartition};

use self::wifi::WifiManager;
use crate::config::Config;

pub struct NetworkManager {
    wifi: WifiManager,
    hostname: String,
    http_port: u16,
    post_path: String,
    _mdns: Option<EspMdns>,
}

impl NetworkManager {
    pub fn new(
        modem: Modem,
        sys_loop: EspSystemEventLoop,
        nvs: EspDefaultNvsPartition,
        config: &Config,
        http_port: u16,
    ) -> Result<Self> {
        let wifi = WifiManager::new(
            modem,
            sys_loop,
            nvs,
            config.wifi_ssid.clone(),
            config.wifi_password.clone(),
        )?;

        Ok(Self {
            wifi,
            hostname: config.hostname.clone(),
            http_port,
            post_path: config.ota.post_path.clone(),
            _mdns: None,
        })
    }

    pub fn connect(&mut self) -> Result<()> {
        self.wifi.connect()?;
        log::info!("WiFi connected, IP: {:?}", self.wifi.get_ip());

        // Start mDNS so the host tool can find the update endpoint
        match self.start_mdns() {
            Ok(_) => log::info!("mDNS service started: {}.local", self.hostname),
            Err(e) => log::warn!("Failed to start mDNS: {:?}", e),
        }

        Ok(())
    }

    fn start_mdns(&mut self) -> Result<()> {
        let mut mdns = EspMdns::take()?;
        mdns.set_hostname(&self.hostname)?;

        mdns.add_service(
            None,
            "_esp32-ota",
            "_tcp",
            self.http_port,
            &[
                ("path", self.post_path.as_str()),
                ("version", crate::version::FIRMWARE_VERSION),
            ],
        )?;

        self._mdns = Some(mdns);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.wifi.get_ip().is_some()
    }

    pub fn get_ip(&self) -> Option<String> {
        self.wifi.get_ip()
    }
}
