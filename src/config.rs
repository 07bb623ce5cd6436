use anyhow::Result;
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs};
use ota_core::OtaConfig;
use serde::{Deserialize, Serialize};

const CONFIG_NAMESPACE: &str = "ota";
const CONFIG_KEY: &str = "config";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // WiFi settings
    pub wifi_ssid: String,
    pub wifi_password: String,

    // mDNS hostname
    pub hostname: String,

    // Runtime log level ("error" .. "trace")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // Update handler settings
    #[serde(default)]
    pub ota: OtaConfig,
}

impl Default for Config {
    fn default() -> Self {
        // Get WiFi credentials from environment variables set by build.rs
        // These come from wifi_config.h which should NOT be committed to git
        let wifi_ssid = env!("WIFI_SSID");
        let wifi_password = env!("WIFI_PASSWORD");

        log::info!(
            "Config default: SSID='{}', Password={}",
            wifi_ssid,
            if wifi_password.is_empty() { "<empty>" } else { "<set>" }
        );

        Self {
            wifi_ssid: wifi_ssid.to_string(),
            wifi_password: wifi_password.to_string(),
            hostname: "esp32-ota".to_string(),
            log_level: default_log_level(),
            ota: OtaConfig::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn save(&self, nvs: &EspDefaultNvsPartition) -> Result<()> {
        save_to_nvs(nvs, self)?;
        log::info!("Configuration saved to NVS");
        Ok(())
    }
}

pub fn load_or_default(nvs: &EspDefaultNvsPartition) -> Result<Config> {
    match load_from_nvs(nvs) {
        Ok(mut config) => {
            log::info!("Loaded configuration from NVS");

            // If NVS has empty WiFi credentials, use the compiled-in ones
            if config.wifi_ssid.is_empty() || config.wifi_password.is_empty() {
                let default_config = Config::default();
                log::warn!(
                    "NVS WiFi credentials empty, using compiled defaults: SSID='{}'",
                    default_config.wifi_ssid
                );
                config.wifi_ssid = default_config.wifi_ssid;
                config.wifi_password = default_config.wifi_password;

                if let Err(e) = config.save(nvs) {
                    log::warn!("Failed to save updated config with WiFi credentials: {:?}", e);
                }
            }

            // A bad stored OTA section must not take the update endpoint down
            if let Err(e) = config.ota.validate() {
                log::warn!("Stored OTA settings invalid ({}), using defaults", e);
                config.ota = OtaConfig::default();
            }

            Ok(config)
        }
        Err(e) => {
            log::warn!("Failed to load config from NVS: {:?}, using defaults", e);
            let config = Config::default();

            // Try to save default config to NVS for next time
            if let Err(save_err) = config.save(nvs) {
                log::warn!("Failed to save default config to NVS: {:?}", save_err);
            }

            Ok(config)
        }
    }
}

fn load_from_nvs(nvs: &EspDefaultNvsPartition) -> Result<Config> {
    let nvs = EspNvs::new(nvs.clone(), CONFIG_NAMESPACE, true)?;

    let mut buf = vec![0u8; 2048]; // Max config size
    let data = nvs
        .get_blob(CONFIG_KEY, &mut buf)?
        .ok_or_else(|| anyhow::anyhow!("Config not found in NVS"))?;

    let config: Config = serde_json::from_slice(data)?;

    Ok(config)
}

fn save_to_nvs(nvs: &EspDefaultNvsPartition, config: &Config) -> Result<()> {
    let mut nvs = EspNvs::new(nvs.clone(), CONFIG_NAMESPACE, false)?;

    let json = serde_json::to_vec(config)?;
    nvs.set_blob(CONFIG_KEY, &json)?;

    Ok(())
}
