use anyhow::Result;
use esp_idf_hal::task::thread::ThreadSpawnConfiguration;
use esp_idf_svc::http::server::{Configuration, EspHttpServer};
use esp_idf_svc::http::Method;
use esp_idf_svc::io::Write;
use ota_core::{OtaConfig, UpdateTransport};
use std::sync::{Arc, Mutex, TryLockError};
use std::time::Duration;

use super::http_transport::HttpTransport;
use crate::ota::FirmwareUpdateService;

pub const HTTP_PORT: u16 = 80;

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>ESP32-S3 OTA Update</title>
    <style>
        body { font-family: Arial, sans-serif; max-width: 600px; margin: 50px auto; background: #1a1a1a; color: #fff; }
        .container { background: #2a2a2a; padding: 30px; border-radius: 10px; }
        h1 { color: #4CAF50; text-align: center; }
        pre { background: #333; padding: 15px; border-radius: 5px; }
        button { background: #4CAF50; color: white; padding: 10px 30px; border: none; border-radius: 5px; }
        button:disabled { background: #666; }
    </style>
</head>
<body>
    <div class="container">
        <h1>ESP32-S3 OTA Update</h1>
        <p><strong>Version:</strong> {{VERSION}}</p>
        <pre id="storage">loading...</pre>
        <p>Select update bundle (.ota)</p>
        <input type="file" id="fileInput" />
        <button id="uploadBtn" onclick="upload()">Upload</button>
        <p id="status"></p>
    </div>
    <script>
        fetch('/api/storage').then(r => r.json()).then(j => {
            document.getElementById('storage').textContent = JSON.stringify(j, null, 2);
        });
        async function upload() {
            const file = document.getElementById('fileInput').files[0];
            if (!file) { alert('Please select a bundle'); return; }
            const btn = document.getElementById('uploadBtn');
            const status = document.getElementById('status');
            btn.disabled = true;
            status.textContent = 'Uploading...';
            const response = await fetch('{{POST_PATH}}', { method: 'POST', body: file });
            status.textContent = await response.text();
            if (!response.ok) { btn.disabled = false; }
        }
    </script>
</body>
</html>
"#;

/// `session_timeout` becomes the httpd socket receive and send wait timeout
pub fn create_http_config(ota: &OtaConfig) -> Configuration {
    Configuration {
        http_port: HTTP_PORT,
        session_timeout: Duration::from_secs(ota.receive_timeout_secs()),
        stack_size: 10240, // Header parse + SHA256 state + handler frames
        max_uri_handlers: 8,
        max_open_sockets: 4,
        lru_purge_enable: true,
        ..Default::default()
    }
}

/// The restart thread spawned from the update handler runs at low priority
fn configure_restart_task() {
    let conf = ThreadSpawnConfiguration {
        name: Some(b"ota-restart\0".as_slice()),
        priority: 1,
        ..Default::default()
    };
    if let Err(e) = conf.set() {
        log::warn!("Failed to configure restart task: {:?}", e);
    }
}

fn reset_task_config() {
    if let Err(e) = ThreadSpawnConfiguration::default().set() {
        log::warn!("Failed to reset thread spawn configuration: {:?}", e);
    }
}

pub struct OtaWebServer {
    _server: EspHttpServer<'static>,
}

impl OtaWebServer {
    pub fn new(service: Arc<FirmwareUpdateService>) -> Result<Self> {
        let http_config = create_http_config(service.config());
        log::info!(
            "HTTP receive timeout {} s, up to {} timeouts in a row per update",
            http_config.session_timeout.as_secs(),
            service.config().max_consecutive_timeouts
        );
        let mut server = EspHttpServer::new(&http_config)?;
        let post_path = service.config().post_path.clone();

        let index = INDEX_HTML
            .replace("{{VERSION}}", crate::version::FIRMWARE_VERSION)
            .replace("{{POST_PATH}}", &post_path);
        server.fn_handler("/", Method::Get, move |req| -> Result<()> {
            let mut response =
                req.into_response(200, Some("OK"), &[("Content-Type", "text/html; charset=utf-8")])?;
            response.write_all(index.as_bytes())?;
            Ok(())
        })?;

        let storage_service = service.clone();
        server.fn_handler("/api/storage", Method::Get, move |req| -> Result<()> {
            let json = storage_service.storage_report().to_json();
            let mut response =
                req.into_response(200, Some("OK"), &[("Content-Type", "application/json")])?;
            response.write_all(json.as_bytes())?;
            Ok(())
        })?;

        // One update session at a time
        let in_progress = Arc::new(Mutex::new(()));
        let update_service = service;
        server.fn_handler(&post_path, Method::Post, move |req| -> Result<()> {
            let mut transport = HttpTransport::new(req);

            let _session = match in_progress.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => {
                    log::warn!("Rejecting update request: another update is in progress");
                    transport.reject(503, "Update already in progress")?;
                    return Ok(());
                }
            };

            let Some(receiver) = update_service.receiver() else {
                log::warn!(
                    "Rejecting update request: OTA service is {:?}",
                    update_service.status()
                );
                transport.reject(503, "OTA service not available")?;
                return Ok(());
            };

            log::info!(
                "OTA update started, {} bytes for slot '{}'",
                transport.content_length(),
                receiver.target().boot_label
            );

            configure_restart_task();
            // The outcome has already been logged and sent to the client
            let _ = receiver.handle_update_request(&mut transport);
            reset_task_config();
            Ok(())
        })?;

        log::info!("HTTP server listening on port {}, updates at POST {}", HTTP_PORT, post_path);
        Ok(Self { _server: server })
    }
}
