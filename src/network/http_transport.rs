// Update request body served from an ESP-IDF HTTP server connection

use std::time::Duration;

use embedded_svc::http::Headers;
use esp_idf_svc::http::server::{EspHttpConnection, Request};
use esp_idf_svc::io::{EspIOError, Read, Write};
use esp_idf_sys::HTTPD_SOCK_ERR_TIMEOUT;
use ota_core::{TransportError, UpdateTransport};

/// Owns the request until the single response is sent.
///
/// Each read waits up to the server's `session_timeout`, which
/// `create_http_config` derives from the OTA receive timeout.
pub struct HttpTransport<'a, 'r> {
    request: Option<Request<&'a mut EspHttpConnection<'r>>>,
    content_length: usize,
}

impl<'a, 'r> HttpTransport<'a, 'r> {
    pub fn new(request: Request<&'a mut EspHttpConnection<'r>>) -> Self {
        let content_length = request.content_len().unwrap_or(0) as usize;
        Self {
            request: Some(request),
            content_length,
        }
    }

    /// Respond without running the update, e.g. when the service is down
    pub fn reject(mut self, status: u16, body: &str) -> Result<(), TransportError> {
        self.send_response(status, body)
    }
}

fn classify(error: EspIOError) -> TransportError {
    if error.0.code() == HTTPD_SOCK_ERR_TIMEOUT {
        TransportError::Timeout
    } else {
        TransportError::Failed(error.to_string())
    }
}

impl UpdateTransport for HttpTransport<'_, '_> {
    fn content_length(&self) -> usize {
        self.content_length
    }

    fn receive_chunk(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        let request = self.request.as_mut().ok_or(TransportError::Closed)?;
        request.read(buf).map_err(|e| {
            let error = classify(e);
            if error == TransportError::Timeout {
                log::debug!("No data within {} ms", timeout.as_millis());
            }
            error
        })
    }

    fn send_response(&mut self, status: u16, body: &str) -> Result<(), TransportError> {
        let request = self
            .request
            .take()
            .ok_or_else(|| TransportError::Failed("response already sent".to_string()))?;

        let mut response = request
            .into_response(status, None, &[("Content-Type", "text/plain")])
            .map_err(|e| TransportError::Failed(e.to_string()))?;
        response
            .write_all(body.as_bytes())
            .map_err(|e| TransportError::Failed(e.to_string()))
    }
}
