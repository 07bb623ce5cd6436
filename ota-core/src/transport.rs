/// Network side of an update request and the bounded chunked receive loop
use std::time::Duration;

use thiserror::Error;

use crate::config::OtaConfig;
use crate::error::NetworkError;

/// Failure modes of a single receive or send call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No data within the per-call timeout; retryable
    #[error("receive timed out")]
    Timeout,
    /// Peer closed the connection
    #[error("connection closed by peer")]
    Closed,
    #[error("{0}")]
    Failed(String),
}

/// The inbound request as seen by the update receiver.
///
/// The firmware backs this with an ESP-IDF HTTP server connection.
pub trait UpdateTransport {
    /// Declared body length
    fn content_length(&self) -> usize;

    /// Read up to `buf.len()` bytes, waiting at most `timeout`.
    /// `Ok(0)` means the body ended.
    fn receive_chunk(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError>;

    /// Send a plain-text response with the given status
    fn send_response(&mut self, status: u16, body: &str) -> Result<(), TransportError>;
}

/// Timeout and retry budget for receives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceivePolicy {
    pub timeout: Duration,
    /// Consecutive timeouts tolerated; one more fails the receive
    pub max_consecutive_timeouts: u32,
}

impl From<&OtaConfig> for ReceivePolicy {
    fn from(config: &OtaConfig) -> Self {
        Self {
            timeout: config.receive_timeout(),
            max_consecutive_timeouts: config.max_consecutive_timeouts,
        }
    }
}

/// Fill `buffer` completely from `source`.
///
/// Timeouts are retried until more than `max_consecutive_timeouts` happen in
/// a row; any data resets the count. Other failures end the receive at once.
pub fn receive_exactly<T: UpdateTransport + ?Sized>(
    source: &mut T,
    buffer: &mut [u8],
    policy: &ReceivePolicy,
) -> Result<(), NetworkError> {
    let length = buffer.len();
    let mut received = 0;
    let mut timeouts = 0u32;

    while received < length {
        match source.receive_chunk(&mut buffer[received..], policy.timeout) {
            Ok(0) | Err(TransportError::Closed) => {
                return Err(NetworkError::ConnectionClosed {
                    received,
                    expected: length,
                });
            }
            Ok(n) => {
                received += n;
                timeouts = 0;
            }
            Err(TransportError::Timeout) => {
                timeouts += 1;
                if timeouts > policy.max_consecutive_timeouts {
                    log::error!("Receive timed out {} times in a row, giving up", timeouts);
                    return Err(NetworkError::TimeoutBudgetExhausted { attempts: timeouts });
                }
                log::warn!(
                    "Receive timeout ({}/{}), retrying",
                    timeouts,
                    policy.max_consecutive_timeouts
                );
            }
            Err(TransportError::Failed(e)) => {
                return Err(NetworkError::Transport(e));
            }
        }
    }

    Ok(())
}
