//! OTA Core - Hardware-independent update pipeline for the A/B slot firmware
//!
//! This crate contains the receive/verify/commit logic that can be tested on
//! the host platform without requiring ESP32 hardware. The firmware plugs the
//! ESP-IDF partition, OTA and HTTP primitives in through the traits defined
//! here.

pub mod bundle;
pub mod commit;
pub mod config;
pub mod digest;
pub mod error;
pub mod header;
pub mod mount;
pub mod partition;
pub mod receiver;
pub mod restart;
pub mod service;
pub mod sim;
pub mod slot;
pub mod transport;

pub use commit::{BootCommitter, BootControl};
pub use config::OtaConfig;
pub use digest::{Digest, DigestEngine};
pub use error::{CommitError, ConfigError, IoError, MountError, NetworkError, ProtocolError, UpdateError};
pub use header::{UpdateHeader, HEADER_SIZE};
pub use mount::{MountManager, MountState, RegionMounter, RegionUsage};
pub use partition::{PartitionWriter, RegionStorage};
pub use receiver::{AcceptAll, UpdateReceiver, VersionPolicy};
pub use restart::{Restart, RestartCoordinator};
pub use service::{ComponentStatus, StorageReport, UpdateService};
pub use slot::{Slot, SlotSelection, SLOT_A, SLOT_B};
pub use transport::{receive_exactly, TransportError, UpdateTransport};
