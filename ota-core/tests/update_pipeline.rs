//! End-to-end runs of the update receiver against in-memory flash and a
//! scripted network request.

use std::time::Duration;

use ota_core::bundle::Bundle;
use ota_core::config::MIN_RESTART_DELAY_MS;
use ota_core::error::IoOp;
use ota_core::header::HEADER_SIZE;
use ota_core::sim::{MemoryBoot, MemoryStorage, RecordingRestart, ScriptedTransport, Step, ERASED};
use ota_core::slot::STATIC_ASSETS_LABEL;
use ota_core::{
    BootControl, IoError, NetworkError, OtaConfig, ProtocolError, RestartCoordinator, SlotSelection,
    UpdateError, UpdateReceiver,
};

struct Device {
    config: OtaConfig,
    storage: MemoryStorage,
    boot: MemoryBoot,
    restart: RestartCoordinator<RecordingRestart>,
}

impl Device {
    fn new(running: &str) -> Self {
        let config = OtaConfig {
            buffer_size: 256,
            receive_timeout_ms: 1,
            max_consecutive_timeouts: 3,
            restart_delay_ms: MIN_RESTART_DELAY_MS,
            ..OtaConfig::default()
        };
        Self {
            restart: RestartCoordinator::new(RecordingRestart::default(), config.restart_delay()),
            config,
            storage: MemoryStorage::slot_layout(4096, 2048, 2048),
            boot: MemoryBoot::new(running),
        }
    }

    fn update(&self, transport: &mut ScriptedTransport) -> Result<(), UpdateError> {
        let running = self.boot.running_boot_label().unwrap();
        let target = SlotSelection::from_boot_label(&running).unwrap().target;
        UpdateReceiver::new(&self.config, target, &self.storage, &self.boot, &self.restart)
            .unwrap()
            .handle_update_request(transport)
    }

    fn restart_fired(&self) -> bool {
        self.restart.restarter().wait_fired(Duration::from_secs(2))
    }

    fn restart_fired_soon(&self) -> bool {
        self.restart.restarter().wait_fired(Duration::from_millis(50))
    }
}

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

fn transport_for(bytes: &[u8]) -> ScriptedTransport {
    ScriptedTransport::new(bytes.len()).with_body(bytes, 100)
}

#[test]
fn app_and_assets_update_commits_and_restarts() {
    let device = Device::new("ota_a");
    let app = pattern(1000, 1);
    let assets = pattern(500, 2);
    let bundle = Bundle::new("1.2.0", app.clone(), assets.clone(), None).to_bytes();
    assert_eq!(bundle.len(), 1500 + HEADER_SIZE);

    let mut transport = transport_for(&bundle);
    device.update(&mut transport).unwrap();

    assert_eq!(transport.response().unwrap().0, 200);
    assert_eq!(device.storage.bytes_written("ota_b"), 1000);
    assert_eq!(device.storage.bytes_written("ota_b_assets"), 500);
    assert_eq!(&device.storage.contents("ota_b")[..1000], app.as_slice());
    assert_eq!(&device.storage.contents("ota_b_assets")[..500], assets.as_slice());

    // Running slot and shared region untouched
    assert_eq!(device.storage.erase_count("ota_a"), 0);
    assert_eq!(device.storage.erase_count("ota_a_assets"), 0);
    assert_eq!(device.storage.erase_count(STATIC_ASSETS_LABEL), 0);

    assert_eq!(device.boot.next_boot_label(), "ota_b");
    assert!(device.restart_fired());
}

#[test]
fn content_length_off_by_one_is_rejected_before_writing() {
    let device = Device::new("ota_a");
    let bundle = Bundle::new("1.2.0", pattern(1000, 1), pattern(500, 2), None).to_bytes();

    let mut transport = ScriptedTransport::new(bundle.len() + 1).with_body(&bundle, 100);
    let err = device.update(&mut transport).unwrap_err();

    assert!(matches!(err, UpdateError::Protocol(ProtocolError::SizeMismatch { .. })));
    assert_eq!(transport.response().unwrap().0, 400);
    assert_eq!(device.storage.total_erases(), 0);
    assert_eq!(device.storage.total_bytes_written(), 0);
    assert_eq!(device.boot.next_boot_label(), "ota_a");
    assert!(!device.restart_fired_soon());
}

#[test]
fn assets_digest_mismatch_keeps_previous_boot_slot() {
    let device = Device::new("ota_a");
    let mut bundle = Bundle::new("1.2.0", pattern(1000, 1), pattern(500, 2), None).to_bytes();
    // Corrupt the last assets byte after the header was computed
    let last = bundle.len() - 1;
    bundle[last] ^= 0x80;

    let mut transport = transport_for(&bundle);
    let err = device.update(&mut transport).unwrap_err();

    assert!(matches!(err, UpdateError::Integrity { ref region, .. } if region == "ota_b_assets"));
    let (status, body) = transport.response().unwrap();
    assert_eq!(*status, 500);
    assert!(body.contains("SHA256 mismatch"));

    assert_eq!(device.boot.next_boot_label(), "ota_a");
    assert_eq!(device.boot.commits(), 0);
    // Written region is left as is, not erased again
    assert_eq!(device.storage.erase_count("ota_b_assets"), 1);
    assert!(!device.restart_fired_soon());
}

#[test]
fn header_timeouts_over_budget_abort_without_writes() {
    let device = Device::new("ota_b");
    let bundle = Bundle::new("1.2.0", pattern(100, 1), pattern(100, 2), None).to_bytes();

    // Part of the header arrives, then budget + 1 timeouts in a row
    let mut transport = ScriptedTransport::new(bundle.len())
        .then(Step::Data(bundle[..40].to_vec()))
        .then(Step::Timeout)
        .then(Step::Timeout)
        .then(Step::Timeout)
        .then(Step::Timeout)
        .with_body(&bundle[40..], 100);

    let err = device.update(&mut transport).unwrap_err();
    assert_eq!(
        err,
        UpdateError::Network(NetworkError::TimeoutBudgetExhausted { attempts: 4 })
    );
    assert_eq!(transport.response().unwrap().0, 500);
    assert_eq!(device.storage.total_erases(), 0);
    assert_eq!(device.boot.next_boot_label(), "ota_b");
}

#[test]
fn header_timeouts_within_budget_succeed() {
    let device = Device::new("ota_b");
    let bundle = Bundle::new("1.2.0", pattern(100, 1), pattern(100, 2), None).to_bytes();

    let mut transport = ScriptedTransport::new(bundle.len())
        .then(Step::Data(bundle[..40].to_vec()))
        .then(Step::Timeout)
        .then(Step::Timeout)
        .then(Step::Timeout)
        .with_body(&bundle[40..], 100);

    device.update(&mut transport).unwrap();
    assert_eq!(device.boot.next_boot_label(), "ota_a");
}

#[test]
fn connection_lost_mid_app_leaves_app_region_erased() {
    let device = Device::new("ota_a");
    // Pre-existing image in the target slot
    device.storage.preload("ota_b", &pattern(4096, 9));

    let bundle = Bundle::new("1.2.0", pattern(3000, 1), pattern(500, 2), None).to_bytes();
    let cut = HEADER_SIZE + 1200;
    let mut transport = ScriptedTransport::new(bundle.len())
        .with_body(&bundle[..cut], 100)
        .then(Step::Fail("ECONNRESET".into()));

    let err = device.update(&mut transport).unwrap_err();
    assert_eq!(err, UpdateError::Network(NetworkError::Transport("ECONNRESET".into())));
    assert_eq!(transport.response().unwrap().0, 500);

    assert!(device.storage.contents("ota_b").iter().all(|&b| b == ERASED));
    assert_eq!(device.storage.erase_count("ota_b"), 2);
    // Never got to the assets region
    assert_eq!(device.storage.erase_count("ota_b_assets"), 0);
    assert_eq!(device.boot.next_boot_label(), "ota_a");
}

#[test]
fn body_ending_early_in_assets_erases_assets_region() {
    let device = Device::new("ota_a");
    let bundle = Bundle::new("1.2.0", pattern(300, 1), pattern(500, 2), None).to_bytes();
    let cut = bundle.len() - 10;
    let mut transport = ScriptedTransport::new(bundle.len()).with_body(&bundle[..cut], 100);

    let err = device.update(&mut transport).unwrap_err();
    assert_eq!(
        err,
        UpdateError::Network(NetworkError::ConnectionClosed {
            received: 490,
            expected: 500
        })
    );
    assert!(device.storage.contents("ota_b_assets").iter().all(|&b| b == ERASED));
    assert_eq!(device.boot.commits(), 0);
}

#[test]
fn static_assets_are_written_and_verified() {
    let device = Device::new("ota_b");
    let statics = pattern(700, 3);
    let bundle = Bundle::new("1.3.0", pattern(900, 1), pattern(400, 2), Some(statics.clone())).to_bytes();

    let mut transport = transport_for(&bundle);
    device.update(&mut transport).unwrap();

    assert_eq!(&device.storage.contents(STATIC_ASSETS_LABEL)[..700], statics.as_slice());
    assert_eq!(device.storage.bytes_written("ota_a"), 900);
    assert_eq!(device.storage.bytes_written("ota_a_assets"), 400);
    assert_eq!(device.boot.next_boot_label(), "ota_a");
    assert!(device.restart_fired());
}

#[test]
fn static_assets_mismatch_blocks_commit() {
    let device = Device::new("ota_a");
    let mut bundle =
        Bundle::new("1.3.0", pattern(200, 1), pattern(200, 2), Some(pattern(200, 3))).to_bytes();
    let last = bundle.len() - 1;
    bundle[last] ^= 0x01;

    let err = device.update(&mut transport_for(&bundle)).unwrap_err();
    assert!(matches!(err, UpdateError::Integrity { ref region, .. } if region == STATIC_ASSETS_LABEL));
    assert_eq!(device.boot.commits(), 0);
}

#[test]
fn flash_corruption_is_caught_by_read_back() {
    let device = Device::new("ota_a");
    device.storage.flip_on_write("ota_b_assets", 123);
    let bundle = Bundle::new("1.2.0", pattern(100, 1), pattern(500, 2), None).to_bytes();

    let err = device.update(&mut transport_for(&bundle)).unwrap_err();
    assert!(matches!(err, UpdateError::Integrity { ref region, .. } if region == "ota_b_assets"));
    assert_eq!(device.boot.next_boot_label(), "ota_a");
}

#[test]
fn write_failure_erases_region_and_reports_storage_error() {
    let device = Device::new("ota_a");
    device.storage.fail_writes_at("ota_b_assets", 300);
    let bundle = Bundle::new("1.2.0", pattern(100, 1), pattern(500, 2), None).to_bytes();

    let mut transport = transport_for(&bundle);
    let err = device.update(&mut transport).unwrap_err();

    assert!(matches!(err, UpdateError::Io(_)));
    let (status, body) = transport.response().unwrap();
    assert_eq!(*status, 500);
    assert!(body.contains("ESP_ERR_FLASH_OP_FAIL"));
    assert!(device.storage.contents("ota_b_assets").iter().all(|&b| b == ERASED));
}

#[test]
fn commit_failure_is_reported_and_label_kept() {
    let device = Device::new("ota_a");
    device.boot.fail_commits();
    let bundle = Bundle::new("1.2.0", pattern(100, 1), pattern(100, 2), None).to_bytes();

    let mut transport = transport_for(&bundle);
    let err = device.update(&mut transport).unwrap_err();

    assert!(matches!(err, UpdateError::Commit(_)));
    assert_eq!(transport.response().unwrap().0, 500);
    assert_eq!(device.boot.next_boot_label(), "ota_a");
    assert!(!device.restart_fired_soon());
}

#[test]
fn slots_alternate_across_updates() {
    let device = Device::new("ota_a");
    let mut booted = vec![device.boot.running_boot_label().unwrap()];

    for round in 0..5u8 {
        let bundle = Bundle::new(format!("1.0.{round}"), pattern(64, round), pattern(32, round), None)
            .to_bytes();
        device.update(&mut transport_for(&bundle)).unwrap();
        device.boot.reboot();
        booted.push(device.boot.running_boot_label().unwrap());
    }

    assert_eq!(booted, vec!["ota_a", "ota_b", "ota_a", "ota_b", "ota_a", "ota_b"]);
}

#[test]
fn empty_body_after_header_is_truncated_header() {
    let device = Device::new("ota_a");
    let bundle = Bundle::new("1.2.0", pattern(10, 1), pattern(10, 2), None).to_bytes();

    let mut transport = ScriptedTransport::new(bundle.len()).with_body(&bundle[..HEADER_SIZE / 2], 100);
    let err = device.update(&mut transport).unwrap_err();
    assert!(matches!(err, UpdateError::Network(NetworkError::ConnectionClosed { .. })));
    assert_eq!(device.storage.total_erases(), 0);
}

#[test]
fn erase_failure_aborts_before_any_write() {
    let device = Device::new("ota_a");
    device.storage.fail_erases("ota_b");
    let bundle = Bundle::new("1.2.0", pattern(100, 1), pattern(100, 2), None).to_bytes();

    let mut transport = transport_for(&bundle);
    let err = device.update(&mut transport).unwrap_err();

    assert!(matches!(err, UpdateError::Io(IoError { op: IoOp::Erase, ref region, .. }) if region == "ota_b"));
    assert_eq!(transport.response().unwrap().0, 500);
    assert_eq!(device.storage.total_bytes_written(), 0);
    // Only the header was read
    assert_eq!(transport.bytes_delivered(), HEADER_SIZE);
    assert_eq!(device.boot.next_boot_label(), "ota_a");
    assert!(!device.restart_fired_soon());
}

#[test]
fn peer_close_mid_app_is_not_retried() {
    let device = Device::new("ota_a");
    let bundle = Bundle::new("1.2.0", pattern(1000, 1), pattern(100, 2), None).to_bytes();
    let cut = HEADER_SIZE + 600;
    let mut transport = ScriptedTransport::new(bundle.len())
        .with_body(&bundle[..cut], 100)
        .then(Step::Closed)
        .with_body(&bundle[cut..], 100);

    let err = device.update(&mut transport).unwrap_err();
    assert_eq!(
        err,
        UpdateError::Network(NetworkError::ConnectionClosed {
            received: 600,
            expected: 1000
        })
    );
    assert_eq!(transport.response().unwrap().0, 500);
    // The remaining body was never asked for
    assert_eq!(transport.bytes_delivered(), cut);
    assert!(device.storage.contents("ota_b").iter().all(|&b| b == ERASED));
    assert_eq!(device.boot.next_boot_label(), "ota_a");
}
