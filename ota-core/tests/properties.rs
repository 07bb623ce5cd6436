use std::time::Duration;

use proptest::prelude::*;

use ota_core::bundle::Bundle;
use ota_core::config::MIN_RESTART_DELAY_MS;
use ota_core::sim::{MemoryBoot, MemoryStorage, NoRestart, ScriptedTransport};
use ota_core::{OtaConfig, RestartCoordinator, UpdateError, UpdateReceiver, SLOT_B};

fn config() -> OtaConfig {
    OtaConfig {
        buffer_size: 128,
        receive_timeout_ms: 1,
        restart_delay_ms: MIN_RESTART_DELAY_MS,
        ..OtaConfig::default()
    }
}

fn run(bytes: &[u8], content_length: usize, chunk: usize) -> (Result<(), UpdateError>, MemoryStorage, MemoryBoot) {
    let config = config();
    let storage = MemoryStorage::slot_layout(2048, 1024, 1024);
    let boot = MemoryBoot::new("ota_a");
    let restart = RestartCoordinator::new(NoRestart, Duration::ZERO);

    let mut transport = ScriptedTransport::new(content_length).with_body(bytes, chunk);
    let result = UpdateReceiver::new(&config, SLOT_B, &storage, &boot, &restart)
        .unwrap()
        .handle_update_request(&mut transport);
    (result, storage, boot)
}

fn bundle_strategy() -> impl Strategy<Value = Bundle> {
    (
        prop::collection::vec(any::<u8>(), 1..2048),
        prop::collection::vec(any::<u8>(), 1..1024),
        prop::option::of(prop::collection::vec(any::<u8>(), 1..1024)),
    )
        .prop_map(|(app, assets, statics)| Bundle::new("2.0.0", app, assets, statics))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn declared_sizes_must_match_content_length(
        bundle in bundle_strategy(),
        delta in prop_oneof![-64i64..0, 1i64..64],
    ) {
        let bytes = bundle.to_bytes();
        let content_length = (bytes.len() as i64 + delta) as usize;

        let (result, storage, boot) = run(&bytes, content_length, 97);
        let err = result.unwrap_err();
        prop_assert_eq!(err.status_code(), 400);
        prop_assert_eq!(storage.total_erases(), 0);
        prop_assert_eq!(storage.total_bytes_written(), 0);
        prop_assert_eq!(boot.commits(), 0);
    }

    #[test]
    fn well_formed_bundles_commit_in_any_chunking(
        bundle in bundle_strategy(),
        chunk in 1usize..300,
    ) {
        let bytes = bundle.to_bytes();
        let (result, storage, boot) = run(&bytes, bytes.len(), chunk);
        prop_assert!(result.is_ok());
        prop_assert_eq!(boot.next_boot_label(), "ota_b");

        let app = storage.contents("ota_b");
        prop_assert_eq!(&app[..bundle.app.len()], bundle.app.as_slice());
        let assets = storage.contents("ota_b_assets");
        prop_assert_eq!(&assets[..bundle.assets.len()], bundle.assets.as_slice());
        if let Some(statics) = &bundle.static_assets {
            let written = storage.contents("static_assets");
            prop_assert_eq!(&written[..statics.len()], statics.as_slice());
        }
    }

    #[test]
    fn any_corrupted_payload_byte_blocks_commit(
        bundle in bundle_strategy(),
        position in any::<prop::sample::Index>(),
        mask in 1u8..=255,
    ) {
        let mut bytes = bundle.to_bytes();
        let header_size = ota_core::HEADER_SIZE;
        let at = header_size + position.index(bytes.len() - header_size);
        bytes[at] ^= mask;

        let (result, _, boot) = run(&bytes, bytes.len(), 64);
        let is_integrity = matches!(result, Err(UpdateError::Integrity { .. }));
        prop_assert!(is_integrity);
        prop_assert_eq!(boot.commits(), 0);
        prop_assert_eq!(boot.next_boot_label(), "ota_a");
    }
}
