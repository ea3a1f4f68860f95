//! Background scan behavior and bus exclusivity.

use std::collections::HashMap;
use std::time::Duration;

use keyrack_coordinator::{EventEmitter, KeyReleaseCoordinator, TickOutcome};
use keyrack_core::{
    CabinetConfig, CorrelationToken, MockConfig, OutboundEvent, SlotNumber, Uid,
};
use keyrack_hardware::HardwareContext;
use keyrack_hardware::mock::MockCabinet;
use proptest::prelude::*;
use tokio::sync::mpsc::Receiver;
use tokio::time::Instant;

fn slot(n: u8) -> SlotNumber {
    SlotNumber::new(n).unwrap()
}

fn setup(mock: MockConfig) -> (KeyReleaseCoordinator, Receiver<OutboundEvent>, MockCabinet) {
    let config = CabinetConfig {
        mock,
        ..CabinetConfig::default()
    };
    let (context, cabinet) = HardwareContext::mock(&config);
    context.initialize().unwrap();
    let (emitter, rx) = EventEmitter::channel(256);
    let coordinator = KeyReleaseCoordinator::new(context, config.timing, emitter).unwrap();
    (coordinator, rx, cabinet)
}

#[tokio::test(start_paused = true)]
async fn presented_badge_is_reported() {
    let (coordinator, mut rx, cabinet) = setup(MockConfig::quiet());
    cabinet.present_badge(slot(2), [0xDE, 0xAD, 0xBE, 0xEF]);
    let mut scanner = coordinator.background_scanner();

    assert_eq!(scanner.tick(), TickOutcome::Scanned(slot(1), None));
    let uid = Uid::parse("DEADBEEF").unwrap();
    assert_eq!(
        scanner.tick(),
        TickOutcome::Scanned(slot(2), Some(uid.clone()))
    );

    match rx.recv().await.unwrap() {
        OutboundEvent::TagObserved {
            slot_number,
            uid: observed,
            ..
        } => {
            assert_eq!(slot_number, slot(2));
            assert_eq!(observed, uid);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(coordinator.table().last_seen_tag(slot(2)), Some(uid));
}

#[tokio::test(start_paused = true)]
async fn pending_slot_is_skipped_without_bus_traffic() {
    let (coordinator, _rx, cabinet) = setup(MockConfig::quiet());
    cabinet.hold_key(slot(1));
    coordinator
        .unlock_slot(slot(1), CorrelationToken::new("t").unwrap())
        .unwrap();

    let mut scanner = coordinator.background_scanner();
    let before = cabinet.selections(slot(1));
    assert_eq!(scanner.tick(), TickOutcome::Skipped(slot(1)));
    assert_eq!(cabinet.selections(slot(1)), before);
    assert_eq!(scanner.tick(), TickOutcome::Scanned(slot(2), None));
}

#[tokio::test(start_paused = true)]
async fn background_loop_visits_slots_in_turn() {
    let (coordinator, mut rx, cabinet) = setup(MockConfig::quiet());
    cabinet.present_badge(slot(5), [0x01, 0x02, 0x03, 0x04]);
    let began = Instant::now();
    coordinator.spawn_background();

    let event = rx.recv().await.unwrap();
    assert_eq!(event.name(), "nfc:tag");
    assert_eq!(event.slot(), Some(slot(5)));
    // First tick is immediate; slot 5 is the fifth tick at 200 ms spacing.
    assert_eq!(began.elapsed(), Duration::from_millis(800));

    coordinator.shutdown().await;
    assert!(cabinet.selected().is_empty());
}

#[derive(Debug, Clone)]
enum Op {
    Unlock(u8),
    Tick,
    Sleep(u64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        1 => (1u8..=10).prop_map(Op::Unlock),
        3 => Just(Op::Tick),
        1 => (0u64..3000).prop_map(Op::Sleep),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn background_and_verification_never_share_the_bus(
        ops in prop::collection::vec(op(), 1..60),
        seed in any::<u64>(),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .unwrap();

        runtime.block_on(async move {
            let (coordinator, mut rx, cabinet) = setup(MockConfig {
                badge_probability: 0.2,
                pull_after_reads: 3,
                seed,
            });
            let mut scanner = coordinator.background_scanner();
            let mut accepted = Vec::new();

            for (i, op) in ops.into_iter().enumerate() {
                match op {
                    Op::Unlock(n) => {
                        let token = CorrelationToken::new(format!("t{i}")).unwrap();
                        if coordinator.unlock_slot(slot(n), token.clone()).is_ok() {
                            accepted.push(token);
                        }
                    }
                    Op::Tick => {
                        let pending = coordinator.table().pending();
                        if let TickOutcome::Scanned(scanned, _) = scanner.tick() {
                            assert!(!pending.contains(&scanned), "scanned pending slot {scanned}");
                        }
                    }
                    Op::Sleep(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
                }
                assert!(cabinet.max_selected() <= 1);
            }

            coordinator.shutdown().await;

            let mut terminal: HashMap<String, usize> = HashMap::new();
            while let Ok(event) = rx.try_recv() {
                match event {
                    OutboundEvent::KeyPulled { correlation_token, .. }
                    | OutboundEvent::BorrowCancelled { correlation_token, .. } => {
                        *terminal.entry(correlation_token.to_string()).or_default() += 1;
                    }
                    _ => {}
                }
            }
            assert_eq!(terminal.len(), accepted.len());
            for token in &accepted {
                assert_eq!(terminal.get(token.as_str()), Some(&1));
            }
            assert!(cabinet.selected().is_empty());
        });
    }
}
