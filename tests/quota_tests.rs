// Quota ledger integration tests

use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

use record_sync::quota::{LAST_RESET_KEY, REMAINING_BYTES_KEY};
use record_sync::{
    Clock, JsonFileStore, KeyValueStore, ManualClock, MemoryStore, QuotaError, QuotaLedger,
};

const MB: u64 = 1024 * 1024;
const HOUR: Duration = Duration::from_secs(3600);

fn ledger(budget: u64, clock: Arc<ManualClock>) -> QuotaLedger {
    QuotaLedger::new(budget, HOUR, Arc::new(MemoryStore::new()), clock)
}

#[test]
fn test_window_scenario() {
    let clock = Arc::new(ManualClock::default());
    let quota = ledger(10 * MB, clock.clone());

    quota.reserve(6 * MB).unwrap();
    assert_eq!(quota.remaining_bytes().unwrap(), 4 * MB);

    let err = quota.reserve(5 * MB).unwrap_err();
    assert!(matches!(err, QuotaError::Exceeded { .. }));
    assert_eq!(quota.remaining_bytes().unwrap(), 4 * MB);

    clock.advance(HOUR);
    quota.reserve(5 * MB).unwrap();
    assert_eq!(quota.remaining_bytes().unwrap(), 5 * MB);
    assert_eq!(quota.last_reset().unwrap(), clock.now());
}

#[test]
fn test_no_reset_before_window_ends() {
    let clock = Arc::new(ManualClock::default());
    let quota = ledger(10, clock.clone());

    quota.reserve(10).unwrap();
    clock.advance(HOUR - Duration::from_secs(1));
    assert!(quota.reserve(1).is_err());

    clock.advance(Duration::from_secs(1));
    quota.reserve(1).unwrap();
    assert_eq!(quota.remaining_bytes().unwrap(), 9);
}

#[test]
fn test_zero_reservation_always_succeeds() {
    let quota = ledger(5, Arc::new(ManualClock::default()));
    quota.reserve(5).unwrap();
    quota.reserve(0).unwrap();
    assert_eq!(quota.remaining_bytes().unwrap(), 0);
}

#[test]
fn test_state_survives_restart() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("quota.json");
    let clock = Arc::new(ManualClock::default());

    {
        let store = Arc::new(JsonFileStore::open(&path).unwrap());
        let quota = QuotaLedger::new(10 * MB, HOUR, store, clock.clone());
        quota.reserve(3 * MB).unwrap();
    }

    let store = Arc::new(JsonFileStore::open(&path).unwrap());
    assert_eq!(
        store.get(REMAINING_BYTES_KEY).and_then(|v| v.as_u64()),
        Some(7 * MB)
    );
    assert!(store.get(LAST_RESET_KEY).is_some());

    let quota = QuotaLedger::new(10 * MB, HOUR, store, clock.clone());
    assert_eq!(quota.remaining_bytes().unwrap(), 7 * MB);
    assert!(quota.reserve(8 * MB).is_err());
}

#[test]
fn test_concurrent_reservations_never_overdraw() {
    let quota = Arc::new(ledger(100, Arc::new(ManualClock::default())));

    let handles: Vec<_> = (0..200)
        .map(|_| {
            let quota = quota.clone();
            std::thread::spawn(move || quota.reserve(1).is_ok())
        })
        .collect();

    let granted = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();

    assert_eq!(granted, 100);
    assert_eq!(quota.remaining_bytes().unwrap(), 0);
}

proptest! {
    #[test]
    fn prop_balance_never_increases_within_window(
        budget in 1u64..10_000,
        requests in proptest::collection::vec(0u64..5_000, 1..50),
    ) {
        let quota = ledger(budget, Arc::new(ManualClock::default()));
        let mut previous = quota.remaining_bytes().unwrap();

        for amount in requests {
            let granted = quota.reserve(amount).is_ok();
            let remaining = quota.remaining_bytes().unwrap();

            prop_assert!(remaining <= budget);
            if granted {
                prop_assert_eq!(remaining, previous - amount);
            } else {
                prop_assert!(amount > previous);
                prop_assert_eq!(remaining, previous);
            }
            previous = remaining;
        }
    }

    #[test]
    fn prop_window_expiry_restores_full_budget(
        budget in 1u64..10_000,
        spent in 0u64..10_000,
        extra_secs in 0u64..10_000,
    ) {
        let clock = Arc::new(ManualClock::default());
        let quota = ledger(budget, clock.clone());
        let _ = quota.reserve(spent.min(budget));

        clock.advance(HOUR + Duration::from_secs(extra_secs));
        quota.reserve(0).unwrap();
        prop_assert_eq!(quota.remaining_bytes().unwrap(), budget);
    }
}
