//! Concurrency properties of the ledger.
//!
//! Many tasks race against the in-memory adapters, which serialize each
//! operation behind one lock exactly like a per-row CAS would:
//! - N concurrent reserves against k credits admit exactly k
//! - Concurrent deliveries of one event id apply it once
//! - Interleaved reserve/release never loses or invents credit
//! - Purchases landing during a reserve burst are all counted
//! - A cancellation racing a refund ends in one of the two serial orders

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use entitlement_ledger::adapters::memory::{
    InMemoryEntitlementStore, InMemoryReservationRepository,
};
use entitlement_ledger::application::handlers::{
    HandlePaymentWebhookCommand, HandlePaymentWebhookHandler, HandlePaymentWebhookResult,
};
use entitlement_ledger::application::{AccessGate, AccessGateConfig};
use entitlement_ledger::domain::entitlement::webhook_verifier::compute_signature;
use entitlement_ledger::domain::entitlement::{
    AccessError, DenialReason, EntitlementRecord, ReservationState, SignatureVerifier, Tier,
};
use entitlement_ledger::domain::foundation::UserId;
use entitlement_ledger::ports::{EntitlementStore, ReservationRepository};

const SECRET: &str = "concurrency-secret";

// =============================================================================
// Test Infrastructure
// =============================================================================

struct Ledger {
    store: Arc<InMemoryEntitlementStore>,
    reservations: Arc<InMemoryReservationRepository>,
    gate: Arc<AccessGate>,
}

fn ledger() -> Ledger {
    let store = Arc::new(InMemoryEntitlementStore::new());
    let reservations = Arc::new(InMemoryReservationRepository::new());
    // Generous attempts so that every denial under test is a real balance denial.
    let gate = Arc::new(AccessGate::new(
        store.clone(),
        reservations.clone(),
        AccessGateConfig::default()
            .with_max_cas_attempts(64)
            .with_reserve_timeout(Duration::from_secs(10))
            .with_backoff(Duration::from_micros(50), Duration::from_millis(1)),
    ));
    Ledger {
        store,
        reservations,
        gate,
    }
}

fn user(id: &str) -> UserId {
    UserId::new(id).unwrap()
}

async fn seed(ledger: &Ledger, id: &str, credits: u32, tier: Tier) {
    ledger
        .store
        .seed(
            user(id),
            EntitlementRecord {
                credits,
                tier,
                version: 1,
            },
        )
        .await;
}

fn webhook_handler(ledger: &Ledger) -> Arc<HandlePaymentWebhookHandler> {
    Arc::new(HandlePaymentWebhookHandler::new(
        SignatureVerifier::new(SECRET),
        ledger.store.clone(),
        ledger.store.clone(),
    ))
}

fn signed(event_id: &str, event_name: &str, user_id: &str) -> HandlePaymentWebhookCommand {
    let payload = format!(
        r#"{{"event_id":"{}","event_name":"{}","custom_data":{{"user_id":"{}"}}}}"#,
        event_id, event_name, user_id
    )
    .into_bytes();
    let signature = compute_signature(SECRET, &payload);
    HandlePaymentWebhookCommand {
        payload,
        signature: Some(signature),
    }
}

async fn race_reserves(ledger: &Ledger, id: &str, n: usize) -> Vec<Result<(), AccessError>> {
    let tasks = (0..n).map(|_| {
        let gate = ledger.gate.clone();
        let user_id = user(id);
        tokio::spawn(async move { gate.reserve(&user_id).await.map(|_| ()) })
    });
    join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect()
}

// =============================================================================
// Exhaustion
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_credit_admits_exactly_one_of_many() {
    let ledger = ledger();
    seed(&ledger, "u1", 1, Tier::Free).await;

    let results = race_reserves(&ledger, "u1", 32).await;

    let admitted = results.iter().filter(|r| r.is_ok()).count();
    let denied = results
        .iter()
        .filter(|r| matches!(r, Err(AccessError::Denied(DenialReason::InsufficientCredit))))
        .count();
    assert_eq!(admitted, 1);
    assert_eq!(denied, 31);
    assert_eq!(ledger.store.read(&user("u1")).await.unwrap().credits, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn k_credits_admit_exactly_k() {
    let ledger = ledger();
    seed(&ledger, "u1", 5, Tier::Free).await;

    let results = race_reserves(&ledger, "u1", 20).await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 5);
    assert_eq!(ledger.store.read(&user("u1")).await.unwrap().credits, 0);
    assert_eq!(ledger.reservations.unsettled_count().await, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pro_users_are_never_denied_and_never_debited() {
    let ledger = ledger();
    seed(&ledger, "pro", 0, Tier::Pro).await;

    let results = race_reserves(&ledger, "pro", 16).await;

    assert!(results.iter().all(|r| r.is_ok()));
    let record = ledger.store.read(&user("pro")).await.unwrap();
    assert_eq!(record.credits, 0);
    assert_eq!(record.version, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn users_do_not_interfere() {
    let ledger = ledger();
    seed(&ledger, "a", 3, Tier::Free).await;
    seed(&ledger, "b", 2, Tier::Free).await;

    let (a, b) = tokio::join!(
        race_reserves(&ledger, "a", 10),
        race_reserves(&ledger, "b", 10)
    );

    assert_eq!(a.iter().filter(|r| r.is_ok()).count(), 3);
    assert_eq!(b.iter().filter(|r| r.is_ok()).count(), 2);
}

// =============================================================================
// Release symmetry
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reserve_release_conserves_credit() {
    let ledger = ledger();
    seed(&ledger, "u1", 4, Tier::Free).await;

    let tasks = (0..24).map(|i| {
        let gate = ledger.gate.clone();
        tokio::spawn(async move {
            let user_id = user("u1");
            match gate.reserve(&user_id).await {
                Ok(reservation) if i % 2 == 0 => {
                    gate.release(&reservation.id).await.map(|_| 0)
                }
                Ok(reservation) => gate.commit(&reservation.id).await.map(|_| 1),
                Err(AccessError::Denied(_)) => Ok(0),
                Err(e) => Err(e),
            }
        })
    });
    let committed: u32 = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .sum();

    let remaining = ledger.store.read(&user("u1")).await.unwrap().credits;
    assert_eq!(remaining + committed, 4);
    assert_eq!(ledger.reservations.unsettled_count().await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_releases_refund_once() {
    let ledger = ledger();
    seed(&ledger, "u1", 1, Tier::Free).await;
    let reservation = ledger.gate.reserve(&user("u1")).await.unwrap();

    let tasks = (0..8).map(|_| {
        let gate = ledger.gate.clone();
        let id = reservation.id;
        tokio::spawn(async move { gate.release(&id).await })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, AccessError::ReservationAlreadySettled { .. })));
    assert_eq!(ledger.store.read(&user("u1")).await.unwrap().credits, 1);
}

// =============================================================================
// Idempotent ingress
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_redeliveries_apply_once() {
    let ledger = ledger();
    let handler = webhook_handler(&ledger);
    let payload =
        br#"{"event_id":"evt_dup","event_name":"order_created","custom_data":{"user_id":"u1"}}"#
            .to_vec();
    let signature = compute_signature(SECRET, &payload);

    let tasks = (0..16).map(|_| {
        let handler = handler.clone();
        let cmd = HandlePaymentWebhookCommand {
            payload: payload.clone(),
            signature: Some(signature.clone()),
        };
        tokio::spawn(async move { handler.handle(cmd).await })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    let applied = results
        .iter()
        .filter(|r| matches!(r, HandlePaymentWebhookResult::Applied { .. }))
        .count();
    assert_eq!(applied, 1);
    assert_eq!(ledger.store.read(&user("u1")).await.unwrap().credits, 1);
    assert_eq!(ledger.store.processed_count().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn purchases_during_reserve_burst_are_all_counted() {
    const SEEDED: u32 = 3;
    const PURCHASES: usize = 16;
    const RESERVES: usize = 24;

    let ledger = ledger();
    seed(&ledger, "u1", SEEDED, Tier::Free).await;
    let handler = webhook_handler(&ledger);

    let purchases = (0..PURCHASES).map(|i| {
        let handler = handler.clone();
        let cmd = signed(&format!("evt_order_{}", i), "order_created", "u1");
        tokio::spawn(async move { handler.handle(cmd).await })
    });
    let (applied, granted) = tokio::join!(
        join_all(purchases),
        race_reserves(&ledger, "u1", RESERVES)
    );

    assert!(applied.into_iter().all(|joined| matches!(
        joined.unwrap().unwrap(),
        HandlePaymentWebhookResult::Applied { .. }
    )));
    let granted = granted.iter().filter(|r| r.is_ok()).count() as u32;
    let credits = ledger.store.read(&user("u1")).await.unwrap().credits;
    assert_eq!(credits + granted, SEEDED + PURCHASES as u32);
    assert!(granted as usize <= RESERVES);
    assert_eq!(ledger.store.processed_count().await, PURCHASES);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancellation_racing_refund_settles_in_a_serial_order() {
    for round in 0..32 {
        let ledger = ledger();
        seed(&ledger, "u1", 2, Tier::Free).await;
        let handler = webhook_handler(&ledger);
        let reservation = ledger.gate.reserve(&user("u1")).await.unwrap();

        let cancel = {
            let cmd = signed(&format!("evt_cancel_{}", round), "subscription_cancelled", "u1");
            tokio::spawn(async move { handler.handle(cmd).await })
        };
        let release = {
            let gate = ledger.gate.clone();
            let id = reservation.id;
            tokio::spawn(async move { gate.release(&id).await })
        };
        let (cancelled, released) = tokio::join!(cancel, release);
        cancelled.unwrap().unwrap();
        released.unwrap().unwrap();

        // Cancel then refund leaves 1; refund then cancel leaves 0.
        let record = ledger.store.read(&user("u1")).await.unwrap();
        assert_eq!(record.tier, Tier::Free);
        assert!(record.credits <= 1, "round {}: {} credits", round, record.credits);

        let settled = ledger.reservations.find(&reservation.id).await.unwrap().unwrap();
        assert_eq!(settled.state, ReservationState::Released);
        assert_eq!(ledger.reservations.unsettled_count().await, 0);
        assert_eq!(ledger.store.processed_count().await, 2);
    }
}
