use super::*;
use crate::clock::{ManualClock, SharedClock};
use serde_json::json;

fn test_store(ttl_ms: i64) -> (IdempotencyStore<Value>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(1_707_668_400_000));
    let shared: SharedClock = clock.clone();
    (IdempotencyStore::new(ttl_ms, shared), clock)
}

#[test]
fn test_unknown_transaction_is_new() {
    let (store, _clock) = test_store(DEFAULT_TTL_MS);
    assert_eq!(store.check("a1", "r1", "tx1", &json!({"x": 1})), IdempotencyCheck::New);
}

#[test]
fn test_same_payload_replays_saved_result() {
    let (store, _clock) = test_store(DEFAULT_TTL_MS);
    store.save("a1", "r1", "tx1", &json!({"x": 1}), json!({"ok": true}));

    assert_eq!(
        store.check("a1", "r1", "tx1", &json!({"x": 1})),
        IdempotencyCheck::Replay(json!({"ok": true}))
    );
    // Replays are repeatable
    assert_eq!(
        store.check("a1", "r1", "tx1", &json!({"x": 1})),
        IdempotencyCheck::Replay(json!({"ok": true}))
    );
}

#[test]
fn test_different_payload_conflicts() {
    let (store, _clock) = test_store(DEFAULT_TTL_MS);
    store.save("a1", "r1", "tx1", &json!({"x": 1}), json!({"ok": true}));

    match store.check("a1", "r1", "tx1", &json!({"x": 2})) {
        IdempotencyCheck::Conflict(conflict) => {
            assert_eq!(conflict.tx_id, "tx1");
            assert!(conflict.to_string().contains("tx1"));
        }
        other => panic!("Expected conflict, got {:?}", other),
    }
}

#[test]
fn test_payload_key_order_is_normalized() {
    let (store, _clock) = test_store(DEFAULT_TTL_MS);
    let saved: Value = serde_json::from_str(r#"{"dest":{"tx":3,"ty":4},"channel":"global"}"#).unwrap();
    let retried: Value = serde_json::from_str(r#"{"channel":"global","dest":{"ty":4,"tx":3}}"#).unwrap();

    store.save("a1", "r1", "tx1", &saved, json!({"ok": true}));
    assert_eq!(
        store.check("a1", "r1", "tx1", &retried),
        IdempotencyCheck::Replay(json!({"ok": true}))
    );
}

#[test]
fn test_integral_float_payload_replays() {
    let (store, _clock) = test_store(DEFAULT_TTL_MS);
    store.save("a1", "r1", "tx1", &json!({"dest": {"tx": 3, "ty": 4}}), json!({"ok": true}));

    assert_eq!(
        store.check("a1", "r1", "tx1", &json!({"dest": {"tx": 3.0, "ty": 4.0}})),
        IdempotencyCheck::Replay(json!({"ok": true}))
    );
    assert!(matches!(
        store.check("a1", "r1", "tx1", &json!({"dest": {"tx": 3.5, "ty": 4.0}})),
        IdempotencyCheck::Conflict(_)
    ));
}

#[test]
fn test_keys_are_scoped_by_agent_and_room() {
    let (store, _clock) = test_store(DEFAULT_TTL_MS);
    store.save("a1", "r1", "tx1", &json!({"x": 1}), json!({"ok": true}));

    assert_eq!(store.check("a2", "r1", "tx1", &json!({"x": 1})), IdempotencyCheck::New);
    assert_eq!(store.check("a1", "r2", "tx1", &json!({"x": 1})), IdempotencyCheck::New);
    assert_eq!(store.check("a1", "r1", "tx2", &json!({"x": 1})), IdempotencyCheck::New);
}

#[test]
fn test_expired_entry_is_new_and_removed() {
    let (store, clock) = test_store(DEFAULT_TTL_MS);
    store.save("a1", "r1", "tx1", &json!({"x": 1}), json!({"ok": true}));

    clock.advance(DEFAULT_TTL_MS - 1);
    assert!(matches!(
        store.check("a1", "r1", "tx1", &json!({"x": 1})),
        IdempotencyCheck::Replay(_)
    ));

    clock.advance(1);
    assert_eq!(store.check("a1", "r1", "tx1", &json!({"x": 1})), IdempotencyCheck::New);
    assert!(store.is_empty());
}

#[test]
fn test_expired_entry_no_longer_conflicts() {
    let (store, clock) = test_store(1_000);
    store.save("a1", "r1", "tx1", &json!({"x": 1}), json!({"ok": true}));
    clock.advance(1_000);
    assert_eq!(store.check("a1", "r1", "tx1", &json!({"x": 2})), IdempotencyCheck::New);
}

#[test]
fn test_save_overwrites_and_refreshes_ttl() {
    let (store, clock) = test_store(1_000);
    store.save("a1", "r1", "tx1", &json!({"x": 1}), json!({"n": 1}));
    clock.advance(800);
    store.save("a1", "r1", "tx1", &json!({"x": 2}), json!({"n": 2}));
    clock.advance(800);

    assert_eq!(
        store.check("a1", "r1", "tx1", &json!({"x": 2})),
        IdempotencyCheck::Replay(json!({"n": 2}))
    );
    assert_eq!(store.len(), 1);
}

#[test]
fn test_sweep_removes_only_expired() {
    let (store, clock) = test_store(1_000);
    store.save("a1", "r1", "tx1", &json!({}), json!(1));
    store.save("a1", "r1", "tx2", &json!({}), json!(2));
    clock.advance(600);
    store.save("a1", "r1", "tx3", &json!({}), json!(3));
    clock.advance(600);

    assert_eq!(store.sweep_expired(), 2);
    assert_eq!(store.len(), 1);
    assert_eq!(store.check("a1", "r1", "tx3", &json!({})), IdempotencyCheck::Replay(json!(3)));
}

#[test]
fn test_clones_share_entries() {
    let (store, _clock) = test_store(DEFAULT_TTL_MS);
    let other = store.clone();
    store.save("a1", "r1", "tx1", &json!({}), json!("done"));
    assert_eq!(other.len(), 1);
}

#[tokio::test]
async fn test_sweep_handle_stops_task() {
    let (store, _clock) = test_store(DEFAULT_TTL_MS);
    let handle = spawn_sweep(store, 60);
    assert!(handle.is_running());
    handle.stop();
}
