use super::*;
use qos_core::Provider;
use std::sync::Arc;
use tempfile::tempdir;

fn store_in(dir: &Path) -> ProfileStore {
    ProfileStore::new(dir.join("cli_qos_profile.json"), PolicyTable::builtin())
}

#[test]
fn test_load_missing_file_returns_defaults_without_writing() {
    let dir = tempdir().unwrap();
    let store = store_in(dir.path());
    let profile = store.load();
    assert_eq!(profile, Profile::seeded(&PolicyTable::builtin()));
    assert!(!store.path().exists());
}

#[test]
fn test_load_corrupt_file_returns_defaults() {
    let dir = tempdir().unwrap();
    let store = store_in(dir.path());
    fs::write(store.path(), "{ not json").unwrap();
    assert_eq!(store.load(), Profile::seeded(&PolicyTable::builtin()));
}

#[test]
fn test_transact_persists_and_returns_value() {
    let dir = tempdir().unwrap();
    let store = store_in(dir.path());

    let returned = store
        .transact(|profile| {
            let policy = Provider::Codex.default_policy();
            let account = profile.providers.codex.ensure_account("alice", policy);
            account.recent_429 = 2;
            account.max_parallel
        })
        .unwrap();
    assert_eq!(returned, 3);

    let reloaded = store.load();
    assert_eq!(reloaded.providers.codex.accounts["alice"].recent_429, 2);
    assert_eq!(reloaded.providers.codex.last_account_id, "alice");
    assert!(reloaded.updated_at.is_some());
}

#[test]
fn test_repeated_reads_are_byte_identical() {
    let dir = tempdir().unwrap();
    let store = store_in(dir.path());
    fs::write(
        store.path(),
        r#"{"providers":{"gemini":{"max_parallel":2,"extra_field":[1,2]}}}"#,
    )
    .unwrap();

    let first = serde_json::to_string_pretty(&store.load()).unwrap();
    let second = serde_json::to_string_pretty(&store.load()).unwrap();
    assert_eq!(first, second);
    assert!(first.contains("extra_field"));
}

#[test]
fn test_transact_preserves_unknown_fields() {
    let dir = tempdir().unwrap();
    let store = store_in(dir.path());
    fs::write(
        store.path(),
        r#"{"owner":"ops","providers":{"codex":{"note":"pinned"},"opencode":{"max_parallel":5}}}"#,
    )
    .unwrap();

    store
        .transact(|profile| profile.providers.codex.current.success_streak = 1)
        .unwrap();

    let raw: Value = serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
    assert_eq!(raw["owner"], "ops");
    assert_eq!(raw["providers"]["codex"]["note"], "pinned");
    assert_eq!(raw["providers"]["opencode"]["max_parallel"], 5);
    assert_eq!(raw["providers"]["codex"]["success_streak"], 1);
}

#[test]
fn test_transact_unwritable_location_errors() {
    let store = ProfileStore::new("/dev/null/qos/profile.json", PolicyTable::builtin());
    assert!(store.transact(|_| ()).is_err());
}

#[test]
fn test_concurrent_transactions_do_not_lose_updates() {
    let dir = tempdir().unwrap();
    let store = Arc::new(store_in(dir.path()));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for _ in 0..10 {
                    store
                        .transact(|profile| profile.providers.gemini.current.recent_timeout += 1)
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.load().providers.gemini.current.recent_timeout, 40);
}
