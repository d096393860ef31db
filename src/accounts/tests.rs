use super::*;
use chrono::Duration;

fn create_test_record(account: &str, refresh_token: &str) -> CredentialRecord {
    CredentialRecord {
        account: account.to_string(),
        oauth: OAuthCredential::new("client-id", "client-secret", refresh_token),
    }
}

#[test]
fn test_upsert_and_get() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = AccountStore::open(dir.path()).unwrap();
    let record = create_test_record("a@x.com", "RT1");

    store.upsert(record.clone()).unwrap();

    assert_eq!(store.get("a@x.com"), Some(&record));
    assert!(store.exists("a@x.com"));
    assert!(!store.exists("b@x.com"));
}

#[test]
fn test_upsert_replaces_existing_account() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = AccountStore::open(dir.path()).unwrap();

    store.upsert(create_test_record("a@x.com", "RT1")).unwrap();
    store.upsert(create_test_record("a@x.com", "RT2")).unwrap();

    assert_eq!(store.list().len(), 1);
    assert_eq!(store.get("a@x.com").unwrap().oauth.refresh_token, "RT2");
}

#[test]
fn test_round_trip_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let mut record = create_test_record("a@x.com", "RT1");
    record.oauth.access_token = Some("AT1".to_string());
    record.oauth.access_token_expires_at = Some(chrono::Utc::now() + Duration::hours(1));

    {
        let mut store = AccountStore::open(dir.path()).unwrap();
        store.upsert(record.clone()).unwrap();
    }

    // Simulates a fresh process
    let store = AccountStore::open(dir.path()).unwrap();
    assert_eq!(store.get("a@x.com"), Some(&record));
}

#[test]
fn test_open_creates_missing_state_dir() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("deep").join("state");

    let store = AccountStore::open(&nested).unwrap();

    assert!(nested.is_dir());
    assert!(store.list().is_empty());
    // Nothing written until the first mutation
    assert!(!store.path().exists());
}

#[test]
fn test_corrupt_file_loads_empty() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(ACCOUNTS_FILE), "{ not json ]").unwrap();

    let store = AccountStore::open(dir.path()).unwrap();
    assert!(store.list().is_empty());
}

#[test]
fn test_wrong_shape_loads_empty() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(ACCOUNTS_FILE),
        r#"{"account": "a@x.com"}"#,
    )
    .unwrap();

    let records = AccountStore::load_or_empty(&dir.path().join(ACCOUNTS_FILE)).unwrap();
    assert!(records.is_empty());
}

#[test]
fn test_duplicate_accounts_in_file_collapse() {
    let dir = tempfile::tempdir().unwrap();
    let records = vec![
        create_test_record("a@x.com", "RT1"),
        create_test_record("b@x.com", "RTB"),
        create_test_record("a@x.com", "RT2"),
    ];
    std::fs::write(
        dir.path().join(ACCOUNTS_FILE),
        serde_json::to_string(&records).unwrap(),
    )
    .unwrap();

    let store = AccountStore::open(dir.path()).unwrap();
    assert_eq!(store.list().len(), 2);
    assert_eq!(store.get("a@x.com").unwrap().oauth.refresh_token, "RT2");
}

#[test]
fn test_remove() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = AccountStore::open(dir.path()).unwrap();
    store.upsert(create_test_record("a@x.com", "RT1")).unwrap();

    assert!(store.remove("a@x.com").unwrap());
    assert!(store.get("a@x.com").is_none());

    let reopened = AccountStore::open(dir.path()).unwrap();
    assert!(reopened.list().is_empty());
}

#[test]
fn test_remove_missing_leaves_file_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = AccountStore::open(dir.path()).unwrap();
    store.upsert(create_test_record("a@x.com", "RT1")).unwrap();

    let before = std::fs::metadata(store.path()).unwrap().modified().unwrap();
    let contents_before = std::fs::read_to_string(store.path()).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(20));

    assert!(!store.remove("nobody@x.com").unwrap());

    let after = std::fs::metadata(store.path()).unwrap().modified().unwrap();
    assert_eq!(before, after);
    assert_eq!(std::fs::read_to_string(store.path()).unwrap(), contents_before);
}

#[test]
fn test_remove_on_empty_store_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = AccountStore::open(dir.path()).unwrap();

    assert!(!store.remove("a@x.com").unwrap());
    assert!(!store.path().exists());
}

#[test]
fn test_persisted_field_names() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = AccountStore::open(dir.path()).unwrap();
    store.upsert(create_test_record("a@x.com", "RT1")).unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
    let first = &json[0];
    assert_eq!(first["account"], "a@x.com");
    assert_eq!(first["oauth"]["client_id"], "client-id");
    assert_eq!(first["oauth"]["client_secret"], "client-secret");
    assert_eq!(first["oauth"]["refresh_token"], "RT1");
    assert!(first["oauth"].get("access_token").is_none());
}

#[cfg(unix)]
#[test]
fn test_file_is_private() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let mut store = AccountStore::open(dir.path()).unwrap();
    store.upsert(create_test_record("a@x.com", "RT1")).unwrap();

    let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn test_open_under_regular_file_is_storage_error() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "x").unwrap();

    let err = AccountStore::open(blocker.join("state")).unwrap_err();
    assert!(matches!(err, Error::Storage { .. }));
    assert_eq!(err.exit_code(), crate::error::EXIT_STORAGE);
}

#[test]
fn test_load_unreadable_path_is_storage_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(ACCOUNTS_FILE);
    std::fs::create_dir(&path).unwrap();

    // Not a parse failure, so no fallback to an empty store
    let err = AccountStore::load_or_empty(&path).unwrap_err();
    assert!(matches!(err, Error::Storage { .. }));
    assert!(AccountStore::open(dir.path()).is_err());
}

#[test]
fn test_failed_upsert_leaves_memory_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = AccountStore::open(dir.path()).unwrap();
    store.upsert(create_test_record("a@x.com", "RT1")).unwrap();

    // Replace the account file with a directory so the next write fails
    std::fs::remove_file(store.path()).unwrap();
    std::fs::create_dir(store.path()).unwrap();

    let err = store.upsert(create_test_record("a@x.com", "RT2")).unwrap_err();
    assert!(matches!(err, Error::Storage { .. }));
    assert_eq!(err.exit_code(), crate::error::EXIT_STORAGE);

    let err = store.upsert(create_test_record("b@x.com", "RT3")).unwrap_err();
    assert!(matches!(err, Error::Storage { .. }));

    assert_eq!(store.list().len(), 1);
    assert_eq!(store.get("a@x.com").unwrap().oauth.refresh_token, "RT1");
    assert!(!store.exists("b@x.com"));
}

#[test]
fn test_failed_remove_keeps_record() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = AccountStore::open(dir.path()).unwrap();
    store.upsert(create_test_record("a@x.com", "RT1")).unwrap();

    std::fs::remove_file(store.path()).unwrap();
    std::fs::create_dir(store.path()).unwrap();

    let err = store.remove("a@x.com").unwrap_err();
    assert!(matches!(err, Error::Storage { .. }));
    assert!(store.exists("a@x.com"));
}

#[test]
fn test_validate_account_id() {
    assert!(validate_account_id("a@x.com").is_ok());
    assert!(validate_account_id("first.last+tag@example.co.uk").is_ok());

    for bad in ["", "no-at-sign", "@x.com", "a@", "a@b@c", "a b@x.com", "a@x.com\n"] {
        let err = validate_account_id(bad).unwrap_err();
        assert!(
            matches!(err, Error::InvalidInput(_)),
            "expected InvalidInput for {:?}",
            bad
        );
    }
}
