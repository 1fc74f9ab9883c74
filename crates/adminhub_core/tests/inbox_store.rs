use adminhub_core::db::open_db_in_memory;
use adminhub_core::{
    InboxListQuery, InboxStatus, InboxStore, NewInboxEntry, RepoError, SqliteInboxStore,
};
use rusqlite::Connection;
use serde_json::json;

fn submit(conn: &Connection, scope: &str, action: &str, title: &str) -> i64 {
    SqliteInboxStore::new(conn)
        .create(&NewInboxEntry::new(scope, action, title, json!({})))
        .unwrap()
        .id
}

#[test]
fn create_and_get_roundtrip() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteInboxStore::new(&conn);

    let payload = json!({"username": "dana"});
    let mut entry = NewInboxEntry::new("User", "Registration", "New user", payload);
    entry.origin = "10.0.0.7".to_string();
    entry.comment = Some("please approve".to_string());
    let created = store.create(&entry).unwrap();

    let loaded = store.get(created.id).unwrap();
    assert_eq!(loaded.scope, "User");
    assert_eq!(loaded.action, "Registration");
    assert_eq!(loaded.origin, "10.0.0.7");
    assert_eq!(loaded.comment.as_deref(), Some("please approve"));
    assert_eq!(loaded.payload["username"], "dana");
    assert_eq!(loaded.status, InboxStatus::Pending);
    assert!(loaded.created_at > 0);
}

#[test]
fn create_rejects_blank_scope() {
    let conn = open_db_in_memory().unwrap();
    let err = SqliteInboxStore::new(&conn)
        .create(&NewInboxEntry::new("  ", "edit", "t", json!({})))
        .unwrap_err();
    assert!(matches!(err, RepoError::Validation(_)));
}

#[test]
fn get_unknown_id_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let err = SqliteInboxStore::new(&conn).get(404).unwrap_err();
    assert!(matches!(err, RepoError::NotFound { id: 404, .. }));
}

#[test]
fn listing_by_scope_returns_newest_first() {
    let conn = open_db_in_memory().unwrap();
    let first = submit(&conn, "users", "edit", "one");
    submit(&conn, "Organisation", "Create", "other");
    let second = submit(&conn, "users", "edit", "two");
    let third = submit(&conn, "users", "edit", "three");

    let store = SqliteInboxStore::new(&conn);
    let query = InboxListQuery::default().with_filter("scope", "users");
    let ids = store
        .list(&query)
        .unwrap()
        .into_iter()
        .map(|entry| entry.id)
        .collect::<Vec<_>>();
    assert_eq!(ids, vec![third, second, first]);
    assert_eq!(store.count(&query).unwrap(), 3);
}

#[test]
fn unknown_filter_key_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let query = InboxListQuery::default().with_filter("status; --", "x");
    let err = SqliteInboxStore::new(&conn).list(&query).unwrap_err();
    assert!(matches!(err, RepoError::InvalidFilter(ref key) if key == "status; --"));
}

#[test]
fn quick_filter_matches_any_quick_field_case_insensitively() {
    let conn = open_db_in_memory().unwrap();
    submit(&conn, "users", "edit", "Rename ALICE");
    submit(&conn, "Organisation", "Create", "Acme");
    submit(&conn, "Alice", "Registration", "sign-up");

    let query = InboxListQuery {
        quick_filter: Some("alice".to_string()),
        ..InboxListQuery::default()
    };
    let titles = SqliteInboxStore::new(&conn)
        .list(&query)
        .unwrap()
        .into_iter()
        .map(|entry| entry.title)
        .collect::<Vec<_>>();
    assert_eq!(titles, vec!["sign-up".to_string(), "Rename ALICE".to_string()]);
}

#[test]
fn quick_filter_folds_non_ascii_case() {
    let conn = open_db_in_memory().unwrap();
    submit(&conn, "users", "edit", "Änderung Benutzer");
    submit(&conn, "users", "edit", "Anderung");

    let query = InboxListQuery {
        quick_filter: Some("änderung".to_string()),
        ..InboxListQuery::default()
    };
    assert_eq!(SqliteInboxStore::new(&conn).count(&query).unwrap(), 1);
}

#[test]
fn quick_filter_and_field_filters_combine_with_and() {
    let conn = open_db_in_memory().unwrap();
    submit(&conn, "users", "edit", "Rename alice");
    submit(&conn, "Organisation", "Create", "alice corp");

    let query = InboxListQuery {
        quick_filter: Some("alice".to_string()),
        ..InboxListQuery::default().with_filter("scope", "users")
    };
    let entries = SqliteInboxStore::new(&conn).list(&query).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].scope, "users");
}

#[test]
fn pagination_applies_after_ordering() {
    let conn = open_db_in_memory().unwrap();
    let ids = (0..5)
        .map(|n| submit(&conn, "users", "edit", &format!("entry {n}")))
        .collect::<Vec<_>>();

    let query = InboxListQuery {
        limit: Some(2),
        offset: 2,
        ..InboxListQuery::default()
    };
    let page = SqliteInboxStore::new(&conn)
        .list(&query)
        .unwrap()
        .into_iter()
        .map(|entry| entry.id)
        .collect::<Vec<_>>();
    assert_eq!(page, vec![ids[2], ids[1]]);
}

#[test]
fn terminal_entries_cannot_transition_again() {
    let conn = open_db_in_memory().unwrap();
    let id = submit(&conn, "users", "edit", "rename");
    let store = SqliteInboxStore::new(&conn);

    store.mark_applied(id).unwrap();
    let err = store.mark_discarded(id).unwrap_err();
    assert!(matches!(
        err,
        RepoError::AlreadyTerminal {
            status: InboxStatus::Applied,
            ..
        }
    ));
    let err = store.mark_applied(id).unwrap_err();
    assert!(matches!(err, RepoError::AlreadyTerminal { .. }));
    assert_eq!(store.get(id).unwrap().status, InboxStatus::Applied);
}

#[test]
fn transition_of_unknown_entry_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let err = SqliteInboxStore::new(&conn).mark_discarded(9).unwrap_err();
    assert!(matches!(err, RepoError::NotFound { id: 9, .. }));
}

#[test]
fn status_filter_hides_terminal_entries() {
    let conn = open_db_in_memory().unwrap();
    let applied = submit(&conn, "users", "edit", "done");
    let pending = submit(&conn, "users", "edit", "open");
    let store = SqliteInboxStore::new(&conn);
    store.mark_applied(applied).unwrap();

    let query = InboxListQuery {
        status: Some(InboxStatus::Pending),
        ..InboxListQuery::default()
    };
    let ids = store
        .list(&query)
        .unwrap()
        .into_iter()
        .map(|entry| entry.id)
        .collect::<Vec<_>>();
    assert_eq!(ids, vec![pending]);
}

#[test]
fn context_values_are_distinct_and_sorted() {
    let conn = open_db_in_memory().unwrap();
    submit(&conn, "users", "edit", "a");
    submit(&conn, "User", "Registration", "b");
    submit(&conn, "users", "edit", "c");

    let store = SqliteInboxStore::new(&conn);
    assert_eq!(
        store.context_values("scope").unwrap(),
        vec!["User".to_string(), "users".to_string()]
    );
    assert!(matches!(
        store.context_values("title"),
        Err(RepoError::InvalidFilter(_))
    ));
}
