use adminhub_core::db::open_db_in_memory;
use adminhub_core::search::entity::{
    builtin_entity, QuickFilterSpec, SearchableEntity, TableEntity,
};
use adminhub_core::SearchAggregator;
use rusqlite::Connection;
use std::sync::Arc;

fn seed(conn: &Connection) {
    conn.execute_batch(
        "INSERT INTO organisations (uuid, name, sector) VALUES
            ('org-1', 'ACME Corp', 'manufacturing'),
            ('org-2', 'Globex', 'acme supplies'),
            ('org-3', 'Initech', 'software');
         INSERT INTO individuals (uuid, email, first_name, last_name) VALUES
            ('ind-1', 'wile@acme.example', 'Wile', 'Coyote');
         INSERT INTO users (uuid, username, individual_id, organisation_id) VALUES
            ('usr-1', 'acme-admin', 1, 1);",
    )
    .unwrap();
}

fn users_without_quick_filters() -> Arc<dyn SearchableEntity> {
    Arc::new(TableEntity::new("Users", "users", QuickFilterSpec::default()))
}

#[test]
fn non_searchable_entities_are_absent_from_results() {
    let conn = open_db_in_memory().unwrap();
    seed(&conn);
    let aggregator = SearchAggregator::new(vec![
        users_without_quick_filters(),
        builtin_entity("Organisations").unwrap(),
    ]);

    let results = aggregator.search_all(&conn, "acme", None, None).unwrap();
    assert_eq!(results.keys().collect::<Vec<_>>(), vec!["Organisations"]);
    let organisations = &results["Organisations"];
    assert_eq!(organisations.entity_name, "Organisations");
    assert_eq!(organisations.total_count, 2);
    let names = organisations
        .entries
        .iter()
        .map(|entry| entry["name"].as_str().unwrap())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["ACME Corp", "Globex"]);
}

#[test]
fn limit_caps_entries_but_not_total() {
    let conn = open_db_in_memory().unwrap();
    seed(&conn);
    let aggregator = SearchAggregator::from_names(&["Organisations".to_string()]);

    let results = aggregator.search_all(&conn, "acme", Some(1), None).unwrap();
    let organisations = &results["Organisations"];
    assert_eq!(organisations.total_count, 2);
    assert_eq!(organisations.entries.len(), 1);
    assert_eq!(organisations.entries[0]["uuid"], "org-1");
}

#[test]
fn single_entity_request_restricts_candidates() {
    let conn = open_db_in_memory().unwrap();
    seed(&conn);
    let aggregator = SearchAggregator::from_names(&[
        "Organisations".to_string(),
        "Individuals".to_string(),
    ]);

    let results = aggregator
        .search_all(&conn, "acme", None, Some("Individuals"))
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results["Individuals"].entries[0]["last_name"], "Coyote");

    let outside = aggregator
        .search_all(&conn, "acme", None, Some("Users"))
        .unwrap();
    assert!(outside.is_empty());
}

#[test]
fn contained_records_are_nested() {
    let conn = open_db_in_memory().unwrap();
    seed(&conn);
    conn.execute(
        "INSERT INTO individuals (uuid, email) VALUES ('ind-2', 'solo@example.org');",
        [],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO users (uuid, username, individual_id) VALUES ('usr-2', 'acme-solo', 2);",
        [],
    )
    .unwrap();
    let aggregator = SearchAggregator::from_names(&["Users".to_string()]);

    let results = aggregator.search_all(&conn, "ACME", None, None).unwrap();
    let users = &results["Users"];
    assert_eq!(users.total_count, 2);
    assert_eq!(users.entries[0]["username"], "acme-admin");
    assert_eq!(users.entries[0]["individual"]["first_name"], "Wile");
    assert_eq!(users.entries[0]["organisation"]["name"], "ACME Corp");
    assert!(users.entries[1]["organisation"].is_null());
}

#[test]
fn entities_without_matches_report_zero() {
    let conn = open_db_in_memory().unwrap();
    seed(&conn);
    let aggregator = SearchAggregator::from_names(&["Broods".to_string()]);

    let results = aggregator.search_all(&conn, "acme", None, None).unwrap();
    assert_eq!(results["Broods"].total_count, 0);
    assert!(results["Broods"].entries.is_empty());
}

#[test]
fn wildcard_characters_match_literally() {
    let conn = open_db_in_memory().unwrap();
    seed(&conn);
    let aggregator = SearchAggregator::from_names(&["Organisations".to_string()]);

    let results = aggregator.search_all(&conn, "%", None, None).unwrap();
    assert_eq!(results["Organisations"].total_count, 0);
}

#[test]
fn non_ascii_values_match_case_insensitively() {
    let conn = open_db_in_memory().unwrap();
    conn.execute(
        "INSERT INTO organisations (uuid, name) VALUES ('org-z', 'Ärztekammer Zürich');",
        [],
    )
    .unwrap();
    let aggregator = SearchAggregator::from_names(&["Organisations".to_string()]);

    let results = aggregator
        .search_all(&conn, "ärztekammer", None, None)
        .unwrap();
    assert_eq!(results["Organisations"].total_count, 1);
    assert_eq!(results["Organisations"].entries[0]["name"], "Ärztekammer Zürich");

    let upper = aggregator.search_all(&conn, "ZÜRICH", None, None).unwrap();
    assert_eq!(upper["Organisations"].total_count, 1);
}

#[test]
fn declared_order_column_sorts_matches() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(
        "INSERT INTO organisations (uuid, name) VALUES
            ('org-a', 'zeta acme'),
            ('org-b', 'alpha acme');",
    )
    .unwrap();
    let by_name = TableEntity::new(
        "Organisations",
        "organisations",
        QuickFilterSpec::fields(&["name"]).ordered_by("name"),
    );
    let aggregator = SearchAggregator::new(vec![Arc::new(by_name)]);

    let results = aggregator.search_all(&conn, "acme", None, None).unwrap();
    let names = results["Organisations"]
        .entries
        .iter()
        .map(|entry| entry["name"].as_str().unwrap())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["alpha acme", "zeta acme"]);
}
