use adminhub_core::{ConfigError, CoreConfig, SearchAggregator};
use std::io::Write;

#[test]
fn load_reads_json_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(
        br#"{
            "log_level": "warn",
            "search": {"default_limit": 3, "entities": ["Organisations", "Users"]}
        }"#,
    )
    .unwrap();

    let config = CoreConfig::load(file.path()).unwrap();
    assert_eq!(config.log_level, "warn");
    assert_eq!(config.search.default_limit, 3);

    let aggregator = SearchAggregator::from_names(&config.search.entities);
    assert_eq!(aggregator.entity_names(), vec!["Organisations", "Users"]);
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = CoreConfig::load(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}
