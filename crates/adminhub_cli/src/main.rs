//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `adminhub_core` linkage.
//! - Load the core config, start logging, and optionally report inbox,
//!   search and statistics state for one database.

use adminhub_core::service::statistics::configured_instance_statistics;
use adminhub_core::{
    builtin_registry, init_logging_from_config, open_db, CoreConfig, InboxListQuery,
    InboxStatus, InboxStore, SearchAggregator, SqliteInboxStore,
};
use clap::Parser;
use log::info;
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "adminhub_cli", version, about = "Inspect an adminhub database")]
struct Cli {
    /// SQLite database to report on; only the processor listing is printed without it.
    db_path: Option<PathBuf>,

    /// JSON config file; built-in defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Value to quick-search across the configured entities.
    #[arg(short, long)]
    search: Option<String>,

    /// Restrict the search to one entity, e.g. `Organisations`.
    #[arg(short, long, requires = "search")]
    entity: Option<String>,

    /// Rows returned per entity; the configured default when omitted.
    #[arg(short, long, requires = "search")]
    limit: Option<u32>,

    /// Print created/modified activity for the configured tables.
    #[arg(long)]
    statistics: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn Error>> {
    let config = match &cli.config {
        Some(path) => CoreConfig::load(path)?,
        None => CoreConfig::default(),
    };
    let logging = init_logging_from_config(&config)?;
    info!(
        "event=cli_start module=cli status=ok logging={} db={}",
        logging,
        cli.db_path.is_some()
    );

    println!("adminhub_core ping={}", adminhub_core::ping());
    println!("adminhub_core version={}", adminhub_core::core_version());
    for descriptor in builtin_registry().descriptors() {
        println!(
            "processor scope={} action={} enabled={}",
            descriptor.scope, descriptor.action, descriptor.enabled
        );
    }

    let Some(db_path) = &cli.db_path else {
        return Ok(());
    };
    let conn = open_db(db_path)?;

    let pending = InboxListQuery {
        status: Some(InboxStatus::Pending),
        ..InboxListQuery::default()
    };
    println!("inbox pending={}", SqliteInboxStore::new(&conn).count(&pending)?);

    if let Some(value) = &cli.search {
        let aggregator = SearchAggregator::from_names(&config.search.entities)
            .with_default_limit(config.search.default_limit);
        let results = aggregator.search_all(&conn, value, cli.limit, cli.entity.as_deref())?;
        for (entity, result) in results {
            println!(
                "search entity={} total={} returned={}",
                entity,
                result.total_count,
                result.entries.len()
            );
        }
    }

    if cli.statistics {
        let statistics = configured_instance_statistics(&conn, &config.statistics)?;
        println!("{}", serde_json::to_string_pretty(&statistics)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::Cli;
    use clap::{CommandFactory, Parser};

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn search_options_are_parsed() {
        let cli = Cli::parse_from([
            "adminhub_cli",
            "/tmp/adminhub.db",
            "--config",
            "/etc/adminhub.json",
            "--search",
            "acme",
            "--entity",
            "Organisations",
            "--limit",
            "3",
            "--statistics",
        ]);
        assert_eq!(cli.db_path.unwrap().to_str(), Some("/tmp/adminhub.db"));
        assert_eq!(cli.config.unwrap().to_str(), Some("/etc/adminhub.json"));
        assert_eq!(cli.search.as_deref(), Some("acme"));
        assert_eq!(cli.entity.as_deref(), Some("Organisations"));
        assert_eq!(cli.limit, Some(3));
        assert!(cli.statistics);
    }

    #[test]
    fn entity_without_search_is_rejected() {
        let err = Cli::try_parse_from(["adminhub_cli", "db.sqlite", "--entity", "Users"]);
        assert!(err.is_err());
    }
}
