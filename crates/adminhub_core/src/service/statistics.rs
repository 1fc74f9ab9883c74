//! Instance activity statistics.
//!
//! # Invariants
//! - A timeline has exactly one point per day of the window, oldest first,
//!   including days without activity.
//! - `variation` counts the rows whose timestamp falls inside the window.

use crate::config::StatisticsConfig;
use crate::db::{is_safe_identifier, DbError};
use chrono::{Days, NaiveDate, NaiveTime, Utc};
use log::debug;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StatisticsResult<T> = Result<T, StatisticsError>;

#[derive(Debug)]
pub enum StatisticsError {
    /// Only `created` and `modified` timelines exist.
    UnsupportedField(String),
    InvalidTable(String),
    /// A window must cover at least one day.
    EmptyWindow,
    Db(DbError),
}

impl Display for StatisticsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedField(field) => write!(
                f,
                "unsupported timeline field `{field}`; expected created|modified"
            ),
            Self::InvalidTable(table) => write!(f, "invalid statistics table `{table}`"),
            Self::EmptyWindow => write!(f, "statistics window must cover at least one day"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StatisticsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StatisticsError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityField {
    Created,
    Modified,
}

impl ActivityField {
    pub fn parse(value: &str) -> StatisticsResult<Self> {
        match value.trim() {
            "created" => Ok(Self::Created),
            "modified" => Ok(Self::Modified),
            other => Err(StatisticsError::UnsupportedField(other.to_string())),
        }
    }

    fn column(self) -> &'static str {
        match self {
            Self::Created => "created_at",
            Self::Modified => "modified_at",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelinePoint {
    /// Calendar day, `YYYY-MM-DD` (UTC).
    pub time: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityStatistic {
    /// All rows in the table.
    pub amount: u64,
    pub timeline: Vec<TimelinePoint>,
    pub variation: u64,
}

/// Creation and modification activity of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableStatistics {
    pub created: ActivityStatistic,
    pub modified: ActivityStatistic,
}

/// Activity of one table over the `days` days ending on `today`.
pub fn activity_statistic(
    conn: &Connection,
    table: &str,
    days: u32,
    field: &str,
    today: NaiveDate,
) -> StatisticsResult<ActivityStatistic> {
    let field = ActivityField::parse(field)?;
    if !is_safe_identifier(table) {
        return Err(StatisticsError::InvalidTable(table.to_string()));
    }
    if days == 0 {
        return Err(StatisticsError::EmptyWindow);
    }

    let first_day = today
        .checked_sub_days(Days::new(u64::from(days - 1)))
        .ok_or(StatisticsError::EmptyWindow)?;
    let day_after = today
        .checked_add_days(Days::new(1))
        .ok_or(StatisticsError::EmptyWindow)?;
    let window_start = first_day.and_time(NaiveTime::MIN).and_utc().timestamp_millis();
    let window_end = day_after.and_time(NaiveTime::MIN).and_utc().timestamp_millis();

    let amount: i64 =
        conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| row.get(0))?;

    let column = field.column();
    let mut stmt = conn.prepare(&format!(
        "SELECT date({column} / 1000, 'unixepoch') AS day, COUNT(*)
         FROM {table}
         WHERE {column} >= ?1 AND {column} < ?2
         GROUP BY day;"
    ))?;
    let mut rows = stmt.query(params![window_start, window_end])?;
    let mut per_day: BTreeMap<String, u64> = BTreeMap::new();
    while let Some(row) = rows.next()? {
        let day: String = row.get(0)?;
        let count: i64 = row.get(1)?;
        per_day.insert(day, count.max(0) as u64);
    }

    let timeline = first_day
        .iter_days()
        .take(days as usize)
        .map(|day| {
            let time = day.format("%Y-%m-%d").to_string();
            let count = per_day.get(&time).copied().unwrap_or(0);
            TimelinePoint { time, count }
        })
        .collect::<Vec<_>>();
    let variation = timeline.iter().map(|point| point.count).sum();

    debug!(
        "event=activity_statistic module=service status=ok table={} field={} days={} variation={}",
        table, column, days, variation
    );
    Ok(ActivityStatistic {
        amount: amount.max(0) as u64,
        timeline,
        variation,
    })
}

/// Both timelines of every listed table over the window ending on `today`.
pub fn instance_statistics(
    conn: &Connection,
    tables: &[String],
    days: u32,
    today: NaiveDate,
) -> StatisticsResult<BTreeMap<String, TableStatistics>> {
    tables
        .iter()
        .map(|table| {
            let statistics = TableStatistics {
                created: activity_statistic(conn, table, days, "created", today)?,
                modified: activity_statistic(conn, table, days, "modified", today)?,
            };
            Ok((table.clone(), statistics))
        })
        .collect()
}

/// Instance statistics for the configured tables and window, ending today (UTC).
pub fn configured_instance_statistics(
    conn: &Connection,
    config: &StatisticsConfig,
) -> StatisticsResult<BTreeMap<String, TableStatistics>> {
    let today = Utc::now().date_naive();
    instance_statistics(conn, &config.tables, config.days, today)
}
