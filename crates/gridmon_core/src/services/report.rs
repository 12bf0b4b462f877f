//! The report schedule.
//!
//! Banner, warm-up sleep, the fixed sequence of steps, closing banner,
//! linger sleep, then shutdown. Both sleeps are unconditional.

use super::{emit, GenericRecordFetcher, ObjectLister, QueryReporter, SEPARATOR};
use crate::client::ClusterClient;
use crate::models::Settings;

use chrono::{SecondsFormat, Utc};
use std::io::Write;
use std::time::Duration;

/// Statements run before the object listing.
pub const INTROSPECTION_QUERIES: [&str; 2] = ["SHOW MAPPINGS", "SHOW VIEWS"];

/// Timing and targets of one report run.
#[derive(Debug, Clone)]
pub struct ReportSchedule {
    /// Wait before the first query
    pub warmup: Duration,
    /// Wait before disconnecting
    pub linger: Duration,
    /// Map read by the generic-record step and the final query
    pub generic_record_map: String,
}

impl ReportSchedule {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            warmup: settings.warmup,
            linger: settings.linger,
            generic_record_map: settings.generic_record_map.clone(),
        }
    }

    /// Statement run after the generic-record step.
    pub fn map_query(&self) -> String {
        format!("SELECT * FROM \"{}\"", self.generic_record_map)
    }
}

/// Runs the schedule against a connected client.
pub struct Report;

impl Report {
    pub async fn run(
        client: &dyn ClusterClient,
        schedule: &ReportSchedule,
        out: &mut (dyn Write + Send),
    ) {
        emit(out, format_args!("{SEPARATOR}"));
        emit(out, format_args!("=================== {} ===================", now()));
        emit(out, format_args!("Sleeping {}, so cluster populated with data", describe(schedule.warmup)));
        tokio::time::sleep(schedule.warmup).await;

        for sql in INTROSPECTION_QUERIES {
            QueryReporter::run(client, sql, out).await;
        }
        ObjectLister::run(client, out).await;
        GenericRecordFetcher::run(client, &schedule.generic_record_map, out).await;
        QueryReporter::run(client, &schedule.map_query(), out).await;

        emit(out, format_args!("=================== {} ===================", now()));
        emit(out, format_args!("Sleeping for {}", describe(schedule.linger)));
        tokio::time::sleep(schedule.linger).await;

        emit(out, format_args!("Disconnecting"));
        client.shutdown().await;
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Human wording of a sleep.
fn describe(duration: Duration) -> String {
    match duration.as_secs() {
        60 => "one minute".to_string(),
        86_400 => "a day".to_string(),
        1 => "1 second".to_string(),
        secs => format!("{secs} seconds"),
    }
}
