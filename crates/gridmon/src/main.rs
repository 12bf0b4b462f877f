//! gridmon - connects to a data grid cluster and prints a one-shot report.

use std::io::Write;
use std::process::ExitCode;

use gridmon_core::logging::{init_logging, LogConfig};
use gridmon_core::services::SEPARATOR;
use gridmon_core::{ConnectionService, Report, ReportSchedule, Settings};

#[tokio::main]
async fn main() -> ExitCode {
    let settings = Settings::from_env();

    let log_config = LogConfig::new("gridmon").with_client_level(settings.client_log_level);
    let _logging_guard = init_logging(log_config);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting gridmon");
    for issue in &settings.issues {
        tracing::warn!(issue = %issue, "Ignoring invalid setting, using default");
    }

    let mut stdout = std::io::stdout();
    let use_cloud = ConnectionService::use_cloud(&settings.control_file);
    let _ = writeln!(stdout, "{SEPARATOR}");
    let _ = writeln!(stdout, "MY_KUBERNETES_ENABLED '{}'", settings.kubernetes);
    let _ = writeln!(stdout, "USE_CLOUD '{use_cloud}'");

    let client = match ConnectionService::connect(&settings, use_cloud).await {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(category = e.category(), error = %e, hint = e.hint().unwrap_or_default(), "Failed to connect to cluster");
            return ExitCode::from(1);
        }
    };

    Report::run(&client, &ReportSchedule::from_settings(&settings), &mut stdout).await;

    tracing::info!("gridmon finished");
    ExitCode::SUCCESS
}
