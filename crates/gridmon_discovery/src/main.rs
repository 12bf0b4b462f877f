//! gridmon_discovery - announces the gridmon service name to a monitoring
//! discovery probe.

mod handler;
mod settings;

use actix_web::{web, App, HttpServer};
use gridmon_core::logging::{init_logging, LogConfig};
use handler::ServiceName;
use settings::DiscoverySettings;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let _logging_guard = init_logging(LogConfig::new("gridmon_discovery"));

    let settings = DiscoverySettings::from_env();
    tracing::info!(
        service_name = %settings.service_name,
        path = %settings.path,
        bind = %settings.bind,
        "Starting discovery endpoint"
    );

    let name = web::Data::new(ServiceName(settings.service_name.clone()));
    let path = settings.path.clone();

    HttpServer::new(move || {
        App::new().app_data(name.clone()).route(&path, web::route().to(handler::discovery))
    })
    .bind(&settings.bind)?
    .run()
    .await
}
