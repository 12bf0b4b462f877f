//! Connection configuration from deployment settings.
//!
//! Chooses the addressing mode (managed cloud via the control file,
//! Kubernetes service DNS, or a single static address), derives the client
//! labels and opens the connection. A connect failure is fatal to the caller.

use crate::client::GridClient;
use crate::error::{GridError, GridResult};
use crate::models::{
    Addressing, ClientConfig, CloudConfig, ControlFile, Settings, TlsMaterial,
};

use chrono::{DateTime, SecondsFormat, Utc};
use std::path::Path;

/// Address used when `HOST_IP` is unset.
pub const FALLBACK_HOST: &str = "127.0.0.1";

/// Service for building the connection configuration and connecting.
pub struct ConnectionService;

impl ConnectionService {
    /// Read the control file and report whether cloud addressing is selected.
    ///
    /// A missing or unreadable file selects on-premises addressing.
    pub fn use_cloud(path: &Path) -> bool {
        match std::fs::read_to_string(path) {
            Ok(contents) => ControlFile::parse(&contents).use_cloud,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Control file not readable, using on-premises addressing");
                false
            }
        }
    }

    /// Addressing for the selected mode.
    pub fn addressing(settings: &Settings, use_cloud: bool) -> Addressing {
        if use_cloud {
            let cloud = &settings.cloud;
            return Addressing::Cloud(CloudConfig {
                discovery_token: cloud.discovery_token.clone(),
                url_base: cloud.url_base.clone(),
                tls: TlsMaterial {
                    ca_file: cloud.ca_file.clone(),
                    cert_file: cloud.cert_file.clone(),
                    key_file: cloud.key_file.clone(),
                    key_password: cloud.key_password.clone(),
                },
            });
        }
        if settings.kubernetes_enabled() {
            return Addressing::Dns(settings.service_dns.clone());
        }
        let host = settings.host_ip.clone().unwrap_or_else(|| FALLBACK_HOST.to_string());
        Addressing::Static(vec![host])
    }

    /// User label: `HOME` without its leading character, or `?`.
    pub fn user_label(home: Option<&str>) -> String {
        home.and_then(|h| h.get(1..))
            .filter(|rest| !rest.is_empty())
            .map_or_else(|| "?".to_string(), str::to_string)
    }

    /// Build the full client configuration.
    pub fn build_config(
        settings: &Settings,
        use_cloud: bool,
        launch_time: DateTime<Utc>,
    ) -> GridResult<ClientConfig> {
        let cluster_name =
            if use_cloud { &settings.cloud.cluster_id } else { &settings.cluster_name };

        ClientConfig::builder()
            .cluster_name(cluster_name.clone())
            .client_name(settings.client_name.clone())
            .label(Self::user_label(settings.home.as_deref()))
            .label(launch_time.to_rfc3339_opts(SecondsFormat::Secs, true))
            .addressing(Self::addressing(settings, use_cloud))
            .log_level(settings.client_log_level)
            .metrics_enabled(settings.metrics_enabled)
            .build()
            .map_err(GridError::config)
    }

    /// Build the configuration for the selected mode and connect.
    pub async fn connect(settings: &Settings, use_cloud: bool) -> GridResult<GridClient> {
        let config = Self::build_config(settings, use_cloud, Utc::now())?;
        tracing::info!(
            cluster = %config.cluster_name,
            addressing = ?config.addressing,
            labels = ?config.labels,
            "Client configuration built"
        );
        GridClient::connect(config).await
    }
}
