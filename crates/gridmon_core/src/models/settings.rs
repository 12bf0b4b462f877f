//! Deployment settings, populated once at startup.

use std::path::PathBuf;
use std::time::Duration;

/// Key in the control file that selects managed-cloud addressing.
pub const USE_CLOUD_KEY: &str = "use.viridian";

/// Log level of the cluster client module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// No client logging
    Off,
    /// Errors only
    Error,
    /// Warnings and errors
    Warn,
    /// Lifecycle events (default)
    #[default]
    Info,
    /// Per-invocation detail
    Debug,
    /// Frame-level detail
    Trace,
}

impl LogLevel {
    /// Convert to an `EnvFilter` directive level.
    pub fn as_directive(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }

    /// Parse from string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "off" | "none" => Some(Self::Off),
            "error" | "severe" => Some(Self::Error),
            "warn" | "warning" => Some(Self::Warn),
            "info" => Some(Self::Info),
            "debug" | "fine" => Some(Self::Debug),
            "trace" | "finest" => Some(Self::Trace),
            _ => None,
        }
    }
}

/// Contents of the local control file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlFile {
    /// Whether managed-cloud addressing is selected
    pub use_cloud: bool,
}

impl ControlFile {
    /// Parse `key=value` lines.
    ///
    /// Any line `use.viridian=true` (value case-insensitive) selects cloud
    /// addressing; blank lines, comments and other keys are ignored.
    pub fn parse(contents: &str) -> Self {
        let use_cloud = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| line.split_once('='))
            .any(|(key, value)| {
                key.trim().eq_ignore_ascii_case(USE_CLOUD_KEY)
                    && value.trim().eq_ignore_ascii_case("true")
            });
        Self { use_cloud }
    }
}

/// Managed-cloud deployment settings.
#[derive(Clone)]
pub struct CloudSettings {
    /// Cluster id used as the cluster name in cloud mode
    pub cluster_id: String,
    /// Discovery token
    pub discovery_token: String,
    /// Passphrase of the encrypted private key
    pub key_password: String,
    /// Host (or full base URL) of the discovery service
    pub url_base: String,
    /// CA certificate (PEM)
    pub ca_file: PathBuf,
    /// Client certificate (PEM)
    pub cert_file: PathBuf,
    /// Encrypted client private key (PEM)
    pub key_file: PathBuf,
}

impl Default for CloudSettings {
    fn default() -> Self {
        Self {
            cluster_id: String::new(),
            discovery_token: String::new(),
            key_password: String::new(),
            url_base: "api.viridian.hazelcast.com".to_string(),
            ca_file: PathBuf::from("/tmp/ca.pem"),
            cert_file: PathBuf::from("/tmp/cert.pem"),
            key_file: PathBuf::from("/tmp/key.pem"),
        }
    }
}

impl std::fmt::Debug for CloudSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudSettings")
            .field("cluster_id", &self.cluster_id)
            .field("discovery_token", &"<redacted>")
            .field("key_password", &"<redacted>")
            .field("url_base", &self.url_base)
            .field("ca_file", &self.ca_file)
            .field("cert_file", &self.cert_file)
            .field("key_file", &self.key_file)
            .finish()
    }
}

/// Process-wide settings for the reporter.
#[derive(Debug, Clone)]
pub struct Settings {
    /// On-premises cluster name
    pub cluster_name: String,
    /// Name the client registers under
    pub client_name: String,
    /// Kubernetes service DNS name of the cluster
    pub service_dns: String,
    /// Managed-cloud settings
    pub cloud: CloudSettings,
    /// Path of the control file
    pub control_file: PathBuf,
    /// Map read by the generic-record step
    pub generic_record_map: String,
    /// Wait before the first query
    pub warmup: Duration,
    /// Wait before disconnecting
    pub linger: Duration,
    /// Whether the client publishes statistics
    pub metrics_enabled: bool,
    /// Log level of the cluster client module
    pub client_log_level: LogLevel,
    /// Raw `MY_KUBERNETES_ENABLED` value
    pub kubernetes: String,
    /// `HOST_IP`, if set
    pub host_ip: Option<String>,
    /// `HOME`, if set
    pub home: Option<String>,
    /// Values that could not be parsed and fell back to defaults
    pub issues: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cluster_name: "grid1".to_string(),
            client_name: "gridmon".to_string(),
            service_dns: "gridmon-grid1-hazelcast.default.svc.cluster.local".to_string(),
            cloud: CloudSettings::default(),
            control_file: PathBuf::from("/tmp/control.file"),
            generic_record_map: "__map-store.mysql_slf4j".to_string(),
            warmup: Duration::from_secs(60),
            linger: Duration::from_secs(24 * 60 * 60),
            metrics_enabled: true,
            client_log_level: LogLevel::Info,
            kubernetes: String::new(),
            host_ip: None,
            home: None,
            issues: Vec::new(),
        }
    }
}

impl Settings {
    /// Populate settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Populate settings from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();
        let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = text("GRIDMON_CLUSTER_NAME") {
            settings.cluster_name = v;
        }
        if let Some(v) = text("GRIDMON_CLIENT_NAME") {
            settings.client_name = v;
        }
        if let Some(v) = text("GRIDMON_SERVICE_DNS") {
            settings.service_dns = v;
        }
        if let Some(v) = text("GRIDMON_CLOUD_CLUSTER_ID") {
            settings.cloud.cluster_id = v;
        }
        if let Some(v) = text("GRIDMON_CLOUD_TOKEN") {
            settings.cloud.discovery_token = v;
        }
        if let Some(v) = text("GRIDMON_CLOUD_KEY_PASSWORD") {
            settings.cloud.key_password = v;
        }
        if let Some(v) = text("GRIDMON_CLOUD_URL_BASE") {
            settings.cloud.url_base = v;
        }
        if let Some(v) = text("GRIDMON_CA_FILE") {
            settings.cloud.ca_file = PathBuf::from(v);
        }
        if let Some(v) = text("GRIDMON_CERT_FILE") {
            settings.cloud.cert_file = PathBuf::from(v);
        }
        if let Some(v) = text("GRIDMON_KEY_FILE") {
            settings.cloud.key_file = PathBuf::from(v);
        }
        if let Some(v) = text("GRIDMON_CONTROL_FILE") {
            settings.control_file = PathBuf::from(v);
        }
        if let Some(v) = text("GRIDMON_GENERIC_RECORD_MAP") {
            settings.generic_record_map = v;
        }

        if let Some(v) = text("GRIDMON_WARMUP_SECS") {
            match parse_secs(&v) {
                Some(d) => settings.warmup = d,
                None => settings.issues.push(format!("GRIDMON_WARMUP_SECS '{v}' is not a number")),
            }
        }
        if let Some(v) = text("GRIDMON_LINGER_SECS") {
            match parse_secs(&v) {
                Some(d) => settings.linger = d,
                None => settings.issues.push(format!("GRIDMON_LINGER_SECS '{v}' is not a number")),
            }
        }
        if let Some(v) = text("GRIDMON_METRICS") {
            match parse_bool(&v) {
                Some(b) => settings.metrics_enabled = b,
                None => settings.issues.push(format!("GRIDMON_METRICS '{v}' is not a boolean")),
            }
        }
        if let Some(v) = text("GRIDMON_CLIENT_LOG_LEVEL") {
            match LogLevel::parse(&v) {
                Some(level) => settings.client_log_level = level,
                None => {
                    settings.issues.push(format!("GRIDMON_CLIENT_LOG_LEVEL '{v}' is not a level"))
                }
            }
        }

        settings.kubernetes = lookup("MY_KUBERNETES_ENABLED").unwrap_or_default();
        settings.host_ip = text("HOST_IP");
        settings.home = lookup("HOME");
        settings
    }

    /// Whether Kubernetes service DNS addressing is selected.
    pub fn kubernetes_enabled(&self) -> bool {
        self.kubernetes.trim().eq_ignore_ascii_case("true")
    }
}

fn parse_secs(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
