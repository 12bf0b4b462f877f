//! Cluster connection configuration models.

use super::settings::LogLevel;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default member port.
pub const DEFAULT_PORT: u16 = 5701;

/// A member address: host name or IP plus port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberAddress {
    /// Host name or IP literal (IPv6 without brackets)
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl MemberAddress {
    /// Create a new address.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }

    /// Parse `host`, `host:port`, `[v6]` or `[v6]:port`.
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("Address is empty".to_string());
        }

        if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) =
                rest.split_once(']').ok_or_else(|| format!("Unterminated IPv6 address '{s}'"))?;
            let port = match tail.strip_prefix(':') {
                Some(port) => parse_port(port, s)?,
                None if tail.is_empty() => DEFAULT_PORT,
                None => return Err(format!("Invalid address '{s}'")),
            };
            return Ok(Self::new(host, port));
        }

        match s.rsplit_once(':') {
            // More than one colon without brackets is a bare IPv6 literal.
            Some((host, _)) if host.contains(':') => Ok(Self::new(s, DEFAULT_PORT)),
            Some((host, port)) => Ok(Self::new(host, parse_port(port, s)?)),
            None => Ok(Self::new(s, DEFAULT_PORT)),
        }
    }
}

fn parse_port(port: &str, address: &str) -> Result<u16, String> {
    port.parse::<u16>().map_err(|_| format!("Invalid port in address '{address}'"))
}

impl fmt::Display for MemberAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// TLS material for mutual TLS.
#[derive(Clone)]
pub struct TlsMaterial {
    /// CA certificate (PEM), the only trusted root
    pub ca_file: PathBuf,
    /// Client certificate (PEM)
    pub cert_file: PathBuf,
    /// Client private key (PEM, possibly encrypted)
    pub key_file: PathBuf,
    /// Passphrase of the private key
    pub key_password: String,
}

impl fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("ca_file", &self.ca_file)
            .field("cert_file", &self.cert_file)
            .field("key_file", &self.key_file)
            .field("key_password", &"<redacted>")
            .finish()
    }
}

/// Managed-cloud addressing.
#[derive(Clone)]
pub struct CloudConfig {
    /// Discovery token
    pub discovery_token: String,
    /// Host (or full base URL) of the discovery service
    pub url_base: String,
    /// Mutual TLS material
    pub tls: TlsMaterial,
}

impl fmt::Debug for CloudConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudConfig")
            .field("discovery_token", &"<redacted>")
            .field("url_base", &self.url_base)
            .field("tls", &self.tls)
            .finish()
    }
}

/// How the client finds cluster members.
#[derive(Debug, Clone)]
pub enum Addressing {
    /// Fixed list of member addresses
    Static(Vec<String>),
    /// A DNS name resolving to members (Kubernetes service)
    Dns(String),
    /// Hosted discovery service plus mutual TLS
    Cloud(CloudConfig),
}

impl Addressing {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Static(_) => "static",
            Self::Dns(_) => "dns",
            Self::Cloud(_) => "cloud",
        }
    }

    /// Check if this is managed-cloud addressing.
    pub fn is_cloud(&self) -> bool {
        matches!(self, Self::Cloud(_))
    }
}

/// Connect retry policy.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Wait after the first failed round
    pub initial_backoff: Duration,
    /// Upper bound on the wait between rounds
    pub max_backoff: Duration,
    /// Growth factor between rounds
    pub multiplier: f64,
    /// Give up once this much time has passed
    pub cluster_connect_timeout: Duration,
    /// Timeout of a single TCP (and TLS) connect
    pub socket_connect_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            multiplier: 1.05,
            cluster_connect_timeout: Duration::from_secs(120),
            socket_connect_timeout: Duration::from_secs(5),
        }
    }
}

impl RetryConfig {
    /// Backoff to use after `current`.
    pub fn next_backoff(&self, current: Duration) -> Duration {
        let next = current.mul_f64(self.multiplier.max(1.0));
        next.min(self.max_backoff)
    }
}

/// Configuration consumed by the connect call.
///
/// Only obtainable through [`ClientConfigBuilder::build`], so a connect
/// attempt always sees a complete, validated configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Cluster name (cluster id in cloud mode)
    pub cluster_name: String,
    /// Name the client registers under
    pub client_name: String,
    /// Labels shown by management tooling
    pub labels: Vec<String>,
    /// Member addressing
    pub addressing: Addressing,
    /// Log level of the client module
    pub log_level: LogLevel,
    /// Whether client statistics are published
    pub metrics_enabled: bool,
    /// Connect retry policy
    pub retry: RetryConfig,
    /// Interval between heartbeat pings
    pub heartbeat_interval: Duration,
    /// Interval between statistics publications
    pub statistics_period: Duration,
    /// Timeout of a single invocation
    pub invocation_timeout: Duration,
}

impl ClientConfig {
    /// Create a builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.cluster_name.trim().is_empty() {
            return Err("Cluster name is required".to_string());
        }
        if self.client_name.trim().is_empty() {
            return Err("Client name is required".to_string());
        }
        match &self.addressing {
            Addressing::Static(addresses) => {
                if addresses.is_empty() {
                    return Err("At least one member address is required".to_string());
                }
                for address in addresses {
                    MemberAddress::parse(address)?;
                }
            }
            Addressing::Dns(name) => {
                MemberAddress::parse(name)?;
            }
            Addressing::Cloud(cloud) => {
                if cloud.discovery_token.trim().is_empty() {
                    return Err("Discovery token is required for cloud addressing".to_string());
                }
                if cloud.url_base.trim().is_empty() {
                    return Err("Discovery URL is required for cloud addressing".to_string());
                }
            }
        }
        if self.heartbeat_interval.is_zero() || self.statistics_period.is_zero() {
            return Err("Heartbeat and statistics periods must be positive".to_string());
        }
        Ok(())
    }
}

/// Builder for ClientConfig.
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    cluster_name: Option<String>,
    client_name: Option<String>,
    labels: Vec<String>,
    addressing: Option<Addressing>,
    log_level: LogLevel,
    metrics_enabled: bool,
    retry: Option<RetryConfig>,
    heartbeat_interval: Option<Duration>,
    statistics_period: Option<Duration>,
    invocation_timeout: Option<Duration>,
}

impl ClientConfigBuilder {
    /// Set the cluster name.
    pub fn cluster_name(mut self, name: impl Into<String>) -> Self {
        self.cluster_name = Some(name.into());
        self
    }

    /// Set the client name.
    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = Some(name.into());
        self
    }

    /// Add a label.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    /// Set the addressing mode.
    pub fn addressing(mut self, addressing: Addressing) -> Self {
        self.addressing = Some(addressing);
        self
    }

    /// Set the client log level.
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Enable or disable statistics publishing.
    pub fn metrics_enabled(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }

    /// Set the retry policy.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Set the heartbeat interval.
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    /// Set the invocation timeout.
    pub fn invocation_timeout(mut self, timeout: Duration) -> Self {
        self.invocation_timeout = Some(timeout);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<ClientConfig, String> {
        let config = ClientConfig {
            cluster_name: self.cluster_name.ok_or("Cluster name is required")?,
            client_name: self.client_name.ok_or("Client name is required")?,
            labels: self.labels,
            addressing: self.addressing.ok_or("Addressing is required")?,
            log_level: self.log_level,
            metrics_enabled: self.metrics_enabled,
            retry: self.retry.unwrap_or_default(),
            heartbeat_interval: self.heartbeat_interval.unwrap_or(Duration::from_secs(5)),
            statistics_period: self.statistics_period.unwrap_or(Duration::from_secs(5)),
            invocation_timeout: self.invocation_timeout.unwrap_or(Duration::from_secs(120)),
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_member_addresses() {
        assert_eq!(MemberAddress::parse("10.0.0.1").unwrap(), MemberAddress::new("10.0.0.1", 5701));
        assert_eq!(
            MemberAddress::parse("grid.default.svc:5702").unwrap(),
            MemberAddress::new("grid.default.svc", 5702)
        );
        assert_eq!(MemberAddress::parse("[::1]:5703").unwrap(), MemberAddress::new("::1", 5703));
        assert_eq!(MemberAddress::parse("[::1]").unwrap(), MemberAddress::new("::1", 5701));
        assert_eq!(MemberAddress::parse("fe80::1").unwrap(), MemberAddress::new("fe80::1", 5701));
        assert!(MemberAddress::parse("").is_err());
        assert!(MemberAddress::parse("host:notaport").is_err());
    }

    #[test]
    fn test_member_address_display() {
        assert_eq!(MemberAddress::new("10.0.0.1", 5701).to_string(), "10.0.0.1:5701");
        assert_eq!(MemberAddress::new("::1", 5701).to_string(), "[::1]:5701");
    }

    #[test]
    fn test_backoff_grows_to_cap() {
        let retry = RetryConfig {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(2),
            multiplier: 1.5,
            ..RetryConfig::default()
        };
        let second = retry.next_backoff(retry.initial_backoff);
        assert_eq!(second, Duration::from_millis(1500));
        assert_eq!(retry.next_backoff(second), Duration::from_secs(2));
    }

    #[test]
    fn test_builder_requires_addressing() {
        let result = ClientConfig::builder().cluster_name("dev").client_name("c").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_rejects_empty_static_list() {
        let result = ClientConfig::builder()
            .cluster_name("dev")
            .client_name("c")
            .addressing(Addressing::Static(Vec::new()))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_rejects_cloud_without_token() {
        let cloud = CloudConfig {
            discovery_token: String::new(),
            url_base: "api.example.com".into(),
            tls: TlsMaterial {
                ca_file: "/tmp/ca.pem".into(),
                cert_file: "/tmp/cert.pem".into(),
                key_file: "/tmp/key.pem".into(),
                key_password: "secret".into(),
            },
        };
        let result = ClientConfig::builder()
            .cluster_name("id")
            .client_name("c")
            .addressing(Addressing::Cloud(cloud))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_defaults() {
        let config = ClientConfig::builder()
            .cluster_name("dev")
            .client_name("gridmon")
            .label("user")
            .addressing(Addressing::Dns("grid.svc".into()))
            .metrics_enabled(true)
            .build()
            .unwrap();
        assert_eq!(config.labels, vec!["user".to_string()]);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(config.addressing.kind(), "dns");
        assert!(config.metrics_enabled);
    }
}
