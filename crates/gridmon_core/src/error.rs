//! Error types for gridmon.
//!
//! A reporting tool only distinguishes a fatal connect failure from a
//! recoverable per-step failure, but the variants below keep enough detail
//! for the log line to say what went wrong and where to look.

use thiserror::Error;

/// Main error type for gridmon.
#[derive(Debug, Error)]
pub enum GridError {
    /// Cluster connection failed or was lost.
    #[error("Connection error: {message}")]
    Connection {
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The cluster rejected the client's authentication request.
    #[error("Authentication error: {message}")]
    Authentication {
        /// Human-readable error message.
        message: String,
        /// Actionable hint for the operator.
        hint: Option<String>,
    },

    /// TLS material could not be loaded or the handshake failed.
    #[error("TLS error: {message}")]
    Tls {
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Managed-cloud discovery failed.
    #[error("Discovery error: {message}")]
    Discovery {
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A message from the cluster could not be decoded.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Human-readable error message.
        message: String,
    },

    /// The cluster answered an invocation with an exception.
    #[error("{class_name}: {message}")]
    Remote {
        /// Protocol error code.
        code: i32,
        /// Server-side exception class.
        class_name: String,
        /// Server-side exception message.
        message: String,
    },

    /// SQL execution failed on the cluster.
    #[error("{message}")]
    Sql {
        /// SQL error code reported by the cluster.
        code: i32,
        /// Error message.
        message: String,
        /// Suggested fix offered by the SQL engine, if any.
        suggestion: Option<String>,
    },

    /// An invocation or connect attempt did not complete in time.
    #[error("Timeout: {message}")]
    Timeout {
        /// Human-readable error message.
        message: String,
    },

    /// Configuration is incomplete or invalid.
    #[error("Config error: {message}")]
    Config {
        /// Human-readable error message.
        message: String,
    },

    /// Unexpected internal error.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
    },
}

/// Convenience alias used across the crate.
pub type GridResult<T> = Result<T, GridError>;

impl GridError {
    // ========== Constructors ==========

    /// Create a new connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), source: None }
    }

    /// Create a new connection error with source.
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection { message: message.into(), source: Some(Box::new(source)) }
    }

    /// Create a new authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
            hint: Some("Check the cluster name and client credentials".to_string()),
        }
    }

    /// Create a new authentication error with custom hint.
    pub fn authentication_with_hint(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::Authentication { message: message.into(), hint: Some(hint.into()) }
    }

    /// Create a new TLS error.
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls { message: message.into(), source: None }
    }

    /// Create a new TLS error with source.
    pub fn tls_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Tls { message: message.into(), source: Some(Box::new(source)) }
    }

    /// Create a new discovery error.
    pub fn discovery(message: impl Into<String>) -> Self {
        Self::Discovery { message: message.into(), source: None }
    }

    /// Create a new protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol { message: message.into() }
    }

    /// Create a remote exception error.
    pub fn remote(code: i32, class_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote { code, class_name: class_name.into(), message: message.into() }
    }

    /// Create a SQL error.
    pub fn sql(code: i32, message: impl Into<String>, suggestion: Option<String>) -> Self {
        Self::Sql { code, message: message.into(), suggestion }
    }

    /// Create a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout { message: message.into() }
    }

    /// Create a new config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create a new internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    // ========== Methods ==========

    /// Check if this error means the connection to the cluster is gone.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// Check if retrying the same operation may succeed.
    ///
    /// Used by the connect loop: authentication and configuration problems
    /// will not fix themselves.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. } | Self::Discovery { .. })
    }

    /// Get the error category name.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "Connection",
            Self::Authentication { .. } => "Authentication",
            Self::Tls { .. } => "TLS",
            Self::Discovery { .. } => "Discovery",
            Self::Protocol { .. } => "Protocol",
            Self::Remote { .. } => "Remote",
            Self::Sql { .. } => "SQL",
            Self::Timeout { .. } => "Timeout",
            Self::Config { .. } => "Config",
            Self::Internal { .. } => "Internal",
        }
    }

    /// Get actionable hint for the operator.
    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::Connection { .. } => Some("Check that the cluster members are reachable"),
            Self::Authentication { hint, .. } => hint.as_deref(),
            Self::Tls { .. } => Some("Verify the CA, certificate and key files and the key password"),
            Self::Discovery { .. } => Some("Check the discovery token and cloud URL"),
            Self::Protocol { .. } => Some("The cluster version may not be supported"),
            Self::Remote { .. } => None,
            Self::Sql { suggestion, .. } => suggestion.as_deref(),
            Self::Timeout { .. } => None,
            Self::Config { .. } => None,
            Self::Internal { .. } => Some("Please report this issue"),
        }
    }
}

// ========== Error Conversions ==========

/// Convert from std::io::Error to GridError.
impl From<std::io::Error> for GridError {
    fn from(err: std::io::Error) -> Self {
        GridError::Connection { message: err.to_string(), source: Some(Box::new(err)) }
    }
}

/// Convert from serde_json::Error to GridError.
impl From<serde_json::Error> for GridError {
    fn from(err: serde_json::Error) -> Self {
        GridError::Discovery {
            message: format!("JSON error: {err}"),
            source: Some(Box::new(err)),
        }
    }
}

/// Convert from reqwest::Error to GridError.
impl From<reqwest::Error> for GridError {
    fn from(err: reqwest::Error) -> Self {
        GridError::Discovery { message: err.to_string(), source: Some(Box::new(err)) }
    }
}

/// Convert from native_tls::Error to GridError.
impl From<native_tls::Error> for GridError {
    fn from(err: native_tls::Error) -> Self {
        GridError::Tls { message: err.to_string(), source: Some(Box::new(err)) }
    }
}

/// Convert from openssl::error::ErrorStack to GridError.
impl From<openssl::error::ErrorStack> for GridError {
    fn from(err: openssl::error::ErrorStack) -> Self {
        GridError::Tls { message: err.to_string(), source: Some(Box::new(err)) }
    }
}
