//! Discovery endpoint settings.

/// Where the endpoint listens and what it announces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoverySettings {
    /// Name returned as `serviceName`
    pub service_name: String,
    /// Path the endpoint is registered on
    pub path: String,
    /// Socket address to bind
    pub bind: String,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            service_name: "gridmon".to_string(),
            path: "/".to_string(),
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

impl DiscoverySettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Populate settings from an arbitrary key lookup. Blank values keep the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();
        let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = text("DISCOVERY_SERVICE_NAME") {
            settings.service_name = v;
        }
        if let Some(v) = text("DISCOVERY_PATH") {
            settings.path = if v.starts_with('/') { v } else { format!("/{v}") };
        }
        if let Some(v) = text("DISCOVERY_BIND") {
            settings.bind = v;
        }
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let settings = DiscoverySettings::from_lookup(|_| None);
        assert_eq!(settings, DiscoverySettings::default());
        assert_eq!(settings.path, "/");
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("DISCOVERY_SERVICE_NAME", "grid-monitor"),
            ("DISCOVERY_PATH", "discovery"),
            ("DISCOVERY_BIND", "127.0.0.1:9000"),
        ]);
        let settings = DiscoverySettings::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(settings.service_name, "grid-monitor");
        assert_eq!(settings.path, "/discovery");
        assert_eq!(settings.bind, "127.0.0.1:9000");
    }

    #[test]
    fn test_blank_values_keep_defaults() {
        let settings = DiscoverySettings::from_lookup(|_| Some("  ".to_string()));
        assert_eq!(settings, DiscoverySettings::default());
    }
}
