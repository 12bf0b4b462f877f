//! Distributed object descriptors.

/// Name prefix the cluster reserves for internal objects.
pub const SYSTEM_PREFIX: &str = "__";

/// A named structure hosted by the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributedObjectInfo {
    /// Owning service, e.g. `hz:impl:mapService`
    pub service_name: String,
    /// Object name
    pub name: String,
}

impl DistributedObjectInfo {
    /// Create a descriptor.
    pub fn new(service_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self { service_name: service_name.into(), name: name.into() }
    }

    /// Check if this is an internal object.
    pub fn is_system(&self) -> bool {
        self.name.starts_with(SYSTEM_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prefix() {
        assert!(DistributedObjectInfo::new("hz:impl:mapService", "__sql.catalog").is_system());
        assert!(DistributedObjectInfo::new("hz:impl:mapService", "__").is_system());
        assert!(!DistributedObjectInfo::new("hz:impl:mapService", "_single").is_system());
        assert!(!DistributedObjectInfo::new("hz:impl:mapService", "").is_system());
        assert!(!DistributedObjectInfo::new("hz:impl:mapService", "trades__").is_system());
    }
}
