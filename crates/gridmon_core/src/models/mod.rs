//! Data models for gridmon.
//!
//! This module contains the transient data structures of a report run:
//! - `settings` - Deployment settings, log level, control file
//! - `connection` - ClientConfig, Addressing, MemberAddress, RetryConfig
//! - `sql` - Column metadata and typed row values
//! - `object` - Distributed object descriptors
//! - `record` - Serialized map keys/values and their degraded decoding

pub mod connection;
pub mod object;
pub mod record;
pub mod settings;
pub mod sql;

pub use connection::{
    Addressing, ClientConfig, ClientConfigBuilder, CloudConfig, MemberAddress, RetryConfig,
    TlsMaterial,
};
pub use object::DistributedObjectInfo;
pub use record::{Data, RecordValue};
pub use settings::{CloudSettings, ControlFile, LogLevel, Settings};
pub use sql::{SqlColumnMetadata, SqlColumnType, SqlRow, SqlValue};
