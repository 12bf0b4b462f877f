//! Core of gridmon, a reporting client for an in-memory data grid.
//!
//! This crate provides everything the `gridmon` binary runs:
//!
//! - **error**: Error handling with operator hints
//! - **models**: Settings, connection configuration, SQL rows, map values
//! - **client**: Cluster client speaking the grid's binary protocol
//! - **services**: Connection setup and the report steps
//! - **logging**: Structured logging setup

pub mod client;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;

pub use client::{ClusterClient, GridClient, RowCursor};
pub use error::{GridError, GridResult};
pub use models::{
    Addressing, ClientConfig, Data, DistributedObjectInfo, LogLevel, RecordValue, Settings,
    SqlColumnMetadata, SqlColumnType, SqlRow, SqlValue,
};
pub use services::{
    ConnectionService, GenericRecordFetcher, ObjectLister, QueryReporter, Report, ReportSchedule,
};
