//! Cluster client.
//!
//! A minimal implementation of the cluster's binary client protocol, limited
//! to what the reporter needs: authentication, heartbeats, client
//! statistics, SQL execute/fetch/close, distributed object enumeration and
//! map entry sets, plus managed-cloud discovery over mutual TLS.
//!
//! The services only see the [`ClusterClient`] and [`RowCursor`] traits.

pub mod cloud;
pub mod codec;
pub mod connection;
pub mod frame;
pub mod grid;
pub mod messages;
pub mod tls;

pub use connection::Connection;
pub use grid::GridClient;

use crate::error::GridResult;
use crate::models::{Data, DistributedObjectInfo, SqlColumnMetadata, SqlRow};

use async_trait::async_trait;

/// Operations the report steps run against a connected cluster.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Execute a SQL statement and return a cursor over its rows.
    async fn execute_sql(&self, sql: &str) -> GridResult<Box<dyn RowCursor>>;

    /// List every distributed object in the cluster, system ones included.
    async fn distributed_objects(&self) -> GridResult<Vec<DistributedObjectInfo>>;

    /// Fetch every entry of a map in serialized form.
    async fn map_entries(&self, name: &str) -> GridResult<Vec<(Data, Data)>>;

    /// Stop background tasks and close the connection.
    async fn shutdown(&self);
}

/// Lazily fetched query result.
///
/// Callers must call [`RowCursor::close`] when done, on every exit path.
#[async_trait]
pub trait RowCursor: Send {
    /// Column metadata, in row order.
    fn columns(&self) -> &[SqlColumnMetadata];

    /// Next row, fetching another page when the current one is exhausted.
    async fn next_row(&mut self) -> GridResult<Option<SqlRow>>;

    /// Release the cursor on the member. Idempotent.
    async fn close(&mut self) -> GridResult<()>;
}
