//! Report services.
//!
//! - `connection` - Connection configuration from deployment settings, and connect
//! - `query` - Run one SQL statement and print its rows
//! - `objects` - List user-visible distributed objects
//! - `generic_record` - Dump one map's entries in degraded form
//! - `report` - The fixed schedule tying the steps together
//!
//! Each step prints to the writer it is given and logs its own failures; a
//! failed step never stops the next one.

pub mod connection;
pub mod generic_record;
pub mod objects;
pub mod query;
pub mod report;

pub use connection::ConnectionService;
pub use generic_record::GenericRecordFetcher;
pub use objects::ObjectLister;
pub use query::QueryReporter;
pub use report::{Report, ReportSchedule};

use std::io::Write;

/// Line printed before every step.
pub const SEPARATOR: &str = "--------------------------------------";

/// Write one line of report output.
///
/// A closed stdout must not abort the report, so failures are only logged.
pub(crate) fn emit(out: &mut (dyn Write + Send), line: std::fmt::Arguments<'_>) {
    let result = out.write_fmt(line).and_then(|()| out.write_all(b"\n"));
    if let Err(e) = result {
        tracing::warn!(error = %e, "Failed to write report output");
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory cluster for service tests.

    use crate::client::{ClusterClient, RowCursor};
    use crate::error::{GridError, GridResult};
    use crate::models::{Data, DistributedObjectInfo, SqlColumnMetadata, SqlRow};

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Canned result of one statement.
    #[derive(Debug, Clone, Default)]
    pub struct FakeQuery {
        pub columns: Vec<SqlColumnMetadata>,
        pub rows: Vec<SqlRow>,
        /// Fail the fetch after this many rows
        pub fail_after: Option<usize>,
        /// Fail execution outright with this message
        pub execute_error: Option<String>,
    }

    #[derive(Debug, Default)]
    pub struct FakeCluster {
        pub queries: HashMap<String, FakeQuery>,
        pub objects: Option<Vec<DistributedObjectInfo>>,
        pub entries: HashMap<String, Vec<(Data, Data)>>,
        pub executed: Mutex<Vec<String>>,
        pub cursors_opened: Arc<AtomicUsize>,
        pub cursors_closed: Arc<AtomicUsize>,
        pub shut_down: AtomicBool,
    }

    impl FakeCluster {
        pub fn with_query(mut self, sql: &str, query: FakeQuery) -> Self {
            self.queries.insert(sql.to_string(), query);
            self
        }

        pub fn opened(&self) -> usize {
            self.cursors_opened.load(Ordering::SeqCst)
        }

        pub fn closed(&self) -> usize {
            self.cursors_closed.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ClusterClient for FakeCluster {
        async fn execute_sql(&self, sql: &str) -> GridResult<Box<dyn RowCursor>> {
            self.executed.lock().push(sql.to_string());
            let query = self
                .queries
                .get(sql)
                .cloned()
                .ok_or_else(|| GridError::sql(1008, format!("Object '{sql}' not found"), None))?;
            if let Some(message) = query.execute_error {
                return Err(GridError::sql(-1, message, None));
            }
            self.cursors_opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeCursor {
                columns: query.columns,
                rows: query.rows.into(),
                fail_after: query.fail_after,
                served: 0,
                closed: false,
                closes: self.cursors_closed.clone(),
            }))
        }

        async fn distributed_objects(&self) -> GridResult<Vec<DistributedObjectInfo>> {
            self.objects.clone().ok_or_else(|| GridError::connection("Connection to member closed"))
        }

        async fn map_entries(&self, name: &str) -> GridResult<Vec<(Data, Data)>> {
            self.entries.get(name).cloned().ok_or_else(|| {
                GridError::remote(-1, "com.hazelcast.nio.serialization.HazelcastSerializationException", "no schema")
            })
        }

        async fn shutdown(&self) {
            self.shut_down.store(true, Ordering::SeqCst);
        }
    }

    struct FakeCursor {
        columns: Vec<SqlColumnMetadata>,
        rows: VecDeque<SqlRow>,
        fail_after: Option<usize>,
        served: usize,
        closed: bool,
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RowCursor for FakeCursor {
        fn columns(&self) -> &[SqlColumnMetadata] {
            &self.columns
        }

        async fn next_row(&mut self) -> GridResult<Option<SqlRow>> {
            if self.fail_after == Some(self.served) {
                return Err(GridError::sql(-1, "Cursor fetch failed", None));
            }
            self.served += 1;
            Ok(self.rows.pop_front())
        }

        async fn close(&mut self) -> GridResult<()> {
            if !self.closed {
                self.closed = true;
                self.closes.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }
}
