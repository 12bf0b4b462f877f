//! Query reporting.
//!
//! Runs one statement, prints each row as space-separated values rendered
//! by declared column type, then the row count. Execution and fetch
//! failures are logged and printed; the cursor is closed on every path.

use super::{emit, SEPARATOR};
use crate::client::{ClusterClient, RowCursor};
use crate::error::GridResult;
use crate::models::{SqlColumnMetadata, SqlColumnType, SqlRow, SqlValue};

use chrono::{NaiveDateTime, SecondsFormat};
use std::io::Write;

/// Text printed for SQL NULL.
pub const NULL_TEXT: &str = "NULL";

/// Service for printing query results.
pub struct QueryReporter;

impl QueryReporter {
    /// Execute `sql` and print its rows.
    ///
    /// Returns the number of rows printed, or `None` if the query failed.
    pub async fn run(
        client: &dyn ClusterClient,
        sql: &str,
        out: &mut (dyn Write + Send),
    ) -> Option<usize> {
        emit(out, format_args!("{SEPARATOR}"));
        emit(out, format_args!("{sql}"));

        let mut cursor = match client.execute_sql(sql).await {
            Ok(cursor) => cursor,
            Err(e) => {
                tracing::warn!(sql, category = e.category(), error = %e, "Query failed");
                emit(out, format_args!("{e}"));
                return None;
            }
        };

        let printed = Self::print_rows(cursor.as_mut(), out).await;
        if let Err(e) = cursor.close().await {
            tracing::warn!(sql, error = %e, "Failed to close cursor");
        }

        match printed {
            Ok(count) => {
                emit(out, format_args!("[{count} rows]"));
                tracing::debug!(sql, rows = count, "Query complete");
                Some(count)
            }
            Err(e) => {
                tracing::warn!(sql, category = e.category(), error = %e, "Fetching rows failed");
                emit(out, format_args!("{e}"));
                None
            }
        }
    }

    async fn print_rows(
        cursor: &mut dyn RowCursor,
        out: &mut (dyn Write + Send),
    ) -> GridResult<usize> {
        let columns = cursor.columns().to_vec();
        let mut count = 0;
        while let Some(row) = cursor.next_row().await? {
            emit(out, format_args!("{}", render_row(&columns, &row)));
            count += 1;
        }
        Ok(count)
    }
}

/// Render a row as space-separated values.
pub fn render_row(columns: &[SqlColumnMetadata], row: &SqlRow) -> String {
    columns
        .iter()
        .enumerate()
        .map(|(i, column)| render_value(column, row.get(i).unwrap_or(&SqlValue::Null)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render one value according to its column's declared type.
pub fn render_value(column: &SqlColumnMetadata, value: &SqlValue) -> String {
    match (column.column_type, value) {
        (SqlColumnType::Varchar, SqlValue::Varchar(text)) => text.clone(),
        (SqlColumnType::BigInt, SqlValue::BigInt(n)) => n.to_string(),
        (SqlColumnType::Timestamp, SqlValue::Timestamp(ts)) => format_timestamp(ts),
        (SqlColumnType::Varchar | SqlColumnType::BigInt | SqlColumnType::Timestamp, SqlValue::Null) => {
            NULL_TEXT.to_string()
        }
        (declared, _) => format!("Unhandled Type {declared} for Column '{}'", column.name),
    }
}

/// Format a zone-less timestamp as RFC3339, treating it as UTC.
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.and_utc().to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{FakeCluster, FakeQuery};
    use chrono::NaiveDate;

    fn ts(h: u32, m: u32, s: u32, milli: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap().and_hms_milli_opt(h, m, s, milli).unwrap()
    }

    fn mapping_query() -> FakeQuery {
        FakeQuery {
            columns: vec![
                SqlColumnMetadata::new("name", SqlColumnType::Varchar),
                SqlColumnMetadata::new("size", SqlColumnType::BigInt),
                SqlColumnMetadata::new("updated", SqlColumnType::Timestamp),
            ],
            rows: vec![
                SqlRow::new(vec![
                    SqlValue::Varchar("trades".into()),
                    SqlValue::BigInt(42),
                    SqlValue::Timestamp(ts(10, 30, 5, 0)),
                ]),
                SqlRow::new(vec![SqlValue::Varchar("audit".into()), SqlValue::Null, SqlValue::Null]),
            ],
            ..FakeQuery::default()
        }
    }

    fn output(buf: &[u8]) -> Vec<String> {
        String::from_utf8(buf.to_vec()).unwrap().lines().map(str::to_string).collect()
    }

    #[test]
    fn test_format_timestamp_rfc3339() {
        assert_eq!(format_timestamp(&ts(10, 30, 5, 0)), "2024-03-15T10:30:05Z");
        assert_eq!(format_timestamp(&ts(23, 59, 59, 250)), "2024-03-15T23:59:59.250Z");
    }

    #[test]
    fn test_render_unhandled_type() {
        let column = SqlColumnMetadata::new("amount", SqlColumnType::Decimal);
        assert_eq!(
            render_value(&column, &SqlValue::Unsupported),
            "Unhandled Type DECIMAL for Column 'amount'"
        );
        assert_eq!(
            render_value(&column, &SqlValue::Null),
            "Unhandled Type DECIMAL for Column 'amount'"
        );
    }

    #[tokio::test]
    async fn test_prints_rows_and_count() {
        let cluster = FakeCluster::default().with_query("SHOW MAPPINGS", mapping_query());
        let mut buf = Vec::new();

        let rows = QueryReporter::run(&cluster, "SHOW MAPPINGS", &mut buf).await;

        assert_eq!(rows, Some(2));
        assert_eq!(
            output(&buf),
            vec![
                SEPARATOR,
                "SHOW MAPPINGS",
                "trades 42 2024-03-15T10:30:05Z",
                "audit NULL NULL",
                "[2 rows]",
            ]
        );
        assert_eq!(cluster.closed(), 1);
    }

    #[tokio::test]
    async fn test_zero_rows() {
        let query = FakeQuery {
            columns: vec![SqlColumnMetadata::new("name", SqlColumnType::Varchar)],
            ..FakeQuery::default()
        };
        let cluster = FakeCluster::default().with_query("SHOW VIEWS", query);
        let mut buf = Vec::new();

        let rows = QueryReporter::run(&cluster, "SHOW VIEWS", &mut buf).await;

        assert_eq!(rows, Some(0));
        assert_eq!(output(&buf), vec![SEPARATOR, "SHOW VIEWS", "[0 rows]"]);
        assert_eq!(cluster.closed(), 1);
    }

    #[tokio::test]
    async fn test_execute_error_is_printed() {
        let cluster = FakeCluster::default();
        let mut buf = Vec::new();

        let rows = QueryReporter::run(&cluster, "SELECT * FROM \"missing\"", &mut buf).await;

        assert_eq!(rows, None);
        let lines = output(&buf);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2], "Object 'SELECT * FROM \"missing\"' not found");
        assert_eq!(cluster.opened(), 0);
    }

    #[tokio::test]
    async fn test_cursor_closed_after_fetch_error() {
        let query = FakeQuery { fail_after: Some(1), ..mapping_query() };
        let cluster = FakeCluster::default().with_query("SHOW MAPPINGS", query);
        let mut buf = Vec::new();

        let rows = QueryReporter::run(&cluster, "SHOW MAPPINGS", &mut buf).await;

        assert_eq!(rows, None);
        let lines = output(&buf);
        assert_eq!(lines[2], "trades 42 2024-03-15T10:30:05Z");
        assert_eq!(lines.last().unwrap(), "Cursor fetch failed");
        assert_eq!(cluster.opened(), 1);
        assert_eq!(cluster.closed(), 1);
    }
}
