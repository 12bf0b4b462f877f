//! Map entry dump.
//!
//! Values in the target map are generic records, which this client cannot
//! decode without the cluster's schema service. Keys and values are printed
//! in degraded form: primitives as text, everything else as a placeholder.

use super::{emit, SEPARATOR};
use crate::client::ClusterClient;

use std::io::Write;

/// Service for dumping a map's entries.
pub struct GenericRecordFetcher;

impl GenericRecordFetcher {
    /// Print `<key>,<value>` for every entry of `map_name`.
    pub async fn run(
        client: &dyn ClusterClient,
        map_name: &str,
        out: &mut (dyn Write + Send),
    ) -> Option<usize> {
        emit(out, format_args!("{SEPARATOR}"));
        emit(out, format_args!("GenericRecord, map '{map_name}'"));

        let entries = match client.map_entries(map_name).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(map = map_name, category = e.category(), error = %e, "Reading map entries failed");
                return None;
            }
        };

        for (key, value) in &entries {
            emit(out, format_args!("{},{}", key.decode(), value.decode()));
        }
        emit(out, format_args!("[{} rows]", entries.len()));
        Some(entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Data;
    use crate::services::testing::FakeCluster;

    #[tokio::test]
    async fn test_prints_degraded_entries() {
        let mut record = vec![0, 0, 0, 0];
        record.extend_from_slice(&(-55i32).to_be_bytes());
        record.extend_from_slice(&[7; 10]);

        let mut cluster = FakeCluster::default();
        cluster.entries.insert(
            "__map-store.mysql_slf4j".into(),
            vec![(Data::from_long(1), Data::new(record)), (Data::from_string("k2"), Data::from_string("v2"))],
        );
        let mut buf = Vec::new();

        let count = GenericRecordFetcher::run(&cluster, "__map-store.mysql_slf4j", &mut buf).await;

        assert_eq!(count, Some(2));
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[1], "GenericRecord, map '__map-store.mysql_slf4j'");
        assert_eq!(lines[2], "1,<generic record, 10 bytes>");
        assert_eq!(lines[3], "k2,v2");
        assert_eq!(lines[4], "[2 rows]");
    }

    #[tokio::test]
    async fn test_failure_ends_step() {
        let cluster = FakeCluster::default();
        let mut buf = Vec::new();
        assert_eq!(GenericRecordFetcher::run(&cluster, "absent", &mut buf).await, None);
        assert_eq!(String::from_utf8(buf).unwrap().lines().count(), 2);
    }
}
