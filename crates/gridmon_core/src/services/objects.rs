//! Distributed object listing (excluding system objects).

use super::{emit, SEPARATOR};
use crate::client::ClusterClient;

use std::io::Write;

/// Service for listing user-visible distributed objects.
pub struct ObjectLister;

impl ObjectLister {
    /// Print every distributed object whose name lacks the system prefix.
    ///
    /// Returns the number printed, or `None` if enumeration failed.
    pub async fn run(client: &dyn ClusterClient, out: &mut (dyn Write + Send)) -> Option<usize> {
        emit(out, format_args!("{SEPARATOR}"));
        emit(out, format_args!("Distributed Objects (excluding system objects)"));

        let objects = match client.distributed_objects().await {
            Ok(objects) => objects,
            Err(e) => {
                tracing::warn!(category = e.category(), error = %e, "Listing distributed objects failed");
                return None;
            }
        };

        let total = objects.len();
        let mut count = 0;
        for object in objects.iter().filter(|o| !o.is_system()) {
            emit(out, format_args!("{} => '{}'", object.service_name, object.name));
            count += 1;
        }
        emit(out, format_args!("[{count} rows]"));
        tracing::debug!(total, listed = count, "Listed distributed objects");
        Some(count)
    }
}
