//! Cluster client: connect, authenticate, keep the connection alive, and
//! serve the reporter's requests.

use super::connection::Connection;
use super::messages::{
    decode_authentication, decode_get_distributed_objects, decode_map_entry_set,
    decode_sql_execute, decode_sql_fetch, encode_authentication, encode_get_distributed_objects,
    encode_map_entry_set, encode_ping, encode_sql_close, encode_sql_execute, encode_sql_fetch,
    encode_statistics, AuthenticationRequest, AuthenticationStatus, SqlQueryId,
};
use super::{cloud, tls, ClusterClient, RowCursor};
use crate::error::{GridError, GridResult};
use crate::models::{
    Addressing, ClientConfig, Data, DistributedObjectInfo, MemberAddress, SqlColumnMetadata,
    SqlRow,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Client type announced to the cluster.
pub const CLIENT_TYPE: &str = "RST";

/// Client version announced to the cluster.
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Rows requested per page.
const CURSOR_BUFFER_SIZE: i32 = 4096;

struct Inner {
    config: ClientConfig,
    connection: Connection,
    client_uuid: Uuid,
    member_uuid: Uuid,
    connected_at: DateTime<Utc>,
    cancel: CancellationToken,
}

/// A connected cluster client.
#[derive(Clone)]
pub struct GridClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for GridClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GridClient")
            .field("cluster_name", &self.inner.config.cluster_name)
            .field("member", self.inner.connection.address())
            .field("member_uuid", &self.inner.member_uuid)
            .finish()
    }
}

impl GridClient {
    /// Connect to the cluster described by `config`.
    ///
    /// Every round resolves the member list and tries each member in turn.
    /// Between rounds the client backs off exponentially; once the cluster
    /// connect timeout has passed the last error is returned. Errors that a
    /// retry cannot fix (TLS material, rejected credentials) end the loop at
    /// once.
    pub async fn connect(config: ClientConfig) -> GridResult<Self> {
        let tls = match &config.addressing {
            Addressing::Cloud(cloud) => Some(tls::build_connector(&cloud.tls)?),
            _ => None,
        };
        let client_uuid = Uuid::new_v4();
        let retry = config.retry.clone();
        let deadline = Instant::now() + retry.cluster_connect_timeout;
        let mut backoff = retry.initial_backoff;
        let mut attempt = 0u32;

        tracing::info!(
            cluster = %config.cluster_name,
            addressing = config.addressing.kind(),
            client = %config.client_name,
            "Connecting to cluster"
        );

        loop {
            attempt += 1;
            let last_error = match Self::resolve_members(&config).await {
                Ok(members) => {
                    let mut last_error = None;
                    for member in &members {
                        match Self::try_connect(&config, member, tls.as_ref(), client_uuid).await {
                            Ok((connection, member_uuid)) => {
                                return Ok(Self::started(config, connection, client_uuid, member_uuid));
                            }
                            Err(e) if e.is_retryable() => {
                                tracing::warn!(member = %member, attempt, error = %e, "Member connect failed");
                                last_error = Some(e);
                            }
                            Err(e) => return Err(e),
                        }
                    }
                    last_error.unwrap_or_else(|| GridError::connection("No members to connect to"))
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(attempt, error = %e, "Member lookup failed");
                    e
                }
                Err(e) => return Err(e),
            };

            if Instant::now() + backoff > deadline {
                return Err(GridError::connection(format!(
                    "Unable to connect to cluster '{}' after {attempt} attempts: {last_error}",
                    config.cluster_name
                )));
            }
            tracing::info!(?backoff, attempt, "Retrying cluster connect");
            tokio::time::sleep(backoff).await;
            backoff = retry.next_backoff(backoff);
        }
    }

    async fn resolve_members(config: &ClientConfig) -> GridResult<Vec<MemberAddress>> {
        match &config.addressing {
            Addressing::Static(addresses) => addresses
                .iter()
                .map(|a| MemberAddress::parse(a).map_err(GridError::config))
                .collect(),
            Addressing::Dns(name) => Ok(vec![MemberAddress::parse(name).map_err(GridError::config)?]),
            Addressing::Cloud(cloud) => {
                cloud::discover(cloud, config.retry.socket_connect_timeout).await
            }
        }
    }

    async fn try_connect(
        config: &ClientConfig,
        member: &MemberAddress,
        tls: Option<&native_tls::TlsConnector>,
        client_uuid: Uuid,
    ) -> GridResult<(Connection, Uuid)> {
        let connection = Connection::open(
            member,
            tls,
            config.retry.socket_connect_timeout,
            config.invocation_timeout,
        )
        .await?;

        match Self::authenticate(config, &connection, client_uuid).await {
            Ok(member_uuid) => Ok((connection, member_uuid)),
            Err(e) => {
                connection.close();
                Err(e)
            }
        }
    }

    async fn authenticate(
        config: &ClientConfig,
        connection: &Connection,
        client_uuid: Uuid,
    ) -> GridResult<Uuid> {
        let request = AuthenticationRequest {
            cluster_name: &config.cluster_name,
            client_uuid,
            client_type: CLIENT_TYPE,
            client_version: CLIENT_VERSION,
            client_name: &config.client_name,
            labels: &config.labels,
        };
        let response = decode_authentication(&connection.invoke(encode_authentication(&request)).await?)?;

        match response.status {
            AuthenticationStatus::Authenticated => {
                let member_uuid = response
                    .member_uuid
                    .ok_or_else(|| GridError::protocol("Authenticated member sent no UUID"))?;
                tracing::info!(
                    member = %connection.address(),
                    %member_uuid,
                    partitions = response.partition_count,
                    "Authenticated with cluster"
                );
                Ok(member_uuid)
            }
            AuthenticationStatus::CredentialsFailed => Err(GridError::authentication_with_hint(
                format!("Cluster '{}' rejected the client", config.cluster_name),
                "Check the cluster name (the cluster id in cloud mode)",
            )),
            AuthenticationStatus::SerializationVersionMismatch => Err(GridError::authentication(
                "Serialization version mismatch with the cluster",
            )),
            AuthenticationStatus::NotAllowedInCluster => Err(GridError::authentication(
                "Client is not allowed in the cluster",
            )),
            AuthenticationStatus::Unknown(status) => Err(GridError::authentication(format!(
                "Unknown authentication status {status}"
            ))),
        }
    }

    fn started(
        config: ClientConfig,
        connection: Connection,
        client_uuid: Uuid,
        member_uuid: Uuid,
    ) -> Self {
        let client = Self {
            inner: Arc::new(Inner {
                config,
                connection,
                client_uuid,
                member_uuid,
                connected_at: Utc::now(),
                cancel: CancellationToken::new(),
            }),
        };

        tokio::spawn(Self::run_heartbeat(client.inner.clone()));
        if client.inner.config.metrics_enabled {
            tokio::spawn(Self::run_statistics(client.inner.clone()));
        }
        client
    }

    async fn run_heartbeat(inner: Arc<Inner>) {
        let mut ticker = tokio::time::interval(inner.config.heartbeat_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match inner.connection.invoke(encode_ping()).await {
                        Ok(_) => tracing::trace!("Heartbeat"),
                        Err(e) if e.is_connection_lost() => {
                            tracing::error!(error = %e, "Lost the cluster connection");
                            break;
                        }
                        Err(e) => tracing::warn!(error = %e, "Heartbeat failed"),
                    }
                }
                _ = inner.cancel.cancelled() => break,
            }
        }
    }

    async fn run_statistics(inner: Arc<Inner>) {
        let mut ticker = tokio::time::interval(inner.config.statistics_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = Utc::now();
                    let attributes = statistics_attributes(&inner, now);
                    let message = encode_statistics(now.timestamp_millis(), &attributes);
                    match inner.connection.invoke(message).await {
                        Ok(_) => tracing::trace!("Published client statistics"),
                        Err(e) if e.is_connection_lost() => break,
                        Err(e) => tracing::debug!(error = %e, "Statistics publication failed"),
                    }
                }
                _ = inner.cancel.cancelled() => break,
            }
        }
    }

    /// UUID the client registered under.
    pub fn client_uuid(&self) -> Uuid {
        self.inner.client_uuid
    }
}

/// Flat `key=value` statistics attributes.
fn statistics_attributes(inner: &Inner, now: DateTime<Utc>) -> String {
    [
        format!("lastStatisticsCollectionTime={}", now.timestamp_millis()),
        "enterprise=false".to_string(),
        format!("clientType={CLIENT_TYPE}"),
        format!("clientVersion={CLIENT_VERSION}"),
        format!("clusterConnectionTimestamp={}", inner.connected_at.timestamp_millis()),
        format!("clientAddress={}", inner.connection.address().host),
        format!("clientName={}", inner.config.client_name),
    ]
    .join(",")
}

#[async_trait]
impl ClusterClient for GridClient {
    async fn execute_sql(&self, sql: &str) -> GridResult<Box<dyn RowCursor>> {
        let query_id = SqlQueryId::new(self.inner.member_uuid);
        tracing::debug!(sql, "Executing SQL");
        let message = encode_sql_execute(sql, &query_id, CURSOR_BUFFER_SIZE);
        let response = decode_sql_execute(&self.inner.connection.invoke(message).await?)?;

        if let Some(error) = response.error {
            return Err(error.into());
        }

        // No row metadata: an update count, with no cursor held by the member.
        let Some(columns) = response.row_metadata else {
            return Ok(Box::new(SqlCursor::finished(self.inner.clone(), query_id)));
        };
        let page = response.row_page.unwrap_or_default();
        Ok(Box::new(SqlCursor {
            inner: self.inner.clone(),
            query_id,
            columns,
            buffer: page.rows.into(),
            last: page.last,
            closed: false,
        }))
    }

    async fn distributed_objects(&self) -> GridResult<Vec<DistributedObjectInfo>> {
        let response = self.inner.connection.invoke(encode_get_distributed_objects()).await?;
        decode_get_distributed_objects(&response)
    }

    async fn map_entries(&self, name: &str) -> GridResult<Vec<(Data, Data)>> {
        let response = self.inner.connection.invoke(encode_map_entry_set(name)).await?;
        decode_map_entry_set(&response)
    }

    async fn shutdown(&self) {
        tracing::info!(cluster = %self.inner.config.cluster_name, "Shutting down client");
        self.inner.cancel.cancel();
        self.inner.connection.close();
    }
}

/// Server-side query cursor, fetched page by page.
struct SqlCursor {
    inner: Arc<Inner>,
    query_id: SqlQueryId,
    columns: Vec<SqlColumnMetadata>,
    buffer: VecDeque<SqlRow>,
    last: bool,
    closed: bool,
}

impl SqlCursor {
    fn finished(inner: Arc<Inner>, query_id: SqlQueryId) -> Self {
        Self {
            inner,
            query_id,
            columns: Vec::new(),
            buffer: VecDeque::new(),
            last: true,
            closed: true,
        }
    }

    /// Whether the member still holds state for this query.
    fn open_on_member(&self) -> bool {
        !self.closed && !self.last
    }
}

#[async_trait]
impl RowCursor for SqlCursor {
    fn columns(&self) -> &[SqlColumnMetadata] {
        &self.columns
    }

    async fn next_row(&mut self) -> GridResult<Option<SqlRow>> {
        loop {
            if let Some(row) = self.buffer.pop_front() {
                return Ok(Some(row));
            }
            if self.last || self.closed {
                return Ok(None);
            }

            let message = encode_sql_fetch(&self.query_id, CURSOR_BUFFER_SIZE);
            let response = decode_sql_fetch(&self.inner.connection.invoke(message).await?)?;
            if let Some(error) = response.error {
                return Err(error.into());
            }
            match response.row_page {
                Some(page) => {
                    self.last = page.last;
                    self.buffer.extend(page.rows);
                }
                None => self.last = true,
            }
        }
    }

    async fn close(&mut self) -> GridResult<()> {
        let send_close = self.open_on_member();
        self.closed = true;
        self.buffer.clear();
        if send_close {
            self.inner.connection.invoke(encode_sql_close(&self.query_id)).await?;
        }
        Ok(())
    }
}

impl Drop for SqlCursor {
    fn drop(&mut self) {
        if !self.open_on_member() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let inner = self.inner.clone();
        let query_id = self.query_id;
        runtime.spawn(async move {
            if let Err(e) = inner.connection.invoke(encode_sql_close(&query_id)).await {
                tracing::debug!(error = %e, "Closing dropped cursor failed");
            }
        });
    }
}
