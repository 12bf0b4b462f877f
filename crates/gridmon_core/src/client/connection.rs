//! A single member connection.
//!
//! Outbound messages go through a channel to a writer task; a reader task
//! routes responses back to the waiting invocation by correlation id. Both
//! tasks stop when the connection's cancellation token fires, and every
//! invocation still waiting then fails with a connection error.

use super::frame::{ClientMessage, ClientMessageCodec, PROTOCOL_HEADER};
use super::messages::{decode_exception, EXCEPTION};
use crate::error::{GridError, GridResult};
use crate::models::MemberAddress;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

type Pending = Arc<Mutex<HashMap<i64, oneshot::Sender<GridResult<ClientMessage>>>>>;

/// Anything a connection can run over: plain TCP, TLS, or an in-memory pipe.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + 'static> Transport for T {}

/// An open, authenticated-or-not connection to one member.
pub struct Connection {
    address: MemberAddress,
    outbound: mpsc::UnboundedSender<ClientMessage>,
    pending: Pending,
    next_correlation_id: AtomicI64,
    cancel: CancellationToken,
    invocation_timeout: Duration,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("address", &self.address)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Connection {
    /// Open a TCP (optionally TLS) connection to a member.
    pub async fn open(
        address: &MemberAddress,
        tls: Option<&native_tls::TlsConnector>,
        connect_timeout: Duration,
        invocation_timeout: Duration,
    ) -> GridResult<Self> {
        let target = (address.host.as_str(), address.port);
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(target))
            .await
            .map_err(|_| GridError::timeout(format!("Connecting to {address} timed out")))?
            .map_err(|e| GridError::connection_with_source(format!("Failed to connect to {address}"), e))?;
        stream.set_nodelay(true)?;

        match tls {
            Some(connector) => {
                let connector = tokio_native_tls::TlsConnector::from(connector.clone());
                let stream = tokio::time::timeout(connect_timeout, connector.connect(&address.host, stream))
                    .await
                    .map_err(|_| GridError::timeout(format!("TLS handshake with {address} timed out")))?
                    .map_err(|e| {
                        GridError::tls_with_source(format!("TLS handshake with {address} failed"), e)
                    })?;
                Self::start(stream, address.clone(), invocation_timeout).await
            }
            None => Self::start(stream, address.clone(), invocation_timeout).await,
        }
    }

    /// Send the protocol header over an established stream and start the I/O tasks.
    pub async fn start<S: Transport>(
        mut stream: S,
        address: MemberAddress,
        invocation_timeout: Duration,
    ) -> GridResult<Self> {
        stream.write_all(PROTOCOL_HEADER).await?;
        stream.flush().await?;

        let (sink, source) = Framed::new(stream, ClientMessageCodec::default()).split();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let cancel = CancellationToken::new();

        tokio::spawn(Self::run_writer(sink, outbound_rx, address.clone(), cancel.clone()));
        tokio::spawn(Self::run_reader(source, pending.clone(), address.clone(), cancel.clone()));

        tracing::info!(member = %address, "Opened member connection");
        Ok(Self {
            address,
            outbound,
            pending,
            next_correlation_id: AtomicI64::new(1),
            cancel,
            invocation_timeout,
        })
    }

    /// Member address.
    pub fn address(&self) -> &MemberAddress {
        &self.address
    }

    /// Check if the connection has been closed by either side.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Send a request and wait for its response.
    ///
    /// Exception responses are returned as errors.
    pub async fn invoke(&self, mut message: ClientMessage) -> GridResult<ClientMessage> {
        let correlation_id = self.next_correlation_id.fetch_add(1, Ordering::Relaxed);
        message.set_correlation_id(correlation_id)?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(correlation_id, tx);

        // The reader cancels before failing pending invocations, so a closed
        // connection is always seen here or by the reader.
        if self.is_closed() || self.outbound.send(message).is_err() {
            self.pending.lock().remove(&correlation_id);
            return Err(GridError::connection(format!("Connection to {} is closed", self.address)));
        }

        match tokio::time::timeout(self.invocation_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                Err(GridError::connection(format!("Connection to {} closed", self.address)))
            }
            Err(_) => {
                self.pending.lock().remove(&correlation_id);
                Err(GridError::timeout(format!(
                    "No response from {} within {:?}",
                    self.address, self.invocation_timeout
                )))
            }
        }
    }

    /// Close the connection and stop its tasks.
    pub fn close(&self) {
        if !self.cancel.is_cancelled() {
            tracing::info!(member = %self.address, "Closing member connection");
            self.cancel.cancel();
        }
    }

    async fn run_writer<W>(
        mut sink: W,
        mut outbound: mpsc::UnboundedReceiver<ClientMessage>,
        address: MemberAddress,
        cancel: CancellationToken,
    ) where
        W: futures_util::Sink<ClientMessage, Error = GridError> + Unpin,
    {
        loop {
            tokio::select! {
                message = outbound.recv() => {
                    let Some(message) = message else { break };
                    if let Err(e) = sink.send(message).await {
                        tracing::warn!(member = %address, error = %e, "Write failed");
                        cancel.cancel();
                        break;
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
        let _ = sink.close().await;
    }

    async fn run_reader<R>(
        mut source: R,
        pending: Pending,
        address: MemberAddress,
        cancel: CancellationToken,
    ) where
        R: futures_util::Stream<Item = GridResult<ClientMessage>> + Unpin,
    {
        loop {
            tokio::select! {
                next = source.next() => match next {
                    Some(Ok(message)) => Self::dispatch(&pending, message),
                    Some(Err(e)) => {
                        tracing::warn!(member = %address, error = %e, "Read failed");
                        break;
                    }
                    None => {
                        tracing::info!(member = %address, "Member closed the connection");
                        break;
                    }
                },
                _ = cancel.cancelled() => break,
            }
        }

        cancel.cancel();
        let waiting: Vec<_> = pending.lock().drain().collect();
        for (_, tx) in waiting {
            let _ = tx.send(Err(GridError::connection(format!("Connection to {address} closed"))));
        }
    }

    fn dispatch(pending: &Pending, message: ClientMessage) {
        if message.is_event() {
            tracing::trace!("Ignoring event message");
            return;
        }
        let correlation_id = match message.correlation_id() {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(error = %e, "Response without correlation id");
                return;
            }
        };
        let Some(tx) = pending.lock().remove(&correlation_id) else {
            tracing::debug!(correlation_id, "Response for an abandoned invocation");
            return;
        };

        let result = match message.message_type() {
            Ok(EXCEPTION) => Err(decode_exception(&message)),
            Ok(_) => Ok(message),
            Err(e) => Err(e),
        };
        let _ = tx.send(result);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
