//! Connection engine and the public `Client` handle.
//!
//! LIFECYCLE
//! =========
//! `Disconnected -> Connecting -> Open -> Disconnected`, plus `Closing ->
//! Closed` once `destroy` is called. Nothing leaves `Closed`.
//!
//! 1. `connect` installs a link (outbound channel + generation number) and
//!    spawns a driver task that opens the transport.
//! 2. The driver pumps outbound frames to the transport and inbound frames
//!    through the codec into the correlation table or the event dispatcher.
//! 3. When the transport closes, the driver reports back; outstanding calls
//!    fail and the reconnect policy decides whether to schedule a retry.
//!
//! DESIGN
//! ======
//! - All connection state lives behind one `std::sync::Mutex` that is never
//!   held across an `.await`. Registration of a call happens under that lock,
//!   so `destroy` and a dropped link can never strand a call.
//! - Background tasks hold `Weak<Inner>`. Dropping the last `Client` drops the
//!   outbound sender, which ends the driver and closes the transport.
//! - Every signal from a driver carries its generation. Signals from a link
//!   that has been replaced or discarded are ignored.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use frames::Payload;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::error::{ClientError, TransportError};
use crate::events::{EventDispatcher, ListenerId};
use crate::pending::PendingTable;
use crate::reconnect::{Decision, ReconnectInputs, ReconnectPolicy, ReconnectState};
use crate::transport::{Connector, Transport, WsConnector};

const NOTICE_CAPACITY: usize = 64;

// =============================================================================
// PUBLIC TYPES
// =============================================================================

/// Lifecycle of the client's single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport. The initial state, and the state after a close.
    Disconnected,
    /// A transport is being opened.
    Connecting,
    /// Calls can be sent.
    Open,
    /// `destroy` is tearing the client down.
    Closing,
    /// Destroyed. Terminal.
    Closed,
}

/// Lifecycle notifications, delivered on [`Client::notices`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A transport opened and the retry counter was reset.
    Opened,
    /// The transport closed while the client was still live.
    Disconnected,
    /// Retry number `attempt` will start after `delay`.
    ReconnectScheduled { attempt: u32, delay: Duration },
    /// The retry ceiling was reached. Sent once per failure streak.
    ReconnectExhausted { attempts: u32 },
    /// An inbound frame could not be decoded and was skipped.
    FrameDropped { reason: String },
}

// =============================================================================
// ENGINE STATE
// =============================================================================

/// The transport handle as the engine sees it.
struct Link {
    generation: u64,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    driver: JoinHandle<()>,
    open: bool,
}

#[derive(Default)]
struct Connection {
    link: Option<Link>,
    /// Caller-requested shutdown. Never reconnect once set.
    closed: bool,
    generation: u64,
    reconnect: ReconnectState,
}

struct Inner {
    config: ClientConfig,
    policy: ReconnectPolicy,
    connector: Arc<dyn Connector>,
    conn: Mutex<Connection>,
    pending: PendingTable,
    events: EventDispatcher,
    state: watch::Sender<ConnectionState>,
    notices: broadcast::Sender<Notice>,
}

/// Handle to one logical connection. Clones share it.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// Client speaking WebSocket to `config.url()`.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self::with_connector(config, Arc::new(WsConnector))
    }

    #[must_use]
    pub fn with_connector(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                policy: ReconnectPolicy::from(&config),
                config,
                connector,
                conn: Mutex::new(Connection::default()),
                pending: PendingTable::new(),
                events: EventDispatcher::new(),
                state,
                notices,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    #[must_use]
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.inner.notices.subscribe()
    }

    /// Reconnect attempts since the last successful open.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.lock().reconnect.attempts
    }

    /// Clear the failure streak so the next close may retry again.
    pub fn reset_reconnect(&self) {
        self.inner.lock().reconnect.reset();
    }

    /// Calls still waiting for a reply.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.inner.pending.len()
    }

    /// Open the connection and wait until the transport reports open.
    ///
    /// Returns immediately if a transport already exists, open or opening.
    ///
    /// # Errors
    ///
    /// [`ClientError::Destroyed`] after `destroy`, or the transport's
    /// connect failure. A failed connect still goes through close handling,
    /// so the reconnect policy may retry on its own.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let ready = {
            let mut conn = self.inner.lock();
            if conn.closed {
                return Err(ClientError::Destroyed);
            }
            if conn.link.is_some() {
                return Ok(());
            }

            conn.generation += 1;
            let generation = conn.generation;
            let (outbound, outbound_rx) = mpsc::unbounded_channel();
            let (ready_tx, ready_rx) = oneshot::channel();
            let driver = tokio::spawn(drive_link(
                Arc::downgrade(&self.inner),
                Arc::clone(&self.inner.connector),
                self.inner.config.url(),
                generation,
                outbound_rx,
                ready_tx,
            ));
            conn.link = Some(Link {
                generation,
                outbound,
                driver,
                open: false,
            });
            self.inner.set_state(ConnectionState::Connecting);
            ready_rx
        };

        // A dropped sender means the link was discarded while opening.
        ready.await.unwrap_or(Err(ClientError::Destroyed))
    }

    /// Call `kind` with the configured default timeout.
    ///
    /// # Errors
    ///
    /// See [`Client::invoke_with_timeout`].
    pub async fn invoke<P>(&self, kind: &str, params: &P) -> Result<Payload, ClientError>
    where
        P: Serialize + ?Sized,
    {
        self.invoke_with_timeout(kind, params, self.inner.config.default_timeout_secs)
            .await
    }

    /// Send a request and wait for its reply. A `timeout_secs` of zero waits
    /// indefinitely.
    ///
    /// The deadline is whole seconds: the same integer goes out as the
    /// request's `timeout` field and arms the local timer, so the server and
    /// the client agree on it. Sub-second deadlines are not supported.
    ///
    /// # Errors
    ///
    /// - [`ClientError::NotConnected`] when no open transport exists.
    /// - [`ClientError::Destroyed`] after `destroy`, or if it happens while
    ///   waiting.
    /// - [`ClientError::Remote`] when the server answers with `type: "error"`.
    /// - [`ClientError::Timeout`] when no reply arrives in time.
    /// - [`ClientError::Transport`] when the connection drops first.
    /// - [`ClientError::InvalidParams`] when `params` is not a JSON object.
    pub async fn invoke_with_timeout<P>(
        &self,
        kind: &str,
        params: &P,
        timeout_secs: u64,
    ) -> Result<Payload, ClientError>
    where
        P: Serialize + ?Sized,
    {
        let params = to_params(params)?;
        let request_id = Uuid::new_v4().to_string();

        let reply = {
            let conn = self.inner.lock();
            if conn.closed {
                return Err(ClientError::Destroyed);
            }
            let Some(link) = conn.link.as_ref().filter(|link| link.open) else {
                return Err(ClientError::NotConnected);
            };

            let reply = self.inner.pending.register(&request_id, kind, timeout_secs);
            let frame = frames::encode_request(kind, params, &request_id, timeout_secs);
            if link.outbound.send(frame).is_err() {
                self.inner.pending.forget(&request_id);
                return Err(ClientError::NotConnected);
            }
            reply
        };

        tracing::debug!(%request_id, %kind, timeout_secs, "request sent");
        reply.await.unwrap_or(Err(ClientError::Destroyed))
    }

    /// Like [`Client::invoke`], deserializing a JSON reply into `T`.
    ///
    /// # Errors
    ///
    /// Everything `invoke` returns, plus [`ClientError::InvalidJson`] and
    /// [`ClientError::UnexpectedBinary`] when the reply doesn't fit `T`.
    pub async fn invoke_as<T, P>(&self, kind: &str, params: &P) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        match self.invoke(kind, params).await? {
            Payload::Json(value) => Ok(serde_json::from_value(value)?),
            Payload::Binary(bytes) => Err(ClientError::UnexpectedBinary { len: bytes.len() }),
        }
    }

    /// Register `callback` for pushed events named `event`.
    pub fn subscribe<F>(&self, event: &str, callback: F) -> ListenerId
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(event, Arc::new(callback))
    }

    /// Remove one listener, or all listeners for `event` when `id` is `None`.
    pub fn unsubscribe(&self, event: &str, id: Option<ListenerId>) {
        self.inner.events.unsubscribe(event, id);
    }

    /// Shut down for good: stop retrying, close the transport, drop all
    /// listeners and fail every outstanding call with `Destroyed`.
    /// Calling it again does nothing.
    pub fn destroy(&self) {
        {
            let mut conn = self.inner.lock();
            if conn.closed {
                return;
            }
            conn.closed = true;
            self.inner.set_state(ConnectionState::Closing);
            conn.reconnect.cancel_timer();
            // An open link closes gracefully once its sender drops. A link
            // still opening is parked in the connector, so stop it outright.
            if let Some(link) = conn.link.take() {
                if !link.open {
                    link.driver.abort();
                }
            }
        }

        self.inner.events.clear_all();
        let failed = self.inner.pending.drain_all(|| ClientError::Destroyed);
        tracing::info!(failed, "client destroyed");
        self.inner.set_state(ConnectionState::Closed);
    }
}

fn to_params<P>(params: &P) -> Result<Map<String, Value>, ClientError>
where
    P: Serialize + ?Sized,
{
    match serde_json::to_value(params)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        _ => Err(ClientError::InvalidParams),
    }
}

// =============================================================================
// ENGINE
// =============================================================================

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    fn notify(&self, notice: Notice) {
        // No subscribers is fine.
        let _ = self.notices.send(notice);
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock()
            .link
            .as_ref()
            .is_some_and(|link| link.generation == generation)
    }

    /// Transport reported open. Returns `false` if the link was discarded
    /// while it was opening; the caller then closes the transport.
    fn handle_open(&self, generation: u64) -> bool {
        let mut conn = self.lock();
        if conn.closed {
            return false;
        }
        let Some(link) = conn
            .link
            .as_mut()
            .filter(|link| link.generation == generation)
        else {
            return false;
        };
        link.open = true;
        conn.reconnect.reset();
        self.set_state(ConnectionState::Open);
        drop(conn);

        tracing::info!(url = %self.config.url(), generation, "connection open");
        self.notify(Notice::Opened);
        true
    }

    /// Transport reported close (or failed to open).
    fn handle_close(self: &Arc<Self>, generation: u64) {
        let mut conn = self.lock();
        if !conn
            .link
            .as_ref()
            .is_some_and(|link| link.generation == generation)
        {
            return;
        }
        conn.link = None;
        if conn.closed {
            return;
        }

        // Still under the lock: no call can register against a dead link.
        let failed = self.pending.drain_all(|| TransportError::Closed.into());
        tracing::info!(generation, failed, "connection closed");
        self.set_state(ConnectionState::Disconnected);
        self.notify(Notice::Disconnected);
        self.schedule_reconnect(&mut conn);
    }

    fn schedule_reconnect(self: &Arc<Self>, conn: &mut Connection) {
        let inputs = ReconnectInputs {
            closed: conn.closed,
            attempts: conn.reconnect.attempts,
            retry_scheduled: conn.reconnect.timer.is_some(),
            connecting: conn.link.is_some(),
        };

        match self.policy.decide(inputs) {
            Decision::Idle => {}
            Decision::Exhausted { attempts } => {
                if conn.reconnect.exhausted {
                    return;
                }
                conn.reconnect.exhausted = true;
                let error = ClientError::MaxReconnectAttempts { attempts };
                tracing::error!(%error, "reconnect stopped");
                self.notify(Notice::ReconnectExhausted { attempts });
            }
            Decision::Retry { attempt, delay } => {
                conn.reconnect.attempts = attempt;
                tracing::info!(
                    attempt,
                    max_attempts = self.policy.max_attempts,
                    ?delay,
                    "reconnect scheduled"
                );
                self.notify(Notice::ReconnectScheduled { attempt, delay });

                let weak = Arc::downgrade(self);
                conn.reconnect.timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let Some(inner) = weak.upgrade() else {
                        return;
                    };
                    // Slot is free once fired; the in-flight link guards
                    // against duplicate attempts from here on.
                    inner.lock().reconnect.timer = None;
                    let client = Client { inner };
                    if let Err(error) = client.connect().await {
                        tracing::debug!(%error, attempt, "reconnect attempt failed");
                    }
                }));
            }
        }
    }

    fn handle_frame(&self, generation: u64, bytes: &[u8]) {
        if !self.is_current(generation) {
            return;
        }
        if let Err(error) = self.route(bytes) {
            tracing::warn!(%error, len = bytes.len(), "dropping inbound frame");
            self.notify(Notice::FrameDropped {
                reason: error.to_string(),
            });
        }
    }

    /// Reply to a pending call if the id matches one, else a pushed event if
    /// it names one, else nothing.
    fn route(&self, bytes: &[u8]) -> Result<(), ClientError> {
        let envelope = frames::decode(bytes)?;
        let is_error = envelope.is_error();
        let frames::Envelope {
            request_id,
            error,
            event,
            data,
            ..
        } = envelope;

        if let Some(request_id) = request_id.as_deref() {
            if self.pending.contains(request_id) {
                if is_error {
                    let message = error.unwrap_or_else(|| "unknown error".to_owned());
                    self.pending.reject(request_id, message);
                } else {
                    self.pending.resolve(request_id, data);
                }
                return Ok(());
            }
            tracing::debug!(%request_id, "reply for unknown or settled request");
        }

        if let Some(event) = event.as_deref() {
            let delivered = self.events.publish(event, &data);
            tracing::trace!(%event, delivered, "event dispatched");
        }
        Ok(())
    }
}

// =============================================================================
// DRIVER
// =============================================================================

async fn drive_link(
    inner: Weak<Inner>,
    connector: Arc<dyn Connector>,
    url: String,
    generation: u64,
    mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    ready: oneshot::Sender<Result<(), ClientError>>,
) {
    tracing::debug!(%url, generation, "connecting");
    let mut transport = match connector.connect(&url).await {
        Ok(transport) => transport,
        Err(error) => {
            tracing::warn!(%url, %error, "connect failed");
            // A failed open is followed by a close, as on a real socket.
            if let Some(inner) = inner.upgrade() {
                inner.handle_close(generation);
            }
            let _ = ready.send(Err(error.into()));
            return;
        }
    };

    let opened = inner
        .upgrade()
        .is_some_and(|inner| inner.handle_open(generation));
    if !opened {
        transport.close().await;
        return;
    }
    let _ = ready.send(Ok(()));

    pump(&inner, generation, transport.as_mut(), &mut outbound).await;

    if let Some(inner) = inner.upgrade() {
        inner.handle_close(generation);
    }
}

/// Move frames both ways until either side is done.
async fn pump(
    inner: &Weak<Inner>,
    generation: u64,
    transport: &mut dyn Transport,
    outbound: &mut mpsc::UnboundedReceiver<Vec<u8>>,
) {
    loop {
        tokio::select! {
            frame = outbound.recv() => {
                // `None`: the link was discarded locally.
                let Some(frame) = frame else {
                    transport.close().await;
                    return;
                };
                if let Err(error) = transport.send(frame).await {
                    tracing::warn!(%error, generation, "send failed");
                    transport.close().await;
                    return;
                }
            }
            inbound = transport.recv() => match inbound {
                Some(Ok(bytes)) => {
                    let Some(inner) = inner.upgrade() else {
                        transport.close().await;
                        return;
                    };
                    inner.handle_frame(generation, &bytes);
                }
                Some(Err(error)) => {
                    tracing::warn!(%error, generation, "receive failed");
                    return;
                }
                None => {
                    tracing::debug!(generation, "closed by peer");
                    return;
                }
            },
        }
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
