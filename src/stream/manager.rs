use super::transport::{StreamConnection, Transport};
use super::{BackoffPolicy, ConnectionState, StreamError};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::watch;

/// Callbacks the connection manager drives
///
/// `resync` runs on every re-entry into `Connecting` after a disconnect,
/// before the stream is reopened, so the candle window never serves stale
/// data across a gap. `on_message` receives every raw text frame in arrival
/// order; malformed payloads are its problem, not the manager's.
#[async_trait]
pub trait StreamHandler: Send {
    async fn resync(&mut self) -> crate::Result<()>;
    async fn on_message(&mut self, raw: &str);
}

/// Control surface for a running connection manager
///
/// `stop()` is safe at any time, including mid-backoff: the pending wait is
/// cancelled and the manager settles in `Terminated` without error.
pub struct ConnectionHandle {
    stop_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl ConnectionHandle {
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch receiver for state transitions (used by tests and the supervisor)
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }
}

/// Owns one persistent streaming connection and its reconnect lifecycle
///
/// State machine: `Connecting -> Connected` on handshake; `Connected ->
/// Reconnecting` on error/close; `Reconnecting -> Connecting` after the
/// backoff delay; `Reconnecting -> Terminated` once the attempt count
/// exceeds the policy maximum. `Terminated` is absorbing.
pub struct ConnectionManager<T: Transport> {
    transport: T,
    policy: BackoffPolicy,
    connect_timeout: Duration,
    state_tx: watch::Sender<ConnectionState>,
    stop_rx: watch::Receiver<bool>,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(
        transport: T,
        policy: BackoffPolicy,
        connect_timeout: Duration,
    ) -> (Self, ConnectionHandle) {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (stop_tx, stop_rx) = watch::channel(false);
        (
            Self {
                transport,
                policy,
                connect_timeout,
                state_tx,
                stop_rx,
            },
            ConnectionHandle { stop_tx, state_rx },
        )
    }

    /// Drive the connection until stopped or retries are exhausted
    ///
    /// Returns `Ok(())` after an explicit stop and
    /// `Err(StreamError::RetriesExhausted)` when the machine terminates on
    /// its own; either way the state ends at `Terminated` and the underlying
    /// connection has been released.
    pub async fn run<H: StreamHandler>(mut self, handler: &mut H) -> Result<(), StreamError> {
        // Reconnect attempts since the last successful connection.
        let mut attempt: u32 = 0;
        let mut first = true;

        loop {
            if *self.stop_rx.borrow() {
                self.set_state(ConnectionState::Terminated);
                return Ok(());
            }
            self.set_state(ConnectionState::Connecting);

            if first {
                first = false;
            } else if let Err(err) = handler.resync().await {
                tracing::warn!("snapshot resync failed: {}", err);
                match self.back_off(&mut attempt).await {
                    BackoffOutcome::Retry => continue,
                    BackoffOutcome::Stopped => return Ok(()),
                    BackoffOutcome::Exhausted => {
                        return Err(StreamError::RetriesExhausted(attempt))
                    }
                }
            }

            let connect_timeout = self.connect_timeout;
            let attempted = tokio::select! {
                _ = stopped(&mut self.stop_rx) => Attempt::Stopped,
                outcome = tokio::time::timeout(connect_timeout, self.transport.connect()) => {
                    match outcome {
                        Ok(Ok(conn)) => Attempt::Connected(conn),
                        Ok(Err(err)) => {
                            tracing::warn!("connect failed: {}", err);
                            Attempt::Failed
                        }
                        Err(_) => {
                            tracing::warn!("connect timed out after {:?}", connect_timeout);
                            Attempt::Failed
                        }
                    }
                }
            };

            let mut conn = match attempted {
                Attempt::Stopped => {
                    self.set_state(ConnectionState::Terminated);
                    return Ok(());
                }
                Attempt::Failed => {
                    match self.back_off(&mut attempt).await {
                        BackoffOutcome::Retry => continue,
                        BackoffOutcome::Stopped => return Ok(()),
                        BackoffOutcome::Exhausted => {
                            return Err(StreamError::RetriesExhausted(attempt))
                        }
                    }
                }
                Attempt::Connected(conn) => conn,
            };

            self.set_state(ConnectionState::Connected);
            attempt = 0;
            tracing::info!("stream connected");

            loop {
                let received = tokio::select! {
                    _ = stopped(&mut self.stop_rx) => Received::Stopped,
                    frame = conn.next_text() => match frame {
                        Some(Ok(text)) => Received::Frame(text),
                        Some(Err(err)) => {
                            tracing::warn!("stream error: {}", err);
                            Received::Lost
                        }
                        None => {
                            tracing::warn!("stream closed by peer");
                            Received::Lost
                        }
                    }
                };
                match received {
                    Received::Frame(text) => handler.on_message(&text).await,
                    Received::Stopped => {
                        // Dropping the connection releases the socket.
                        drop(conn);
                        self.set_state(ConnectionState::Terminated);
                        return Ok(());
                    }
                    Received::Lost => break,
                }
            }
            drop(conn);

            match self.back_off(&mut attempt).await {
                BackoffOutcome::Retry => continue,
                BackoffOutcome::Stopped => return Ok(()),
                BackoffOutcome::Exhausted => return Err(StreamError::RetriesExhausted(attempt)),
            }
        }
    }

    /// One failed attempt: enter Reconnecting, wait the scheduled delay
    async fn back_off(&mut self, attempt: &mut u32) -> BackoffOutcome {
        self.set_state(ConnectionState::Reconnecting);
        *attempt += 1;

        if self.policy.exhausted(*attempt) {
            tracing::error!(
                "giving up after {} reconnect attempts",
                self.policy.max_attempts
            );
            self.set_state(ConnectionState::Terminated);
            return BackoffOutcome::Exhausted;
        }

        let delay = self.policy.delay_for(*attempt);
        tracing::info!(
            "reconnecting in {:?} (attempt {}/{})",
            delay,
            attempt,
            self.policy.max_attempts
        );

        let outcome = tokio::select! {
            _ = stopped(&mut self.stop_rx) => BackoffOutcome::Stopped,
            _ = tokio::time::sleep(delay) => BackoffOutcome::Retry,
        };
        if matches!(outcome, BackoffOutcome::Stopped) {
            self.set_state(ConnectionState::Terminated);
        }
        outcome
    }

    fn set_state(&self, state: ConnectionState) {
        let _ = self.state_tx.send(state);
    }
}

enum BackoffOutcome {
    Retry,
    Stopped,
    Exhausted,
}

enum Attempt<C> {
    Connected(C),
    Failed,
    Stopped,
}

enum Received {
    Frame(String),
    Lost,
    Stopped,
}

/// Resolves once a stop has been requested; pends forever otherwise
async fn stopped(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            // Handle dropped without stopping; nobody can stop us anymore.
            std::future::pending::<()>().await;
        }
    }
}
