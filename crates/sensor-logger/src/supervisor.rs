// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection supervisor
//!
//! Owns the broker connection lifecycle and dispatches delivered messages to
//! the ingestion handler.
//!
//! # States
//!
//! ```text
//! Disconnected --connect()--> Connecting --CONNACK--> Connected
//!                                  ^                      |
//!                                  +---- connection lost -+
//! Connecting/Connected --shutdown--> Disconnecting --> Terminated
//! ```
//!
//! Reconnects use a fixed interval and never give up. The subscription is
//! reissued on every CONNACK since the session is not assumed to survive.

use crate::handler::MessageHandler;
use crate::transport::{Transport, TransportError, TransportEvent};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};

/// Upper bound on concurrently running handlers
pub const MAX_IN_FLIGHT_LIMIT: usize = 65_536;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
    Terminated,
}

/// Initial connection failures (fatal to the process)
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("broker rejected connection: {0}")]
    Rejected(String),

    #[error("no broker connection after {0:?}")]
    Timeout(Duration),
}

/// Supervisor settings
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Wildcard topic filter to (re)subscribe on every connect
    pub subscription_filter: String,
    /// Fixed delay between reconnect attempts
    pub retry_interval: Duration,
    /// Bound on the graceful disconnect and on waiting for in-flight handlers
    pub disconnect_timeout: Duration,
    /// Bound on the initial connection (None = retry forever)
    pub connect_timeout: Option<Duration>,
    /// Maximum concurrently running handlers, clamped to
    /// `1..=MAX_IN_FLIGHT_LIMIT`
    pub max_in_flight: usize,
}

impl From<&crate::config::Config> for SupervisorConfig {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            subscription_filter: config.subscription_filter(),
            retry_interval: config.retry_interval(),
            disconnect_timeout: config.disconnect_timeout(),
            connect_timeout: config.connect_timeout(),
            max_in_flight: config.max_in_flight,
        }
    }
}

/// Connection supervisor
///
/// The handler is fixed at construction and shared by every dispatched
/// message across reconnects.
pub struct Supervisor<T: Transport, H: MessageHandler> {
    config: SupervisorConfig,
    transport: T,
    handler: Arc<H>,
    in_flight: Arc<Semaphore>,
    state: watch::Sender<ConnectionState>,
}

impl<T: Transport, H: MessageHandler> Supervisor<T, H> {
    /// Create a new supervisor in the `Disconnected` state
    pub fn new(config: SupervisorConfig, transport: T, handler: Arc<H>) -> Self {
        let max_in_flight = config.max_in_flight.clamp(1, MAX_IN_FLIGHT_LIMIT);
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            config: SupervisorConfig {
                max_in_flight,
                ..config
            },
            transport,
            handler,
            in_flight: Arc::new(Semaphore::new(max_in_flight)),
            state,
        }
    }

    /// Subscribe to state transitions
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Current state
    pub fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Establish the initial connection.
    ///
    /// Transient failures are retried at the fixed interval until the
    /// optional connect timeout expires. A broker refusal is returned
    /// immediately.
    pub async fn connect(&mut self) -> Result<(), ConnectError> {
        self.set_state(ConnectionState::Connecting);

        let result = match self.config.connect_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.connect_loop()).await {
                Ok(result) => result,
                Err(_) => Err(ConnectError::Timeout(limit)),
            },
            None => self.connect_loop().await,
        };

        if result.is_err() {
            self.set_state(ConnectionState::Disconnected);
        }
        result
    }

    async fn connect_loop(&mut self) -> Result<(), ConnectError> {
        loop {
            match self.transport.poll().await {
                Ok(TransportEvent::Connected { session_present }) => {
                    self.on_connected(session_present);
                    return Ok(());
                }
                Ok(event) => {
                    tracing::debug!(?event, "Event before CONNACK");
                }
                Err(TransportError::Refused(reason)) => {
                    tracing::error!(reason = %reason, "MQTT broker refused connection");
                    return Err(ConnectError::Rejected(reason));
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        retry_in = ?self.config.retry_interval,
                        "Failed to connect to MQTT broker, retrying"
                    );
                    tokio::time::sleep(self.config.retry_interval).await;
                }
            }
        }
    }

    /// Connect, then run until `shutdown` resolves.
    ///
    /// `shutdown` is watched from the first connection attempt on, so a
    /// signal while the broker is still unreachable also ends in
    /// `Terminated` with `Ok(())`. Only a failed initial connection returns
    /// an error.
    pub async fn serve<F>(mut self, shutdown: F) -> Result<(), ConnectError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let connected = tokio::select! {
            biased;
            _ = shutdown.as_mut() => {
                tracing::info!("Shutdown requested before broker connection");
                false
            }
            result = self.connect() => {
                result?;
                true
            }
        };

        if connected {
            self.event_loop(shutdown.as_mut()).await;
        }
        self.disconnect_gracefully().await;
        Ok(())
    }

    /// Run until `shutdown` resolves, then disconnect gracefully.
    ///
    /// Connection loss is handled here and never returned.
    pub async fn run<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        self.event_loop(shutdown).await;
        self.disconnect_gracefully().await;
    }

    async fn event_loop<F>(&mut self, mut shutdown: Pin<&mut F>)
    where
        F: Future<Output = ()>,
    {
        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.as_mut() => return,
                event = self.transport.poll() => event,
            };

            match event {
                Ok(TransportEvent::Message { topic, payload }) => {
                    // Waiting for a free slot must not hold off shutdown
                    let permit = tokio::select! {
                        biased;
                        _ = shutdown.as_mut() => {
                            tracing::debug!(topic = %topic, "Dropping message received during shutdown");
                            return;
                        }
                        permit = Arc::clone(&self.in_flight).acquire_owned() => permit,
                    };
                    match permit {
                        Ok(permit) => self.dispatch(permit, topic, payload),
                        Err(_) => {
                            tracing::debug!(topic = %topic, "Dispatch semaphore closed, dropping message");
                        }
                    }
                }
                Ok(event) => self.handle_event(event),
                Err(e) => {
                    self.on_connection_error(e);
                    tokio::select! {
                        biased;
                        _ = shutdown.as_mut() => return,
                        _ = tokio::time::sleep(self.config.retry_interval) => {}
                    }
                }
            }
        }
    }

    fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected { session_present } => self.on_connected(session_present),
            TransportEvent::SubscribeAck { granted: true } => {
                tracing::info!(topic = %self.config.subscription_filter, "Successfully subscribed");
            }
            TransportEvent::SubscribeAck { granted: false } => {
                tracing::error!(
                    topic = %self.config.subscription_filter,
                    "Broker rejected subscription"
                );
            }
            TransportEvent::Message { .. } | TransportEvent::Disconnected | TransportEvent::Other => {}
        }
    }

    fn on_connected(&mut self, session_present: bool) {
        self.set_state(ConnectionState::Connected);
        tracing::info!(session_present, "Connected to MQTT broker");

        // A failed subscribe leaves the connection up
        let filter = &self.config.subscription_filter;
        match self.transport.subscribe(filter) {
            Ok(()) => tracing::debug!(topic = %filter, "Subscription requested"),
            Err(e) => tracing::error!(topic = %filter, error = %e, "Failed to subscribe to topic"),
        }
    }

    fn on_connection_error(&mut self, error: TransportError) {
        if self.current_state() == ConnectionState::Connected {
            tracing::warn!(error = %error, "MQTT connection lost");
        } else {
            tracing::warn!(
                error = %error,
                retry_in = ?self.config.retry_interval,
                "Reconnect attempt failed"
            );
        }
        self.set_state(ConnectionState::Connecting);
    }

    /// Hand one message to the handler on the blocking pool.
    ///
    /// The permit is released when the handler returns.
    fn dispatch(&self, permit: OwnedSemaphorePermit, topic: String, payload: Vec<u8>) {
        let handler = Arc::clone(&self.handler);
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            handler.handle(&topic, &payload);
        });
    }

    async fn disconnect_gracefully(mut self) {
        self.set_state(ConnectionState::Disconnecting);
        tracing::info!("Disconnecting from MQTT broker");

        let limit = self.config.disconnect_timeout;

        match self.transport.disconnect() {
            Ok(()) => {
                let transport = &mut self.transport;
                let drained = tokio::time::timeout(limit, async {
                    loop {
                        match transport.poll().await {
                            Ok(TransportEvent::Disconnected) | Err(_) => break,
                            Ok(TransportEvent::Message { topic, .. }) => {
                                tracing::debug!(topic = %topic, "Dropping message received during shutdown");
                            }
                            Ok(_) => {}
                        }
                    }
                })
                .await;
                if drained.is_err() {
                    tracing::warn!(timeout = ?limit, "Graceful disconnect timed out");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to send MQTT disconnect"),
        }

        // The run loop has stopped dispatching; running handlers are left to
        // finish within the same bound. `max_in_flight` is clamped in `new`,
        // so it always fits.
        let permits = u32::try_from(self.config.max_in_flight).unwrap_or(u32::MAX);
        let waiting = Arc::clone(&self.in_flight);
        if tokio::time::timeout(limit, waiting.acquire_many_owned(permits))
            .await
            .is_err()
        {
            tracing::warn!(
                running = self.config.max_in_flight - self.in_flight.available_permits(),
                "Handlers still running at shutdown"
            );
        }

        self.set_state(ConnectionState::Terminated);
        tracing::info!("MQTT connection closed");
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::debug!(from = ?previous, to = ?next, "Connection state changed");
        }
    }
}
