// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Broker Transport Abstraction
//!
//! The supervisor drives the broker connection through this trait so the
//! connection policy does not depend on a concrete MQTT client.
//!
//! # Integration
//!
//! - [`crate::mqtt::MqttTransport`] -- `rumqttc` event loop
//! - [`MockTransport`] -- scripted events for tests

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::Notify;

/// Transport failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Broker answered CONNECT with a non-success return code
    #[error("broker refused connection: {0}")]
    Refused(String),

    /// Network-level loss; polling again reconnects
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// A client request (subscribe, disconnect) could not be queued
    #[error("request failed: {0}")]
    Request(String),
}

/// Event produced by one transport poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake completed (CONNACK success)
    Connected { session_present: bool },

    /// Application message on a subscribed topic
    Message { topic: String, payload: Vec<u8> },

    /// Subscription acknowledged; `granted` is false if the broker refused it
    SubscribeAck { granted: bool },

    /// Our DISCONNECT has been written to the broker
    Disconnected,

    /// Keep-alive and other protocol traffic
    Other,
}

/// Abstract broker connection
#[async_trait]
pub trait Transport: Send {
    /// Drive the connection until the next event.
    ///
    /// After an error, the next call attempts to reconnect.
    async fn poll(&mut self) -> Result<TransportEvent, TransportError>;

    /// Queue a subscription to `filter` at QoS "at least once"
    fn subscribe(&self, filter: &str) -> Result<(), TransportError>;

    /// Queue a graceful DISCONNECT
    fn disconnect(&self) -> Result<(), TransportError>;
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================

#[derive(Default)]
struct MockShared {
    events: Mutex<VecDeque<Result<TransportEvent, TransportError>>>,
    subscriptions: Mutex<Vec<String>>,
    subscribe_error: Mutex<Option<TransportError>>,
    disconnect_requested: AtomicBool,
    notify: Notify,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Mock transport replaying scripted events
///
/// Cloning yields a handle onto the same script, so a test can keep one
/// clone to push events and inspect requests while the supervisor owns the
/// other. When the script is empty, `poll` waits for more events or for a
/// disconnect request.
#[derive(Clone, Default)]
pub struct MockTransport {
    shared: Arc<MockShared>,
}

impl MockTransport {
    /// Create a new mock transport with an empty script
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event to the script
    pub fn push_event(&self, event: TransportEvent) {
        self.push(Ok(event));
    }

    /// Append a poll error to the script
    pub fn push_error(&self, error: TransportError) {
        self.push(Err(error));
    }

    /// Append an application message
    pub fn push_message(&self, topic: &str, payload: &[u8]) {
        self.push_event(TransportEvent::Message {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
    }

    /// Make subsequent subscribe requests fail
    pub fn fail_subscribe(&self, error: TransportError) {
        *lock(&self.shared.subscribe_error) = Some(error);
    }

    /// Filters passed to `subscribe`, in order
    pub fn subscriptions(&self) -> Vec<String> {
        lock(&self.shared.subscriptions).clone()
    }

    /// Whether a DISCONNECT was requested
    pub fn disconnect_requested(&self) -> bool {
        self.shared.disconnect_requested.load(Ordering::SeqCst)
    }

    fn push(&self, item: Result<TransportEvent, TransportError>) {
        lock(&self.shared.events).push_back(item);
        self.shared.notify.notify_one();
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn poll(&mut self) -> Result<TransportEvent, TransportError> {
        loop {
            if let Some(item) = lock(&self.shared.events).pop_front() {
                return item;
            }
            if self.disconnect_requested() {
                return Ok(TransportEvent::Disconnected);
            }
            self.shared.notify.notified().await;
        }
    }

    fn subscribe(&self, filter: &str) -> Result<(), TransportError> {
        if let Some(error) = lock(&self.shared.subscribe_error).clone() {
            return Err(error);
        }
        lock(&self.shared.subscriptions).push(filter.to_string());
        Ok(())
    }

    fn disconnect(&self) -> Result<(), TransportError> {
        self.shared.disconnect_requested.store(true, Ordering::SeqCst);
        self.shared.notify.notify_one();
        Ok(())
    }
}
