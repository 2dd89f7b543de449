// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! MQTT transport
//!
//! Implements [`Transport`] on top of the `rumqttc` async client. The event
//! loop reconnects on the next `poll` after a connection error; the
//! supervisor decides when to poll again.

use crate::config::Config;
use crate::transport::{Transport, TransportError, TransportEvent};
use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, QoS, SubscribeReasonCode,
};

/// `rumqttc`-backed broker connection
pub struct MqttTransport {
    client: AsyncClient,
    event_loop: EventLoop,
}

impl MqttTransport {
    /// Build the client and event loop. No network I/O happens until the
    /// first `poll`.
    pub fn new(config: &Config) -> Self {
        let mut options = MqttOptions::new(
            config.client_id.clone(),
            config.broker_host.clone(),
            config.broker_port,
        );
        options.set_keep_alive(config.keep_alive());
        // Subscriptions are reissued on every CONNACK
        options.set_clean_session(true);

        let (client, event_loop) = AsyncClient::new(options, config.event_loop_capacity);

        Self { client, event_loop }
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn poll(&mut self) -> Result<TransportEvent, TransportError> {
        match self.event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    Ok(TransportEvent::Connected {
                        session_present: ack.session_present,
                    })
                } else {
                    Err(TransportError::Refused(format!("{:?}", ack.code)))
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => Ok(TransportEvent::Message {
                topic: publish.topic,
                payload: publish.payload.to_vec(),
            }),
            Ok(Event::Incoming(Packet::SubAck(ack))) => Ok(TransportEvent::SubscribeAck {
                granted: ack
                    .return_codes
                    .iter()
                    .all(|code| !matches!(code, SubscribeReasonCode::Failure)),
            }),
            Ok(Event::Incoming(Packet::Disconnect)) => Err(TransportError::ConnectionLost(
                "broker sent DISCONNECT".to_string(),
            )),
            Ok(Event::Outgoing(Outgoing::Disconnect)) => Ok(TransportEvent::Disconnected),
            Ok(_) => Ok(TransportEvent::Other),
            Err(ConnectionError::ConnectionRefused(code)) => {
                Err(TransportError::Refused(format!("{:?}", code)))
            }
            Err(e) => Err(TransportError::ConnectionLost(e.to_string())),
        }
    }

    fn subscribe(&self, filter: &str) -> Result<(), TransportError> {
        self.client
            .try_subscribe(filter, QoS::AtLeastOnce)
            .map_err(|e| TransportError::Request(e.to_string()))
    }

    fn disconnect(&self) -> Result<(), TransportError> {
        self.client
            .try_disconnect()
            .map_err(|e| TransportError::Request(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_creation() {
        let config = Config::builder()
            .broker_host("broker.local")
            .broker_port(1884)
            .client_id("test-logger")
            .build();

        let transport = MqttTransport::new(&config);
        assert!(transport.subscribe("env/sensor/+/data").is_ok());
        assert!(transport.disconnect().is_ok());
    }
}
