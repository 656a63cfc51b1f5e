//! MQTT messaging transport.
//!
//! Wraps a synchronous `rumqttc` client. Frames are queued with
//! `try_publish` (QoS 1) so a slow or absent broker never blocks the
//! publisher. A background thread drives the connection: it logs connect and
//! disconnect events, re-subscribes after every ConnAck, and forwards
//! inbound publishes to a bounded channel (dropped when the channel is full).

use crate::inbound::InboundMessage;
use crate::periodic::{StopSignal, WorkerThread, idle, should_log};
use crate::publisher::{MessageTransport, PublishError};
use crane_common::consts::INBOUND_CHANNEL_CAPACITY;
use crane_common::hal::config::MqttConfig;
use crane_common::hal::driver::HalError;
use parking_lot::Mutex;
use rumqttc::{Client, ClientError, Connection, Event, MqttOptions, Packet, QoS};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Outgoing request queue depth inside the client.
const REQUEST_QUEUE_CAPACITY: usize = 10;

/// Pause after a connection error before the event loop reconnects.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Bound on waiting for the event-loop thread at close.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// MQTT-backed [`MessageTransport`].
pub struct MqttTransport {
    client: Client,
    stop: StopSignal,
    thread: Mutex<Option<WorkerThread>>,
}

impl MqttTransport {
    /// Create the client and start its event-loop thread.
    ///
    /// Returns the transport and the receiver of inbound messages on the
    /// configured subscriptions.
    pub fn connect(
        config: &MqttConfig,
    ) -> Result<(Self, Receiver<InboundMessage>), HalError> {
        let client_id = format!("crane-gateway-{}", Uuid::new_v4());
        let mut options = MqttOptions::new(client_id.clone(), config.host.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_s));
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            options.set_credentials(user.clone(), pass.clone());
        }

        let (client, connection) = Client::new(options, REQUEST_QUEUE_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::sync_channel(INBOUND_CHANNEL_CAPACITY);
        let stop = StopSignal::new();

        let subscriptions = vec![
            config.inclination_topic.clone(),
            config.detection_topic.clone(),
        ];
        let loop_client = client.clone();
        let loop_stop = stop.clone();
        let thread = WorkerThread::spawn("mqtt-events", move || {
            drive_connection(connection, loop_client, subscriptions, inbound_tx, loop_stop);
        })
        .map_err(|e| HalError::Io(format!("failed to spawn MQTT event loop: {e}")))?;

        info!(
            "MQTT client {} connecting to {}:{}",
            client_id, config.host, config.port
        );
        Ok((
            Self {
                client,
                stop,
                thread: Mutex::new(Some(thread)),
            },
            inbound_rx,
        ))
    }
}

fn map_client_error(err: ClientError) -> PublishError {
    match err {
        ClientError::TryRequest(_) => PublishError::Rejected("request queue full".to_string()),
        other => PublishError::Disconnected(other.to_string()),
    }
}

impl MessageTransport for MqttTransport {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, payload.to_vec())
            .map_err(map_client_error)
    }

    fn close(&self) {
        self.stop.request();
        if let Err(e) = self.client.try_disconnect() {
            debug!("MQTT disconnect request failed: {}", e);
        }
        if let Some(mut thread) = self.thread.lock().take() {
            if !thread.join(CLOSE_TIMEOUT) {
                warn!("MQTT event loop did not stop within {:?}", CLOSE_TIMEOUT);
            }
        }
        info!("MQTT transport closed");
    }
}

fn drive_connection(
    mut connection: Connection,
    client: Client,
    subscriptions: Vec<String>,
    inbound: SyncSender<InboundMessage>,
    stop: StopSignal,
) {
    let mut errors = 0u64;
    let mut dropped = 0u64;

    for event in connection.iter() {
        if stop.is_requested() {
            break;
        }
        match event {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                info!("MQTT connected ({:?})", ack.code);
                errors = 0;
                for topic in &subscriptions {
                    if let Err(e) = client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                        warn!("MQTT subscribe to {} failed: {}", topic, e);
                    }
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let msg = InboundMessage {
                    topic: publish.topic.clone(),
                    payload: publish.payload.to_vec(),
                };
                match inbound.try_send(msg) {
                    Ok(()) => {}
                    Err(TrySendError::Full(msg)) => {
                        dropped += 1;
                        if should_log(dropped) {
                            warn!("inbound queue full, dropped message on {} (#{})", msg.topic, dropped);
                        }
                    }
                    Err(TrySendError::Disconnected(_)) => {
                        debug!("inbound consumer gone");
                    }
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("MQTT broker sent disconnect");
            }
            Ok(_) => {}
            Err(e) => {
                errors += 1;
                if should_log(errors) {
                    error!("MQTT connection error (#{}): {}", errors, e);
                }
                if !idle(RECONNECT_DELAY, &stop) {
                    break;
                }
            }
        }
    }
    debug!("MQTT event loop exited");
}
