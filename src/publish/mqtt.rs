// src/publish/mqtt.rs
//! MQTT publish sink

use super::Publisher;
use crate::error::{ProxyError, Result};
use async_trait::async_trait;
use log::{debug, error, info};
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};
use tokio::{sync::oneshot, task::JoinHandle};

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const REQUEST_CAPACITY: usize = 64;

/// Broker connection parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub credentials: Option<(String, String)>,
}

type AckSender = oneshot::Sender<Result<()>>;

/// Matches PUBACKs to the publish calls waiting for them.
///
/// The event loop reports each outgoing publish with the packet id it picked,
/// in the order requests were handed to the client, so the oldest queued
/// sender belongs to the next `Outgoing::Publish`.
#[derive(Default)]
struct PendingAcks {
    queued: VecDeque<AckSender>,
    in_flight: HashMap<u16, AckSender>,
    // failed after a connection error, the event loop will resend them
    orphaned: HashSet<u16>,
}

impl PendingAcks {
    fn enqueue(&mut self, ack: AckSender) {
        self.queued.push_back(ack);
    }

    fn cancel_last(&mut self) {
        self.queued.pop_back();
    }

    fn on_outgoing(&mut self, pkid: u16) {
        if self.orphaned.remove(&pkid) || self.in_flight.contains_key(&pkid) {
            return;
        }
        if let Some(ack) = self.queued.pop_front() {
            self.in_flight.insert(pkid, ack);
        }
    }

    fn on_ack(&mut self, pkid: u16) {
        if let Some(ack) = self.in_flight.remove(&pkid) {
            let _ = ack.send(Ok(()));
        }
    }

    fn fail_in_flight(&mut self, reason: &str) {
        for (pkid, ack) in self.in_flight.drain() {
            self.orphaned.insert(pkid);
            let _ = ack.send(Err(ProxyError::Publish(reason.to_string())));
        }
    }
}

/// Publishes retained QoS 1 messages and waits for the broker's PUBACK
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
    pending: Arc<Mutex<PendingAcks>>,
    order: Arc<tokio::sync::Mutex<()>>,
}

impl MqttPublisher {
    /// Connect to the broker and spawn the task driving the connection.
    ///
    /// Fails if the first connection attempt is not acknowledged.
    pub async fn connect(settings: &MqttSettings) -> Result<(Self, JoinHandle<()>)> {
        let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
        options.set_keep_alive(KEEP_ALIVE);
        if let Some((user, password)) = &settings.credentials {
            options.set_credentials(user, password);
        }

        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(ProxyError::Connection(format!(
                        "Failed to connect to MQTT broker at {}:{}: {}",
                        settings.host, settings.port, e
                    )))
                }
            }
        }
        info!("Connected to MQTT broker at {}:{}", settings.host, settings.port);

        let pending = Arc::new(Mutex::new(PendingAcks::default()));
        let driver = tokio::spawn(drive(eventloop, Arc::clone(&pending)));

        let publisher = Self {
            client,
            pending,
            order: Arc::new(tokio::sync::Mutex::new(())),
        };
        Ok((publisher, driver))
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.client.disconnect().await?;
        Ok(())
    }

    fn pending(&self) -> MutexGuard<'_, PendingAcks> {
        lock(&self.pending)
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    async fn publish(&self, topic: &str, value: &str) -> Result<()> {
        let (ack, acked) = oneshot::channel();

        {
            // keeps the ack queue in the same order as the client's requests
            let _order = self.order.lock().await;
            self.pending().enqueue(ack);

            let sent = self
                .client
                .publish(topic, QoS::AtLeastOnce, true, value.as_bytes().to_vec())
                .await;
            if let Err(e) = sent {
                self.pending().cancel_last();
                return Err(e.into());
            }
        }

        acked
            .await
            .map_err(|_| ProxyError::Publish("MQTT connection task stopped".to_string()))?
    }
}

async fn drive(mut eventloop: EventLoop, pending: Arc<Mutex<PendingAcks>>) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Outgoing(Outgoing::Publish(pkid))) => lock(&pending).on_outgoing(pkid),
            Ok(Event::Incoming(Packet::PubAck(ack))) => lock(&pending).on_ack(ack.pkid),
            Ok(Event::Incoming(Packet::ConnAck(_))) => info!("Reconnected to MQTT broker"),
            Ok(event) => debug!("MQTT event: {:?}", event),
            Err(ConnectionError::RequestsDone) => break,
            Err(e) => {
                error!("MQTT connection error: {}", e);
                lock(&pending).fail_in_flight(&e.to_string());
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
    debug!("MQTT event loop finished");
}

fn lock(pending: &Mutex<PendingAcks>) -> MutexGuard<'_, PendingAcks> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
