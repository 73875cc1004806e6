use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use dashmap::DashMap;
use log::{debug, error, warn};
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::{
    connection::{ConnectionId, ConnectionIdGenerator},
    constants::{BROKER_EVENT_QUEUE_CAPACITY, OUTBOUND_QUEUE_CAPACITY},
    packets::Packet,
    protocol::Qos,
    router::{CredentialCheck, Router, Transport},
};

/// What the broker asks a connection task to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Write these encoded packet bytes.
    Packet(Bytes),

    /// Close the connection once everything queued before has been written.
    Close,
}

#[derive(Debug)]
pub(crate) enum BrokerEvent {
    Opened(ConnectionId),
    Packet(ConnectionId, Packet),
    Closed(ConnectionId),
}

/// Outbound queue of every live connection.
///
/// Queues are bounded. A connection whose queue is full is unregistered: its session writes
/// what is already queued, sees the queue end and closes.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    connections: Arc<DashMap<ConnectionId, mpsc::Sender<Outbound>>>,
}

impl Registry {
    fn register(&self, connection: ConnectionId, tx: mpsc::Sender<Outbound>) {
        self.connections.insert(connection, tx);
    }

    fn unregister(&self, connection: ConnectionId) {
        self.connections.remove(&connection);
    }

    pub fn contains(&self, connection: ConnectionId) -> bool {
        self.connections.contains_key(&connection)
    }

    fn push(&self, connection: ConnectionId, outbound: Outbound) {
        // The map guard must be released before `unregister` touches the same shard
        let result = match self.connections.get(&connection) {
            Some(tx) => tx.try_send(outbound),
            None => {
                debug!("Connection {connection} is not registered, dropping outbound message");
                return;
            }
        };

        match result {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Outbound queue of connection {connection} is full, disconnecting it");
                self.unregister(connection);
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Connection {connection} is gone, dropping outbound message");
            }
        }
    }
}

impl Transport for Registry {
    fn send(&self, connection: ConnectionId, bytes: Bytes) {
        self.push(connection, Outbound::Packet(bytes));
    }

    fn close(&self, connection: ConnectionId) {
        self.push(connection, Outbound::Close);
    }
}

/// Handle to the broker. Cheap to clone; every clone talks to the same router task.
#[derive(Clone)]
pub struct BrokerState {
    registry: Registry,
    ids: Arc<ConnectionIdGenerator>,
    event_tx: mpsc::Sender<BrokerEvent>,
}

impl BrokerState {
    /// Spawns the router task. Must be called inside a tokio runtime.
    pub fn new(credentials: Box<dyn CredentialCheck>, max_granted_qos: Qos) -> Self {
        let (tx, rx) = mpsc::channel(BROKER_EVENT_QUEUE_CAPACITY);

        let registry = Registry::default();
        let router = Router::new(registry.clone(), credentials, max_granted_qos);

        tokio::spawn(handle_broker_events(router, rx));

        Self { registry, ids: Arc::new(ConnectionIdGenerator::new()), event_tx: tx }
    }

    /// Registers a new connection and returns its id and outbound queue.
    pub async fn open(&self) -> anyhow::Result<(ConnectionId, mpsc::Receiver<Outbound>)> {
        let connection = self.ids.generate();
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);

        self.registry.register(connection, tx);
        self.event_tx
            .send(BrokerEvent::Opened(connection))
            .await
            .context("Broker is not running")?;

        Ok((connection, rx))
    }

    pub async fn packet(&self, connection: ConnectionId, packet: Packet) -> anyhow::Result<()> {
        self.event_tx
            .send(BrokerEvent::Packet(connection, packet))
            .await
            .context("Broker is not running")
    }

    pub async fn close(&self, connection: ConnectionId) -> anyhow::Result<()> {
        self.event_tx
            .send(BrokerEvent::Closed(connection))
            .await
            .context("Broker is not running")
    }
}

async fn handle_broker_events(mut router: Router<Registry>, mut rx: mpsc::Receiver<BrokerEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            BrokerEvent::Opened(connection) => router.on_open(connection),
            BrokerEvent::Packet(connection, packet) => router.dispatch(connection, packet),
            BrokerEvent::Closed(connection) => {
                router.on_close(connection);
                router.transport().unregister(connection);
            }
        }
    }

    error!("Broker event channel closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        encoder::encode,
        packets::{conn_ack_packet::ConnAckPacket, connect_packet::ConnectPacket},
        router::AllowAnonymous,
    };

    #[tokio::test]
    async fn routes_through_the_actor() {
        let broker_state = BrokerState::new(Box::new(AllowAnonymous), Qos::AtMostOnce);
        let (connection, mut outbound) = broker_state.open().await.unwrap();

        broker_state
            .packet(connection, Packet::Connect(ConnectPacket::new("client", 0)))
            .await
            .unwrap();
        broker_state.packet(connection, Packet::ping_req()).await.unwrap();
        broker_state.packet(connection, Packet::disconnect()).await.unwrap();

        let conn_ack = encode(&Packet::ConnAck(ConnAckPacket::accepted())).unwrap();
        assert_eq!(outbound.recv().await, Some(Outbound::Packet(conn_ack)));
        assert_eq!(
            outbound.recv().await,
            Some(Outbound::Packet(encode(&Packet::ping_resp()).unwrap()))
        );
        assert_eq!(outbound.recv().await, Some(Outbound::Close));
    }

    #[tokio::test]
    async fn closed_connections_are_unregistered() {
        let broker_state = BrokerState::new(Box::new(AllowAnonymous), Qos::AtMostOnce);
        let (connection, mut outbound) = broker_state.open().await.unwrap();

        broker_state.close(connection).await.unwrap();

        // The registry drops the only sender once the close is processed
        assert_eq!(outbound.recv().await, None);
    }

    #[test]
    fn slow_consumer_is_unregistered() {
        let registry = Registry::default();
        let connection = ConnectionId::new(7);
        let (tx, mut rx) = mpsc::channel(2);
        registry.register(connection, tx);

        for chunk in [&b"a"[..], b"b", b"c"] {
            registry.send(connection, Bytes::copy_from_slice(chunk));
        }

        assert!(!registry.contains(connection));

        // Queued packets still drain, then the queue ends
        assert_eq!(rx.try_recv().unwrap(), Outbound::Packet(Bytes::from_static(b"a")));
        assert_eq!(rx.try_recv().unwrap(), Outbound::Packet(Bytes::from_static(b"b")));
        assert!(matches!(rx.try_recv(), Err(mpsc::error::TryRecvError::Disconnected)));
    }

    #[test]
    fn unknown_connections_are_ignored() {
        let registry = Registry::default();
        registry.send(ConnectionId::new(99), Bytes::from_static(b"x"));
        registry.close(ConnectionId::new(99));
    }
}
