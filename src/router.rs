//! Broker session logic: authentication gate, subscription table and publish fan-out.
//!
//! The router is synchronous and owns all broker state. Replies and forwards go out through
//! a [`Transport`]; nothing here touches sockets.

use std::collections::HashMap;

use bytes::Bytes;
use log::{debug, error, info, warn};

use crate::{
    connection::ConnectionId,
    encoder::encode,
    packets::{
        conn_ack_packet::{ConnAckPacket, ConnectReturnCode},
        connect_packet::ConnectPacket,
        publish_packet::PublishPacket,
        sub_ack_packet::SubAckPacket,
        subscribe_packet::SubscribePacket,
        unsubscribe_packet::UnsubscribePacket,
        Packet,
    },
    protocol::Qos,
};

pub mod auth;
pub mod subscription_table;

pub use auth::{AllowAnonymous, CredentialCheck, StaticCredentials};
pub use subscription_table::{Subscriber, SubscriptionTable};

/// Byte-chunk sink the router writes to.
///
/// Bytes sent to one connection must reach it in call order.
pub trait Transport {
    fn send(&self, connection: ConnectionId, bytes: Bytes);

    fn close(&self, connection: ConnectionId);
}

#[derive(Debug, Default)]
enum SessionState {
    #[default]
    AwaitingConnect,
    Connected {
        client_identifier: String,
    },
    /// Closed by the router. Packets still in flight are dropped until the transport
    /// reports the close through [`Router::on_close`].
    Closed,
}

pub struct Router<T> {
    transport: T,
    credentials: Box<dyn CredentialCheck>,
    max_granted_qos: Qos,
    subscriptions: SubscriptionTable,
    sessions: HashMap<ConnectionId, SessionState>,
}

impl<T: Transport> Router<T> {
    pub fn new(transport: T, credentials: Box<dyn CredentialCheck>, max_granted_qos: Qos) -> Self {
        Self {
            transport,
            credentials,
            max_granted_qos,
            subscriptions: SubscriptionTable::new(),
            sessions: HashMap::new(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn subscriptions(&self) -> &SubscriptionTable {
        &self.subscriptions
    }

    pub fn is_authenticated(&self, connection: ConnectionId) -> bool {
        matches!(self.sessions.get(&connection), Some(SessionState::Connected { .. }))
    }

    /// Whether the router closed `connection` and waits for the transport to confirm.
    pub fn is_closing(&self, connection: ConnectionId) -> bool {
        matches!(self.sessions.get(&connection), Some(SessionState::Closed))
    }

    /// Registers a new, unauthenticated connection.
    pub fn on_open(&mut self, connection: ConnectionId) {
        debug!("Connection {connection} opened");
        self.sessions.insert(connection, SessionState::default());
    }

    /// Routes one decoded packet from `connection`.
    ///
    /// Packets from connections that are unknown or already closed are dropped.
    pub fn dispatch(&mut self, connection: ConnectionId, packet: Packet) {
        let authenticated = match self.sessions.get(&connection) {
            Some(SessionState::AwaitingConnect) => false,
            Some(SessionState::Connected { .. }) => true,
            Some(SessionState::Closed) | None => {
                debug!("Dropping {} from closed connection {connection}", packet.packet_type());
                return;
            }
        };

        match packet {
            Packet::Connect(connect) if !authenticated => self.on_connect(connection, &connect),
            Packet::Connect(_) => {
                warn!("Connection {connection} sent a second CONNECT");
                self.close(connection);
            }
            packet if !authenticated => {
                warn!("Connection {connection} sent {} before CONNECT", packet.packet_type());
                self.close(connection);
            }
            Packet::Publish(publish) => self.on_publish(connection, &publish),
            Packet::Subscribe(subscribe) => self.on_subscribe(connection, &subscribe),
            Packet::Unsubscribe(unsubscribe) => self.on_unsubscribe(connection, &unsubscribe),
            Packet::PingReq(_) => self.on_ping_req(connection),
            Packet::PubAck(ack) | Packet::PubRec(ack) | Packet::PubRel(ack) | Packet::PubComp(ack) => {
                debug!(
                    "Ignoring {} {} from connection {connection}",
                    ack.fixed_header.packet_type, ack.message_id
                );
            }
            Packet::Disconnect(_) => {
                info!("Connection {connection} disconnected");
                self.close(connection);
            }
            packet @ (Packet::ConnAck(_)
            | Packet::SubAck(_)
            | Packet::UnsubAck(_)
            | Packet::PingResp(_)) => {
                warn!("Connection {connection} sent server-only {}", packet.packet_type());
                self.close(connection);
            }
        }
    }

    /// Checks the credentials of a CONNECT and answers with CONNACK.
    ///
    /// On refusal the CONNACK carries return code 0x04 and the connection is closed.
    pub fn on_connect(&mut self, connection: ConnectionId, packet: &ConnectPacket) {
        if !matches!(self.sessions.get(&connection), Some(SessionState::AwaitingConnect)) {
            warn!("Ignoring CONNECT on connection {connection}: not awaiting one");
            return;
        }

        let payload = &packet.payload;
        let user_name = payload.user_name.as_deref().unwrap_or_default();
        let password = payload.password.as_deref().unwrap_or_default();

        if !self.credentials.check(user_name, password) {
            warn!(
                "Authentication failed for client {} on connection {connection}",
                payload.client_identifier
            );
            let refusal = ConnAckPacket::refused(ConnectReturnCode::BadUserNameOrPassword);
            self.send(connection, &Packet::ConnAck(refusal));
            self.close(connection);
            return;
        }

        info!(
            "Client {} connected on connection {connection} ({} level {})",
            payload.client_identifier,
            packet.variable_header.protocol_name,
            packet.variable_header.protocol_level
        );

        self.sessions.insert(
            connection,
            SessionState::Connected { client_identifier: payload.client_identifier.clone() },
        );

        self.send(connection, &Packet::ConnAck(ConnAckPacket::accepted()));
    }

    /// Records each subscription at `min(requested, max granted)` and answers with one SUBACK.
    pub fn on_subscribe(&mut self, connection: ConnectionId, packet: &SubscribePacket) {
        let granted_qos: Vec<Qos> = packet
            .subscriptions
            .iter()
            .map(|subscription| {
                let granted = subscription.requested_qos.min(self.max_granted_qos);
                self.subscriptions.subscribe(&subscription.topic_filter, connection, granted);

                debug!(
                    "Connection {connection} subscribed to {} (requested {}, granted {})",
                    subscription.topic_filter, subscription.requested_qos, granted
                );
                granted
            })
            .collect();

        let sub_ack = SubAckPacket::new(packet.message_id, granted_qos);
        self.send(connection, &Packet::SubAck(sub_ack));
    }

    /// Removes the listed filters for `connection` and answers with UNSUBACK.
    pub fn on_unsubscribe(&mut self, connection: ConnectionId, packet: &UnsubscribePacket) {
        for topic_filter in &packet.topic_filters {
            let removed = self.subscriptions.unsubscribe(topic_filter, connection);
            debug!("Connection {connection} unsubscribed from {topic_filter} (removed: {removed})");
        }

        self.send(connection, &Packet::unsub_ack(packet.message_id));
    }

    /// Forwards a PUBLISH to every exact-match subscriber.
    ///
    /// A subscriber with a granted `QoS` above 0 is skipped when the PUBLISH has no packet id.
    /// Each forward goes out at `min(inbound, granted)`. The publisher gets at most one ack,
    /// sent before the forwards and chosen by the lowest `QoS` actually forwarded: PUBACK for
    /// `QoS` 1, PUBREC for `QoS` 2, nothing for `QoS` 0 or when nothing was forwarded.
    pub fn on_publish(&mut self, connection: ConnectionId, packet: &PublishPacket) {
        let topic_name = packet.topic_name();
        let packet_id = packet.packet_id();
        let inbound_qos = packet.qos();

        let mut forwards = Vec::new();
        let mut ack_qos: Option<Qos> = None;

        for subscriber in self.subscriptions.subscribers(topic_name) {
            if subscriber.granted_qos > Qos::AtMostOnce && packet_id.is_none() {
                debug!(
                    "Skipping connection {} for {topic_name}: no packet id for granted {}",
                    subscriber.connection, subscriber.granted_qos
                );
                continue;
            }

            let qos = inbound_qos.min(subscriber.granted_qos);
            let forward_id = if qos > Qos::AtMostOnce { packet_id } else { None };
            let forward = PublishPacket::new(topic_name, qos, forward_id, packet.payload.clone());

            ack_qos = Some(ack_qos.map_or(qos, |current| current.min(qos)));
            forwards.push((subscriber.connection, forward));
        }

        debug!(
            "PUBLISH {topic_name} from connection {connection}: {} subscriber(s), ack {:?}",
            forwards.len(),
            ack_qos
        );

        let ack = match (ack_qos, packet_id) {
            (Some(Qos::AtLeastOnce), Some(packet_id)) => Some(Packet::pub_ack(packet_id)),
            (Some(Qos::ExactlyOnce), Some(packet_id)) => Some(Packet::pub_rec(packet_id)),
            _ => None,
        };
        if let Some(ack) = ack {
            self.send(connection, &ack);
        }

        for (subscriber, forward) in forwards {
            self.send(subscriber, &Packet::Publish(forward));
        }
    }

    pub fn on_ping_req(&mut self, connection: ConnectionId) {
        self.send(connection, &Packet::ping_resp());
    }

    /// The transport closed `connection`: forget it and every subscription it holds.
    /// Safe to call more than once.
    pub fn on_close(&mut self, connection: ConnectionId) {
        let removed = self.subscriptions.remove_connection(connection);

        if let Some(session) = self.sessions.remove(&connection) {
            debug!("Connection {connection} closed ({session:?}, subscriptions removed: {removed})");
        }
    }

    /// Asks the transport to close `connection`. Its subscriptions go right away; the session
    /// stays marked closed until [`Router::on_close`].
    fn close(&mut self, connection: ConnectionId) {
        self.transport.close(connection);

        let removed = self.subscriptions.remove_connection(connection);
        if let Some(session) = self.sessions.get_mut(&connection) {
            debug!("Closing connection {connection} (subscriptions removed: {removed})");
            *session = SessionState::Closed;
        }
    }

    fn send(&self, connection: ConnectionId, packet: &Packet) {
        match encode(packet) {
            Ok(bytes) => self.transport.send(connection, bytes),
            Err(e) => {
                error!("Failed to encode {} for connection {connection}: {e}", packet.packet_type());
            }
        }
    }
}
