use anyhow::Context;
use log::{debug, error, info, warn};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
};

use crate::{
    broker_state::{BrokerState, Outbound},
    codec::StreamDecoder,
    connection::{Connection, ConnectionId},
};

/// One client connection: inbound chunks go through the decoder to the broker, outbound
/// packets from the broker go to the socket in queue order.
pub struct Session<S> {
    id: ConnectionId,
    connection: Connection<S>,
    decoder: StreamDecoder,
    outbound: mpsc::Receiver<Outbound>,
    broker_state: BrokerState,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Runs the connection until either side closes it, then tells the broker to forget it.
    pub async fn handle_session(stream: S, broker_state: BrokerState) -> anyhow::Result<()> {
        let (id, outbound) = broker_state.open().await?;
        info!("Connection {id} opened");

        let mut session = Self {
            id,
            connection: Connection::new(stream),
            decoder: StreamDecoder::new(),
            outbound,
            broker_state,
        };

        let result = session.run().await;

        if let Err(e) = session.broker_state.close(id).await {
            error!("Failed to notify broker about closed connection {id}: {e:?}");
        }
        if let Err(e) = session.connection.shutdown().await {
            debug!("Shutdown of connection {id} failed: {e}");
        }

        info!("Connection {id} closed");
        result
    }

    async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                chunk = self.connection.read_chunk() => {
                    let Some(chunk) = chunk.context("Failed to read from connection")? else {
                        debug!("Connection {} reached EOF", self.id);
                        return Ok(());
                    };

                    if !self.on_chunk(&chunk).await? {
                        return Ok(());
                    }
                }
                outbound = self.outbound.recv() => {
                    match outbound {
                        Some(Outbound::Packet(bytes)) => {
                            self.connection
                                .write_chunk(&bytes)
                                .await
                                .context("Failed to write to connection")?;
                        }
                        Some(Outbound::Close) | None => {
                            debug!("Broker closed connection {}", self.id);
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    /// Decodes a chunk and hands the packets to the broker in order.
    ///
    /// Returns `false` when the chunk was malformed and the connection must close.
    async fn on_chunk(&mut self, chunk: &[u8]) -> anyhow::Result<bool> {
        let mut packets = Vec::new();
        let decoded = self.decoder.on_bytes(chunk, |packet| packets.push(packet));

        for packet in packets {
            self.broker_state.packet(self.id, packet).await?;
        }

        if let Err(e) = decoded {
            warn!("Closing connection {}: {e}", self.id);
            return Ok(false);
        }

        Ok(true)
    }
}
