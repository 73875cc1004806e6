use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use bytes::{Bytes, BytesMut};
use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::constants::READ_BUFFER_CAPACITY;

/// Identifies one client connection for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out increasing connection ids.
#[derive(Debug)]
pub struct ConnectionIdGenerator(AtomicU64);

impl ConnectionIdGenerator {
    pub fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    pub fn generate(&self) -> ConnectionId {
        ConnectionId(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Byte-chunk transport over a stream socket.
#[derive(Debug)]
pub struct Connection<S> {
    stream: S,
    buffer: BytesMut,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Connection<S> {
        Connection { stream, buffer: BytesMut::with_capacity(READ_BUFFER_CAPACITY) }
    }

    /// Read the next chunk of bytes from the connection.
    ///
    /// Returns `None` if EOF is reached.
    pub async fn read_chunk(&mut self) -> io::Result<Option<Bytes>> {
        if self.buffer.capacity() == 0 {
            self.buffer.reserve(READ_BUFFER_CAPACITY);
        }

        let n = self.stream.read_buf(&mut self.buffer).await?;
        if n == 0 {
            return Ok(None);
        }

        Ok(Some(self.buffer.split().freeze()))
    }

    /// Write encoded packet bytes to the connection.
    pub async fn write_chunk(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;

        Ok(())
    }

    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let generator = ConnectionIdGenerator::new();
        let first = generator.generate();
        let second = generator.generate();

        assert_ne!(first, second);
        assert!(first < second);
        assert_eq!(first.to_string(), format!("#{}", first.value()));
    }

    #[tokio::test]
    async fn reads_chunks_until_eof() {
        let (client, server) = tokio::io::duplex(64);
        let mut server = Connection::new(server);
        let mut client = Connection::new(client);

        client.write_chunk(&[0xC0, 0x00]).await.unwrap();
        assert_eq!(server.read_chunk().await.unwrap(), Some(Bytes::from_static(&[0xC0, 0x00])));

        drop(client);
        assert_eq!(server.read_chunk().await.unwrap(), None);
    }
}
