use std::net::SocketAddr;

use bytes::BytesMut;
use serde::de::DeserializeOwned;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt, BufReader},
    net::TcpStream,
};

use crate::message::Message;

/// Longest line a peer may send before the connection is dropped.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// One RON-encoded message per line.
#[derive(Debug)]
pub struct Connection {
    stream: BufReader<TcpStream>,
    buffer: BytesMut,
    pub addr: SocketAddr,
}

impl Connection {
    pub fn new(socket: TcpStream, addr: SocketAddr) -> Self {
        Self {
            buffer: BytesMut::with_capacity(256),
            stream: BufReader::new(socket),
            addr,
        }
    }

    pub async fn connect(addr: &str) -> anyhow::Result<Self> {
        let socket = TcpStream::connect(addr).await?;
        let peer = socket.peer_addr()?;
        Ok(Self::new(socket, peer))
    }

    /// Reads the next message. `Ok(None)` means the peer closed cleanly.
    /// A malformed line yields a `ron::error::SpannedError` and is discarded,
    /// so the caller may keep reading.
    pub async fn recv<T>(&mut self) -> anyhow::Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        loop {
            if let Some(end) = self.buffer.iter().position(|&b| b == b'\n') {
                let line = self.buffer.split_to(end + 1);
                let line = &line[..end];
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                return Ok(Some(ron::de::from_bytes(line)?));
            }
            if self.buffer.len() > MAX_LINE_LEN {
                anyhow::bail!("message longer than {MAX_LINE_LEN} bytes");
            }

            if 0 == self.stream.read_buf(&mut self.buffer).await? {
                if self.buffer.iter().all(u8::is_ascii_whitespace) {
                    return Ok(None);
                }
                anyhow::bail!("connection reset by peer");
            }
        }
    }

    pub async fn send(&mut self, mes: impl Into<Message>) -> anyhow::Result<()> {
        let mut line = ron::ser::to_string::<Message>(&mes.into())?;
        line.push('\n');
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.flush().await?;
        Ok(())
    }
}
