use byteorder::{BigEndian, LittleEndian};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs, UdpSocket};
use tokio::time::timeout;
use tracing::info;

use crate::command::encode_key_payload;
use crate::constants::RECEIVE_BUFFER_SIZE;
use crate::error::TransportError;
use crate::ethernet::EthernetProtocol;
use crate::protocol::CommandId;

/// Sending half of a link to the robot.
pub trait ChannelSender: Send + 'static {
    /// Write one frame, as a single write or datagram.
    fn send(&mut self, frame: Bytes) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Close the sending side. Closing twice is not an error.
    fn close(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Receiving half of a link to the robot.
pub trait ChannelReceiver: Send + 'static {
    /// Wait up to `timeout` for data. `Ok(None)` means nothing arrived in time.
    fn recv(&mut self, timeout: Duration) -> impl Future<Output = Result<Option<Bytes>, TransportError>> + Send;
}

/// A bidirectional link that can be split into independently owned halves.
pub trait DuplexChannel {
    type Sender: ChannelSender;
    type Receiver: ChannelReceiver;

    fn split(self) -> (Self::Sender, Self::Receiver);
}

/// Any tokio reader/writer pair.
pub struct StreamChannel<R, W> {
    reader: R,
    writer: W,
}

pub type TcpChannel = StreamChannel<OwnedReadHalf, OwnedWriteHalf>;

impl<R, W> StreamChannel<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }
}

impl TcpChannel {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        info!(peer = %stream.peer_addr()?, "Connected to robot over TCP");
        let (reader, writer) = stream.into_split();
        Ok(Self::new(reader, writer))
    }
}

impl<R, W> DuplexChannel for StreamChannel<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    type Sender = StreamSender<W>;
    type Receiver = StreamReceiver<R>;

    fn split(self) -> (Self::Sender, Self::Receiver) {
        (
            StreamSender {
                writer: self.writer,
                closed: false,
            },
            StreamReceiver {
                reader: self.reader,
                buffer: vec![0; RECEIVE_BUFFER_SIZE],
            },
        )
    }
}

pub struct StreamSender<W> {
    writer: W,
    closed: bool,
}

impl<W: AsyncWrite + Unpin + Send + 'static> ChannelSender for StreamSender<W> {
    fn send(&mut self, frame: Bytes) -> impl Future<Output = Result<(), TransportError>> + Send {
        async move {
            if self.closed {
                return Err(TransportError::Closed);
            }
            self.writer.write_all(&frame).await?;
            self.writer.flush().await?;
            Ok(())
        }
    }

    fn close(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send {
        async move {
            if !self.closed {
                self.closed = true;
                self.writer.shutdown().await?;
            }
            Ok(())
        }
    }
}

pub struct StreamReceiver<R> {
    reader: R,
    buffer: Vec<u8>,
}

impl<R: AsyncRead + Unpin + Send + 'static> ChannelReceiver for StreamReceiver<R> {
    fn recv(&mut self, wait: Duration) -> impl Future<Output = Result<Option<Bytes>, TransportError>> + Send {
        async move {
            match timeout(wait, self.reader.read(&mut self.buffer)).await {
                Err(_) => Ok(None),
                Ok(Ok(0)) => Err(TransportError::Closed),
                Ok(Ok(n)) => Ok(Some(Bytes::copy_from_slice(&self.buffer[..n]))),
                Ok(Err(e)) => Err(e.into()),
            }
        }
    }
}

/// A UDP socket connected to the robot, one datagram per command.
pub struct UdpChannel {
    socket: Arc<UdpSocket>,
}

impl UdpChannel {
    pub async fn connect(local: SocketAddr, remote: SocketAddr) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(local).await?;
        socket.connect(remote).await?;
        info!(%local, %remote, "UDP link to robot ready");
        Ok(Self {
            socket: Arc::new(socket),
        })
    }
}

impl DuplexChannel for UdpChannel {
    type Sender = UdpSender;
    type Receiver = UdpReceiver;

    fn split(self) -> (Self::Sender, Self::Receiver) {
        (
            UdpSender {
                socket: self.socket.clone(),
                closed: false,
            },
            UdpReceiver {
                socket: self.socket,
                buffer: vec![0; RECEIVE_BUFFER_SIZE],
            },
        )
    }
}

pub struct UdpSender {
    socket: Arc<UdpSocket>,
    closed: bool,
}

impl ChannelSender for UdpSender {
    fn send(&mut self, frame: Bytes) -> impl Future<Output = Result<(), TransportError>> + Send {
        async move {
            if self.closed {
                return Err(TransportError::Closed);
            }
            self.socket.send(&frame).await?;
            Ok(())
        }
    }

    fn close(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send {
        self.closed = true;
        async { Ok(()) }
    }
}

pub struct UdpReceiver {
    socket: Arc<UdpSocket>,
    buffer: Vec<u8>,
}

impl ChannelReceiver for UdpReceiver {
    fn recv(&mut self, wait: Duration) -> impl Future<Output = Result<Option<Bytes>, TransportError>> + Send {
        async move {
            match timeout(wait, self.socket.recv(&mut self.buffer)).await {
                Err(_) => Ok(None),
                Ok(Ok(n)) => Ok(Some(Bytes::copy_from_slice(&self.buffer[..n]))),
                Ok(Err(e)) => Err(e.into()),
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

/// How commands are written to the link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WireEncoding {
    /// 32-bit key then 32-bit payload when present
    Binary { endianness: Endianness },
    /// Lines of the text protocol
    #[default]
    Text,
}

impl WireEncoding {
    /// Bytes for one command, `None` when the encoding cannot express it.
    pub fn encode(&self, id: CommandId, key: u32, payload: Option<u32>) -> Option<Bytes> {
        match self {
            WireEncoding::Binary {
                endianness: Endianness::Little,
            } => Some(encode_key_payload::<LittleEndian>(key, payload)),
            WireEncoding::Binary {
                endianness: Endianness::Big,
            } => Some(encode_key_payload::<BigEndian>(key, payload)),
            WireEncoding::Text => EthernetProtocol::translate(id, payload).map(Bytes::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stream_channel_roundtrip() {
        let (local, remote) = tokio::io::duplex(64);
        let (reader, writer) = tokio::io::split(local);
        let (mut sender, mut receiver) = StreamChannel::new(reader, writer).split();
        let (mut remote_reader, mut remote_writer) = tokio::io::split(remote);

        sender.send(Bytes::from_static(b"!M+\n")).await.unwrap();
        let mut buf = [0u8; 4];
        remote_reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"!M+\n");

        assert!(receiver.recv(Duration::from_millis(10)).await.unwrap().is_none());
        remote_writer.write_all(&[0x81, 0x41]).await.unwrap();
        let data = receiver.recv(Duration::from_secs(1)).await.unwrap();
        assert_eq!(data.as_deref(), Some(&[0x81, 0x41][..]));

        drop(remote_writer);
        drop(remote_reader);
        assert!(matches!(
            receiver.recv(Duration::from_secs(1)).await,
            Err(TransportError::Closed)
        ));

        sender.close().await.unwrap();
        sender.close().await.unwrap();
        assert!(matches!(
            sender.send(Bytes::from_static(b"x")).await,
            Err(TransportError::Closed)
        ));
    }

    #[test]
    fn test_binary_encoding() {
        let big = WireEncoding::Binary {
            endianness: Endianness::Big,
        };
        let bytes = big.encode(CommandId::Motor0Permanent, 0x200, Some(5)).unwrap();
        assert_eq!(hex::encode(bytes), "0000020000000005");
        let text = WireEncoding::Text.encode(CommandId::Motor0Permanent, 0x200, Some(5)).unwrap();
        assert_eq!(&text[..], b"!MV0=5\n");
        assert!(WireEncoding::Text.encode(CommandId::RetinaSetKey, 2, Some(5)).is_none());
    }
}
