//! Networking primitives.
//!
//! Goals:
//! - Provide a reliable (TCP) channel with length-prefixed JSON frames.
//! - Provide the store protocol messages exchanged by clients and the store.
//! - Keep serialization explicit and versionable.
//!
//! The store only ever pushes whole collections, so there is no delta or
//! acknowledgement layer here.

use std::net::SocketAddr;

use anyhow::Context;
use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
};

use crate::resources::{ItemId, ResourceSnapshot};
use crate::store::{ParticipantId, ParticipantRecord, PresenceSnapshot};

/// Protocol version for compatibility checks.
pub const PROTOCOL_VERSION: u32 = 1;

/// Frames larger than this are rejected as corrupt.
pub const MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

/// Store protocol envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StoreMsg {
    // ─── Connection handshake ───
    /// Client -> store: identifies the participant key this connection owns.
    Hello {
        protocol: u32,
        participant: ParticipantId,
    },
    /// Store -> client: the connection is live.
    Welcome {
        server_time_ms: i64,
    },

    // ─── Presence ───
    /// Client -> store: delete my key when this connection drops.
    ArmRemovalOnDisconnect,
    /// Client -> store: overwrite my record.
    WriteOwn(ParticipantRecord),
    /// Client -> store: start pushing the participant collection.
    Subscribe,
    /// Store -> client: the full participant collection.
    Presence(PresenceSnapshot),

    // ─── Resources ───
    /// Client -> store: collect an item (first writer wins).
    ClaimItem {
        item: ItemId,
    },
    /// Store -> client: items and inventories.
    Resources(ResourceSnapshot),

    // ─── Disconnect ───
    Disconnect {
        reason: String,
    },
}

/// Serializes `msg` as a 4-byte big-endian length followed by JSON.
pub fn encode_frame(msg: &StoreMsg) -> anyhow::Result<BytesMut> {
    let payload = serde_json::to_vec(msg).context("serialize msg")?;
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(&payload);
    Ok(buf)
}

pub async fn write_frame<W: AsyncWrite + Unpin>(w: &mut W, msg: &StoreMsg) -> anyhow::Result<()> {
    let buf = encode_frame(msg)?;
    w.write_all(&buf).await.context("tcp write")?;
    Ok(())
}

pub async fn read_frame<R: AsyncRead + Unpin>(r: &mut R) -> anyhow::Result<StoreMsg> {
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf).await.context("tcp read len")?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        anyhow::bail!("frame of {len} bytes exceeds limit");
    }
    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload)
        .await
        .context("tcp read payload")?;
    let msg = serde_json::from_slice(&payload).context("deserialize msg")?;
    Ok(msg)
}

/// Reliable connection over TCP with length-prefixed frames.
#[derive(Debug)]
pub struct ReliableConn {
    stream: TcpStream,
}

impl ReliableConn {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await.context("tcp connect")?;
        stream.set_nodelay(true).context("tcp nodelay")?;
        Ok(Self::new(stream))
    }

    pub async fn send(&mut self, msg: &StoreMsg) -> anyhow::Result<()> {
        write_frame(&mut self.stream, msg).await
    }

    pub async fn recv(&mut self) -> anyhow::Result<StoreMsg> {
        read_frame(&mut self.stream).await
    }

    pub fn peer_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    /// Splits into independently owned read and write halves.
    pub fn into_split(self) -> (FrameReader, FrameWriter) {
        let (r, w) = self.stream.into_split();
        (FrameReader { half: r }, FrameWriter { half: w })
    }
}

/// Read half of a [`ReliableConn`].
#[derive(Debug)]
pub struct FrameReader {
    half: OwnedReadHalf,
}

impl FrameReader {
    pub async fn recv(&mut self) -> anyhow::Result<StoreMsg> {
        read_frame(&mut self.half).await
    }
}

/// Write half of a [`ReliableConn`].
#[derive(Debug)]
pub struct FrameWriter {
    half: OwnedWriteHalf,
}

impl FrameWriter {
    pub async fn send(&mut self, msg: &StoreMsg) -> anyhow::Result<()> {
        write_frame(&mut self.half, msg).await
    }
}

/// TCP server listener.
pub struct ReliableListener {
    listener: TcpListener,
}

impl ReliableListener {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> anyhow::Result<(ReliableConn, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await.context("tcp accept")?;
        stream.set_nodelay(true).context("tcp nodelay")?;
        Ok((ReliableConn::new(stream), addr))
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}
