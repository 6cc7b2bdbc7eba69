//! TCP store client.
//!
//! [`RemoteStore`] speaks the store protocol over one reliable connection and
//! exposes it through [`SharedState`]. A reader task turns pushed collections
//! into `watch` updates; a writer task drains an unbounded queue so callers
//! never wait on the socket. The connectivity signal goes true after the
//! handshake and false, for good, once either task sees the connection fail.

use std::net::SocketAddr;

use anyhow::Context;
use playground_shared::{
    net::{FrameReader, FrameWriter, ReliableConn, StoreMsg, PROTOCOL_VERSION},
    resources::{ItemId, ResourceSnapshot},
    store::{ParticipantId, ParticipantRecord, PresenceSnapshot, SharedState, SnapshotSlot},
};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

/// Connection to a store server acting as one participant.
pub struct RemoteStore {
    id: ParticipantId,
    outbound: mpsc::UnboundedSender<StoreMsg>,
    presence: watch::Receiver<PresenceSnapshot>,
    resources: watch::Receiver<ResourceSnapshot>,
    connected: watch::Receiver<bool>,
    server_time_ms: i64,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl RemoteStore {
    /// Connects, performs the handshake and subscribes to the collections.
    pub async fn connect(addr: SocketAddr, id: ParticipantId) -> anyhow::Result<Self> {
        info!(server = %addr, participant = %id, "connecting to store");
        let mut conn = ReliableConn::connect(addr).await?;
        conn.send(&StoreMsg::Hello {
            protocol: PROTOCOL_VERSION,
            participant: id.clone(),
        })
        .await?;
        let server_time_ms = match conn.recv().await.context("await welcome")? {
            StoreMsg::Welcome { server_time_ms } => server_time_ms,
            StoreMsg::Disconnect { reason } => anyhow::bail!("store refused: {reason}"),
            other => anyhow::bail!("expected Welcome, got {other:?}"),
        };
        conn.send(&StoreMsg::Subscribe).await?;

        let (presence_tx, presence) = watch::channel(PresenceSnapshot::empty());
        let (resources_tx, resources) = watch::channel(ResourceSnapshot::default());
        let (connected_tx, connected) = watch::channel(true);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();

        let (read_half, write_half) = conn.into_split();
        let reader = tokio::spawn(read_loop(
            read_half,
            presence_tx,
            resources_tx,
            connected_tx.clone(),
        ));
        let writer = tokio::spawn(write_loop(write_half, outbound_rx, connected_tx));

        info!(participant = %id, server_time_ms, "connected to store");
        Ok(Self {
            id,
            outbound,
            presence,
            resources,
            connected,
            server_time_ms,
            reader,
            writer,
        })
    }

    /// Server clock at handshake time.
    pub fn server_time_ms(&self) -> i64 {
        self.server_time_ms
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Asks the store to collect `item`; first writer wins.
    pub fn claim_item(&self, item: ItemId) {
        self.send(StoreMsg::ClaimItem { item });
    }

    /// Latest items and inventories.
    pub fn resources(&self) -> watch::Receiver<ResourceSnapshot> {
        self.resources.clone()
    }

    /// Politely closes the connection; the store then deletes armed keys.
    pub fn close(&self, reason: &str) {
        self.send(StoreMsg::Disconnect {
            reason: reason.to_string(),
        });
    }

    fn send(&self, msg: StoreMsg) {
        if !self.is_connected() {
            debug!(participant = %self.id, "dropping message while disconnected");
            return;
        }
        if self.outbound.send(msg).is_err() {
            debug!(participant = %self.id, "writer task gone");
        }
    }
}

impl Drop for RemoteStore {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

impl SharedState for RemoteStore {
    fn local_id(&self) -> &ParticipantId {
        &self.id
    }

    fn write_own(&self, record: ParticipantRecord) {
        self.send(StoreMsg::WriteOwn(record));
    }

    fn subscribe_all(&self) -> SnapshotSlot {
        SnapshotSlot::new(self.presence.clone())
    }

    fn connectivity(&self) -> watch::Receiver<bool> {
        let mut rx = self.connected.clone();
        rx.mark_changed();
        rx
    }

    fn register_removal_on_disconnect(&self) {
        self.send(StoreMsg::ArmRemovalOnDisconnect);
    }
}

async fn read_loop(
    mut reader: FrameReader,
    presence: watch::Sender<PresenceSnapshot>,
    resources: watch::Sender<ResourceSnapshot>,
    connected: watch::Sender<bool>,
) {
    loop {
        match reader.recv().await {
            Ok(StoreMsg::Presence(snapshot)) => {
                presence.send_replace(snapshot);
            }
            Ok(StoreMsg::Resources(snapshot)) => {
                resources.send_replace(snapshot);
            }
            Ok(StoreMsg::Disconnect { reason }) => {
                info!(reason = %reason, "store closed the connection");
                break;
            }
            Ok(other) => {
                debug!(?other, "unexpected message from store");
            }
            Err(e) => {
                warn!(error = %e, "store connection error");
                break;
            }
        }
    }
    connected.send_replace(false);
}

async fn write_loop(
    mut writer: FrameWriter,
    mut outbound: mpsc::UnboundedReceiver<StoreMsg>,
    connected: watch::Sender<bool>,
) {
    while let Some(msg) = outbound.recv().await {
        let closing = matches!(msg, StoreMsg::Disconnect { .. });
        if let Err(e) = writer.send(&msg).await {
            warn!(error = %e, "store write failed");
            break;
        }
        if closing {
            break;
        }
    }
    connected.send_replace(false);
}
