//! Store server implementation.
//!
//! A small real-time key-value store for the playground. It supports:
//! - one participant key per connection, named in the handshake
//! - per-key last-write-wins, with a store timestamp stamped on every write
//! - full-collection pushes to subscribers on every change
//! - deleting armed keys when their connection drops, with no client help
//! - the resource field: first-writer-wins claims and a periodic janitor
//!
//! Each connection runs as its own task; a second task per subscribed
//! connection forwards collection changes. Shared state sits behind one
//! mutex and changes fan out through `watch` channels, so slow subscribers
//! only ever see the latest collection.

use std::{
    collections::{BTreeMap, BTreeSet},
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use anyhow::Context;
use playground_shared::{
    config::{PlaygroundConfig, ResourceConfig},
    net::{FrameReader, FrameWriter, ReliableConn, ReliableListener, StoreMsg, PROTOCOL_VERSION},
    resources::{JanitorReport, ResourceField, ResourceSnapshot},
    store::{store_timestamp_ms, ParticipantId, ParticipantRecord, PresenceSnapshot},
};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info, warn};

/// Everything guarded by the store lock.
struct StoreState {
    participants: BTreeMap<ParticipantId, ParticipantRecord>,
    armed: BTreeSet<ParticipantId>,
    /// Participant keys with a live connection.
    live: BTreeSet<ParticipantId>,
    field: ResourceField,
}

struct Shared {
    state: Mutex<StoreState>,
    presence: watch::Sender<PresenceSnapshot>,
    resources: watch::Sender<ResourceSnapshot>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_presence(&self, state: &StoreState) {
        self.presence.send_replace(PresenceSnapshot {
            participants: state.participants.clone(),
        });
    }

    fn publish_resources(&self, state: &StoreState) {
        self.resources.send_replace(state.field.snapshot());
    }
}

/// Cloneable view of a running store, for inspection and maintenance.
#[derive(Clone)]
pub struct StoreHandle {
    shared: Arc<Shared>,
}

impl StoreHandle {
    pub fn presence(&self) -> PresenceSnapshot {
        self.shared.presence.borrow().clone()
    }

    pub fn resources(&self) -> ResourceSnapshot {
        self.shared.resources.borrow().clone()
    }

    pub fn subscribe_presence(&self) -> watch::Receiver<PresenceSnapshot> {
        self.shared.presence.subscribe()
    }

    pub fn subscribe_resources(&self) -> watch::Receiver<ResourceSnapshot> {
        self.shared.resources.subscribe()
    }

    /// Number of participant keys with a live connection.
    pub fn live_connections(&self) -> usize {
        self.shared.lock().live.len()
    }

    /// One janitor pass at `now_ms`.
    pub fn run_janitor(&self, now_ms: i64) -> JanitorReport {
        let mut state = self.shared.lock();
        let report = state.field.janitor(now_ms, &mut rand::thread_rng());
        if report.changed() {
            debug!(
                respawned = report.respawned,
                spawned = report.spawned,
                pruned = report.pruned,
                "janitor pass"
            );
            self.shared.publish_resources(&state);
        }
        report
    }
}

/// Store server.
pub struct StoreServer {
    pub cfg: PlaygroundConfig,
    listener: ReliableListener,
    handle: StoreHandle,
}

impl StoreServer {
    /// Binds the listener and seeds the resource field.
    pub async fn bind(cfg: PlaygroundConfig) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.store_addr.parse().context("parse store_addr")?;
        let listener = ReliableListener::bind(addr).await?;
        let handle = Self::new_handle(cfg.resources);
        handle.run_janitor(store_timestamp_ms());
        Ok(Self {
            cfg,
            listener,
            handle,
        })
    }

    fn new_handle(resources: ResourceConfig) -> StoreHandle {
        let state = StoreState {
            participants: BTreeMap::new(),
            armed: BTreeSet::new(),
            live: BTreeSet::new(),
            field: ResourceField::new(resources),
        };
        let (presence, _) = watch::channel(PresenceSnapshot::empty());
        let (resources, _) = watch::channel(state.field.snapshot());
        StoreHandle {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                presence,
                resources,
            }),
        }
    }

    /// Returns the local address (after binding).
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn handle(&self) -> StoreHandle {
        self.handle.clone()
    }

    /// Accepts one connection and hands it to its own task.
    pub async fn accept_one(&self) -> anyhow::Result<SocketAddr> {
        let (conn, peer) = self.listener.accept().await?;
        let shared = Arc::clone(&self.handle.shared);
        tokio::spawn(async move {
            if let Err(e) = serve_connection(shared, conn, peer).await {
                warn!(%peer, error = %e, "connection ended with error");
            }
        });
        Ok(peer)
    }

    /// Accept loop plus the janitor timer. Runs until accepting fails.
    pub async fn run(self) -> anyhow::Result<()> {
        let period = Duration::from_millis(self.cfg.resources.janitor_interval_ms.max(1));
        let janitor = tokio::spawn(janitor_loop(self.handle.clone(), period));
        info!(addr = %self.local_addr()?, "store accepting connections");
        let result = loop {
            match self.accept_one().await {
                Ok(peer) => debug!(%peer, "accepted"),
                Err(e) => break Err(e),
            }
        };
        janitor.abort();
        result
    }
}

async fn janitor_loop(handle: StoreHandle, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        handle.run_janitor(store_timestamp_ms());
    }
}

/// Handshake, then apply client messages until the connection ends.
async fn serve_connection(
    shared: Arc<Shared>,
    mut conn: ReliableConn,
    peer: SocketAddr,
) -> anyhow::Result<()> {
    let participant = match conn.recv().await.context("await hello")? {
        StoreMsg::Hello {
            protocol,
            participant,
        } if protocol == PROTOCOL_VERSION => participant,
        StoreMsg::Hello { protocol, .. } => {
            let reason = format!("protocol {protocol} unsupported, expected {PROTOCOL_VERSION}");
            conn.send(&StoreMsg::Disconnect { reason }).await?;
            return Ok(());
        }
        other => anyhow::bail!("unexpected handshake msg: {other:?}"),
    };

    // One writer per key: a second live connection for the same key is refused.
    let admitted = shared.lock().live.insert(participant.clone());
    if !admitted {
        warn!(%peer, participant = %participant, "participant already connected");
        conn.send(&StoreMsg::Disconnect {
            reason: format!("participant {participant} already connected"),
        })
        .await?;
        return Ok(());
    }

    info!(%peer, participant = %participant, "participant connected");
    let result = async {
        conn.send(&StoreMsg::Welcome {
            server_time_ms: store_timestamp_ms(),
        })
        .await?;
        let (reader, writer) = conn.into_split();
        read_loop(&shared, &participant, reader, writer).await
    }
    .await;

    let mut state = shared.lock();
    state.live.remove(&participant);
    if state.armed.remove(&participant) && state.participants.remove(&participant).is_some() {
        info!(participant = %participant, "removed record on disconnect");
        shared.publish_presence(&state);
    } else {
        info!(participant = %participant, "participant disconnected");
    }
    result
}

async fn read_loop(
    shared: &Arc<Shared>,
    participant: &ParticipantId,
    mut reader: FrameReader,
    writer: FrameWriter,
) -> anyhow::Result<()> {
    let mut writer = Some(writer);
    let mut pusher: Option<JoinHandle<()>> = None;

    let result = loop {
        let msg = match reader.recv().await {
            Ok(msg) => msg,
            Err(e) => {
                debug!(participant = %participant, error = %e, "read ended");
                break Ok(());
            }
        };
        match msg {
            StoreMsg::ArmRemovalOnDisconnect => {
                shared.lock().armed.insert(participant.clone());
                debug!(participant = %participant, "removal armed");
            }
            StoreMsg::WriteOwn(mut record) => {
                record.t = Some(store_timestamp_ms());
                let mut state = shared.lock();
                state.participants.insert(participant.clone(), record);
                shared.publish_presence(&state);
            }
            StoreMsg::Subscribe => match writer.take() {
                Some(w) => pusher = Some(tokio::spawn(push_loop(Arc::clone(shared), w))),
                None => debug!(participant = %participant, "already subscribed"),
            },
            StoreMsg::ClaimItem { item } => {
                let mut state = shared.lock();
                match state.field.claim(item, participant, store_timestamp_ms()) {
                    Ok(kind) => {
                        debug!(participant = %participant, %item, ?kind, "item collected");
                        shared.publish_resources(&state);
                    }
                    Err(e) => debug!(participant = %participant, error = %e, "claim rejected"),
                }
            }
            StoreMsg::Disconnect { reason } => {
                debug!(participant = %participant, reason = %reason, "client said goodbye");
                break Ok(());
            }
            other => {
                warn!(participant = %participant, ?other, "unexpected message");
            }
        }
    };

    if let Some(pusher) = pusher {
        pusher.abort();
    }
    result
}

/// Sends the current collections, then every change, until the socket fails.
async fn push_loop(shared: Arc<Shared>, mut writer: FrameWriter) {
    let mut presence = shared.presence.subscribe();
    let mut resources = shared.resources.subscribe();
    presence.mark_changed();
    resources.mark_changed();
    loop {
        let msg = tokio::select! {
            changed = presence.changed() => match changed {
                Ok(()) => StoreMsg::Presence(presence.borrow_and_update().clone()),
                Err(_) => break,
            },
            changed = resources.changed() => match changed {
                Ok(()) => StoreMsg::Resources(resources.borrow_and_update().clone()),
                Err(_) => break,
            },
        };
        if let Err(e) = writer.send(&msg).await {
            debug!(error = %e, "push ended");
            break;
        }
    }
}

/// Helper for tests: bind to an ephemeral port.
pub async fn bind_ephemeral(
    mut cfg: PlaygroundConfig,
) -> anyhow::Result<(StoreServer, SocketAddr)> {
    cfg.store_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).to_string();
    let server = StoreServer::bind(cfg).await?;
    let addr = server.local_addr()?;
    Ok((server, addr))
}
