//! Shared-state store model.
//!
//! The playground shares state through a generic real-time key-value store:
//! one record per participant, per-key last-write-wins, a liveness signal
//! separate from the data, and a store-side delete of the caller's own key
//! when its connection drops. Consumers always receive the full mapping.
//!
//! [`SharedState`] is the client-facing contract. [`MemoryStore`] implements
//! it in-process for tests and local simulation; the TCP store server and
//! its client implement the same semantics over the wire.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use crate::math::Vec2;

/// Opaque participant id; the store key of a participant record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Random id of the form `u_xxxxxxxxxxxxx`.
    pub fn random() -> Self {
        let tail: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(13)
            .map(|c| char::from(c).to_ascii_lowercase())
            .collect();
        Self(format!("u_{tail}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Named limb slots a record may carry, as absolute world positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Limb {
    Head,
    Arm,
    Leg,
}

impl Limb {
    pub const ALL: [Limb; 3] = [Limb::Head, Limb::Arm, Limb::Leg];
}

/// One participant's published state. Written only by its owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ParticipantRecord {
    pub name: String,
    pub color: String,
    pub x: f32,
    pub y: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hx: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hy: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ax: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ay: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lx: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ly: Option<f32>,
    /// Heading (head or beak angle) in radians.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ha: Option<f32>,
    /// Currently held participant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grab: Option<ParticipantId>,
    /// World-space hold point, only while grabbing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gx: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gy: Option<f32>,
    /// Store timestamp (ms since the Unix epoch), stamped on every write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<i64>,
}

impl ParticipantRecord {
    pub fn new(name: impl Into<String>, color: impl Into<String>, position: Vec2) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
            x: position.x,
            y: position.y,
            ..Self::default()
        }
    }

    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn limb(&self, limb: Limb) -> Option<Vec2> {
        let (x, y) = match limb {
            Limb::Head => (self.hx, self.hy),
            Limb::Arm => (self.ax, self.ay),
            Limb::Leg => (self.lx, self.ly),
        };
        Some(Vec2::new(x?, y?))
    }

    pub fn set_limb(&mut self, limb: Limb, p: Option<Vec2>) {
        let (x, y) = (p.map(|p| p.x), p.map(|p| p.y));
        match limb {
            Limb::Head => (self.hx, self.hy) = (x, y),
            Limb::Arm => (self.ax, self.ay) = (x, y),
            Limb::Leg => (self.lx, self.ly) = (x, y),
        }
    }

    /// Published hold point; present only if both coordinates are.
    pub fn hold_point(&self) -> Option<Vec2> {
        Some(Vec2::new(self.gx?, self.gy?))
    }

    /// True when this record claims to be holding `id` at a published point.
    pub fn is_holding(&self, id: &ParticipantId) -> bool {
        self.grab.as_ref() == Some(id) && self.hold_point().is_some()
    }
}

/// The full participant collection as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct PresenceSnapshot {
    pub participants: BTreeMap<ParticipantId, ParticipantRecord>,
}

impl PresenceSnapshot {
    /// An empty world; also what a missing or null snapshot means.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn get(&self, id: &ParticipantId) -> Option<&ParticipantRecord> {
        self.participants.get(id)
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.participants.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ParticipantId, &ParticipantRecord)> {
        self.participants.iter()
    }
}

/// Single-slot buffer holding the latest presence snapshot.
///
/// The store side only ever replaces the whole value; the tick loop takes at
/// most one snapshot per tick, so a snapshot never changes mid-tick.
#[derive(Debug)]
pub struct SnapshotSlot {
    rx: watch::Receiver<PresenceSnapshot>,
}

impl SnapshotSlot {
    /// Wraps a receiver; the value already in the channel is delivered first.
    pub fn new(mut rx: watch::Receiver<PresenceSnapshot>) -> Self {
        rx.mark_changed();
        Self { rx }
    }

    /// Takes the newest snapshot if it changed since the last take.
    pub fn take_latest(&mut self) -> Option<PresenceSnapshot> {
        match self.rx.has_changed() {
            Ok(true) => Some(self.rx.borrow_and_update().clone()),
            _ => None,
        }
    }
}

/// Client-side contract of the real-time store.
///
/// All writes are fire-and-forget from the caller's perspective.
pub trait SharedState: Send {
    fn local_id(&self) -> &ParticipantId;
    /// Idempotently overwrites the caller's own record.
    fn write_own(&self, record: ParticipantRecord);
    /// Subscribes to the full participant mapping.
    fn subscribe_all(&self) -> SnapshotSlot;
    /// Live/dead transport signal, distinct from data.
    fn connectivity(&self) -> watch::Receiver<bool>;
    /// Arms the store-side delete of the caller's key on disconnect.
    fn register_removal_on_disconnect(&self);
}

/// Milliseconds since the Unix epoch, as stamped into `t`.
pub fn store_timestamp_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Operations applied by a [`MemoryStore`], in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    ArmRemoval(ParticipantId),
    Write(ParticipantId),
    /// A write dropped because its connection was down.
    DroppedWrite(ParticipantId),
    Remove(ParticipantId),
}

#[derive(Debug, Default)]
struct Hub {
    participants: BTreeMap<ParticipantId, ParticipantRecord>,
    armed: BTreeSet<ParticipantId>,
    log: Vec<StoreOp>,
}

/// In-process store shared by any number of handles.
#[derive(Clone)]
pub struct MemoryStore {
    hub: Arc<Mutex<Hub>>,
    presence: Arc<watch::Sender<PresenceSnapshot>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(PresenceSnapshot::empty());
        Self {
            hub: Arc::new(Mutex::new(Hub::default())),
            presence: Arc::new(tx),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Hub> {
        self.hub.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens a connected handle acting as `id`.
    pub fn connect(&self, id: ParticipantId) -> MemoryStoreHandle {
        let (connected, _rx) = watch::channel(true);
        MemoryStoreHandle {
            store: self.clone(),
            id,
            connected: Arc::new(connected),
        }
    }

    /// Current full mapping.
    pub fn snapshot(&self) -> PresenceSnapshot {
        self.presence.borrow().clone()
    }

    /// Every operation applied so far.
    pub fn operations(&self) -> Vec<StoreOp> {
        self.lock().log.clone()
    }

    fn publish(&self, hub: &Hub) {
        self.presence.send_replace(PresenceSnapshot {
            participants: hub.participants.clone(),
        });
    }

    fn write(&self, id: &ParticipantId, mut record: ParticipantRecord) {
        record.t = Some(store_timestamp_ms());
        let mut hub = self.lock();
        hub.participants.insert(id.clone(), record);
        hub.log.push(StoreOp::Write(id.clone()));
        self.publish(&hub);
    }

    fn drop_connection(&self, id: &ParticipantId) {
        let mut hub = self.lock();
        if hub.armed.remove(id) {
            hub.participants.remove(id);
            hub.log.push(StoreOp::Remove(id.clone()));
            debug!(participant = %id, "removed record on disconnect");
            self.publish(&hub);
        }
    }
}

/// One participant's connection to a [`MemoryStore`].
pub struct MemoryStoreHandle {
    store: MemoryStore,
    id: ParticipantId,
    connected: Arc<watch::Sender<bool>>,
}

impl MemoryStoreHandle {
    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Simulates the transport going up or down. Going down runs the armed
    /// removal with no client involvement.
    pub fn set_connected(&self, connected: bool) {
        let mut was = connected;
        // Subscribers are only notified of real transitions.
        self.connected.send_if_modified(|c| {
            was = std::mem::replace(c, connected);
            was != connected
        });
        if was && !connected {
            self.store.drop_connection(&self.id);
        }
    }

    pub fn disconnect(&self) {
        self.set_connected(false);
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }
}

impl SharedState for MemoryStoreHandle {
    fn local_id(&self) -> &ParticipantId {
        &self.id
    }

    fn write_own(&self, record: ParticipantRecord) {
        if self.is_connected() {
            self.store.write(&self.id, record);
        } else {
            self.store.lock().log.push(StoreOp::DroppedWrite(self.id.clone()));
        }
    }

    fn subscribe_all(&self) -> SnapshotSlot {
        SnapshotSlot::new(self.store.presence.subscribe())
    }

    fn connectivity(&self) -> watch::Receiver<bool> {
        let mut rx = self.connected.subscribe();
        rx.mark_changed();
        rx
    }

    fn register_removal_on_disconnect(&self) {
        let mut hub = self.store.lock();
        hub.armed.insert(self.id.clone());
        hub.log.push(StoreOp::ArmRemoval(self.id.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(s: &str) -> ParticipantId {
        ParticipantId::new(s)
    }

    #[test]
    fn last_write_wins_and_stamps_time() {
        let store = MemoryStore::new();
        let a = store.connect(pid("a"));
        a.write_own(ParticipantRecord::new("A", "#ff0000", Vec2::new(1.0, 2.0)));
        a.write_own(ParticipantRecord::new("A", "#ff0000", Vec2::new(5.0, 6.0)));
        let snap = store.snapshot();
        let rec = snap.get(&pid("a")).unwrap();
        assert_eq!(rec.position(), Vec2::new(5.0, 6.0));
        assert!(rec.t.is_some());
    }

    #[test]
    fn armed_removal_runs_on_disconnect() {
        let store = MemoryStore::new();
        let a = store.connect(pid("a"));
        a.register_removal_on_disconnect();
        a.write_own(ParticipantRecord::default());
        assert!(store.snapshot().contains(&pid("a")));
        a.disconnect();
        assert!(store.snapshot().is_empty());
        assert_eq!(
            store.operations(),
            vec![
                StoreOp::ArmRemoval(pid("a")),
                StoreOp::Write(pid("a")),
                StoreOp::Remove(pid("a")),
            ]
        );
    }

    #[test]
    fn unarmed_record_leaks_after_disconnect() {
        let store = MemoryStore::new();
        let a = store.connect(pid("a"));
        a.write_own(ParticipantRecord::default());
        a.disconnect();
        assert!(store.snapshot().contains(&pid("a")));
    }

    #[test]
    fn slot_delivers_current_then_only_changes() {
        let store = MemoryStore::new();
        let a = store.connect(pid("a"));
        a.write_own(ParticipantRecord::default());
        let mut slot = a.subscribe_all();
        assert_eq!(slot.take_latest().map(|s| s.len()), Some(1));
        assert!(slot.take_latest().is_none());

        let b = store.connect(pid("b"));
        b.write_own(ParticipantRecord::default());
        b.write_own(ParticipantRecord::default());
        // Two writes between takes coalesce into one delivery.
        assert_eq!(slot.take_latest().map(|s| s.len()), Some(2));
        assert!(slot.take_latest().is_none());
    }

    #[test]
    fn record_omits_absent_fields_on_the_wire() {
        let rec = ParticipantRecord::new("A", "#00ff00", Vec2::new(3.0, 4.0));
        let json = serde_json::to_string(&rec).unwrap();
        assert!(!json.contains("grab"));
        assert!(!json.contains("hx"));
        let back: ParticipantRecord =
            serde_json::from_str(r##"{"name":"A","color":"#fff","x":1,"y":2}"##).unwrap();
        assert_eq!(back.position(), Vec2::new(1.0, 2.0));
        assert!(back.hold_point().is_none());
    }

    #[test]
    fn holding_requires_hold_point() {
        let mut rec = ParticipantRecord::default();
        rec.grab = Some(pid("b"));
        assert!(!rec.is_holding(&pid("b")));
        rec.gx = Some(1.0);
        rec.gy = Some(2.0);
        assert!(rec.is_holding(&pid("b")));
        assert!(!rec.is_holding(&pid("c")));
    }

    #[test]
    fn random_ids_have_prefix() {
        let id = ParticipantId::random();
        assert!(id.as_str().starts_with("u_"));
        assert_eq!(id.as_str().len(), 15);
    }
}
