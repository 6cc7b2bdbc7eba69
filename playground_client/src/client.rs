//! Session implementation.
//!
//! A [`Session`] is one participant's client core, owning:
//! - the local body and its controller
//! - the ghosts of every remote participant, with their proxy bodies
//! - the grab state machine
//! - presence sequencing and the rate-limited publisher
//! - the single-slot snapshot buffer and an event bus for feedback
//!
//! Nothing here is global: two sessions can share a process (and a
//! `MemoryStore`) without interfering. `tick` never blocks; store traffic is
//! fire-and-forget and snapshots are taken from the slot at most once a tick.

use std::time::Duration;

use playground_shared::{
    config::{ConfigError, PlaygroundConfig},
    event::{EventBus, GameEvent, ReleaseReason},
    math::Vec2,
    physics::PhysicsBackend,
    rapier_world::RapierPhysics,
    store::{ParticipantId, ParticipantRecord, SharedState, SnapshotSlot},
    world::WorldMap,
};
use rand::seq::SliceRandom;
use tracing::{debug, info};

use crate::{
    body::LocalBody,
    character::{CharacterModel, Pose, PoseInput},
    grab::{GrabController, GrabState},
    input::{InputSampler, InputState, TickCommand},
    interp::GhostManager,
    presence::Presence,
    sync::{build_record, SyncScheduler},
};

const PLAYER_COLORS: &[&str] = &[
    "#ef4444", "#f97316", "#eab308", "#22c55e", "#06b6d4", "#3b82f6", "#8b5cf6", "#ec4899",
];

/// What one tick did, for hosts and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    pub tick: u64,
    /// A snapshot was taken from the slot this tick.
    pub snapshot_applied: bool,
    /// The local record was written to the store this tick.
    pub published: bool,
    pub joined: bool,
}

/// One participant's client core.
pub struct Session<S: SharedState, P: PhysicsBackend> {
    store: S,
    physics: P,
    map: WorldMap,
    model: CharacterModel,
    name: String,
    color: String,

    body: LocalBody,
    ghosts: GhostManager,
    grab: GrabController,
    sync: SyncScheduler,
    presence: Presence,
    slot: SnapshotSlot,
    sampler: InputSampler,
    events: EventBus,

    pose: Pose,
    aim: Vec2,
    move_axis: f32,
    clock: Duration,
    tick: u64,
}

impl<S: SharedState> Session<S, RapierPhysics> {
    /// Session on a Rapier world with the configured gravity.
    pub fn with_rapier(cfg: &PlaygroundConfig, store: S) -> Result<Self, ConfigError> {
        let physics = RapierPhysics::new(Vec2::new(0.0, cfg.world.gravity));
        Self::new(cfg, store, physics)
    }
}

impl<S: SharedState, P: PhysicsBackend> Session<S, P> {
    /// Builds the world into `physics`, spawns the local body and subscribes.
    pub fn new(cfg: &PlaygroundConfig, store: S, mut physics: P) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let map = WorldMap::from_config(&cfg.world);
        map.build_into(&mut physics);
        let model = CharacterModel::for_kind(cfg.character);
        let body = LocalBody::spawn(&mut physics, map.spawn, &cfg.movement);
        let color = cfg.color.clone().unwrap_or_else(|| {
            PLAYER_COLORS
                .choose(&mut rand::thread_rng())
                .unwrap_or(&PLAYER_COLORS[0])
                .to_string()
        });
        let pose = model.pose(&PoseInput {
            body: map.spawn,
            aim: map.spawn,
            move_axis: 0.0,
            held_target: None,
        });

        info!(
            participant = %store.local_id(),
            name = %cfg.player_name,
            character = ?cfg.character,
            "session created"
        );

        Ok(Self {
            ghosts: GhostManager::new(model.clone(), cfg.ghosts),
            grab: GrabController::new(cfg.grab),
            sync: SyncScheduler::new(&cfg.sync),
            presence: Presence::new(&store),
            slot: store.subscribe_all(),
            sampler: InputSampler::default(),
            events: EventBus::default(),
            aim: map.spawn,
            move_axis: 0.0,
            clock: Duration::ZERO,
            tick: 0,
            name: cfg.player_name.clone(),
            color,
            pose,
            body,
            model,
            map,
            physics,
            store,
        })
    }

    pub fn local_id(&self) -> &ParticipantId {
        self.store.local_id()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn physics(&self) -> &P {
        &self.physics
    }

    pub fn physics_mut(&mut self) -> &mut P {
        &mut self.physics
    }

    pub fn map(&self) -> &WorldMap {
        &self.map
    }

    pub fn model(&self) -> &CharacterModel {
        &self.model
    }

    pub fn body(&self) -> &LocalBody {
        &self.body
    }

    pub fn ghosts(&self) -> &GhostManager {
        &self.ghosts
    }

    pub fn grab_state(&self) -> &GrabState {
        self.grab.state()
    }

    /// How many remote participants are holding this one.
    pub fn holder_count(&self) -> usize {
        self.grab.holder_count(self.store.local_id(), &self.ghosts)
    }

    pub fn is_online(&self) -> bool {
        self.presence.is_online()
    }

    pub fn position(&self) -> Vec2 {
        self.body.position(&self.physics)
    }

    pub fn velocity(&self) -> Vec2 {
        self.body.velocity(&self.physics)
    }

    pub fn is_grounded(&self) -> bool {
        self.body.is_grounded()
    }

    /// Local pose as of the end of the last tick.
    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    /// Current grab point of the local character.
    pub fn anchor(&self) -> Vec2 {
        self.model.anchor_point(&self.pose)
    }

    /// Session clock: the sum of every `dt` passed to `tick`.
    pub fn clock(&self) -> Duration {
        self.clock
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Takes every event emitted since the last drain.
    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        self.events.drain::<GameEvent>()
    }

    /// The record this session would publish right now.
    pub fn current_record(&self) -> ParticipantRecord {
        let grab = self.grab.target().map(|t| (t, self.anchor()));
        build_record(&self.name, &self.color, &self.pose, grab)
    }

    fn held_target_position(&self) -> Option<Vec2> {
        self.grab
            .target()
            .and_then(|t| self.ghosts.get(t))
            .map(|g| g.display.position)
    }

    fn compute_pose(&self) -> Pose {
        self.model.pose(&PoseInput {
            body: self.body.position(&self.physics),
            aim: self.aim,
            move_axis: self.move_axis,
            held_target: self.held_target_position(),
        })
    }

    fn emit(&mut self, event: Option<GameEvent>) {
        if let Some(event) = event {
            self.events.push(event);
        }
    }

    /// Runs one logical step.
    pub fn tick(&mut self, input: InputState, dt: Duration) -> TickReport {
        self.tick += 1;
        self.clock += dt;
        let mut report = TickReport {
            tick: self.tick,
            ..TickReport::default()
        };

        // Presence first, so a fresh connection is armed before any write.
        let initial = self.current_record();
        if self.presence.poll(&self.store, || initial) {
            self.sync.reset();
            self.sync.poll(self.clock);
            report.joined = true;
        }

        if let Some(snapshot) = self.slot.take_latest() {
            report.snapshot_applied = true;
            let local = self.store.local_id().clone();
            let changes = self.ghosts.reconcile(&snapshot, &local, &mut self.physics);
            for id in changes.joined {
                self.events.push(GameEvent::GhostJoined { id });
            }
            for id in changes.left {
                self.events.push(GameEvent::GhostLeft { id });
            }
            let vanished = self.grab.forget_vanished(&self.ghosts);
            self.emit(vanished);
        }
        self.ghosts.advance(&mut self.physics);

        let cmd = self.sampler.sample(input);
        self.aim = cmd.aim;
        self.move_axis = cmd.move_axis;
        self.body
            .apply_input(&mut self.physics, &cmd, &mut self.events);
        self.apply_grab(&cmd);

        let contacts = self.physics.step(dt.as_secs_f32());
        let outcome =
            self.body
                .after_step(&mut self.physics, &contacts, &self.map, &mut self.events);
        if outcome.respawned {
            let released = self.grab.release(ReleaseReason::Respawn);
            self.emit(released);
        }
        self.pose = self.compute_pose();
        self.body.end_tick();

        if self.presence.is_online() && self.sync.poll(self.clock) {
            self.store.write_own(self.current_record());
            report.published = true;
        }
        report
    }

    /// Interact edge, break check and grab forces, in that order.
    fn apply_grab(&mut self, cmd: &TickCommand) {
        let local = self.store.local_id().clone();
        let pose = self.compute_pose();
        let anchor = self.model.anchor_point(&pose);

        if cmd.interact {
            let event = self.grab.on_interact(anchor, &local, &self.ghosts);
            self.emit(event);
        }
        let broke = self.grab.check_break(anchor, &self.ghosts);
        self.emit(broke);

        let body_pos = self.body.position(&self.physics);
        let force = self.grab.holding_force(anchor, &self.ghosts)
            + self.grab.held_force(body_pos, &local, &self.ghosts);
        if force != Vec2::ZERO {
            debug!(fx = force.x, fy = force.y, "grab force");
            self.physics.apply_force(self.body.handle(), force);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Intents;
    use playground_shared::config::{CharacterKind, ProxyMode};
    use playground_shared::store::{MemoryStore, MemoryStoreHandle, PresenceSnapshot, StoreOp};

    const DT: Duration = Duration::from_micros(16_667);

    fn open_world() -> PlaygroundConfig {
        let mut cfg = PlaygroundConfig::default();
        cfg.world.arena = false;
        cfg.world.gravity = 0.0;
        cfg.character = CharacterKind::ArmReach;
        cfg.ghosts.proxy = Some(ProxyMode::None);
        cfg.color = Some("#112233".to_string());
        cfg
    }

    fn session(
        store: &MemoryStore,
        id: &str,
    ) -> Session<MemoryStoreHandle, RapierPhysics> {
        Session::with_rapier(&open_world(), store.connect(ParticipantId::new(id)))
            .unwrap()
    }

    fn write_other(store: &MemoryStore, id: &str, pos: Vec2) -> MemoryStoreHandle {
        let h = store.connect(ParticipantId::new(id));
        h.write_own(ParticipantRecord::new(id, "#fff", pos));
        h
    }

    #[test]
    fn first_tick_joins_and_publishes_once() {
        let store = MemoryStore::new();
        let mut s = session(&store, "a");
        let report = s.tick(InputState::default(), DT);
        assert!(report.joined);
        assert!(!report.published);
        assert_eq!(
            store.operations(),
            vec![
                StoreOp::ArmRemoval(ParticipantId::new("a")),
                StoreOp::Write(ParticipantId::new("a")),
            ]
        );
    }

    #[test]
    fn publishes_are_rate_limited_by_session_clock() {
        let store = MemoryStore::new();
        let mut s = session(&store, "a");
        let mut published = 0;
        // 60 ticks of ~16.7 ms cover one second: one write per 50 ms window.
        for _ in 0..60 {
            if s.tick(InputState::default(), DT).published {
                published += 1;
            }
        }
        let writes = store
            .operations()
            .iter()
            .filter(|op| matches!(op, StoreOp::Write(_)))
            .count();
        assert_eq!(writes, published + 1);
        assert!((15..=20).contains(&published), "published {published}");
    }

    #[test]
    fn ghost_appears_and_is_not_self() {
        let store = MemoryStore::new();
        let _b = write_other(&store, "b", Vec2::new(10.0, 10.0));
        let mut s = session(&store, "a");
        s.tick(InputState::default(), DT);
        assert_eq!(s.ghosts().len(), 1);
        assert!(s.ghosts().contains(&ParticipantId::new("b")));
        assert!(s
            .drain_events()
            .contains(&GameEvent::GhostJoined {
                id: ParticipantId::new("b")
            }));
    }

    #[test]
    fn teardown_cascades_in_one_tick() {
        let store = MemoryStore::new();
        let mut cfg = open_world();
        cfg.ghosts.proxy = Some(ProxyMode::Kinematic);
        let mut s =
            Session::with_rapier(&cfg, store.connect(ParticipantId::new("a"))).unwrap();
        let spawn = s.map().spawn;
        let b = write_other(&store, "b", spawn + Vec2::new(30.0, 0.0));
        b.register_removal_on_disconnect();

        let grab = InputState::aiming(spawn).with(Intents::INTERACT);
        s.tick(grab, DT);
        assert_eq!(s.grab_state(), &GrabState::Holding(ParticipantId::new("b")));
        let proxy = s.ghosts().get(&ParticipantId::new("b")).unwrap().proxy().unwrap();
        assert!(s.physics().contains(proxy));

        b.disconnect();
        s.tick(InputState::aiming(spawn), DT);
        assert!(s.ghosts().is_empty());
        assert!(!s.physics().contains(proxy));
        assert_eq!(s.grab_state(), &GrabState::Idle);
        assert!(s.drain_events().contains(&GameEvent::GrabReleased {
            target: ParticipantId::new("b"),
            reason: ReleaseReason::TargetVanished,
        }));
    }

    #[test]
    fn empty_snapshot_releases_grab_immediately() {
        let store = MemoryStore::new();
        let mut s = session(&store, "a");
        let spawn = s.map().spawn;
        let _b = write_other(&store, "b", spawn + Vec2::new(20.0, 0.0));
        s.tick(InputState::aiming(spawn).with(Intents::INTERACT), DT);
        assert!(matches!(s.grab_state(), GrabState::Holding(_)));

        // Every key gone at once, our own included.
        drop_every_record(&store);
        s.tick(InputState::aiming(spawn), DT);
        assert_eq!(s.grab_state(), &GrabState::Idle);
        assert!(s.ghosts().is_empty());
    }

    fn drop_every_record(store: &MemoryStore) {
        for (id, _) in store.snapshot().iter() {
            let h = store.connect(id.clone());
            h.register_removal_on_disconnect();
            h.disconnect();
        }
        assert_eq!(store.snapshot(), PresenceSnapshot::empty());
    }

    #[test]
    fn respawn_clears_grab() {
        let store = MemoryStore::new();
        let mut cfg = open_world();
        // Keep the grab alive until the respawn itself.
        cfg.grab.break_distance = 10_000.0;
        let mut s =
            Session::with_rapier(&cfg, store.connect(ParticipantId::new("a"))).unwrap();
        let spawn = s.map().spawn;
        let _b = write_other(&store, "b", spawn + Vec2::new(20.0, 0.0));
        s.tick(InputState::aiming(spawn).with(Intents::INTERACT), DT);
        assert!(matches!(s.grab_state(), GrabState::Holding(_)));

        let handle = s.body().handle();
        let below = Vec2::new(spawn.x, s.map().height + 500.0);
        s.physics_mut().set_position(handle, below);
        s.tick(InputState::aiming(below), DT);
        assert_eq!(s.grab_state(), &GrabState::Idle);
        assert_eq!(s.position(), spawn);
        let events = s.drain_events();
        assert!(events.iter().any(|e| matches!(e, GameEvent::Respawned { .. })));
        assert!(events.contains(&GameEvent::GrabReleased {
            target: ParticipantId::new("b"),
            reason: ReleaseReason::Respawn,
        }));
    }

    #[test]
    fn writes_pause_while_disconnected() {
        let store = MemoryStore::new();
        let mut s = session(&store, "a");
        s.tick(InputState::default(), DT);
        s.store().set_connected(false);
        for _ in 0..10 {
            assert!(!s.tick(InputState::default(), DT).published);
        }
        assert!(!s.is_online());
        s.store().set_connected(true);
        assert!(s.tick(InputState::default(), DT).joined);
    }
}
