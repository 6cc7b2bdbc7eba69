//! Shared helpers for the playground integration tests and the scenario runner.
//!
//! Sessions here run on [`MemoryStore`] with [`RapierPhysics`], so a whole
//! multi-participant exchange is deterministic and needs no sockets.

use std::time::Duration;

use playground_client::{
    client::Session,
    grab::GrabState,
    input::{InputState, Intents},
};
use playground_shared::{
    config::{CharacterKind, PlaygroundConfig, ProxyMode},
    event::GameEvent,
    math::Vec2,
    rapier_world::RapierPhysics,
    store::{MemoryStore, MemoryStoreHandle, ParticipantId, ParticipantRecord, SharedState},
};
use tracing::{debug, info};

/// 60 Hz tick.
pub const DT: Duration = Duration::from_micros(16_667);

pub type MemorySession = Session<MemoryStoreHandle, RapierPhysics>;

/// Routes `tracing` output through the test harness.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// No gravity, no platforms, no proxies: bodies move only under grab forces.
pub fn open_world() -> PlaygroundConfig {
    let mut cfg = PlaygroundConfig::default();
    cfg.world.arena = false;
    cfg.world.gravity = 0.0;
    cfg.character = CharacterKind::ArmReach;
    cfg.ghosts.proxy = Some(ProxyMode::None);
    cfg.color = Some("#3366cc".to_string());
    cfg
}

/// Creates a session for `id` on `store`.
pub fn join(
    store: &MemoryStore,
    id: &str,
    cfg: &PlaygroundConfig,
) -> anyhow::Result<MemorySession> {
    let session = Session::with_rapier(cfg, store.connect(ParticipantId::new(id)))?;
    Ok(session)
}

/// Publishes one fixed record as `id` and returns the handle that owns it.
pub fn place_static(store: &MemoryStore, id: &str, position: Vec2) -> MemoryStoreHandle {
    let handle = store.connect(ParticipantId::new(id));
    handle.register_removal_on_disconnect();
    handle.write_own(ParticipantRecord::new(id, "#cc6633", position));
    handle
}

/// Ticks `session` `n` times with inputs from `input`, collecting events.
pub fn run_ticks(
    session: &mut MemorySession,
    n: u32,
    mut input: impl FnMut(&MemorySession) -> InputState,
) -> Vec<GameEvent> {
    let mut events = Vec::new();
    for _ in 0..n {
        let i = input(session);
        session.tick(i, DT);
        events.extend(session.drain_events());
    }
    events
}

/// Keeps the hand on the body, so the anchor is the body centre.
pub fn idle(session: &MemorySession) -> InputState {
    InputState::aiming(session.position())
}

pub fn is_holding(session: &MemorySession, target: &str) -> bool {
    matches!(session.grab_state(), GrabState::Holding(id) if id.as_str() == target)
}

/// One sample of the pull scenario.
#[derive(Debug, Clone, Copy)]
pub struct PullSample {
    pub tick: u64,
    pub position: Vec2,
    pub velocity: Vec2,
    pub distance: f32,
}

/// Outcome of [`pull_and_break`].
#[derive(Debug, Clone)]
pub struct PullTrace {
    pub grabbed: bool,
    pub samples: Vec<PullSample>,
    /// Ticks between aiming away and the grab clearing, if it cleared.
    pub break_ticks: Option<u32>,
    pub events: Vec<GameEvent>,
}

impl PullTrace {
    pub fn last(&self) -> Option<&PullSample> {
        self.samples.last()
    }
}

/// A grabs a static participant B placed `gap` units to its right, is
/// pulled for `pull_ticks`, then aims directly away until the grab breaks.
pub fn pull_and_break(cfg: &PlaygroundConfig, gap: f32, pull_ticks: u32) -> anyhow::Result<PullTrace> {
    let store = MemoryStore::new();
    let mut a = join(&store, "a", cfg)?;
    let start = a.position();
    let b_pos = start + Vec2::new(gap, 0.0);
    let _b = place_static(&store, "b", b_pos);

    let mut events = run_ticks(&mut a, 2, idle);
    events.extend(run_ticks(&mut a, 1, |s| {
        idle(s).with(Intents::INTERACT)
    }));
    let grabbed = is_holding(&a, "b");
    info!(grabbed, gap, "grab attempted");

    let mut samples = Vec::with_capacity(pull_ticks as usize);
    for _ in 0..pull_ticks {
        events.extend(run_ticks(&mut a, 1, idle));
        let sample = PullSample {
            tick: a.tick_count(),
            position: a.position(),
            velocity: a.velocity(),
            distance: a.position().distance(b_pos),
        };
        debug!(?sample, "pull");
        samples.push(sample);
    }

    let mut break_ticks = None;
    for n in 1..=10u32 {
        events.extend(run_ticks(&mut a, 1, |s| {
            let p = s.position();
            InputState::aiming(p + (p - b_pos) * 100.0)
        }));
        if *a.grab_state() == GrabState::Idle {
            break_ticks = Some(n);
            break;
        }
    }
    info!(?break_ticks, "aimed away");

    Ok(PullTrace {
        grabbed,
        samples,
        break_ticks,
        events,
    })
}
