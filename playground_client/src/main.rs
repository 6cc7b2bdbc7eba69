//! Headless playground client.
//!
//! Usage:
//!   cargo run -p playground_client -- [--addr 127.0.0.1:40100] [--config cfg.json]
//!       [--name Bot] [--character bird] [--ticks 600]
//!
//! Connects to a store server and drives one participant with a simple
//! wandering bot: it walks back and forth, hops now and then, grabs whoever
//! it bumps into and picks up items it passes over.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use playground_client::{
    client::Session,
    grab::GrabState,
    input::{InputState, Intents},
    RemoteStore,
};
use playground_shared::{
    config::{CharacterKind, PlaygroundConfig},
    event::GameEvent,
    math::Vec2,
    resources::ItemId,
    store::ParticipantId,
};
use rand::Rng;
use tracing::{info, warn};

struct Args {
    config: Option<PathBuf>,
    addr: Option<String>,
    name: Option<String>,
    character: Option<CharacterKind>,
    ticks: Option<u64>,
}

fn parse_args() -> Args {
    let mut out = Args {
        config: None,
        addr: None,
        name: None,
        character: None,
        ticks: None,
    };
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                out.config = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            "--addr" if i + 1 < args.len() => {
                out.addr = Some(args[i + 1].clone());
                i += 2;
            }
            "--name" if i + 1 < args.len() => {
                out.name = Some(args[i + 1].clone());
                i += 2;
            }
            "--character" if i + 1 < args.len() => {
                out.character = CharacterKind::parse(&args[i + 1]);
                if out.character.is_none() {
                    warn!(value = %args[i + 1], "unknown character, using default");
                }
                i += 2;
            }
            "--ticks" if i + 1 < args.len() => {
                out.ticks = args[i + 1].parse().ok();
                i += 2;
            }
            _ => i += 1,
        }
    }
    out
}

/// Walks, hops and grabs at random.
struct Wanderer {
    direction: f32,
    turn_in: u32,
    holding_for: u32,
}

impl Wanderer {
    fn new() -> Self {
        Self {
            direction: 1.0,
            turn_in: 120,
            holding_for: 0,
        }
    }

    fn input<R: Rng>(
        &mut self,
        rng: &mut R,
        position: Vec2,
        nearest_ghost: Option<Vec2>,
        holding: bool,
    ) -> InputState {
        self.turn_in = self.turn_in.saturating_sub(1);
        if self.turn_in == 0 {
            self.direction = -self.direction;
            self.turn_in = rng.gen_range(60..240);
        }
        let mut intents = if self.direction < 0.0 {
            Intents::MOVE_LEFT
        } else {
            Intents::MOVE_RIGHT
        };
        if rng.gen_bool(0.02) {
            intents |= Intents::JUMP;
        }

        let aim = nearest_ghost.unwrap_or(position + Vec2::new(self.direction * 60.0, -20.0));
        if holding {
            self.holding_for += 1;
            // Let go after a couple of seconds.
            if self.holding_for > 120 {
                intents |= Intents::INTERACT;
                self.holding_for = 0;
            }
        } else if nearest_ghost.is_some_and(|g| g.distance(position) < 40.0) {
            intents |= Intents::INTERACT;
        }
        InputState::new(intents, aim)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = parse_args();
    let mut cfg = match &args.config {
        Some(path) => PlaygroundConfig::from_path(path)?,
        None => PlaygroundConfig::default(),
    };
    if let Some(addr) = args.addr {
        cfg.store_addr = addr;
    }
    if let Some(name) = args.name {
        cfg.player_name = name;
    }
    if let Some(character) = args.character {
        cfg.character = character;
    }

    let addr: SocketAddr = cfg.store_addr.parse().context("parse store_addr")?;
    info!(store = %addr, name = %cfg.player_name, character = ?cfg.character, "Starting client");

    let store = RemoteStore::connect(addr, ParticipantId::random())
        .await
        .context("connect to store")?;
    let resources = store.resources();
    let mut session = Session::with_rapier(&cfg, store)?;

    let dt = Duration::from_secs_f32(cfg.dt());
    let mut interval = tokio::time::interval(dt);
    let mut rng = rand::thread_rng();
    let mut bot = Wanderer::new();
    let collect_radius = cfg.resources.collect_radius;
    let mut last_claim: Option<ItemId> = None;

    loop {
        interval.tick().await;

        let position = session.position();
        let nearest = session
            .ghosts()
            .nearest_within(position, 400.0)
            .and_then(|(id, _)| session.ghosts().get(id))
            .map(|g| g.display.position);
        let holding = matches!(session.grab_state(), GrabState::Holding(_));
        let input = bot.input(&mut rng, position, nearest, holding);
        let report = session.tick(input, dt);

        for event in session.drain_events() {
            match event {
                GameEvent::Landed { .. } | GameEvent::Jumped { .. } => {}
                other => info!(?other, "event"),
            }
        }

        let item = resources
            .borrow()
            .nearest_uncollected(session.position(), collect_radius);
        if let Some(item) = item {
            if last_claim != Some(item) {
                session.store().claim_item(item);
                last_claim = Some(item);
            }
        }

        if report.tick % 300 == 0 {
            let p = session.position();
            info!(
                tick = report.tick,
                x = p.x,
                y = p.y,
                ghosts = session.ghosts().len(),
                held_by = session.holder_count(),
                online = session.is_online(),
                "status"
            );
        }

        if !session.store().is_connected() {
            warn!("store connection lost, exiting");
            break;
        }
        if args.ticks.is_some_and(|n| report.tick >= n) {
            session.store().close("done");
            break;
        }
    }

    // Give the writer a moment to flush the goodbye.
    tokio::time::sleep(Duration::from_millis(50)).await;
    info!("Client stopped");
    Ok(())
}
