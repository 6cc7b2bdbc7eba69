//! Configuration system.
//!
//! Loads playground configuration from JSON strings/files. Every section has
//! defaults, so a config file only needs the fields it overrides.

use std::fmt;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::math::Vec2;

/// Character variant, selected at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CharacterKind {
    /// Torso with head, arm and leg; grabs with the hand.
    Ragdoll,
    /// A single circle; grabs from its centre.
    Blob,
    /// Circle with one arm reaching toward the aim point.
    #[default]
    ArmReach,
    /// Like `ArmReach` but remote bodies are soft spring proxies.
    SpringPull,
    /// Body with a head that turns toward the aim; grabs with the beak.
    Bird,
}

impl CharacterKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ragdoll" => Some(Self::Ragdoll),
            "blob" => Some(Self::Blob),
            "arm_reach" | "arm-reach" | "arm" => Some(Self::ArmReach),
            "spring_pull" | "spring-pull" | "spring" => Some(Self::SpringPull),
            "bird" => Some(Self::Bird),
            _ => None,
        }
    }
}

/// How remote participants are represented in the local physics world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyMode {
    /// No collision proxy.
    None,
    /// Teleported to the ghost's display pose every tick; not pushable.
    Kinematic,
    /// Dynamic body pulled toward the display pose by a damped spring.
    Spring,
}

/// Root configuration for clients and the store server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaygroundConfig {
    /// Store server address, e.g. `127.0.0.1:40100`.
    #[serde(default = "default_store_addr")]
    pub store_addr: String,
    /// Fixed simulation tick rate.
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,
    /// Display name (client only).
    #[serde(default = "default_player_name")]
    pub player_name: String,
    /// Display colour as `#rrggbb`; picked at random when absent.
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub character: CharacterKind,
    #[serde(default)]
    pub world: WorldConfig,
    #[serde(default)]
    pub movement: MovementTuning,
    #[serde(default)]
    pub ghosts: GhostTuning,
    #[serde(default)]
    pub grab: GrabTuning,
    #[serde(default)]
    pub sync: SyncTuning,
    #[serde(default)]
    pub resources: ResourceConfig,
}

fn default_store_addr() -> String {
    "127.0.0.1:40100".to_string()
}

fn default_tick_hz() -> u32 {
    60
}

fn default_player_name() -> String {
    "Player".to_string()
}

impl Default for PlaygroundConfig {
    fn default() -> Self {
        Self {
            store_addr: default_store_addr(),
            tick_hz: default_tick_hz(),
            player_name: default_player_name(),
            color: None,
            character: CharacterKind::default(),
            world: WorldConfig::default(),
            movement: MovementTuning::default(),
            ghosts: GhostTuning::default(),
            grab: GrabTuning::default(),
            sync: SyncTuning::default(),
            resources: ResourceConfig::default(),
        }
    }
}

impl PlaygroundConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Reads, parses and validates a JSON config file.
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let cfg = Self::from_json_str(&text)
            .with_context(|| format!("parse config {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Fixed timestep in seconds.
    pub fn dt(&self) -> f32 {
        1.0 / self.tick_hz.max(1) as f32
    }

    /// Rejects tunings the tick loop cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_hz == 0 {
            return Err(ConfigError::ZeroTickRate);
        }
        if !(self.ghosts.blend > 0.0 && self.ghosts.blend <= 1.0) {
            return Err(ConfigError::BlendOutOfRange(self.ghosts.blend));
        }
        if self.grab.break_distance <= self.grab.reach {
            return Err(ConfigError::BreakInsideReach {
                reach: self.grab.reach,
                break_distance: self.grab.break_distance,
            });
        }
        if self.world.width <= 0.0 || self.world.height <= 0.0 {
            return Err(ConfigError::EmptyWorld);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    ZeroTickRate,
    BlendOutOfRange(f32),
    BreakInsideReach { reach: f32, break_distance: f32 },
    EmptyWorld,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroTickRate => write!(f, "tick_hz must be positive"),
            ConfigError::BlendOutOfRange(b) => write!(f, "ghost blend {b} must be in (0, 1]"),
            ConfigError::BreakInsideReach {
                reach,
                break_distance,
            } => write!(
                f,
                "grab break distance {break_distance} must exceed reach {reach}"
            ),
            ConfigError::EmptyWorld => write!(f, "world extents must be positive"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// World extents, gravity and respawn rules.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub width: f32,
    pub height: f32,
    /// Downward acceleration in units/s².
    pub gravity: f32,
    /// How far past the left, right or bottom edge a body may fall before respawning.
    pub respawn_margin: f32,
    /// Build the tiered platform arena (otherwise an empty world).
    pub arena: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: 2400.0,
            height: 1200.0,
            gravity: 1400.0,
            respawn_margin: 100.0,
            arena: true,
        }
    }
}

impl WorldConfig {
    /// Fixed spawn point near the bottom centre.
    pub fn spawn_point(&self) -> Vec2 {
        Vec2::new(self.width / 2.0, self.height - 100.0)
    }
}

/// Local body tuning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementTuning {
    /// Horizontal force applied while a move intent is held.
    pub move_force: f32,
    /// Horizontal speed cap, enforced by velocity override after each step.
    pub max_speed: f32,
    /// Upward speed set by a jump.
    pub jump_speed: f32,
    /// Grace ticks after the last ground contact during which a jump is allowed.
    pub coyote_frames: u32,
    /// Minimum downward speed for a ground touch to count as a landing.
    pub landing_speed: f32,
    pub body_radius: f32,
    pub body_mass: f32,
    /// Linear drag per second.
    pub air_drag: f32,
    pub restitution: f32,
    pub friction: f32,
}

impl Default for MovementTuning {
    fn default() -> Self {
        Self {
            move_force: 1400.0,
            max_speed: 260.0,
            jump_speed: 560.0,
            coyote_frames: 6,
            landing_speed: 120.0,
            body_radius: 14.0,
            body_mass: 1.0,
            air_drag: 1.2,
            restitution: 0.2,
            friction: 0.6,
        }
    }
}

/// Remote ghost interpolation and proxy-body tuning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct GhostTuning {
    /// Exponential smoothing factor per tick.
    pub blend: f32,
    /// Overrides the character model's default proxy mode.
    pub proxy: Option<ProxyMode>,
    /// Spring stiffness pulling a spring proxy toward the display pose.
    pub spring: f32,
    /// Per-tick velocity multiplier applied to spring proxies.
    pub damping: f32,
    pub proxy_radius: f32,
    pub proxy_mass: f32,
}

impl Default for GhostTuning {
    fn default() -> Self {
        Self {
            blend: 0.25,
            proxy: None,
            spring: 80.0,
            damping: 0.85,
            proxy_radius: 18.0,
            proxy_mass: 2.0,
        }
    }
}

/// Grab geometry and force tuning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct GrabTuning {
    /// A ghost must be strictly closer than this to the anchor to be grabbed.
    pub reach: f32,
    /// The grabber releases once the anchor-to-target distance exceeds this.
    pub break_distance: f32,
    /// Force per unit of distance.
    pub drag_gain: f32,
    /// Force cap.
    pub max_force: f32,
    /// No force is applied inside this distance.
    pub dead_zone: f32,
    /// Lets a held participant break free with its own interact input.
    pub allow_self_release: bool,
}

impl Default for GrabTuning {
    fn default() -> Self {
        Self {
            reach: 45.0,
            break_distance: 80.0,
            drag_gain: 4.0,
            max_force: 120.0,
            dead_zone: 5.0,
            allow_self_release: false,
        }
    }
}

/// Outbound publish tuning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncTuning {
    /// Minimum time between two publishes.
    pub min_interval_ms: u64,
}

impl Default for SyncTuning {
    fn default() -> Self {
        Self { min_interval_ms: 50 }
    }
}

/// Resource-collection field, maintained by the store's janitor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    pub width: f32,
    pub height: f32,
    /// Target number of items in the field.
    pub item_count: usize,
    /// Collected items come back after this long.
    pub respawn_ms: i64,
    /// Janitor period.
    pub janitor_interval_ms: u64,
    /// How close a participant must be to collect an item.
    pub collect_radius: f32,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            width: 2000.0,
            height: 2000.0,
            item_count: 50,
            respawn_ms: 30_000,
            janitor_interval_ms: 1_000,
            collect_radius: 30.0,
        }
    }
}
