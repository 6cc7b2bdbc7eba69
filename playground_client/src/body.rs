//! Local body controller.
//!
//! Owns the local participant's rigid body and everything the input drives:
//! horizontal move force, jumping with coyote-time grounding, the post-step
//! speed cap, landing detection and respawn when the body leaves the world.

use playground_shared::{
    config::MovementTuning,
    event::{EventBus, GameEvent},
    math::Vec2,
    physics::{BodyDesc, BodyHandle, ContactEvent, PhysicsBackend},
    world::WorldMap,
};
use tracing::debug;

use crate::input::TickCommand;

/// Minimum upward normal component for a contact to count as support.
pub const SUPPORT_NORMAL: f32 = 0.5;

/// What happened to the body during post-step processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepOutcome {
    pub landed: bool,
    pub respawned: bool,
}

/// The local participant's physics body.
#[derive(Debug)]
pub struct LocalBody {
    handle: BodyHandle,
    tuning: MovementTuning,
    spawn: Vec2,
    /// Coyote counter: ticks of grounding left.
    grounded_frames: u32,
    was_grounded: bool,
    /// Vertical speed going into the current step.
    fall_speed: f32,
}

impl LocalBody {
    /// Creates the body at `spawn`.
    pub fn spawn<P: PhysicsBackend + ?Sized>(
        physics: &mut P,
        spawn: Vec2,
        tuning: &MovementTuning,
    ) -> Self {
        let mut desc = BodyDesc::dynamic(spawn, tuning.body_radius, tuning.body_mass);
        desc.air_drag = tuning.air_drag;
        desc.restitution = tuning.restitution;
        desc.friction = tuning.friction;
        let handle = physics.create_body(desc);
        Self {
            handle,
            tuning: *tuning,
            spawn,
            grounded_frames: 0,
            was_grounded: false,
            fall_speed: 0.0,
        }
    }

    pub fn handle(&self) -> BodyHandle {
        self.handle
    }

    pub fn position<P: PhysicsBackend + ?Sized>(&self, physics: &P) -> Vec2 {
        physics.position(self.handle).unwrap_or(self.spawn)
    }

    pub fn velocity<P: PhysicsBackend + ?Sized>(&self, physics: &P) -> Vec2 {
        physics.velocity(self.handle).unwrap_or(Vec2::ZERO)
    }

    /// Grounded as seen by the current tick.
    pub fn is_grounded(&self) -> bool {
        self.grounded_frames > 0
    }

    pub fn grounded_frames(&self) -> u32 {
        self.grounded_frames
    }

    /// Applies the move force and, if grounded, the jump. Returns true on a jump.
    pub fn apply_input<P: PhysicsBackend + ?Sized>(
        &mut self,
        physics: &mut P,
        cmd: &TickCommand,
        events: &mut EventBus,
    ) -> bool {
        if cmd.move_axis != 0.0 {
            physics.apply_force(
                self.handle,
                Vec2::new(cmd.move_axis * self.tuning.move_force, 0.0),
            );
        }

        let mut jumped = false;
        if cmd.jump && self.grounded_frames > 0 {
            let v = self.velocity(physics);
            physics.set_velocity(self.handle, Vec2::new(v.x, -self.tuning.jump_speed));
            self.grounded_frames = 0;
            jumped = true;
            events.push(GameEvent::Jumped {
                position: self.position(physics),
            });
        }

        self.fall_speed = self.velocity(physics).y;
        jumped
    }

    /// Consumes the step's contacts, clamps speed, detects landing and
    /// respawns the body if it left the world.
    pub fn after_step<P: PhysicsBackend + ?Sized>(
        &mut self,
        physics: &mut P,
        contacts: &[ContactEvent],
        map: &WorldMap,
        events: &mut EventBus,
    ) -> StepOutcome {
        let mut outcome = StepOutcome::default();
        self.observe_contacts(contacts);

        let v = self.velocity(physics);
        let max = self.tuning.max_speed;
        if v.x.abs() > max {
            physics.set_velocity(self.handle, Vec2::new(max.copysign(v.x), v.y));
        }

        let grounded = self.is_grounded();
        if grounded && !self.was_grounded && self.fall_speed > self.tuning.landing_speed {
            outcome.landed = true;
            events.push(GameEvent::Landed {
                position: self.position(physics),
                impact_speed: self.fall_speed,
            });
        }
        self.was_grounded = grounded;

        let pos = self.position(physics);
        if map.is_out_of_bounds(pos) {
            debug!(x = pos.x, y = pos.y, "respawning local body");
            physics.set_position(self.handle, self.spawn);
            physics.set_velocity(self.handle, Vec2::ZERO);
            outcome.respawned = true;
            events.push(GameEvent::Respawned { from: pos });
        }
        outcome
    }

    /// Refreshes the coyote counter from any supporting contact.
    pub fn observe_contacts(&mut self, contacts: &[ContactEvent]) {
        let supported = contacts
            .iter()
            .any(|c| c.body == self.handle && c.is_support(SUPPORT_NORMAL));
        if supported {
            self.grounded_frames = self.tuning.coyote_frames;
        }
    }

    /// End-of-tick bookkeeping.
    pub fn end_tick(&mut self) {
        self.grounded_frames = self.grounded_frames.saturating_sub(1);
    }
}
