//! Input handling.
//!
//! Hosts integrate with keyboards, mice or touch however they like; the
//! session only consumes a typed [`InputState`] per tick. Held flags are
//! level-triggered; `INTERACT` is turned into a single-tick edge here.

use bitflags::bitflags;
use playground_shared::math::Vec2;

bitflags! {
    /// Intents held during a tick.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Intents: u8 {
        const MOVE_LEFT = 1 << 0;
        const MOVE_RIGHT = 1 << 1;
        const JUMP = 1 << 2;
        /// Pressed state of the interact control; edges toggle the grab.
        const INTERACT = 1 << 3;
    }
}

/// User input state at a moment in time.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputState {
    pub intents: Intents,
    /// Aim point in world coordinates.
    pub aim: Vec2,
}

impl InputState {
    pub fn new(intents: Intents, aim: Vec2) -> Self {
        Self { intents, aim }
    }

    /// Only an aim point; nothing held.
    pub fn aiming(aim: Vec2) -> Self {
        Self::new(Intents::empty(), aim)
    }

    pub fn with(mut self, intents: Intents) -> Self {
        self.intents |= intents;
        self
    }

    /// -1 for left, +1 for right, 0 for neither or both.
    pub fn move_axis(&self) -> f32 {
        let left = self.intents.contains(Intents::MOVE_LEFT);
        let right = self.intents.contains(Intents::MOVE_RIGHT);
        match (left, right) {
            (true, false) => -1.0,
            (false, true) => 1.0,
            _ => 0.0,
        }
    }
}

/// What the session acts on for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickCommand {
    pub move_axis: f32,
    pub jump: bool,
    /// True only on the tick the interact control went down.
    pub interact: bool,
    pub aim: Vec2,
}

/// Turns sampled input into per-tick commands, tracking the interact edge.
#[derive(Debug, Default)]
pub struct InputSampler {
    interact_was_down: bool,
}

impl InputSampler {
    pub fn sample(&mut self, input: InputState) -> TickCommand {
        let down = input.intents.contains(Intents::INTERACT);
        let interact = down && !self.interact_was_down;
        self.interact_was_down = down;
        TickCommand {
            move_axis: input.move_axis(),
            jump: input.intents.contains(Intents::JUMP),
            interact,
            aim: input.aim,
        }
    }
}
