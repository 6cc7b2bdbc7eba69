//! Physics abstraction.
//!
//! The playground consumes a rigid-body solver through the narrow
//! [`PhysicsBackend`] interface: create/remove bodies, apply forces,
//! override velocity/position, step, and read back the contacts produced by
//! the step. The solver itself is Rapier, see [`crate::rapier_world`].

use crate::math::{Rect, Vec2};

/// Opaque body handle. Handles are never reused within one world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// Integrated from forces and gravity.
    Dynamic,
    /// Position-based: `set_position` names the pose reached at the end of
    /// the next step and the velocity follows from the move. Infinite mass
    /// in contacts.
    Kinematic,
}

/// Parameters for a new circular body.
#[derive(Debug, Clone, Copy)]
pub struct BodyDesc {
    pub kind: BodyKind,
    pub position: Vec2,
    pub radius: f32,
    pub mass: f32,
    /// Linear drag per second.
    pub air_drag: f32,
    pub restitution: f32,
    pub friction: f32,
    /// Multiplier on world gravity; 0 for bodies steered entirely by forces.
    pub gravity_scale: f32,
}

impl BodyDesc {
    pub fn dynamic(position: Vec2, radius: f32, mass: f32) -> Self {
        Self {
            kind: BodyKind::Dynamic,
            position,
            radius,
            mass,
            air_drag: 0.0,
            restitution: 0.0,
            friction: 0.5,
            gravity_scale: 1.0,
        }
    }

    pub fn kinematic(position: Vec2, radius: f32) -> Self {
        Self {
            kind: BodyKind::Kinematic,
            ..Self::dynamic(position, radius, 1.0)
        }
    }
}

/// What a body touched during a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactOther {
    /// Index of a static rectangle, in insertion order.
    Static(usize),
    Body(BodyHandle),
}

/// One contact reported for `body` after a step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactEvent {
    pub body: BodyHandle,
    pub other: ContactOther,
    /// Unit normal pointing from `other` toward `body`.
    pub normal: Vec2,
}

impl ContactEvent {
    /// True when `other` lies underneath `body` (the normal points up, `-y`).
    pub fn is_support(&self, min_up: f32) -> bool {
        -self.normal.y >= min_up
    }
}

/// Physics stepper trait.
pub trait PhysicsBackend: Send {
    /// Adds immutable world geometry and returns its index.
    fn add_static(&mut self, rect: Rect) -> usize;
    fn create_body(&mut self, desc: BodyDesc) -> BodyHandle;
    /// Removes a body; returns false when the handle was unknown.
    fn remove_body(&mut self, body: BodyHandle) -> bool;
    fn contains(&self, body: BodyHandle) -> bool;
    fn position(&self, body: BodyHandle) -> Option<Vec2>;
    fn velocity(&self, body: BodyHandle) -> Option<Vec2>;
    /// Teleports a dynamic body; for a kinematic body, sets the target of the next step.
    fn set_position(&mut self, body: BodyHandle, position: Vec2);
    /// Overrides a dynamic body's velocity. Kinematic bodies ignore it.
    fn set_velocity(&mut self, body: BodyHandle, velocity: Vec2);
    /// Accumulates a force for the next step only.
    fn apply_force(&mut self, body: BodyHandle, force: Vec2);
    /// Advances the world and returns every contact active after the step.
    fn step(&mut self, dt_sec: f32) -> Vec<ContactEvent>;
    /// Dynamic and kinematic bodies; world geometry is not counted.
    fn body_count(&self) -> usize;
}
