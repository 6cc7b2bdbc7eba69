//! Rapier-backed [`PhysicsBackend`].
//!
//! Platforms become fixed cuboids and bodies become rotation-locked balls.
//! Kinematic bodies are position-based, so a teleported proxy ends the step
//! exactly at its target and Rapier derives its velocity from the move.
//! Contacts are read back from the narrow phase after every step.

// Re-export Rapier so downstream crates can reach its types without a direct dependency.
pub use rapier2d;

use std::collections::{BTreeMap, HashMap};

use rapier2d::prelude::*;

use crate::math::{Rect, Vec2};
use crate::physics::{BodyDesc, BodyHandle, BodyKind, ContactEvent, ContactOther, PhysicsBackend};

/// World units per Rapier "meter"; scales the solver's internal tolerances for pixel units.
const LENGTH_UNIT: f32 = 50.0;

fn to_rapier(v: Vec2) -> Vector<Real> {
    vector![v.x, v.y]
}

fn from_rapier(v: &Vector<Real>) -> Vec2 {
    Vec2::new(v.x, v.y)
}

/// Rapier pipeline and sets for one world.
pub struct RapierPhysics {
    gravity: Vector<Real>,
    params: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: BroadPhaseBvh,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd: CCDSolver,
    handles: BTreeMap<BodyHandle, RigidBodyHandle>,
    /// What each collider stands for in reported contacts.
    owners: HashMap<ColliderHandle, ContactOther>,
    statics: usize,
    next_handle: u32,
}

impl RapierPhysics {
    pub fn new(gravity: Vec2) -> Self {
        let params = IntegrationParameters {
            length_unit: LENGTH_UNIT,
            ..IntegrationParameters::default()
        };
        Self {
            gravity: to_rapier(gravity),
            params,
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: BroadPhaseBvh::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            handles: BTreeMap::new(),
            owners: HashMap::new(),
            statics: 0,
            next_handle: 1,
        }
    }

    fn rigid(&self, body: BodyHandle) -> Option<&RigidBody> {
        self.handles.get(&body).and_then(|h| self.bodies.get(*h))
    }

    fn rigid_mut(&mut self, body: BodyHandle) -> Option<&mut RigidBody> {
        let handle = *self.handles.get(&body)?;
        self.bodies.get_mut(handle)
    }

    /// Both sides of every touching pair that involves a body.
    fn contacts(&self) -> Vec<ContactEvent> {
        let mut out = Vec::new();
        for pair in self.narrow_phase.contact_pairs() {
            if !pair.has_any_active_contact {
                continue;
            }
            let Some(manifold) = pair.manifolds.iter().find(|m| !m.points.is_empty()) else {
                continue;
            };
            let (Some(&first), Some(&second)) = (
                self.owners.get(&pair.collider1),
                self.owners.get(&pair.collider2),
            ) else {
                continue;
            };
            // Manifold normal points from collider1 toward collider2.
            let normal = from_rapier(&manifold.data.normal);
            if let ContactOther::Body(body) = second {
                out.push(ContactEvent {
                    body,
                    other: first,
                    normal,
                });
            }
            if let ContactOther::Body(body) = first {
                out.push(ContactEvent {
                    body,
                    other: second,
                    normal: -normal,
                });
            }
        }
        out
    }
}

impl PhysicsBackend for RapierPhysics {
    fn add_static(&mut self, rect: Rect) -> usize {
        let index = self.statics;
        self.statics += 1;
        let rb = self.bodies.insert(
            RigidBodyBuilder::fixed()
                .translation(to_rapier(rect.center))
                .build(),
        );
        let collider = ColliderBuilder::cuboid(rect.size.x * 0.5, rect.size.y * 0.5).build();
        let handle = self
            .colliders
            .insert_with_parent(collider, rb, &mut self.bodies);
        self.owners.insert(handle, ContactOther::Static(index));
        index
    }

    fn create_body(&mut self, desc: BodyDesc) -> BodyHandle {
        let handle = BodyHandle(self.next_handle);
        self.next_handle += 1;

        let builder = match desc.kind {
            BodyKind::Dynamic => RigidBodyBuilder::dynamic()
                .linear_damping(desc.air_drag)
                .gravity_scale(desc.gravity_scale),
            BodyKind::Kinematic => RigidBodyBuilder::kinematic_position_based(),
        };
        let rb = self.bodies.insert(
            builder
                .translation(to_rapier(desc.position))
                .lock_rotations()
                .can_sleep(false)
                .build(),
        );
        let collider = ColliderBuilder::ball(desc.radius)
            .mass(desc.mass)
            .friction(desc.friction)
            .restitution(desc.restitution)
            .build();
        let ch = self
            .colliders
            .insert_with_parent(collider, rb, &mut self.bodies);
        self.owners.insert(ch, ContactOther::Body(handle));
        self.handles.insert(handle, rb);
        handle
    }

    fn remove_body(&mut self, body: BodyHandle) -> bool {
        let Some(rb) = self.handles.remove(&body) else {
            return false;
        };
        if let Some(rigid) = self.bodies.get(rb) {
            for collider in rigid.colliders() {
                self.owners.remove(collider);
            }
        }
        self.bodies
            .remove(
                rb,
                &mut self.islands,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                true,
            )
            .is_some()
    }

    fn contains(&self, body: BodyHandle) -> bool {
        self.handles.contains_key(&body)
    }

    fn position(&self, body: BodyHandle) -> Option<Vec2> {
        self.rigid(body).map(|rb| from_rapier(rb.translation()))
    }

    fn velocity(&self, body: BodyHandle) -> Option<Vec2> {
        self.rigid(body).map(|rb| from_rapier(rb.linvel()))
    }

    fn set_position(&mut self, body: BodyHandle, position: Vec2) {
        if let Some(rb) = self.rigid_mut(body) {
            if rb.is_kinematic() {
                rb.set_next_kinematic_translation(to_rapier(position));
            } else {
                rb.set_translation(to_rapier(position), true);
            }
        }
    }

    fn set_velocity(&mut self, body: BodyHandle, velocity: Vec2) {
        if let Some(rb) = self.rigid_mut(body) {
            if rb.is_dynamic() {
                rb.set_linvel(to_rapier(velocity), true);
            }
        }
    }

    fn apply_force(&mut self, body: BodyHandle, force: Vec2) {
        if let Some(rb) = self.rigid_mut(body) {
            rb.add_force(to_rapier(force), true);
        }
    }

    fn step(&mut self, dt_sec: f32) -> Vec<ContactEvent> {
        if dt_sec <= 0.0 {
            return self.contacts();
        }
        self.params.dt = dt_sec;
        self.pipeline.step(
            &self.gravity,
            &self.params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            &(),
            &(),
        );
        // Rapier keeps user forces until reset; ours last one step.
        for rb in self.handles.values() {
            if let Some(rigid) = self.bodies.get_mut(*rb) {
                rigid.reset_forces(false);
            }
        }
        self.contacts()
    }

    fn body_count(&self) -> usize {
        self.handles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    fn near(a: f32, b: f32, tol: f32) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn body_falls_and_rests_on_floor() {
        let mut world = RapierPhysics::new(Vec2::new(0.0, 1000.0));
        let floor = world.add_static(Rect::new(0.0, 100.0, 400.0, 20.0));
        let ball = world.create_body(BodyDesc::dynamic(Vec2::new(0.0, 0.0), 10.0, 1.0));

        let mut touched = false;
        for _ in 0..240 {
            let contacts = world.step(DT);
            touched |= contacts.iter().any(|c| {
                c.body == ball && c.other == ContactOther::Static(floor) && c.is_support(0.5)
            });
        }
        let pos = world.position(ball).unwrap();
        assert!(touched);
        // Floor top is at y = 90; the ball's centre rests one radius above it.
        assert!(near(pos.y, 80.0, 1.5), "y = {}", pos.y);
        assert!(world.velocity(ball).unwrap().y.abs() < 30.0);
    }

    #[test]
    fn force_lasts_one_step() {
        let mut world = RapierPhysics::new(Vec2::ZERO);
        let b = world.create_body(BodyDesc::dynamic(Vec2::ZERO, 5.0, 2.0));
        world.apply_force(b, Vec2::new(120.0, 0.0));
        world.step(DT);
        let v1 = world.velocity(b).unwrap();
        assert!(near(v1.x, 60.0 * DT, 1e-3), "vx = {}", v1.x);
        world.step(DT);
        assert!(near(world.velocity(b).unwrap().x, v1.x, 1e-5));
    }

    #[test]
    fn zero_gravity_scale_floats() {
        let mut world = RapierPhysics::new(Vec2::new(0.0, 1400.0));
        let mut desc = BodyDesc::dynamic(Vec2::ZERO, 5.0, 1.0);
        desc.gravity_scale = 0.0;
        let b = world.create_body(desc);
        for _ in 0..30 {
            world.step(DT);
        }
        assert_eq!(world.position(b), Some(Vec2::ZERO));
    }

    #[test]
    fn kinematic_body_ends_step_at_its_target() {
        let mut world = RapierPhysics::new(Vec2::ZERO);
        let k = world.create_body(BodyDesc::kinematic(Vec2::ZERO, 10.0));
        for x in [25.0, 43.75, 57.8125] {
            world.set_position(k, Vec2::new(x, 0.0));
            world.step(DT);
            let p = world.position(k).unwrap();
            assert!(near(p.x, x, 1e-3) && near(p.y, 0.0, 1e-3), "at {p:?}, want {x}");
        }
        // Velocity follows the last move.
        let v = world.velocity(k).unwrap();
        assert!(near(v.x, (57.8125 - 43.75) / DT, 1.0), "v = {v:?}");
    }

    #[test]
    fn kinematic_body_pushes_dynamic() {
        let mut world = RapierPhysics::new(Vec2::ZERO);
        let wall = world.create_body(BodyDesc::kinematic(Vec2::ZERO, 10.0));
        let ball = world.create_body(BodyDesc::dynamic(Vec2::new(15.0, 0.0), 10.0, 1.0));
        let mut contacts = world.step(DT);
        for _ in 0..30 {
            world.step(DT);
        }
        assert_eq!(world.position(wall), Some(Vec2::ZERO));
        assert!(world.position(ball).unwrap().x > 19.0);
        contacts.retain(|c| c.body == ball);
        assert!(contacts
            .iter()
            .any(|c| c.other == ContactOther::Body(wall) && c.normal.x > 0.9));
    }

    #[test]
    fn removed_bodies_are_gone() {
        let mut world = RapierPhysics::new(Vec2::ZERO);
        world.add_static(Rect::new(0.0, 0.0, 10.0, 10.0));
        let b = world.create_body(BodyDesc::kinematic(Vec2::ZERO, 1.0));
        assert_eq!(world.body_count(), 1);
        assert!(world.remove_body(b));
        assert!(!world.contains(b));
        assert!(!world.remove_body(b));
        assert_eq!(world.body_count(), 0);
        assert!(world.step(DT).is_empty());
    }
}
