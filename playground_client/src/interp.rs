//! Remote ghost interpolation.
//!
//! The store delivers sparse, coalesced snapshots of every participant. Each
//! remote participant is shown as a ghost whose display pose chases its last
//! published pose by exponential smoothing. Ghosts may carry a proxy body so
//! the local body can collide with them.
//!
//! Lifecycle:
//! - created on first sighting with display = published
//! - proxy created lazily on the first `advance`
//! - destroyed, proxy included, in the same `reconcile` that no longer sees it

use std::collections::BTreeMap;

use playground_shared::{
    config::{GhostTuning, ProxyMode},
    math::{approach_angle, wrap_angle, Vec2},
    physics::{BodyDesc, BodyHandle, PhysicsBackend},
    store::{Limb, ParticipantId, ParticipantRecord, PresenceSnapshot},
};
use tracing::debug;

use crate::character::{CharacterModel, Pose};

/// Moves `display` `blend` of the way toward `published`.
///
/// The heading follows the shorter arc and stays in $(-\pi, \pi]$.
pub fn blend_pose(display: &Pose, published: &Pose, blend: f32) -> Pose {
    let mut out = Pose::at(display.position.approach(published.position, blend));
    for limb in Limb::ALL {
        let p = match (display.limb(limb), published.limb(limb)) {
            (Some(d), Some(p)) => Some(d.approach(p, blend)),
            (None, p) => p,
            (d, None) => d,
        };
        out.set_limb(limb, p);
    }
    out.heading = match (display.heading, published.heading) {
        (Some(d), Some(p)) => Some(wrap_angle(approach_angle(d, p, blend))),
        (None, p) => p,
        (d, None) => d,
    };
    out
}

/// Local view of one remote participant.
#[derive(Debug, Clone)]
pub struct Ghost {
    pub id: ParticipantId,
    pub record: ParticipantRecord,
    pub published: Pose,
    pub display: Pose,
    proxy: Option<BodyHandle>,
}

impl Ghost {
    fn new(id: ParticipantId, record: ParticipantRecord, model: &CharacterModel) -> Self {
        let published = model.pose_from_record(&record);
        Self {
            id,
            record,
            published,
            display: published,
            proxy: None,
        }
    }

    pub fn proxy(&self) -> Option<BodyHandle> {
        self.proxy
    }

    /// Published hold point if this participant is holding `id`.
    pub fn hold_point_on(&self, id: &ParticipantId) -> Option<Vec2> {
        if self.record.is_holding(id) {
            self.record.hold_point()
        } else {
            None
        }
    }
}

/// Ids that appeared or vanished in one reconcile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciled {
    pub joined: Vec<ParticipantId>,
    pub left: Vec<ParticipantId>,
}

/// All ghosts of one session, keyed and iterated in id order.
#[derive(Debug)]
pub struct GhostManager {
    model: CharacterModel,
    tuning: GhostTuning,
    mode: ProxyMode,
    ghosts: BTreeMap<ParticipantId, Ghost>,
}

impl GhostManager {
    pub fn new(model: CharacterModel, tuning: GhostTuning) -> Self {
        let mode = tuning.proxy.unwrap_or(model.default_proxy);
        Self {
            model,
            tuning,
            mode,
            ghosts: BTreeMap::new(),
        }
    }

    pub fn proxy_mode(&self) -> ProxyMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.ghosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ghosts.is_empty()
    }

    pub fn get(&self, id: &ParticipantId) -> Option<&Ghost> {
        self.ghosts.get(id)
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.ghosts.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Ghost> {
        self.ghosts.values()
    }

    /// Applies a snapshot: new ids get ghosts, known ids get the new record,
    /// vanished ids lose their ghost and proxy body.
    pub fn reconcile<P: PhysicsBackend + ?Sized>(
        &mut self,
        snapshot: &PresenceSnapshot,
        local: &ParticipantId,
        physics: &mut P,
    ) -> Reconciled {
        let mut out = Reconciled::default();

        let vanished: Vec<ParticipantId> = self
            .ghosts
            .keys()
            .filter(|id| !snapshot.contains(id))
            .cloned()
            .collect();
        for id in vanished {
            if let Some(ghost) = self.ghosts.remove(&id) {
                if let Some(proxy) = ghost.proxy {
                    physics.remove_body(proxy);
                }
                debug!(participant = %id, "ghost removed");
                out.left.push(id);
            }
        }

        for (id, record) in snapshot.iter() {
            if id == local {
                continue;
            }
            match self.ghosts.get_mut(id) {
                Some(ghost) => {
                    ghost.published = self.model.pose_from_record(record);
                    ghost.record = record.clone();
                }
                None => {
                    debug!(participant = %id, name = %record.name, "ghost created");
                    self.ghosts.insert(
                        id.clone(),
                        Ghost::new(id.clone(), record.clone(), &self.model),
                    );
                    out.joined.push(id.clone());
                }
            }
        }
        out
    }

    /// One interpolation step for every ghost, then proxy correction.
    pub fn advance<P: PhysicsBackend + ?Sized>(&mut self, physics: &mut P) {
        for ghost in self.ghosts.values_mut() {
            ghost.display = blend_pose(&ghost.display, &ghost.published, self.tuning.blend);
            Self::drive_proxy(self.mode, &self.tuning, ghost, physics);
        }
    }

    fn drive_proxy<P: PhysicsBackend + ?Sized>(
        mode: ProxyMode,
        tuning: &GhostTuning,
        ghost: &mut Ghost,
        physics: &mut P,
    ) {
        let target = ghost.display.position;
        match mode {
            ProxyMode::None => {}
            ProxyMode::Kinematic => {
                // The body lands on `target` at the end of the coming step.
                let handle = *ghost.proxy.get_or_insert_with(|| {
                    physics.create_body(BodyDesc::kinematic(target, tuning.proxy_radius))
                });
                physics.set_position(handle, target);
            }
            ProxyMode::Spring => {
                let handle = *ghost.proxy.get_or_insert_with(|| {
                    let mut desc =
                        BodyDesc::dynamic(target, tuning.proxy_radius, tuning.proxy_mass);
                    desc.gravity_scale = 0.0;
                    physics.create_body(desc)
                });
                let pos = physics.position(handle).unwrap_or(target);
                physics.apply_force(handle, (target - pos) * tuning.spring);
                let v = physics.velocity(handle).unwrap_or(Vec2::ZERO);
                physics.set_velocity(handle, v * tuning.damping);
            }
        }
    }

    /// Nearest ghost strictly within `reach` of `point`; ties go to the
    /// lowest id.
    pub fn nearest_within(&self, point: Vec2, reach: f32) -> Option<(&ParticipantId, f32)> {
        let mut best: Option<(&ParticipantId, f32)> = None;
        for (id, ghost) in &self.ghosts {
            let d = ghost.display.position.distance(point);
            if d < reach && best.map_or(true, |(_, bd)| d < bd) {
                best = Some((id, d));
            }
        }
        best
    }

    /// Hold points of every ghost currently holding `local`.
    pub fn holders_of<'a>(
        &'a self,
        local: &'a ParticipantId,
    ) -> impl Iterator<Item = (&'a ParticipantId, Vec2)> + 'a {
        self.ghosts
            .iter()
            .filter_map(move |(id, g)| g.hold_point_on(local).map(|p| (id, p)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use playground_shared::config::CharacterKind;
    use playground_shared::rapier_world::RapierPhysics;
    use std::f32::consts::PI;

    const DT: f32 = 1.0 / 60.0;

    fn pid(s: &str) -> ParticipantId {
        ParticipantId::new(s)
    }

    fn snapshot(entries: &[(&str, Vec2)]) -> PresenceSnapshot {
        let mut snap = PresenceSnapshot::empty();
        for (id, pos) in entries {
            snap.participants
                .insert(pid(id), ParticipantRecord::new(*id, "#abcdef", *pos));
        }
        snap
    }

    fn manager(mode: ProxyMode) -> GhostManager {
        let tuning = GhostTuning {
            proxy: Some(mode),
            ..GhostTuning::default()
        };
        GhostManager::new(CharacterModel::for_kind(CharacterKind::Blob), tuning)
    }

    #[test]
    fn display_blends_a_quarter_per_tick() {
        let mut physics = RapierPhysics::new(Vec2::ZERO);
        let mut ghosts = manager(ProxyMode::None);
        let me = pid("me");

        ghosts.reconcile(&snapshot(&[("b", Vec2::new(0.0, 0.0))]), &me, &mut physics);
        ghosts.reconcile(&snapshot(&[("b", Vec2::new(100.0, 40.0))]), &me, &mut physics);
        ghosts.advance(&mut physics);
        assert_eq!(
            ghosts.get(&pid("b")).unwrap().display.position,
            Vec2::new(25.0, 10.0)
        );
        ghosts.advance(&mut physics);
        assert_eq!(
            ghosts.get(&pid("b")).unwrap().display.position,
            Vec2::new(43.75, 17.5)
        );
    }

    #[test]
    fn new_ghost_starts_at_published_pose() {
        let mut physics = RapierPhysics::new(Vec2::ZERO);
        let mut ghosts = manager(ProxyMode::None);
        let out = ghosts.reconcile(
            &snapshot(&[("b", Vec2::new(7.0, 8.0)), ("me", Vec2::ZERO)]),
            &pid("me"),
            &mut physics,
        );
        assert_eq!(out.joined, vec![pid("b")]);
        assert!(!ghosts.contains(&pid("me")));
        let g = ghosts.get(&pid("b")).unwrap();
        assert_eq!(g.display, g.published);
    }

    #[test]
    fn heading_blends_across_the_seam() {
        let display = Pose {
            heading: Some(-3.0),
            ..Pose::default()
        };
        let published = Pose {
            heading: Some(3.0),
            ..Pose::default()
        };
        let h = blend_pose(&display, &published, 0.25).heading.unwrap();
        // Short arc is 2PI - 6 wide, crossing -PI.
        let expected = wrap_angle(-3.0 - 0.25 * (2.0 * PI - 6.0));
        assert!((h - expected).abs() < 1e-5, "h = {h}");
        assert!(h < -3.0 && h > -PI);
    }

    #[test]
    fn vanished_ghost_takes_its_proxy_along() {
        let mut physics = RapierPhysics::new(Vec2::ZERO);
        let mut ghosts = manager(ProxyMode::Kinematic);
        let me = pid("me");
        ghosts.reconcile(&snapshot(&[("b", Vec2::new(10.0, 10.0))]), &me, &mut physics);
        ghosts.advance(&mut physics);
        let proxy = ghosts.get(&pid("b")).unwrap().proxy().unwrap();
        assert!(physics.contains(proxy));

        let out = ghosts.reconcile(&PresenceSnapshot::empty(), &me, &mut physics);
        assert_eq!(out.left, vec![pid("b")]);
        assert!(ghosts.is_empty());
        assert!(!physics.contains(proxy));
    }

    #[test]
    fn kinematic_proxy_sits_on_display_after_step() {
        let mut physics = RapierPhysics::new(Vec2::ZERO);
        let mut ghosts = manager(ProxyMode::Kinematic);
        let me = pid("me");
        ghosts.reconcile(&snapshot(&[("b", Vec2::ZERO)]), &me, &mut physics);
        ghosts.advance(&mut physics);
        physics.step(DT);
        ghosts.reconcile(&snapshot(&[("b", Vec2::new(100.0, 0.0))]), &me, &mut physics);
        for _ in 0..3 {
            ghosts.advance(&mut physics);
            physics.step(DT);
            let g = ghosts.get(&pid("b")).unwrap();
            let proxy = physics.position(g.proxy().unwrap()).unwrap();
            assert!(
                proxy.distance(g.display.position) < 1e-3,
                "display={:?} proxy_after_step={proxy:?}",
                g.display.position
            );
        }
    }

    #[test]
    fn spring_proxy_is_pulled_toward_display() {
        let mut physics = RapierPhysics::new(Vec2::new(0.0, 1400.0));
        let mut ghosts = manager(ProxyMode::Spring);
        let me = pid("me");
        ghosts.reconcile(&snapshot(&[("b", Vec2::ZERO)]), &me, &mut physics);
        ghosts.advance(&mut physics);
        let proxy = ghosts.get(&pid("b")).unwrap().proxy().unwrap();
        physics.set_position(proxy, Vec2::new(-30.0, 0.0));
        for _ in 0..120 {
            ghosts.advance(&mut physics);
            physics.step(DT);
        }
        let p = physics.position(proxy).unwrap();
        assert!(p.distance(Vec2::ZERO) < 5.0, "proxy at {p:?}");
    }

    #[test]
    fn no_proxy_mode_creates_no_bodies() {
        let mut physics = RapierPhysics::new(Vec2::ZERO);
        let mut ghosts = manager(ProxyMode::None);
        ghosts.reconcile(&snapshot(&[("b", Vec2::ZERO)]), &pid("me"), &mut physics);
        ghosts.advance(&mut physics);
        assert_eq!(physics.body_count(), 0);
    }

    #[test]
    fn nearest_prefers_lowest_id_on_ties() {
        let mut physics = RapierPhysics::new(Vec2::ZERO);
        let mut ghosts = manager(ProxyMode::None);
        ghosts.reconcile(
            &snapshot(&[("b", Vec2::new(10.0, 0.0)), ("a", Vec2::new(-10.0, 0.0))]),
            &pid("me"),
            &mut physics,
        );
        let (id, d) = ghosts.nearest_within(Vec2::ZERO, 45.0).unwrap();
        assert_eq!(id, &pid("a"));
        assert_eq!(d, 10.0);
        assert!(ghosts.nearest_within(Vec2::ZERO, 10.0).is_none());
    }
}
