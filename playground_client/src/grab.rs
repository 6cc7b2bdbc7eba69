//! Grab protocol.
//!
//! A grab is one field on the grabber's own record; there is no handshake and
//! no arbiter. The grabber alone decides when the grab ends:
//! - another interact edge
//! - the target vanishing from the snapshot
//! - the anchor drifting further than the break distance from the target
//!
//! The held side derives its state by scanning remote records for
//! `grab == local id` and is pulled toward each holder's published hold point.

use std::collections::BTreeSet;

use playground_shared::{
    config::GrabTuning,
    event::{GameEvent, ReleaseReason},
    math::Vec2,
    store::ParticipantId,
};
use tracing::debug;

use crate::interp::GhostManager;

/// Capped pull from `from` toward `to`; zero inside the dead zone.
pub fn drag_force(from: Vec2, to: Vec2, tuning: &GrabTuning) -> Vec2 {
    let delta = to - from;
    let dist = delta.len();
    if dist <= tuning.dead_zone {
        return Vec2::ZERO;
    }
    let magnitude = (dist * tuning.drag_gain).clamp(0.0, tuning.max_force);
    delta * (magnitude / dist)
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GrabState {
    #[default]
    Idle,
    Holding(ParticipantId),
}

/// Grabber-side state machine plus the held-side force scan.
#[derive(Debug, Default)]
pub struct GrabController {
    state: GrabState,
    tuning: GrabTuning,
    /// Holders we broke free from; their pull is ignored until they let go.
    shrugged_off: BTreeSet<ParticipantId>,
}

impl GrabController {
    pub fn new(tuning: GrabTuning) -> Self {
        Self {
            state: GrabState::Idle,
            tuning,
            shrugged_off: BTreeSet::new(),
        }
    }

    pub fn state(&self) -> &GrabState {
        &self.state
    }

    pub fn target(&self) -> Option<&ParticipantId> {
        match &self.state {
            GrabState::Holding(id) => Some(id),
            GrabState::Idle => None,
        }
    }

    pub fn is_holding(&self) -> bool {
        matches!(self.state, GrabState::Holding(_))
    }

    /// Drops the current grab, if any.
    pub fn release(&mut self, reason: ReleaseReason) -> Option<GameEvent> {
        match std::mem::take(&mut self.state) {
            GrabState::Holding(target) => {
                debug!(target = %target, ?reason, "grab released");
                Some(GameEvent::GrabReleased { target, reason })
            }
            GrabState::Idle => None,
        }
    }

    /// Releases a grab whose target is no longer a ghost.
    pub fn forget_vanished(&mut self, ghosts: &GhostManager) -> Option<GameEvent> {
        let gone = self.target().is_some_and(|t| !ghosts.contains(t));
        if gone {
            self.release(ReleaseReason::TargetVanished)
        } else {
            None
        }
    }

    /// Handles an interact edge: release while holding, otherwise grab the
    /// nearest ghost strictly within reach of `anchor`.
    pub fn on_interact(
        &mut self,
        anchor: Vec2,
        local: &ParticipantId,
        ghosts: &GhostManager,
    ) -> Option<GameEvent> {
        if self.is_holding() {
            return self.release(ReleaseReason::Interact);
        }
        if self.tuning.allow_self_release {
            if let Some(event) = self.break_free(local, ghosts) {
                return Some(event);
            }
        }
        let (target, dist) = ghosts.nearest_within(anchor, self.tuning.reach)?;
        debug!(target = %target, dist, "grab acquired");
        self.state = GrabState::Holding(target.clone());
        Some(GameEvent::GrabAcquired {
            target: target.clone(),
        })
    }

    fn break_free(&mut self, local: &ParticipantId, ghosts: &GhostManager) -> Option<GameEvent> {
        let (holder, _) = ghosts
            .holders_of(local)
            .find(|(id, _)| !self.shrugged_off.contains(*id))?;
        let holder = holder.clone();
        self.shrugged_off.insert(holder.clone());
        Some(GameEvent::GrabReleased {
            target: holder,
            reason: ReleaseReason::SelfRelease,
        })
    }

    /// Releases once the anchor is further than the break distance from the
    /// target's display position.
    pub fn check_break(&mut self, anchor: Vec2, ghosts: &GhostManager) -> Option<GameEvent> {
        let target = self.target()?;
        let Some(ghost) = ghosts.get(target) else {
            return self.release(ReleaseReason::TargetVanished);
        };
        if ghost.display.position.distance(anchor) > self.tuning.break_distance {
            self.release(ReleaseReason::BrokeDistance)
        } else {
            None
        }
    }

    /// Force on the local body from holding: anchor pulled toward the target.
    pub fn holding_force(&self, anchor: Vec2, ghosts: &GhostManager) -> Vec2 {
        self.target()
            .and_then(|t| ghosts.get(t))
            .map(|g| drag_force(anchor, g.display.position, &self.tuning))
            .unwrap_or(Vec2::ZERO)
    }

    /// Summed pull on the local body from everyone holding it.
    pub fn held_force(
        &mut self,
        body: Vec2,
        local: &ParticipantId,
        ghosts: &GhostManager,
    ) -> Vec2 {
        let holders: Vec<(ParticipantId, Vec2)> = ghosts
            .holders_of(local)
            .map(|(id, p)| (id.clone(), p))
            .collect();
        self.shrugged_off
            .retain(|id| holders.iter().any(|(h, _)| h == id));
        holders
            .iter()
            .filter(|(id, _)| !self.shrugged_off.contains(id))
            .fold(Vec2::ZERO, |acc, (_, p)| {
                acc + drag_force(body, *p, &self.tuning)
            })
    }

    /// Number of participants currently holding the local one, including shrugged-off ones.
    pub fn holder_count(&self, local: &ParticipantId, ghosts: &GhostManager) -> usize {
        ghosts.holders_of(local).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::CharacterModel;
    use playground_shared::config::{CharacterKind, GhostTuning, ProxyMode};
    use playground_shared::rapier_world::RapierPhysics;
    use playground_shared::store::{ParticipantRecord, PresenceSnapshot};

    fn pid(s: &str) -> ParticipantId {
        ParticipantId::new(s)
    }

    fn ghosts_with(records: Vec<(&str, ParticipantRecord)>) -> GhostManager {
        let tuning = GhostTuning {
            proxy: Some(ProxyMode::None),
            ..GhostTuning::default()
        };
        let mut ghosts = GhostManager::new(CharacterModel::for_kind(CharacterKind::Blob), tuning);
        let mut snap = PresenceSnapshot::empty();
        for (id, rec) in records {
            snap.participants.insert(pid(id), rec);
        }
        let mut physics = RapierPhysics::new(Vec2::ZERO);
        ghosts.reconcile(&snap, &pid("me"), &mut physics);
        ghosts
    }

    fn at(x: f32, y: f32) -> ParticipantRecord {
        ParticipantRecord::new("r", "#fff", Vec2::new(x, y))
    }

    #[test]
    fn drag_force_is_capped_and_has_dead_zone() {
        let t = GrabTuning::default();
        assert_eq!(drag_force(Vec2::ZERO, Vec2::new(4.0, 0.0), &t), Vec2::ZERO);
        assert_eq!(
            drag_force(Vec2::ZERO, Vec2::new(10.0, 0.0), &t),
            Vec2::new(40.0, 0.0)
        );
        let far = drag_force(Vec2::ZERO, Vec2::new(0.0, -500.0), &t);
        assert!((far.len() - t.max_force).abs() < 1e-3);
        assert!(far.y < 0.0);
    }

    #[test]
    fn acquire_only_strictly_within_reach() {
        let ghosts = ghosts_with(vec![("b", at(44.0, 0.0))]);
        let mut grab = GrabController::new(GrabTuning::default());
        assert!(matches!(
            grab.on_interact(Vec2::ZERO, &pid("me"), &ghosts),
            Some(GameEvent::GrabAcquired { .. })
        ));
        assert_eq!(grab.target(), Some(&pid("b")));

        let ghosts = ghosts_with(vec![("b", at(45.0, 0.0))]);
        let mut grab = GrabController::new(GrabTuning::default());
        assert!(grab.on_interact(Vec2::ZERO, &pid("me"), &ghosts).is_none());
        assert_eq!(grab.state(), &GrabState::Idle);
    }

    #[test]
    fn second_interact_releases() {
        let ghosts = ghosts_with(vec![("b", at(10.0, 0.0))]);
        let mut grab = GrabController::new(GrabTuning::default());
        grab.on_interact(Vec2::ZERO, &pid("me"), &ghosts);
        assert_eq!(
            grab.on_interact(Vec2::ZERO, &pid("me"), &ghosts),
            Some(GameEvent::GrabReleased {
                target: pid("b"),
                reason: ReleaseReason::Interact
            })
        );
        assert!(!grab.is_holding());
    }

    #[test]
    fn break_distance_releases() {
        let ghosts = ghosts_with(vec![("b", at(10.0, 0.0))]);
        let mut grab = GrabController::new(GrabTuning::default());
        grab.on_interact(Vec2::ZERO, &pid("me"), &ghosts);
        assert!(grab.check_break(Vec2::new(-60.0, 0.0), &ghosts).is_none());
        assert!(matches!(
            grab.check_break(Vec2::new(-71.0, 0.0), &ghosts),
            Some(GameEvent::GrabReleased {
                reason: ReleaseReason::BrokeDistance,
                ..
            })
        ));
    }

    #[test]
    fn held_force_pulls_toward_hold_point() {
        let mut holder = at(100.0, 0.0);
        holder.grab = Some(pid("me"));
        holder.gx = Some(60.0);
        holder.gy = Some(0.0);
        // Claims the grab but publishes no hold point: ignored.
        let mut half = at(-100.0, 0.0);
        half.grab = Some(pid("me"));
        let ghosts = ghosts_with(vec![("h", holder), ("x", half)]);

        let mut grab = GrabController::new(GrabTuning::default());
        let f = grab.held_force(Vec2::ZERO, &pid("me"), &ghosts);
        assert_eq!(f, Vec2::new(120.0, 0.0));
        assert_eq!(grab.holder_count(&pid("me"), &ghosts), 1);
    }

    #[test]
    fn self_release_is_off_by_default() {
        let mut holder = at(100.0, 0.0);
        holder.grab = Some(pid("me"));
        holder.gx = Some(60.0);
        holder.gy = Some(0.0);
        let ghosts = ghosts_with(vec![("h", holder)]);

        let mut grab = GrabController::new(GrabTuning::default());
        assert!(grab.on_interact(Vec2::ZERO, &pid("me"), &ghosts).is_none());
        assert_ne!(grab.held_force(Vec2::ZERO, &pid("me"), &ghosts), Vec2::ZERO);

        let mut grab = GrabController::new(GrabTuning {
            allow_self_release: true,
            ..GrabTuning::default()
        });
        assert!(matches!(
            grab.on_interact(Vec2::ZERO, &pid("me"), &ghosts),
            Some(GameEvent::GrabReleased {
                reason: ReleaseReason::SelfRelease,
                ..
            })
        ));
        assert_eq!(grab.held_force(Vec2::ZERO, &pid("me"), &ghosts), Vec2::ZERO);
    }
}
