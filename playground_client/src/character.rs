//! Character models.
//!
//! Every variant is the same networked entity: one physics body plus a set of
//! kinematic limbs, an anchor point that grabs, and an optional heading. A
//! [`CharacterModel`] is picked once from [`CharacterKind`] and drives both
//! the local pose and the fallback layout of remote records.

use playground_shared::{
    config::{CharacterKind, ProxyMode},
    math::{wrap_angle, Vec2},
    store::{Limb, ParticipantRecord},
};

/// Bird head base, relative to the body.
const BIRD_HEAD_OFFSET: Vec2 = Vec2::new(0.0, -22.0);
/// Ragdoll rest layout, relative to the torso.
const RAGDOLL_HEAD_OFFSET: Vec2 = Vec2::new(0.0, -24.0);
const RAGDOLL_ARM_OFFSET: Vec2 = Vec2::new(25.0, 0.0);
const RAGDOLL_LEG_OFFSET: Vec2 = Vec2::new(0.0, 25.0);
/// Leg target while walking: sideways swing and drop below the body.
const LEG_SWING: f32 = 12.0;
const LEG_DROP: f32 = 28.0;

/// Display or published pose of one participant.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    pub position: Vec2,
    pub head: Option<Vec2>,
    pub arm: Option<Vec2>,
    pub leg: Option<Vec2>,
    /// Head or beak angle in radians.
    pub heading: Option<f32>,
}

impl Pose {
    pub fn at(position: Vec2) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn limb(&self, limb: Limb) -> Option<Vec2> {
        match limb {
            Limb::Head => self.head,
            Limb::Arm => self.arm,
            Limb::Leg => self.leg,
        }
    }

    pub fn set_limb(&mut self, limb: Limb, p: Option<Vec2>) {
        match limb {
            Limb::Head => self.head = p,
            Limb::Arm => self.arm = p,
            Limb::Leg => self.leg = p,
        }
    }
}

/// Which point of the character grabs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Anchor {
    BodyCentre,
    /// The arm's hand, reaching toward the aim point up to `extent`.
    Hand { extent: f32 },
    /// Tip of the beak in front of the head.
    Beak { head_radius: f32, beak_len: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// No heading is simulated or published.
    Fixed,
    /// Heading follows the aim point, dragged back toward a held target.
    TowardAim,
}

/// A limb the model carries and where it rests relative to the body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimbSlot {
    pub limb: Limb,
    pub rest: Vec2,
}

/// Per-tick inputs to pose computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseInput {
    pub body: Vec2,
    pub aim: Vec2,
    pub move_axis: f32,
    /// Display position of the participant being held, if any.
    pub held_target: Option<Vec2>,
}

/// Capability set of one character variant.
#[derive(Debug, Clone, PartialEq)]
pub struct CharacterModel {
    pub kind: CharacterKind,
    pub limbs: Vec<LimbSlot>,
    pub anchor: Anchor,
    pub orientation: Orientation,
    pub default_proxy: ProxyMode,
}

impl CharacterModel {
    pub fn for_kind(kind: CharacterKind) -> Self {
        let slot = |limb, rest| LimbSlot { limb, rest };
        match kind {
            CharacterKind::Ragdoll => Self {
                kind,
                limbs: vec![
                    slot(Limb::Head, RAGDOLL_HEAD_OFFSET),
                    slot(Limb::Arm, RAGDOLL_ARM_OFFSET),
                    slot(Limb::Leg, RAGDOLL_LEG_OFFSET),
                ],
                anchor: Anchor::Hand { extent: 30.0 },
                orientation: Orientation::Fixed,
                default_proxy: ProxyMode::Spring,
            },
            CharacterKind::Blob => Self {
                kind,
                limbs: Vec::new(),
                anchor: Anchor::BodyCentre,
                orientation: Orientation::Fixed,
                default_proxy: ProxyMode::Kinematic,
            },
            CharacterKind::ArmReach | CharacterKind::SpringPull => Self {
                kind,
                limbs: vec![slot(Limb::Arm, RAGDOLL_ARM_OFFSET)],
                anchor: Anchor::Hand { extent: 80.0 },
                orientation: Orientation::Fixed,
                default_proxy: if kind == CharacterKind::SpringPull {
                    ProxyMode::Spring
                } else {
                    ProxyMode::Kinematic
                },
            },
            CharacterKind::Bird => Self {
                kind,
                limbs: vec![slot(Limb::Head, BIRD_HEAD_OFFSET)],
                anchor: Anchor::Beak {
                    head_radius: 9.0,
                    beak_len: 10.0,
                },
                orientation: Orientation::TowardAim,
                default_proxy: ProxyMode::Spring,
            },
        }
    }

    pub fn rest_offset(&self, limb: Limb) -> Option<Vec2> {
        self.limbs.iter().find(|s| s.limb == limb).map(|s| s.rest)
    }

    /// Local pose derived kinematically from body, aim and movement.
    pub fn pose(&self, input: &PoseInput) -> Pose {
        let body = input.body;
        let mut pose = Pose::at(body);
        for slot in &self.limbs {
            let p = match slot.limb {
                Limb::Head => self.head_position(body, slot.rest, input.held_target),
                Limb::Arm => match self.anchor {
                    Anchor::Hand { extent } => body + (input.aim - body).clamp_len(extent),
                    _ => body + slot.rest,
                },
                Limb::Leg => body + Vec2::new(input.move_axis * LEG_SWING, LEG_DROP),
            };
            pose.set_limb(slot.limb, Some(p));
        }
        if self.orientation == Orientation::TowardAim {
            pose.heading = Some(self.heading(body, input.aim, input.held_target));
        }
        pose
    }

    fn head_position(&self, body: Vec2, rest: Vec2, held: Option<Vec2>) -> Vec2 {
        let base = body + rest;
        if self.orientation != Orientation::TowardAim {
            return base;
        }
        // The held weight drags the head, at most 8 units off its base.
        let Some(target) = held else { return base };
        let delta = target - base;
        let d = delta.len();
        if d <= 1.0 {
            return base;
        }
        base + delta * ((d * 0.04).min(8.0) / d)
    }

    fn heading(&self, body: Vec2, aim: Vec2, held: Option<Vec2>) -> f32 {
        let base = body + BIRD_HEAD_OFFSET;
        let desired = (aim - base).angle();
        let Some(target) = held else { return desired };
        let to_target = target - base;
        let pull = ((to_target.len() - 30.0) / 120.0).clamp(0.0, 0.65);
        wrap_angle(desired + wrap_angle(to_target.angle() - desired) * pull)
    }

    /// World-space grab point for a pose computed by this model.
    pub fn anchor_point(&self, pose: &Pose) -> Vec2 {
        match self.anchor {
            Anchor::BodyCentre => pose.position,
            Anchor::Hand { .. } => pose.arm.unwrap_or(pose.position),
            Anchor::Beak {
                head_radius,
                beak_len,
            } => {
                let head = pose.head.unwrap_or(pose.position + BIRD_HEAD_OFFSET);
                let angle = pose.heading.unwrap_or(0.0);
                head + Vec2::from_angle(angle) * (head_radius + beak_len)
            }
        }
    }

    /// Published pose of a remote record; missing limbs rest on the body.
    pub fn pose_from_record(&self, record: &ParticipantRecord) -> Pose {
        let body = record.position();
        let mut pose = Pose::at(body);
        for limb in Limb::ALL {
            let p = record
                .limb(limb)
                .or_else(|| self.rest_offset(limb).map(|rest| body + rest));
            pose.set_limb(limb, p);
        }
        pose.heading = record.ha;
        pose
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn near(a: Vec2, b: Vec2) -> bool {
        a.distance(b) < 1e-3
    }

    fn input(body: Vec2, aim: Vec2) -> PoseInput {
        PoseInput {
            body,
            aim,
            move_axis: 0.0,
            held_target: None,
        }
    }

    #[test]
    fn hand_reaches_toward_aim_up_to_extent() {
        let model = CharacterModel::for_kind(CharacterKind::ArmReach);
        let body = Vec2::new(100.0, 100.0);

        let close = model.pose(&input(body, Vec2::new(130.0, 100.0)));
        assert_eq!(model.anchor_point(&close), Vec2::new(130.0, 100.0));

        let far = model.pose(&input(body, Vec2::new(400.0, 100.0)));
        assert!(near(model.anchor_point(&far), Vec2::new(180.0, 100.0)));
    }

    #[test]
    fn blob_grabs_from_centre() {
        let model = CharacterModel::for_kind(CharacterKind::Blob);
        let pose = model.pose(&input(Vec2::new(5.0, 6.0), Vec2::new(500.0, 0.0)));
        assert_eq!(model.anchor_point(&pose), Vec2::new(5.0, 6.0));
        assert!(pose.arm.is_none());
    }

    #[test]
    fn ragdoll_leg_swings_with_movement() {
        let model = CharacterModel::for_kind(CharacterKind::Ragdoll);
        let mut inp = input(Vec2::ZERO, Vec2::new(10.0, 0.0));
        inp.move_axis = -1.0;
        let pose = model.pose(&inp);
        assert_eq!(pose.leg, Some(Vec2::new(-12.0, 28.0)));
        assert_eq!(pose.head, Some(Vec2::new(0.0, -24.0)));
    }

    #[test]
    fn bird_beak_points_at_aim() {
        let model = CharacterModel::for_kind(CharacterKind::Bird);
        let body = Vec2::new(0.0, 0.0);
        let pose = model.pose(&input(body, Vec2::new(100.0, -22.0)));
        assert!(pose.heading.unwrap().abs() < 1e-5);
        let tip = model.anchor_point(&pose);
        assert!(near(tip, Vec2::new(19.0, -22.0)));
    }

    #[test]
    fn held_weight_drags_bird_heading() {
        let model = CharacterModel::for_kind(CharacterKind::Bird);
        let body = Vec2::ZERO;
        let mut inp = input(body, Vec2::new(100.0, -22.0));
        // Target far below the head: full 0.65 pull toward +PI/2.
        inp.held_target = Some(Vec2::new(0.0, 200.0));
        let pose = model.pose(&inp);
        assert!((pose.heading.unwrap() - 0.65 * PI / 2.0).abs() < 1e-4);
        // Head offset capped at 8 units toward the target.
        assert!(near(pose.head.unwrap(), Vec2::new(0.0, -14.0)));
    }

    #[test]
    fn record_fallback_uses_rest_offsets() {
        let model = CharacterModel::for_kind(CharacterKind::Ragdoll);
        let mut rec = ParticipantRecord::new("r", "#fff", Vec2::new(50.0, 50.0));
        rec.set_limb(Limb::Arm, Some(Vec2::new(70.0, 40.0)));
        let pose = model.pose_from_record(&rec);
        assert_eq!(pose.arm, Some(Vec2::new(70.0, 40.0)));
        assert_eq!(pose.head, Some(Vec2::new(50.0, 26.0)));
        assert_eq!(pose.leg, Some(Vec2::new(50.0, 75.0)));
        assert_eq!(pose.heading, None);
    }
}
