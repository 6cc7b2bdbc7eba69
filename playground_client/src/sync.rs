//! Outbound sync.
//!
//! The local record is published at most once per `min_interval`. Each
//! publish is a full overwrite of the record, quantized to keep it small:
//! positions to whole units, angles to two decimal digits. There is no delta
//! compression, acknowledgement or resend.

use std::time::Duration;

use playground_shared::{
    config::SyncTuning,
    math::{round_to, Vec2},
    store::{Limb, ParticipantId, ParticipantRecord},
};

use crate::character::Pose;

/// Rate limiter for publishes, driven by the session clock.
#[derive(Debug, Clone)]
pub struct SyncScheduler {
    min_interval: Duration,
    last_publish: Option<Duration>,
}

impl SyncScheduler {
    pub fn new(tuning: &SyncTuning) -> Self {
        Self {
            min_interval: Duration::from_millis(tuning.min_interval_ms),
            last_publish: None,
        }
    }

    pub fn is_due(&self, now: Duration) -> bool {
        match self.last_publish {
            None => true,
            Some(last) => now.saturating_sub(last) >= self.min_interval,
        }
    }

    /// Returns true and records `now` when a publish is due.
    pub fn poll(&mut self, now: Duration) -> bool {
        if self.is_due(now) {
            self.last_publish = Some(now);
            true
        } else {
            false
        }
    }

    /// Makes the next poll publish immediately.
    pub fn reset(&mut self) {
        self.last_publish = None;
    }
}

fn whole(p: Vec2) -> Vec2 {
    p.round()
}

/// Builds the quantized record for publishing. `grab` is the held target and
/// the hold point, present only while holding.
pub fn build_record(
    name: &str,
    color: &str,
    pose: &Pose,
    grab: Option<(&ParticipantId, Vec2)>,
) -> ParticipantRecord {
    let mut record = ParticipantRecord::new(name, color, whole(pose.position));
    for limb in Limb::ALL {
        record.set_limb(limb, pose.limb(limb).map(whole));
    }
    record.ha = pose.heading.map(|a| round_to(a, 2));
    if let Some((target, hold)) = grab {
        let hold = whole(hold);
        record.grab = Some(target.clone());
        record.gx = Some(hold.x);
        record.gy = Some(hold.y);
    }
    record
}
