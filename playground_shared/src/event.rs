//! Gameplay events.
//!
//! A small typed event bus plus the events a session emits each tick.
//! - Session: pushes landing, jump, respawn and grab transitions.
//! - Presentation layers: drain them after `tick` for feedback and sound.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
};

use crate::math::Vec2;
use crate::store::ParticipantId;

/// Typed event bus.
#[derive(Default)]
pub struct EventBus {
    queues: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl EventBus {
    /// Pushes an event into the queue.
    pub fn push<E: 'static + Send + Sync>(&mut self, e: E) {
        let q = self
            .queues
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Box::new(Vec::<E>::new()));
        match q.downcast_mut::<Vec<E>>() {
            Some(q) => q.push(e),
            None => *q = Box::new(vec![e]),
        }
    }

    /// Drains all queued events of a type.
    pub fn drain<E: 'static + Send + Sync>(&mut self) -> Vec<E> {
        self.queues
            .remove(&TypeId::of::<E>())
            .and_then(|boxed| boxed.downcast::<Vec<E>>().ok())
            .map(|boxed| *boxed)
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}

/// Why a grab ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseReason {
    /// The interact input was pressed again.
    Interact,
    /// The held participant left the snapshot.
    TargetVanished,
    /// Anchor and target drifted past the break distance.
    BrokeDistance,
    /// The local body fell out of the world.
    Respawn,
    /// Someone grabbed us and we broke free.
    SelfRelease,
}

/// Per-tick feedback from a session.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    /// Grounded again after falling faster than the landing threshold.
    Landed { position: Vec2, impact_speed: f32 },
    Jumped { position: Vec2 },
    Respawned { from: Vec2 },
    GrabAcquired { target: ParticipantId },
    GrabReleased {
        target: ParticipantId,
        reason: ReleaseReason,
    },
    /// A remote participant appeared in the snapshot.
    GhostJoined { id: ParticipantId },
    /// A remote participant left the snapshot.
    GhostLeft { id: ParticipantId },
}
