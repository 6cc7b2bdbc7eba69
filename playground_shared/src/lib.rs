//! `playground_shared`
//!
//! Types shared by the playground client and the store.
//!
//! Design goals:
//! - Deterministic where practical: the physics step and clock are driven by
//!   the caller, never by wall time.
//! - Clear separation of concerns (math, physics, world, store, net, resources).
//! - Traits at the seams a host swaps out: `PhysicsBackend` and `SharedState`.
//! - No `unsafe`.

pub mod config;
pub mod event;
pub mod math;
pub mod net;
pub mod physics;
pub mod rapier_world;
pub mod resources;
pub mod store;
pub mod world;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::event::*;
    pub use crate::math::*;
    pub use crate::physics::*;
    pub use crate::rapier_world::RapierPhysics;
    pub use crate::store::*;
    pub use crate::world::*;
}
