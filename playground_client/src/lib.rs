//! `playground_client`
//!
//! Client-side systems:
//! - Local body control and character poses
//! - Remote ghost interpolation and proxy bodies
//! - The grab protocol
//! - Presence sequencing and rate-limited publishing
//! - A TCP client for the store server

pub mod body;
pub mod character;
pub mod client;
pub mod grab;
pub mod input;
pub mod interp;
pub mod presence;
pub mod remote;
pub mod sync;

pub use client::{Session, TickReport};
pub use remote::RemoteStore;
