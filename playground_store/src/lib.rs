//! `playground_store`
//!
//! Presence store for the playground:
//! - One record per participant, written only by its own connection
//! - Full-collection pushes to every subscriber
//! - Armed records deleted when their connection drops
//! - Resource field with first-writer-wins claims and a respawn janitor
//!
//! Transport is the framed TCP protocol from `playground_shared::net`.

pub mod server;

pub use server::{StoreHandle, StoreServer};
