//! Presence sequencing.
//!
//! Joining the store is two writes that must happen in order: arm the
//! store-side removal of our key, then write the initial record. Doing it the
//! other way round leaves a window where a dropped connection leaks a record
//! nobody will ever delete. The sequence reruns on every connectivity
//! false -> true edge, since a new connection starts unarmed.

use playground_shared::store::{ParticipantRecord, SharedState};
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug)]
pub struct Presence {
    connectivity: watch::Receiver<bool>,
    online: bool,
    joins: u32,
}

impl Presence {
    pub fn new<S: SharedState + ?Sized>(store: &S) -> Self {
        Self {
            connectivity: store.connectivity(),
            online: false,
            joins: 0,
        }
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    /// How many times presence has been established.
    pub fn joins(&self) -> u32 {
        self.joins
    }

    /// Follows the connectivity signal; on a rising edge arms the removal
    /// hook and writes `initial()`. Returns true when it joined.
    pub fn poll<S, F>(&mut self, store: &S, initial: F) -> bool
    where
        S: SharedState + ?Sized,
        F: FnOnce() -> ParticipantRecord,
    {
        match self.connectivity.has_changed() {
            Ok(true) => {}
            Ok(false) => return false,
            Err(_) => {
                if self.online {
                    warn!(participant = %store.local_id(), "connectivity signal closed");
                }
                self.online = false;
                return false;
            }
        }
        let up = *self.connectivity.borrow_and_update();
        if !up {
            if self.online {
                info!(participant = %store.local_id(), "store connection lost");
            }
            self.online = false;
            return false;
        }
        // Any notification carrying `true` follows a down edge, possibly
        // coalesced, so the new connection must be armed again.
        store.register_removal_on_disconnect();
        store.write_own(initial());
        self.online = true;
        self.joins += 1;
        info!(participant = %store.local_id(), joins = self.joins, "presence established");
        true
    }
}
