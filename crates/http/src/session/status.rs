//! Observable authentication status

use ehr_console_core::AuthenticationStatus;
use tokio::sync::watch;

/// Holds the current [`AuthenticationStatus`]. Writes that do not change
/// the value are not seen by subscribers.
#[derive(Debug)]
pub(crate) struct StatusProjector {
    tx: watch::Sender<AuthenticationStatus>,
}

impl StatusProjector {
    pub fn new() -> Self {
        Self {
            tx: watch::Sender::new(AuthenticationStatus::Loading),
        }
    }

    pub fn current(&self) -> AuthenticationStatus {
        *self.tx.borrow()
    }

    /// Returns whether the status changed
    pub fn set(&self, status: AuthenticationStatus) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthenticationStatus> {
        self.tx.subscribe()
    }
}
