//! Refresh/retry signals

use tokio::sync::oneshot;

/// Level-triggered refresh signal. While `refresh_requested` is raised no
/// second refresh is started, however many failures arrive.
#[derive(Debug, Default)]
pub(crate) struct RefreshCoordinator {
    refresh_requested: bool,
    retry_requested: bool,
    /// Bumped on every reset. A refresh started under an older epoch has
    /// been abandoned and must not touch the session.
    epoch: u64,
    /// Told whether the pending refresh succeeded
    listeners: Vec<oneshot::Sender<bool>>,
}

impl RefreshCoordinator {
    /// Raise the signal. Returns `true` when it was low, meaning the caller
    /// must start the refresh.
    pub fn raise_refresh(&mut self) -> bool {
        if self.refresh_requested {
            return false;
        }
        self.refresh_requested = true;
        true
    }

    pub const fn is_refresh_requested(&self) -> bool {
        self.refresh_requested
    }

    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether a refresh started under `epoch` may still apply its result
    pub const fn is_current(&self, epoch: u64) -> bool {
        self.refresh_requested && self.epoch == epoch
    }

    pub fn add_listener(&mut self, listener: oneshot::Sender<bool>) {
        self.listeners.push(listener);
    }

    /// Lower the refresh signal and raise the retry signal
    pub fn refresh_succeeded(&mut self) -> Vec<oneshot::Sender<bool>> {
        self.refresh_requested = false;
        self.retry_requested = true;
        std::mem::take(&mut self.listeners)
    }

    pub fn take_retry(&mut self) -> bool {
        std::mem::take(&mut self.retry_requested)
    }

    /// Drop both signals, handing back the listeners to be told of failure
    pub fn reset(&mut self) -> Vec<oneshot::Sender<bool>> {
        self.refresh_requested = false;
        self.retry_requested = false;
        self.epoch = self.epoch.wrapping_add(1);
        std::mem::take(&mut self.listeners)
    }
}
