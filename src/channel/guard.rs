//! Connection guard: the single slot holding the current connection
//!
//! The lock only ever covers pointer and flag updates. Closing a superseded
//! handle is the caller's job and always happens after the lock is released.

use crate::transport::{ConnectionHandle, ConnectionId};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;

#[derive(Default)]
struct GuardState {
    current: Option<ConnectionHandle>,
    cancel: bool,
}

/// At most one current connection plus the cancellation flag
#[derive(Default)]
pub struct ConnectionGuard {
    state: Mutex<GuardState>,
    cancelled: Notify,
}

impl ConnectionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GuardState> {
        // Only plain assignments happen under this lock, so a poisoned state is still consistent
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Install `handle` as current and return the one it replaces
    pub fn install_and_supersede(&self, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        self.lock().current.replace(handle)
    }

    /// Install `handle` unless cancellation was requested in the meantime
    ///
    /// On success returns the superseded handle, if any. When cancelled the
    /// fresh handle is handed back untouched so the caller can close it.
    pub fn install_unless_cancelled(
        &self,
        handle: ConnectionHandle,
    ) -> Result<Option<ConnectionHandle>, ConnectionHandle> {
        let mut state = self.lock();
        if state.cancel {
            return Err(handle);
        }
        Ok(state.current.replace(handle))
    }

    /// The current handle, whatever its state
    pub fn current(&self) -> Option<ConnectionHandle> {
        self.lock().current.clone()
    }

    /// The current handle only if its transport reports it open
    pub fn current_if_open(&self) -> Option<ConnectionHandle> {
        self.lock()
            .current
            .as_ref()
            .filter(|handle| handle.is_open())
            .cloned()
    }

    /// True when `id` is the current handle
    pub fn is_current(&self, id: ConnectionId) -> bool {
        self.lock()
            .current
            .as_ref()
            .map(|handle| handle.id() == id)
            .unwrap_or(false)
    }

    /// Staleness and cancellation check for a close-triggered reconnect
    pub fn should_reconnect(&self, id: ConnectionId) -> bool {
        let state = self.lock();
        !state.cancel
            && state
                .current
                .as_ref()
                .map(|handle| handle.id() == id)
                .unwrap_or(false)
    }

    /// Remove the current handle
    pub fn clear(&self) -> Option<ConnectionHandle> {
        self.lock().current.take()
    }

    /// Stop in-flight and future automatic reconnects
    pub fn request_cancel(&self) {
        self.lock().cancel = true;
        self.cancelled.notify_waiters();
    }

    /// Re-arm automatic reconnects for a fresh connect
    pub fn reset(&self) {
        self.lock().cancel = false;
    }

    pub fn is_cancelled(&self) -> bool {
        self.lock().cancel
    }

    /// Sleep for `duration`, waking early on cancellation
    ///
    /// Returns false when cancellation was observed.
    pub async fn sleep_unless_cancelled(&self, duration: std::time::Duration) -> bool {
        let notified = self.cancelled.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if self.is_cancelled() {
            return false;
        }

        tokio::select! {
            _ = &mut notified => false,
            _ = tokio::time::sleep(duration) => !self.is_cancelled(),
        }
    }
}

impl std::fmt::Debug for ConnectionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("ConnectionGuard")
            .field("current", &state.current.as_ref().map(|handle| handle.id()))
            .field("cancel", &state.cancel)
            .finish()
    }
}
