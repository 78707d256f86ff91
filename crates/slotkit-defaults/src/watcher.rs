use tokio::sync::watch;

use crate::observation::ObservationToken;

/// The latest value of one slot, as an async stream.
///
/// Created by [`Defaults::watch`](crate::Defaults::watch). Holds its own
/// observation; dropping the watcher stops it.
pub struct ValueWatcher<T> {
    receiver: watch::Receiver<Option<T>>,
    token: ObservationToken,
}

impl<T: Clone> ValueWatcher<T> {
    pub(crate) fn new(receiver: watch::Receiver<Option<T>>, token: ObservationToken) -> Self {
        Self { receiver, token }
    }

    /// The most recently observed value, without waiting.
    pub fn current(&self) -> Option<T> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change and return the new value.
    ///
    /// Returns `None` once the watcher has been [`stop`](Self::stop)ped or its
    /// store has gone away. Changes that happen faster than they are consumed
    /// are coalesced into the latest one.
    pub async fn changed(&mut self) -> Option<Option<T>> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Stop observing. Pending and future [`changed`](Self::changed) calls
    /// return `None`.
    pub fn stop(&self) {
        self.token.invalidate();
    }

    pub fn is_active(&self) -> bool {
        self.token.is_valid()
    }
}

impl<T> std::fmt::Debug for ValueWatcher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueWatcher")
            .field("token", &self.token)
            .finish()
    }
}

/// Change signal for a group of slots, as an async stream.
///
/// Created by [`Defaults::watch_keys`](crate::Defaults::watch_keys). It
/// carries no values; read the slots back through the usual accessors once a
/// change is signalled.
pub struct KeysWatcher {
    receiver: watch::Receiver<()>,
    token: ObservationToken,
}

impl KeysWatcher {
    pub(crate) fn new(receiver: watch::Receiver<()>, token: ObservationToken) -> Self {
        Self { receiver, token }
    }

    /// Wait until any of the slots changes.
    ///
    /// Returns `false` once the watcher has been stopped or its store has
    /// gone away. Changes that arrive between two calls are reported once.
    pub async fn changed(&mut self) -> bool {
        self.receiver.changed().await.is_ok()
    }

    pub fn stop(&self) {
        self.token.invalidate();
    }

    pub fn is_active(&self) -> bool {
        self.token.is_valid()
    }

    /// Slot names this watcher follows.
    pub fn names(&self) -> &[String] {
        self.token.names()
    }
}

impl std::fmt::Debug for KeysWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeysWatcher")
            .field("token", &self.token)
            .finish()
    }
}
