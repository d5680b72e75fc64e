//! Configuration listener registry - Tracks listeners interested in configuration changes
//! and notifies them with the previous and the new document.

use std::fmt;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

/// Listener invoked with `(previous, next)` after a configuration swap
pub type ConfigListener<C> = Arc<dyn Fn(&C, &C) + Send + Sync>;

/// Handle returned by [`ListenerRegistry::add`], used to unregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Listeners are kept in registration order.
pub struct ListenerRegistry<C> {
    listeners: RwLock<Vec<(ListenerId, ConfigListener<C>)>>,
}

impl<C> ListenerRegistry<C> {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Register a listener
    pub async fn add<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&C, &C) + Send + Sync + 'static,
    {
        self.register(Arc::new(listener)).await
    }

    /// Register an already shared listener
    pub async fn register(&self, listener: ConfigListener<C>) -> ListenerId {
        let id = ListenerId::new();
        self.listeners.write().await.push((id, listener));
        id
    }

    /// Unregister a listener, returning whether it was registered
    pub async fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().await;
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Invoke every listener on the calling task.
    ///
    /// The list is snapshotted first, so a listener may register or unregister
    /// listeners without deadlocking. A panicking listener propagates to the caller.
    pub async fn notify(&self, previous: &C, next: &C) {
        let snapshot: Vec<ConfigListener<C>> = self
            .listeners
            .read()
            .await
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in snapshot {
            listener(previous, next);
        }
    }

    pub async fn len(&self) -> usize {
        self.listeners.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.listeners.read().await.is_empty()
    }
}

impl<C> Default for ListenerRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}
