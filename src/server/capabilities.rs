//! Capability registry — process-wide capability flags with change
//! listeners.
//!
//! Exactly one registry exists per agent class for the lifetime of the
//! process; [`CapabilityRegistry::for_agent`] returns the shared instance.
//! Capabilities (`streaming`, `pushNotifications`, …) are seeded from
//! configuration and consulted by the request handler before admitting the
//! corresponding methods.
//!
//! Listeners are plain callables invoked synchronously from `set`. Dispatch
//! iterates a snapshot of the listener slice, so a listener may deregister
//! itself (or others) during dispatch; a panicking listener is caught and
//! logged so it cannot break delivery to the rest.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, OnceLock};

use tracing::{debug, error};

/// Capability name for SSE streaming methods.
pub const CAP_STREAMING: &str = "streaming";

/// Capability name for webhook push notifications.
pub const CAP_PUSH_NOTIFICATIONS: &str = "pushNotifications";

/// A capability flag change delivered to listeners.
#[derive(Debug, Clone)]
pub struct CapabilityChange {
    /// Capability name.
    pub name: String,
    /// New value.
    pub enabled: bool,
}

/// Handle for removing a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&CapabilityChange) + Send + Sync>;

struct RegistryState {
    capabilities: HashMap<String, bool>,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener_id: u64,
}

/// Registry of capability flags for one agent class.
pub struct CapabilityRegistry {
    state: Mutex<RegistryState>,
}

static REGISTRIES: OnceLock<Mutex<HashMap<String, Arc<CapabilityRegistry>>>> = OnceLock::new();

impl CapabilityRegistry {
    /// The process-wide registry for the named agent class, created on
    /// first use.
    pub fn for_agent(agent_name: &str) -> Arc<CapabilityRegistry> {
        let registries = REGISTRIES.get_or_init(|| Mutex::new(HashMap::new()));
        let mut map = registries.lock().expect("capability registry map poisoned");
        Arc::clone(
            map.entry(agent_name.to_string())
                .or_insert_with(|| Arc::new(CapabilityRegistry::new())),
        )
    }

    /// A standalone registry, not shared process-wide. Used in tests and by
    /// embedders that manage their own lifetimes.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState {
                capabilities: HashMap::new(),
                listeners: Vec::new(),
                next_listener_id: 0,
            }),
        }
    }

    /// Current value of a capability; unknown names read as disabled.
    pub fn get(&self, name: &str) -> bool {
        let state = self.state.lock().expect("capability registry poisoned");
        state.capabilities.get(name).copied().unwrap_or(false)
    }

    /// Set a capability, notifying listeners when the value changes.
    pub fn set(&self, name: &str, enabled: bool) {
        let snapshot: Vec<(ListenerId, Listener)> = {
            let mut state = self.state.lock().expect("capability registry poisoned");
            let previous = state.capabilities.insert(name.to_string(), enabled);
            if previous == Some(enabled) {
                return;
            }
            state.listeners.clone()
        };

        debug!(capability = %name, enabled, "Capability changed");
        let change = CapabilityChange {
            name: name.to_string(),
            enabled,
        };
        for (id, listener) in snapshot {
            // One faulty listener must not break delivery to the rest.
            if catch_unwind(AssertUnwindSafe(|| listener(&change))).is_err() {
                error!(listener = ?id, capability = %change.name, "Capability listener panicked");
            }
        }
    }

    /// Register a change listener; returns a handle for removal.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&CapabilityChange) + Send + Sync + 'static,
    {
        let mut state = self.state.lock().expect("capability registry poisoned");
        let id = ListenerId(state.next_listener_id);
        state.next_listener_id += 1;
        state.listeners.push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Unknown ids are ignored.
    pub fn remove_listener(&self, id: ListenerId) {
        let mut state = self.state.lock().expect("capability registry poisoned");
        state.listeners.retain(|(lid, _)| *lid != id);
    }

    /// Seed the standard capability flags from configuration.
    pub fn seed_from_config(&self, config: &crate::config::ServerConfig) {
        self.set(CAP_STREAMING, config.streaming_enabled);
        self.set(CAP_PUSH_NOTIFICATIONS, config.push_notifications_enabled);
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn unknown_capability_reads_disabled() {
        let registry = CapabilityRegistry::new();
        assert!(!registry.get("streaming"));
    }

    #[test]
    fn listeners_observe_changes_but_not_no_ops() {
        let registry = CapabilityRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        registry.add_listener(move |change| {
            assert_eq!(change.name, "streaming");
            hits2.fetch_add(1, Ordering::SeqCst);
        });

        registry.set("streaming", true);
        registry.set("streaming", true); // unchanged, no notification
        registry.set("streaming", false);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn removed_listener_is_not_notified() {
        let registry = CapabilityRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        let id = registry.add_listener(move |_| {
            hits2.fetch_add(1, Ordering::SeqCst);
        });
        registry.remove_listener(id);
        registry.set("streaming", true);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panicking_listener_does_not_break_dispatch() {
        let registry = CapabilityRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        registry.add_listener(|_| panic!("listener bug"));
        registry.add_listener(move |_| {
            hits2.fetch_add(1, Ordering::SeqCst);
        });

        registry.set("pushNotifications", true);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(registry.get("pushNotifications"));
    }

    #[test]
    fn listener_may_deregister_itself_during_dispatch() {
        let registry = Arc::new(CapabilityRegistry::new());
        let registry2 = Arc::clone(&registry);
        let slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));
        let slot2 = Arc::clone(&slot);
        let id = registry.add_listener(move |_| {
            if let Some(id) = *slot2.lock().unwrap() {
                registry2.remove_listener(id);
            }
        });
        *slot.lock().unwrap() = Some(id);

        registry.set("streaming", true);
        // A second change no longer reaches the removed listener (and must
        // not deadlock).
        registry.set("streaming", false);
    }

    #[test]
    fn for_agent_returns_one_registry_per_class() {
        let a = CapabilityRegistry::for_agent("class-a-test");
        let b = CapabilityRegistry::for_agent("class-a-test");
        let other = CapabilityRegistry::for_agent("class-b-test");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &other));
    }

    #[test]
    fn seed_from_config_sets_standard_flags() {
        let registry = CapabilityRegistry::new();
        let config = crate::config::ServerConfig {
            streaming_enabled: true,
            push_notifications_enabled: false,
            ..Default::default()
        };
        registry.seed_from_config(&config);
        assert!(registry.get(CAP_STREAMING));
        assert!(!registry.get(CAP_PUSH_NOTIFICATIONS));
    }
}
