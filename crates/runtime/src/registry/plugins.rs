//! Subsystem registration and lifecycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::info;

use crate::api::Subsystem;

use super::{RegistryError, Result};

/// Lifecycle of a subsystem registration.
///
/// `Registered → Enabled ⇄ Disabled → Unregistered`; only enabled
/// subsystems are handed to resolution passes, and `Unregistered` is
/// terminal for the registration record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Registered,
    Enabled,
    Disabled,
    Unregistered,
}

struct Registration {
    subsystem: Arc<dyn Subsystem>,
    state: LifecycleState,
    /// Registration order, the stable tiebreak within equal priorities
    seq: u64,
}

/// Tracks contributing subsystems and their lifecycle.
///
/// Mutations rebuild an `ArcSwap` snapshot of the enabled subsystems, so a
/// resolution pass that already loaded the list keeps it unchanged while
/// registrations come and go concurrently.
pub struct PluginRegistry {
    inner: Mutex<HashMap<String, Registration>>,
    active: ArcSwap<Vec<Arc<dyn Subsystem>>>,
    next_seq: AtomicU64,
    registered_total: AtomicU64,
    unregistered_total: AtomicU64,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            active: ArcSwap::from_pointee(Vec::new()),
            next_seq: AtomicU64::new(0),
            registered_total: AtomicU64::new(0),
            unregistered_total: AtomicU64::new(0),
        }
    }

    /// Register a subsystem in the `Registered` state; it contributes only
    /// once enabled.
    pub fn register(&self, subsystem: Arc<dyn Subsystem>) -> Result<()> {
        let system_id = subsystem.system_id().to_string();
        if system_id.is_empty() {
            return Err(RegistryError::EmptySystemId);
        }

        let mut inner = self.inner.lock();
        if inner.contains_key(&system_id) {
            return Err(RegistryError::DuplicateSystem(system_id));
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        inner.insert(
            system_id.clone(),
            Registration {
                subsystem,
                state: LifecycleState::Registered,
                seq,
            },
        );
        self.registered_total.fetch_add(1, Ordering::Relaxed);
        drop(inner);

        info!(system = %system_id, "registered subsystem");
        Ok(())
    }

    /// Register and immediately enable a subsystem.
    pub fn register_enabled(&self, subsystem: Arc<dyn Subsystem>) -> Result<()> {
        let system_id = subsystem.system_id().to_string();
        self.register(subsystem)?;
        self.enable(&system_id)
    }

    /// Enable a registered or disabled subsystem. Visible to passes
    /// starting after the call.
    pub fn enable(&self, system_id: &str) -> Result<()> {
        self.transition(system_id, LifecycleState::Enabled)
    }

    /// Disable an enabled subsystem without unregistering it.
    pub fn disable(&self, system_id: &str) -> Result<()> {
        self.transition(system_id, LifecycleState::Disabled)
    }

    /// Remove a subsystem registration. Terminal for the record; the same
    /// id may register again later as a fresh record.
    pub fn unregister(&self, system_id: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.remove(system_id).is_none() {
            return Err(RegistryError::UnknownSystem(system_id.to_string()));
        }
        self.unregistered_total.fetch_add(1, Ordering::Relaxed);
        self.rebuild(&inner);
        drop(inner);

        info!(system = %system_id, "unregistered subsystem");
        Ok(())
    }

    /// The enabled subsystems, stably sorted by (priority descending,
    /// registration order). This is the copy-on-write snapshot a pass takes
    /// at its outset.
    pub fn get_by_priority(&self) -> Arc<Vec<Arc<dyn Subsystem>>> {
        self.active.load_full()
    }

    pub fn is_registered(&self, system_id: &str) -> bool {
        self.inner.lock().contains_key(system_id)
    }

    /// Lifecycle state of a registration, if present.
    pub fn state(&self, system_id: &str) -> Option<LifecycleState> {
        self.inner.lock().get(system_id).map(|r| r.state)
    }

    /// Number of live registrations (any state).
    pub fn count(&self) -> usize {
        self.inner.lock().len()
    }

    /// Total registrations and removals over the registry's lifetime.
    pub fn lifetime_counts(&self) -> (u64, u64) {
        (
            self.registered_total.load(Ordering::Relaxed),
            self.unregistered_total.load(Ordering::Relaxed),
        )
    }

    fn transition(&self, system_id: &str, to: LifecycleState) -> Result<()> {
        let mut inner = self.inner.lock();
        let registration = inner
            .get_mut(system_id)
            .ok_or_else(|| RegistryError::UnknownSystem(system_id.to_string()))?;

        let from = registration.state;
        let legal = matches!(
            (from, to),
            (LifecycleState::Registered, LifecycleState::Enabled)
                | (LifecycleState::Disabled, LifecycleState::Enabled)
                | (LifecycleState::Enabled, LifecycleState::Disabled)
        );
        if !legal {
            return Err(RegistryError::InvalidTransition {
                system: system_id.to_string(),
                from,
                to,
            });
        }

        registration.state = to;
        self.rebuild(&inner);
        Ok(())
    }

    /// Rebuild the active snapshot from the enabled registrations.
    fn rebuild(&self, inner: &HashMap<String, Registration>) {
        let mut enabled: Vec<(&Registration, Arc<dyn Subsystem>)> = inner
            .values()
            .filter(|r| r.state == LifecycleState::Enabled)
            .map(|r| (r, Arc::clone(&r.subsystem)))
            .collect();
        enabled.sort_by(|(a, _), (b, _)| {
            b.subsystem
                .priority()
                .cmp(&a.subsystem.priority())
                .then_with(|| a.seq.cmp(&b.seq))
        });
        self.active
            .store(Arc::new(enabled.into_iter().map(|(_, s)| s).collect()));
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}
