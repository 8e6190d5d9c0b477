//! Lease bookkeeping and the exclusive-access drain.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::process::kill_logged;
use crate::{AttachedProcess, LockConfig, LockContext, LockError};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One shared lease and the processes serving it.
struct Lease {
    token: CancellationToken,
    processes: Vec<Box<dyn AttachedProcess>>,
}

#[derive(Default)]
struct SlotState {
    leases: HashMap<u64, Lease>,
    /// Set while an exclusive request is draining or running.
    exclusive: bool,
    /// Set once the slot has been removed from the map. Waiters holding a
    /// retired slot must look the path up again.
    retired: bool,
}

impl SlotState {
    fn is_idle(&self) -> bool {
        self.leases.is_empty() && !self.exclusive
    }
}

/// Per-path lock state. Unrelated paths never contend on the same mutex.
#[derive(Default)]
struct Slot {
    state: Mutex<SlotState>,
    changed: Notify,
}

pub(crate) struct Inner {
    slots: Mutex<HashMap<PathBuf, Arc<Slot>>>,
    next_lease: AtomicU64,
    config: LockConfig,
}

impl Inner {
    fn slot_for(&self, path: &Path) -> Arc<Slot> {
        lock(&self.slots)
            .entry(path.to_path_buf())
            .or_default()
            .clone()
    }

    /// Drop `slot` from the map if it is idle. Caller holds the map lock.
    fn retire_if_idle(
        slots: &mut HashMap<PathBuf, Arc<Slot>>,
        path: &Path,
        slot: &Arc<Slot>,
        state: &mut SlotState,
    ) {
        if state.is_idle() && !state.retired {
            state.retired = true;
            if slots.get(path).is_some_and(|s| Arc::ptr_eq(s, slot)) {
                slots.remove(path);
            }
        }
    }

    /// Remove a lease. Returns false if it was already gone.
    pub(crate) fn release(&self, path: &Path, lease: u64) -> bool {
        let mut slots = lock(&self.slots);
        let Some(slot) = slots.get(path).cloned() else {
            return false;
        };
        let removed = {
            let mut state = lock(&slot.state);
            let removed = state.leases.remove(&lease).is_some();
            Self::retire_if_idle(&mut slots, path, &slot, &mut state);
            removed
        };
        drop(slots);
        slot.changed.notify_waiters();
        if removed {
            tracing::debug!(path = %path.display(), lease, "Released read lock");
        }
        removed
    }

    /// Track `process` against a lease. Processes arriving for a lease that
    /// is already revoked or released are killed on the spot.
    pub(crate) fn attach(&self, path: &Path, lease: u64, process: Box<dyn AttachedProcess>) {
        let slot = lock(&self.slots).get(path).cloned();
        let rejected = match slot {
            Some(slot) => {
                let mut state = lock(&slot.state);
                match state.leases.get_mut(&lease) {
                    Some(entry) if !entry.token.is_cancelled() => {
                        entry.processes.push(process);
                        None
                    }
                    _ => Some(process),
                }
            }
            None => Some(process),
        };
        if let Some(mut process) = rejected {
            kill_logged(path, process.as_mut());
        }
    }

    /// Cancel every lease token on the slot. Processes stay with their
    /// lease, so a holder that releases in time takes them along.
    fn revoke(slot: &Slot) -> usize {
        let state = lock(&slot.state);
        for lease in state.leases.values() {
            lease.token.cancel();
        }
        state.leases.len()
    }

    fn take_processes(state: &mut SlotState) -> Vec<Box<dyn AttachedProcess>> {
        state
            .leases
            .values_mut()
            .flat_map(|lease| lease.processes.drain(..))
            .collect()
    }

    /// Wait until the slot holds no leases, or `timeout` passes.
    async fn wait_drained(slot: &Slot, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = slot.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if lock(&slot.state).leases.is_empty() {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return lock(&slot.state).leases.is_empty();
            }
        }
    }
}

/// Clears the exclusive flag when the exclusive section ends, including on
/// panic or when the caller's future is dropped mid-drain.
struct ExclusiveGuard<'a> {
    inner: &'a Inner,
    path: &'a Path,
    slot: Arc<Slot>,
}

impl Drop for ExclusiveGuard<'_> {
    fn drop(&mut self) {
        let mut slots = lock(&self.inner.slots);
        {
            let mut state = lock(&self.slot.state);
            state.exclusive = false;
            Inner::retire_if_idle(&mut slots, self.path, &self.slot, &mut state);
        }
        drop(slots);
        self.slot.changed.notify_waiters();
        tracing::debug!(path = %self.path.display(), "Exclusive access released");
    }
}

/// Shared/exclusive lock manager keyed by file path.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ReadLockManager {
    inner: Arc<Inner>,
}

impl ReadLockManager {
    pub fn new(config: LockConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                slots: Mutex::new(HashMap::new()),
                next_lease: AtomicU64::new(1),
                config,
            }),
        }
    }

    pub fn config(&self) -> &LockConfig {
        &self.inner.config
    }

    /// Acquire a shared lease on `path`.
    ///
    /// Waits while an exclusive request is pending on the path. Fails with
    /// [`LockError::WaitCancelled`] if `ctx` is cancelled first. The lease
    /// is released by [`LockContext::cancel`], by dropping the context, or
    /// when `ctx` is cancelled, whichever comes first.
    pub async fn read_lock(
        &self,
        ctx: &CancellationToken,
        path: impl AsRef<Path>,
    ) -> Result<LockContext, LockError> {
        let path = path.as_ref().to_path_buf();
        loop {
            if ctx.is_cancelled() {
                return Err(LockError::WaitCancelled { path });
            }

            let slot = self.inner.slot_for(&path);
            let notified = slot.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = lock(&slot.state);
                if state.retired {
                    continue;
                }
                if !state.exclusive {
                    let lease = self.inner.next_lease.fetch_add(1, Ordering::Relaxed);
                    let token = ctx.child_token();
                    state.leases.insert(
                        lease,
                        Lease {
                            token: token.clone(),
                            processes: Vec::new(),
                        },
                    );
                    drop(state);
                    tracing::debug!(path = %path.display(), lease, "Granted read lock");
                    return Ok(LockContext::new(
                        self.inner.clone(),
                        path,
                        lease,
                        token,
                        ctx.clone(),
                    ));
                }
            }

            tracing::debug!(path = %path.display(), "Read lock waiting on exclusive access");
            tokio::select! {
                _ = ctx.cancelled() => return Err(LockError::WaitCancelled { path }),
                _ = &mut notified => {}
            }
        }
    }

    /// Run `op` with sole ownership of `path`.
    ///
    /// New shared leases are held back, existing ones are revoked, their
    /// attached processes are killed (after the configured grace period),
    /// and `op` starts once the lease count reaches zero or the drain
    /// timeout evicts the stragglers. Concurrent exclusive requests on the
    /// same path run one after another.
    pub async fn exclusive<F, Fut, T>(&self, path: impl AsRef<Path>, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let path = path.as_ref();
        let slot = self.acquire_exclusive(path).await;
        let _guard = ExclusiveGuard {
            inner: &self.inner,
            path,
            slot: slot.clone(),
        };

        let leases = Inner::revoke(&slot);
        if leases > 0 {
            tracing::info!(
                path = %path.display(),
                leases,
                "Revoking read locks for exclusive access"
            );
        }

        let grace = self.inner.config.kill_grace();
        if !grace.is_zero() && leases > 0 {
            Inner::wait_drained(&slot, grace).await;
        }
        // Only leases still held after the grace period lose their processes.
        let mut processes = Inner::take_processes(&mut lock(&slot.state));
        for process in &mut processes {
            kill_logged(path, process.as_mut());
        }

        if !Inner::wait_drained(&slot, self.inner.config.drain_timeout()).await {
            let mut state = lock(&slot.state);
            tracing::warn!(
                path = %path.display(),
                leases = state.leases.len(),
                "Read locks did not drain in time, evicting"
            );
            state.leases.clear();
        }

        op().await
    }

    async fn acquire_exclusive(&self, path: &Path) -> Arc<Slot> {
        loop {
            let slot = self.inner.slot_for(path);
            let notified = slot.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = lock(&slot.state);
                if state.retired {
                    continue;
                }
                if !state.exclusive {
                    state.exclusive = true;
                    drop(state);
                    return Arc::clone(&slot);
                }
            }
            tracing::debug!(path = %path.display(), "Waiting for pending exclusive access");
            notified.await;
        }
    }

    /// Revoke every lease on `path` and kill their processes without taking
    /// exclusive ownership. New leases may be granted right away.
    pub fn cancel(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let Some(slot) = lock(&self.inner.slots).get(path).cloned() else {
            return;
        };
        let leases = Inner::revoke(&slot);
        let mut processes = Inner::take_processes(&mut lock(&slot.state));
        tracing::info!(path = %path.display(), leases, "Cancelled read locks");
        for process in &mut processes {
            kill_logged(path, process.as_mut());
        }
    }

    /// Number of leases currently held on `path`.
    pub fn lease_count(&self, path: impl AsRef<Path>) -> usize {
        lock(&self.inner.slots)
            .get(path.as_ref())
            .map_or(0, |slot| lock(&slot.state).leases.len())
    }

    /// Number of paths with live lock state.
    pub fn tracked_paths(&self) -> usize {
        lock(&self.inner.slots).len()
    }
}

impl Default for ReadLockManager {
    fn default() -> Self {
        Self::new(LockConfig::default())
    }
}
