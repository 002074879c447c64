//! Shared registry of running encoder processes.

use std::collections::HashMap;
use std::process::Child;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

/// Shared registry of running encoder processes.
///
/// Every child the supervisor spawns is registered here for its lifetime so
/// that a host-application shutdown can terminate anything still running —
/// a crashed caller must not leave orphaned encoder processes behind.
///
/// The registry is constructor-injected into [`crate::Supervisor`] and the
/// pipeline rather than living in a global; cloning shares the same table.
#[derive(Clone, Default)]
pub struct ProcessRegistry {
    inner: Arc<Mutex<HashMap<u32, Arc<Mutex<Child>>>>>,
}

impl ProcessRegistry {
    /// New, empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a spawned child. The supervisor keeps operating on the same
    /// shared handle, so `terminate_all` and the polling loop never race on
    /// ownership.
    pub fn add(&self, pid: u32, child: Arc<Mutex<Child>>) {
        let mut table = lock_table(&self.inner);
        table.insert(pid, child);
        debug!(pid, active = table.len(), "process registered");
    }

    /// Stop tracking a child that has exited (or is about to be reaped).
    pub fn remove(&self, pid: u32) {
        let mut table = lock_table(&self.inner);
        if table.remove(&pid).is_some() {
            debug!(pid, active = table.len(), "process deregistered");
        }
    }

    /// Number of currently tracked processes.
    pub fn len(&self) -> usize {
        lock_table(&self.inner).len()
    }

    /// Whether no process is currently tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forcibly terminate every tracked process.
    ///
    /// Invoked once at host shutdown. Children that already exited are
    /// reaped silently; live ones are killed and waited on briefly.
    pub fn terminate_all(&self) {
        let children: Vec<(u32, Arc<Mutex<Child>>)> = {
            let mut table = lock_table(&self.inner);
            table.drain().collect()
        };
        if children.is_empty() {
            return;
        }
        warn!(count = children.len(), "terminating leftover encoder processes");

        for (pid, child) in children {
            let mut child = child.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            match child.try_wait() {
                Ok(Some(_)) => {}
                _ => {
                    if let Err(e) = child.kill() {
                        error!(pid, %e, "failed to kill encoder process");
                    }
                    wait_briefly(&mut child, Duration::from_secs(3));
                }
            }
        }
    }
}

/// Lock the table, recovering from poisoning: a panic in one worker must not
/// disable shutdown cleanup for everyone else.
fn lock_table(
    inner: &Mutex<HashMap<u32, Arc<Mutex<Child>>>>,
) -> std::sync::MutexGuard<'_, HashMap<u32, Arc<Mutex<Child>>>> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn wait_briefly(child: &mut Child, limit: Duration) {
    let start = Instant::now();
    while start.elapsed() < limit {
        match child.try_wait() {
            Ok(Some(_)) => return,
            Ok(None) => std::thread::sleep(Duration::from_millis(100)),
            Err(_) => return,
        }
    }
}
