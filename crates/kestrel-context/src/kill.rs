use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type Releaser = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct Inner {
  token: CancellationToken,
  releasers: Mutex<HashMap<u64, Releaser>>,
  next_id: AtomicU64,
  fired: AtomicBool,
}

/// Run-wide cancellation that can also interrupt blocking I/O.
///
/// Task cancellation alone cannot unblock a module stuck in native code. Such
/// modules register a releaser (close the browser, kill the child process)
/// that runs when the switch fires.
#[derive(Clone, Default)]
pub struct KillSwitch {
  inner: Arc<Inner>,
}

impl KillSwitch {
  pub fn new() -> Self {
    Self::default()
  }

  /// Token cancelled when the switch fires.
  pub fn token(&self) -> CancellationToken {
    self.inner.token.clone()
  }

  pub fn is_fired(&self) -> bool {
    self.inner.fired.load(Ordering::SeqCst)
  }

  /// Register a releaser. It runs once when the switch fires, or immediately
  /// if it already has. Dropping the guard deregisters it.
  pub fn on_cancel(&self, releaser: impl FnOnce() + Send + 'static) -> ReleaserGuard {
    let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

    // The fired check happens under the lock so a concurrent `fire` either
    // drains this releaser or we run it here.
    let mut releasers = self.inner.releasers.lock().unwrap_or_else(|e| e.into_inner());
    if self.is_fired() {
      drop(releasers);
      run_releaser(id, Box::new(releaser));
      return ReleaserGuard {
        inner: Weak::new(),
        id,
      };
    }
    releasers.insert(id, Box::new(releaser));
    drop(releasers);

    ReleaserGuard {
      inner: Arc::downgrade(&self.inner),
      id,
    }
  }

  /// Fire the switch. Idempotent; returns how many releasers ran.
  pub fn fire(&self) -> usize {
    if self.inner.fired.swap(true, Ordering::SeqCst) {
      return 0;
    }
    self.inner.token.cancel();

    let releasers: Vec<(u64, Releaser)> = self
      .inner
      .releasers
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .drain()
      .collect();

    let count = releasers.len();
    for (id, releaser) in releasers {
      run_releaser(id, releaser);
    }
    debug!(releasers = count, "kill_switch_fired");
    count
  }

  /// Number of registered releasers.
  pub fn pending(&self) -> usize {
    self
      .inner
      .releasers
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .len()
  }
}

fn run_releaser(id: u64, releaser: Releaser) {
  if catch_unwind(AssertUnwindSafe(releaser)).is_err() {
    warn!(releaser = id, "releaser panicked during teardown");
  }
}

/// Deregisters its releaser when dropped.
#[must_use = "dropping the guard deregisters the releaser"]
pub struct ReleaserGuard {
  inner: Weak<Inner>,
  id: u64,
}

impl ReleaserGuard {
  /// Keep the releaser registered for the rest of the run.
  pub fn forget(mut self) {
    self.inner = Weak::new();
  }
}

impl Drop for ReleaserGuard {
  fn drop(&mut self) {
    if let Some(inner) = self.inner.upgrade() {
      inner
        .releasers
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .remove(&self.id);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::AtomicUsize;

  #[test]
  fn test_fire_runs_releasers_once() {
    let switch = KillSwitch::new();
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    let _guard = switch.on_cancel(move || {
      c.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(switch.fire(), 1);
    assert_eq!(switch.fire(), 0);
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert!(switch.token().is_cancelled());
  }

  #[test]
  fn test_dropped_guard_deregisters() {
    let switch = KillSwitch::new();
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    let guard = switch.on_cancel(move || {
      c.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(switch.pending(), 1);
    drop(guard);
    assert_eq!(switch.pending(), 0);

    switch.fire();
    assert_eq!(count.load(Ordering::SeqCst), 0);
  }

  #[test]
  fn test_register_after_fire_runs_immediately() {
    let switch = KillSwitch::new();
    switch.fire();

    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    let _guard = switch.on_cancel(move || {
      c.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(count.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn test_panicking_releaser_is_swallowed() {
    let switch = KillSwitch::new();
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    switch.on_cancel(|| panic!("teardown failed")).forget();
    switch
      .on_cancel(move || {
        c.fetch_add(1, Ordering::SeqCst);
      })
      .forget();

    assert_eq!(switch.fire(), 2);
    assert_eq!(count.load(Ordering::SeqCst), 1);
  }
}
