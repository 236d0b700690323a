//! Connection cap enforced before the upgrade is accepted.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Counts open sockets against `max`.
#[derive(Debug)]
pub struct ConnectionSlots {
    active: AtomicUsize,
    max: usize,
}

impl ConnectionSlots {
    /// Allow at most `max` concurrent sockets.
    pub fn new(max: usize) -> Self {
        Self {
            active: AtomicUsize::new(0),
            max,
        }
    }

    /// Take a slot, or `None` at the cap. The slot is returned when the guard
    /// drops.
    pub fn try_acquire(self: &Arc<Self>) -> Option<SlotGuard> {
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max).then_some(n + 1)
            })
            .ok()
            .map(|_| SlotGuard {
                slots: Arc::clone(self),
            })
    }

    /// Sockets currently holding a slot.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Configured cap.
    pub fn max(&self) -> usize {
        self.max
    }
}

/// One held slot.
#[derive(Debug)]
pub struct SlotGuard {
    slots: Arc<ConnectionSlots>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let _ = self.slots.active.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refuses_past_cap() {
        let slots = Arc::new(ConnectionSlots::new(2));
        let a = slots.try_acquire();
        let b = slots.try_acquire();
        assert!(a.is_some() && b.is_some());
        assert!(slots.try_acquire().is_none());
        assert_eq!(slots.active(), 2);
    }

    #[test]
    fn drop_releases_slot() {
        let slots = Arc::new(ConnectionSlots::new(1));
        let guard = slots.try_acquire();
        assert!(slots.try_acquire().is_none());
        drop(guard);
        assert_eq!(slots.active(), 0);
        assert!(slots.try_acquire().is_some());
    }

    #[test]
    fn zero_cap_refuses_everything() {
        let slots = Arc::new(ConnectionSlots::new(0));
        assert!(slots.try_acquire().is_none());
        assert_eq!(slots.max(), 0);
    }
}
