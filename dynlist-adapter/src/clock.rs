use alloc::collections::BTreeMap;
use core::cell::{Cell, RefCell};

use dynlist::{Clock, TimeoutCallback, TimeoutId};

/// A [`Clock`] driven by the host's own notion of time.
///
/// Nothing fires on its own: call [`ManualClock::advance_to`] from a frame or timer tick. Due
/// callbacks run in deadline order (ties in scheduling order), and a callback scheduled while
/// advancing fires in the same call if it is already due.
#[derive(Default)]
pub struct ManualClock {
    now_ms: Cell<u64>,
    next_id: Cell<TimeoutId>,
    timers: RefCell<BTreeMap<TimeoutId, (u64, TimeoutCallback)>>,
}

impl core::fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ManualClock")
            .field("now_ms", &self.now_ms.get())
            .field("pending_timers", &self.timers.borrow().len())
            .finish()
    }
}

impl ManualClock {
    pub fn new(now_ms: u64) -> Self {
        let clock = Self::default();
        clock.now_ms.set(now_ms);
        clock
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms.get()
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.borrow().len()
    }

    /// Moves time forward to `now_ms`, running every callback that became due.
    ///
    /// Time never moves backwards; an earlier `now_ms` only runs already-due callbacks.
    /// Returns how many callbacks ran.
    pub fn advance_to(&self, now_ms: u64) -> usize {
        let target = core::cmp::max(now_ms, self.now_ms.get());
        let mut fired = 0;
        loop {
            let due = self
                .timers
                .borrow()
                .iter()
                .filter(|(_, (deadline, _))| *deadline <= target)
                .min_by_key(|(id, (deadline, _))| (*deadline, **id))
                .map(|(id, (deadline, _))| (*id, *deadline));
            let Some((id, deadline)) = due else {
                break;
            };
            // The callback may schedule or cancel timers, so release the map first.
            let entry = self.timers.borrow_mut().remove(&id);
            if let Some((_, callback)) = entry {
                self.now_ms.set(deadline);
                callback();
                fired += 1;
            }
        }
        self.now_ms.set(target);
        fired
    }

    pub fn advance_by(&self, delta_ms: u64) -> usize {
        self.advance_to(self.now_ms.get().saturating_add(delta_ms))
    }
}

impl Clock for ManualClock {
    fn set_timeout(&self, delay_ms: u64, callback: TimeoutCallback) -> TimeoutId {
        let id = self.next_id.get().wrapping_add(1);
        self.next_id.set(id);
        let deadline = self.now_ms.get().saturating_add(delay_ms);
        self.timers.borrow_mut().insert(id, (deadline, callback));
        id
    }

    fn clear_timeout(&self, id: TimeoutId) {
        self.timers.borrow_mut().remove(&id);
    }
}
