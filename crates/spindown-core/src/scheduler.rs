//! Single-shot timer scheduler that owns the process's event loop.
//!
//! Timers live in a min-heap ordered by `(fire_time, timer_id)`; the timer id
//! is a strictly increasing counter, so timers scheduled for the identical
//! instant fire in scheduling order. Cancellation is lazy: a cleared timer is
//! flagged and skipped when popped, which avoids heap-internal removal.
//!
//! Exactly one thread drives [`Scheduler::run`]. Every callback executes
//! synchronously on that thread, so the pipeline needs no locking. The only
//! cross-thread surface is [`SchedulerStopHandle`], which lets a signal
//! handler interrupt the loop's sleep and request a graceful exit.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::rc::Rc;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::shielded;

/// Timer callbacks run on the loop thread. They must not panic; a panic is
/// caught, logged, and suppressed.
pub type Callback = Box<dyn FnMut()>;

/// Opaque timer identifier returned by [`Scheduler::set_timer`].
pub type TimerId = u64;

struct Timer {
    fire_time: Instant,
    timer_id: TimerId,
    callback: Callback,
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.fire_time == other.fire_time && self.timer_id == other.timer_id
    }
}

impl Eq for Timer {}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timer {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; invert so the earliest (fire_time, id)
        // pair pops first. The id comparison is the FIFO tie-break.
        (other.fire_time, other.timer_id).cmp(&(self.fire_time, self.timer_id))
    }
}

struct SchedulerState {
    queue: BinaryHeap<Timer>,
    // Ids with a live heap entry. Clearing an id not in here is a no-op,
    // so a stale id can never poison a later timer.
    pending: HashSet<TimerId>,
    cancelled: HashSet<TimerId>,
    next_id: TimerId,
}

/// Signals the run loop to exit. Shared with stop handles on other threads.
struct StopSignal {
    requested: Mutex<bool>,
    condvar: Condvar,
}

impl StopSignal {
    fn new() -> Self {
        Self {
            requested: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    fn request(&self) {
        *self.requested.lock().unwrap() = true;
        self.condvar.notify_all();
    }

    fn is_requested(&self) -> bool {
        *self.requested.lock().unwrap()
    }

    /// Sleep for up to `timeout`. Returns true if a stop was requested.
    fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut requested = self.requested.lock().unwrap();
        while !*requested {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _timed_out) = self
                .condvar
                .wait_timeout(requested, deadline - now)
                .unwrap();
            requested = guard;
        }
        true
    }
}

/// Thread-safe handle that requests the scheduler loop to exit at the next
/// opportunity. Safe to call from a signal handler thread.
#[derive(Clone)]
pub struct SchedulerStopHandle {
    stop: Arc<StopSignal>,
}

impl SchedulerStopHandle {
    pub fn stop(&self) {
        self.stop.request();
    }
}

/// Single-threaded timer engine.
///
/// Cheaply cloneable handle: clones share the same timer queue, so monitors
/// and controllers each hold their own copy.
#[derive(Clone)]
pub struct Scheduler {
    state: Rc<RefCell<SchedulerState>>,
    stop: Arc<StopSignal>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(SchedulerState {
                queue: BinaryHeap::new(),
                pending: HashSet::new(),
                cancelled: HashSet::new(),
                next_id: 0,
            })),
            stop: Arc::new(StopSignal::new()),
        }
    }

    /// Schedule `callback` to run once after `delay`.
    pub fn set_timer(&self, delay: Duration, callback: Callback) -> TimerId {
        let mut state = self.state.borrow_mut();
        let timer_id = state.next_id;
        state.next_id += 1;
        state.pending.insert(timer_id);
        state.queue.push(Timer {
            fire_time: Instant::now() + delay,
            timer_id,
            callback,
        });
        timer_id
    }

    /// Cancel a pending timer.
    ///
    /// The cancellation is immediate from the caller's perspective even
    /// though the heap entry is only dropped when it reaches the top.
    /// Clearing an already-fired or unknown id is a no-op.
    pub fn clear_timer(&self, timer_id: TimerId) {
        let mut state = self.state.borrow_mut();
        if state.pending.remove(&timer_id) {
            state.cancelled.insert(timer_id);
        }
    }

    /// Request the run loop to exit at the next opportunity.
    pub fn stop(&self) {
        self.stop.request();
    }

    /// A `Send + Clone` handle for stopping the loop from another thread.
    pub fn stop_handle(&self) -> SchedulerStopHandle {
        SchedulerStopHandle {
            stop: Arc::clone(&self.stop),
        }
    }

    /// Drain timers until none remain or [`stop`](Self::stop) is called.
    ///
    /// Pops the earliest timer, sleeps until its fire time (interruptible by
    /// a stop request), then invokes its callback synchronously. A callback
    /// that blocks stalls all later timers until it returns; bounding
    /// external call duration is the caller's responsibility.
    pub fn run(&self) {
        loop {
            if self.stop.is_requested() {
                break;
            }
            let mut timer = match self.pop_next() {
                Some(timer) => timer,
                None => break,
            };
            let delay = timer.fire_time.saturating_duration_since(Instant::now());
            if !delay.is_zero() && self.stop.wait(delay) {
                break;
            }
            shielded("timer callback", || (timer.callback)());
        }
    }

    fn pop_next(&self) -> Option<Timer> {
        let mut state = self.state.borrow_mut();
        while let Some(timer) = state.queue.pop() {
            if state.cancelled.remove(&timer.timer_id) {
                continue;
            }
            // Cancellation is only possible from the loop thread, so once a
            // timer is popped it is committed to fire.
            state.pending.remove(&timer.timer_id);
            return Some(timer);
        }
        None
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
