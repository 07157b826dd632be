//! The single-owner-thread runloop.
//!
//! The loop runs on the thread that calls [`RunLoop::run`]. Work reaches
//! it three ways:
//!
//! - **local tasks**: posted from the owner thread, run in FIFO order
//!   within the current pump cycle;
//! - **remote tasks**: posted from any thread through a [`RunLoopHandle`],
//!   marshalled into the owner thread;
//! - **timers**: one-shot or repeating, fired on the owner thread.
//!
//! The loop blocks when it has nothing due and stops when [`RunLoop::stop`]
//! is called (from a task or from another thread via the handle).

use parking_lot::{Condvar, Mutex};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

type LocalTask = Box<dyn FnOnce()>;
type RemoteTask = Box<dyn FnOnce() + Send>;

/// Identifier of a timer owned by the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

struct TimerSlot {
    id: TimerId,
    deadline: Instant,
    interval: Duration,
    repeating: bool,
    active: bool,
    callback: Rc<dyn Fn(TimerId)>,
}

struct Shared {
    queue: Mutex<VecDeque<RemoteTask>>,
    cv: Condvar,
    running: AtomicBool,
}

/// A `Send + Clone` handle for posting work from other threads.
#[derive(Clone)]
pub struct RunLoopHandle {
    shared: Arc<Shared>,
}

impl RunLoopHandle {
    /// Post `task` to run on the loop's owner thread.
    pub fn dispatch(&self, task: impl FnOnce() + Send + 'static) {
        self.shared.queue.lock().push_back(Box::new(task));
        self.shared.cv.notify_one();
    }

    /// Ask the loop to stop after the current cycle.
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.cv.notify_one();
    }
}

/// The owner-thread runloop.
pub struct RunLoop {
    shared: Arc<Shared>,
    local: RefCell<VecDeque<LocalTask>>,
    timers: RefCell<Vec<TimerSlot>>,
    next_timer: std::cell::Cell<u64>,
}

impl RunLoop {
    /// Create a loop bound to the calling thread.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(VecDeque::new()),
                cv: Condvar::new(),
                running: AtomicBool::new(false),
            }),
            local: RefCell::new(VecDeque::new()),
            timers: RefCell::new(Vec::new()),
            next_timer: std::cell::Cell::new(1),
        }
    }

    /// A cross-thread dispatch handle.
    #[must_use]
    pub fn handle(&self) -> RunLoopHandle {
        RunLoopHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Post a task from the owner thread.
    pub fn post(&self, task: impl FnOnce() + 'static) {
        self.local.borrow_mut().push_back(Box::new(task));
    }

    /// Ask the loop to stop after the current cycle.
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.cv.notify_one();
    }

    // =========================================================================
    // Timers
    // =========================================================================

    /// Allocate an inactive timer that invokes `callback` on fire.
    pub fn timer_new(&self, callback: Rc<dyn Fn(TimerId)>) -> TimerId {
        let id = TimerId(self.next_timer.get());
        self.next_timer.set(id.0 + 1);
        self.timers.borrow_mut().push(TimerSlot {
            id,
            deadline: Instant::now(),
            interval: Duration::ZERO,
            repeating: false,
            active: false,
            callback,
        });
        id
    }

    /// Arm `id` to fire after `interval` (and every `interval` thereafter
    /// when `repeating`).
    pub fn timer_start(&self, id: TimerId, interval: Duration, repeating: bool) {
        let mut timers = self.timers.borrow_mut();
        if let Some(slot) = timers.iter_mut().find(|s| s.id == id) {
            slot.interval = interval;
            slot.repeating = repeating;
            slot.deadline = Instant::now() + interval;
            slot.active = true;
        }
    }

    /// Disarm `id` without removing it.
    pub fn timer_stop(&self, id: TimerId) {
        let mut timers = self.timers.borrow_mut();
        if let Some(slot) = timers.iter_mut().find(|s| s.id == id) {
            slot.active = false;
        }
    }

    /// Remove `id` entirely.
    pub fn timer_drop(&self, id: TimerId) {
        self.timers.borrow_mut().retain(|s| s.id != id);
    }

    fn due_timers(&self, now: Instant) -> Vec<(TimerId, Rc<dyn Fn(TimerId)>)> {
        let mut due = Vec::new();
        let mut timers = self.timers.borrow_mut();
        for slot in timers.iter_mut() {
            if slot.active && slot.deadline <= now {
                due.push((slot.id, Rc::clone(&slot.callback)));
                if slot.repeating {
                    slot.deadline = now + slot.interval;
                } else {
                    slot.active = false;
                }
            }
        }
        due
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.timers
            .borrow()
            .iter()
            .filter(|s| s.active)
            .map(|s| s.deadline)
            .min()
    }

    // =========================================================================
    // Pump
    // =========================================================================

    /// Run until [`stop`](Self::stop) is called. Tasks posted during the
    /// run (from either side) are executed in arrival order.
    pub fn run(&self) {
        self.shared.running.store(true, Ordering::SeqCst);

        loop {
            if !self.shared.running.load(Ordering::SeqCst) {
                break;
            }

            // Fire due timers.
            for (id, cb) in self.due_timers(Instant::now()) {
                cb(id);
            }

            // Drain local tasks.
            loop {
                let task = self.local.borrow_mut().pop_front();
                match task {
                    Some(t) => t(),
                    None => break,
                }
                if !self.shared.running.load(Ordering::SeqCst) {
                    return;
                }
            }

            // Drain remote tasks.
            loop {
                let task = self.shared.queue.lock().pop_front();
                match task {
                    Some(t) => t(),
                    None => break,
                }
                if !self.shared.running.load(Ordering::SeqCst) {
                    return;
                }
            }

            if !self.local.borrow().is_empty() {
                continue;
            }

            // Idle: block until a remote task, a timer deadline, or stop.
            let mut queue = self.shared.queue.lock();
            if !queue.is_empty() || !self.shared.running.load(Ordering::SeqCst) {
                continue;
            }
            match self.next_deadline() {
                Some(deadline) => {
                    let now = Instant::now();
                    if deadline > now {
                        let _ = self.shared.cv.wait_until(&mut queue, deadline);
                    }
                }
                None => {
                    self.shared.cv.wait(&mut queue);
                }
            }
        }
    }
}

impl Default for RunLoop {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_local_tasks_run_in_order() {
        let rl = Rc::new(RunLoop::new());
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let log = Rc::clone(&log);
            rl.post(move || log.borrow_mut().push(i));
        }
        let stopper = Rc::clone(&rl);
        rl.post(move || stopper.stop());
        rl.run();
        assert_eq!(&*log.borrow(), &[0, 1, 2]);
    }

    #[test]
    fn test_remote_dispatch_wakes_the_loop() {
        let rl = RunLoop::new();
        let handle = rl.handle();
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = Arc::clone(&fired);
        let h2 = handle.clone();
        let worker = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            h2.dispatch(move || fired2.store(true, Ordering::SeqCst));
            std::thread::sleep(Duration::from_millis(10));
            handle.stop();
        });
        rl.run();
        worker.join().unwrap();
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_oneshot_and_repeating_timers() {
        let rl = Rc::new(RunLoop::new());
        let ticks = Rc::new(Cell::new(0u32));

        let t = {
            let ticks = Rc::clone(&ticks);
            let rl2 = Rc::clone(&rl);
            rl.timer_new(Rc::new(move |id| {
                ticks.set(ticks.get() + 1);
                if ticks.get() >= 3 {
                    rl2.timer_stop(id);
                    rl2.stop();
                }
            }))
        };
        rl.timer_start(t, Duration::from_millis(5), true);
        rl.run();
        assert_eq!(ticks.get(), 3);
    }
}
