//! Simulated clock & event loop (C1, §4.1).
//!
//! The teacher wires `embassy-executor`'s `arch-std` executor to a real
//! wall-clock-scaled time driver (its own `time_driver.rs`) and lets the OS
//! thread park/unpark between deadlines. That model is real-time by
//! construction: a host hiccup delays the simulation, which conflicts with
//! this spec's NON-GOAL of real-time execution and its determinism requirement
//! (§4.1: "all randomness draws from seeded generators... tie-breaking at equal
//! t is stable by insertion order"). So the executor here is purpose-built: a
//! single-threaded, non-preemptive task pool whose wakers enqueue directly
//! (no OS thread, no parking), paired with the purely virtual `time_driver` in
//! this crate. `embassy-sync`, `embassy-time` and `embassy-futures` remain
//! exactly as the teacher uses them; only the task-polling substrate changes.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

use crate::time_driver;

type BoxFuture = Pin<Box<dyn Future<Output = ()>>>;

/// A single-threaded cooperative task pool. Not `Send`/`Sync` by design: the
/// whole point of C1 is that there is exactly one thread of control.
pub struct Scheduler {
    tasks: RefCell<HashMap<usize, BoxFuture>>,
    ready: Rc<RefCell<VecDeque<usize>>>,
    next_id: RefCell<usize>,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler { tasks: RefCell::new(HashMap::new()), ready: Rc::new(RefCell::new(VecDeque::new())), next_id: RefCell::new(0) }
    }

    /// Spawns a new activity. It is polled for the first time on the next
    /// `drain_ready` pass, at the tail of the current ready queue, matching
    /// §4.1's insertion-order tie-break for same-instant events.
    pub fn spawn(&self, fut: impl Future<Output = ()> + 'static) {
        let mut next_id = self.next_id.borrow_mut();
        let id = *next_id;
        *next_id += 1;
        drop(next_id);
        self.tasks.borrow_mut().insert(id, Box::pin(fut));
        self.ready.borrow_mut().push_back(id);
    }

    fn make_waker(&self, id: usize) -> Waker {
        let data: Rc<WakeData> = Rc::new(WakeData { task_id: id, ready: self.ready.clone() });
        let raw = Rc::into_raw(data) as *const ();
        unsafe { Waker::from_raw(RawWaker::new(raw, &WAKE_VTABLE)) }
    }

    /// Polls every currently-ready task once; a task that wakes itself (or
    /// another ready task) during its own poll is re-queued at the tail and
    /// picked up by this same pass, so zero-delay chains (`timeout(0)`,
    /// freshly-spawned children) resolve within one `drain_ready` call.
    ///
    /// Returns `true` iff at least one task was polled.
    pub fn drain_ready(&self) -> bool {
        let mut polled_any = false;
        loop {
            let id = match self.ready.borrow_mut().pop_front() {
                Some(id) => id,
                None => break,
            };
            let fut = self.tasks.borrow_mut().remove(&id);
            let Some(mut fut) = fut else { continue };
            polled_any = true;
            let waker = self.make_waker(id);
            let mut cx = Context::from_waker(&waker);
            match fut.as_mut().poll(&mut cx) {
                Poll::Pending => {
                    self.tasks.borrow_mut().insert(id, fut);
                }
                Poll::Ready(()) => {}
            }
        }
        polled_any
    }

    pub fn is_idle(&self) -> bool {
        self.tasks.borrow().is_empty()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

struct WakeData {
    task_id: usize,
    ready: Rc<RefCell<VecDeque<usize>>>,
}

fn wake_clone(ptr: *const ()) -> RawWaker {
    unsafe { Rc::increment_strong_count(ptr as *const WakeData) };
    RawWaker::new(ptr, &WAKE_VTABLE)
}

fn wake_consume(ptr: *const ()) {
    let data = unsafe { Rc::from_raw(ptr as *const WakeData) };
    data.ready.borrow_mut().push_back(data.task_id);
}

fn wake_by_ref(ptr: *const ()) {
    let data = unsafe { &*(ptr as *const WakeData) };
    data.ready.borrow_mut().push_back(data.task_id);
}

fn wake_drop(ptr: *const ()) {
    unsafe { drop(Rc::from_raw(ptr as *const WakeData)) };
}

static WAKE_VTABLE: RawWakerVTable = RawWakerVTable::new(wake_clone, wake_consume, wake_by_ref, wake_drop);

/// Runs every spawned activity until simulated time reaches `horizon_micros`
/// or no activity remains runnable (§4.1: "terminates when t >= HORIZON or no
/// events remain"). Alternates draining all currently-ready tasks with
/// advancing virtual time to the next pending deadline.
pub fn run_until_horizon(scheduler: &Scheduler, horizon_micros: u64) {
    loop {
        if scheduler.drain_ready() {
            continue;
        }
        if scheduler.is_idle() {
            break;
        }
        match time_driver::next_deadline() {
            Some(next) if next < horizon_micros => {
                time_driver::advance_to(next);
            }
            _ => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_time::{Duration, Timer};
    use std::cell::Cell;
    use std::rc::Rc as StdRc;

    #[test]
    fn spawned_task_runs_to_completion_without_timers() {
        let scheduler = Scheduler::new();
        let ran = StdRc::new(Cell::new(false));
        let ran2 = ran.clone();
        scheduler.spawn(async move {
            ran2.set(true);
        });
        run_until_horizon(&scheduler, 1_000);
        assert!(ran.get());
        assert!(scheduler.is_idle());
    }

    #[test]
    fn timer_based_task_resumes_after_advance() {
        let scheduler = Scheduler::new();
        let order = StdRc::new(RefCell::new(Vec::new()));
        let order2 = order.clone();
        scheduler.spawn(async move {
            order2.borrow_mut().push("start");
            Timer::after(Duration::from_micros(100)).await;
            order2.borrow_mut().push("resumed");
        });
        run_until_horizon(&scheduler, 1_000);
        assert_eq!(*order.borrow(), vec!["start", "resumed"]);
    }

    #[test]
    fn horizon_stops_activities_scheduled_past_it() {
        let scheduler = Scheduler::new();
        let completed = StdRc::new(Cell::new(false));
        let completed2 = completed.clone();
        scheduler.spawn(async move {
            Timer::after(Duration::from_micros(10_000)).await;
            completed2.set(true);
        });
        run_until_horizon(&scheduler, 100);
        assert!(!completed.get());
        assert!(!scheduler.is_idle());
    }
}
