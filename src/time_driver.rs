//! Pure virtual-time driver for Embassy.
//!
//! Unlike a real-time simulator, this driver never reads the host clock. Virtual
//! time only moves when [`advance_to`] is called by the event loop (C1, §4.1 of
//! SPEC_FULL.md). Activities that call `Timer::after`/`Timer::at` register a waker
//! at a virtual deadline; `advance_to` pops every waker whose deadline has been
//! reached, in non-decreasing timestamp order, and wakes it.
//!
//! Equal-timestamp wakers are woken in registration order (a `Vec` per timestamp,
//! pushed in arrival order); this is the stable tie-break §4.1 requires.

use core::task::Waker;
use embassy_time_driver::{Driver, TICK_HZ, time_driver_impl};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Microseconds per embassy tick. embassy-time's TICK_HZ is configured (via Cargo
/// features of embassy-time) to 1_000_000, i.e. one tick per microsecond, matching
/// the microsecond virtual-time unit spec.md §4.1 specifies.
const _: () = assert!(TICK_HZ == 1_000_000, "expected a 1 MHz (microsecond) tick rate");

#[derive(Default)]
struct VirtualClock {
    now: u64,
    queue: BTreeMap<u64, Vec<Waker>>,
}

static CLOCK: Mutex<VirtualClock> = Mutex::new(VirtualClock { now: 0, queue: BTreeMap::new() });

struct VirtualDriver;

impl Driver for VirtualDriver {
    fn now(&self) -> u64 {
        CLOCK.lock().unwrap().now
    }

    fn schedule_wake(&self, at: u64, waker: &Waker) {
        let mut clock = CLOCK.lock().unwrap();
        if at <= clock.now {
            // Already due: wake immediately rather than queuing, matching the
            // timeout(0) re-queue-at-tail semantics of §4.1 (the task will be
            // polled again on its next executor pass).
            drop(clock);
            waker.wake_by_ref();
            return;
        }
        clock.queue.entry(at).or_default().push(waker.clone());
    }
}

time_driver_impl!(static DRIVER: VirtualDriver = VirtualDriver);

/// Returns the next virtual timestamp with a pending waker, if any.
pub fn next_deadline() -> Option<u64> {
    CLOCK.lock().unwrap().queue.keys().next().copied()
}

/// Returns the current virtual time in microseconds.
pub fn now_micros() -> u64 {
    CLOCK.lock().unwrap().now
}

/// Advance virtual time to `target` (a no-op if `target` is not after the current
/// time) and wake every waker whose deadline has been reached, in ascending
/// timestamp order with insertion-order tie-breaking within a timestamp.
///
/// The event loop (C11's `run_until_horizon`) is the sole caller: it alternates
/// between polling the executor (letting woken tasks run to their next suspension
/// point) and calling `advance_to` with the next pending deadline.
pub fn advance_to(target: u64) {
    let mut clock = CLOCK.lock().unwrap();
    if target > clock.now {
        clock.now = target;
    }
    let now = clock.now;
    let ready_keys: Vec<u64> = clock.queue.range(..=now).map(|(&k, _)| k).collect();
    let mut ready = Vec::new();
    for key in ready_keys {
        if let Some(wakers) = clock.queue.remove(&key) {
            ready.extend(wakers);
        }
    }
    drop(clock);
    for waker in ready {
        waker.wake();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_time::{Duration, Instant, Timer};
    use std::sync::Once;

    static INIT: Once = Once::new();

    fn reset() {
        INIT.call_once(|| {});
        let mut c = CLOCK.lock().unwrap();
        c.now = 0;
        c.queue.clear();
    }

    #[test]
    fn advance_to_wakes_due_timers_in_order() {
        reset();
        let mut order = Vec::new();
        // Poll a future by hand via a tiny executor shim: embassy_time::Timer
        // implements Future, so we drive it with a no-op waker and manual poll.
        use core::future::Future;
        use core::task::{Context, Poll, RawWaker, RawWakerVTable};

        fn noop_clone(_: *const ()) -> RawWaker {
            RawWaker::new(std::ptr::null(), &VTABLE)
        }
        fn noop(_: *const ()) {}
        static VTABLE: RawWakerVTable = RawWakerVTable::new(noop_clone, noop, noop, noop);
        let raw = RawWaker::new(std::ptr::null(), &VTABLE);
        let waker = unsafe { Waker::from_raw(raw) };
        let mut cx = Context::from_waker(&waker);

        let mut t1 = Box::pin(Timer::at(Instant::from_micros(10)));
        let mut t2 = Box::pin(Timer::at(Instant::from_micros(5)));

        assert!(t1.as_mut().poll(&mut cx).is_pending());
        assert!(t2.as_mut().poll(&mut cx).is_pending());

        advance_to(5);
        assert!(t1.as_mut().poll(&mut cx).is_pending());
        assert!(t2.as_mut().poll(&mut cx).is_ready());
        order.push(5u64);

        advance_to(10);
        assert!(t1.as_mut().poll(&mut cx).is_ready());
        order.push(10u64);

        assert_eq!(order, vec![5, 10]);
    }

    #[test]
    fn now_never_goes_backwards_on_stale_target() {
        reset();
        advance_to(100);
        assert_eq!(now_micros(), 100);
        advance_to(50);
        assert_eq!(now_micros(), 100);
    }

    #[allow(unused)]
    fn _duration_unused(_d: Duration) {}
}
