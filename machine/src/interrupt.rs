//! Simulated-time interrupt engine.
//!
//! Time only moves when the kernel lets it: one tick per simulated user
//! instruction, a larger step each time interrupts are re-enabled, and a
//! jump straight to the next pending event when the machine idles.
//! Devices queue completion callbacks here; the kernel disables and
//! restores the level around its critical sections.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Ticks charged when interrupts are re-enabled inside the kernel.
pub const SYSTEM_TICK: u64 = 10;
/// Ticks charged per user instruction.
pub const USER_TICK: u64 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntStatus {
    Off,
    On,
}

struct Pending {
    when: u64,
    seq: u64,
    what: &'static str,
    handler: Box<dyn FnOnce()>,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.when == other.when && self.seq == other.seq
    }
}
impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap 是大根堆, 这里反转得到最早到期优先
        (other.when, other.seq).cmp(&(self.when, self.seq))
    }
}

pub struct Interrupt {
    level: IntStatus,
    pending: BinaryHeap<Pending>,
    seq: u64,
    yield_requested: bool,
    // 时间片耗尽时由内核注册的让路动作
    yield_hook: Option<fn()>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self {
            level: IntStatus::Off,
            pending: BinaryHeap::new(),
            seq: 0,
            yield_requested: false,
            yield_hook: None,
        }
    }

    pub fn level(&self) -> IntStatus {
        self.level
    }

    /// Change the interrupt level, returning the previous one.
    ///
    /// Re-enabling advances simulated time, which is when queued device
    /// callbacks get their chance to fire.
    pub fn set_level(&mut self, new: IntStatus) -> IntStatus {
        let old = self.level;
        self.level = new;
        if old == IntStatus::Off && new == IntStatus::On {
            self.one_tick(SYSTEM_TICK);
        }
        old
    }

    /// Advance the clock by `ticks` and fire whatever came due.
    pub fn one_tick(&mut self, ticks: u64) {
        let now = logger::advance_ticks(ticks);
        self.check_due(now);

        if self.yield_requested && self.level == IntStatus::On {
            self.yield_requested = false;
            if let Some(hook) = self.yield_hook {
                hook();
            }
        }
    }

    /// Nothing to run: jump the clock to the next pending interrupt.
    ///
    /// A machine with no pending interrupts and nothing to run is dead —
    /// every thread is blocked on an event that can never happen.
    pub fn idle(&mut self) {
        assert_eq!(self.level, IntStatus::Off);
        match self.pending.peek().map(|p| p.when) {
            Some(when) => {
                let now = logger::logger_now();
                if when > now {
                    logger::advance_ticks(when - now);
                }
                self.check_due(logger::logger_now());
            }
            None => panic!(
                "no thread ready to run, and no pending interrupts: \
                 the machine is deadlocked"
            ),
        }
    }

    /// Queue `handler` to run `delay` ticks from now.
    pub fn schedule(&mut self, what: &'static str, delay: u64, handler: Box<dyn FnOnce()>) {
        assert!(delay > 0);
        let when = logger::logger_now() + delay;
        self.seq += 1;
        logger::kdebug!('d', "scheduling {} interrupt at {}", what, when);
        self.pending.push(Pending {
            when,
            seq: self.seq,
            what,
            handler,
        });
    }

    /// Ask for the running thread to be preempted once the current
    /// interrupt finishes. Called from interrupt handlers (the timer).
    pub fn yield_on_return(&mut self) {
        self.yield_requested = true;
    }

    pub fn set_yield_hook(&mut self, hook: fn()) {
        self.yield_hook = Some(hook);
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    fn check_due(&mut self, now: u64) {
        while let Some(first) = self.pending.peek() {
            if first.when > now {
                break;
            }
            let pending = self.pending.pop().unwrap();
            logger::kdebug!('d', "{} interrupt firing at {}", pending.what, now);

            // 处理例程必须在关中断状态下运行
            let old = self.level;
            self.level = IntStatus::Off;
            (pending.handler)();
            self.level = old;
        }
    }
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    static FIRED: AtomicUsize = AtomicUsize::new(0);

    #[test]
    fn due_handlers_fire_in_time_order() {
        FIRED.store(0, AtomicOrdering::SeqCst);

        let mut intr = Interrupt::new();
        // 到期次序与入队次序无关, 只与时间有关
        intr.schedule("late", 500, Box::new(|| {
            assert_eq!(FIRED.fetch_add(1, AtomicOrdering::SeqCst), 1);
        }));
        intr.schedule("early", 50, Box::new(|| {
            assert_eq!(FIRED.fetch_add(1, AtomicOrdering::SeqCst), 0);
        }));

        while intr.has_pending() {
            intr.idle();
        }
        assert_eq!(FIRED.load(AtomicOrdering::SeqCst), 2);
    }

    #[test]
    #[should_panic(expected = "deadlocked")]
    fn idle_with_nothing_pending_is_deadlock() {
        let mut intr = Interrupt::new();
        intr.idle();
    }
}
