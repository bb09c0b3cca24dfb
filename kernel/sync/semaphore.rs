//! Counting semaphore.
//!
//! On a uniprocessor, disabling interrupts over a short window is
//! mutual exclusion. That window is all the atomicity a semaphore
//! needs, and every other primitive in this kernel bottoms out here.

use std::collections::VecDeque;
use std::sync::Arc;

use machine::interrupt::IntStatus;
use machine::machine;

use super::unicore::UPSafeCell;
use crate::system;
use crate::thread::{self, Thread, ThreadStatus};

pub struct Semaphore {
    name: &'static str,
    inner: UPSafeCell<SemaphoreInner>,
}

struct SemaphoreInner {
    count: usize,
    // 等待者按阻塞次序排队, 唤醒严格 FIFO
    queue: VecDeque<Arc<Thread>>,
}

impl Semaphore {
    pub fn new(name: &'static str, initial: usize) -> Self {
        Self {
            name,
            inner: unsafe {
                UPSafeCell::new(SemaphoreInner {
                    count: initial,
                    queue: VecDeque::new(),
                })
            },
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Take a permit, blocking until one is available.
    ///
    /// A blocked waiter does not touch the count when it wakes: the
    /// `v` that woke it handed its permit over directly, which is what
    /// keeps wakeup strictly FIFO.
    pub fn p(&self) {
        let old = machine().interrupt.set_level(IntStatus::Off);

        let mut inner = self.inner.exclusive_access();
        if inner.count > 0 {
            inner.count -= 1;
            drop(inner);
        } else {
            let current = thread::current_thread();
            logger::kdebug!('t', "`{}` blocks on semaphore \"{}\"", current.name(), self.name);
            inner.queue.push_back(current.clone());
            drop(inner);
            current.set_status(ThreadStatus::Blocked);
            thread::sleep();
        }

        machine().interrupt.set_level(old);
    }

    /// Release a permit, waking the oldest waiter if there is one.
    pub fn v(&self) {
        let old = machine().interrupt.set_level(IntStatus::Off);

        let mut inner = self.inner.exclusive_access();
        match inner.queue.pop_front() {
            Some(waiter) => {
                drop(inner);
                system::scheduler().ready_to_run(waiter);
            }
            None => {
                inner.count += 1;
                drop(inner);
            }
        }

        machine().interrupt.set_level(old);
    }
}
