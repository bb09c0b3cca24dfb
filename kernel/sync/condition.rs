//! Condition variable over a lock.
//!
//! The one-semaphore-per-waiter scheme: each waiter parks on a fresh
//! binary semaphore queued under the condition, so `signal` can wake
//! exactly one chosen waiter without a thundering herd. Waiters queue
//! in priority order, not arrival order.

use std::sync::Arc;

use component::prio_array::PrioArray;

use super::lock::Lock;
use super::semaphore::Semaphore;
use super::unicore::UPSafeCell;
use crate::thread;

pub struct Condition {
    name: &'static str,
    lock: Arc<Lock>,
    waiters: UPSafeCell<PrioArray<Arc<Semaphore>>>,
}

impl Condition {
    /// Create a condition tied to `lock`; every operation below
    /// requires that lock to be held by the caller.
    pub fn new(name: &'static str, lock: Arc<Lock>) -> Self {
        Self {
            name,
            lock,
            waiters: unsafe { UPSafeCell::new(PrioArray::new()) },
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Atomically release the lock and wait to be signaled, then
    /// re-acquire the lock before returning.
    pub fn wait(&self) {
        assert!(
            self.lock.held_by_current_thread(),
            "wait on \"{}\" without holding its lock",
            self.name
        );

        let semaphore = Arc::new(Semaphore::new(self.name, 0));
        let priority = thread::current_thread().priority();
        self.waiters
            .exclusive_access()
            .push(semaphore.clone(), priority);

        self.lock.release();
        semaphore.p();
        self.lock.acquire();
    }

    /// Wake the most urgent waiter, if any.
    pub fn signal(&self) {
        assert!(
            self.lock.held_by_current_thread(),
            "signal on \"{}\" without holding its lock",
            self.name
        );

        if let Some(semaphore) = self.waiters.exclusive_access().pop() {
            semaphore.v();
        }
    }

    /// Wake every waiter.
    pub fn broadcast(&self) {
        assert!(
            self.lock.held_by_current_thread(),
            "broadcast on \"{}\" without holding its lock",
            self.name
        );

        loop {
            let waiter = self.waiters.exclusive_access().pop();
            match waiter {
                Some(semaphore) => semaphore.v(),
                None => break,
            }
        }
    }
}
