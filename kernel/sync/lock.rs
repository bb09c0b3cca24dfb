//! Mutual exclusion lock with optional priority inheritance.
//!
//! A lock is a binary semaphore plus an owner: only the holder may
//! release, and a holder trying to re-acquire is a kernel bug. With
//! inheritance enabled, an urgent acquirer lends its priority to a
//! less urgent holder so the holder cannot be starved out from under
//! the waiter (the Pathfinder scenario).

use std::sync::Arc;

use machine::interrupt::IntStatus;
use machine::machine;

use super::semaphore::Semaphore;
use super::unicore::UPSafeCell;
use crate::system;
use crate::thread::{self, Thread};

pub struct Lock {
    name: &'static str,
    semaphore: Semaphore,
    inner: UPSafeCell<LockInner>,
}

struct LockInner {
    holder: Option<Arc<Thread>>,
    // 持有者取锁时自己的 nice 值, 释放时写回, 抵消期间收到的捐赠
    saved_nice: isize,
    prio_inherit: bool,
}

impl Lock {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            semaphore: Semaphore::new(name, 1),
            inner: unsafe {
                UPSafeCell::new(LockInner {
                    holder: None,
                    saved_nice: 0,
                    prio_inherit: false,
                })
            },
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Enable priority donation for this lock.
    pub fn set_prio_inherit(&self) {
        self.inner.exclusive_access().prio_inherit = true;
    }

    /// Acquire the lock, blocking while another thread holds it.
    pub fn acquire(&self) {
        assert!(
            !self.held_by_current_thread(),
            "thread re-acquired lock \"{}\" it already holds",
            self.name
        );

        {
            let inner = self.inner.exclusive_access();
            if inner.prio_inherit {
                if let Some(holder) = inner.holder.clone() {
                    drop(inner);
                    let current = thread::current_thread();
                    if holder.priority() > current.priority() {
                        logger::kdebug!(
                            't',
                            "`{}` donates priority {} to `{}` through lock \"{}\"",
                            current.name(),
                            current.priority(),
                            holder.name(),
                            self.name
                        );
                        let old_prio = holder.priority();
                        holder.nice(current.get_nice());
                        let old = machine().interrupt.set_level(IntStatus::Off);
                        system::scheduler().reschedule(&holder, old_prio);
                        machine().interrupt.set_level(old);
                    }
                }
            }
        }

        self.semaphore.p();

        let current = thread::current_thread();
        let mut inner = self.inner.exclusive_access();
        inner.saved_nice = current.get_nice();
        inner.holder = Some(current);
    }

    /// Release the lock. Only the holder may do this.
    pub fn release(&self) {
        assert!(
            self.held_by_current_thread(),
            "thread released lock \"{}\" it does not hold",
            self.name
        );

        let mut inner = self.inner.exclusive_access();
        if inner.prio_inherit {
            let saved = inner.saved_nice;
            if let Some(holder) = inner.holder.as_ref() {
                holder.nice(saved);
            }
        }
        inner.holder = None;
        drop(inner);

        self.semaphore.v();
    }

    pub fn held_by_current_thread(&self) -> bool {
        let inner = self.inner.exclusive_access();
        match inner.holder.as_ref() {
            Some(holder) => Arc::ptr_eq(holder, &thread::current_thread()),
            None => false,
        }
    }
}
