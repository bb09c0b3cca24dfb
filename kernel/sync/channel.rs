//! Synchronous rendezvous channel for integers.
//!
//! Unbuffered: a send does not complete until a receive has taken the
//! message, and vice versa. A lock serializes senders, so at most one
//! message is ever in flight; the same pattern extends to any
//! fixed-size payload.

use super::lock::Lock;
use super::semaphore::Semaphore;
use super::unicore::UPSafeCell;

pub struct Channel {
    name: &'static str,
    send_lock: Lock,
    send_sem: Semaphore,
    receive_sem: Semaphore,
    buffer: UPSafeCell<i32>,
}

impl Channel {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            send_lock: Lock::new(name),
            send_sem: Semaphore::new(name, 0),
            receive_sem: Semaphore::new(name, 0),
            buffer: unsafe { UPSafeCell::new(0) },
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Deposit `message` and block until a receiver takes it.
    pub fn send(&self, message: i32) {
        self.send_lock.acquire();
        *self.buffer.exclusive_access() = message;
        self.send_sem.v();
        self.receive_sem.p();
        self.send_lock.release();
    }

    /// Block until a sender deposits a message, and return it.
    pub fn receive(&self) -> i32 {
        self.send_sem.p();
        let message = *self.buffer.exclusive_access();
        self.receive_sem.v();
        message
    }
}
