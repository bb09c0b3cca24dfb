//! Synchronous console.
//!
//! The raw console completes one character at a time through
//! interrupts; this wrapper parks the calling thread on a semaphore
//! until the completion arrives, and serializes readers and writers
//! with a lock per direction.

use machine::machine;

use crate::sync::{Lock, Semaphore};
use crate::system;

pub struct SynchConsole {
    read_lock: Lock,
    write_lock: Lock,
    read_sem: Semaphore,
    write_sem: Semaphore,
}

impl SynchConsole {
    pub fn new() -> Self {
        Self {
            read_lock: Lock::new("console read"),
            write_lock: Lock::new("console write"),
            read_sem: Semaphore::new("console read", 0),
            write_sem: Semaphore::new("console write", 0),
        }
    }

    /// Write one character, returning once the device took it.
    pub fn put_char(&self, ch: u8) {
        self.write_lock.acquire();
        machine().console_put_char(ch);
        self.write_sem.p();
        self.write_lock.release();
    }

    pub fn put_buffer(&self, buffer: &[u8]) {
        for &ch in buffer {
            self.put_char(ch);
        }
    }

    /// Read one character; `None` once input is exhausted.
    pub fn get_char(&self) -> Option<u8> {
        self.read_lock.acquire();
        machine().console_request_char();
        self.read_sem.p();
        let ch = machine().console.fetch_char();
        self.read_lock.release();
        ch
    }

    /// Fill `buffer`, stopping early at end of input; returns the
    /// number of bytes read.
    pub fn get_buffer(&self, buffer: &mut [u8]) -> usize {
        for (count, slot) in buffer.iter_mut().enumerate() {
            match self.get_char() {
                Some(ch) => *slot = ch,
                None => return count,
            }
        }
        buffer.len()
    }
}

impl Default for SynchConsole {
    fn default() -> Self {
        Self::new()
    }
}

// 设备完成中断: 叫醒等在信号量上的线程
pub(crate) fn read_avail() {
    system::synch_console().read_sem.v();
}

pub(crate) fn write_done() {
    system::synch_console().write_sem.v();
}
