//! Synchronous disk with a write-behind, read-ahead sector cache.
//!
//! The raw disk is asynchronous and single-request; a lock serializes
//! requests and a semaphore parks the requester until the completion
//! interrupt. On top of that sits a small sector cache: reads hit the
//! cache first and pull in the next sector opportunistically, writes
//! land in the cache and reach the disk later through a bounded
//! deferred-write queue.
//!
//! Ordering: repeated writes to one sector coalesce in place, so the
//! disk eventually sees the last value; reads always see the freshest
//! cached write.

use std::collections::VecDeque;

use machine::disk::{NUM_SECTORS, SECTOR_SIZE};
use machine::machine;

use crate::sync::{Lock, Semaphore};
use crate::system;

/// Cache entries.
pub const CACHE_SIZE: usize = 64;
/// Deferred writes allowed to pile up before reclaim flushes.
pub const WRITEQ_SIZE: usize = 16;

struct CacheEntry {
    sector: Option<usize>,
    use_: bool,
    dirty: bool,
    data: [u8; SECTOR_SIZE],
}

impl CacheEntry {
    fn empty() -> Self {
        Self {
            sector: None,
            use_: false,
            dirty: false,
            data: [0; SECTOR_SIZE],
        }
    }
}

pub struct SynchDisk {
    // 每次只能有一个磁盘请求在途
    lock: Lock,
    semaphore: Semaphore,
    cache_lock: Lock,
    cache: Vec<CacheEntry>,
    // 延迟写按插入序排队, 元素是缓存下标; 脏表项恰好入队一次
    write_q: VecDeque<usize>,
    victim: usize,
}

impl SynchDisk {
    pub fn new() -> Self {
        Self {
            lock: Lock::new("synch disk"),
            semaphore: Semaphore::new("synch disk", 0),
            cache_lock: Lock::new("disk cache"),
            cache: (0..CACHE_SIZE).map(|_| CacheEntry::empty()).collect(),
            write_q: VecDeque::new(),
            victim: 0,
        }
    }

    /// Read a sector, returning once the data is in `data`.
    pub fn read_sector(&mut self, sector: usize, data: &mut [u8]) {
        assert_eq!(data.len(), SECTOR_SIZE);
        self.cache_lock.acquire();

        if let Some(idx) = self.lookup(sector) {
            data.copy_from_slice(&self.cache[idx].data);
            self.cache[idx].use_ = true;
            self.cache_lock.release();
            return;
        }

        self.io_read(sector, data);
        let idx = self.reclaim();
        self.fill(idx, sector, data, false);

        // 预读下一个扇区
        if sector + 1 < NUM_SECTORS && self.lookup(sector + 1).is_none() {
            let mut next = [0u8; SECTOR_SIZE];
            self.io_read(sector + 1, &mut next);
            let idx = self.reclaim();
            self.fill(idx, sector + 1, &next, false);
        }

        self.cache_lock.release();
    }

    /// Write a sector. The data lands in the cache immediately and is
    /// pushed to the disk later (write-behind).
    pub fn write_sector(&mut self, sector: usize, data: &[u8]) {
        assert_eq!(data.len(), SECTOR_SIZE);
        self.cache_lock.acquire();

        if let Some(idx) = self.lookup(sector) {
            let entry = &mut self.cache[idx];
            entry.data.copy_from_slice(data);
            entry.use_ = true;
            if !entry.dirty {
                entry.dirty = true;
                self.write_q.push_back(idx);
            }
            self.cache_lock.release();
            return;
        }

        let idx = self.reclaim();
        self.fill(idx, sector, data, true);
        self.write_q.push_back(idx);

        self.cache_lock.release();
    }

    /// Push every deferred write out to the disk.
    pub fn flush_all(&mut self) {
        self.cache_lock.acquire();
        while let Some(idx) = self.write_q.pop_front() {
            self.flush_entry(idx);
        }
        self.cache_lock.release();
    }

    fn lookup(&self, sector: usize) -> Option<usize> {
        self.cache.iter().position(|e| e.sector == Some(sector))
    }

    fn fill(&mut self, idx: usize, sector: usize, data: &[u8], dirty: bool) {
        let entry = &mut self.cache[idx];
        entry.sector = Some(sector);
        entry.use_ = true;
        entry.dirty = dirty;
        entry.data.copy_from_slice(data);
    }

    /// Find a cache entry suitable to be overwritten.
    ///
    /// An over-long write queue is drained from its head first;
    /// otherwise a two-sweep second-chance clock runs: the first sweep
    /// wants a clean unreferenced entry and strips use bits as it
    /// passes, the second settles for any unreferenced entry, flushing
    /// it on the spot when it turns out dirty.
    fn reclaim(&mut self) -> usize {
        if self.write_q.len() > WRITEQ_SIZE {
            let idx = self.write_q.pop_front().unwrap();
            self.flush_entry(idx);
            return idx;
        }

        for pass in 0..2 {
            for _ in 0..CACHE_SIZE {
                let idx = self.victim;
                self.victim = (self.victim + 1) % CACHE_SIZE;

                let entry = &self.cache[idx];
                let suitable = match pass {
                    0 => entry.sector.is_none() || (!entry.use_ && !entry.dirty),
                    // 第二轮只看 use 位, 脏不脏不再挑剔
                    _ => entry.sector.is_none() || !entry.use_,
                };

                if suitable {
                    if self.cache[idx].dirty {
                        // 摘出延迟写队列再冲刷, 维持脏表项
                        // 恰好入队一次的不变式
                        self.write_q.retain(|&queued| queued != idx);
                        self.flush_entry(idx);
                    }
                    return idx;
                }
                if pass == 0 {
                    self.cache[idx].use_ = false;
                }
            }
        }

        // 第一轮已清掉所有 use 位, 第二轮不可能空手而归
        unreachable!("second-chance sweep failed to produce a victim");
    }

    fn flush_entry(&mut self, idx: usize) {
        if self.cache[idx].dirty {
            let sector = self.cache[idx].sector.unwrap();
            let data = self.cache[idx].data;
            self.io_write(sector, &data);
            self.cache[idx].dirty = false;
        }
    }

    fn io_read(&mut self, sector: usize, data: &mut [u8]) {
        self.lock.acquire();
        machine().disk_read_request(sector, data);
        self.semaphore.p();
        self.lock.release();
    }

    fn io_write(&mut self, sector: usize, data: &[u8]) {
        self.lock.acquire();
        machine().disk_write_request(sector, data);
        self.semaphore.p();
        self.lock.release();
    }
}

impl Default for SynchDisk {
    fn default() -> Self {
        Self::new()
    }
}

/// Disk completion interrupt: wake whoever is waiting on the request.
pub(crate) fn request_done() {
    system::synch_disk().semaphore.v();
}
