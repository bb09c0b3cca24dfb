//! The core map: who owns each physical frame.
//!
//! An inverse page table mapping frame number to (owning thread,
//! virtual page), plus the free-frame bitmap. When no frame is free,
//! a clock sweep picks a victim by its owner's use/dirty bits and the
//! owner's space pages it out. Owners are found through the thread
//! map by tid, never by a held pointer.
//!
//! Only the running thread ever allocates or evicts, so the structure
//! needs no lock of its own.

use component::bitmap::Bitmap;
use machine::NUM_PHYS_PAGES;

use crate::system;
use crate::thread::{self, Tid};

#[derive(Clone, Copy)]
struct CoreMapEntry {
    tid: Tid,
    vpn: usize,
}

pub struct CoreMap {
    entries: [Option<CoreMapEntry>; NUM_PHYS_PAGES],
    phys_pages: Bitmap,
    victim: usize,
}

impl CoreMap {
    pub fn new() -> Self {
        Self {
            entries: [None; NUM_PHYS_PAGES],
            phys_pages: Bitmap::new(NUM_PHYS_PAGES),
            victim: 0,
        }
    }

    pub fn free_frames(&self) -> usize {
        self.phys_pages.count_clear()
    }

    /// A frame, free or stolen: evicts somebody's page when none is free.
    pub fn find_phys_page(&mut self) -> usize {
        match self.phys_pages.find() {
            Some(ppn) => ppn,
            None => self.evict_page(),
        }
    }

    /// A free frame only (eager mode never evicts).
    pub fn find_free_page(&mut self) -> Option<usize> {
        self.phys_pages.find()
    }

    /// Record that frame `ppn` now holds page `vpn` of thread `tid`.
    pub fn register_page_for(&mut self, tid: Tid, vpn: usize, ppn: usize) {
        self.entries[ppn] = Some(CoreMapEntry { tid, vpn });
    }

    /// Record ownership for the running thread.
    pub fn register_page(&mut self, vpn: usize, ppn: usize) {
        self.register_page_for(thread::current_thread().tid(), vpn, ppn);
    }

    /// Return every frame of `tid` to the free pool (process exit).
    pub fn free_all(&mut self, tid: Tid) {
        for ppn in 0..NUM_PHYS_PAGES {
            if matches!(self.entries[ppn], Some(e) if e.tid == tid) {
                self.entries[ppn] = None;
                self.phys_pages.clear(ppn);
            }
        }
    }

    // 时钟扫描挑出牺牲帧, 请它的属主把页换出去
    fn evict_page(&mut self) -> usize {
        // 当前线程的 TLB 里攒着最新的 use/dirty 位, 先合回页表
        if let Some(space) = thread::current_thread().space() {
            space.update_page_table();
        }

        let ppn = self
            .find_match(false)
            .or_else(|| self.find_match(true))
            .or_else(|| self.find_match(false))
            .unwrap_or_else(|| {
                let ppn = self.victim;
                self.victim = (self.victim + 1) % NUM_PHYS_PAGES;
                ppn
            });

        let entry = self.entries[ppn].expect("evicting an unowned frame");
        let owner = system::thread_by_tid(entry.tid).expect("frame owner has no thread");
        logger::kdebug!('x', "evicting frame {} (tid={} vpn={})", ppn, entry.tid, entry.vpn);
        owner
            .space()
            .expect("frame owner has no address space")
            .swap_page(entry.vpn);

        ppn
    }

    // 找 use 位已清且 dirty 位匹配的帧; 扫脏页的那一轮顺带清掉
    // 路过各帧的 use 位, 给它们第二次机会
    fn find_match(&mut self, dirty: bool) -> Option<usize> {
        for _ in 0..NUM_PHYS_PAGES {
            let ppn = self.victim;
            self.victim = (self.victim + 1) % NUM_PHYS_PAGES;

            let Some(entry) = self.entries[ppn] else {
                continue;
            };
            let Some(owner) = system::thread_by_tid(entry.tid) else {
                continue;
            };
            let Some(space) = owner.space() else {
                continue;
            };

            let use_bit = space.use_bit(entry.vpn);
            let dirty_bit = space.dirty_bit(entry.vpn);
            if dirty {
                space.clear_use_bit(entry.vpn);
            }
            if !use_bit && dirty == dirty_bit {
                return Some(ppn);
            }
        }
        None
    }
}

impl Default for CoreMap {
    fn default() -> Self {
        Self::new()
    }
}
