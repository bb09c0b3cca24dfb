//! Per-process address spaces.
//!
//! The page table covers code, initialized data, uninitialized data
//! and a fixed user stack. In page-table mode everything is resident
//! from the start; in TLB mode pages are faulted in on demand, backed
//! first by the executable image and, once evicted dirty, by the
//! process's swap file. Code-only pages fault in read-only.

use component::ceil_index;
use machine::cpu::{NEXT_PC_REG, NUM_TOTAL_REGS, PC_REG, STACK_REG};
use machine::mmu::{TranslationEntry, TranslationFlags};
use machine::{machine, PAGE_SIZE, TLB_SIZE};
use sys_interface::config::USER_STACK_SIZE;

use super::executable::Executable;
use super::swap::Swap;
use crate::fs::open_file::OpenFile;
use crate::system;
use crate::thread;

pub struct AddressSpace {
    asid: usize,
    num_pages: usize,
    page_table: Vec<TranslationEntry>,
    exe: Executable,
    swap: Option<Swap>,
    // TLB 轮转替换游标
    tlb_victim: usize,
}

impl AddressSpace {
    /// Build the space for `executable_file`, owned by thread `asid`.
    ///
    /// Demand-paged mode starts fully invalid with a fresh swap file;
    /// eager mode claims and fills every frame right here.
    pub fn new(executable_file: OpenFile, asid: usize) -> Option<Self> {
        let exe = Executable::new(executable_file)?;

        let size = exe.size() + USER_STACK_SIZE;
        let num_pages = ceil_index!(size, PAGE_SIZE);
        logger::kdebug!('a', "initializing address space: {} pages", num_pages);

        let mut space = Self {
            asid,
            num_pages,
            page_table: (0..num_pages)
                .map(|vpn| TranslationEntry {
                    vpn,
                    ppn: 0,
                    flags: TranslationFlags::empty(),
                })
                .collect(),
            exe,
            swap: None,
            tlb_victim: 0,
        };

        if machine().mmu.use_tlb() {
            space.swap = Some(Swap::new(asid));
        } else {
            space.populate_eagerly()?;
        }
        Some(space)
    }

    pub fn asid(&self) -> usize {
        self.asid
    }

    pub fn num_pages(&self) -> usize {
        self.num_pages
    }

    // 页表模式: 立刻占帧并整体装入映像
    fn populate_eagerly(&mut self) -> Option<()> {
        if system::core_map().free_frames() < self.num_pages {
            return None;
        }
        for vpn in 0..self.num_pages {
            let ppn = system::core_map().find_free_page().unwrap();
            system::core_map().register_page_for(self.asid, vpn, ppn);
            machine().mmu.frame_mut(ppn).fill(0);
            self.page_table[vpn].ppn = ppn;
            self.page_table[vpn].flags = TranslationFlags::VALID;
        }
        for vpn in 0..self.num_pages {
            let ppn = self.page_table[vpn].ppn;
            self.load_page(vpn, ppn);
            // 急切模式一页可能横跨代码和数据段, 不标只读
            self.page_table[vpn]
                .flags
                .remove(TranslationFlags::READ_ONLY);
        }
        Some(())
    }

    /// Set up the machine registers to start execution at the image
    /// entry, stack at the top of the space (minus a safety margin).
    pub fn init_registers(&self) {
        let cpu = &mut machine().cpu;
        for reg in 0..NUM_TOTAL_REGS {
            cpu.write_register(reg, 0);
        }
        cpu.write_register(PC_REG, 0);
        cpu.write_register(NEXT_PC_REG, 4);
        cpu.write_register(STACK_REG, (self.num_pages * PAGE_SIZE - 16) as u32);
        logger::kdebug!(
            'a',
            "stack register initialized to {}",
            self.num_pages * PAGE_SIZE - 16
        );
    }

    /// Leaving the CPU: drain the TLB, folding its use/dirty bits back
    /// into the page table. Nothing to save in page-table mode.
    pub fn save_state(&mut self) {
        if machine().mmu.use_tlb() {
            for _ in 0..TLB_SIZE {
                self.evict_tlb();
            }
        }
    }

    /// Taking the CPU: a clean TLB, or our page table made resident.
    pub fn restore_state(&mut self) {
        if machine().mmu.use_tlb() {
            for entry in machine().mmu.tlb_mut() {
                entry.flags.remove(TranslationFlags::VALID);
            }
        } else {
            machine().mmu.install_page_table(&self.page_table);
        }
    }

    /// The translation for `vpn`, faulting the page in if needed.
    ///
    /// `None` for a page outside the space.
    pub fn translation_entry(&mut self, vpn: usize) -> Option<&TranslationEntry> {
        debug_assert_eq!(thread::current_thread().tid(), self.asid);
        if vpn >= self.num_pages {
            return None;
        }

        if self.page_table[vpn].in_swap() {
            assert!(!self.page_table[vpn].is_valid());

            let ppn = system::core_map().find_phys_page();
            self.swap
                .as_mut()
                .expect("swap flag set without a swap file")
                .pull_swap(vpn, ppn);
            logger::kdebug!('x', "swapping in vpn={} asid={}", vpn, self.asid);

            let entry = &mut self.page_table[vpn];
            entry.ppn = ppn;
            entry.flags.insert(TranslationFlags::VALID);
            entry.flags.remove(TranslationFlags::SWAP);
            system::core_map().register_page(vpn, ppn);
        } else if !self.page_table[vpn].is_valid() {
            let ppn = system::core_map().find_phys_page();
            self.page_table[vpn].ppn = ppn;
            self.page_table[vpn].flags.insert(TranslationFlags::VALID);
            system::core_map().register_page(vpn, ppn);
            self.load_page(vpn, ppn);
        }

        Some(&self.page_table[vpn])
    }

    // 按段装入一页: 代码, 数据, 以及补零的 bss
    fn load_page(&mut self, vpn: usize, ppn: usize) {
        let page_start = vpn * PAGE_SIZE;
        let page_end = (vpn + 1) * PAGE_SIZE;

        machine().mmu.frame_mut(ppn).fill(0);

        let code_start = self.exe.code_vaddr();
        let code_end = code_start + self.exe.code_size();
        if page_start < code_end && page_end > code_start {
            let from = page_start.max(code_start);
            let to = page_end.min(code_end);
            let mut buf = vec![0u8; to - from];
            self.exe.read_code_block(&mut buf, from - code_start);
            let offset = from - page_start;
            machine().mmu.frame_mut(ppn)[offset..offset + buf.len()].copy_from_slice(&buf);
            self.page_table[vpn].flags.insert(TranslationFlags::READ_ONLY);
        }

        let data_start = self.exe.init_data_vaddr();
        let data_end = data_start + self.exe.init_data_size();
        if self.exe.init_data_size() > 0 && page_start < data_end && page_end > data_start {
            let from = page_start.max(data_start);
            let to = page_end.min(data_end);
            let mut buf = vec![0u8; to - from];
            self.exe.read_data_block(&mut buf, from - data_start);
            let offset = from - page_start;
            machine().mmu.frame_mut(ppn)[offset..offset + buf.len()].copy_from_slice(&buf);
            self.page_table[vpn].flags.remove(TranslationFlags::READ_ONLY);
        }

        // bss 与用户栈: 页帧已清零, 只需确保可写
        let bss_start = self.exe.uninit_data_vaddr();
        if page_end > bss_start {
            self.page_table[vpn].flags.remove(TranslationFlags::READ_ONLY);
        }
    }

    /// Handle a TLB miss at `vaddr`: resolve the page (possibly
    /// faulting it in) and install the translation round-robin.
    ///
    /// False when the address lies outside the space.
    pub fn tlb_miss(&mut self, vaddr: usize) -> bool {
        let vpn = vaddr / PAGE_SIZE;
        let entry = match self.translation_entry(vpn) {
            Some(entry) => *entry,
            None => return false,
        };

        let slot = self.evict_tlb();
        machine().mmu.tlb_mut()[slot] = entry;
        true
    }

    // 轮转腾出一个 TLB 槽位, 把旧住户的 use/dirty 带回页表
    fn evict_tlb(&mut self) -> usize {
        let slot = self.tlb_victim;
        self.tlb_victim = (self.tlb_victim + 1) % TLB_SIZE;

        let entry = machine().mmu.tlb_mut()[slot];
        if entry.is_valid() {
            self.page_table[entry.vpn] = entry;
            machine().mmu.tlb_mut()[slot]
                .flags
                .remove(TranslationFlags::VALID);
        }
        slot
    }

    /// Fold the TLB's use/dirty bits into the page table without
    /// invalidating anything (the reclaimer reads fresh bits).
    pub fn update_page_table(&mut self) {
        if !machine().mmu.use_tlb() {
            return;
        }
        for entry in machine().mmu.tlb() {
            if entry.is_valid() && entry.vpn < self.num_pages {
                let keep = entry.flags & (TranslationFlags::USE | TranslationFlags::DIRTY);
                self.page_table[entry.vpn].flags.insert(keep);
            }
        }
    }

    /// Page `vpn` out of memory: invalidate any TLB entry mapping it,
    /// then write the page to swap unless it is read-only (code can
    /// always be refetched from the executable).
    pub fn swap_page(&mut self, vpn: usize) {
        logger::kdebug!('x', "swapping out vpn={} asid={}", vpn, self.asid);
        assert!(self.page_table[vpn].is_valid());
        assert!(!self.page_table[vpn].in_swap());

        if machine().mmu.use_tlb() {
            for entry in machine().mmu.tlb_mut() {
                if entry.is_valid() && entry.vpn == vpn {
                    let keep = entry.flags & (TranslationFlags::USE | TranslationFlags::DIRTY);
                    self.page_table[vpn].flags.insert(keep);
                    entry.flags.remove(TranslationFlags::VALID);
                }
            }
        }

        let entry = &mut self.page_table[vpn];
        entry.flags.remove(TranslationFlags::VALID);
        if !entry.is_read_only() {
            entry.flags.insert(TranslationFlags::SWAP);
            let ppn = entry.ppn;
            self.swap
                .as_mut()
                .expect("evicting a writable page without a swap file")
                .write_swap(vpn, ppn);
        }
    }

    /// The frame a resident page occupies, if it is resident.
    pub fn resident_frame(&self, vpn: usize) -> Option<usize> {
        let entry = self.page_table.get(vpn)?;
        entry.is_valid().then_some(entry.ppn)
    }

    pub fn use_bit(&self, vpn: usize) -> bool {
        self.page_table[vpn].is_used()
    }

    pub fn dirty_bit(&self, vpn: usize) -> bool {
        self.page_table[vpn].is_dirty()
    }

    pub fn clear_use_bit(&mut self, vpn: usize) {
        self.page_table[vpn].flags.remove(TranslationFlags::USE);
    }
}
