//! Software MMU: main memory plus virtual-to-physical translation.
//!
//! Translation runs in one of two modes, fixed when the machine is
//! built:
//!
//! * **page-table mode** — the kernel installs a resident page table and
//!   every access walks it;
//! * **TLB mode** — only the small software TLB is consulted; a miss
//!   raises a page fault for the kernel to resolve and refill.
//!
//! The `use`/`dirty` bits of whichever entry satisfied a translation are
//! updated here, which is what the frame reclaimer later reads.

use bitflags::bitflags;

use crate::cpu::Exception;
use crate::{Machine, MEMORY_SIZE, NUM_PHYS_PAGES, PAGE_SIZE, TLB_SIZE};

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct TranslationFlags: u8 {
        const VALID     = 1 << 0;
        const READ_ONLY = 1 << 1;
        /// Referenced since the bit was last cleared.
        const USE       = 1 << 2;
        /// Written since the page was brought in.
        const DIRTY     = 1 << 3;
        /// Kernel-private: the page's backing copy lives in the swap
        /// file, not the executable. Ignored by the hardware.
        const SWAP      = 1 << 4;
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TranslationEntry {
    pub vpn: usize,
    pub ppn: usize,
    pub flags: TranslationFlags,
}

impl TranslationEntry {
    pub fn is_valid(&self) -> bool {
        self.flags.contains(TranslationFlags::VALID)
    }

    pub fn is_read_only(&self) -> bool {
        self.flags.contains(TranslationFlags::READ_ONLY)
    }

    pub fn is_used(&self) -> bool {
        self.flags.contains(TranslationFlags::USE)
    }

    pub fn is_dirty(&self) -> bool {
        self.flags.contains(TranslationFlags::DIRTY)
    }

    pub fn in_swap(&self) -> bool {
        self.flags.contains(TranslationFlags::SWAP)
    }
}

pub struct Mmu {
    main_memory: Vec<u8>,
    use_tlb: bool,
    tlb: [TranslationEntry; TLB_SIZE],
    // 页表模式下常驻的页表副本
    page_table: Vec<TranslationEntry>,
}

impl Mmu {
    pub fn new(use_tlb: bool) -> Self {
        Self {
            main_memory: vec![0; MEMORY_SIZE],
            use_tlb,
            tlb: [TranslationEntry::default(); TLB_SIZE],
            page_table: Vec::new(),
        }
    }

    pub fn use_tlb(&self) -> bool {
        self.use_tlb
    }

    pub fn tlb(&self) -> &[TranslationEntry; TLB_SIZE] {
        assert!(self.use_tlb);
        &self.tlb
    }

    pub fn tlb_mut(&mut self) -> &mut [TranslationEntry; TLB_SIZE] {
        assert!(self.use_tlb);
        &mut self.tlb
    }

    /// Install `table` as the resident page table (page-table mode only).
    pub fn install_page_table(&mut self, table: &[TranslationEntry]) {
        assert!(!self.use_tlb);
        self.page_table = table.to_vec();
    }

    /// One physical frame of main memory.
    pub fn frame(&self, ppn: usize) -> &[u8] {
        assert!(ppn < NUM_PHYS_PAGES);
        &self.main_memory[ppn * PAGE_SIZE..(ppn + 1) * PAGE_SIZE]
    }

    pub fn frame_mut(&mut self, ppn: usize) -> &mut [u8] {
        assert!(ppn < NUM_PHYS_PAGES);
        &mut self.main_memory[ppn * PAGE_SIZE..(ppn + 1) * PAGE_SIZE]
    }

    /// Translate a virtual address, updating use/dirty on the entry that
    /// satisfied it.
    pub fn translate(
        &mut self,
        vaddr: usize,
        size: usize,
        writing: bool,
    ) -> Result<usize, Exception> {
        debug_assert!(size == 1 || size == 2 || size == 4);
        if vaddr % size != 0 {
            return Err(Exception::AddressError);
        }

        let vpn = vaddr / PAGE_SIZE;
        let offset = vaddr % PAGE_SIZE;

        let entry = if self.use_tlb {
            match self
                .tlb
                .iter_mut()
                .find(|e| e.is_valid() && e.vpn == vpn)
            {
                Some(entry) => entry,
                None => return Err(Exception::PageFault),
            }
        } else {
            if vpn >= self.page_table.len() {
                return Err(Exception::AddressError);
            }
            let entry = &mut self.page_table[vpn];
            if !entry.is_valid() {
                return Err(Exception::PageFault);
            }
            entry
        };

        if writing && entry.is_read_only() {
            return Err(Exception::ReadOnly);
        }

        entry.flags.insert(TranslationFlags::USE);
        if writing {
            entry.flags.insert(TranslationFlags::DIRTY);
        }

        let ppn = entry.ppn;
        if ppn >= NUM_PHYS_PAGES {
            return Err(Exception::BusError);
        }
        Ok(ppn * PAGE_SIZE + offset)
    }
}

impl Machine {
    /// Read `size` bytes (1, 2 or 4) of user memory at `vaddr`.
    ///
    /// On failure the faulting address lands in `BAD_VADDR` and the
    /// registered exception handler runs before the error returns, so
    /// the caller may simply retry once.
    pub fn read_mem(&mut self, vaddr: usize, size: usize) -> Result<u32, Exception> {
        match self.mmu.translate(vaddr, size, false) {
            Ok(paddr) => {
                let memory = &self.mmu.main_memory;
                let value = match size {
                    1 => memory[paddr] as u32,
                    2 => u16::from_le_bytes(memory[paddr..paddr + 2].try_into().unwrap()) as u32,
                    4 => u32::from_le_bytes(memory[paddr..paddr + 4].try_into().unwrap()),
                    _ => unreachable!(),
                };
                Ok(value)
            }
            Err(exception) => {
                self.cpu.write_register(crate::cpu::BAD_VADDR_REG, vaddr as u32);
                self.raise(exception);
                Err(exception)
            }
        }
    }

    /// Write `size` bytes (1, 2 or 4) of user memory at `vaddr`.
    ///
    /// Same failure contract as [`Machine::read_mem`].
    pub fn write_mem(&mut self, vaddr: usize, size: usize, value: u32) -> Result<(), Exception> {
        match self.mmu.translate(vaddr, size, true) {
            Ok(paddr) => {
                let memory = &mut self.mmu.main_memory;
                match size {
                    1 => memory[paddr] = value as u8,
                    2 => memory[paddr..paddr + 2].copy_from_slice(&(value as u16).to_le_bytes()),
                    4 => memory[paddr..paddr + 4].copy_from_slice(&value.to_le_bytes()),
                    _ => unreachable!(),
                }
                Ok(())
            }
            Err(exception) => {
                self.cpu.write_register(crate::cpu::BAD_VADDR_REG, vaddr as u32);
                self.raise(exception);
                Err(exception)
            }
        }
    }
}
