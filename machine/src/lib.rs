//! The simulated MIPS machine.
//!
//! Everything the kernel treats as hardware lives here: the CPU register
//! file, main memory behind a software MMU (page table or TLB), the
//! exception plumbing, a simulated-time interrupt engine, an asynchronous
//! sector disk backed by a host file, and a character console.
//!
//! The kernel proper never touches host OS facilities directly; it talks
//! to this crate the way a real kernel talks to its board.

const LOG_LEVEL: logger::LogLevel = logger::LogLevel::INFO;

pub mod console;
pub mod cpu;
pub mod disk;
pub mod interrupt;
pub mod mmu;
pub mod stats;

use std::cell::UnsafeCell;
use std::path::PathBuf;

pub use cpu::{Cpu, Exception};
pub use mmu::{Mmu, TranslationEntry, TranslationFlags};

/// Bytes per virtual/physical page. Chosen equal to the disk sector size
/// so a page maps onto exactly one sector of backing store.
pub const PAGE_SIZE: usize = disk::SECTOR_SIZE;
/// Physical page frames in main memory.
pub const NUM_PHYS_PAGES: usize = 32;
/// Bytes of simulated main memory.
pub const MEMORY_SIZE: usize = NUM_PHYS_PAGES * PAGE_SIZE;
/// Entries in the software TLB.
pub const TLB_SIZE: usize = 4;

/// Number of exception kinds, for the handler table.
pub const NUM_EXCEPTION_KINDS: usize = 8;

/// The instruction engine: whatever makes the simulated CPU actually
/// execute user code. The decoder itself is an external collaborator;
/// the machine only drives it, one step and one clock tick at a time.
/// Tests attach scripted engines standing in for user binaries.
pub trait Engine {
    /// Execute one instruction's worth of work.
    ///
    /// Returns `false` when the machine should stop running user code.
    fn step(&mut self, machine: &mut Machine) -> bool;
}

pub struct MachineOptions {
    /// Host file holding the disk image.
    pub disk_image: PathBuf,
    /// Translate through the software TLB instead of a resident page table.
    pub use_tlb: bool,
}

pub struct Machine {
    pub cpu: Cpu,
    pub mmu: Mmu,
    pub interrupt: interrupt::Interrupt,
    pub stats: stats::Stats,
    pub disk: disk::Disk,
    pub console: console::Console,
    handlers: [Option<fn(Exception)>; NUM_EXCEPTION_KINDS],
    engine: Option<Box<dyn Engine>>,
}

impl Machine {
    fn new(options: &MachineOptions) -> Self {
        logger::reset_ticks();
        Self {
            cpu: Cpu::new(),
            mmu: Mmu::new(options.use_tlb),
            interrupt: interrupt::Interrupt::new(),
            stats: stats::Stats::default(),
            disk: disk::Disk::new(&options.disk_image),
            console: console::Console::new(),
            handlers: [None; NUM_EXCEPTION_KINDS],
            engine: None,
        }
    }

    /// Register the kernel's handler for one exception kind.
    pub fn set_handler(&mut self, kind: Exception, handler: fn(Exception)) {
        self.handlers[kind as usize] = Some(handler);
    }

    /// Raise an exception, transferring control to the registered handler.
    ///
    /// An exception nobody registered for brings the machine down: it
    /// means the kernel booted without wiring its trap table.
    pub fn raise(&mut self, kind: Exception) {
        logger::kdebug!('e', "exception: {:?}", kind);
        match self.handlers[kind as usize] {
            Some(handler) => handler(kind),
            None => panic!("unhandled machine exception: {:?}", kind),
        }
    }

    /// Attach the instruction engine that will drive user execution.
    pub fn attach_engine(&mut self, engine: Box<dyn Engine>) {
        self.engine = Some(engine);
    }

    /// Run user instructions until the engine stops.
    ///
    /// The simulated clock advances once per step, which is what makes
    /// timer preemption and device completion interrupts fire while user
    /// code is "executing".
    pub fn run(&mut self) {
        let mut engine = self
            .engine
            .take()
            .expect("no instruction engine attached to the machine");
        loop {
            self.interrupt.one_tick(interrupt::USER_TICK);
            self.stats.user_ticks += interrupt::USER_TICK;
            if !engine.step(self) {
                break;
            }
        }
    }
}

// 与教学内核一样, 硬件在进程范围内是唯一的;
// 中断处理闭包需要经由一个稳定地址找到它
struct MachineCell(UnsafeCell<Option<Machine>>);

unsafe impl Sync for MachineCell {}

static MACHINE: MachineCell = MachineCell(UnsafeCell::new(None));

/// Build the process-wide machine. Any previous machine is torn down.
pub fn install(options: &MachineOptions) {
    unsafe {
        *MACHINE.0.get() = Some(Machine::new(options));
    }
    logger::info!(
        "machine installed: {} pages of {} bytes, {} mode",
        NUM_PHYS_PAGES,
        PAGE_SIZE,
        if options.use_tlb { "TLB" } else { "page table" }
    );
}

/// Tear the machine down (end of a run; lets tests start clean).
pub fn teardown() {
    unsafe {
        *MACHINE.0.get() = None;
    }
}

/// Access the machine. The simulation is uniprocessor: exactly one thread
/// of control ever runs kernel code at a time, which is what makes the
/// single mutable reference sound in practice.
#[allow(clippy::mut_from_ref)]
pub fn machine() -> &'static mut Machine {
    unsafe {
        (*MACHINE.0.get())
            .as_mut()
            .expect("machine accessed before install")
    }
}

pub fn installed() -> bool {
    unsafe { (*MACHINE.0.get()).is_some() }
}
