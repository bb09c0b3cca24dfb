//! Bringing the kernel up and taking it down.
//!
//! `run_kernel` builds the machine and the kernel context, adopts the
//! calling host context as the `main` thread, runs an entry function
//! on it, and tears everything down once that function returns. The
//! boot binary and the test suite both enter through here.

use std::path::PathBuf;

use component::table::Table;
use machine::interrupt::IntStatus;
use machine::{machine, MachineOptions};

use crate::fs::file_system::FileSystem;
use crate::fs::file_table::FileTable;
use crate::fs::synch_disk::{self, SynchDisk};
use crate::io::SynchConsole;
use crate::memory::core_map::CoreMap;
use crate::system::{self, System};
use crate::thread::scheduler::Scheduler;
use crate::thread::Thread;
use crate::{io, timer, trap, MAX_THREADS};

pub struct BootOptions {
    /// Host file holding the disk image.
    pub disk_image: PathBuf,
    /// Format the disk instead of mounting what is on it.
    pub format: bool,
    /// Run user memory through the software TLB (demand paging).
    pub use_tlb: bool,
    /// Per-subsystem trace flags, e.g. "tf".
    pub debug_flags: String,
    /// Enable random time slicing with this seed.
    pub random_slice_seed: Option<u32>,
    /// Route console output to an in-memory buffer (tests).
    pub capture_console: bool,
    /// Bytes served as console input.
    pub console_input: Vec<u8>,
}

impl Default for BootOptions {
    fn default() -> Self {
        Self {
            disk_image: PathBuf::from("DISK"),
            format: false,
            use_tlb: false,
            debug_flags: String::new(),
            random_slice_seed: None,
            capture_console: false,
            console_input: Vec::new(),
        }
    }
}

/// Boot, run `entry` as the `main` kernel thread, shut down.
pub fn run_kernel(options: BootOptions, entry: impl FnOnce()) {
    initialize(&options);
    entry();
    shutdown();
}

fn initialize(options: &BootOptions) {
    logger::set_debug_flags(&options.debug_flags);

    machine::install(&MachineOptions {
        disk_image: options.disk_image.clone(),
        use_tlb: options.use_tlb,
    });
    if options.capture_console {
        machine().console.capture_output();
    }
    machine().console.feed_input(&options.console_input);

    // 主线程就是当前的宿主执行流
    let mut thread_map = Table::new(MAX_THREADS);
    let main = Thread::bootstrap_main(&mut thread_map);
    system::install(System {
        scheduler: Scheduler::new(),
        thread_map,
        current: main,
        to_be_destroyed: None,
        synch_disk: SynchDisk::new(),
        synch_console: SynchConsole::new(),
        file_table: FileTable::new(),
        core_map: CoreMap::new(),
        file_system: None,
    });

    machine().disk.set_handler(synch_disk::request_done);
    machine().console.set_handlers(io::read_avail, io::write_done);
    machine().interrupt.set_yield_hook(preempt);
    trap::install();

    machine().interrupt.set_level(IntStatus::On);

    // 文件系统最后装载, 它的初始化已经要走磁盘缓存了
    let file_system = FileSystem::new(options.format);
    system::set_file_system(file_system);

    timer::start(options.random_slice_seed);
    logger::info!("kernel initialized");
}

fn shutdown() {
    logger::info!("kernel shutting down");
    system::synch_disk().flush_all();
    if logger::debug_flag('d') {
        machine().stats.print();
    }
    machine().interrupt.set_level(IntStatus::Off);
    system::teardown();
    machine::teardown();
}

/// Stop the machine for good: flush what must survive, report, leave.
pub fn halt() -> ! {
    logger::info!("machine halting");
    system::synch_disk().flush_all();
    machine().stats.print();
    std::process::exit(0);
}

fn preempt() {
    crate::thread::yield_cpu();
}

/// Test support: force everything down after a failed run, so the
/// next test starts from nothing.
pub fn abandon() {
    if system::booted() {
        system::teardown();
    }
    if machine::installed() {
        machine::teardown();
    }
}

/// Support for the test suite: one simulated machine per process, so
/// kernel-level tests serialize on this lock.
pub mod testing {
    use std::sync::Mutex;

    lazy_static! {
        pub static ref KERNEL_LOCK: Mutex<()> = Mutex::new(());
    }
}
