//! The kernel's global context.
//!
//! A kernel unavoidably has process-wide singletons: the scheduler,
//! the open-file table, the frame reclaimer, the running thread. They
//! live together in one `System` built at boot and torn down at halt;
//! interrupt handlers find it through a stable address, which is why
//! the cell below hands out `'static` access the same way the
//! uniprocessor cells elsewhere in this kernel do.

use std::cell::UnsafeCell;
use std::sync::Arc;

use component::table::Table;

use crate::fs::file_system::FileSystem;
use crate::fs::file_table::FileTable;
use crate::fs::synch_disk::SynchDisk;
use crate::io::SynchConsole;
use crate::memory::core_map::CoreMap;
use crate::thread::scheduler::Scheduler;
use crate::thread::{Thread, Tid};

pub struct System {
    pub scheduler: Scheduler,
    pub thread_map: Table<Arc<Thread>>,
    pub current: Arc<Thread>,
    // 一格停尸位: 线程不能释放自己的栈, 由下一个运行的线程收殓
    pub to_be_destroyed: Option<Arc<Thread>>,
    pub synch_disk: SynchDisk,
    pub synch_console: SynchConsole,
    pub file_table: FileTable,
    pub core_map: CoreMap,
    // 文件系统依赖磁盘缓存, 在其余部分就位后才装入
    pub file_system: Option<FileSystem>,
}

struct SystemCell(UnsafeCell<Option<System>>);

unsafe impl Sync for SystemCell {}

lazy_static! {
    static ref SYSTEM: SystemCell = SystemCell(UnsafeCell::new(None));
}

pub(crate) fn install(system: System) {
    let cell = unsafe { &mut *SYSTEM.0.get() };
    assert!(cell.is_none(), "kernel context installed twice");
    *cell = Some(system);
}

pub(crate) fn teardown() {
    let cell = unsafe { &mut *SYSTEM.0.get() };
    if let Some(system) = cell.as_mut() {
        // 文件系统先卸下来, 它的两个常开句柄要走打开文件表的
        // 正常关闭路径; 其余句柄在上下文清空后静默作废
        system.file_system.take();
    }
    let retired = cell.take();
    drop(retired);
}

fn system() -> &'static mut System {
    unsafe {
        (*SYSTEM.0.get())
            .as_mut()
            .expect("kernel context accessed before boot")
    }
}

pub fn booted() -> bool {
    unsafe { (*SYSTEM.0.get()).is_some() }
}

// ----------------------------------------------------------------------
// 各单例的访问入口

pub fn scheduler() -> &'static mut Scheduler {
    &mut system().scheduler
}

pub fn thread_map() -> &'static mut Table<Arc<Thread>> {
    &mut system().thread_map
}

pub fn current() -> Arc<Thread> {
    system().current.clone()
}

pub fn set_current(thread: Arc<Thread>) {
    system().current = thread;
}

pub fn thread_by_tid(tid: Tid) -> Option<Arc<Thread>> {
    system().thread_map.get(tid).cloned()
}

pub fn set_to_be_destroyed(thread: Arc<Thread>) {
    let slot = &mut system().to_be_destroyed;
    // 槽位若还占着, 说明上一具尸体至今没有线程经过回收点;
    // 顶替它也安全, 旧尸体的栈早已无人使用
    *slot = Some(thread);
}

pub fn take_to_be_destroyed() -> Option<Arc<Thread>> {
    system().to_be_destroyed.take()
}

pub fn synch_disk() -> &'static mut SynchDisk {
    &mut system().synch_disk
}

pub fn synch_console() -> &'static mut SynchConsole {
    &mut system().synch_console
}

pub fn file_table() -> &'static mut FileTable {
    &mut system().file_table
}

pub fn core_map() -> &'static mut CoreMap {
    &mut system().core_map
}

pub fn file_system() -> &'static mut FileSystem {
    system()
        .file_system
        .as_mut()
        .expect("filesystem accessed before it was mounted")
}

pub(crate) fn set_file_system(file_system: FileSystem) {
    system().file_system = Some(file_system);
}
