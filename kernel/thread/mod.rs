//! Kernel threads.
//!
//! A thread is a stack, the saved machine state needed to resume it,
//! and bookkeeping: scheduling status, priority, an optional join
//! channel, and (for user processes) an address space and open-file
//! table. Exactly one thread runs at a time on the simulated CPU.
//!
//! The four core operations are `fork`, `yield_cpu`, `sleep`, and
//! `finish`. A thread can never free its own stack: a finishing
//! thread parks itself in the to-be-destroyed slot and the *next*
//! thread to run reaps it after the switch.

pub mod scheduler;
pub mod switch;

use std::cell::Cell;
use std::sync::Arc;

use component::table::Table;
use machine::cpu::NUM_TOTAL_REGS;
use machine::interrupt::IntStatus;
use machine::machine;

use crate::fs::open_file::OpenFile;
use crate::memory::address_space::AddressSpace;
use crate::sync::channel::Channel;
use crate::sync::unicore::UPSafeCell;
use crate::system;
use crate::{DEFAULT_PRIORITY, STACK_FENCEPOST, STACK_WORDS};

pub type Tid = usize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadStatus {
    JustCreated,
    Ready,
    Running,
    Blocked,
}

pub struct Thread {
    tid: Cell<Tid>,
    name: String,
    joinable: bool,
    join_channel: Option<Channel>,
    inner: UPSafeCell<ThreadInner>,
}

struct ThreadInner {
    status: ThreadStatus,
    priority: usize,
    has_joined: bool,
    // 上下文切换时停放的栈指针
    sp: usize,
    // 被收编的 main 线程没有自己分配的栈
    stack: Option<Box<[usize]>>,
    user_registers: [u32; NUM_TOTAL_REGS],
    space: Option<AddressSpace>,
    open_files: Table<OpenFile>,
    current_directory: Option<OpenFile>,
}

impl ThreadInner {
    fn new() -> Self {
        Self {
            status: ThreadStatus::JustCreated,
            priority: DEFAULT_PRIORITY,
            has_joined: false,
            sp: 0,
            stack: None,
            user_registers: [0; NUM_TOTAL_REGS],
            space: None,
            open_files: Table::new(sys_interface::config::MAX_OPEN_FILES),
            current_directory: None,
        }
    }
}

impl Thread {
    /// Create a thread ready to be forked.
    ///
    /// Returns `None` when the thread table is full.
    pub fn new(name: &str, joinable: bool) -> Option<Arc<Thread>> {
        let thread = Arc::new(Thread {
            tid: Cell::new(0),
            name: String::from(name),
            joinable,
            join_channel: joinable.then(|| Channel::new("join")),
            inner: unsafe { UPSafeCell::new(ThreadInner::new()) },
        });

        let tid = system::thread_map().add(thread.clone())?;
        thread.tid.set(tid);
        logger::kdebug!('t', "created thread `{}` tid={}", name, tid);
        Some(thread)
    }

    /// Adopt the booting host context as the `main` thread.
    ///
    /// Called once while the system context is still being built, so
    /// the thread table is passed in rather than found globally.
    pub(crate) fn bootstrap_main(thread_map: &mut Table<Arc<Thread>>) -> Arc<Thread> {
        let main = Arc::new(Thread {
            tid: Cell::new(0),
            name: String::from("main"),
            joinable: false,
            join_channel: None,
            inner: unsafe { UPSafeCell::new(ThreadInner::new()) },
        });
        main.inner.exclusive_access().status = ThreadStatus::Running;
        let tid = thread_map.add(main.clone()).unwrap();
        main.tid.set(tid);
        main
    }

    pub fn tid(&self) -> Tid {
        self.tid.get()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_joinable(&self) -> bool {
        self.joinable
    }

    pub fn status(&self) -> ThreadStatus {
        self.inner.exclusive_access().status
    }

    pub fn set_status(&self, status: ThreadStatus) {
        self.inner.exclusive_access().status = status;
    }

    pub fn priority(&self) -> usize {
        self.inner.exclusive_access().priority
    }

    /// Nice value: signed offset from the default priority.
    pub fn get_nice(&self) -> isize {
        self.priority() as isize - DEFAULT_PRIORITY as isize
    }

    /// Change priority by nice value; lower means more favored.
    pub fn nice(&self, nice: isize) {
        assert!((-20..20).contains(&nice), "nice {} out of range", nice);
        logger::kdebug!(
            't',
            "`{}` priority {} -> {}",
            self.name,
            self.priority(),
            (DEFAULT_PRIORITY as isize + nice)
        );
        self.inner.exclusive_access().priority = (DEFAULT_PRIORITY as isize + nice) as usize;
    }

    /// Start `func` running concurrently with the caller.
    pub fn fork(self: &Arc<Self>, func: switch::ThreadFn) {
        logger::kdebug!('t', "forking thread `{}`", self.name);

        {
            let mut inner = self.inner.exclusive_access();
            assert_eq!(inner.status, ThreadStatus::JustCreated);
            let mut stack = vec![0usize; STACK_WORDS].into_boxed_slice();
            stack[0] = STACK_FENCEPOST;
            inner.sp = switch::plant_initial_frame(&mut stack, func);
            inner.stack = Some(stack);
        }

        let old = machine().interrupt.set_level(IntStatus::Off);
        system::scheduler().ready_to_run(self.clone());
        machine().interrupt.set_level(old);
    }

    /// Wait for this (joinable) thread to finish; returns its status.
    pub fn join(&self) -> i32 {
        assert!(self.joinable, "join on non-joinable thread `{}`", self.name);
        {
            let mut inner = self.inner.exclusive_access();
            assert!(!inner.has_joined, "thread `{}` joined twice", self.name);
            inner.has_joined = true;
        }
        self.join_channel.as_ref().unwrap().receive()
    }

    /// Panic if the stack has overrun its fencepost.
    pub fn check_overflow(&self) {
        let inner = self.inner.exclusive_access();
        if let Some(stack) = inner.stack.as_ref() {
            assert_eq!(
                stack[0], STACK_FENCEPOST,
                "thread `{}` overflowed its stack",
                self.name
            );
        }
    }

    pub(crate) fn sp(&self) -> usize {
        self.inner.exclusive_access().sp
    }

    pub(crate) fn sp_slot(&self) -> *mut usize {
        &mut self.inner.exclusive_access().sp as *mut usize
    }

    // ------------------------------------------------------------------
    // 用户进程状态

    pub fn has_space(&self) -> bool {
        self.inner.exclusive_access().space.is_some()
    }

    /// The thread's address space.
    ///
    /// 借用手法与单核内核一致: 从内部结构中取裸指针再还原,
    /// 调用者保证不跨上下文切换地持有两个可变引用
    pub fn space(&self) -> Option<&'static mut AddressSpace> {
        let mut inner = self.inner.exclusive_access();
        inner
            .space
            .as_mut()
            .map(|space| unsafe { &mut *(space as *mut AddressSpace) })
    }

    pub fn set_space(&self, space: AddressSpace) {
        self.inner.exclusive_access().space = Some(space);
    }

    pub fn take_space(&self) -> Option<AddressSpace> {
        self.inner.exclusive_access().space.take()
    }

    pub fn open_files(&self) -> &'static mut Table<OpenFile> {
        let mut inner = self.inner.exclusive_access();
        let table = &mut inner.open_files as *mut Table<OpenFile>;
        unsafe { &mut *table }
    }

    pub fn current_directory(&self) -> Option<&'static mut OpenFile> {
        let mut inner = self.inner.exclusive_access();
        inner
            .current_directory
            .as_mut()
            .map(|dir| unsafe { &mut *(dir as *mut OpenFile) })
    }

    pub fn set_current_directory(&self, dir: Option<OpenFile>) {
        self.inner.exclusive_access().current_directory = dir;
    }

    /// Stash the user-mode register set across a context switch.
    pub fn save_user_state(&self) {
        let mut inner = self.inner.exclusive_access();
        for (reg, slot) in inner.user_registers.iter_mut().enumerate() {
            *slot = machine().cpu.read_register(reg);
        }
    }

    /// Bring the user-mode register set back.
    pub fn restore_user_state(&self) {
        let inner = self.inner.exclusive_access();
        for (reg, value) in inner.user_registers.iter().enumerate() {
            machine().cpu.write_register(reg, *value);
        }
    }
}

// ----------------------------------------------------------------------
// 作用于当前线程的操作

pub fn current_thread() -> Arc<Thread> {
    system::current()
}

/// Relinquish the CPU if an at-least-as-urgent thread is ready.
///
/// A yield never hands the CPU down to a less urgent thread: that
/// would let a polite high-priority thread be starved by its own
/// courtesy, and it is what makes the strict completion order of the
/// priority levels observable.
pub fn yield_cpu() {
    let old = machine().interrupt.set_level(IntStatus::Off);

    let current = current_thread();
    logger::kdebug!('t', "`{}` yields", current.name());
    let worth_switching = matches!(
        system::scheduler().best_ready_priority(),
        Some(best) if best <= current.priority()
    );
    if worth_switching {
        let next = system::scheduler().find_next_to_run().unwrap();
        system::scheduler().ready_to_run(current);
        scheduler::run(next);
    }

    machine().interrupt.set_level(old);
}

/// Relinquish the CPU until somebody puts us back on the ready queue.
///
/// The caller must have disabled interrupts and already moved the
/// current thread out of the Running state. With nothing ready, the
/// machine idles until an interrupt delivers a runnable thread.
pub fn sleep() {
    assert_eq!(machine().interrupt.level(), IntStatus::Off);
    {
        // 引用不跨切换持有 (见 scheduler::run 的注释)
        let current = current_thread();
        assert_ne!(current.status(), ThreadStatus::Running);
        logger::kdebug!('t', "`{}` sleeps", current.name());
    }

    loop {
        match system::scheduler().find_next_to_run() {
            Some(next) => {
                scheduler::run(next);
                return;
            }
            None => machine().interrupt.idle(),
        }
    }
}

// 打开的文件与工作目录趁线程还活着关闭;
// 尸体回收阶段运行在关中断的别人栈上, 不能再做磁盘 I/O
fn release_resources(current: &Arc<Thread>) {
    let files = current.open_files();
    for fd in 0..files.capacity() {
        let _ = files.remove(fd);
    }
    current.set_current_directory(None);
}

/// Called when a forked thread's function returns.
pub fn finish() -> ! {
    let current = current_thread();

    if let Some(channel) = current.join_channel.as_ref() {
        logger::kdebug!('t', "`{}` reporting to its joiner", current.name());
        channel.send(0);
    }

    release_resources(&current);

    machine().interrupt.set_level(IntStatus::Off);
    logger::kdebug!('t', "finishing thread `{}`", current.name());

    system::thread_map().remove(current.tid());
    current.set_status(ThreadStatus::Blocked);
    // 把自己的引用整个移交给待回收槽, 本帧不再持有
    system::set_to_be_destroyed(current);
    sleep();
    unreachable!("reaped thread came back to life");
}

/// Exit invoked from user space, with a status for the joiner.
pub fn exit(status: i32) -> ! {
    let current = current_thread();
    logger::kdebug!('t', "`{}` exits with status {}", current.name(), status);

    if let Some(channel) = current.join_channel.as_ref() {
        channel.send(status);
    }

    release_resources(&current);

    // 地址空间是最后一口气里释放的: 交还物理页帧, 删除交换文件.
    // 这些会做磁盘 I/O, 必须发生在尸体回收之前
    if current.has_space() {
        system::core_map().free_all(current.tid());
        drop(current.take_space());
    }

    if current.name() == "main" {
        // 主线程正常退出才停机; 带着错误码死掉说明内核自身出了事
        assert_eq!(status, 0, "main thread exited with status {}", status);
        crate::boot::halt();
    }

    machine().interrupt.set_level(IntStatus::Off);
    system::thread_map().remove(current.tid());
    current.set_status(ThreadStatus::Blocked);
    // 同 finish: 引用移交待回收槽
    system::set_to_be_destroyed(current);
    sleep();
    unreachable!("reaped thread came back to life");
}
