//! The dispatcher: which thread runs next.
//!
//! Ready threads wait in a 140-level priority array, FIFO within each
//! level. Every entry point below assumes interrupts are already
//! disabled — on a uniprocessor that is the mutual exclusion. Locks
//! cannot be used here: waiting for one would recurse into the
//! scheduler itself.

use std::sync::Arc;

use component::prio_array::PrioArray;
use machine::interrupt::IntStatus;
use machine::machine;

use super::{switch, Thread, ThreadStatus};
use crate::system;

pub struct Scheduler {
    ready_list: PrioArray<Arc<Thread>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            ready_list: PrioArray::new(),
        }
    }

    /// Mark `thread` ready and queue it at its current priority.
    pub fn ready_to_run(&mut self, thread: Arc<Thread>) {
        assert_eq!(machine().interrupt.level(), IntStatus::Off);
        assert_ne!(thread.status(), ThreadStatus::Running);
        logger::kdebug!('t', "putting `{}` on the ready list", thread.name());

        thread.set_status(ThreadStatus::Ready);
        let priority = thread.priority();
        self.ready_list.push(thread, priority);
    }

    /// Dequeue the most urgent ready thread, if any.
    pub fn find_next_to_run(&mut self) -> Option<Arc<Thread>> {
        assert_eq!(machine().interrupt.level(), IntStatus::Off);
        self.ready_list.pop()
    }

    /// Priority of the most urgent ready thread, without dequeuing.
    pub fn best_ready_priority(&self) -> Option<usize> {
        self.ready_list.best_priority()
    }

    /// Move a queued thread whose priority was just raised by donation
    /// from its old level to the new one. No-op if it is not queued.
    pub fn reschedule(&mut self, thread: &Arc<Thread>, old_priority: usize) {
        assert_eq!(machine().interrupt.level(), IntStatus::Off);
        if let Some(queued) = self
            .ready_list
            .remove(old_priority, |t| Arc::ptr_eq(t, thread))
        {
            let priority = queued.priority();
            self.ready_list.push(queued, priority);
        }
    }

    /// Print the ready list. For debugging.
    pub fn print(&self) {
        println!("Ready list contents:");
        self.ready_list.apply(|priority, thread| {
            println!("  [{}] `{}` tid={}", priority, thread.name(), thread.tid());
        });
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Dispatch the CPU to `next`.
///
/// The caller has already moved the current thread out of Running
/// (back to Ready for a yield, Blocked for a sleep) and holds
/// interrupts disabled. Control comes back here much later, when some
/// other thread dispatches back to us.
pub fn run(next: Arc<Thread>) {
    assert_eq!(machine().interrupt.level(), IntStatus::Off);

    // 在磁盘信号量上睡着又被同一个中断唤醒的线程, 会从就绪队列里
    // 捞出它自己; 它的栈指针槽位此刻是陈旧的, 绝不能真的切换
    if Arc::ptr_eq(&system::current(), &next) {
        next.set_status(ThreadStatus::Running);
        if let Some(corpse) = system::take_to_be_destroyed() {
            drop(corpse);
        }
        return;
    }

    // 临终线程的栈帧永远不会展开, 因此切换期间本帧不得持有任何
    // Arc<Thread>, 否则尸体的引用计数永远降不到零
    let old_sp_slot = {
        let old = system::current();

        if old.has_space() {
            // 切出用户程序: 保存用户态寄存器与地址翻译状态
            old.save_user_state();
            old.space().unwrap().save_state();
        }

        old.check_overflow();
        logger::kdebug!('t', "switching from `{}` to `{}`", old.name(), next.name());
        old.sp_slot()
    };

    next.set_status(ThreadStatus::Running);
    let next_sp = next.sp();
    system::set_current(next);

    unsafe { switch::switch(old_sp_slot, next_sp) };

    // 再次轮到旧线程: 可能已过去很久
    switch_tail();
}

/// Bookkeeping after a switch lands in a thread — shared between the
/// return path of [`run`] and the first activation of a forked thread.
pub(crate) fn switch_tail() {
    // 前一个线程若已寿终, 现在才能安全回收它的栈
    if let Some(corpse) = system::take_to_be_destroyed() {
        logger::kdebug!('t', "reaping thread `{}`", corpse.name());
        drop(corpse);
    }

    let current = system::current();
    logger::kdebug!('t', "now in thread `{}`", current.name());
    if current.has_space() {
        current.restore_user_state();
        current.space().unwrap().restore_state();
    }
}
