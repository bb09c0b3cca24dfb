//! The context-switch magic.
//!
//! `switch` saves the callee-saved registers of the running thread on
//! its own stack, parks the stack pointer in the old thread's TCB, and
//! resumes the next thread from its parked stack pointer. It must be
//! entered with interrupts disabled: a timer firing halfway through
//! would resume some thread with another thread's registers.

use std::arch::naked_asm;

/// Switch stacks: save callee-saved state at `*current_sp`, resume
/// from `next_sp`.
///
/// # Safety
/// `current_sp` must point at the saved-sp slot of the running
/// thread's TCB, and `next_sp` must be a stack pointer previously
/// produced by this routine or by [`plant_initial_frame`].
#[unsafe(naked)]
pub unsafe extern "C" fn switch(_current_sp: *mut usize, _next_sp: usize) {
    // RDI: 旧线程保存 rsp 的槽位; RSI: 新线程的 rsp
    naked_asm!(
        "push rbp",
        "push rbx",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "mov [rdi], rsp",
        "mov rsp, rsi",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbx",
        "pop rbp",
        "ret",
    );
}

/// Closure a freshly forked thread will run.
pub type ThreadFn = Box<dyn FnOnce()>;

/// The very beginning of every forked thread: the `ret` in `switch`
/// lands here with the closure pointer as the only thing on the stack.
#[unsafe(naked)]
unsafe extern "C" fn thread_root() {
    naked_asm!(
        "pop rdi",
        "jmp {}",
        sym thread_entry,
    );
}

extern "C" fn thread_entry(func: *mut ThreadFn) -> ! {
    // 半截上下文切换的收尾 (回收尸体, 恢复用户态状态)
    super::scheduler::switch_tail();
    machine::machine()
        .interrupt
        .set_level(machine::interrupt::IntStatus::On);

    let func = unsafe { *Box::from_raw(func) };
    func();

    super::finish();
}

// 初始帧自低向高: r15 r14 r13 r12 rbx rbp, 返回地址, 闭包指针
const INITIAL_FRAME_WORDS: usize = 8;

/// Lay out a first activation frame on `stack` so that switching to
/// the returned stack pointer enters `func` through [`thread_root`].
pub fn plant_initial_frame(stack: &mut [usize], func: ThreadFn) -> usize {
    let mut top = stack.len();

    // thread_entry 要像被 call 进入一样看到 rsp % 16 == 8
    let end_addr = unsafe { stack.as_ptr().add(top) } as usize;
    if end_addr % 16 == 0 {
        top -= 1;
    }

    let base = top - INITIAL_FRAME_WORDS;
    for slot in &mut stack[base..base + 6] {
        *slot = 0;
    }
    stack[base + 6] = thread_root as usize;
    stack[base + 7] = Box::into_raw(Box::new(func)) as usize;

    &stack[base] as *const usize as usize
}
