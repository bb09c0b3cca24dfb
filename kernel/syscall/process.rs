//! Process-lifecycle system calls: exec, join, ps.

use machine::cpu::{A0_REG, A1_REG, STACK_REG};
use machine::machine;
use sys_interface::config::MAX_ARGS;
use sys_interface::syserr::{EFAIL, OK};

use super::transfer;
use crate::memory::address_space::AddressSpace;
use crate::system;
use crate::thread::{self, Thread};

/// Launch the executable at `path` as a new joinable process,
/// returning its tid.
pub(super) fn sys_exec(path_addr: usize, argv_addr: usize) -> i32 {
    let Some(path) = transfer::read_string_from_user(path_addr) else {
        return EFAIL;
    };
    let Some(executable) = system::file_system().open(&path) else {
        return EFAIL;
    };

    let argv = match read_argv(argv_addr) {
        Some(argv) => argv,
        None => return EFAIL,
    };

    let Some(child) = Thread::new(&path, true) else {
        return EFAIL;
    };
    let tid = child.tid();

    let Some(space) = AddressSpace::new(executable, tid) else {
        // 地址空间建不起来, 线程位子也退回去
        system::thread_map().remove(tid);
        return EFAIL;
    };
    child.set_space(space);

    logger::kdebug!('e', "exec {} as tid={}", path, tid);
    child.fork(Box::new(move || run_user_program(argv)));
    tid as i32
}

// 从用户空间搬 argv 指针数组与各字符串
fn read_argv(argv_addr: usize) -> Option<Vec<String>> {
    let mut argv = Vec::new();
    if argv_addr == 0 {
        return Some(argv);
    }
    for i in 0..MAX_ARGS {
        let ptr = transfer::read_word_from_user(argv_addr + i * 4) as usize;
        if ptr == 0 {
            return Some(argv);
        }
        argv.push(transfer::read_string_from_user(ptr)?);
    }
    None
}

/// First steps of an exec'd thread: registers, translation state, and
/// argv copied onto the new user stack; then hand over to the CPU.
fn run_user_program(argv: Vec<String>) {
    let current = thread::current_thread();
    let space = current.space().expect("user thread without an address space");

    space.init_registers();
    space.restore_state();

    if !argv.is_empty() {
        let mut sp = machine().cpu.read_register(STACK_REG) as usize;

        // 字符串压栈, 记下各自地址
        let mut arg_addrs = Vec::new();
        for arg in argv.iter().rev() {
            sp -= arg.len() + 1;
            transfer::write_string_to_user(arg, sp);
            arg_addrs.push(sp);
        }
        arg_addrs.reverse();

        // 指针数组 (含收尾的空指针), 4 字节对齐
        sp &= !3;
        sp -= (arg_addrs.len() + 1) * 4;
        for (i, addr) in arg_addrs.iter().enumerate() {
            transfer::write_word_to_user(sp + i * 4, *addr as u32);
        }
        transfer::write_word_to_user(sp + arg_addrs.len() * 4, 0);

        machine().cpu.write_register(A0_REG, argv.len() as u32);
        machine().cpu.write_register(A1_REG, sp as u32);
        machine().cpu.write_register(STACK_REG, (sp - 16) as u32);
    }

    drop(current);
    machine().run();
}

/// Wait for thread `tid` and return its exit status.
pub(super) fn sys_join(tid: usize) -> i32 {
    match system::thread_by_tid(tid) {
        Some(target) => target.join(),
        None => EFAIL,
    }
}

/// Print the thread population.
pub(super) fn sys_ps() -> i32 {
    println!("Threads:");
    system::thread_map().apply(|tid, thread| {
        println!(
            "    tid: {}, name: `{}`, status: {:?}, priority: {}",
            tid,
            thread.name(),
            thread.status(),
            thread.priority()
        );
    });
    system::scheduler().print();
    OK
}
