//! The system-call dispatcher.
//!
//! A user program traps in with the call number in r2 and arguments
//! in r4..r7; whatever comes back lands in r2 and the program counters
//! step past the trapping instruction. Expected failures surface as
//! −1; nothing here panics on bad user input.

pub mod fs;
pub mod process;
pub mod transfer;

use machine::cpu::{Exception, A0_REG, A1_REG, A2_REG, V0_REG};
use machine::machine;
use sys_interface::syscall::*;
use sys_interface::syserr;

pub(crate) fn dispatch(_kind: Exception) {
    machine().stats.syscalls += 1;
    let id = machine().cpu.read_register(V0_REG);
    let arg0 = machine().cpu.read_register(A0_REG) as usize;
    let arg1 = machine().cpu.read_register(A1_REG) as usize;
    let arg2 = machine().cpu.read_register(A2_REG) as usize;

    logger::kdebug!('e', "syscall {} ({:#x}, {:#x}, {:#x})", id, arg0, arg1, arg2);

    let result = match id {
        SYSCALL_HALT => crate::boot::halt(),
        SYSCALL_EXIT => crate::thread::exit(arg0 as i32),
        SYSCALL_EXEC => process::sys_exec(arg0, arg1),
        SYSCALL_JOIN => process::sys_join(arg0),
        SYSCALL_PS => process::sys_ps(),
        SYSCALL_CREATE => fs::sys_create(arg0),
        SYSCALL_REMOVE => fs::sys_remove(arg0),
        SYSCALL_OPEN => fs::sys_open(arg0),
        SYSCALL_CLOSE => fs::sys_close(arg0),
        SYSCALL_READ => fs::sys_read(arg0, arg1, arg2),
        SYSCALL_WRITE => fs::sys_write(arg0, arg1, arg2),
        _ => {
            logger::error!("unknown syscall {}", id);
            syserr::EFAIL
        }
    };

    machine().cpu.write_register(V0_REG, result as u32);
    machine().cpu.advance_pc();
}
