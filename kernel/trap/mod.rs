//! Exception dispatch.
//!
//! The machine calls back into the kernel here: syscalls go to the
//! dispatcher, page faults to the current address space, and anything
//! else is fatal to the offending process.

use machine::cpu::{Exception, BAD_VADDR_REG};
use machine::machine;

use crate::syscall;
use crate::thread;

/// Wire every exception kind to its handler. Called once at boot.
pub fn install() {
    let m = machine();
    m.set_handler(Exception::Syscall, syscall::dispatch);
    m.set_handler(Exception::PageFault, page_fault);
    for kind in [
        Exception::ReadOnly,
        Exception::BusError,
        Exception::AddressError,
        Exception::Overflow,
        Exception::IllegalInstr,
    ] {
        m.set_handler(kind, fatal);
    }
}

fn page_fault(_kind: Exception) {
    machine().stats.page_faults += 1;
    let vaddr = machine().cpu.read_register(BAD_VADDR_REG) as usize;

    if !machine().mmu.use_tlb() {
        // 页表常驻时不该有缺页
        fatal(Exception::PageFault);
        return;
    }

    let current = thread::current_thread();
    let space = current
        .space()
        .expect("page fault from a thread without an address space");
    if !space.tlb_miss(vaddr) {
        logger::error!(
            "`{}` faulted outside its address space at {:#x}",
            current.name(),
            vaddr
        );
        drop(current);
        thread::exit(sys_interface::syserr::EFAIL);
    }
}

// 意外的机器异常对进程是致命的
fn fatal(kind: Exception) {
    let current = thread::current_thread();
    logger::error!("`{}` died on exception: {:?}", current.name(), kind);
    drop(current);
    thread::exit(sys_interface::syserr::EFAIL);
}
