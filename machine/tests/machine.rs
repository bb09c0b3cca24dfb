//! The machine as the kernel sees it: memory accesses through the
//! MMU, exceptions into registered handlers, devices completing by
//! interrupt.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use machine::cpu::{Exception, BAD_VADDR_REG};
use machine::disk::SECTOR_SIZE;
use machine::mmu::{TranslationEntry, TranslationFlags};
use machine::{machine, MachineOptions, PAGE_SIZE};

// 整个进程只有一台模拟机器, 测试串行跑
static MACHINE_LOCK: Mutex<()> = Mutex::new(());

fn boot(dir: &tempfile::TempDir, use_tlb: bool) -> MutexGuard<'static, ()> {
    let guard = MACHINE_LOCK
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    machine::install(&MachineOptions {
        disk_image: dir.path().join("DISK"),
        use_tlb,
    });
    guard
}

static FAULTS: AtomicUsize = AtomicUsize::new(0);

fn count_fault(_kind: Exception) {
    FAULTS.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn memory_access_through_an_installed_page_table() {
    let dir = tempfile::tempdir().unwrap();
    let _guard = boot(&dir, false);

    let table: Vec<TranslationEntry> = (0..4)
        .map(|n| TranslationEntry {
            vpn: n,
            ppn: 3 - n,
            flags: TranslationFlags::VALID,
        })
        .collect();
    machine().mmu.install_page_table(&table);

    machine().write_mem(PAGE_SIZE + 4, 4, 0xdead_beef).unwrap();
    assert_eq!(machine().read_mem(PAGE_SIZE + 4, 4).unwrap(), 0xdead_beef);
    // 物理上落在第 2 帧
    assert_eq!(
        machine().mmu.frame(2)[4..8],
        0xdead_beefu32.to_le_bytes()
    );

    machine::teardown();
}

#[test]
fn faults_reach_the_registered_handler_and_set_bad_vaddr() {
    let dir = tempfile::tempdir().unwrap();
    let _guard = boot(&dir, true);

    FAULTS.store(0, Ordering::SeqCst);
    machine().set_handler(Exception::PageFault, count_fault);

    assert!(machine().read_mem(5 * PAGE_SIZE + 8, 4).is_err());
    assert_eq!(FAULTS.load(Ordering::SeqCst), 1);
    assert_eq!(
        machine().cpu.read_register(BAD_VADDR_REG) as usize,
        5 * PAGE_SIZE + 8
    );

    // 装好翻译后重试成功
    machine().mmu.tlb_mut()[0] = TranslationEntry {
        vpn: 5,
        ppn: 1,
        flags: TranslationFlags::VALID,
    };
    assert!(machine().read_mem(5 * PAGE_SIZE + 8, 4).is_ok());

    machine::teardown();
}

static DISK_DONE: AtomicUsize = AtomicUsize::new(0);

fn disk_done() {
    DISK_DONE.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn disk_requests_complete_by_interrupt() {
    let dir = tempfile::tempdir().unwrap();
    let _guard = boot(&dir, false);

    DISK_DONE.store(0, Ordering::SeqCst);
    machine().disk.set_handler(disk_done);

    let payload = [0x5au8; SECTOR_SIZE];
    machine().disk_write_request(9, &payload);
    assert_eq!(DISK_DONE.load(Ordering::SeqCst), 0);

    // 推进模拟时间直到完成中断到来
    machine().interrupt.idle();
    assert_eq!(DISK_DONE.load(Ordering::SeqCst), 1);

    let mut back = [0u8; SECTOR_SIZE];
    machine().disk_read_request(9, &mut back);
    machine().interrupt.idle();
    assert_eq!(DISK_DONE.load(Ordering::SeqCst), 2);
    assert_eq!(back, payload);

    machine::teardown();
}

static CONSOLE_DONE: AtomicUsize = AtomicUsize::new(0);

fn console_done() {
    CONSOLE_DONE.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn console_echoes_through_interrupts() {
    let dir = tempfile::tempdir().unwrap();
    let _guard = boot(&dir, false);

    CONSOLE_DONE.store(0, Ordering::SeqCst);
    machine().console.set_handlers(console_done, console_done);
    machine().console.capture_output();
    machine().console.feed_input(b"ab");

    machine().console_put_char(b'x');
    machine().interrupt.idle();
    assert_eq!(CONSOLE_DONE.load(Ordering::SeqCst), 1);
    assert_eq!(machine().console.take_output(), b"x");

    machine().console_request_char();
    machine().interrupt.idle();
    assert_eq!(machine().console.fetch_char(), Some(b'a'));

    machine().console_request_char();
    machine().interrupt.idle();
    assert_eq!(machine().console.fetch_char(), Some(b'b'));

    machine().console_request_char();
    machine().interrupt.idle();
    assert_eq!(machine().console.fetch_char(), None);

    machine::teardown();
}
