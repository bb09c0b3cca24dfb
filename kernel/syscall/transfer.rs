//! Moving bytes across the user/kernel boundary.
//!
//! Every copy goes through the MMU one byte at a time. Under demand
//! paging a failed access already ran the page-fault handler by the
//! time it returns, so one retry must succeed; a second failure (or
//! any failure with a resident page table) is a kernel bug.

use machine::machine;
use sys_interface::config::MAX_STRING_LEN;

fn read_user_byte(addr: usize) -> u8 {
    match machine().read_mem(addr, 1) {
        Ok(value) => value as u8,
        Err(_) => {
            assert!(
                machine().mmu.use_tlb(),
                "user memory read failed at {:#x}",
                addr
            );
            // 缺页处理已经跑过, 重试一次必须成功
            machine()
                .read_mem(addr, 1)
                .expect("user memory read failed after page-in") as u8
        }
    }
}

fn write_user_byte(addr: usize, value: u8) {
    if machine().write_mem(addr, 1, value as u32).is_err() {
        assert!(
            machine().mmu.use_tlb(),
            "user memory write failed at {:#x}",
            addr
        );
        machine()
            .write_mem(addr, 1, value as u32)
            .expect("user memory write failed after page-in");
    }
}

/// Copy `buffer.len()` bytes in from user address `addr`.
pub fn read_buffer_from_user(addr: usize, buffer: &mut [u8]) {
    assert_ne!(addr, 0);
    for (i, slot) in buffer.iter_mut().enumerate() {
        *slot = read_user_byte(addr + i);
    }
}

/// Copy in a NUL-terminated string of at most `MAX_STRING_LEN` bytes.
///
/// `None` when no terminator shows up in time.
pub fn read_string_from_user(addr: usize) -> Option<String> {
    assert_ne!(addr, 0);
    let mut bytes = Vec::new();
    for i in 0..MAX_STRING_LEN {
        match read_user_byte(addr + i) {
            0 => return Some(String::from_utf8_lossy(&bytes).into_owned()),
            b => bytes.push(b),
        }
    }
    None
}

/// Copy `buffer` out to user address `addr`.
pub fn write_buffer_to_user(buffer: &[u8], addr: usize) {
    assert_ne!(addr, 0);
    for (i, byte) in buffer.iter().enumerate() {
        write_user_byte(addr + i, *byte);
    }
}

/// Copy `string` and its terminating NUL out to user address `addr`.
pub fn write_string_to_user(string: &str, addr: usize) {
    assert_ne!(addr, 0);
    write_buffer_to_user(string.as_bytes(), addr);
    write_user_byte(addr + string.len(), 0);
}

/// Read a 32-bit word of user memory (argv walks).
pub fn read_word_from_user(addr: usize) -> u32 {
    match machine().read_mem(addr, 4) {
        Ok(value) => value,
        Err(_) => {
            assert!(
                machine().mmu.use_tlb(),
                "user memory read failed at {:#x}",
                addr
            );
            machine()
                .read_mem(addr, 4)
                .expect("user memory read failed after page-in")
        }
    }
}

/// Write a 32-bit word of user memory (argv construction).
pub fn write_word_to_user(addr: usize, value: u32) {
    if machine().write_mem(addr, 4, value).is_err() {
        assert!(
            machine().mmu.use_tlb(),
            "user memory write failed at {:#x}",
            addr
        );
        machine()
            .write_mem(addr, 4, value)
            .expect("user memory write failed after page-in");
    }
}
