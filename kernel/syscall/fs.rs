//! File-related system calls.
//!
//! Descriptors 0 and 1 are wired to the console; the rest index the
//! calling thread's bounded open-file table.

use sys_interface::config::{CONSOLE_INPUT, CONSOLE_OUTPUT};
use sys_interface::syserr::{EFAIL, OK};

use super::transfer;
use crate::system;
use crate::thread;

pub(super) fn sys_create(path_addr: usize) -> i32 {
    let Some(path) = transfer::read_string_from_user(path_addr) else {
        return EFAIL;
    };
    if system::file_system().create(&path, 0) {
        OK
    } else {
        EFAIL
    }
}

pub(super) fn sys_remove(path_addr: usize) -> i32 {
    let Some(path) = transfer::read_string_from_user(path_addr) else {
        return EFAIL;
    };
    if system::file_system().remove(&path) {
        OK
    } else {
        EFAIL
    }
}

pub(super) fn sys_open(path_addr: usize) -> i32 {
    let Some(path) = transfer::read_string_from_user(path_addr) else {
        return EFAIL;
    };
    let Some(file) = system::file_system().open(&path) else {
        return EFAIL;
    };
    // 描述符表满时文件随手关闭
    match thread::current_thread().open_files().add(file) {
        Some(fd) => fd as i32,
        None => EFAIL,
    }
}

pub(super) fn sys_close(fd: usize) -> i32 {
    if fd == CONSOLE_INPUT || fd == CONSOLE_OUTPUT {
        return EFAIL;
    }
    match thread::current_thread().open_files().remove(fd) {
        Some(_) => OK,
        None => EFAIL,
    }
}

pub(super) fn sys_read(buf_addr: usize, len: usize, fd: usize) -> i32 {
    if len == 0 {
        return 0;
    }
    let mut buffer = vec![0u8; len];

    let count = if fd == CONSOLE_INPUT {
        system::synch_console().get_buffer(&mut buffer)
    } else if fd == CONSOLE_OUTPUT {
        return EFAIL;
    } else {
        match thread::current_thread().open_files().get_mut(fd) {
            Some(file) => file.read(&mut buffer),
            None => return EFAIL,
        }
    };

    transfer::write_buffer_to_user(&buffer[..count], buf_addr);
    count as i32
}

pub(super) fn sys_write(buf_addr: usize, len: usize, fd: usize) -> i32 {
    if len == 0 {
        return 0;
    }
    let mut buffer = vec![0u8; len];
    transfer::read_buffer_from_user(buf_addr, &mut buffer);

    if fd == CONSOLE_OUTPUT {
        system::synch_console().put_buffer(&buffer);
        len as i32
    } else if fd == CONSOLE_INPUT {
        EFAIL
    } else {
        match thread::current_thread().open_files().get_mut(fd) {
            Some(file) => file.write(&buffer) as i32,
            None => EFAIL,
        }
    }
}
