#![allow(clippy::mut_from_ref)]

#[macro_use]
extern crate lazy_static;

pub mod boot;
pub mod fs;
pub mod io;
pub mod memory;
pub mod sync;
pub mod syscall;
pub mod system;
pub mod thread;
pub mod timer;
pub mod trap;

use logger::LogLevel;
const LOG_LEVEL: LogLevel = LogLevel::INFO;

// 配置信息
// ---------------------------------------------------------------------

/// 每个内核线程栈的字数 (256 KiB)
pub const STACK_WORDS: usize = 32 * 1024;

/// 栈底的金丝雀魔数, 用于检测栈溢出
pub const STACK_FENCEPOST: usize = 0xdeadbeef;

/// 线程默认优先级, nice 值在其上加减
pub const DEFAULT_PRIORITY: usize = 120;

/// 系统同时存在的线程上限
pub const MAX_THREADS: usize = 128;
