use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// 内核日志: 所有宏打印形如
/// [       79 ticks][INFO]   [kernel] frame allocator initialized
/// 时间戳来自模拟时钟, 而非真实硬件

// 模拟时间, 由中断机构推进
static TICKS: AtomicU64 = AtomicU64::new(0);

// 子系统调试开关位图, 下标是 flag 字符
static DEBUG_FLAGS: AtomicU32 = AtomicU32::new(0);

#[derive(Debug)]
pub enum Color {
    Red = 31,
    Yellow = 93,
    Blue = 35,
    Green = 32,
    Gray = 34,
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    ERROR = 50,
    WARN = 40,
    INFO = 30,
    DEBUG = 20,
    TRACE = 10,
}

/// Current simulated time, in ticks.
pub fn logger_now() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

/// Advance the simulated clock. Called by the interrupt machinery only.
pub fn advance_ticks(n: u64) -> u64 {
    TICKS.fetch_add(n, Ordering::Relaxed) + n
}

/// Reset the simulated clock. Called when a fresh machine is built.
pub fn reset_ticks() {
    TICKS.store(0, Ordering::Relaxed);
}

/// Per-subsystem debug flags, in the tradition of kernel debug strings:
/// 't' threads, 'a' address spaces, 'f' filesystem, 'e' syscalls,
/// 'x' virtual memory, '+' everything.
pub fn set_debug_flags(flags: &str) {
    let mut mask = 0u32;
    for c in flags.chars() {
        mask |= flag_bit(c);
    }
    DEBUG_FLAGS.store(mask, Ordering::Relaxed);
}

pub fn debug_flag(c: char) -> bool {
    let mask = DEBUG_FLAGS.load(Ordering::Relaxed);
    mask & flag_bit('+') != 0 || mask & flag_bit(c) != 0
}

fn flag_bit(c: char) -> u32 {
    match c {
        't' => 1 << 0,
        'a' => 1 << 1,
        'f' => 1 << 2,
        'e' => 1 << 3,
        'x' => 1 << 4,
        'd' => 1 << 5,
        '+' => 1 << 31,
        _ => 0,
    }
}

pub fn logger_print(args: fmt::Arguments) {
    // 打到 stderr, 不与被测程序的正常输出混流
    let _ = std::io::stderr().write_fmt(args);
}

/// 通用打印, 由各级别宏转发
#[macro_export]
macro_rules! log {
    ($color:expr, $level:literal, $($arg:tt)*) => {
        $crate::logger_print(format_args!(
            "\x1B[90m[{:>10} ticks]\x1B[0m\x1B[{}m[{}]\t[kernel] {}\x1B[0m\n",
            $crate::logger_now(), ($color as i32), $level, format_args!($($arg)*)))
    }
}

/// 宏定义中加 $ 和不加 $ 区别:
/// 加 $ 的 $crate 在 logger crate 中寻找;
/// 不加的 crate::LOG_LEVEL 由使用方 crate 自定义, 用以控制打印层级
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        if $crate::LogLevel::ERROR >= crate::LOG_LEVEL {
            $crate::log!($crate::Color::Red, "ERROR", $($arg)*)
        }
    }
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        if $crate::LogLevel::WARN >= crate::LOG_LEVEL {
            $crate::log!($crate::Color::Yellow, "WARN", $($arg)*)
        }
    }
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        if $crate::LogLevel::INFO >= crate::LOG_LEVEL {
            $crate::log!($crate::Color::Blue, "INFO", $($arg)*)
        }
    }
}

#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        if $crate::LogLevel::DEBUG >= crate::LOG_LEVEL {
            $crate::log!($crate::Color::Green, "DEBUG", $($arg)*)
        }
    }
}

#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        if $crate::LogLevel::TRACE >= crate::LOG_LEVEL {
            $crate::log!($crate::Color::Gray, "TRACE", $($arg)*)
        }
    }
}

/// Subsystem trace, gated by [`set_debug_flags`] rather than the level.
#[macro_export]
macro_rules! kdebug {
    ($flag:literal, $($arg:tt)*) => {
        if $crate::debug_flag($flag) {
            $crate::log!($crate::Color::Gray, "DEBUG", $($arg)*)
        }
    }
}
