//! Limits both sides of the system-call boundary must agree on.

/// File descriptor wired to console input.
pub const CONSOLE_INPUT: usize = 0;
/// File descriptor wired to console output.
pub const CONSOLE_OUTPUT: usize = 1;

/// Slots in a per-thread open-file table, fd 0 and 1 included.
pub const MAX_OPEN_FILES: usize = 16;

/// Longest string (path or argv element) a syscall will copy in,
/// terminating NUL included.
pub const MAX_STRING_LEN: usize = 128;

/// Most argv entries `Exec` accepts.
pub const MAX_ARGS: usize = 16;

/// Bytes of user stack given to every process.
pub const USER_STACK_SIZE: usize = 1024;
