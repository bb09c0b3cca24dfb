//! Shared harness: one simulated machine per process, so kernel
//! tests serialize on a lock and each run boots on a fresh temporary
//! disk image.

use std::panic::AssertUnwindSafe;
use std::sync::MutexGuard;

use mikos::boot::{run_kernel, testing::KERNEL_LOCK, BootOptions};

fn lock() -> MutexGuard<'static, ()> {
    // 前一个测试失败不应连坐后面的
    KERNEL_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Boot a freshly formatted kernel, run `entry` on its main thread,
/// shut down. Panics inside `entry` are rethrown after cleanup.
pub fn run_test(configure: impl FnOnce(&mut BootOptions), entry: impl FnOnce() + 'static) {
    let _guard = lock();
    let dir = tempfile::tempdir().expect("cannot create temporary disk directory");

    let mut options = BootOptions {
        disk_image: dir.path().join("DISK"),
        format: true,
        capture_console: true,
        ..BootOptions::default()
    };
    configure(&mut options);

    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| run_kernel(options, entry)));
    if let Err(panic) = outcome {
        mikos::boot::abandon();
        std::panic::resume_unwind(panic);
    }
}

/// Like [`run_test`] but reusing an existing disk image (reboots).
#[allow(dead_code)]
pub fn run_on_disk(
    disk_image: std::path::PathBuf,
    format: bool,
    entry: impl FnOnce() + 'static,
) {
    let _guard = lock();
    let options = BootOptions {
        disk_image,
        format,
        capture_console: true,
        ..BootOptions::default()
    };
    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| run_kernel(options, entry)));
    if let Err(panic) = outcome {
        mikos::boot::abandon();
        std::panic::resume_unwind(panic);
    }
}
