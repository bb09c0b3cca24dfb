use std::cell::{RefCell, RefMut};

/// Interior mutability for a kernel with exactly one execution flow.
///
/// The simulated CPU is single-core and the kernel is cooperative, so
/// data races cannot happen by construction. What can still happen is
/// an overlapping borrow within the one flow — say, an interrupt
/// handler reaching for a structure the interrupted path is holding —
/// and the inner `RefCell` turns that into an immediate panic instead
/// of silent corruption.
pub struct UPSafeCell<T> {
    inner: RefCell<T>,
}

// 单核模拟机上内核态只有一个执行流, 据此担保 Sync,
// 这样各个全局单例才能安置这个类型
unsafe impl<T> Sync for UPSafeCell<T> {}

impl<T> UPSafeCell<T> {
    /// 调用者承诺两件事: 不会有第二个执行流碰它,
    /// 借用也必须在下一次上下文切换之前归还
    pub unsafe fn new(value: T) -> Self {
        Self {
            inner: RefCell::new(value),
        }
    }

    /// Borrow the contents exclusively.
    ///
    /// Always `borrow_mut`, even for reads — one borrow at a time
    /// keeps the discipline checkable. A few hot paths
    /// (`Thread::space`, `Thread::open_files`) deliberately escape it
    /// by casting a field to a raw pointer before the guard drops;
    /// those `&'static mut` escapes stay sound only because no guard
    /// is ever held across a context switch.
    pub fn exclusive_access(&self) -> RefMut<'_, T> {
        self.inner.borrow_mut()
    }
}
