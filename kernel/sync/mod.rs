//! Synchronization primitives, built strictly bottom-up:
//! the semaphore's only atomic foundation is interrupt disabling,
//! locks are a semaphore plus ownership (and optional priority
//! donation), conditions and channels are built from those.

pub mod channel;
pub mod condition;
pub mod lock;
pub mod semaphore;
pub mod unicore;

pub use channel::Channel;
pub use condition::Condition;
pub use lock::Lock;
pub use semaphore::Semaphore;
pub use unicore::UPSafeCell;
