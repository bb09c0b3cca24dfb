//! Preemption timer.
//!
//! When time slicing is enabled, a self-rescheduling timer interrupt
//! fires at randomized intervals and asks for the running thread to be
//! preempted at the next interrupt-enable edge. Randomizing the slice
//! shakes out interleavings that a fixed quantum would never produce.

use std::sync::atomic::{AtomicU32, Ordering};

use machine::machine;

// 基础时间片
const TIMER_TICKS: u64 = 100;

static SLICE_SEED: AtomicU32 = AtomicU32::new(0);

/// Start random time slicing with `seed`. Without a seed the kernel
/// stays cooperative: threads run until they yield or block.
pub fn start(seed: Option<u32>) {
    if let Some(seed) = seed {
        logger::info!("random time slicing enabled, seed {}", seed);
        SLICE_SEED.store(seed | 1, Ordering::Relaxed);
        schedule_next();
    }
}

fn schedule_next() {
    let delay = 1 + random() % (TIMER_TICKS * 2);
    machine().interrupt.schedule("timer", delay, Box::new(tick));
}

fn tick() {
    machine().interrupt.yield_on_return();
    schedule_next();
}

// 够用的线性同余序列
fn random() -> u64 {
    let mut seed = SLICE_SEED.load(Ordering::Relaxed);
    seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
    SLICE_SEED.store(seed, Ordering::Relaxed);
    (seed >> 8) as u64
}
