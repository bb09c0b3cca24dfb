//! The synchronous disk and its sector cache.

mod common;

use common::{run_on_disk, run_test};
use machine::disk::{NUM_SECTORS, SECTOR_SIZE};
use mikos::system;
use mikos::thread::Thread;

fn stamp(tag: u8) -> [u8; SECTOR_SIZE] {
    let mut data = [0u8; SECTOR_SIZE];
    for (i, b) in data.iter_mut().enumerate() {
        *b = tag ^ (i as u8);
    }
    data
}

/// A read observes the latest cached write for its sector, whether or
/// not that write has reached the disk yet.
#[test]
fn reads_see_latest_write() {
    run_test(|_| {}, || {
        let disk = system::synch_disk();
        let sector = 500;

        disk.write_sector(sector, &stamp(1));
        disk.write_sector(sector, &stamp(2));

        let mut back = [0u8; SECTOR_SIZE];
        disk.read_sector(sector, &mut back);
        assert_eq!(back, stamp(2));
    });
}

/// Repeated writes to one sector coalesce: after a flush the disk
/// carries the final value, and rebooting on the same image proves it.
#[test]
fn write_behind_reaches_disk_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("DISK");

    run_on_disk(image.clone(), true, || {
        let disk = system::synch_disk();
        for round in 0..5u8 {
            disk.write_sector(700, &stamp(round));
            disk.write_sector(701, &stamp(round ^ 0x80));
        }
        // 停机路径会冲刷延迟写队列
    });

    run_on_disk(image, false, || {
        let disk = system::synch_disk();
        let mut back = [0u8; SECTOR_SIZE];
        disk.read_sector(700, &mut back);
        assert_eq!(back, stamp(4));
        disk.read_sector(701, &mut back);
        assert_eq!(back, stamp(4 ^ 0x80));
    });
}

/// Writing far more sectors than the cache holds forces reclaim and
/// the bounded write queue to do their jobs without losing anything.
#[test]
fn reclaim_under_write_pressure() {
    run_test(|_| {}, || {
        let disk = system::synch_disk();
        let base = 200;
        let count = 3 * mikos::fs::synch_disk::CACHE_SIZE;

        for i in 0..count {
            disk.write_sector(base + i, &stamp(i as u8));
        }
        for i in 0..count {
            let mut back = [0u8; SECTOR_SIZE];
            disk.read_sector(base + i, &mut back);
            assert_eq!(back, stamp(i as u8), "sector {}", base + i);
        }
    });
}

/// The last sector is readable (no read-ahead past the edge).
#[test]
fn edge_of_disk() {
    run_test(|_| {}, || {
        let disk = system::synch_disk();
        disk.write_sector(NUM_SECTORS - 1, &stamp(0x77));
        let mut back = [0u8; SECTOR_SIZE];
        disk.read_sector(NUM_SECTORS - 1, &mut back);
        assert_eq!(back, stamp(0x77));
    });
}

/// Two threads interleaving reads and writes over disjoint sectors
/// each see their own data.
#[test]
fn interleaved_writers() {
    run_test(|_| {}, || {
        fn hammer(base: usize, tag: u8) {
            for i in 0..20 {
                system::synch_disk().write_sector(base + i, &stamp(tag.wrapping_add(i as u8)));
                mikos::thread::yield_cpu();
            }
            for i in 0..20 {
                let mut back = [0u8; SECTOR_SIZE];
                system::synch_disk().read_sector(base + i, &mut back);
                assert_eq!(back, stamp(tag.wrapping_add(i as u8)));
                mikos::thread::yield_cpu();
            }
        }

        let a = Thread::new("writer-a", true).unwrap();
        a.fork(Box::new(|| hammer(300, 0x10)));
        let b = Thread::new("writer-b", true).unwrap();
        b.fork(Box::new(|| hammer(400, 0x60)));

        assert_eq!(a.join(), 0);
        assert_eq!(b.join(), 0);
    });
}
