//! Filesystem scenarios: extensible files, hierarchy, concurrency,
//! consistency and persistence.

mod common;

use common::{run_on_disk, run_test};
use mikos::fs::{MAX_FILE_SIZE, NUM_DATAPTR, NUM_DIRECT};
use mikos::system;
use mikos::thread::Thread;

use machine::disk::SECTOR_SIZE;

/// Scenario: create "pepe" at 20 bytes, fill it, grow it to 1 KiB by
/// writing from offset 0, then read the tail back.
#[test]
fn extensible_file_roundtrip() {
    run_test(|_| {}, || {
        const INITIAL_SIZE: usize = 20;
        const FINAL_SIZE: usize = 1024;

        let src: Vec<u8> = (0..FINAL_SIZE).map(|i| b'a' + (i % 26) as u8).collect();

        assert!(system::file_system().create("pepe", INITIAL_SIZE));
        let mut file = system::file_system().open("pepe").unwrap();

        assert_eq!(file.write(&src[..INITIAL_SIZE]), INITIAL_SIZE);
        let mut out = [0u8; INITIAL_SIZE];
        file.seek(0);
        assert_eq!(file.read(&mut out), INITIAL_SIZE);
        assert_eq!(&out[..], &src[..INITIAL_SIZE]);

        file.seek(0);
        assert_eq!(file.write(&src), FINAL_SIZE);
        assert_eq!(file.length(), FINAL_SIZE);

        // 尾部 20 字节: 'a' + (1004+i) % 26
        file.seek(FINAL_SIZE - INITIAL_SIZE);
        assert_eq!(file.read(&mut out), INITIAL_SIZE);
        for (i, &b) in out.iter().enumerate() {
            assert_eq!(b, b'a' + ((FINAL_SIZE - INITIAL_SIZE + i) % 26) as u8);
        }

        drop(file);
        assert!(system::file_system().check());
    });
}

/// Growth across the direct, indirect and double-indirect boundaries
/// must read back intact.
#[test]
fn extend_through_double_indirect() {
    run_test(|_| {}, || {
        // 跨过两道边界再多写几扇区
        let final_size = (NUM_DIRECT + NUM_DATAPTR + 5) * SECTOR_SIZE + 17;
        assert!(final_size < MAX_FILE_SIZE);

        let pattern: Vec<u8> = (0..final_size).map(|i| (i % 251) as u8).collect();

        assert!(system::file_system().create("big", 0));
        let mut file = system::file_system().open("big").unwrap();

        // 不规则块大小写入, 制造跨扇区的残缺写
        let mut written = 0;
        for chunk in pattern.chunks(3 * SECTOR_SIZE + 11) {
            assert_eq!(file.write(chunk), chunk.len());
            written += chunk.len();
        }
        assert_eq!(written, final_size);
        assert_eq!(file.length(), final_size);

        let mut back = vec![0u8; final_size];
        file.seek(0);
        assert_eq!(file.read(&mut back), final_size);
        assert_eq!(back, pattern);

        drop(file);
        assert!(system::file_system().check());

        assert!(system::file_system().remove("big"));
        assert!(system::file_system().check());
    });
}

/// Scenario: two threads concurrently create and remove their own
/// spam files in the root directory; afterwards none are left and the
/// bitmap checks out.
#[test]
fn concurrent_directory_stress() {
    run_test(|_| {}, || {
        fn spam(offset: usize) {
            for i in 0..10 {
                let name = format!("spam{}", offset * 10 + i);
                system::file_system().create(&name, 10);
                mikos::thread::yield_cpu();
            }
            for i in 0..10 {
                let name = format!("spam{}", offset * 10 + i);
                system::file_system().remove(&name);
                mikos::thread::yield_cpu();
            }
        }

        let spam1 = Thread::new("spam1", true).unwrap();
        spam1.fork(Box::new(|| spam(0)));
        let spam2 = Thread::new("spam2", true).unwrap();
        spam2.fork(Box::new(|| spam(1)));

        assert_eq!(spam1.join(), 0);
        assert_eq!(spam2.join(), 0);

        let names = system::file_system().root_names();
        assert!(
            names.iter().all(|n| !n.starts_with("spam")),
            "leftover spam files: {:?}",
            names
        );
        assert!(system::file_system().check());
    });
}

/// Scenario: sectors acquired by growing a file must never leak a
/// previous owner's bytes.
#[test]
fn no_stale_data_through_extension() {
    run_test(|_| {}, || {
        // 先留下一些脏数据再删掉, 这些扇区随后会被重新分配
        assert!(system::file_system().create("litter", 4 * SECTOR_SIZE));
        let mut litter = system::file_system().open("litter").unwrap();
        litter.write(&[0xabu8; 4 * SECTOR_SIZE]);
        drop(litter);
        assert!(system::file_system().remove("litter"));

        assert!(system::file_system().create("probe", SECTOR_SIZE));
        let mut file = system::file_system().open("probe").unwrap();

        let mut contents = [0xffu8; SECTOR_SIZE];
        assert_eq!(file.read(&mut contents), SECTOR_SIZE);
        assert_eq!(contents, [0u8; SECTOR_SIZE]);

        // 写一个字节把文件撑大, 新到手的扇区也必须是零
        file.write(&[0u8]);
        file.seek(SECTOR_SIZE);
        let count = file.read(&mut contents);
        assert_eq!(count, 1);
        assert!(contents[..count].iter().all(|&b| b == 0));

        drop(file);
        assert!(system::file_system().remove("probe"));
        assert!(system::file_system().check());
    });
}

/// Removing an in-use file defers the liberation to the last close.
#[test]
fn remove_while_open_is_deferred() {
    run_test(|_| {}, || {
        assert!(system::file_system().create("held", 40));
        let mut file = system::file_system().open("held").unwrap();
        file.write(b"still here");

        assert!(system::file_system().remove("held"));
        // 目录里已经没有, 句柄却还能用
        assert!(system::file_system().open("held").is_none());
        let mut back = [0u8; 10];
        file.seek(0);
        assert_eq!(file.read(&mut back), 10);
        assert_eq!(&back, b"still here");

        // 最后一关之后块才回家
        drop(file);
        assert!(system::file_system().check());
    });
}

/// Directory hierarchy: mkdir, cd, nested paths, refusal rules.
#[test]
fn directory_tree_operations() {
    run_test(|_| {}, || {
        let fs = system::file_system;

        assert!(fs().make_directory("dir"));
        assert!(fs().create("dir/inner", 10));
        assert!(fs().make_directory("dir/sub"));
        assert!(fs().create("/dir/sub/leaf", 10));

        // 绝对与相对路径指向同一个文件
        assert!(fs().change_directory("dir"));
        let mut relative = fs().open("sub/leaf").unwrap();
        let absolute = fs().open("/dir/sub/leaf").unwrap();
        assert_eq!(relative.sector(), absolute.sector());
        drop(absolute);

        // 空串报错, 单根斜线回到根
        assert!(!fs().change_directory(""));
        assert!(fs().change_directory("/"));

        // 打开目录不是合法的文件打开
        assert!(fs().open("dir").is_none());

        // 非空目录与使用中的目录都拒删
        assert!(!fs().remove_directory("dir"));
        assert!(fs().change_directory("/dir/sub"));
        assert!(!fs().remove_directory("/dir/sub"));
        assert!(fs().change_directory("/"));

        drop(relative);
        assert!(fs().remove("/dir/sub/leaf"));
        assert!(fs().remove_directory("/dir/sub"));
        assert!(fs().remove("dir/inner"));
        assert!(fs().remove_directory("dir"));

        assert!(fs().check());
    });
}

/// Name rules: too-long names and duplicates are rejected cleanly.
#[test]
fn name_limits() {
    run_test(|_| {}, || {
        let fs = system::file_system;
        assert!(fs().create("okname", 0));
        assert!(!fs().create("okname", 0));
        assert!(!fs().create("name_way_too_long", 0));
        assert!(!fs().create("", 0));
        assert!(fs().remove("okname"));
        assert!(fs().check());
    });
}

/// What is written survives a reboot of the machine on the same disk
/// image.
#[test]
fn contents_survive_reboot() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("DISK");

    run_on_disk(image.clone(), true, || {
        assert!(system::file_system().create("persist", 0));
        let mut file = system::file_system().open("persist").unwrap();
        assert_eq!(file.write(b"written before the reboot"), 25);
    });

    run_on_disk(image, false, || {
        let mut file = system::file_system().open("persist").unwrap();
        let mut back = [0u8; 25];
        assert_eq!(file.read(&mut back), 25);
        assert_eq!(&back[..], b"written before the reboot");
        drop(file);
        assert!(system::file_system().check());
    });
}
