//! Boot wrapper: parse the command line, bring the kernel up, run one
//! of the built-in scenarios, halt.

use std::path::PathBuf;

use mikos::boot::{run_kernel, BootOptions};
use mikos::sync::{Channel, Lock};
use mikos::system;
use mikos::thread::{self, Thread};

fn usage() -> ! {
    eprintln!(
        "usage: mikos [-f] [-tlb] [-d flags] [-rs seed] [-di image] [-tt test] [-ls] [-D] [-c]"
    );
    eprintln!("    tests: prod-cons, prio, pathfinder, extend, dirs, security");
    std::process::exit(1)
}

fn main() {
    let mut options = BootOptions::default();
    let mut test: Option<String> = None;
    let mut list = false;
    let mut dump = false;
    let mut check = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-f" => options.format = true,
            "-tlb" => options.use_tlb = true,
            "-d" => options.debug_flags = args.next().unwrap_or_else(|| usage()),
            "-rs" => {
                let seed = args.next().unwrap_or_else(|| usage());
                options.random_slice_seed = Some(seed.parse().unwrap_or_else(|_| usage()));
            }
            "-di" => options.disk_image = PathBuf::from(args.next().unwrap_or_else(|| usage())),
            "-tt" => test = Some(args.next().unwrap_or_else(|| usage())),
            "-ls" => list = true,
            "-D" => dump = true,
            "-c" => check = true,
            _ => usage(),
        }
    }

    run_kernel(options, move || {
        match test.as_deref() {
            Some("prod-cons") => test_prod_cons(),
            Some("prio") => test_prio(),
            Some("pathfinder") => test_pathfinder(),
            Some("extend") => test_extensible_file(),
            Some("dirs") => test_directories(),
            Some("security") => test_security(),
            Some(other) => {
                eprintln!("unknown test `{}`", other);
                usage()
            }
            None => {}
        }
        if list {
            system::file_system().list();
        }
        if dump {
            system::file_system().print(true);
        }
        if check {
            println!(
                "filesystem check {}",
                if system::file_system().check() {
                    "succeeded"
                } else {
                    "failed"
                }
            );
        }
    });
}

// ----------------------------------------------------------------------
// Built-in scenarios, runnable without any user binaries on the disk.

/// Producer and consumer rendezvous over a channel.
fn test_prod_cons() {
    const NUM_ITEMS: i32 = 10;

    let channel: &'static Channel = Box::leak(Box::new(Channel::new("prod_cons channel")));

    let producer = Thread::new("producer", true).unwrap();
    producer.fork(Box::new(move || {
        for i in 0..NUM_ITEMS {
            // 看起来随机一点的测试数据
            channel.send((i * i) % 23);
        }
        println!("Producer finished.");
    }));

    let consumer = Thread::new("consumer", true).unwrap();
    consumer.fork(Box::new(move || {
        for _ in 0..NUM_ITEMS {
            let message = channel.receive();
            println!("Consumer received message {}", message);
        }
        println!("Consumer finished.");
    }));

    producer.join();
    consumer.join();
}

/// Ping-pong between five threads of different priorities: the most
/// urgent finishes all its iterations before the next one starts any.
fn test_prio() {
    fn runner(name: &'static str) {
        for num in 0..10 {
            println!("*** Thread `{}` is running: iteration {}", name, num);
            thread::yield_cpu();
        }
        println!("!!! Thread `{}` has finished", name);
    }

    let names = ["2nd", "3rd", "4th", "5th"];
    let mut spawned = Vec::new();
    for (num, &name) in names.iter().enumerate() {
        let t = Thread::new(name, true).unwrap();
        t.nice(num as isize);
        t.fork(Box::new(move || runner(name)));
        spawned.push(t);
    }
    thread::current_thread().nice(19);
    runner("1st");
    for t in spawned {
        t.join();
    }
}

/// The Mars Pathfinder scenario: priority inheritance lets the
/// low-priority holder finish before the medium-priority hog runs.
fn test_pathfinder() {
    let lock: &'static Lock = Box::leak(Box::new(Lock::new("data bus")));
    lock.set_prio_inherit();

    let weather = Thread::new("weather", true).unwrap();
    weather.fork(Box::new(move || {
        lock.acquire();
        thread::yield_cpu();
        println!("Weather analyzed");
        lock.release();
    }));
    thread::yield_cpu();

    let comms = Thread::new("communications", true).unwrap();
    comms.nice(-5);
    comms.fork(Box::new(|| {
        println!("Communications");
    }));

    let bus = Thread::new("data bus", true).unwrap();
    bus.nice(-10);
    bus.fork(Box::new(move || {
        lock.acquire();
        println!("Data bus liberated");
        lock.release();
    }));

    thread::yield_cpu();
    weather.join();
    comms.join();
    bus.join();
}

/// Write a small file, grow it well past a sector, read the tail back.
fn test_extensible_file() {
    const INITIAL_SIZE: usize = 20;
    const FINAL_SIZE: usize = 1024;

    let src: Vec<u8> = (0..FINAL_SIZE).map(|i| b'a' + (i % 26) as u8).collect();
    let mut dst = [0u8; INITIAL_SIZE];

    assert!(system::file_system().create("pepe", INITIAL_SIZE));
    let mut file = system::file_system().open("pepe").expect("open failed");

    file.write(&src[..INITIAL_SIZE]);
    file.seek(0);
    file.read(&mut dst);
    println!("Read {}", String::from_utf8_lossy(&dst));

    file.seek(0);
    file.write(&src);

    file.seek(FINAL_SIZE - INITIAL_SIZE);
    file.read(&mut dst);
    println!("Read {}", String::from_utf8_lossy(&dst));
}

/// Hierarchy walk plus two threads hammering the root directory.
fn test_directories() {
    let fs = system::file_system;

    assert!(fs().make_directory("new_dir"));
    assert!(fs().create("new_dir/new_file", 15));
    assert!(fs().list_directory("new_dir"));

    let mut file = fs().open("new_dir/new_file").expect("open failed");
    file.write(b"archivo nuevoo\0");
    let mut buffer = [0u8; 15];
    file.seek(0);
    file.read(&mut buffer);
    println!("Read {}", String::from_utf8_lossy(&buffer));

    assert!(fs().change_directory("new_dir"));
    assert!(fs().make_directory("sub_dir"));
    assert!(fs().create("sub_dir/new_file", 100));

    let mut file2 = fs().open("/new_dir/sub_dir/new_file").expect("open failed");
    file2.write(b"123456789123456789");
    drop(file2);

    assert!(fs().remove("new_file"));
    assert!(fs().change_directory("/new_dir/sub_dir"));
    assert!(fs().list_directory("/new_dir"));

    drop(file);
    assert!(fs().remove("/new_dir/sub_dir/new_file"));
    assert!(fs().change_directory("/"));
    assert!(fs().remove_directory("/new_dir/sub_dir"));
    assert!(fs().remove_directory("/new_dir"));

    println!("Contention test starting.");
    fn spam(offset: usize) {
        for i in 0..10 {
            let name = format!("spam{}", offset * 10 + i);
            system::file_system().create(&name, 10);
        }
        for i in 0..10 {
            let name = format!("spam{}", offset * 10 + i);
            system::file_system().remove(&name);
        }
    }

    let spam1 = Thread::new("spam1", true).unwrap();
    spam1.fork(Box::new(|| spam(0)));
    let spam2 = Thread::new("spam2", true).unwrap();
    spam2.fork(Box::new(|| spam(1)));

    spam1.join();
    spam2.join();
    println!("Contention test passed.");
}

/// Newly allocated sectors must read back zeroed, before and after an
/// extension.
fn test_security() {
    use machine::disk::SECTOR_SIZE;

    assert!(system::file_system().create("prod_cons", SECTOR_SIZE));
    let mut file = system::file_system().open("prod_cons").expect("open failed");

    let mut contents = [0xffu8; SECTOR_SIZE];
    file.read(&mut contents);
    assert_eq!(contents, [0u8; SECTOR_SIZE]);

    // 写一个字节把文件撑大一格, 新扇区读回来仍须全零
    file.write(&[0u8]);
    file.seek(SECTOR_SIZE);
    let count = file.read(&mut contents);
    assert!(contents[..count].iter().all(|&b| b == 0));

    drop(file);
    system::file_system().remove("prod_cons");
    println!("Security test passed.");
}
