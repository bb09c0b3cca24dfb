//! The system-call boundary, driven end to end.
//!
//! No MIPS decoder ships with the machine, so a scripted instruction
//! engine stands in for the user binary: each step plays the register
//! convention by hand and traps into the kernel, exactly the way real
//! compiled code would.

mod common;

use common::run_test;
use machine::cpu::{Exception, A0_REG, A1_REG, A2_REG, V0_REG};
use machine::{machine, Engine, Machine};
use mikos::memory::address_space::AddressSpace;
use mikos::memory::executable;
use mikos::syscall::transfer;
use mikos::system;
use mikos::thread;
use sys_interface::syscall::*;

// 给主线程也配上地址空间, 它要亲自扮演发系统调用的用户程序
fn install_image(name: &str, uninit: usize) {
    let code: Vec<u8> = (0..64).map(|i| i as u8).collect();
    let image = executable::build_image(&code, &[], uninit);
    assert!(system::file_system().create(name, 0));
    let mut file = system::file_system().open(name).unwrap();
    assert_eq!(file.write(&image), image.len());
}

fn adopt_image(name: &str) {
    let file = system::file_system().open(name).unwrap();
    let current = thread::current_thread();
    let space = AddressSpace::new(file, current.tid()).expect("space creation failed");
    current.set_space(space);
    current.space().unwrap().restore_state();
}

fn trap(id: u32, a0: u32, a1: u32, a2: u32) -> i32 {
    let cpu = &mut machine().cpu;
    cpu.write_register(V0_REG, id);
    cpu.write_register(A0_REG, a0);
    cpu.write_register(A1_REG, a1);
    cpu.write_register(A2_REG, a2);
    machine().raise(Exception::Syscall);
    machine().cpu.read_register(V0_REG) as i32
}

/// The "user binary": creates a file, writes to it, greets the
/// console, exits 42. One syscall per simulated instruction step.
struct ChildScript {
    step: usize,
    fd: i32,
}

const PATH_ADDR: usize = 256;
const DATA_ADDR: usize = 384;
const GREETING_ADDR: usize = 448;
const CONTENT: &[u8] = b"hello from child";

impl Engine for ChildScript {
    fn step(&mut self, m: &mut Machine) -> bool {
        self.step += 1;

        let poke = |m: &mut Machine, addr: usize, bytes: &[u8]| {
            for (i, &b) in bytes.iter().enumerate() {
                m.write_mem(addr + i, 1, b as u32).unwrap();
            }
        };
        let syscall = |m: &mut Machine, id: u32, a0: u32, a1: u32, a2: u32| {
            m.cpu.write_register(V0_REG, id);
            m.cpu.write_register(A0_REG, a0);
            m.cpu.write_register(A1_REG, a1);
            m.cpu.write_register(A2_REG, a2);
            m.raise(Exception::Syscall);
            m.cpu.read_register(V0_REG) as i32
        };

        match self.step {
            1 => {
                poke(m, PATH_ADDR, b"out.txt\0");
                assert_eq!(syscall(m, SYSCALL_CREATE, PATH_ADDR as u32, 0, 0), 0);
            }
            2 => {
                self.fd = syscall(m, SYSCALL_OPEN, PATH_ADDR as u32, 0, 0);
                assert!(self.fd >= 2, "expected a real descriptor, got {}", self.fd);
            }
            3 => {
                poke(m, DATA_ADDR, CONTENT);
                let written = syscall(
                    m,
                    SYSCALL_WRITE,
                    DATA_ADDR as u32,
                    CONTENT.len() as u32,
                    self.fd as u32,
                );
                assert_eq!(written, CONTENT.len() as i32);
            }
            4 => {
                assert_eq!(syscall(m, SYSCALL_CLOSE, self.fd as u32, 0, 0), 0);
            }
            5 => {
                poke(m, GREETING_ADDR, b"hi!");
                let written = syscall(
                    m,
                    SYSCALL_WRITE,
                    GREETING_ADDR as u32,
                    3,
                    sys_interface::config::CONSOLE_OUTPUT as u32,
                );
                assert_eq!(written, 3);
            }
            _ => {
                syscall(m, SYSCALL_EXIT, 42, 0, 0);
                unreachable!("exit came back");
            }
        }
        true
    }
}

/// Exec a scripted child, join it, then read back what it wrote —
/// crossing the user/kernel boundary in both directions.
#[test]
fn exec_join_and_file_io_through_syscalls() {
    run_test(|_| {}, || {
        install_image("shell", 512);
        install_image("child", 512);
        adopt_image("shell");

        machine().attach_engine(Box::new(ChildScript { step: 0, fd: -1 }));

        // 把 exec 的路径放进自己的用户内存
        transfer::write_string_to_user("child", PATH_ADDR);
        let tid = trap(SYSCALL_EXEC, PATH_ADDR as u32, 0, 0);
        assert!(tid > 0, "exec failed: {}", tid);

        let status = trap(SYSCALL_JOIN, tid as u32, 0, 0);
        assert_eq!(status, 42);

        // 孩子写的文件, 从这边的系统调用读回来
        transfer::write_string_to_user("out.txt", PATH_ADDR);
        let fd = trap(SYSCALL_OPEN, PATH_ADDR as u32, 0, 0);
        assert!(fd >= 2);
        let count = trap(SYSCALL_READ, DATA_ADDR as u32, 64, fd as u32);
        assert_eq!(count, CONTENT.len() as i32);

        let mut back = vec![0u8; CONTENT.len()];
        transfer::read_buffer_from_user(DATA_ADDR, &mut back);
        assert_eq!(back, CONTENT);
        assert_eq!(trap(SYSCALL_CLOSE, fd as u32, 0, 0), 0);

        // 问候语到了控制台
        let console = machine().console.take_output();
        assert_eq!(console, b"hi!");

        // 主线程的地址空间亲手归还
        let current = thread::current_thread();
        system::core_map().free_all(current.tid());
        drop(current.take_space());
        assert!(system::file_system().check());
    });
}

/// An exec'd program finds argc in r4 and its argv strings, copied
/// onto its own stack, through the pointer array in r5.
struct ArgvInspector;

impl Engine for ArgvInspector {
    fn step(&mut self, m: &mut Machine) -> bool {
        let argc = m.cpu.read_register(A0_REG) as usize;
        let argv = m.cpu.read_register(A1_REG) as usize;
        assert_eq!(argc, 2);

        let mut words = Vec::new();
        for i in 0..argc {
            let ptr = m.read_mem(argv + i * 4, 4).unwrap() as usize;
            let mut s = Vec::new();
            loop {
                match m.read_mem(ptr + s.len(), 1).unwrap() as u8 {
                    0 => break,
                    b => s.push(b),
                }
            }
            words.push(String::from_utf8(s).unwrap());
        }
        assert_eq!(words, ["child", "--flag"]);
        // 指针数组以空指针收尾
        assert_eq!(m.read_mem(argv + argc * 4, 4).unwrap(), 0);

        let syscall = |m: &mut Machine, id: u32, a0: u32| {
            m.cpu.write_register(V0_REG, id);
            m.cpu.write_register(A0_REG, a0);
            m.raise(Exception::Syscall);
        };
        syscall(m, SYSCALL_EXIT, 0);
        unreachable!("exit came back");
    }
}

#[test]
fn exec_passes_argv_on_the_new_stack() {
    run_test(|_| {}, || {
        install_image("shell", 512);
        install_image("child", 512);
        adopt_image("shell");

        machine().attach_engine(Box::new(ArgvInspector));

        // 自己的用户内存里摆好 argv: 两个串加一个指针数组
        transfer::write_string_to_user("child", PATH_ADDR);
        transfer::write_string_to_user("--flag", PATH_ADDR + 16);
        let argv_addr = DATA_ADDR;
        transfer::write_word_to_user(argv_addr, PATH_ADDR as u32);
        transfer::write_word_to_user(argv_addr + 4, (PATH_ADDR + 16) as u32);
        transfer::write_word_to_user(argv_addr + 8, 0);

        let tid = trap(SYSCALL_EXEC, PATH_ADDR as u32, argv_addr as u32, 0);
        assert!(tid > 0);
        assert_eq!(trap(SYSCALL_JOIN, tid as u32, 0, 0), 0);

        let current = thread::current_thread();
        system::core_map().free_all(current.tid());
        drop(current.take_space());
    });
}

/// Console input: descriptor 0 serves the bytes fed to the machine,
/// then reports end of input.
#[test]
fn console_input_through_descriptor_zero() {
    run_test(
        |options| options.console_input = b"typed line".to_vec(),
        || {
            install_image("shell", 512);
            adopt_image("shell");

            let count = trap(SYSCALL_READ, DATA_ADDR as u32, 32, 0);
            assert_eq!(count, 10);
            let mut back = vec![0u8; 10];
            transfer::read_buffer_from_user(DATA_ADDR, &mut back);
            assert_eq!(back, b"typed line");

            // 输入耗尽后读到 0 字节
            assert_eq!(trap(SYSCALL_READ, DATA_ADDR as u32, 8, 0), 0);

            let current = thread::current_thread();
            system::core_map().free_all(current.tid());
            drop(current.take_space());
        },
    );
}

/// Expected failures surface as −1, never as kernel damage.
#[test]
fn syscall_error_paths() {
    run_test(|_| {}, || {
        install_image("shell", 512);
        adopt_image("shell");

        transfer::write_string_to_user("nothere", PATH_ADDR);
        assert_eq!(trap(SYSCALL_OPEN, PATH_ADDR as u32, 0, 0), -1);
        assert_eq!(trap(SYSCALL_REMOVE, PATH_ADDR as u32, 0, 0), -1);
        assert_eq!(trap(SYSCALL_EXEC, PATH_ADDR as u32, 0, 0), -1);
        assert_eq!(trap(SYSCALL_JOIN, 99, 0, 0), -1);
        assert_eq!(trap(SYSCALL_CLOSE, 7, 0, 0), -1);

        // 向控制台输入描述符写是不行的
        assert_eq!(trap(SYSCALL_WRITE, DATA_ADDR as u32, 4, 0), -1);

        let current = thread::current_thread();
        system::core_map().free_all(current.tid());
        drop(current.take_space());
    });
}
