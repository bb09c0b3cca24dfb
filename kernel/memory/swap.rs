//! Per-process swap backing store.
//!
//! Each address space owns a filesystem file `swap.<asid>` holding its
//! paged-out pages, one page-aligned slot per virtual page. The file
//! is created with the space and removed when the space dies.

use machine::machine;
use machine::PAGE_SIZE;

use crate::fs::open_file::OpenFile;
use crate::system;

pub struct Swap {
    name: String,
    file: OpenFile,
}

impl Swap {
    pub fn new(asid: usize) -> Self {
        // 绝对路径: 交换文件固定住在根目录, 与各线程的工作目录无关
        let name = format!("/swap.{}", asid);
        assert!(
            system::file_system().create(&name, 0),
            "cannot create swap file {}",
            name
        );
        let file = system::file_system()
            .open(&name)
            .expect("swap file vanished right after creation");
        Self { name, file }
    }

    /// Copy frame `ppn` out to the slot of virtual page `vpn`.
    pub fn write_swap(&mut self, vpn: usize, ppn: usize) {
        let frame: [u8; PAGE_SIZE] = machine().mmu.frame(ppn).try_into().unwrap();
        self.file.write_at(&frame, vpn * PAGE_SIZE);
    }

    /// Copy the slot of virtual page `vpn` back into frame `ppn`.
    pub fn pull_swap(&mut self, vpn: usize, ppn: usize) {
        let mut frame = [0u8; PAGE_SIZE];
        let read = self.file.read_at(&mut frame, vpn * PAGE_SIZE);
        assert_eq!(read, PAGE_SIZE, "swap slot for vpn {} missing", vpn);
        machine().mmu.frame_mut(ppn).copy_from_slice(&frame);
    }
}

impl Drop for Swap {
    fn drop(&mut self) {
        // 先摘目录项再关句柄: 关闭时块随之归还
        if system::booted() {
            system::file_system().remove(&self.name);
        }
    }
}
