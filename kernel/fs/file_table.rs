//! The global open-file table.
//!
//! All opens of one header sector share a single reference-counted
//! entry, so every user of a file sees the same cached header and
//! serializes on the same per-file lock. The entry lives while anyone
//! holds the file open; a file removed while in use is only marked,
//! and its blocks are liberated at the last close.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::file_header::FileHeader;
use crate::sync::{Lock, UPSafeCell};
use crate::system;

pub struct SharedFile {
    pub sector: usize,
    /// 常驻内存的文件头, 只在持有 lock 或只读标志位时触碰
    pub header: UPSafeCell<FileHeader>,
    /// 同一文件的读写在此互斥
    pub lock: Lock,
    users: Cell<usize>,
    remove_on_delete: Cell<bool>,
}

impl SharedFile {
    fn new(sector: usize) -> Self {
        Self {
            sector,
            header: unsafe { UPSafeCell::new(FileHeader::fetch_from(sector)) },
            lock: Lock::new("file lock"),
            users: Cell::new(0),
            remove_on_delete: Cell::new(false),
        }
    }
}

pub struct FileTable {
    lock: Lock,
    table: BTreeMap<usize, Arc<SharedFile>>,
}

impl FileTable {
    pub fn new() -> Self {
        Self {
            lock: Lock::new("file table"),
            table: BTreeMap::new(),
        }
    }

    /// Fetch the shared entry for `sector`, creating it on first open.
    pub fn open(&mut self, sector: usize) -> Arc<SharedFile> {
        self.lock.acquire();
        let shared = self
            .table
            .entry(sector)
            .or_insert_with(|| Arc::new(SharedFile::new(sector)))
            .clone();
        shared.users.set(shared.users.get() + 1);
        self.lock.release();
        shared
    }

    /// Drop one user of `sector`; the last close liberates a file
    /// marked for removal.
    pub fn close(&mut self, sector: usize) {
        self.lock.acquire();
        let mut liberate = false;
        if let Some(shared) = self.table.get(&sector) {
            let users = shared.users.get() - 1;
            shared.users.set(users);
            if users == 0 {
                liberate = shared.remove_on_delete.get();
                self.table.remove(&sector);
            }
        }
        self.lock.release();

        // 此刻文件已不可达 (目录项早已摘除), 表外做回收不怕并发再开
        if liberate {
            system::file_system().liberate(sector);
        }
    }

    /// Mark `sector` to be removed at its last close. Returns false if
    /// nobody has the file open.
    pub fn mark_for_remove(&mut self, sector: usize) -> bool {
        self.lock.acquire();
        let marked = match self.table.get(&sector) {
            Some(shared) => {
                shared.remove_on_delete.set(true);
                true
            }
            None => false,
        };
        self.lock.release();
        marked
    }

    /// Is any thread holding `sector` open?
    pub fn used(&mut self, sector: usize) -> bool {
        self.lock.acquire();
        let used = self.table.contains_key(&sector);
        self.lock.release();
        used
    }

    /// Print the table, for debugging.
    pub fn print(&mut self) {
        self.lock.acquire();
        println!("File table contents:");
        for (sector, shared) in &self.table {
            println!(
                "    sector: {}, users: {}, remove on delete: {}",
                sector,
                shared.users.get(),
                shared.remove_on_delete.get()
            );
        }
        self.lock.release();
    }
}

impl Default for FileTable {
    fn default() -> Self {
        Self::new()
    }
}
