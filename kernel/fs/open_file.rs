//! A handle onto an open file: a shared table entry plus a cursor.
//!
//! Reads and writes through the cursor serialize on the file's shared
//! lock. Writing past the end grows the file through the free map;
//! the new region reads back as zeroes until written.

use machine::disk::SECTOR_SIZE;

use super::file_header::FileHeader;
use super::file_table::SharedFile;
use crate::system;
use std::sync::Arc;

pub struct OpenFile {
    shared: Arc<SharedFile>,
    seek_position: usize,
}

impl OpenFile {
    /// Open the file whose header lives at `sector`.
    pub fn new(sector: usize) -> Self {
        Self {
            shared: system::file_table().open(sector),
            seek_position: 0,
        }
    }

    pub fn sector(&self) -> usize {
        self.shared.sector
    }

    pub fn length(&self) -> usize {
        self.shared.header.exclusive_access().length()
    }

    pub fn is_directory(&self) -> bool {
        self.shared.header.exclusive_access().is_directory()
    }

    /// Take the per-file lock (used hand-over-hand during path walks).
    pub fn lock_file(&self) {
        self.shared.lock.acquire();
    }

    pub fn unlock_file(&self) {
        self.shared.lock.release();
    }

    pub fn seek(&mut self, position: usize) {
        self.seek_position = position;
    }

    pub fn tell(&self) -> usize {
        self.seek_position
    }

    /// Read from the cursor, advancing it. Serialized per file.
    pub fn read(&mut self, buffer: &mut [u8]) -> usize {
        self.lock_file();
        let count = self.read_at(buffer, self.seek_position);
        self.seek_position += count;
        self.unlock_file();
        count
    }

    /// Write at the cursor, advancing it. Serialized per file.
    pub fn write(&mut self, buffer: &[u8]) -> usize {
        self.lock_file();
        let count = self.write_at(buffer, self.seek_position);
        self.seek_position += count;
        self.unlock_file();
        count
    }

    /// Read up to `buffer.len()` bytes at `position`, without touching
    /// the cursor. Caller holds the file lock on shared paths.
    pub fn read_at(&mut self, buffer: &mut [u8], position: usize) -> usize {
        let header = self.shared.header.exclusive_access().clone();
        let length = header.length();
        if position >= length || buffer.is_empty() {
            return 0;
        }
        let count = buffer.len().min(length - position);

        let mut scratch = [0u8; SECTOR_SIZE];
        let mut copied = 0;
        while copied < count {
            let offset = position + copied;
            let sector = header.byte_to_sector(offset);
            let in_sector = offset % SECTOR_SIZE;
            let chunk = (SECTOR_SIZE - in_sector).min(count - copied);

            system::synch_disk().read_sector(sector, &mut scratch);
            buffer[copied..copied + chunk].copy_from_slice(&scratch[in_sector..in_sector + chunk]);
            copied += chunk;
        }
        count
    }

    /// Write `buffer` at `position`, growing the file if it ends past
    /// the current length. Returns the bytes written (0 when the disk
    /// cannot hold the growth).
    pub fn write_at(&mut self, buffer: &[u8], position: usize) -> usize {
        if buffer.is_empty() {
            return 0;
        }

        let end = position + buffer.len();
        if end > self.length() && !system::file_system().extend_file(&self.shared, end) {
            return 0;
        }

        let header = self.shared.header.exclusive_access().clone();
        let mut scratch = [0u8; SECTOR_SIZE];
        let mut copied = 0;
        while copied < buffer.len() {
            let offset = position + copied;
            let sector = header.byte_to_sector(offset);
            let in_sector = offset % SECTOR_SIZE;
            let chunk = (SECTOR_SIZE - in_sector).min(buffer.len() - copied);

            if chunk < SECTOR_SIZE {
                // 残缺扇区先读旧内容再合并
                system::synch_disk().read_sector(sector, &mut scratch);
            }
            scratch[in_sector..in_sector + chunk]
                .copy_from_slice(&buffer[copied..copied + chunk]);
            system::synch_disk().write_sector(sector, &scratch);
            copied += chunk;
        }
        buffer.len()
    }

    /// Fresh in-memory copy of the on-disk header.
    pub fn header(&self) -> FileHeader {
        self.shared.header.exclusive_access().clone()
    }
}

impl Drop for OpenFile {
    fn drop(&mut self) {
        // 停机扫尾阶段内核上下文可能已经拆除
        if system::booted() {
            system::file_table().close(self.shared.sector);
        }
    }
}
