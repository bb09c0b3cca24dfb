//! Asynchronous sector disk, backed by a host file.
//!
//! The device accepts one request at a time. Read and write requests
//! return immediately; the data moves right away, but completion is
//! only signaled through an interrupt a fixed latency later, which is
//! what forces the kernel to provide its own synchronous wrapper.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Bytes per sector.
pub const SECTOR_SIZE: usize = 128;
pub const SECTORS_PER_TRACK: usize = 32;
pub const NUM_TRACKS: usize = 32;
/// Sectors on the whole disk.
pub const NUM_SECTORS: usize = SECTORS_PER_TRACK * NUM_TRACKS;

// 每次请求的模拟时延
const DISK_TICKS: u64 = 100;

pub struct Disk {
    file: File,
    active: bool,
    handler: Option<fn()>,
}

impl Disk {
    /// Open (creating and zero-sizing if needed) the disk image at `path`.
    pub fn new(path: &Path) -> Self {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .unwrap_or_else(|e| panic!("cannot open disk image {:?}: {}", path, e));
        file.set_len((NUM_SECTORS * SECTOR_SIZE) as u64)
            .expect("cannot size disk image");
        Self {
            file,
            active: false,
            handler: None,
        }
    }

    /// Register the request-done interrupt handler.
    pub fn set_handler(&mut self, handler: fn()) {
        self.handler = Some(handler);
    }

    /// Start reading `sector` into `data`; completion arrives by interrupt.
    pub fn read_request(
        &mut self,
        sector: usize,
        data: &mut [u8],
        interrupt: &mut crate::interrupt::Interrupt,
    ) {
        assert!(!self.active, "disk accepts only one request at a time");
        assert!(self.handler.is_some(), "disk used before its handler was set");
        self.do_read(sector, data);
        self.active = true;
        interrupt.schedule("disk", DISK_TICKS, Box::new(request_done));
    }

    /// Start writing `data` to `sector`; completion arrives by interrupt.
    pub fn write_request(
        &mut self,
        sector: usize,
        data: &[u8],
        interrupt: &mut crate::interrupt::Interrupt,
    ) {
        assert!(!self.active, "disk accepts only one request at a time");
        assert!(self.handler.is_some(), "disk used before its handler was set");
        self.do_write(sector, data);
        self.active = true;
        interrupt.schedule("disk", DISK_TICKS, Box::new(request_done));
    }

    fn seek_to(&mut self, sector: usize) {
        assert!(sector < NUM_SECTORS, "sector {} beyond the disk", sector);
        self.file
            .seek(SeekFrom::Start((sector * SECTOR_SIZE) as u64))
            .expect("disk image seek failed");
    }

    fn do_read(&mut self, sector: usize, data: &mut [u8]) {
        assert_eq!(data.len(), SECTOR_SIZE);
        self.seek_to(sector);
        self.file.read_exact(data).expect("disk image read failed");
    }

    fn do_write(&mut self, sector: usize, data: &[u8]) {
        assert_eq!(data.len(), SECTOR_SIZE);
        self.seek_to(sector);
        self.file.write_all(data).expect("disk image write failed");
        self.file.flush().expect("disk image flush failed");
    }
}

impl crate::Machine {
    /// Issue an asynchronous sector read and account for it.
    pub fn disk_read_request(&mut self, sector: usize, data: &mut [u8]) {
        self.stats.disk_reads += 1;
        self.disk.read_request(sector, data, &mut self.interrupt);
    }

    /// Issue an asynchronous sector write and account for it.
    pub fn disk_write_request(&mut self, sector: usize, data: &[u8]) {
        self.stats.disk_writes += 1;
        self.disk.write_request(sector, data, &mut self.interrupt);
    }
}

// 完成中断: 清除忙标志, 再通知内核
fn request_done() {
    let machine = crate::machine();
    machine.disk.active = false;
    if let Some(handler) = machine.disk.handler {
        handler();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_holds_sectors_independently() {
        let dir = tempfile::tempdir().unwrap();
        let mut disk = Disk::new(&dir.path().join("DISK"));

        let ones = [1u8; SECTOR_SIZE];
        let twos = [2u8; SECTOR_SIZE];
        disk.do_write(0, &ones);
        disk.do_write(NUM_SECTORS - 1, &twos);

        let mut buf = [0u8; SECTOR_SIZE];
        disk.do_read(0, &mut buf);
        assert_eq!(buf, ones);
        disk.do_read(NUM_SECTORS - 1, &mut buf);
        assert_eq!(buf, twos);
        disk.do_read(1, &mut buf);
        assert_eq!(buf, [0u8; SECTOR_SIZE]);
    }

    #[test]
    fn image_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("DISK");
        let payload = [7u8; SECTOR_SIZE];
        {
            let mut disk = Disk::new(&path);
            disk.do_write(5, &payload);
        }
        let mut disk = Disk::new(&path);
        let mut buf = [0u8; SECTOR_SIZE];
        disk.do_read(5, &mut buf);
        assert_eq!(buf, payload);
    }
}
