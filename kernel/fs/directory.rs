//! Directories: fixed tables of name-to-header-sector entries.
//!
//! A directory is an ordinary file holding `NUM_DIR_ENTRIES` records.
//! Names are unique within a directory; an entry whose header carries
//! the directory flag is a subdirectory.

use super::open_file::OpenFile;
use super::{DIRECTORY_FILE_SIZE, DIR_ENTRY_BYTES, FILE_NAME_MAX_LEN, NUM_DIR_ENTRIES};

#[derive(Clone)]
pub struct DirectoryEntry {
    pub in_use: bool,
    pub name: String,
    pub sector: usize,
}

pub struct Directory {
    table: Vec<DirectoryEntry>,
}

impl Directory {
    pub fn new() -> Self {
        Self {
            table: (0..NUM_DIR_ENTRIES)
                .map(|_| DirectoryEntry {
                    in_use: false,
                    name: String::new(),
                    sector: 0,
                })
                .collect(),
        }
    }

    /// Load the table from an (already locked) directory file.
    pub fn fetch_from(&mut self, file: &mut OpenFile) {
        let mut raw = [0u8; DIRECTORY_FILE_SIZE];
        file.read_at(&mut raw, 0);
        for (i, entry) in self.table.iter_mut().enumerate() {
            let rec = &raw[i * DIR_ENTRY_BYTES..(i + 1) * DIR_ENTRY_BYTES];
            entry.in_use = rec[0] != 0;
            let name_bytes = &rec[1..1 + FILE_NAME_MAX_LEN + 1];
            let len = name_bytes.iter().position(|&b| b == 0).unwrap_or(name_bytes.len());
            entry.name = String::from_utf8_lossy(&name_bytes[..len]).into_owned();
            entry.sector = u32::from_le_bytes(rec[12..16].try_into().unwrap()) as usize;
        }
    }

    /// Flush the table back through an (already locked) directory file.
    pub fn write_back(&self, file: &mut OpenFile) {
        let mut raw = [0u8; DIRECTORY_FILE_SIZE];
        for (i, entry) in self.table.iter().enumerate() {
            let rec = &mut raw[i * DIR_ENTRY_BYTES..(i + 1) * DIR_ENTRY_BYTES];
            rec[0] = entry.in_use as u8;
            let name = entry.name.as_bytes();
            rec[1..1 + name.len()].copy_from_slice(name);
            rec[12..16].copy_from_slice(&(entry.sector as u32).to_le_bytes());
        }
        file.write_at(&raw, 0);
    }

    /// Header sector of `name`, if present.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.table
            .iter()
            .find(|e| e.in_use && e.name == name)
            .map(|e| e.sector)
    }

    /// Record `name` at `sector`. Fails on duplicates, over-long names
    /// and a full table.
    pub fn add(&mut self, name: &str, sector: usize) -> bool {
        if name.is_empty() || name.len() > FILE_NAME_MAX_LEN || self.find(name).is_some() {
            return false;
        }
        match self.table.iter_mut().find(|e| !e.in_use) {
            Some(entry) => {
                entry.in_use = true;
                entry.name = String::from(name);
                entry.sector = sector;
                true
            }
            None => false,
        }
    }

    /// Drop `name` from the table.
    pub fn remove(&mut self, name: &str) -> bool {
        match self.table.iter_mut().find(|e| e.in_use && e.name == name) {
            Some(entry) => {
                entry.in_use = false;
                entry.name.clear();
                true
            }
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.table.iter().all(|e| !e.in_use)
    }

    /// Names currently in the directory, in table order.
    pub fn names(&self) -> Vec<String> {
        self.table
            .iter()
            .filter(|e| e.in_use)
            .map(|e| e.name.clone())
            .collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = &DirectoryEntry> {
        self.table.iter().filter(|e| e.in_use)
    }

    /// Print the names in the directory.
    pub fn list(&self) {
        for name in self.names() {
            println!("{}", name);
        }
    }

    /// Print everything, for debugging.
    pub fn print(&self) {
        println!("Directory contents:");
        for entry in self.entries() {
            println!("    name: {}, sector: {}", entry.name, entry.sector);
        }
    }
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}
