//! Top-level filesystem operations: names to files.
//!
//! The free-sector bitmap and the root directory are themselves files
//! with headers at well-known sectors; both are kept open for the life
//! of the system. Operations that mutate the directory or the bitmap
//! flush both on success and simply discard the in-memory copies on
//! failure, so the on-disk state never holds a partial mutation.
//!
//! Lock order is directory file → file table → free-map file; path
//! walks descend hand-over-hand, holding one directory lock at a time.

use component::bitmap::Bitmap;
use machine::disk::NUM_SECTORS;

use super::directory::Directory;
use super::file_header::{read_ptr_sector, FileHeader};
use super::file_table::SharedFile;
use super::open_file::OpenFile;
use super::{
    DIRECTORY_FILE_SIZE, DIRECTORY_SECTOR, FILE_NAME_MAX_LEN, FREE_MAP_FILE_SIZE, FREE_MAP_SECTOR,
    MAX_FILE_SIZE, NUM_DATAPTR, NUM_DIRECT,
};
use crate::system;
use crate::thread;
use std::sync::Arc;

pub struct FileSystem {
    free_map_file: OpenFile,
    directory_file: OpenFile,
}

/// A resolved path: the parent directory (its file lock held) and the
/// leaf name. A `None` leaf means the path denotes the directory
/// itself (trailing `/`, or the bare root).
struct ResolvedPath {
    dir: OpenFile,
    leaf: Option<String>,
}

impl FileSystem {
    /// Mount the filesystem, formatting the disk first if asked.
    pub fn new(format: bool) -> Self {
        logger::kdebug!('f', "initializing the file system");
        if format {
            logger::kdebug!('f', "formatting the file system");

            let mut free_map = Bitmap::new(NUM_SECTORS);
            free_map.mark(FREE_MAP_SECTOR);
            free_map.mark(DIRECTORY_SECTOR);

            let mut map_header = FileHeader::new();
            let mut dir_header = FileHeader::new();
            assert!(map_header.allocate(&mut free_map, FREE_MAP_FILE_SIZE, false));
            assert!(dir_header.allocate(&mut free_map, DIRECTORY_FILE_SIZE, true));

            // 头部先落盘, 随后才能按普通文件打开这两个元文件
            map_header.write_back(FREE_MAP_SECTOR);
            dir_header.write_back(DIRECTORY_SECTOR);

            let mut fs = Self {
                free_map_file: OpenFile::new(FREE_MAP_SECTOR),
                directory_file: OpenFile::new(DIRECTORY_SECTOR),
            };

            fs.flush_free_map(&free_map);
            let directory = Directory::new();
            directory.write_back(&mut fs.directory_file);

            if logger::debug_flag('f') {
                fs.print(false);
            }
            fs
        } else {
            Self {
                free_map_file: OpenFile::new(FREE_MAP_SECTOR),
                directory_file: OpenFile::new(DIRECTORY_SECTOR),
            }
        }
    }

    // ------------------------------------------------------------------
    // 路径解析

    /// Walk `path` down to its parent directory.
    ///
    /// On success the returned directory file is locked; the caller
    /// unlocks it. Absolute paths start at the root, relative ones at
    /// the calling thread's current directory (root when unset).
    fn resolve(&mut self, path: &str) -> Option<ResolvedPath> {
        if path.is_empty() {
            return None;
        }

        let (start_sector, rest) = match path.strip_prefix('/') {
            Some(rest) => (DIRECTORY_SECTOR, rest),
            None => {
                let sector = match thread::current_thread().current_directory() {
                    Some(cwd) => cwd.sector(),
                    None => DIRECTORY_SECTOR,
                };
                (sector, path)
            }
        };

        let mut parts: Vec<&str> = rest.split('/').collect();
        let leaf = match parts.pop() {
            Some("") | None => None,
            Some(name) => Some(String::from(name)),
        };

        let mut dir = OpenFile::new(start_sector);
        dir.lock_file();

        for part in parts {
            if part.is_empty() || part.len() > FILE_NAME_MAX_LEN {
                dir.unlock_file();
                return None;
            }

            let mut entries = Directory::new();
            entries.fetch_from(&mut dir);
            let sector = match entries.find(part) {
                Some(sector) => sector,
                None => {
                    dir.unlock_file();
                    return None;
                }
            };

            let next = OpenFile::new(sector);
            if !next.is_directory() {
                dir.unlock_file();
                return None;
            }

            // 手递手: 锁住下一级再放开上一级
            next.lock_file();
            dir.unlock_file();
            dir = next;
        }

        Some(ResolvedPath { dir, leaf })
    }

    // ------------------------------------------------------------------
    // 自由扇区位图

    fn fetch_free_map(&mut self) -> Bitmap {
        let mut map = Bitmap::new(NUM_SECTORS);
        let mut raw = vec![0u8; FREE_MAP_FILE_SIZE];
        self.free_map_file.read_at(&mut raw, 0);
        map.read_from(&raw);
        map
    }

    fn flush_free_map(&mut self, free_map: &Bitmap) {
        let mut raw = vec![0u8; FREE_MAP_FILE_SIZE];
        free_map.write_to(&mut raw);
        self.free_map_file.write_at(&raw, 0);
    }

    // ------------------------------------------------------------------
    // 操作

    /// Create a file of `initial_size` bytes at `path`.
    pub fn create(&mut self, path: &str, initial_size: usize) -> bool {
        logger::kdebug!('f', "creating file {}, size {}", path, initial_size);
        if initial_size > MAX_FILE_SIZE {
            return false;
        }
        self.create_entry(path, initial_size, false)
    }

    /// Create a subdirectory at `path`.
    pub fn make_directory(&mut self, path: &str) -> bool {
        logger::kdebug!('f', "creating directory {}", path);
        self.create_entry(path, DIRECTORY_FILE_SIZE, true)
    }

    fn create_entry(&mut self, path: &str, size: usize, is_directory: bool) -> bool {
        let Some(ResolvedPath { mut dir, leaf }) = self.resolve(path) else {
            return false;
        };
        let Some(name) = leaf else {
            dir.unlock_file();
            return false;
        };
        if name.len() > FILE_NAME_MAX_LEN {
            dir.unlock_file();
            return false;
        }

        let mut entries = Directory::new();
        entries.fetch_from(&mut dir);

        let mut success = false;
        if entries.find(&name).is_none() {
            self.free_map_file.lock_file();
            let mut free_map = self.fetch_free_map();

            if let Some(sector) = free_map.find() {
                if entries.add(&name, sector) {
                    let mut header = FileHeader::new();
                    if header.allocate(&mut free_map, size, is_directory) {
                        // 全部成功才落盘; 失败则内存里的改动随手丢弃
                        header.write_back(sector);
                        self.flush_free_map(&free_map);
                        entries.write_back(&mut dir);
                        if is_directory {
                            let mut new_dir = OpenFile::new(sector);
                            new_dir.lock_file();
                            Directory::new().write_back(&mut new_dir);
                            new_dir.unlock_file();
                        }
                        success = true;
                    }
                }
            }

            self.free_map_file.unlock_file();
        }

        dir.unlock_file();
        success
    }

    /// Open the plain file at `path`.
    pub fn open(&mut self, path: &str) -> Option<OpenFile> {
        logger::kdebug!('f', "opening file {}", path);
        let ResolvedPath { mut dir, leaf } = self.resolve(path)?;
        let Some(name) = leaf else {
            dir.unlock_file();
            return None;
        };

        let mut entries = Directory::new();
        entries.fetch_from(&mut dir);
        let file = entries.find(&name).and_then(|sector| {
            let file = OpenFile::new(sector);
            // 目录不从这里打开
            (!file.is_directory()).then_some(file)
        });

        dir.unlock_file();
        file
    }

    /// Remove the plain file at `path`.
    ///
    /// A file some thread still has open is only unlinked and marked;
    /// its blocks are liberated at the last close.
    pub fn remove(&mut self, path: &str) -> bool {
        logger::kdebug!('f', "removing file {}", path);
        let Some(ResolvedPath { mut dir, leaf }) = self.resolve(path) else {
            return false;
        };
        let Some(name) = leaf else {
            dir.unlock_file();
            return false;
        };

        let mut entries = Directory::new();
        entries.fetch_from(&mut dir);
        let Some(sector) = entries.find(&name) else {
            dir.unlock_file();
            return false;
        };

        let header = FileHeader::fetch_from(sector);
        if header.is_directory() {
            dir.unlock_file();
            return false;
        }

        if system::file_table().mark_for_remove(sector) {
            logger::kdebug!('f', "file {} is in use, removing later", path);
            entries.remove(&name);
            entries.write_back(&mut dir);
            dir.unlock_file();
            return true;
        }

        self.free_map_file.lock_file();
        let mut free_map = self.fetch_free_map();
        header.deallocate(&mut free_map);
        free_map.clear(sector);
        entries.remove(&name);

        entries.write_back(&mut dir);
        self.flush_free_map(&free_map);
        self.free_map_file.unlock_file();
        dir.unlock_file();
        true
    }

    /// Free the blocks of an unlinked, now-unused file.
    pub fn liberate(&mut self, sector: usize) {
        logger::kdebug!('f', "liberating blocks of sector {}", sector);
        let header = FileHeader::fetch_from(sector);

        self.free_map_file.lock_file();
        let mut free_map = self.fetch_free_map();
        header.deallocate(&mut free_map);
        free_map.clear(sector);
        self.flush_free_map(&free_map);
        self.free_map_file.unlock_file();
    }

    /// Grow an open file to `new_size` bytes.
    pub fn extend_file(&mut self, shared: &Arc<SharedFile>, new_size: usize) -> bool {
        self.free_map_file.lock_file();
        let mut free_map = self.fetch_free_map();

        let mut header = shared.header.exclusive_access().clone();
        let grown = header.extend(&mut free_map, new_size);
        if grown {
            header.write_back(shared.sector);
            *shared.header.exclusive_access() = header;
            self.flush_free_map(&free_map);
        }

        self.free_map_file.unlock_file();
        grown
    }

    /// Change the calling thread's working directory.
    ///
    /// A bare `/` selects the root; an empty path is an error.
    pub fn change_directory(&mut self, path: &str) -> bool {
        let Some(ResolvedPath { mut dir, leaf }) = self.resolve(path) else {
            return false;
        };

        let target = match leaf {
            // 路径直接指着目录本身 (末尾带 / 或者就是根)
            None => Some(OpenFile::new(dir.sector())),
            Some(name) => {
                let mut entries = Directory::new();
                entries.fetch_from(&mut dir);
                entries.find(&name).and_then(|sector| {
                    let file = OpenFile::new(sector);
                    file.is_directory().then_some(file)
                })
            }
        };
        dir.unlock_file();

        match target {
            Some(file) => {
                thread::current_thread().set_current_directory(Some(file));
                true
            }
            None => false,
        }
    }

    /// Print the contents of the directory at `path`.
    pub fn list_directory(&mut self, path: &str) -> bool {
        let Some(ResolvedPath { mut dir, leaf }) = self.resolve(path) else {
            return false;
        };

        let success = match leaf {
            None => {
                let mut entries = Directory::new();
                entries.fetch_from(&mut dir);
                entries.list();
                true
            }
            Some(name) => {
                let mut entries = Directory::new();
                entries.fetch_from(&mut dir);
                match entries.find(&name) {
                    Some(sector) => {
                        let mut target = OpenFile::new(sector);
                        if target.is_directory() {
                            target.lock_file();
                            let mut listing = Directory::new();
                            listing.fetch_from(&mut target);
                            target.unlock_file();
                            listing.list();
                            true
                        } else {
                            false
                        }
                    }
                    None => false,
                }
            }
        };

        dir.unlock_file();
        success
    }

    /// List the root directory.
    pub fn list(&mut self) {
        self.directory_file.lock_file();
        let mut entries = Directory::new();
        entries.fetch_from(&mut self.directory_file);
        self.directory_file.unlock_file();
        entries.list();
    }

    /// Names in the root directory (test hook).
    pub fn root_names(&mut self) -> Vec<String> {
        self.directory_file.lock_file();
        let mut entries = Directory::new();
        entries.fetch_from(&mut self.directory_file);
        self.directory_file.unlock_file();
        entries.names()
    }

    /// Remove the empty, unused directory at `path`.
    pub fn remove_directory(&mut self, path: &str) -> bool {
        logger::kdebug!('f', "removing directory {}", path);
        let Some(ResolvedPath { mut dir, leaf }) = self.resolve(path) else {
            return false;
        };
        let Some(name) = leaf else {
            dir.unlock_file();
            return false;
        };

        let mut entries = Directory::new();
        entries.fetch_from(&mut dir);
        let Some(sector) = entries.find(&name) else {
            dir.unlock_file();
            return false;
        };

        let header = FileHeader::fetch_from(sector);
        if !header.is_directory() {
            dir.unlock_file();
            return false;
        }

        // 有人开着 (包括作为工作目录) 就不能删
        if system::file_table().used(sector) {
            dir.unlock_file();
            return false;
        }

        let empty = {
            let mut target = OpenFile::new(sector);
            target.lock_file();
            let mut listing = Directory::new();
            listing.fetch_from(&mut target);
            target.unlock_file();
            listing.is_empty()
        };
        if !empty {
            dir.unlock_file();
            return false;
        }

        self.free_map_file.lock_file();
        let mut free_map = self.fetch_free_map();
        header.deallocate(&mut free_map);
        free_map.clear(sector);
        entries.remove(&name);

        entries.write_back(&mut dir);
        self.flush_free_map(&free_map);
        self.free_map_file.unlock_file();
        dir.unlock_file();
        true
    }

    // ------------------------------------------------------------------
    // 一致性检查

    /// Verify the whole filesystem: every sector marked in the free
    /// map is reachable from exactly one header (indirect blocks
    /// included), names are unique, sizes are coherent.
    pub fn check(&mut self) -> bool {
        logger::kdebug!('f', "performing filesystem check");
        let mut error = false;

        // 锁序与其余操作一致: 先目录后位图
        self.directory_file.lock_file();
        self.free_map_file.lock_file();

        let mut shadow = Bitmap::new(NUM_SECTORS);
        shadow.mark(FREE_MAP_SECTOR);
        shadow.mark(DIRECTORY_SECTOR);

        let map_header = FileHeader::fetch_from(FREE_MAP_SECTOR);
        error |= check_for_error(
            map_header.length() == FREE_MAP_FILE_SIZE,
            "bad bitmap header: wrong file size",
        );
        error |= check_file_header(&map_header, &mut shadow);

        let dir_header = FileHeader::fetch_from(DIRECTORY_SECTOR);
        error |= check_file_header(&dir_header, &mut shadow);

        let mut root = Directory::new();
        root.fetch_from(&mut self.directory_file);
        error |= check_directory(&root, &mut shadow);

        let free_map = self.fetch_free_map();
        for sector in 0..NUM_SECTORS {
            error |= check_for_error(
                free_map.test(sector) == shadow.test(sector),
                "inconsistent bitmap",
            );
        }

        self.free_map_file.unlock_file();
        self.directory_file.unlock_file();

        logger::kdebug!(
            'f',
            "filesystem check {}",
            if error { "failed" } else { "succeeded" }
        );
        !error
    }

    /// Print everything about the filesystem.
    pub fn print(&mut self, recursive: bool) {
        println!("--------------------------------");
        FileHeader::fetch_from(FREE_MAP_SECTOR).print(Some("Bitmap"));
        println!("--------------------------------");
        FileHeader::fetch_from(DIRECTORY_SECTOR).print(Some("Directory"));
        println!("--------------------------------");

        self.directory_file.lock_file();
        let mut root = Directory::new();
        root.fetch_from(&mut self.directory_file);
        self.directory_file.unlock_file();

        root.print();
        if recursive {
            for entry in root.entries() {
                if FileHeader::fetch_from(entry.sector).is_directory() {
                    println!("--------------------------------");
                    let mut subdir_file = OpenFile::new(entry.sector);
                    subdir_file.lock_file();
                    let mut subdir = Directory::new();
                    subdir.fetch_from(&mut subdir_file);
                    subdir_file.unlock_file();
                    subdir.print();
                }
            }
        }
        println!("--------------------------------");
    }
}

fn check_for_error(ok: bool, message: &str) -> bool {
    if !ok {
        logger::kdebug!('f', "error: {}", message);
    }
    !ok
}

fn check_sector(sector: usize, shadow: &mut Bitmap) -> bool {
    if check_for_error(sector < NUM_SECTORS, "sector number too big") {
        return true;
    }
    if shadow.test(sector) {
        return check_for_error(false, "sector number already used");
    }
    shadow.mark(sector);
    false
}

fn check_file_header(header: &FileHeader, shadow: &mut Bitmap) -> bool {
    let mut error = false;
    let num_sectors = header.num_sectors();

    error |= check_for_error(
        num_sectors == component::ceil_index!(header.length().max(1), machine::disk::SECTOR_SIZE)
            || (header.length() == 0 && num_sectors == 0),
        "sector count not compatible with file size",
    );

    for vs in 0..num_sectors.min(NUM_DIRECT) {
        error |= check_sector(header.direct_sectors()[vs] as usize, shadow);
    }

    if num_sectors > NUM_DIRECT {
        error |= check_sector(header.indirect_sector() as usize, shadow);
        let table = read_ptr_sector(header.indirect_sector() as usize);
        for si in 0..(num_sectors - NUM_DIRECT).min(NUM_DATAPTR) {
            error |= check_sector(table[si] as usize, shadow);
        }
    }

    if num_sectors > NUM_DIRECT + NUM_DATAPTR {
        let remaining = num_sectors - NUM_DIRECT - NUM_DATAPTR;
        error |= check_sector(header.double_indirect_sector() as usize, shadow);
        let tables = read_ptr_sector(header.double_indirect_sector() as usize);
        for ti in 0..component::ceil_index!(remaining, NUM_DATAPTR) {
            error |= check_sector(tables[ti] as usize, shadow);
            let table = read_ptr_sector(tables[ti] as usize);
            for si in 0..(remaining - ti * NUM_DATAPTR).min(NUM_DATAPTR) {
                error |= check_sector(table[si] as usize, shadow);
            }
        }
    }

    error
}

fn check_directory(entries: &Directory, shadow: &mut Bitmap) -> bool {
    let mut error = false;
    let mut seen: Vec<&str> = Vec::new();

    for entry in entries.entries() {
        error |= check_for_error(
            entry.name.len() <= FILE_NAME_MAX_LEN,
            "file name too long",
        );
        if seen.contains(&entry.name.as_str()) {
            error |= check_for_error(false, "repeated file name");
        } else {
            seen.push(&entry.name);
        }

        error |= check_sector(entry.sector, shadow);

        let header = FileHeader::fetch_from(entry.sector);
        error |= check_file_header(&header, shadow);

        if header.is_directory() {
            let mut subdir_file = OpenFile::new(entry.sector);
            subdir_file.lock_file();
            let mut subdir = Directory::new();
            subdir.fetch_from(&mut subdir_file);
            subdir_file.unlock_file();
            error |= check_directory(&subdir, shadow);
        }
    }
    error
}
