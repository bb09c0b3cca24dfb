//! The on-disk file header (what UNIX would call the i-node).
//!
//! Exactly one sector: byte and sector counts, a directory flag,
//! `NUM_DIRECT` direct sector pointers, one indirect pointer and one
//! double-indirect pointer. Allocation draws sectors from the free
//! bitmap; extension grows a file one sector at a time, conjuring the
//! indirect descriptors only when first needed.
//!
//! Freshly allocated data sectors are zeroed on the spot, so a file
//! never leaks a previous owner's bytes through newly grown regions.

use component::bitmap::Bitmap;
use component::ceil_index;
use machine::disk::SECTOR_SIZE;

use super::{MAX_FILE_SIZE, NUM_DATAPTR, NUM_DIRECT};
use crate::system;

#[derive(Clone)]
pub struct FileHeader {
    num_bytes: u32,
    num_sectors: u32,
    directory: bool,
    data_sectors: [u32; NUM_DIRECT],
    indirect: u32,
    double_indirect: u32,
}

impl FileHeader {
    pub fn new() -> Self {
        Self {
            num_bytes: 0,
            num_sectors: 0,
            directory: false,
            data_sectors: [0; NUM_DIRECT],
            indirect: 0,
            double_indirect: 0,
        }
    }

    /// Bytes in the file.
    pub fn length(&self) -> usize {
        self.num_bytes as usize
    }

    pub fn num_sectors(&self) -> usize {
        self.num_sectors as usize
    }

    pub fn is_directory(&self) -> bool {
        self.directory
    }

    // ------------------------------------------------------------------
    // 磁盘上的持久形态

    pub fn fetch_from(sector: usize) -> Self {
        let mut raw = [0u8; SECTOR_SIZE];
        system::synch_disk().read_sector(sector, &mut raw);
        Self::decode(&raw)
    }

    pub fn write_back(&self, sector: usize) {
        let mut raw = [0u8; SECTOR_SIZE];
        self.encode(&mut raw);
        system::synch_disk().write_sector(sector, &raw);
    }

    fn decode(raw: &[u8]) -> Self {
        let word = |i: usize| u32::from_le_bytes(raw[i * 4..i * 4 + 4].try_into().unwrap());
        let mut data_sectors = [0u32; NUM_DIRECT];
        for (i, slot) in data_sectors.iter_mut().enumerate() {
            *slot = word(3 + i);
        }
        Self {
            num_bytes: word(0),
            num_sectors: word(1),
            directory: word(2) != 0,
            data_sectors,
            indirect: word(3 + NUM_DIRECT),
            double_indirect: word(4 + NUM_DIRECT),
        }
    }

    fn encode(&self, raw: &mut [u8]) {
        let mut put = |i: usize, v: u32| raw[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
        put(0, self.num_bytes);
        put(1, self.num_sectors);
        put(2, self.directory as u32);
        for (i, sector) in self.data_sectors.iter().enumerate() {
            put(3 + i, *sector);
        }
        put(3 + NUM_DIRECT, self.indirect);
        put(4 + NUM_DIRECT, self.double_indirect);
    }

    // ------------------------------------------------------------------
    // 分配与回收

    /// Sectors of indirect bookkeeping a file of `num_sectors` data
    /// sectors needs.
    fn indirect_sectors_for(num_sectors: usize) -> usize {
        let mut count = 0;
        if num_sectors > NUM_DIRECT {
            count += 1;
        }
        if num_sectors > NUM_DIRECT + NUM_DATAPTR {
            count += 1 + ceil_index!(num_sectors - NUM_DIRECT - NUM_DATAPTR, NUM_DATAPTR);
        }
        count
    }

    /// Initialize a fresh header of `size` bytes, drawing data and
    /// indirect sectors from `free_map`. Returns false when the file
    /// would not fit.
    pub fn allocate(&mut self, free_map: &mut Bitmap, size: usize, directory: bool) -> bool {
        if size > MAX_FILE_SIZE {
            return false;
        }

        let num_sectors = ceil_index!(size, SECTOR_SIZE);
        if free_map.count_clear() < num_sectors + Self::indirect_sectors_for(num_sectors) {
            return false;
        }

        self.num_bytes = size as u32;
        self.directory = directory;

        // 逐扇区追加, 间接描述块在途中按需占位
        self.num_sectors = 0;
        for vs in 0..num_sectors {
            self.append_sector(free_map, vs);
            self.num_sectors = (vs + 1) as u32;
        }
        true
    }

    /// Grow the file to `new_size` bytes. Growth is monotonic; a size
    /// not past the current one is a no-op.
    pub fn extend(&mut self, free_map: &mut Bitmap, new_size: usize) -> bool {
        if new_size <= self.num_bytes as usize {
            return true;
        }
        if new_size > MAX_FILE_SIZE {
            return false;
        }

        let old_sectors = self.num_sectors as usize;
        let new_sectors = ceil_index!(new_size, SECTOR_SIZE);
        let needed = (new_sectors - old_sectors)
            + Self::indirect_sectors_for(new_sectors)
            - Self::indirect_sectors_for(old_sectors);
        if free_map.count_clear() < needed {
            return false;
        }

        for vs in old_sectors..new_sectors {
            self.append_sector(free_map, vs);
            self.num_sectors = (vs + 1) as u32;
        }
        self.num_bytes = new_size as u32;
        true
    }

    // 为文件的第 vs 个扇区找一块盘, 维护间接结构
    fn append_sector(&mut self, free_map: &mut Bitmap, vs: usize) {
        let sector = Self::grab_zeroed(free_map);

        if vs < NUM_DIRECT {
            self.data_sectors[vs] = sector;
        } else if vs < NUM_DIRECT + NUM_DATAPTR {
            if vs == NUM_DIRECT {
                self.indirect = Self::grab_zeroed(free_map);
            }
            let mut table = read_ptr_sector(self.indirect as usize);
            table[vs - NUM_DIRECT] = sector;
            write_ptr_sector(self.indirect as usize, &table);
        } else {
            let rel = vs - NUM_DIRECT - NUM_DATAPTR;
            let (ti, si) = (rel / NUM_DATAPTR, rel % NUM_DATAPTR);
            if rel == 0 {
                self.double_indirect = Self::grab_zeroed(free_map);
            }
            let mut tables = read_ptr_sector(self.double_indirect as usize);
            if si == 0 {
                tables[ti] = Self::grab_zeroed(free_map);
                write_ptr_sector(self.double_indirect as usize, &tables);
            }
            let mut table = read_ptr_sector(tables[ti] as usize);
            table[si] = sector;
            write_ptr_sector(tables[ti] as usize, &table);
        }
    }

    // 占一个空闲扇区并抹零
    fn grab_zeroed(free_map: &mut Bitmap) -> u32 {
        let sector = free_map.find().expect("free map exhausted after the space check");
        system::synch_disk().write_sector(sector, &[0u8; SECTOR_SIZE]);
        sector as u32
    }

    /// Return every sector of this file to the free map. Each one must
    /// have been marked allocated, or the filesystem is corrupt.
    pub fn deallocate(&self, free_map: &mut Bitmap) {
        let release = |free_map: &mut Bitmap, sector: u32| {
            assert!(free_map.test(sector as usize), "freeing an unallocated sector");
            free_map.clear(sector as usize);
        };

        let num_sectors = self.num_sectors as usize;

        for vs in 0..num_sectors.min(NUM_DIRECT) {
            release(free_map, self.data_sectors[vs]);
        }

        if num_sectors > NUM_DIRECT {
            let table = read_ptr_sector(self.indirect as usize);
            for si in 0..(num_sectors - NUM_DIRECT).min(NUM_DATAPTR) {
                release(free_map, table[si]);
            }
            release(free_map, self.indirect);
        }

        if num_sectors > NUM_DIRECT + NUM_DATAPTR {
            let remaining = num_sectors - NUM_DIRECT - NUM_DATAPTR;
            let tables = read_ptr_sector(self.double_indirect as usize);
            for ti in 0..ceil_index!(remaining, NUM_DATAPTR) {
                let table = read_ptr_sector(tables[ti] as usize);
                for si in 0..(remaining - ti * NUM_DATAPTR).min(NUM_DATAPTR) {
                    release(free_map, table[si]);
                }
                release(free_map, tables[ti]);
            }
            release(free_map, self.double_indirect);
        }
    }

    /// Which disk sector stores the byte at `offset`.
    pub fn byte_to_sector(&self, offset: usize) -> usize {
        let vs = offset / SECTOR_SIZE;
        assert!(vs < self.num_sectors as usize, "offset {} beyond the file", offset);

        if vs < NUM_DIRECT {
            return self.data_sectors[vs] as usize;
        }

        if vs < NUM_DIRECT + NUM_DATAPTR {
            let table = read_ptr_sector(self.indirect as usize);
            return table[vs - NUM_DIRECT] as usize;
        }

        let rel = vs - NUM_DIRECT - NUM_DATAPTR;
        let tables = read_ptr_sector(self.double_indirect as usize);
        let table = read_ptr_sector(tables[rel / NUM_DATAPTR] as usize);
        table[rel % NUM_DATAPTR] as usize
    }

    /// Print the header and the contents of its direct blocks.
    pub fn print(&self, title: Option<&str>) {
        match title {
            Some(title) => println!("{} file header:", title),
            None => println!("File header:"),
        }
        println!("    size: {} bytes", self.num_bytes);
        print!("    block indexes:");
        for vs in 0..(self.num_sectors as usize).min(NUM_DIRECT) {
            print!(" {}", self.data_sectors[vs]);
        }
        println!();
        if self.num_sectors as usize > NUM_DIRECT {
            println!("    contents of indirect blocks omitted");
        }
    }

    /// Direct view used by the consistency checker.
    pub(crate) fn direct_sectors(&self) -> &[u32; NUM_DIRECT] {
        &self.data_sectors
    }

    pub(crate) fn indirect_sector(&self) -> u32 {
        self.indirect
    }

    pub(crate) fn double_indirect_sector(&self) -> u32 {
        self.double_indirect
    }
}

impl Default for FileHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// Read a sector holding an array of sector numbers.
pub(crate) fn read_ptr_sector(sector: usize) -> [u32; NUM_DATAPTR] {
    let mut raw = [0u8; SECTOR_SIZE];
    system::synch_disk().read_sector(sector, &mut raw);
    let mut table = [0u32; NUM_DATAPTR];
    for (i, slot) in table.iter_mut().enumerate() {
        *slot = u32::from_le_bytes(raw[i * 4..i * 4 + 4].try_into().unwrap());
    }
    table
}

pub(crate) fn write_ptr_sector(sector: usize, table: &[u32; NUM_DATAPTR]) {
    let mut raw = [0u8; SECTOR_SIZE];
    for (i, value) in table.iter().enumerate() {
        raw[i * 4..i * 4 + 4].copy_from_slice(&value.to_le_bytes());
    }
    system::synch_disk().write_sector(sector, &raw);
}
