//! User executable images.
//!
//! A flat format: a fixed header naming the code and initialized-data
//! segments (sizes, virtual addresses, file offsets) and the size of
//! the zero-filled uninitialized segment. Code must start at virtual
//! address 0, initialized data must follow the code contiguously, and
//! uninitialized data comes after that. The two stored segments are
//! randomly addressable, which is what demand paging needs.

use crate::fs::open_file::OpenFile;

/// First header word of every valid image.
pub const MAGIC: u32 = 0x00ba_dfad;

/// Header: magic + 7 descriptor words.
pub const HEADER_BYTES: usize = 8 * 4;

pub struct Executable {
    file: OpenFile,
    code_size: usize,
    code_vaddr: usize,
    code_file_off: usize,
    init_data_size: usize,
    init_data_vaddr: usize,
    init_data_file_off: usize,
    uninit_data_size: usize,
}

impl Executable {
    /// Parse the header of `file`; `None` when the magic or segment
    /// layout is wrong.
    pub fn new(mut file: OpenFile) -> Option<Self> {
        let mut raw = [0u8; HEADER_BYTES];
        if file.read_at(&mut raw, 0) != HEADER_BYTES {
            return None;
        }
        let word =
            |i: usize| u32::from_le_bytes(raw[i * 4..i * 4 + 4].try_into().unwrap()) as usize;

        if word(0) as u32 != MAGIC {
            return None;
        }
        let exe = Self {
            file,
            code_size: word(1),
            code_vaddr: word(2),
            code_file_off: word(3),
            init_data_size: word(4),
            init_data_vaddr: word(5),
            init_data_file_off: word(6),
            uninit_data_size: word(7),
        };

        // 代码起于虚址 0, 数据紧随其后
        if exe.code_vaddr != 0 {
            return None;
        }
        if exe.init_data_size != 0 && exe.init_data_vaddr != exe.code_vaddr + exe.code_size {
            return None;
        }
        Some(exe)
    }

    /// Total bytes of address space the image needs, stack excluded.
    pub fn size(&self) -> usize {
        self.code_size + self.init_data_size + self.uninit_data_size
    }

    pub fn code_size(&self) -> usize {
        self.code_size
    }

    pub fn code_vaddr(&self) -> usize {
        self.code_vaddr
    }

    pub fn init_data_size(&self) -> usize {
        self.init_data_size
    }

    pub fn init_data_vaddr(&self) -> usize {
        self.init_data_vaddr
    }

    pub fn uninit_data_size(&self) -> usize {
        self.uninit_data_size
    }

    /// Virtual address where the zero-filled segment begins.
    pub fn uninit_data_vaddr(&self) -> usize {
        if self.init_data_size > 0 {
            self.init_data_vaddr + self.init_data_size
        } else {
            self.code_vaddr + self.code_size
        }
    }

    /// Read `buf.len()` bytes of code, starting `offset` bytes into
    /// the code segment.
    pub fn read_code_block(&mut self, buf: &mut [u8], offset: usize) -> usize {
        self.file.read_at(buf, self.code_file_off + offset)
    }

    /// Read `buf.len()` bytes of initialized data, starting `offset`
    /// bytes into that segment.
    pub fn read_data_block(&mut self, buf: &mut [u8], offset: usize) -> usize {
        self.file.read_at(buf, self.init_data_file_off + offset)
    }
}

/// Serialize an image (the job the cross-toolchain does for real
/// programs; tests and tools build small images directly).
pub fn build_image(code: &[u8], init_data: &[u8], uninit_data_size: usize) -> Vec<u8> {
    let mut image = vec![0u8; HEADER_BYTES];
    let mut put = |i: usize, v: u32| image[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
    put(0, MAGIC);
    put(1, code.len() as u32);
    put(2, 0);
    put(3, HEADER_BYTES as u32);
    put(4, init_data.len() as u32);
    put(5, code.len() as u32);
    put(6, (HEADER_BYTES + code.len()) as u32);
    put(7, uninit_data_size as u32);
    image.extend_from_slice(code);
    image.extend_from_slice(init_data);
    image
}
