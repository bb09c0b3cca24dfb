//! Virtual-memory scenarios: demand paging, swap round-trips, TLB
//! coherence, eager mode.

mod common;

use common::run_test;
use machine::mmu::TranslationFlags;
use machine::{machine, PAGE_SIZE, NUM_PHYS_PAGES};
use mikos::memory::address_space::AddressSpace;
use mikos::memory::executable;
use mikos::syscall::transfer;
use mikos::system;
use mikos::thread;

// 把一份映像写进文件系统再打开成地址空间
fn build_space(name: &str, code: &[u8], init_data: &[u8], uninit: usize) -> AddressSpace {
    let image = executable::build_image(code, init_data, uninit);
    assert!(system::file_system().create(name, 0));
    let mut file = system::file_system().open(name).unwrap();
    assert_eq!(file.write(&image), image.len());
    drop(file);

    let file = system::file_system().open(name).unwrap();
    let tid = thread::current_thread().tid();
    AddressSpace::new(file, tid).expect("address space creation failed")
}

fn adopt_space(space: AddressSpace) {
    let current = thread::current_thread();
    current.set_space(space);
    current.space().unwrap().restore_state();
}

fn drop_space() {
    let current = thread::current_thread();
    system::core_map().free_all(current.tid());
    drop(current.take_space());
}

/// Demand paging end to end: pages fault in from the image, dirty
/// pages survive eviction through the swap file, and every byte reads
/// back as last written.
#[test]
fn demand_paging_swaps_and_restores() {
    run_test(|options| options.use_tlb = true, || {
        let code: Vec<u8> = (0..PAGE_SIZE).map(|i| (i % 7) as u8).collect();
        let data: Vec<u8> = (0..PAGE_SIZE * 2).map(|i| (i % 11) as u8).collect();
        // bss 大到物理内存装不下整个地址空间, 逼出换页
        let uninit = PAGE_SIZE * (NUM_PHYS_PAGES + 4);

        let space = build_space("prog", &code, &data, uninit);
        let num_pages = space.num_pages();
        assert!(num_pages > NUM_PHYS_PAGES);
        adopt_space(space);

        // 交换文件已随地址空间出现
        let tid = thread::current_thread().tid();
        assert!(system::file_system()
            .root_names()
            .contains(&format!("swap.{}", tid)));

        // 初始化数据段按映像内容缺页进来
        let data_base = code.len();
        let mut back = vec![0u8; data.len()];
        transfer::read_buffer_from_user(data_base, &mut back);
        assert_eq!(back, data);

        // 把每一页都写上身份戳, 远超物理页数, 途中必然有人被换出
        let bss_base = code.len() + data.len();
        for page in 0..(uninit / PAGE_SIZE) {
            let addr = bss_base + page * PAGE_SIZE;
            transfer::write_buffer_to_user(&[page as u8, (page ^ 0x5a) as u8], addr);
        }

        // 全部读回: 被换出的页要从交换文件原样回来
        for page in 0..(uninit / PAGE_SIZE) {
            let addr = bss_base + page * PAGE_SIZE;
            let mut pair = [0u8; 2];
            transfer::read_buffer_from_user(addr, &mut pair);
            assert_eq!(pair, [page as u8, (page ^ 0x5a) as u8], "page {}", page);
        }

        // 代码页只读地待在 TLB 或页表里
        let first = transfer::read_word_from_user(0);
        assert_eq!(first.to_le_bytes()[0], code[0]);
        assert!(machine()
            .mmu
            .tlb()
            .iter()
            .any(|e| e.is_valid() && e.vpn == 0 && e.is_read_only()));

        drop_space();
        // 交换文件随空间一起消失
        assert!(!system::file_system()
            .root_names()
            .contains(&format!("swap.{}", tid)));
        assert!(system::file_system().check());
    });
}

/// Every valid TLB entry agrees with the owner's page table: nothing
/// keeps translating into a frame that was taken away.
#[test]
fn tlb_never_outlives_an_eviction() {
    run_test(|options| options.use_tlb = true, || {
        let code: Vec<u8> = vec![0x42; PAGE_SIZE];
        let uninit = PAGE_SIZE * (NUM_PHYS_PAGES + 8);
        let space = build_space("prog", &code, &[], uninit);
        adopt_space(space);

        let bss_base = PAGE_SIZE;
        for sweep in 0..2 {
            for page in 0..(uninit / PAGE_SIZE) {
                let addr = bss_base + page * PAGE_SIZE;
                transfer::write_buffer_to_user(&[sweep as u8], addr);

                // 任何有效的 TLB 表项都必须与页表一致:
                // 被换出的页不许留下还在翻译的残影
                let current = thread::current_thread();
                let space = current.space().unwrap();
                for entry in machine().mmu.tlb() {
                    if entry.is_valid() {
                        assert_eq!(
                            space.resident_frame(entry.vpn),
                            Some(entry.ppn),
                            "TLB entry for vpn {} outlived its frame",
                            entry.vpn
                        );
                    }
                }
            }
        }

        drop_space();
        assert!(system::file_system().check());
    });
}

/// Page-table mode: the whole image is resident up front and the
/// machine translates through the installed table.
#[test]
fn eager_mode_loads_everything() {
    run_test(|options| options.use_tlb = false, || {
        let code: Vec<u8> = (0..PAGE_SIZE).map(|i| (i % 13) as u8).collect();
        let data: Vec<u8> = (0..PAGE_SIZE).map(|i| (i % 17) as u8).collect();

        let free_before = system::core_map().free_frames();
        let space = build_space("prog", &code, &data, PAGE_SIZE);
        let pages = space.num_pages();
        adopt_space(space);
        assert_eq!(system::core_map().free_frames(), free_before - pages);

        // 代码与数据直接可读
        let mut back = vec![0u8; code.len()];
        transfer::read_buffer_from_user(0, &mut back);
        assert_eq!(back, code);
        transfer::read_buffer_from_user(code.len(), &mut back);
        assert_eq!(back, data);

        // bss 清零且可写
        let bss = code.len() + data.len();
        let mut zero = [0xffu8; 8];
        transfer::read_buffer_from_user(bss, &mut zero);
        assert_eq!(zero, [0u8; 8]);
        transfer::write_buffer_to_user(b"resident", bss);

        drop_space();
        assert_eq!(system::core_map().free_frames(), free_before);
        assert!(system::file_system().check());
    });
}

/// A dirty entry dropped from the TLB carries its bits back into the
/// page table (the reclaimer depends on them).
#[test]
fn tlb_eviction_propagates_dirty_bits() {
    run_test(|options| options.use_tlb = true, || {
        let code: Vec<u8> = vec![1; 16];
        let uninit = PAGE_SIZE * 8;
        let space = build_space("prog", &code, &[], uninit);
        adopt_space(space);

        // 写脏一页, 再触碰足够多的页把它从 TLB 里挤出去
        let target = PAGE_SIZE;
        transfer::write_buffer_to_user(&[9u8], target);
        for page in 2..2 + machine::TLB_SIZE + 1 {
            transfer::write_buffer_to_user(&[0u8], page * PAGE_SIZE);
        }

        let current = thread::current_thread();
        let space = current.space().unwrap();
        assert!(!machine()
            .mmu
            .tlb()
            .iter()
            .any(|e| e.is_valid() && e.vpn == 1));
        assert!(space.dirty_bit(1), "dirty bit lost on TLB eviction");

        drop_space();
    });
}

/// Touching an address outside the space is flagged, not satisfied.
#[test]
fn out_of_range_translation_fails() {
    run_test(|options| options.use_tlb = true, || {
        let space = build_space("prog", &[1, 2, 3, 4], &[], PAGE_SIZE);
        let pages = space.num_pages();
        adopt_space(space);

        let current = thread::current_thread();
        let space = current.space().unwrap();
        assert!(space.translation_entry(pages + 1).is_none());

        drop_space();
    });
}

/// The flags of the translation machinery behave like flags.
#[test]
fn translation_flag_basics() {
    let flags = TranslationFlags::VALID | TranslationFlags::DIRTY;
    assert!(flags.contains(TranslationFlags::VALID));
    assert!(!flags.contains(TranslationFlags::READ_ONLY));
}
