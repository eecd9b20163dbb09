//! End-to-end paging scenarios: stack growth, protection enforcement,
//! lazy file loading, mmap writeback, and swap round-trips.

mod common;

use common::{boot, TEST_ESP};
use kestrel_kernel::error::KernelError;
use kestrel_kernel::fs;
use kestrel_kernel::mm::fault::{self, FaultCode};
use kestrel_kernel::mm::spt::{PageLocation, PagePurpose};
use kestrel_kernel::mm::{frame, mmap, swap, usermem, PAGE_SIZE, PHYS_BASE, STACK_LIMIT};
use kestrel_kernel::process;

const USER_FAULT: FaultCode = FaultCode::USER;

#[test]
fn stack_growth_within_pusha_slack() {
    let (_guard, main) = boot(16, 64);
    main.set_saved_esp(0xBFFF_F000);

    // PUSHA touches 32 bytes below esp; the resolver must grow the stack.
    let fault_addr = 0xBFFF_EFE0;
    fault::resolve(&main, fault_addr, FaultCode::WRITE | USER_FAULT).unwrap();

    let descriptor_page = 0xBFFF_E000;
    {
        let spt = main.spt.lock();
        let descriptor = spt.lookup(descriptor_page).expect("stack page registered");
        assert_eq!(descriptor.purpose, PagePurpose::Stack);
        assert!(matches!(descriptor.location, PageLocation::Resident(_)));
    }
    assert!(main.pagedir.lock().get_page(descriptor_page).is_some());
    // The saved stack pointer followed the growth.
    assert!(main.saved_esp() <= fault_addr);

    // Re-access hits the installed mapping, not the resolver.
    let faults_before = fault::fault_count();
    usermem::copy_out(&main, fault_addr, &[0xAB]).unwrap();
    assert_eq!(fault::fault_count(), faults_before);
}

#[test]
fn access_too_far_below_esp_is_fatal() {
    let (_guard, main) = boot(16, 64);
    main.set_saved_esp(0xBFFF_F000);

    // One byte past the PUSHA slack.
    let result = fault::resolve(&main, 0xBFFF_EFDF, FaultCode::WRITE | USER_FAULT);
    assert_eq!(
        result,
        Err(KernelError::InvalidAddress { addr: 0xBFFF_EFDF })
    );
}

#[test]
fn stack_cannot_exceed_eight_mebibytes() {
    let (_guard, main) = boot(16, 64);
    main.set_saved_esp(STACK_LIMIT);

    let below_limit = STACK_LIMIT - 1;
    let result = fault::resolve(&main, below_limit, FaultCode::WRITE | USER_FAULT);
    assert_eq!(result, Err(KernelError::InvalidAddress { addr: below_limit }));

    // The limit itself is still fair game.
    fault::resolve(&main, STACK_LIMIT, FaultCode::WRITE | USER_FAULT).unwrap();
}

#[test]
fn kernel_addresses_never_resolve() {
    let (_guard, main) = boot(16, 64);
    assert!(fault::resolve(&main, 0, USER_FAULT).is_err());
    assert!(fault::resolve(&main, PHYS_BASE, USER_FAULT).is_err());
    assert!(fault::resolve(&main, PHYS_BASE + 0x1000, USER_FAULT).is_err());
}

#[test]
fn write_to_read_only_segment_is_fatal() {
    let (_guard, main) = boot(16, 64);

    {
        let _fs = fs::lock();
        assert!(fs::create("prog", PAGE_SIZE));
    }
    let image = fs::open("prog").unwrap();
    let text_base = 0x0804_8000;
    main.load_segment(&image, 0, text_base, PAGE_SIZE, 0, false).unwrap();

    // Reading faults the page in from the file.
    let bytes = usermem::copy_in(&main, text_base, 16).unwrap();
    assert_eq!(bytes, vec![0u8; 16]);

    // Writing violates the mapping's permission.
    let result = fault::resolve(&main, text_base, FaultCode::WRITE | USER_FAULT);
    assert!(matches!(result, Err(KernelError::PermissionDenied { .. })));
    assert!(usermem::copy_out(&main, text_base, &[1]).is_err());
}

#[test]
fn short_read_during_fault_in_is_fatal() {
    let (_guard, main) = boot(16, 64);

    {
        let _fs = fs::lock();
        assert!(fs::create("tiny", 100));
    }
    let image = fs::open("tiny").unwrap();
    main.load_segment(&image, 0, 0x0804_8000, PAGE_SIZE, 0, true).unwrap();

    let free_before = frame::free_frames();
    let result = fault::resolve(&main, 0x0804_8000, USER_FAULT);
    assert_eq!(
        result,
        Err(KernelError::ShortRead {
            expected: PAGE_SIZE,
            actual: 100,
        })
    );
    // The frame grabbed for the load went back to the pool.
    assert_eq!(frame::free_frames(), free_before);
}

#[test]
fn mmap_dirty_page_writes_back_on_munmap() {
    let (_guard, main) = boot(16, 64);

    // A two-and-a-half-page file with a recognizable pattern.
    let len = 2 * PAGE_SIZE + PAGE_SIZE / 2;
    {
        let _fs = fs::lock();
        assert!(fs::create("mapped.bin", len));
    }
    let writer = fs::open("mapped.bin").unwrap();
    let pattern: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    {
        let _fs = fs::lock();
        writer.write_at(&pattern, 0);
    }

    let fd = {
        let handle = fs::open("mapped.bin").unwrap();
        main.files.lock().open(handle).unwrap()
    };
    let base = 0x1000_0000;
    let id = mmap::mmap(&main, fd, base).unwrap();

    // Dirty a byte in the middle page.
    usermem::copy_out(&main, base + PAGE_SIZE + 5, b"Z").unwrap();
    // Touch the last page read-only; it must stay clean.
    let tail = usermem::copy_in(&main, base + 2 * PAGE_SIZE, 8).unwrap();
    assert_eq!(tail, pattern[2 * PAGE_SIZE..2 * PAGE_SIZE + 8]);

    mmap::munmap(&main, id).unwrap();

    // File reflects the write, bounded by the page's read span.
    let mut expected = pattern.clone();
    expected[PAGE_SIZE + 5] = b'Z';
    let mut actual = vec![0u8; len];
    {
        let _fs = fs::lock();
        assert_eq!(writer.read_at(&mut actual, 0), len);
    }
    assert_eq!(actual, expected);

    // The region is gone: no descriptors, no mappings, faults again.
    assert!(main.spt.lock().is_empty());
    assert!(main.mmaps.lock().is_empty());
    assert!(fault::resolve(&main, base + PAGE_SIZE, USER_FAULT).is_err());
}

#[test]
fn mmap_ids_increase_within_a_process() {
    let (_guard, main) = boot(16, 64);
    {
        let _fs = fs::lock();
        assert!(fs::create("a.bin", PAGE_SIZE));
    }
    let fd = {
        let handle = fs::open("a.bin").unwrap();
        main.files.lock().open(handle).unwrap()
    };
    let first = mmap::mmap(&main, fd, 0x1000_0000).unwrap();
    let second = mmap::mmap(&main, fd, 0x2000_0000).unwrap();
    assert!(second > first);
}

#[test]
fn mmap_rejections() {
    let (_guard, main) = boot(16, 64);
    {
        let _fs = fs::lock();
        assert!(fs::create("a.bin", PAGE_SIZE));
        assert!(fs::create("empty.bin", 0));
    }
    let fd = {
        let handle = fs::open("a.bin").unwrap();
        main.files.lock().open(handle).unwrap()
    };
    let empty_fd = {
        let handle = fs::open("empty.bin").unwrap();
        main.files.lock().open(handle).unwrap()
    };

    // Console descriptors, null, unaligned, zero-length backing.
    assert!(mmap::mmap(&main, 0, 0x1000_0000).is_err());
    assert!(mmap::mmap(&main, 1, 0x1000_0000).is_err());
    assert!(mmap::mmap(&main, fd, 0).is_err());
    assert!(mmap::mmap(&main, fd, 0x1000_0100).is_err());
    assert!(mmap::mmap(&main, empty_fd, 0x1000_0000).is_err());

    // The page below the kernel boundary is off-limits.
    assert!(mmap::mmap(&main, fd, PHYS_BASE - PAGE_SIZE).is_err());

    // Collisions with existing descriptors.
    let id = mmap::mmap(&main, fd, 0x1000_0000).unwrap();
    assert!(mmap::mmap(&main, fd, 0x1000_0000).is_err());
    mmap::munmap(&main, id).unwrap();
    // And with the loaded image.
    {
        let _fs = fs::lock();
        assert!(fs::create("prog", PAGE_SIZE));
    }
    let image = fs::open("prog").unwrap();
    main.load_segment(&image, 0, 0x0804_8000, PAGE_SIZE, 0, true).unwrap();
    assert!(mmap::mmap(&main, fd, 0x0804_8000).is_err());
}

#[test]
fn swap_round_trip_preserves_contents() {
    // Four frames force early eviction.
    let (_guard, main) = boot(4, 64);
    main.set_saved_esp(TEST_ESP);

    let page_of = |i: usize| 0xBFFF_E000 - i * PAGE_SIZE;
    let pattern_of = |i: usize| vec![(i + 1) as u8; 128];

    for i in 0..6 {
        usermem::copy_out(&main, page_of(i), &pattern_of(i)).unwrap();
    }
    assert!(frame::evictions() >= 2);
    assert!(swap::slots_in_use() >= 2);

    // Every supplemental entry on swap owns exactly one allocated slot.
    {
        let spt = main.spt.lock();
        let swapped = spt
            .iter()
            .filter(|(_, d)| matches!(d.location, PageLocation::Swapped(_)))
            .count();
        assert_eq!(swapped, swap::slots_in_use());
    }

    // Touching the evicted pages swaps them back unchanged.
    for i in 0..6 {
        let bytes = usermem::copy_in(&main, page_of(i), 128).unwrap();
        assert_eq!(bytes, pattern_of(i), "page {} corrupted", i);
    }
    let (outs, ins) = swap::transfer_counts();
    assert!(outs >= 2 && ins >= 2);
}

#[test]
fn resident_pages_agree_with_frame_table() {
    let (_guard, main) = boot(8, 64);
    main.set_saved_esp(TEST_ESP);

    for i in 0..4 {
        usermem::copy_out(&main, 0xBFFF_E000 - i * PAGE_SIZE, &[i as u8]).unwrap();
    }

    let spt = main.spt.lock();
    let mut seen = std::collections::BTreeSet::new();
    for (vpage, descriptor) in spt.iter() {
        assert_eq!(descriptor.read_bytes + descriptor.zero_bytes, PAGE_SIZE);
        if let PageLocation::Resident(frame_nr) = descriptor.location {
            let user = frame::user_of(frame_nr).expect("resident frame has a user");
            assert_eq!(user.owner, main.pid);
            assert_eq!(user.vpage, vpage);
            // No frame serves two pages.
            assert!(seen.insert(frame_nr.index()));
        }
    }
}

#[test]
fn process_exit_releases_every_resource() {
    let (_guard, main) = boot(4, 64);
    main.set_saved_esp(TEST_ESP);

    {
        let _fs = fs::lock();
        assert!(fs::create("mapped.bin", PAGE_SIZE));
    }
    let fd = {
        let handle = fs::open("mapped.bin").unwrap();
        main.files.lock().open(handle).unwrap()
    };
    mmap::mmap(&main, fd, 0x1000_0000).unwrap();
    usermem::copy_out(&main, 0x1000_0000, b"dirty").unwrap();
    for i in 0..6 {
        usermem::copy_out(&main, 0xBFFF_E000 - i * PAGE_SIZE, &[7]).unwrap();
    }
    assert!(swap::slots_in_use() > 0);

    process::exit_current(0);

    let output = kestrel_kernel::console::take_output();
    assert!(output.contains("main: exit(0)"), "output was {:?}", output);
    assert_eq!(swap::slots_in_use(), 0);
    assert_eq!(frame::free_frames(), 4);
    assert!(main.spt.lock().is_empty());
    assert!(main.mmaps.lock().is_empty());

    // Writeback happened on the way out.
    let check = fs::open("mapped.bin").unwrap();
    let mut head = [0u8; 5];
    {
        let _fs = fs::lock();
        check.read_at(&mut head, 0);
    }
    assert_eq!(&head, b"dirty");
}
