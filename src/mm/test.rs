//! Self-tests do subsistema de memória.

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::klib::test_framework::{run_test_suite, TestCase, TestResult};
use crate::mm::pmm::{self, FRAME_SIZE};
use crate::mm::vmm::{AddressSpace, PageFlags};

pub const MM_TESTS: &[TestCase] = &[
    TestCase::new("pmm_aloc_contigua_alinhada", test_pmm_contiguous),
    TestCase::new("pmm_free_e_reuso", test_pmm_free_reuse),
    TestCase::new("heap_box_vec", test_heap_alloc),
    TestCase::new("vmm_map_translate_unmap", test_vmm_mapping),
    TestCase::new("vmm_isolamento_entre_espacos", test_vmm_isolation),
];

/// Frames contíguos e alinhados a 4 KiB.
fn test_pmm_contiguous() -> TestResult {
    let Some(phys) = pmm::alloc_frames(4) else {
        return TestResult::Fail;
    };
    crate::kassert_eq!(phys % FRAME_SIZE as u64, 0);
    crate::kassert!(pmm::FRAME_ALLOCATOR.lock().is_allocated(phys));
    crate::kassert!(pmm::FRAME_ALLOCATOR
        .lock()
        .is_allocated(phys + 3 * FRAME_SIZE as u64));
    pmm::free_frames(phys, 4);
    crate::kassert!(!pmm::FRAME_ALLOCATOR.lock().is_allocated(phys));
    TestResult::Pass
}

/// free devolve os frames ao bitmap (contagem de uso volta ao início).
fn test_pmm_free_reuse() -> TestResult {
    let (used_before, _) = pmm::FRAME_ALLOCATOR.lock().usage();
    let Some(a) = pmm::alloc_frames(2) else {
        return TestResult::Fail;
    };
    let Some(b) = pmm::alloc_frames(2) else {
        pmm::free_frames(a, 2);
        return TestResult::Fail;
    };
    crate::kassert!(a != b);
    pmm::free_frames(a, 2);
    pmm::free_frames(b, 2);
    let (used_after, _) = pmm::FRAME_ALLOCATOR.lock().usage();
    crate::kassert_eq!(used_before, used_after);
    TestResult::Pass
}

/// O heap recicla: aloca, solta e aloca de novo sem esgotar.
fn test_heap_alloc() -> TestResult {
    for _ in 0..64 {
        let boxed = Box::new([0u8; 4096]);
        crate::kassert_eq!(boxed[0], 0);

        let mut numbers: Vec<u64> = Vec::with_capacity(512);
        for i in 0..512u64 {
            numbers.push(i);
        }
        let sum: u64 = numbers.iter().sum();
        crate::kassert_eq!(sum, 511 * 512 / 2);
    }
    TestResult::Pass
}

/// map → translate → unmap num espaço novo.
fn test_vmm_mapping() -> TestResult {
    let Some(frame) = pmm::alloc_frames(1) else {
        return TestResult::Fail;
    };
    let Some(mut space) = AddressSpace::new() else {
        pmm::free_frames(frame, 1);
        return TestResult::Fail;
    };

    let virt = 0x3000_0000u64;
    crate::kassert!(space.map_pages(virt, frame, 1, PageFlags::USER_RW).is_ok());
    crate::kassert_eq!(space.translate(virt), Some(frame));
    crate::kassert_eq!(space.translate(virt + 0x123), Some(frame + 0x123));

    space.unmap_pages(virt, 1);
    crate::kassert_eq!(space.translate(virt), None);

    // O espaço liberará o frame no teardown
    space.adopt_frames(frame, 1);
    drop(space);
    crate::kassert!(!pmm::FRAME_ALLOCATOR.lock().is_allocated(frame));
    TestResult::Pass
}

/// Dois espaços com o mesmo virtual resolvem para físicos disjuntos.
fn test_vmm_isolation() -> TestResult {
    let (Some(frame_a), Some(frame_b)) = (pmm::alloc_frames(1), pmm::alloc_frames(1)) else {
        return TestResult::Fail;
    };
    let (Some(mut space_a), Some(mut space_b)) = (AddressSpace::new(), AddressSpace::new())
    else {
        pmm::free_frames(frame_a, 1);
        pmm::free_frames(frame_b, 1);
        return TestResult::Fail;
    };

    let virt = crate::process::USER_CODE_BASE;
    crate::kassert!(space_a.map_pages(virt, frame_a, 1, PageFlags::USER_CODE).is_ok());
    crate::kassert!(space_b.map_pages(virt, frame_b, 1, PageFlags::USER_CODE).is_ok());

    let resolved_a = space_a.translate(virt);
    let resolved_b = space_b.translate(virt);
    crate::kassert_eq!(resolved_a, Some(frame_a));
    crate::kassert_eq!(resolved_b, Some(frame_b));
    crate::kassert!(resolved_a != resolved_b);

    space_a.adopt_frames(frame_a, 1);
    space_b.adopt_frames(frame_b, 1);
    TestResult::Pass
}

pub fn run_memory_tests() {
    run_test_suite("mm", MM_TESTS);
}
