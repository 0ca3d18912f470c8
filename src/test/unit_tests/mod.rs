/*
 * Trace-level scenarios exercising the public operations end to end. Every
 * scenario runs against its own small heap and asserts a clean checker
 * after each step.
 */

use crate::block::{CHUNKSIZE, DSIZE, blk_size};
use crate::explicit::ExplicitAllocator;
use crate::explicit::globals;
use crate::heap::Heap;
use crate::implicit::{CoalescePolicy, ImplicitAllocator};

/// First real payload offset: key word plus prologue.
const FIRST_BLOCK: u32 = 2 * DSIZE;

fn small_heap() -> ExplicitAllocator {
    ExplicitAllocator::with_heap(Heap::new(64 * 1024).unwrap()).unwrap()
}

fn free_blocks(alloc: &ExplicitAllocator) -> Vec<(u32, u32)> {
    let heap = alloc.heap();
    alloc
        .free_list()
        .iter(heap)
        .map(|bp| (bp, blk_size(heap, bp)))
        .collect()
}

#[test]
fn single_alloc_and_free_restores_one_spanning_block() {
    let mut alloc = small_heap();
    assert_eq!(alloc.heap().brk(), 4 * 4 + CHUNKSIZE);
    assert_eq!(alloc.check(false), 0);

    let a = alloc.alloc(1).unwrap();
    assert_eq!(alloc.heap().brk(), 4 * 4 + CHUNKSIZE);
    assert_eq!(alloc.check(false), 0);

    alloc.free(a);
    assert_eq!(alloc.check(false), 0);
    assert_eq!(free_blocks(&alloc), vec![(FIRST_BLOCK, CHUNKSIZE)]);
}

#[test]
fn freeing_the_middle_block_leaves_an_island() {
    let mut alloc = small_heap();

    let a = alloc.alloc(16).unwrap();
    let b = alloc.alloc(16).unwrap();
    let c = alloc.alloc(16).unwrap();

    unsafe {
        std::ptr::write_bytes(a, 0x11, 16);
        std::ptr::write_bytes(c, 0x33, 16);
    }

    alloc.free(b);
    assert_eq!(alloc.check(false), 0);

    let a_bp = alloc.heap().offset_of(a).unwrap();
    let c_bp = alloc.heap().offset_of(c).unwrap();
    let islands: Vec<(u32, u32)> = free_blocks(&alloc)
        .into_iter()
        .filter(|&(bp, _)| bp > a_bp && bp < c_bp)
        .collect();

    assert_eq!(islands.len(), 1);
    assert!(islands[0].1 >= 24);

    for i in 0..16 {
        assert_eq!(unsafe { a.add(i).read() }, 0x11);
        assert_eq!(unsafe { c.add(i).read() }, 0x33);
    }
}

#[test]
fn freeing_neighbors_coalesces_with_the_tail() {
    let mut alloc = small_heap();

    let a = alloc.alloc(16).unwrap();
    let b = alloc.alloc(16).unwrap();

    alloc.free(a);
    assert_eq!(alloc.check(false), 0);

    alloc.free(b);
    assert_eq!(alloc.check(false), 0);

    // a, b and the original tail fused back into one spanning block.
    assert_eq!(free_blocks(&alloc), vec![(FIRST_BLOCK, CHUNKSIZE)]);
}

#[test]
fn realloc_growth_preserves_the_payload_prefix() {
    let mut alloc = small_heap();

    let a = alloc.alloc(100).unwrap();
    for i in 0..100u8 {
        unsafe { a.add(i as usize).write(i.wrapping_mul(31)) };
    }

    // The seed tail sits right behind a, so growth stays in place.
    let b = alloc.realloc(a, 200).unwrap();
    assert_eq!(b, a);
    assert_eq!(alloc.check(false), 0);

    for i in 0..100u8 {
        assert_eq!(unsafe { b.add(i as usize).read() }, i.wrapping_mul(31));
    }
}

#[test]
fn exhaustion_returns_null_and_recovery_is_clean() {
    let mut alloc = small_heap();
    let mut live = Vec::new();

    loop {
        match alloc.alloc(1000) {
            Some(p) => {
                let tag = live.len() as u8;
                unsafe { std::ptr::write_bytes(p, tag, 1000) };
                live.push(p);
            }
            None => break,
        }
    }

    // The 64 KiB reservation holds a bounded number of kilobyte blocks.
    assert!(!live.is_empty());
    assert!(live.len() < 70);
    assert_eq!(alloc.check(false), 0);

    // Earlier allocations survived the failed growth untouched.
    for (tag, &p) in live.iter().enumerate() {
        for i in 0..1000 {
            assert_eq!(unsafe { p.add(i).read() }, tag as u8);
        }
    }

    for &p in &live {
        alloc.free(p);
    }
    assert_eq!(alloc.check(false), 0);

    let brk = alloc.heap().brk();
    assert_eq!(free_blocks(&alloc), vec![(FIRST_BLOCK, brk - FIRST_BLOCK)]);
}

#[test]
fn back_to_back_chunk_allocations_extend_contiguously() {
    let mut alloc = small_heap();

    let a = alloc.alloc(4088).unwrap();
    let b = alloc.alloc(4088).unwrap();
    assert_eq!(alloc.check(false), 0);

    let a_bp = alloc.heap().offset_of(a).unwrap();
    let b_bp = alloc.heap().offset_of(b).unwrap();
    assert_eq!(b_bp, a_bp + CHUNKSIZE);

    alloc.free(a);
    alloc.free(b);
    assert_eq!(alloc.check(false), 0);
    assert_eq!(free_blocks(&alloc), vec![(FIRST_BLOCK, 2 * CHUNKSIZE)]);
}

#[test]
fn payloads_are_doubleword_aligned() {
    let mut alloc = small_heap();

    for size in [1, 2, 3, 7, 8, 9, 15, 23, 100, 1021] {
        let p = alloc.alloc(size).unwrap();
        assert_eq!(p as usize % DSIZE as usize, 0, "size {}", size);
    }
    assert_eq!(alloc.check(false), 0);
}

#[test]
fn live_payloads_never_overlap() {
    let mut alloc = small_heap();

    let blocks: Vec<(*mut u8, u8)> = (0..8u8)
        .map(|tag| {
            let p = alloc.alloc(64).unwrap();
            unsafe { std::ptr::write_bytes(p, tag, 64) };
            (p, tag)
        })
        .collect();

    // Every pattern still intact after all writes landed.
    for &(p, tag) in &blocks {
        for i in 0..64 {
            assert_eq!(unsafe { p.add(i).read() }, tag);
        }
    }
    assert_eq!(alloc.check(false), 0);
}

#[test]
fn realloc_to_the_same_size_does_not_relocate() {
    let mut alloc = small_heap();

    let p = alloc.alloc(100).unwrap();
    let q = alloc.realloc(p, 100).unwrap();
    assert_eq!(p, q);
    assert_eq!(alloc.check(false), 0);
}

#[test]
fn realloc_edge_contracts() {
    let mut alloc = small_heap();

    // Null pointer acts like alloc.
    let p = alloc.realloc(std::ptr::null_mut(), 48).unwrap();
    assert!(!p.is_null());

    // Zero size acts like free.
    assert!(alloc.realloc(p, 0).is_none());
    assert_eq!(alloc.check(false), 0);
    assert_eq!(free_blocks(&alloc).len(), 1);
}

#[test]
fn implicit_variants_run_the_same_traces() {
    for policy in [CoalescePolicy::None, CoalescePolicy::Scan] {
        let mut alloc =
            ImplicitAllocator::with_heap(Heap::new(64 * 1024).unwrap(), policy).unwrap();

        let a = alloc.alloc(100).unwrap();
        let b = alloc.alloc(100).unwrap();
        unsafe {
            std::ptr::write_bytes(a, 0xAA, 100);
            std::ptr::write_bytes(b, 0xBB, 100);
        }

        alloc.free(a);
        let c = alloc.alloc(100).unwrap();
        assert_eq!(c, a, "{:?}: first fit reuses the freed block", policy);

        for i in 0..100 {
            assert_eq!(unsafe { b.add(i).read() }, 0xBB);
        }
        assert_eq!(alloc.check(false), 0, "{:?}", policy);
    }
}

/*
 * The one test that touches the process-wide allocator; everything else
 * builds its own instance, so this cannot race with the rest of the suite.
 */
#[test]
fn global_entry_points_cover_the_whole_lifecycle() {
    assert!(globals::init());
    assert_eq!(globals::check(false), 0);

    let p = globals::alloc(32).unwrap();
    unsafe { std::ptr::write_bytes(p, 0x7E, 32) };

    let q = globals::realloc(p, 128).unwrap();
    for i in 0..32 {
        assert_eq!(unsafe { q.add(i).read() }, 0x7E);
    }

    globals::free(q);
    assert_eq!(globals::check(false), 0);
}
