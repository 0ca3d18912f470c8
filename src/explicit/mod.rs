pub mod allocator;
pub mod freelist;
pub mod globals;

pub use allocator::ExplicitAllocator;

/*
 * The explicit-list allocator keeps its bookkeeping inside the heap itself.
 *
 * Every free block lends the first two words of its payload to a circular
 * doubly linked list, so the allocator only searches free blocks instead of
 * walking every block on the heap:
 *
 * _________________________
 * |        header         | <- size | free
 * _________________________
 * |       next free       | <- offset of the successor free block
 * _________________________
 * |       prev free       | <- offset of the predecessor free block
 * _________________________
 * |                       |
 * |     stale payload     |
 * _________________________
 * |        footer         | <- copy of the header
 * _________________________
 *
 * The list is kept in ascending address order, wrapping around once from the
 * highest free block back to the lowest. Ordering by address means the list
 * neighbors around an insertion point are exactly the candidates for
 * physical merging, so inserting a freed block and coalescing it with its
 * neighbors happen in the same walk.
 *
 * The heap itself is framed by two sentinel blocks. An 8-byte allocated
 * prologue sits in front of the first real block so backward traversal never
 * runs off the start, and a zero-size allocated epilogue marks the end of
 * the grown region. Freed blocks can therefore merge with whatever physical
 * neighbors they have without any edge-of-heap special cases.
 */

#[cfg(test)]
mod layout_tests {
    use crate::block::{DSIZE, blk_alloc, blk_size};
    use crate::explicit::ExplicitAllocator;
    use crate::heap::Heap;

    #[test]
    fn init_seeds_prologue_and_one_free_block() {
        let alloc = ExplicitAllocator::with_heap(Heap::new(64 * 1024).unwrap()).unwrap();
        let heap = alloc.heap();

        // Prologue: 8 bytes, allocated, header equal to footer.
        assert_eq!(blk_size(heap, DSIZE), DSIZE);
        assert!(blk_alloc(heap, DSIZE));

        // One free block spans the first extension.
        assert_eq!(alloc.free_list().len(heap), 1);
        assert_eq!(alloc.check(false), 0);
    }
}
