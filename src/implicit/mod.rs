pub mod allocator;

pub use allocator::ImplicitAllocator;

/*
 * The implicit-list allocator is the simplest shape this block format can
 * take. Blocks carry a header only, and the "list" of free blocks is the
 * heap itself: a fit search starts at the first block and hops from header
 * to header, inspecting allocated and free blocks alike.
 *
 * _________________________
 * |       header 1        | <- size | allocated
 * _________________________
 * |                       |
 * |       payload 1       |
 * _________________________
 * _________________________
 * |       header 2        | <- size | free
 * _________________________
 * |                       |
 * |    stale payload 2    |
 * _________________________
 *
 * Without footers the predecessor of a block cannot be reached in constant
 * time, so merging freed neighbors is either skipped entirely or paid for
 * with a scan from the start of the heap. Both policies fragment more than
 * the explicit variant; they exist as the baseline it is measured against.
 */

/// How the implicit variant treats adjacent free blocks when freeing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoalescePolicy {
    /// Freed blocks are only marked free; neighbors never merge.
    #[default]
    None,

    /// Merge with a free successor directly, and with a free predecessor
    /// by rescanning the heap from the first block to find it.
    Scan,
}
