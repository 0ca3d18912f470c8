use crate::heap::Heap;

/*
 * Every block starts with a 4-byte header word packing the block size with
 * the allocated bit. Sizes are doubleword multiples, which keeps the three
 * low bits of the word clear; bit 0 carries the allocation state, 1 meaning
 * allocated. The packing polarity lives only in `pack`, `unpack_size` and
 * `unpack_alloc`, so the rest of the crate talks in (size, allocated) pairs.
 *
 * Blocks in the coalescing variant mirror the header in a footer word at the
 * end of the block:
 *
 *  ________________ <- hdr(bp)
 *  |    header    |      size | alloc bit
 *  ________________ <- bp (the payload address handed to callers)
 *  |              |
 *  |   payload    |
 *  |              |
 *  ________________ <- ftr(bp) = bp + size - DSIZE
 *  |    footer    |      copy of the header
 *  ________________
 *  ________________ <- next_blk(bp) = bp + size
 *  |  next header |
 *
 * The footer lets `prev_blk` reach the preceding block in one read, which is
 * what makes constant-time backward coalescing possible.
 */

/// Header and footer word size in bytes.
pub const WSIZE: u32 = 4;

/// Doubleword size in bytes; the alignment quantum for sizes and payloads.
pub const DSIZE: u32 = 8;

/// Minimum amount of bytes the heap grows by when the free blocks run out.
pub const CHUNKSIZE: u32 = 4096;

/// Smallest block that still has room for header, two link words and footer.
pub const MIN_BLOCK: u32 = 16;

/// Canary written in front of the prologue; the checker verifies it stayed.
pub const KEY: u32 = 0x9E37_79B9;

/// Packs a block size and the allocated flag into one header/footer word.
pub fn pack(size: u32, allocated: bool) -> u32 {
    debug_assert!(size & 0x7 == 0);
    size | allocated as u32
}

/// Size field of a header/footer word.
pub fn unpack_size(word: u32) -> u32 {
    word & !0x7
}

/// Allocated flag of a header/footer word.
pub fn unpack_alloc(word: u32) -> bool {
    word & 0x1 != 0
}

/// Header offset of the block whose payload starts at `bp`.
pub fn hdr(bp: u32) -> u32 {
    bp - WSIZE
}

/// Footer offset of the block whose payload starts at `bp`.
pub fn ftr(heap: &Heap, bp: u32) -> u32 {
    bp + blk_size(heap, bp) - DSIZE
}

/// Size of the block at `bp`, read from its header.
pub fn blk_size(heap: &Heap, bp: u32) -> u32 {
    unpack_size(heap.get(hdr(bp)))
}

/// Allocated flag of the block at `bp`, read from its header.
pub fn blk_alloc(heap: &Heap, bp: u32) -> bool {
    unpack_alloc(heap.get(hdr(bp)))
}

/// Payload offset of the physically following block.
pub fn next_blk(heap: &Heap, bp: u32) -> u32 {
    bp + blk_size(heap, bp)
}

/*
 * Payload offset of the physically preceding block. Reads the predecessor's
 * footer, so it is only meaningful in the footer-carrying variant.
 */
pub fn prev_blk(heap: &Heap, bp: u32) -> u32 {
    bp - unpack_size(heap.get(bp - DSIZE))
}

/// Writes matching header and footer words for the block at `bp`.
pub fn write_block(heap: &mut Heap, bp: u32, size: u32, allocated: bool) {
    let word = pack(size, allocated);
    heap.put(hdr(bp), word);
    heap.put(bp + size - DSIZE, word);
}
