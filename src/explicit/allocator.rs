use log::error;

use crate::block::{
    CHUNKSIZE, DSIZE, KEY, MIN_BLOCK, WSIZE, blk_alloc, blk_size, ftr, hdr, next_blk, pack,
    unpack_alloc, unpack_size, write_block,
};
use crate::explicit::freelist::{FreeList, next_of, prev_of};
use crate::heap::{Heap, MAX_HEAP};
use crate::utils::align_up;

/// Header plus footer, the bytes a block carries beyond its payload.
const OVERHEAD: u32 = DSIZE;

/*
 * The block manager. Owns the heap region and the free-list cursor; every
 * public operation goes through here and leaves the heap in a state the
 * checker accepts.
 */
pub struct ExplicitAllocator {
    heap: Heap,
    free: FreeList,
    heap_listp: u32,
}

impl ExplicitAllocator {
    /// Creates an allocator over a full-size heap reservation.
    pub fn new() -> Option<ExplicitAllocator> {
        ExplicitAllocator::with_heap(Heap::new(MAX_HEAP)?)
    }

    /**
     * Creates an allocator over a caller-provided heap, which must be
     * fresh. Seeds the key word, the prologue and the epilogue, then grows
     * the heap once so a first free block exists.
     */
    pub fn with_heap(heap: Heap) -> Option<ExplicitAllocator> {
        let mut alloc = ExplicitAllocator {
            heap,
            free: FreeList::new(),
            heap_listp: DSIZE,
        };

        let start = alloc.heap.sbrk(4 * WSIZE)?;
        alloc.heap.put(start, KEY);
        alloc.heap.put(start + WSIZE, pack(DSIZE, true)); // prologue header
        alloc.heap.put(start + DSIZE, pack(DSIZE, true)); // prologue footer
        alloc.heap.put(start + DSIZE + WSIZE, pack(0, true)); // epilogue header
        alloc.heap_listp = start + DSIZE;

        alloc.extend_heap(CHUNKSIZE / WSIZE)?;
        Some(alloc)
    }

    /**
     * Grows the heap by `words` words, rounded up to keep doubleword
     * alignment. The grown bytes become one free block, the epilogue moves
     * to the new end, and the block goes onto the free list where it fuses
     * with a free old tail.
     *
     * @return The surviving free block, or None when the provider refuses.
     */
    fn extend_heap(&mut self, words: u32) -> Option<u32> {
        let size = align_up(words * WSIZE, DSIZE);

        let bp = self.heap.sbrk(size)?;
        write_block(&mut self.heap, bp, size, false);
        self.heap.put(hdr(bp + size), pack(0, true)); // new epilogue header

        self.free.insert(&mut self.heap, bp)
    }

    /// Payload request to block size: header, footer and doubleword rounding.
    fn adjust_size(size: u32) -> Option<u32> {
        if size <= DSIZE {
            return Some(MIN_BLOCK);
        }
        let padded = size.checked_add(OVERHEAD + DSIZE - 1)?;
        Some(DSIZE * (padded / DSIZE))
    }

    /**
     * Allocates a block with at least `size` payload bytes.
     *
     * @return The payload pointer, doubleword aligned, or None when the
     *         request is zero or the heap cannot grow any further.
     */
    pub fn alloc(&mut self, size: u32) -> Option<*mut u8> {
        if size == 0 {
            return None;
        }

        let asize = Self::adjust_size(size)?;
        let bp = match self.free.find_fit(&self.heap, asize) {
            Some(bp) => bp,
            None => self.extend_heap(asize.max(CHUNKSIZE) / WSIZE)?,
        };

        self.place(bp, asize);
        Some(self.heap.payload_ptr(bp))
    }

    /*
     * Carves `asize` bytes out of the free block at `bp`. The block leaves
     * the free list; when the tail end is still big enough to stand alone
     * it is split off and reinserted as a free block.
     */
    fn place(&mut self, bp: u32, asize: u32) {
        let csize = blk_size(&self.heap, bp);
        self.free.remove(&mut self.heap, bp);

        if csize - asize >= MIN_BLOCK {
            write_block(&mut self.heap, bp, asize, true);
            let rest = bp + asize;
            write_block(&mut self.heap, rest, csize - asize, false);
            self.free.insert(&mut self.heap, rest);
        } else {
            write_block(&mut self.heap, bp, csize, true);
        }
    }

    /**
     * Frees the block behind a payload pointer previously handed out by
     * alloc or realloc. A null, foreign or already-free pointer is
     * reported and ignored.
     */
    pub fn free(&mut self, ptr: *mut u8) {
        let Some(bp) = self.resolve(ptr) else {
            return;
        };

        if !blk_alloc(&self.heap, bp) {
            error!("free: double free of block at {:#x}", bp);
            return;
        }

        let size = blk_size(&self.heap, bp);
        write_block(&mut self.heap, bp, size, false);
        self.free.insert(&mut self.heap, bp);
    }

    /**
     * Resizes the allocation behind `ptr` to at least `size` payload bytes.
     *
     * A null pointer turns the call into alloc, a zero size into free.
     * Shrinking splits in place when the cut-off tail can stand alone.
     * Growing first tries to absorb a free physical successor; otherwise
     * the payload moves to a fresh block and the old one is freed. When no
     * fresh block can be had, None comes back and `ptr` stays valid.
     */
    pub fn realloc(&mut self, ptr: *mut u8, size: u32) -> Option<*mut u8> {
        if ptr.is_null() {
            return self.alloc(size);
        }
        if size == 0 {
            self.free(ptr);
            return None;
        }

        let bp = self.resolve(ptr)?;
        if !blk_alloc(&self.heap, bp) {
            error!("realloc: block at {:#x} is not allocated", bp);
            return None;
        }

        let old = blk_size(&self.heap, bp);
        let asize = Self::adjust_size(size)?;

        if asize <= old {
            if old - asize < MIN_BLOCK {
                return Some(ptr);
            }

            write_block(&mut self.heap, bp, asize, true);
            let rest = bp + asize;
            write_block(&mut self.heap, rest, old - asize, false);
            self.free.insert(&mut self.heap, rest);
            return Some(ptr);
        }

        // Probe the physical successor for in-place growth.
        let nb = next_blk(&self.heap, bp);
        if !blk_alloc(&self.heap, nb) && old + blk_size(&self.heap, nb) >= asize {
            let combined = old + blk_size(&self.heap, nb);
            self.free.remove(&mut self.heap, nb);

            if combined - asize >= MIN_BLOCK {
                write_block(&mut self.heap, bp, asize, true);
                let rest = bp + asize;
                write_block(&mut self.heap, rest, combined - asize, false);
                self.free.insert(&mut self.heap, rest);
            } else {
                write_block(&mut self.heap, bp, combined, true);
            }
            return Some(ptr);
        }

        let fresh = self.alloc(size)?;
        let fresh_bp = self.heap.offset_of(fresh)?;
        self.heap.copy(bp, fresh_bp, old - OVERHEAD);
        self.free(ptr);
        Some(fresh)
    }

    /*
     * Validates a caller-supplied payload pointer and translates it into a
     * block offset. Reports and rejects anything that cannot be a payload
     * this allocator handed out.
     */
    fn resolve(&self, ptr: *mut u8) -> Option<u32> {
        if ptr.is_null() {
            error!("null payload pointer");
            return None;
        }

        let Some(bp) = self.heap.offset_of(ptr) else {
            error!("payload pointer {:p} is outside the heap", ptr);
            return None;
        };

        if bp % DSIZE != 0 || bp < self.heap_listp + DSIZE {
            error!("payload pointer {:p} is not a block payload", ptr);
            return None;
        }

        let size = blk_size(&self.heap, bp);
        let fits = bp
            .checked_add(size)
            .is_some_and(|end| end <= self.heap.brk());
        if size < MIN_BLOCK || size % DSIZE != 0 || !fits {
            error!("payload pointer {:p} has a corrupt block header", ptr);
            return None;
        }

        Some(bp)
    }

    /**
     * Walks the whole heap and the free list, reporting every invariant
     * violation it finds without changing any state.
     *
     * @param verbose Print each block while walking.
     * @return The number of violations found; zero on a healthy heap.
     */
    pub fn check(&self, verbose: bool) -> u32 {
        let mut violations = 0;
        let mut report = |msg: String| {
            error!("heap check: {}", msg);
            violations += 1;
        };

        if verbose {
            println!("Heap (base..{:#x}):", self.heap.brk());
        }

        if self.heap.get(self.heap_listp - DSIZE) != KEY {
            report("key canary in front of the prologue was overwritten".into());
        }
        if blk_size(&self.heap, self.heap_listp) != DSIZE || !blk_alloc(&self.heap, self.heap_listp)
        {
            report("bad prologue header".into());
        }

        // Forward walk from the prologue to the epilogue.
        let mut free_blocks = 0;
        let mut prev_was_free = false;
        let mut bp = self.heap_listp;
        loop {
            if verbose {
                self.print_block(bp);
            }

            let size = blk_size(&self.heap, bp);
            if size == 0 {
                break;
            }

            if bp % DSIZE != 0 {
                report(format!("block at {:#x}: misaligned payload", bp));
            }
            if size % DSIZE != 0 {
                report(format!("block at {:#x}: size {} not doubleword", bp, size));
            }

            let end = match bp.checked_add(size) {
                Some(end) if end <= self.heap.brk() => end,
                _ => {
                    report(format!("block at {:#x}: size {} escapes the heap", bp, size));
                    break;
                }
            };

            if self.heap.get(hdr(bp)) != self.heap.get(ftr(&self.heap, bp)) {
                report(format!("block at {:#x}: header and footer differ", bp));
            }

            let is_free = !blk_alloc(&self.heap, bp);
            if is_free {
                free_blocks += 1;
                if prev_was_free {
                    report(format!("blocks at {:#x}: adjacent free blocks", bp));
                }
            }
            prev_was_free = is_free;
            bp = end;
        }

        if bp != self.heap.brk() {
            report("forward walk did not end at the epilogue".into());
        }
        if !blk_alloc(&self.heap, bp) {
            report("bad epilogue header".into());
        }

        // Free-list walk: membership, back links, address order.
        let mut on_list = 0;
        if let Some(head) = self.free.head() {
            let cap = self.heap.brk() / MIN_BLOCK + 1;
            let mut descents = 0;
            let mut steps = 0;
            let mut cur = head;
            loop {
                steps += 1;
                if steps > cap {
                    report("free list does not close into a cycle".into());
                    break;
                }

                on_list += 1;
                if blk_alloc(&self.heap, cur) {
                    report(format!("allocated block at {:#x} is on the free list", cur));
                }

                let next = next_of(&self.heap, cur);
                if prev_of(&self.heap, next) != cur {
                    report(format!("free block at {:#x}: broken back link", cur));
                    break;
                }
                if next <= cur {
                    descents += 1;
                }
                if next == head {
                    break;
                }
                cur = next;
            }

            if descents > 1 {
                report("free list is not address ordered".into());
            }
        }

        if on_list != free_blocks {
            report(format!(
                "{} blocks marked free but {} on the free list",
                free_blocks, on_list
            ));
        }

        violations
    }

    fn print_block(&self, bp: u32) {
        let head = self.heap.get(hdr(bp));
        let hsize = unpack_size(head);
        if hsize == 0 {
            println!("{:#x}: EOL", bp);
            return;
        }

        // A corrupt size would put the footer outside the heap.
        let in_range = bp
            .checked_add(hsize)
            .is_some_and(|end| end <= self.heap.brk());
        if !in_range {
            println!("{:#x}: header [{}:?] (size out of range)", bp, hsize);
            return;
        }

        let foot = self.heap.get(ftr(&self.heap, bp));
        println!(
            "{:#x}: header [{}:{}] footer [{}:{}]",
            bp,
            hsize,
            if unpack_alloc(head) { 'a' } else { 'f' },
            unpack_size(foot),
            if unpack_alloc(foot) { 'a' } else { 'f' },
        );
    }

    pub(crate) fn heap(&self) -> &Heap {
        &self.heap
    }

    pub(crate) fn free_list(&self) -> &FreeList {
        &self.free
    }
}
