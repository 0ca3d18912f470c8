use log::error;

use crate::block::{
    CHUNKSIZE, DSIZE, KEY, WSIZE, blk_alloc, blk_size, hdr, next_blk, pack, unpack_alloc,
    unpack_size,
};
use crate::heap::{Heap, MAX_HEAP};
use crate::implicit::CoalescePolicy;
use crate::utils::align_up;

/// Header only; implicit blocks carry no footer.
const OVERHEAD: u32 = WSIZE;

/// Smallest implicit block: a header and one payload word.
const MIN_BLOCK: u32 = DSIZE;

pub struct ImplicitAllocator {
    heap: Heap,
    heap_listp: u32,
    policy: CoalescePolicy,
}

impl ImplicitAllocator {
    pub fn new(policy: CoalescePolicy) -> Option<ImplicitAllocator> {
        ImplicitAllocator::with_heap(Heap::new(MAX_HEAP)?, policy)
    }

    /// Seeds the key word, prologue, padding and epilogue on a fresh heap,
    /// then grows it once so a first free block exists.
    pub fn with_heap(heap: Heap, policy: CoalescePolicy) -> Option<ImplicitAllocator> {
        let mut alloc = ImplicitAllocator {
            heap,
            heap_listp: DSIZE,
            policy,
        };

        let start = alloc.heap.sbrk(4 * WSIZE)?;
        alloc.heap.put(start, KEY);
        alloc.heap.put(start + WSIZE, pack(DSIZE, true)); // prologue header
        alloc.heap.put(start + DSIZE, 0); // prologue padding
        alloc.heap.put(start + DSIZE + WSIZE, pack(0, true)); // epilogue header
        alloc.heap_listp = start + DSIZE;

        alloc.extend_heap(CHUNKSIZE / WSIZE)?;
        Some(alloc)
    }

    fn extend_heap(&mut self, words: u32) -> Option<u32> {
        let size = align_up(words * WSIZE, DSIZE);

        let bp = self.heap.sbrk(size)?;
        self.heap.put(hdr(bp), pack(size, false));
        self.heap.put(hdr(bp + size), pack(0, true)); // new epilogue header
        Some(bp)
    }

    fn adjust_size(size: u32) -> Option<u32> {
        if size <= WSIZE {
            return Some(WSIZE + OVERHEAD);
        }
        let padded = size.checked_add(OVERHEAD + DSIZE - 1)?;
        Some(DSIZE * (padded / DSIZE))
    }

    /// First fit over the physical block walk.
    fn find_fit(&self, asize: u32) -> Option<u32> {
        let mut bp = self.heap_listp;

        while blk_size(&self.heap, bp) > 0 {
            if !blk_alloc(&self.heap, bp) && blk_size(&self.heap, bp) >= asize {
                return Some(bp);
            }
            bp = next_blk(&self.heap, bp);
        }

        None
    }

    fn place(&mut self, bp: u32, asize: u32) {
        let csize = blk_size(&self.heap, bp);

        if csize - asize >= MIN_BLOCK {
            self.heap.put(hdr(bp), pack(asize, true));
            self.heap.put(hdr(bp + asize), pack(csize - asize, false));
        } else {
            self.heap.put(hdr(bp), pack(csize, true));
        }
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
        let bp = match self.find_fit(asize) {
            Some(bp) => bp,
            None => {
                let bp = self.extend_heap(asize.max(CHUNKSIZE) / WSIZE)?;
                if self.policy == CoalescePolicy::Scan {
                    // The grown block may sit right behind a free old tail.
                    self.coalesce(bp);
                    self.find_fit(asize)?
                } else {
                    bp
                }
            }
        };

        self.place(bp, asize);
        Some(self.heap.payload_ptr(bp))
    }

    /// Marks the block behind `ptr` free and merges neighbors per policy.
    pub fn free(&mut self, ptr: *mut u8) {
        let Some(bp) = self.resolve(ptr) else {
            return;
        };

        if !blk_alloc(&self.heap, bp) {
            error!("free: double free of block at {:#x}", bp);
            return;
        }

        let size = blk_size(&self.heap, bp);
        self.heap.put(hdr(bp), pack(size, false));

        if self.policy == CoalescePolicy::Scan {
            self.coalesce(bp);
        }
    }

    /*
     * Merges the free block at `bp` with a free successor, then hunts for
     * the physical predecessor by walking from the first block. Without
     * footers that walk is the only way back.
     */
    fn coalesce(&mut self, bp: u32) {
        let mut size = blk_size(&self.heap, bp);

        let nb = next_blk(&self.heap, bp);
        if !blk_alloc(&self.heap, nb) {
            size += blk_size(&self.heap, nb);
        }

        let mut prev = None;
        let mut cur = self.heap_listp;
        while blk_size(&self.heap, cur) > 0 {
            if next_blk(&self.heap, cur) == bp {
                prev = Some(cur);
                break;
            }
            cur = next_blk(&self.heap, cur);
        }

        match prev {
            Some(pb) if !blk_alloc(&self.heap, pb) => {
                let merged = blk_size(&self.heap, pb) + size;
                self.heap.put(hdr(pb), pack(merged, false));
            }
            _ => {
                self.heap.put(hdr(bp), pack(size, false));
            }
        }
    }

    /**
     * Resizes the allocation behind `ptr`: a fresh block is allocated, the
     * old payload copied over and the old block freed. None with `ptr`
     * left intact when no fresh block can be had.
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

        let old_payload = blk_size(&self.heap, bp) - OVERHEAD;
        let fresh = self.alloc(size)?;
        let fresh_bp = self.heap.offset_of(fresh)?;
        self.heap.copy(bp, fresh_bp, old_payload.min(size));
        self.free(ptr);
        Some(fresh)
    }

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
     * Walks the heap from prologue to epilogue, reporting every invariant
     * violation. Adjacent free blocks only count as a violation under the
     * Scan policy; without coalescing they are expected.
     *
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

            let is_free = !blk_alloc(&self.heap, bp);
            if is_free && prev_was_free && self.policy == CoalescePolicy::Scan {
                report(format!("blocks at {:#x}: adjacent free blocks", bp));
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

        violations
    }

    fn print_block(&self, bp: u32) {
        let head = self.heap.get(hdr(bp));
        let hsize = unpack_size(head);
        if hsize == 0 {
            println!("{:#x}: EOL", bp);
            return;
        }

        println!(
            "{:#x}: header [{}:{}]",
            bp,
            hsize,
            if unpack_alloc(head) { 'a' } else { 'f' },
        );
    }

    pub(crate) fn heap(&self) -> &Heap {
        &self.heap
    }
}
