use log::error;

use crate::block::{MIN_BLOCK, WSIZE, blk_size, next_blk, prev_blk, write_block};
use crate::heap::Heap;

/*
 * The registry of free blocks. Link words live inside the free payloads
 * themselves (successor at the payload start, predecessor one word after),
 * so the list costs no memory beyond the blocks it tracks. The only state
 * held here is the head cursor.
 *
 * The head is a cursor, not an anchor: after every insertion it moves to the
 * surviving block. Workloads tend to allocate again near what they just
 * freed, and starting the first-fit scan at the latest survivor keeps those
 * hits short.
 */
pub struct FreeList {
    head: Option<u32>,
}

/// Successor link of the free block at `bp`.
pub(crate) fn next_of(heap: &Heap, bp: u32) -> u32 {
    heap.get(bp)
}

/// Predecessor link of the free block at `bp`.
pub(crate) fn prev_of(heap: &Heap, bp: u32) -> u32 {
    heap.get(bp + WSIZE)
}

fn set_next(heap: &mut Heap, bp: u32, to: u32) {
    heap.put(bp, to);
}

fn set_prev(heap: &mut Heap, bp: u32, to: u32) {
    heap.put(bp + WSIZE, to);
}

impl FreeList {
    pub fn new() -> FreeList {
        FreeList { head: None }
    }

    /// Current head cursor, None when no block is free.
    pub fn head(&self) -> Option<u32> {
        self.head
    }

    /**
     * First-fit search. Walks the cycle once starting at the head cursor
     * and returns the first free block of at least `asize` bytes.
     */
    pub fn find_fit(&self, heap: &Heap, asize: u32) -> Option<u32> {
        let head = self.head?;
        let mut bp = head;

        loop {
            if blk_size(heap, bp) >= asize {
                return Some(bp);
            }

            bp = next_of(heap, bp);
            if bp == head {
                return None;
            }
        }
    }

    /**
     * Unlinks the block at `bp`. The head advances to the successor when it
     * was pointing at `bp`; unlinking the last block empties the list.
     */
    pub fn remove(&mut self, heap: &mut Heap, bp: u32) {
        let next = next_of(heap, bp);

        if next == bp {
            self.head = None;
            return;
        }

        let prev = prev_of(heap, bp);
        set_next(heap, prev, next);
        set_prev(heap, next, prev);

        if self.head == Some(bp) {
            self.head = Some(next);
        }
    }

    /**
     * Inserts the block at `bp`, whose header must already be marked free,
     * keeping the cycle address ordered and merging `bp` with whichever
     * physical neighbors turn out to be its list neighbors.
     *
     * @return The offset of the surviving block: `bp` itself, or the
     *         predecessor it was absorbed into. None when the list was
     *         found inconsistent; the list is left untouched in that case.
     */
    pub fn insert(&mut self, heap: &mut Heap, bp: u32) -> Option<u32> {
        let Some(head) = self.head else {
            set_next(heap, bp, bp);
            set_prev(heap, bp, bp);
            self.head = Some(bp);
            return Some(bp);
        };

        // Find the gap (c, next(c)) that spans bp in address order. The
        // wrap link is the one whose successor is not greater than it.
        let mut c = head;
        loop {
            if c == bp {
                error!("free list: duplicate insert of block at {:#x}", bp);
                return None;
            }

            let s = next_of(heap, c);
            let wraps = c >= s;
            if (c < bp && bp < s) || (wraps && (bp > c || bp < s)) {
                break;
            }

            c = s;
            if c == head {
                error!("free list: no insertion gap found for block at {:#x}", bp);
                return None;
            }
        }

        let s = next_of(heap, c);
        let prev_adjacent = prev_blk(heap, bp) == c;
        let next_adjacent = next_blk(heap, bp) == s;

        let survivor = if prev_adjacent && next_adjacent {
            // bp bridges its two list neighbors; all three fuse into c.
            let merged = blk_size(heap, c) + blk_size(heap, bp) + blk_size(heap, s);
            self.remove(heap, s);
            write_block(heap, c, merged, false);
            c
        } else if prev_adjacent {
            let merged = blk_size(heap, c) + blk_size(heap, bp);
            write_block(heap, c, merged, false);
            c
        } else if next_adjacent {
            let merged = blk_size(heap, bp) + blk_size(heap, s);
            self.remove(heap, s);
            write_block(heap, bp, merged, false);

            match self.head {
                // s was the only block; the merged one starts a new cycle.
                None => {
                    set_next(heap, bp, bp);
                    set_prev(heap, bp, bp);
                }
                // The merged block takes s's old place after c.
                Some(_) => {
                    let t = next_of(heap, c);
                    set_next(heap, bp, t);
                    set_prev(heap, bp, c);
                    set_next(heap, c, bp);
                    set_prev(heap, t, bp);
                }
            }
            bp
        } else {
            set_next(heap, bp, s);
            set_prev(heap, bp, c);
            set_next(heap, c, bp);
            set_prev(heap, s, bp);
            bp
        };

        self.head = Some(survivor);
        Some(survivor)
    }

    /// Number of blocks on the list.
    pub fn len(&self, heap: &Heap) -> u32 {
        self.iter(heap).count() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /**
     * Iterates the cycle once starting at the head cursor. The walk is
     * capped at the largest block count the grown heap could hold, so a
     * corrupted cycle terminates instead of spinning.
     */
    pub fn iter<'a>(&self, heap: &'a Heap) -> Iter<'a> {
        Iter {
            heap,
            head: self.head.unwrap_or(0),
            cursor: self.head,
            remaining: heap.brk() / MIN_BLOCK + 1,
        }
    }
}

pub struct Iter<'a> {
    heap: &'a Heap,
    head: u32,
    cursor: Option<u32>,
    remaining: u32,
}

impl<'a> Iterator for Iter<'a> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        let bp = self.cursor?;

        if self.remaining == 0 {
            self.cursor = None;
            return None;
        }
        self.remaining -= 1;

        let next = next_of(self.heap, bp);
        self.cursor = if next == self.head { None } else { Some(next) };
        Some(bp)
    }
}
