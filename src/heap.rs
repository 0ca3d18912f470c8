use libc::{MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE, mmap, munmap};
use std::ptr;

/*
 * The heap provider hands out a single contiguous region that only ever
 * grows. The region is reserved up front with mmap and released with munmap
 * when the provider is dropped; between those two points the break moves
 * upward one sbrk call at a time, exactly like a data segment would.
 *
 * Nothing in here knows about blocks or free lists. Allocators address the
 * region through 4-byte-word reads and writes at byte offsets from the base,
 * so every offset they exchange stays valid no matter where the OS mapped
 * the reservation.
 */

/// Default reservation, matching the classic 20 MiB simulated data segment.
pub const MAX_HEAP: u32 = 20 * 1024 * 1024;

pub struct Heap {
    base: *mut u8,
    brk: u32,
    max: u32,
}

/*
 * The raw base pointer is only dereferenced through &self / &mut self
 * methods, so ownership of a Heap is ownership of the mapping.
 */
unsafe impl Send for Heap {}

impl Heap {
    /**
     * Reserves `max` bytes of private anonymous memory for the heap.
     *
     * @return The provider with its break at zero, or None if the OS
     *         refused the mapping.
     */
    pub fn new(max: u32) -> Option<Heap> {
        let addr = unsafe {
            mmap(
                ptr::null_mut(),
                max as usize,
                PROT_READ | PROT_WRITE,
                MAP_PRIVATE | MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if addr == MAP_FAILED {
            return None;
        }

        Some(Heap {
            base: addr as *mut u8,
            brk: 0,
            max,
        })
    }

    /**
     * Extends the break by `incr` bytes.
     *
     * @return The old break as a byte offset, or None when the reservation
     *         is exhausted. A refused extension has no side effects.
     */
    pub fn sbrk(&mut self, incr: u32) -> Option<u32> {
        let old = self.brk;
        let new = old.checked_add(incr)?;

        if new > self.max {
            return None;
        }

        self.brk = new;
        Some(old)
    }

    /// Current break, as a byte offset from the base of the region.
    pub fn brk(&self) -> u32 {
        self.brk
    }

    /// Total reserved size in bytes.
    pub fn size(&self) -> u32 {
        self.max
    }

    /// Reads the 4-byte word at byte offset `ofs`.
    pub fn get(&self, ofs: u32) -> u32 {
        debug_assert!(ofs % 4 == 0 && ofs + 4 <= self.brk);
        unsafe { self.base.add(ofs as usize).cast::<u32>().read_unaligned() }
    }

    /// Writes the 4-byte word at byte offset `ofs`.
    pub fn put(&mut self, ofs: u32, word: u32) {
        debug_assert!(ofs % 4 == 0 && ofs + 4 <= self.brk);
        unsafe {
            self.base
                .add(ofs as usize)
                .cast::<u32>()
                .write_unaligned(word);
        }
    }

    /// Translates a block offset into the pointer handed to callers.
    pub fn payload_ptr(&self, ofs: u32) -> *mut u8 {
        unsafe { self.base.add(ofs as usize) }
    }

    /**
     * Translates a caller-supplied payload pointer back into a byte offset.
     *
     * @return None when the pointer does not fall inside the grown part of
     *         the region.
     */
    pub fn offset_of(&self, ptr: *const u8) -> Option<u32> {
        let base = self.base as usize;
        let addr = ptr as usize;

        if addr < base || addr >= base + self.brk as usize {
            return None;
        }

        Some((addr - base) as u32)
    }

    /// Copies `len` payload bytes from offset `src` to offset `dst`.
    pub fn copy(&mut self, src: u32, dst: u32, len: u32) {
        debug_assert!(src + len <= self.brk && dst + len <= self.brk);
        unsafe {
            ptr::copy_nonoverlapping(
                self.base.add(src as usize),
                self.base.add(dst as usize),
                len as usize,
            );
        }
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        unsafe {
            munmap(self.base as *mut _, self.max as usize);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sbrk_returns_old_break() {
        let mut heap = Heap::new(4096).unwrap();
        assert_eq!(heap.sbrk(16), Some(0));
        assert_eq!(heap.sbrk(32), Some(16));
        assert_eq!(heap.brk(), 48);
    }

    #[test]
    fn sbrk_exhaustion_has_no_side_effects() {
        let mut heap = Heap::new(64).unwrap();
        assert_eq!(heap.size(), 64);
        assert_eq!(heap.sbrk(64), Some(0));
        assert_eq!(heap.sbrk(1), None);
        assert_eq!(heap.brk(), 64);
    }

    #[test]
    fn words_round_trip() {
        let mut heap = Heap::new(4096).unwrap();
        heap.sbrk(64).unwrap();
        heap.put(0, 0xDEAD_BEEF);
        heap.put(60, 41);
        assert_eq!(heap.get(0), 0xDEAD_BEEF);
        assert_eq!(heap.get(60), 41);
    }

    #[test]
    fn offset_of_rejects_foreign_pointers() {
        let mut heap = Heap::new(4096).unwrap();
        heap.sbrk(64).unwrap();

        let inside = heap.payload_ptr(16);
        assert_eq!(heap.offset_of(inside), Some(16));

        // One past the break is no longer heap memory.
        let past = heap.payload_ptr(64);
        assert_eq!(heap.offset_of(past), None);

        let foreign = Box::new(0u64);
        assert_eq!(heap.offset_of(&*foreign as *const u64 as *const u8), None);
    }
}
