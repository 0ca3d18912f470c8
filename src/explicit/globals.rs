use lazy_static::lazy_static;
use std::sync::Mutex;

use super::allocator::ExplicitAllocator;

lazy_static! {
    pub static ref HEAP_MEMORY: Mutex<Option<ExplicitAllocator>> = Mutex::new(None);
}

/**
 * Initializes the process-wide allocator over a full-size reservation.
 * Calling it again while initialized is a no-op.
 *
 * @return false when the OS refused the reservation.
 */
pub fn init() -> bool {
    let mut guard = HEAP_MEMORY.lock().unwrap();

    if guard.is_some() {
        return true;
    }

    match ExplicitAllocator::new() {
        Some(alloc) => {
            *guard = Some(alloc);
            true
        }
        None => false,
    }
}

/// Allocates `size` payload bytes from the process-wide allocator.
pub fn alloc(size: u32) -> Option<*mut u8> {
    let mut guard = HEAP_MEMORY.lock().unwrap();
    guard.as_mut()?.alloc(size)
}

/// Frees a payload pointer handed out by `alloc` or `realloc`.
pub fn free(ptr: *mut u8) {
    let mut guard = HEAP_MEMORY.lock().unwrap();
    if let Some(alloc) = guard.as_mut() {
        alloc.free(ptr);
    }
}

/// Resizes an allocation from the process-wide allocator.
pub fn realloc(ptr: *mut u8, size: u32) -> Option<*mut u8> {
    let mut guard = HEAP_MEMORY.lock().unwrap();
    guard.as_mut()?.realloc(ptr, size)
}

/// Runs the heap checker, returning the number of violations found.
pub fn check(verbose: bool) -> u32 {
    let guard = HEAP_MEMORY.lock().unwrap();
    guard.as_ref().map_or(0, |alloc| alloc.check(verbose))
}
