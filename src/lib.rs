//! # coalloc - a coalescing free-list memory allocator
//!
//! Allocate, free and realloc over a single contiguous heap region that
//! only ever grows, in the shape of the classic `malloc` interface. Blocks
//! are doubleword aligned and delimited by tagged header words; the core
//! variant threads a circular, address-ordered free list through the free
//! payloads themselves and coalesces neighbors as part of insertion.
//!
//! ## Crate structure
//!
//! - `heap`     - the grow-only heap region and its sbrk-style break
//! - `block`    - header/footer word encoding and block navigation
//! - `implicit` - baseline variant: header-only blocks, whole-heap scans
//! - `explicit` - the core: explicit free list with fused coalescing
//!
//! The `explicit::globals` module holds a process-wide allocator instance
//! behind a mutex; everything else is instance-based and carries no global
//! state.

pub mod block;
pub mod explicit;
pub mod heap;
pub mod implicit;
pub mod utils;

#[cfg(test)]
mod test;
