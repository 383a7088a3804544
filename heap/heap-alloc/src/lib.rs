//! # Boundary-Tag Heap Allocator
//!
//! A first-fit heap allocator over a single sbrk region, with boundary
//! tags on every block and an explicit circular free list.
//!
//! ## Architecture Overview
//!
//! The allocator is built from four layers:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Public Façade (Heap)                │
//! │    • allocate / release / reallocate / zero         │
//! │    • payload access, invariant checker              │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │        Placement, Coalescing, Extension             │
//! │    • first-fit selection and splitting              │
//! │    • boundary-tag neighbor merging                  │
//! │    • epilogue-rewriting region growth               │
//! └─────────────────┬───────────────────────────────────┘
//! ┌─────────────────▼───────────────────────────────────┐
//! │                  Free Ring                          │
//! │    • circular doubly-linked list in free payloads   │
//! │    • FIFO reuse: insert at tail, search from head   │
//! └─────────────────┬───────────────────────────────────┘
//! ┌─────────────────▼───────────────────────────────────┐
//! │           Tags and Block Geometry                   │
//! │    • one packed word at both ends of every block    │
//! │    • payload-relative neighbor navigation           │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Block Layout
//!
//! Every block carries the same tag word at both boundaries, so both
//! neighbors of a freed block can be classified without walking the heap:
//!
//! ```text
//! +--------+------------------------------+--------+
//! | header |           payload            | footer |
//! +--------+------------------------------+--------+
//! ^ -8     ^ payload address (16-aligned)
//! ```
//!
//! Block sizes are multiples of 16 with a 32-byte minimum: a free block
//! must fit its two ring link words between the tags. The region starts
//! with an allocated prologue pair and ends with a zero-size allocated
//! epilogue header; the sentinels let the coalescer probe neighbor tags
//! unconditionally.
//!
//! ## Concurrency
//!
//! Strictly single-threaded: every operation takes `&mut self` and there
//! is no interior mutability. Hosts that need sharing wrap the heap in
//! their own lock.
//!
//! ## Diagnostics
//!
//! [`Heap::check_invariants`] validates the full tag/ring state on demand
//! and [`Heap::dump`] logs the block map. The `checks` cargo feature makes
//! every public operation self-check and log violations through the
//! [`log`] facade; disabled, neither diagnostic runs.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod block;
mod check;
mod heap;
mod ring;
mod tag;

pub use block::{ALIGNMENT, BLOCK_OVERHEAD, MIN_BLOCK_SIZE, WORD};
pub use check::InvariantViolation;
pub use heap::{BootstrapError, Heap};
pub use tag::BlockTag;

#[cfg(test)]
mod tests {
    use super::*;
    use heap_region::{RegionProvider, SbrkRegion};

    #[test]
    fn bootstrap_writes_the_sentinels() {
        let heap = Heap::bootstrap(SbrkRegion::<2048>::new()).unwrap();
        let region = heap.region();

        // pad, prologue header/footer, first real header after the chunk
        assert_eq!(region.word(region.low()), 0);
        assert_eq!(region.word(region.low() + 8), 16 | 1);
        assert_eq!(region.word(region.low() + 16), 16 | 1);
        // 32 sentinel bytes plus the 512-byte initial chunk
        assert_eq!(region.len(), 544);
        // epilogue header closes the region
        assert_eq!(region.word(region.low() + 536), 1);

        heap.check_invariants(line!()).unwrap();
    }

    #[test]
    fn bootstrap_fails_on_a_starved_region() {
        // room for the sentinels but not for the initial chunk
        assert!(Heap::bootstrap(SbrkRegion::<64>::new()).is_err());
        assert!(Heap::bootstrap(SbrkRegion::<16>::new()).is_err());
    }

    #[test]
    fn fresh_heap_has_one_free_block() {
        let heap = Heap::bootstrap(SbrkRegion::<2048>::new()).unwrap();
        let region = heap.region();

        // the initial chunk: free, 512 bytes, ringed to itself
        let chunk = region.low() + 32;
        assert_eq!(heap.block_size(chunk), 512);
        assert_eq!(region.word(chunk - 8), 512);
    }
}
