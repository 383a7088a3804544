//! # Sbrk Region Providers
//!
//! The storage seam consumed by the heap allocator.
//!
//! ## Overview
//!
//! The allocator manages one contiguous byte range it does not own: a host
//! supplies it through the [`RegionProvider`] trait, which models a classic
//! `sbrk` surface: the current low and high offsets, a grow operation that
//! extends the high end, and offset-addressed access to the bytes in
//! between.
//!
//! Addresses are [`RegionAddress`](heap_addresses::RegionAddress) offsets,
//! not host pointers, so a provider can back the range with whatever
//! storage it likes. This crate ships one implementation:
//!
//! - [`SbrkRegion<CAP>`](SbrkRegion) — a fixed-capacity owned byte arena.
//!   `grow` bumps a break offset until `CAP` is spent and then refuses with
//!   [`RegionError::Exhausted`].
//!
//! ## Typical Usage
//!
//! ```rust
//! use heap_region::{RegionProvider, SbrkRegion};
//! use heap_addresses::RegionAddress;
//!
//! let mut region = SbrkRegion::<4096>::new();
//! let start = region.grow(64).expect("capacity is available");
//!
//! region.set_word(start, 0x31);
//! assert_eq!(region.word(start), 0x31);
//! assert_eq!(region.len(), 64);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod provider;
mod sbrk;

pub use provider::{RegionError, RegionProvider, WORD_BYTES};
pub use sbrk::SbrkRegion;
