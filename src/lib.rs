#![no_std]

//! A segregated free-list storage allocator.
//!
//! This crate implements a classic boundary-tag allocator: the heap is one
//! contiguous, growable run of bytes in which every block carries its size
//! and allocated flag in a header and a matching footer. Free blocks are
//! indexed by a segregated collection of doubly-linked lists, one per
//! power-of-two size class, threaded through the free blocks' own payload
//! bytes. Released blocks coalesce with free physical neighbors in constant
//! time thanks to the boundary tags.
//!
//! ## Types
//!
//! ### [`Allocator`]
//!
//! The allocator itself, generic over the [`Region`] that provides its
//! bytes. It offers `allocate` / `release` / `resize` / `zeroed_allocate`,
//! hands out payload *offsets* rather than pointers, and exposes the raw
//! payload bytes through `payload` / `payload_mut`. It is single-threaded
//! by design: one instance, one caller at a time.
//!
//! ### [`Region`]
//!
//! The trait the allocator consumes its memory through: extend by some
//! bytes, report the bounds, expose the bytes as a slice. [`FixedRegion`]
//! backs a heap with an inline array (useful for tests, demos, and
//! statically-sized pools); `MmapRegion` (feature `use_libc`) reserves
//! address space from the OS once and commits pages as the heap grows.
//!
//! ### [`Validity`] and [`Stats`]
//!
//! Results of the consistency checker, which walks the physical block
//! sequence and every class list and counts violated invariants. Available
//! any time through [`Allocator::check`]; with the `selfcheck` feature the
//! allocator re-checks the whole heap after every public operation and
//! reports damage through `log::error!`.
//!
//! ## Offsets, not pointers
//!
//! All block handles are byte offsets from the heap base, and free-list
//! links are stored as 32-bit offsets in the same space. Offset 0 holds the
//! class table and never names a block, so [`NO_BLOCK`] (zero) plays the
//! role of the null pointer throughout.

mod allocator;
mod block;
mod check;
mod freelist;
mod region;

pub use allocator::{Allocator, CHUNK_SIZE, HEAP_OVERHEAD};
pub use block::{ALIGNMENT, MIN_BLOCK_SIZE};
pub use check::{Stats, Validity};
pub use freelist::{MAX_CLASS, MIN_CLASS_SIZE, NO_BLOCK};
pub use region::{CapacityExhausted, FixedRegion, Region};

#[cfg(feature = "use_libc")]
pub use region::MmapRegion;
