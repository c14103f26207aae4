//! The allocator proper: heap initialization, placement, coalescing, and
//! the public allocate / release / resize / zeroed-allocate operations.
//!
//! All allocator state lives inside the region's bytes. The first words
//! hold the class table, followed by an alignment pad, an allocated
//! prologue block and an epilogue header. The two sentinels bracket the
//! ordinary blocks so that physical-neighbor traversal never has to treat
//! the heap's edges specially: every real block has an initialized footer
//! before it and a header after it.
//!
//! Handles returned to callers are payload offsets into the region. Offset
//! 0 is the class table and stands in for the null pointer.

use log::debug;
use static_assertions::const_assert;

use crate::block::{self, ALIGNMENT, MIN_BLOCK_SIZE, WORD_SIZE};
use crate::check::{self, Stats, Validity};
use crate::freelist::{self, MAX_CLASS, MIN_CLASS_SIZE, NO_BLOCK, TABLE_SIZE};
use crate::region::Region;

/// Granularity of heap extension: the initial free block's size, and the
/// smallest amount the heap grows by when a fit is missing.
pub const CHUNK_SIZE: usize = 256;

// Pad between the class table and the prologue, sized so that every payload
// offset comes out a multiple of 8.
const INIT_PAD: usize = 8;

/// Payload offset of the prologue block.
pub(crate) const PROLOGUE: usize = TABLE_SIZE + INIT_PAD + WORD_SIZE;

/// Payload offset of the first ordinary block.
pub(crate) const FIRST_BLOCK: usize = PROLOGUE + 2 * WORD_SIZE;

/// Region bytes that never belong to an ordinary block: the class table,
/// the pad, the prologue and the epilogue header. The sizes of all ordinary
/// blocks always sum to the region length minus this.
pub const HEAP_OVERHEAD: usize = FIRST_BLOCK;

const_assert!(CHUNK_SIZE % ALIGNMENT == 0);
const_assert!(CHUNK_SIZE >= MIN_BLOCK_SIZE);
const_assert!(PROLOGUE % ALIGNMENT == 0);
const_assert!(FIRST_BLOCK % ALIGNMENT == 0);

/// A segregated free-list allocator over a [`Region`].
///
/// One instance owns one heap. The allocator is strictly single-threaded;
/// wrapping it in a lock is left to embedders that need sharing.
pub struct Allocator<R> {
    region: R,
}

impl<R: Region> Allocator<R> {
    /// Initializes a heap in `region` and returns the allocator.
    ///
    /// The region must be fresh: nothing may have extended it yet. Errors
    /// from the region (it cannot even hold the initial chunk) are passed
    /// through.
    pub fn new(region: R) -> Result<Self, R::Err> {
        let mut alloc = Allocator { region };
        alloc.init()?;
        Ok(alloc)
    }

    /// The region backing this heap.
    pub fn region(&self) -> &R {
        &self.region
    }

    fn init(&mut self) -> Result<(), R::Err> {
        let base = self.region.extend(HEAP_OVERHEAD)?;
        debug_assert_eq!(base, self.region.low(), "region was not fresh");

        let heap = self.region.as_mut_slice();
        heap[..TABLE_SIZE + INIT_PAD].fill(0);
        block::write_tags(heap, PROLOGUE, 2 * WORD_SIZE, true);
        block::write_header(heap, FIRST_BLOCK, 0, true);

        self.extend_heap(CHUNK_SIZE)?;
        self.self_check("init");
        Ok(())
    }

    /// Grows the heap and produces a coalesced free block covering at least
    /// `bytes` bytes, returning its payload offset.
    fn extend_heap(&mut self, bytes: usize) -> Result<usize, R::Err> {
        let size = round_up(bytes, ALIGNMENT);
        let old_end = self.region.extend(size)?;
        debug!("extended heap by {} bytes at offset {}", size, old_end);

        let heap = self.region.as_mut_slice();
        // The old epilogue header becomes the new block's header, and a
        // fresh epilogue goes into the last word of the extension.
        let blk = old_end;
        block::write_tags(heap, blk, size, false);
        block::write_header(heap, blk + size, 0, true);
        freelist::insert(heap, blk, size);

        Ok(self.coalesce(blk))
    }

    /// Merges the free block at `blk` with whichever physical neighbors are
    /// free and returns the payload offset of the merged block.
    ///
    /// `blk` must already be on its class list; the merged block is
    /// reinserted under its combined size.
    fn coalesce(&mut self, blk: usize) -> usize {
        let heap = self.region.as_mut_slice();
        let prev = block::prev_block(heap, blk);
        let next = block::next_block(heap, blk);
        let prev_alloc = block::is_allocated(heap, prev);
        let next_alloc = block::is_allocated(heap, next);
        let mut size = block::size_of_block(heap, blk);

        match (prev_alloc, next_alloc) {
            (true, true) => blk,
            (true, false) => {
                freelist::remove(heap, blk);
                freelist::remove(heap, next);
                size += block::size_of_block(heap, next);
                block::write_tags(heap, blk, size, false);
                freelist::insert(heap, blk, size);
                blk
            }
            (false, true) => {
                freelist::remove(heap, blk);
                freelist::remove(heap, prev);
                size += block::size_of_block(heap, prev);
                block::write_tags(heap, prev, size, false);
                freelist::insert(heap, prev, size);
                prev
            }
            (false, false) => {
                freelist::remove(heap, blk);
                freelist::remove(heap, prev);
                freelist::remove(heap, next);
                size += block::size_of_block(heap, prev) + block::size_of_block(heap, next);
                block::write_tags(heap, prev, size, false);
                freelist::insert(heap, prev, size);
                prev
            }
        }
    }

    /// First fit: scans class lists from the class of `asize` upward and
    /// returns the first block large enough, in insertion order.
    fn find_fit(&self, asize: usize) -> Option<usize> {
        let heap = self.region.as_slice();
        for class in freelist::class_of(asize)..=MAX_CLASS {
            let mut blk = freelist::head(heap, class);
            while blk != NO_BLOCK {
                if block::size_of_block(heap, blk) >= asize {
                    return Some(blk);
                }
                blk = freelist::succ(heap, blk);
            }
        }
        None
    }

    /// Converts the free block at `blk` into an allocated block of `asize`
    /// bytes, splitting off the tail as a new free block when the remainder
    /// is big enough to be worth listing.
    fn place(&mut self, blk: usize, asize: usize) {
        let heap = self.region.as_mut_slice();
        let size = block::size_of_block(heap, blk);
        freelist::remove(heap, blk);

        let remainder = size - asize;
        if remainder > MIN_CLASS_SIZE {
            block::write_tags(heap, blk, asize, true);
            let rest = blk + asize;
            block::write_tags(heap, rest, remainder, false);
            freelist::insert(heap, rest, remainder);
        } else {
            // A remainder this small would sit in the smallest class and
            // rarely coalesce; hand it to the caller with the block.
            block::write_tags(heap, blk, size, true);
        }
    }

    /// Allocates `size` payload bytes and returns the payload offset.
    ///
    /// Returns `None` for `size == 0` and on region exhaustion; a failed
    /// allocation leaves the heap untouched.
    pub fn allocate(&mut self, size: usize) -> Option<usize> {
        if size == 0 {
            return None;
        }
        let asize = adjusted_size(size);
        debug!("allocate({}) -> block size {}", size, asize);

        let blk = match self.find_fit(asize) {
            Some(blk) => blk,
            None => match self.extend_heap(asize.max(CHUNK_SIZE)) {
                Ok(blk) => blk,
                Err(_) => {
                    debug!("allocate({}): region exhausted", size);
                    return None;
                }
            },
        };
        self.place(blk, asize);
        self.self_check("allocate");
        Some(blk)
    }

    /// Releases the block at payload offset `blk`. The null offset is
    /// ignored; anything else must be a live handle from an allocation
    /// operation on this allocator.
    pub fn release(&mut self, blk: usize) {
        if blk == NO_BLOCK {
            return;
        }
        debug!("release({})", blk);
        let heap = self.region.as_mut_slice();
        let size = block::size_of_block(heap, blk);
        block::write_tags(heap, blk, size, false);
        freelist::insert(heap, blk, size);
        self.coalesce(blk);
        self.self_check("release");
    }

    /// Resizes the allocation at `blk` to `size` payload bytes.
    ///
    /// The null offset allocates; `size == 0` releases and returns `None`.
    /// Shrinking never fails and keeps the handle; small trailing space is
    /// absorbed rather than split off. Growing moves the payload to a new
    /// block; if that allocation fails, `None` is returned and the original
    /// block is left untouched.
    pub fn resize(&mut self, blk: usize, size: usize) -> Option<usize> {
        if size == 0 {
            self.release(blk);
            return None;
        }
        if blk == NO_BLOCK {
            return self.allocate(size);
        }

        let asize = adjusted_size(size);
        let old = block::size_of_block(self.region.as_slice(), blk);
        if asize == old {
            return Some(blk);
        }

        if asize < old {
            // Too little left over to stand alone: keep the block as is.
            if old - asize <= MIN_BLOCK_SIZE {
                return Some(blk);
            }
            let heap = self.region.as_mut_slice();
            block::write_tags(heap, blk, asize, true);
            let rest = blk + asize;
            block::write_tags(heap, rest, old - asize, true);
            self.release(rest);
            self.self_check("resize");
            return Some(blk);
        }

        let new_blk = self.allocate(size)?;
        let copy_len = (old - 2 * WORD_SIZE).min(size);
        let heap = self.region.as_mut_slice();
        heap.copy_within(blk..blk + copy_len, new_blk);
        self.release(blk);
        self.self_check("resize");
        Some(new_blk)
    }

    /// Allocates room for `count` elements of `size` bytes each and zeroes
    /// it. Overflow of `count * size` is treated as exhaustion.
    pub fn zeroed_allocate(&mut self, count: usize, size: usize) -> Option<usize> {
        let total = count.checked_mul(size)?;
        let blk = self.allocate(total)?;
        let heap = self.region.as_mut_slice();
        heap[blk..blk + total].fill(0);
        Some(blk)
    }

    /// The payload bytes of the allocated block at `blk`.
    pub fn payload(&self, blk: usize) -> &[u8] {
        let heap = self.region.as_slice();
        let len = block::size_of_block(heap, blk) - 2 * WORD_SIZE;
        &heap[blk..blk + len]
    }

    /// Mutable payload bytes of the allocated block at `blk`.
    pub fn payload_mut(&mut self, blk: usize) -> &mut [u8] {
        let heap = self.region.as_mut_slice();
        let len = block::size_of_block(heap, blk) - 2 * WORD_SIZE;
        &mut heap[blk..blk + len]
    }

    /// Runs the consistency checker over the current heap. Read-only.
    pub fn check(&self) -> (Validity, Stats) {
        check::check_heap(
            self.region.as_slice(),
            self.region.low(),
            self.region.high(),
        )
    }

    #[cfg(feature = "selfcheck")]
    fn self_check(&self, op: &str) {
        let (validity, stats) = self.check();
        if !validity.is_valid() {
            log::error!("heap inconsistent after {}: {:?} ({:?})", op, validity, stats);
        }
    }

    #[cfg(not(feature = "selfcheck"))]
    fn self_check(&self, _op: &str) {}
}

/// Whole-block size needed to hold `size` payload bytes: tag overhead
/// added, rounded up to the alignment, never below the minimum block.
fn adjusted_size(size: usize) -> usize {
    if size <= ALIGNMENT {
        MIN_BLOCK_SIZE
    } else {
        round_up(size + 2 * WORD_SIZE, ALIGNMENT)
    }
}

// Round up value to the nearest multiple of increment
fn round_up(value: usize, increment: usize) -> usize {
    if value == 0 {
        return 0;
    }
    increment * ((value - 1) / increment + 1)
}
