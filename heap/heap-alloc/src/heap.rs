use crate::block::{self, ALIGNMENT, BLOCK_OVERHEAD, INITIAL_CHUNK, MIN_BLOCK_SIZE, WORD};
use crate::ring::FreeRing;
use crate::tag::BlockTag;
use heap_addresses::RegionAddress;
use heap_region::{RegionError, RegionProvider};
use log::{trace, warn};

/// Bootstrapping the heap failed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BootstrapError {
    #[error("region provider refused the initial allocation: {0}")]
    Region(#[from] RegionError),
}

/// Boundary-tag heap with an explicit free ring over an sbrk region.
///
/// The heap owns its region provider and hands out payload addresses that
/// stay valid until released; live payloads are never relocated. Released
/// blocks are coalesced with free neighbors and recycled through a
/// circular free list before the region is grown again.
///
/// All operations take `&mut self`; the allocator is single-threaded by
/// construction.
///
/// ### Example
/// ```rust
/// use heap_alloc::Heap;
/// use heap_region::SbrkRegion;
///
/// let mut heap = Heap::bootstrap(SbrkRegion::<4096>::new()).unwrap();
///
/// let ptr = heap.allocate(100).unwrap();
/// heap.payload_mut(ptr, 4).copy_from_slice(b"data");
/// assert_eq!(heap.payload(ptr, 4), b"data");
/// heap.release(Some(ptr));
/// ```
pub struct Heap<R> {
    pub(crate) region: R,
    pub(crate) ring: FreeRing,
}

impl<R: RegionProvider> Heap<R> {
    /// Initialize the region and build an empty heap.
    ///
    /// Writes the alignment pad, the allocated prologue pair and the
    /// epilogue header, then seeds the heap with one 512-byte free chunk.
    ///
    /// # Errors
    ///
    /// [`BootstrapError::Region`] when the provider cannot supply the
    /// sentinel words or the initial chunk.
    pub fn bootstrap(mut region: R) -> Result<Self, BootstrapError> {
        region.grow(2 * BLOCK_OVERHEAD)?;
        let low = region.low();

        // pad word, then prologue header/footer, then the epilogue
        region.set_word(low, 0);
        let prologue = BlockTag::allocated_with_size(BLOCK_OVERHEAD);
        region.set_word(low + WORD, prologue.into_bits());
        region.set_word(low + 2 * WORD, prologue.into_bits());
        region.set_word(low + 3 * WORD, BlockTag::allocated_with_size(0).into_bits());

        // the prologue's payload address doubles as the empty-ring anchor
        let anchor = low + BLOCK_OVERHEAD;
        let mut heap = Self {
            region,
            ring: FreeRing::new(anchor),
        };
        heap.extend(INITIAL_CHUNK)?;
        trace!("heap bootstrapped, {} bytes in region", heap.region.len());
        Ok(heap)
    }

    /// Allocate `size` payload bytes.
    ///
    /// Returns a 16-aligned payload address, or `None` when `size` is zero
    /// or the region cannot be grown far enough.
    pub fn allocate(&mut self, size: usize) -> Option<RegionAddress> {
        if size == 0 {
            return None;
        }
        let wanted = block::adjust_request(size)?;

        let payload = if let Some(fit) = self.ring.first_fit(&self.region, wanted) {
            fit
        } else {
            match self.extend(wanted) {
                Ok(fresh) => fresh,
                Err(error) => {
                    trace!("allocate({size}) failed: {error}");
                    return None;
                }
            }
        };

        self.place(payload, wanted);
        trace!("allocate({size}) -> {payload:?}");
        self.checkpoint(line!());
        Some(payload)
    }

    /// Release the block at `ptr`; `None` is ignored.
    ///
    /// The block is merged with any free neighbors before it re-enters the
    /// free ring.
    pub fn release(&mut self, ptr: Option<RegionAddress>) {
        let Some(payload) = ptr else {
            warn!("release of nil pointer ignored");
            return;
        };
        let size = block::header(&self.region, payload).size();
        block::write_tags(&mut self.region, payload, BlockTag::free_with_size(size));
        let merged = self.coalesce(payload);
        self.ring.insert(&mut self.region, merged);
        trace!("release({payload:?}) -> free block of {size} bytes at {merged:?}");
        self.checkpoint(line!());
    }

    /// Resize the block at `ptr` to `size` payload bytes.
    ///
    /// `reallocate(None, size)` allocates; `reallocate(ptr, 0)` releases
    /// and returns `None`. A block that is already large enough is returned
    /// unchanged; growth allocates a new block, copies the old payload and
    /// releases the original. On allocation failure the original block is
    /// left intact and `None` is returned.
    pub fn reallocate(&mut self, ptr: Option<RegionAddress>, size: usize) -> Option<RegionAddress> {
        let Some(payload) = ptr else {
            return self.allocate(size);
        };
        if size == 0 {
            self.release(Some(payload));
            return None;
        }

        let wanted = block::adjust_request(size)?;
        let old_size = block::header(&self.region, payload).size();
        if old_size >= wanted {
            // shrinking in place is a no-op by policy
            self.checkpoint(line!());
            return Some(payload);
        }

        let fresh = self.allocate(size)?;
        // the old payload is the smaller of the two; tag words stay behind
        #[allow(clippy::cast_possible_truncation)]
        let old_payload_len = (old_size - BLOCK_OVERHEAD) as usize;
        self.region.copy(fresh, payload, old_payload_len);
        self.release(Some(payload));
        trace!("reallocate({payload:?}, {size}) -> {fresh:?}");
        Some(fresh)
    }

    /// Allocate a zeroed array of `count` elements of `size` bytes each.
    ///
    /// Returns `None` when the product is zero, overflows, or the
    /// allocation fails.
    pub fn zero_allocate(&mut self, count: usize, size: usize) -> Option<RegionAddress> {
        let total = count.checked_mul(size)?;
        let payload = self.allocate(total)?;
        self.region.bytes_mut(payload, total).fill(0);
        Some(payload)
    }

    /// Size of the block at `payload`, tag overhead included.
    ///
    /// # Panics
    ///
    /// If `payload` does not address a block inside the region.
    #[must_use]
    pub fn block_size(&self, payload: RegionAddress) -> u64 {
        block::header(&self.region, payload).size()
    }

    /// Borrow `len` payload bytes of an allocated block.
    ///
    /// # Panics
    ///
    /// If the range runs outside the region.
    #[must_use]
    pub fn payload(&self, payload: RegionAddress, len: usize) -> &[u8] {
        self.region.bytes(payload, len)
    }

    /// Mutably borrow `len` payload bytes of an allocated block.
    ///
    /// # Panics
    ///
    /// If the range runs outside the region.
    pub fn payload_mut(&mut self, payload: RegionAddress, len: usize) -> &mut [u8] {
        self.region.bytes_mut(payload, len)
    }

    /// The underlying region provider.
    #[must_use]
    pub const fn region(&self) -> &R {
        &self.region
    }

    /// Mark the free block at `payload` allocated, splitting off the tail
    /// as a new free block when a conformant remainder is left over.
    fn place(&mut self, payload: RegionAddress, wanted: u64) {
        let old_size = block::header(&self.region, payload).size();
        debug_assert!(old_size >= wanted);
        self.ring.remove(&mut self.region, payload);

        let remainder = old_size - wanted;
        if remainder >= MIN_BLOCK_SIZE {
            block::write_tags(
                &mut self.region,
                payload,
                BlockTag::allocated_with_size(wanted),
            );
            let rest = payload + wanted;
            block::write_tags(&mut self.region, rest, BlockTag::free_with_size(remainder));
            self.ring.insert(&mut self.region, rest);
        } else {
            // a sub-minimum remainder would be an illegal block; consume it
            block::write_tags(
                &mut self.region,
                payload,
                BlockTag::allocated_with_size(old_size),
            );
        }
    }

    /// Merge the free block at `payload` with free neighbors on either
    /// side, returning the payload address of the merged block.
    ///
    /// Merged neighbors are unlinked from the ring; the returned block is
    /// *not* inserted, that is the caller's job.
    fn coalesce(&mut self, payload: RegionAddress) -> RegionAddress {
        let prev_tag = block::prev_footer(&self.region, payload);
        let next = block::next_payload(&self.region, payload);
        let next_tag = block::header(&self.region, next);
        let size = block::header(&self.region, payload).size();

        match (prev_tag.allocated(), next_tag.allocated()) {
            (true, true) => payload,
            (true, false) => {
                self.ring.remove(&mut self.region, next);
                let merged = size + next_tag.size();
                block::write_tags(&mut self.region, payload, BlockTag::free_with_size(merged));
                payload
            }
            (false, true) => {
                let prev = block::prev_payload(&self.region, payload);
                self.ring.remove(&mut self.region, prev);
                let merged = size + prev_tag.size();
                block::write_tags(&mut self.region, prev, BlockTag::free_with_size(merged));
                prev
            }
            (false, false) => {
                let prev = block::prev_payload(&self.region, payload);
                self.ring.remove(&mut self.region, prev);
                self.ring.remove(&mut self.region, next);
                let merged = size + prev_tag.size() + next_tag.size();
                block::write_tags(&mut self.region, prev, BlockTag::free_with_size(merged));
                prev
            }
        }
    }

    /// Grow the region by `block_size` bytes and shape the new bytes into
    /// a free block, merging with a trailing free block when one exists.
    fn extend(&mut self, block_size: u64) -> Result<RegionAddress, RegionError> {
        debug_assert!(block_size >= MIN_BLOCK_SIZE && block_size % ALIGNMENT == 0);
        let payload = self.region.grow(block_size)?;

        // the new header lands on the old epilogue; a fresh epilogue
        // follows the new block
        block::write_tags(
            &mut self.region,
            payload,
            BlockTag::free_with_size(block_size),
        );
        self.region.set_word(
            payload + block_size - WORD,
            BlockTag::allocated_with_size(0).into_bits(),
        );

        let merged = self.coalesce(payload);
        self.ring.insert(&mut self.region, merged);
        trace!("extended region by {block_size} bytes, free block at {merged:?}");
        Ok(merged)
    }

    #[cfg(feature = "checks")]
    fn checkpoint(&self, line: u32) {
        if let Err(violation) = self.check_invariants(line) {
            log::error!("heap invariant violated: {violation}");
        }
    }

    #[cfg(not(feature = "checks"))]
    #[allow(clippy::unused_self)]
    const fn checkpoint(&self, _line: u32) {}
}
