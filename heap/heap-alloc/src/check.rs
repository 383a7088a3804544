//! Invariant checker and heap dump.
//!
//! [`Heap::check_invariants`] walks every block and every ring node and
//! reports the first broken invariant it finds. It is pure diagnosis: no
//! heap state is touched, and production builds that never call it pay
//! nothing. With the `checks` cargo feature enabled, every public heap
//! operation runs the checker before returning and logs violations.

use crate::block::{self, ALIGNMENT, BLOCK_OVERHEAD, MIN_BLOCK_SIZE, WORD};
use crate::heap::Heap;
use crate::ring::FreeRing;
use crate::tag::BlockTag;
use heap_addresses::RegionAddress;
use heap_region::RegionProvider;
use log::info;

/// A broken heap invariant, as reported by [`Heap::check_invariants`].
///
/// `line` is the caller-supplied source line of the check site.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("line {line}: tag word at {addr:?} lies outside the region")]
    TagOutOfBounds { line: u32, addr: RegionAddress },
    #[error("line {line}: header and footer disagree at {payload:?}")]
    TagMismatch { line: u32, payload: RegionAddress },
    #[error("line {line}: illegal block size {size} at {payload:?}")]
    BadBlockSize {
        line: u32,
        payload: RegionAddress,
        size: u64,
    },
    #[error("line {line}: payload {payload:?} is not 16-byte aligned")]
    UnalignedPayload { line: u32, payload: RegionAddress },
    #[error("line {line}: adjacent free blocks at {payload:?}")]
    AdjacentFree { line: u32, payload: RegionAddress },
    #[error("line {line}: epilogue is missing or malformed at {addr:?}")]
    BadSentinel { line: u32, addr: RegionAddress },
    #[error("line {line}: free block {payload:?} is not linked in the ring")]
    FreeBlockNotInRing { line: u32, payload: RegionAddress },
    #[error("line {line}: ring node {node:?} does not tag a free block")]
    NodeNotFree { line: u32, node: RegionAddress },
    #[error("line {line}: ring node {node:?} has non-reciprocal links")]
    BrokenLink { line: u32, node: RegionAddress },
    #[error("line {line}: ring endpoints are inconsistent")]
    BrokenEndpoints { line: u32 },
    #[error("line {line}: {free_blocks} free blocks but {ring_nodes} ring nodes")]
    RingMismatch {
        line: u32,
        free_blocks: usize,
        ring_nodes: usize,
    },
}

/// Whether `node` addresses a spot whose header and link words can be read
/// without leaving the region.
fn node_in_bounds<R: RegionProvider>(region: &R, node: RegionAddress) -> bool {
    let first_payload = region.low() + 2 * BLOCK_OVERHEAD;
    let end = region.low() + region.len();
    node.as_u64() >= first_payload.as_u64() && (node + 2 * WORD).as_u64() <= end.as_u64()
}

fn ring_contains<R: RegionProvider>(
    ring: &FreeRing,
    region: &R,
    wanted: RegionAddress,
    limit: usize,
) -> bool {
    if ring.is_empty() {
        return false;
    }
    let mut node = ring.head();
    for _ in 0..limit {
        if node == wanted {
            return true;
        }
        if !node_in_bounds(region, node) {
            break;
        }
        node = FreeRing::next(region, node);
        if node == ring.head() {
            break;
        }
    }
    false
}

impl<R: RegionProvider> Heap<R> {
    /// Verify every heap invariant, reporting the first violation found.
    ///
    /// Checked per block: header equals footer, the size is a multiple of
    /// 16 and at least 32, the payload is 16-aligned, both tag words lie
    /// inside the region, and no two adjacent blocks are both free.
    /// Checked for the ring: links are reciprocal, the endpoints close the
    /// cycle, every node tags a free block, and the node set equals the
    /// free-block set.
    ///
    /// `line` is echoed in the violation so a failing call site can be
    /// found; pass `line!()`.
    ///
    /// # Errors
    ///
    /// The first [`InvariantViolation`] encountered, if any.
    pub fn check_invariants(&self, line: u32) -> Result<(), InvariantViolation> {
        let region = &self.region;
        let end = region.low() + region.len();
        #[allow(clippy::cast_possible_truncation)]
        let limit = (region.len() / MIN_BLOCK_SIZE) as usize + 1;

        let mut free_blocks = 0_usize;
        let mut prev_was_free = false;
        let mut payload = region.low() + 2 * BLOCK_OVERHEAD;
        loop {
            let header_addr = block::header_addr(payload);
            if (header_addr + WORD).as_u64() > end.as_u64() {
                return Err(InvariantViolation::TagOutOfBounds {
                    line,
                    addr: header_addr,
                });
            }
            let tag = block::header(region, payload);

            if tag.size() == 0 {
                // the epilogue must be allocated and must close the region
                if tag.is_free() || (header_addr + WORD).as_u64() != end.as_u64() {
                    return Err(InvariantViolation::BadSentinel {
                        line,
                        addr: header_addr,
                    });
                }
                break;
            }

            if tag.size() % ALIGNMENT != 0 || tag.size() < MIN_BLOCK_SIZE {
                return Err(InvariantViolation::BadBlockSize {
                    line,
                    payload,
                    size: tag.size(),
                });
            }
            if !payload.is_aligned(ALIGNMENT) {
                return Err(InvariantViolation::UnalignedPayload { line, payload });
            }

            let footer_addr = payload + tag.size() - 2 * WORD;
            if (footer_addr + WORD).as_u64() > end.as_u64() {
                return Err(InvariantViolation::TagOutOfBounds {
                    line,
                    addr: footer_addr,
                });
            }
            if BlockTag::from_bits(region.word(footer_addr)) != tag {
                return Err(InvariantViolation::TagMismatch { line, payload });
            }

            if tag.is_free() {
                if prev_was_free {
                    return Err(InvariantViolation::AdjacentFree { line, payload });
                }
                if !ring_contains(&self.ring, region, payload, limit) {
                    return Err(InvariantViolation::FreeBlockNotInRing { line, payload });
                }
                free_blocks += 1;
            }
            prev_was_free = tag.is_free();
            payload += tag.size();
        }

        self.check_ring(line, free_blocks, limit)
    }

    fn check_ring(
        &self,
        line: u32,
        free_blocks: usize,
        limit: usize,
    ) -> Result<(), InvariantViolation> {
        let region = &self.region;
        let ring = &self.ring;

        if ring.is_empty() {
            if ring.tail() != ring.anchor() {
                return Err(InvariantViolation::BrokenEndpoints { line });
            }
            if free_blocks != 0 {
                return Err(InvariantViolation::RingMismatch {
                    line,
                    free_blocks,
                    ring_nodes: 0,
                });
            }
            return Ok(());
        }

        if !node_in_bounds(region, ring.head()) || !node_in_bounds(region, ring.tail()) {
            return Err(InvariantViolation::BrokenEndpoints { line });
        }
        if FreeRing::next(region, ring.tail()) != ring.head()
            || FreeRing::prev(region, ring.head()) != ring.tail()
        {
            return Err(InvariantViolation::BrokenEndpoints { line });
        }

        let mut ring_nodes = 0_usize;
        let mut node = ring.head();
        loop {
            ring_nodes += 1;
            if ring_nodes > limit {
                return Err(InvariantViolation::RingMismatch {
                    line,
                    free_blocks,
                    ring_nodes,
                });
            }

            if !node_in_bounds(region, node) {
                return Err(InvariantViolation::TagOutOfBounds { line, addr: node });
            }
            if block::header(region, node).allocated() {
                return Err(InvariantViolation::NodeNotFree { line, node });
            }
            let next = FreeRing::next(region, node);
            let prev = FreeRing::prev(region, node);
            if !node_in_bounds(region, next) || !node_in_bounds(region, prev) {
                return Err(InvariantViolation::BrokenLink { line, node });
            }
            if FreeRing::prev(region, next) != node || FreeRing::next(region, prev) != node {
                return Err(InvariantViolation::BrokenLink { line, node });
            }

            node = next;
            if node == ring.head() {
                break;
            }
        }

        if ring_nodes == free_blocks {
            Ok(())
        } else {
            Err(InvariantViolation::RingMismatch {
                line,
                free_blocks,
                ring_nodes,
            })
        }
    }

    /// Log every block and the ring topology at info level.
    pub fn dump(&self) {
        let region = &self.region;
        let end = region.low() + region.len();
        info!("heap: {} bytes in region", region.len());

        let mut index = 0_usize;
        let mut payload = region.low() + 2 * BLOCK_OVERHEAD;
        loop {
            let header_addr = block::header_addr(payload);
            if (header_addr + WORD).as_u64() > end.as_u64() {
                info!("  walk ran off the region at {header_addr:?}");
                break;
            }
            let tag = block::header(region, payload);
            if tag.size() == 0 {
                info!("  epilogue at {header_addr:?}");
                break;
            }
            info!(
                "  block {index}: payload={payload:?} size={} {}",
                tag.size(),
                if tag.is_free() { "free" } else { "allocated" }
            );
            index += 1;
            payload += tag.size();
        }

        if self.ring.is_empty() {
            info!("ring: empty");
            return;
        }
        info!("ring: head={:?} tail={:?}", self.ring.head(), self.ring.tail());
        #[allow(clippy::cast_possible_truncation)]
        let limit = (region.len() / MIN_BLOCK_SIZE) as usize + 1;
        let mut node = self.ring.head();
        for _ in 0..limit {
            if !node_in_bounds(region, node) {
                info!("  node {node:?} lies outside the region");
                break;
            }
            info!(
                "  node {node:?}: prev={:?} next={:?} size={}",
                FreeRing::prev(region, node),
                FreeRing::next(region, node),
                block::header(region, node).size()
            );
            node = FreeRing::next(region, node);
            if node == self.ring.head() {
                break;
            }
        }
    }
}
