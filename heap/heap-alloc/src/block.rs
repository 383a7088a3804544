//! Block geometry over the managed region.
//!
//! A block is laid out as `[header | payload | footer]`; all navigation
//! runs off the payload address, with the tag words sized from whichever
//! boundary is cheaper to reach. The prologue and epilogue sentinels
//! guarantee that the neighbor probes below always land on a valid tag, so
//! none of these helpers bounds-check.

use crate::tag::BlockTag;
use heap_addresses::RegionAddress;
use heap_region::RegionProvider;

/// Size of one tag word in bytes.
pub const WORD: u64 = 8;

/// Payload alignment; twice the tag word.
pub const ALIGNMENT: u64 = 16;

/// Smallest legal block: header, two ring link slots, footer.
pub const MIN_BLOCK_SIZE: u64 = 32;

/// Header plus footer overhead of every block.
pub const BLOCK_OVERHEAD: u64 = 16;

/// Bytes requested from the region by the bootstrap extension.
pub(crate) const INITIAL_CHUNK: u64 = 512;

/// Round a raw request up to a legal block size (aligned payload plus tag
/// overhead). `None` only on arithmetic overflow.
#[inline]
#[allow(clippy::cast_possible_truncation)]
pub(crate) const fn adjust_request(size: usize) -> Option<u64> {
    const _: () = assert!(
        size_of::<usize>() <= size_of::<u64>(),
        "usize wider than u64"
    );
    match (size as u64).checked_add(ALIGNMENT - 1) {
        Some(padded) => (padded & !(ALIGNMENT - 1)).checked_add(BLOCK_OVERHEAD),
        None => None,
    }
}

/// Address of the header word of the block with payload `payload`.
#[inline]
pub(crate) fn header_addr(payload: RegionAddress) -> RegionAddress {
    payload - WORD
}

/// Read the header tag of the block with payload `payload`.
#[inline]
pub(crate) fn header<R: RegionProvider>(region: &R, payload: RegionAddress) -> BlockTag {
    BlockTag::from_bits(region.word(header_addr(payload)))
}

/// Address of the footer word of the block with payload `payload`.
#[inline]
pub(crate) fn footer_addr<R: RegionProvider>(region: &R, payload: RegionAddress) -> RegionAddress {
    payload + header(region, payload).size() - 2 * WORD
}

/// Write `tag` as both header and footer of the block at `payload`.
#[inline]
pub(crate) fn write_tags<R: RegionProvider>(region: &mut R, payload: RegionAddress, tag: BlockTag) {
    region.set_word(header_addr(payload), tag.into_bits());
    region.set_word(payload + tag.size() - 2 * WORD, tag.into_bits());
}

/// Payload address of the next adjacent block.
#[inline]
pub(crate) fn next_payload<R: RegionProvider>(region: &R, payload: RegionAddress) -> RegionAddress {
    payload + header(region, payload).size()
}

/// Footer tag of the previous adjacent block (the word just above this
/// block's header).
#[inline]
pub(crate) fn prev_footer<R: RegionProvider>(region: &R, payload: RegionAddress) -> BlockTag {
    BlockTag::from_bits(region.word(payload - 2 * WORD))
}

/// Payload address of the previous adjacent block, sized via its footer.
#[inline]
pub(crate) fn prev_payload<R: RegionProvider>(region: &R, payload: RegionAddress) -> RegionAddress {
    payload - prev_footer(region, payload).size()
}
