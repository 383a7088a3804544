use heap_addresses::RegionAddress;

/// Size of one tag word in bytes.
pub const WORD_BYTES: usize = 8;

/// Growing the region failed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegionError {
    #[error("region exhausted: requested {requested} bytes, {available} available")]
    Exhausted { requested: u64, available: u64 },
}

/// The sbrk region consumed by the allocator.
///
/// A provider owns one contiguous byte range and exposes it to the
/// allocator through offset-addressed reads and writes. The region only
/// ever grows: [`grow`](Self::grow) extends the high end and hands back the
/// offset of the first new byte, the analogue of a classic `sbrk` call.
///
/// The allocator is the sole writer of the range; the provider makes no
/// assumptions about its contents and never interprets tag words itself.
///
/// # Panics
///
/// Accessors take byte offsets that must lie within the currently grown
/// range (word accessors additionally require 8-byte alignment).
/// Implementations are expected to panic on out-of-range access rather
/// than return garbage; the allocator never issues such accesses while its
/// invariants hold.
pub trait RegionProvider {
    /// Offset of the first byte of the region.
    fn low(&self) -> RegionAddress;

    /// Offset of the last byte currently in the region.
    ///
    /// Meaningless before the first successful [`grow`](Self::grow).
    fn high(&self) -> RegionAddress;

    /// Number of bytes currently in the region.
    fn len(&self) -> u64;

    /// Whether the region has not been grown yet.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Extend the region by `bytes`, returning the offset of the first new
    /// byte.
    ///
    /// # Errors
    ///
    /// [`RegionError::Exhausted`] when the underlying storage cannot supply
    /// `bytes` more bytes. The region is unchanged in that case.
    fn grow(&mut self, bytes: u64) -> Result<RegionAddress, RegionError>;

    /// Read the 8-byte word at `addr`.
    fn word(&self, addr: RegionAddress) -> u64;

    /// Write the 8-byte word at `addr`.
    fn set_word(&mut self, addr: RegionAddress, word: u64);

    /// Borrow `len` bytes starting at `addr`.
    fn bytes(&self, addr: RegionAddress, len: usize) -> &[u8];

    /// Mutably borrow `len` bytes starting at `addr`.
    fn bytes_mut(&mut self, addr: RegionAddress, len: usize) -> &mut [u8];

    /// Copy `len` bytes from `src` to `dst` within the region.
    ///
    /// The ranges must not overlap in a way that would corrupt the source
    /// before it is read.
    fn copy(&mut self, dst: RegionAddress, src: RegionAddress, len: usize);
}
