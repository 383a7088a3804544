use crate::provider::{RegionError, RegionProvider, WORD_BYTES};
use heap_addresses::RegionAddress;
use log::warn;

/// Fixed-capacity in-memory sbrk region.
///
/// Backs the managed range with an owned byte array of `CAP` bytes and a
/// break offset. [`grow`](RegionProvider::grow) bumps the break until the
/// capacity is spent, after which every further request is refused, the
/// same discipline as a real `sbrk` hitting its configured maximum.
///
/// The array starts zeroed and is never shrunk; released blocks keep their
/// bytes until reused.
pub struct SbrkRegion<const CAP: usize> {
    bytes: ArenaBytes<CAP>,
    brk: usize,
}

/// Arena storage with a minimum alignment matching the payload alignment.
#[repr(align(16))]
struct ArenaBytes<const CAP: usize>([u8; CAP]);

impl<const CAP: usize> SbrkRegion<CAP> {
    /// An empty region; no bytes are available until the first `grow`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bytes: ArenaBytes([0; CAP]),
            brk: 0,
        }
    }

    /// Total bytes the region can ever hold.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        CAP
    }

    /// Bytes still available to future `grow` calls.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        CAP - self.brk
    }

    #[inline]
    fn check_range(&self, addr: RegionAddress, len: usize) {
        let start = addr.as_usize();
        assert!(
            start + len <= self.brk,
            "access [{start:#x}, {:#x}) beyond break {:#x}",
            start + len,
            self.brk
        );
    }
}

impl<const CAP: usize> Default for SbrkRegion<CAP> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const CAP: usize> RegionProvider for SbrkRegion<CAP> {
    #[inline]
    fn low(&self) -> RegionAddress {
        RegionAddress::zero()
    }

    #[inline]
    fn high(&self) -> RegionAddress {
        RegionAddress::new(self.brk.saturating_sub(1) as u64)
    }

    #[inline]
    fn len(&self) -> u64 {
        self.brk as u64
    }

    fn grow(&mut self, bytes: u64) -> Result<RegionAddress, RegionError> {
        let requested = usize::try_from(bytes).unwrap_or(usize::MAX);
        if requested > self.remaining() {
            warn!(
                "refusing to grow region by {bytes} bytes ({} remaining)",
                self.remaining()
            );
            return Err(RegionError::Exhausted {
                requested: bytes,
                available: self.remaining() as u64,
            });
        }
        let first_new = RegionAddress::new(self.brk as u64);
        self.brk += requested;
        Ok(first_new)
    }

    fn word(&self, addr: RegionAddress) -> u64 {
        debug_assert!(addr.is_aligned(WORD_BYTES as u64), "unaligned word read");
        self.check_range(addr, WORD_BYTES);
        let start = addr.as_usize();
        let mut raw = [0_u8; WORD_BYTES];
        raw.copy_from_slice(&self.bytes.0[start..start + WORD_BYTES]);
        u64::from_ne_bytes(raw)
    }

    fn set_word(&mut self, addr: RegionAddress, word: u64) {
        debug_assert!(addr.is_aligned(WORD_BYTES as u64), "unaligned word write");
        self.check_range(addr, WORD_BYTES);
        let start = addr.as_usize();
        self.bytes.0[start..start + WORD_BYTES].copy_from_slice(&word.to_ne_bytes());
    }

    fn bytes(&self, addr: RegionAddress, len: usize) -> &[u8] {
        self.check_range(addr, len);
        let start = addr.as_usize();
        &self.bytes.0[start..start + len]
    }

    fn bytes_mut(&mut self, addr: RegionAddress, len: usize) -> &mut [u8] {
        self.check_range(addr, len);
        let start = addr.as_usize();
        &mut self.bytes.0[start..start + len]
    }

    fn copy(&mut self, dst: RegionAddress, src: RegionAddress, len: usize) {
        self.check_range(src, len);
        self.check_range(dst, len);
        let src = src.as_usize();
        self.bytes.0.copy_within(src..src + len, dst.as_usize());
    }
}
