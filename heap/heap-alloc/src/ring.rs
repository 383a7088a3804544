//! Circular doubly-linked ring of free blocks.
//!
//! Ring links live inside the blocks they describe: a free block's first
//! two payload words hold the payload addresses of its ring neighbors
//! (previous at offset 0, next at offset 8). Allocated blocks overwrite
//! those words with client data, so a node must be unlinked before its
//! block is handed out.
//!
//! Insertion happens at the tail and the first-fit walk starts at the
//! head, so reuse is FIFO: the oldest freed block that fits wins.

use crate::block::{self, WORD};
use heap_addresses::RegionAddress;
use heap_region::RegionProvider;
use log::warn;

/// Ring state: the two endpoints plus the anchor sentinel.
///
/// The anchor is an address that can never be a ring node (the prologue's
/// payload); `head == anchor` encodes the empty ring. With one node N,
/// `head == tail == N` and N links to itself. Otherwise the ring is
/// traversed by following next-links from `head` until `head` comes back
/// around.
pub(crate) struct FreeRing {
    head: RegionAddress,
    tail: RegionAddress,
    anchor: RegionAddress,
}

impl FreeRing {
    pub(crate) const fn new(anchor: RegionAddress) -> Self {
        Self {
            head: anchor,
            tail: anchor,
            anchor,
        }
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.head == self.anchor
    }

    #[inline]
    pub(crate) const fn head(&self) -> RegionAddress {
        self.head
    }

    #[inline]
    pub(crate) const fn tail(&self) -> RegionAddress {
        self.tail
    }

    #[inline]
    pub(crate) const fn anchor(&self) -> RegionAddress {
        self.anchor
    }

    /// Previous-in-ring neighbor of `node`.
    #[inline]
    pub(crate) fn prev<R: RegionProvider>(region: &R, node: RegionAddress) -> RegionAddress {
        RegionAddress::new(region.word(node))
    }

    /// Next-in-ring neighbor of `node`.
    #[inline]
    pub(crate) fn next<R: RegionProvider>(region: &R, node: RegionAddress) -> RegionAddress {
        RegionAddress::new(region.word(node + WORD))
    }

    /// Store both link words of `node` in one step.
    #[inline]
    fn set_links<R: RegionProvider>(
        region: &mut R,
        node: RegionAddress,
        prev: RegionAddress,
        next: RegionAddress,
    ) {
        region.set_word(node, prev.as_u64());
        region.set_word(node + WORD, next.as_u64());
    }

    /// Link the free block at `node` into the ring at the tail position.
    ///
    /// The block's boundary tags must already mark it free.
    pub(crate) fn insert<R: RegionProvider>(&mut self, region: &mut R, node: RegionAddress) {
        if self.is_empty() {
            self.head = node;
            self.tail = node;
            Self::set_links(region, node, node, node);
            return;
        }

        Self::set_links(region, node, self.tail, self.head);
        if self.head == self.tail {
            // single node: both of its links now point at the newcomer
            Self::set_links(region, self.head, node, node);
        } else {
            Self::set_links(region, self.tail, Self::prev(region, self.tail), node);
            Self::set_links(region, self.head, node, Self::next(region, self.head));
        }
        self.tail = node;
    }

    /// Unlink `node` from the ring.
    pub(crate) fn remove<R: RegionProvider>(&mut self, region: &mut R, node: RegionAddress) {
        if self.is_empty() {
            warn!("remove of {node:?} from an empty ring");
            return;
        }

        if self.head == self.tail {
            self.head = self.anchor;
            self.tail = self.anchor;
            return;
        }

        let prev = Self::prev(region, node);
        if Self::prev(region, prev) == node {
            // exactly two nodes: the survivor rings itself
            Self::set_links(region, prev, prev, prev);
            self.head = prev;
            self.tail = prev;
            return;
        }

        let next = Self::next(region, node);
        Self::set_links(region, prev, Self::prev(region, prev), next);
        Self::set_links(region, next, prev, Self::next(region, next));
        if node == self.tail {
            self.tail = prev;
        }
        if node == self.head {
            self.head = next;
        }
    }

    /// First-fit search: the first node (oldest first) whose block size is
    /// at least `min_size`.
    pub(crate) fn first_fit<R: RegionProvider>(
        &self,
        region: &R,
        min_size: u64,
    ) -> Option<RegionAddress> {
        if self.is_empty() {
            return None;
        }
        let mut node = self.head;
        loop {
            if block::header(region, node).size() >= min_size {
                return Some(node);
            }
            node = Self::next(region, node);
            if node == self.head {
                return None;
            }
        }
    }

    /// Number of nodes currently linked, bounded by `limit` to survive a
    /// corrupted ring.
    pub(crate) fn count_nodes<R: RegionProvider>(&self, region: &R, limit: usize) -> usize {
        if self.is_empty() {
            return 0;
        }
        let mut count = 1;
        let mut node = Self::next(region, self.head);
        while node != self.head && count < limit {
            count += 1;
            node = Self::next(region, node);
        }
        count
    }
}
