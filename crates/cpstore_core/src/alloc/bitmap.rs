//! Bitmap allocator with a roving first-fit cursor.

use super::SpaceAllocator;
use crate::error::{CoreError, CoreResult};

const WORD_BITS: u64 = 64;

/// One bit per quantum, 1 = used.
///
/// Allocation tries, in order:
/// 1. first fit from the cursor to the end of the bitmap
/// 2. first fit from the start of the usable region up to the cursor
/// 3. growth by the extension quantum, placing the run at the free tail
///
/// The cursor moves past each new allocation, which keeps placement roughly
/// sequential and bounds the cost of the common scan.
#[derive(Debug, Clone)]
pub struct BitmapAllocator {
    words: Vec<u64>,
    capacity: u64,
    used: u64,
    cursor: u64,
    usable_start: u64,
    extension: u64,
}

impl BitmapAllocator {
    /// Creates an allocator tracking `capacity` quanta.
    ///
    /// The first `reserved` quanta are marked used and never handed out;
    /// `extension` is the number of quanta added when the bitmap is full.
    #[must_use]
    pub fn new(capacity: u64, reserved: u64, extension: u64) -> Self {
        let capacity = capacity.max(reserved);
        let mut allocator = Self {
            words: vec![0; words_for(capacity)],
            capacity,
            used: 0,
            cursor: reserved,
            usable_start: reserved,
            extension: extension.max(1),
        };
        allocator.set_range(0, reserved);
        allocator.used = reserved;
        allocator
    }

    /// Returns whether quantum `position` is allocated.
    #[must_use]
    pub fn is_used(&self, position: u64) -> bool {
        position < self.capacity
            && self.words[(position / WORD_BITS) as usize] & (1 << (position % WORD_BITS)) != 0
    }

    /// Current cursor position.
    #[must_use]
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    fn set_range(&mut self, position: u64, quanta: u64) {
        for bit in position..position + quanta {
            self.words[(bit / WORD_BITS) as usize] |= 1 << (bit % WORD_BITS);
        }
    }

    fn clear_range(&mut self, position: u64, quanta: u64) {
        for bit in position..position + quanta {
            self.words[(bit / WORD_BITS) as usize] &= !(1 << (bit % WORD_BITS));
        }
    }

    fn resize(&mut self, capacity: u64) {
        if capacity > self.capacity {
            self.words.resize(words_for(capacity), 0);
            self.capacity = capacity;
        }
    }

    /// First free run of `quanta` bits starting in `from..start_limit`.
    fn find_run(&self, from: u64, start_limit: u64, quanta: u64) -> Option<u64> {
        let mut pos = from;
        while pos < start_limit && pos + quanta <= self.capacity {
            if pos % WORD_BITS == 0 && self.words[(pos / WORD_BITS) as usize] == u64::MAX {
                pos += WORD_BITS;
                continue;
            }
            if self.is_used(pos) {
                pos += 1;
                continue;
            }
            let mut len = 1;
            while len < quanta && !self.is_used(pos + len) {
                len += 1;
            }
            if len == quanta {
                return Some(pos);
            }
            pos += len + 1;
        }
        None
    }

    /// Length of the free run ending at the current capacity.
    fn free_tail(&self) -> u64 {
        let mut len = 0;
        while len < self.capacity - self.usable_start && !self.is_used(self.capacity - len - 1) {
            len += 1;
        }
        len
    }

    fn take(&mut self, position: u64, quanta: u64) -> u64 {
        self.set_range(position, quanta);
        self.used += quanta;
        self.cursor = position + quanta;
        position
    }
}

impl SpaceAllocator for BitmapAllocator {
    fn allocate(&mut self, quanta: u64) -> u64 {
        let quanta = quanta.max(1);

        if let Some(pos) = self.find_run(self.cursor, self.capacity, quanta) {
            return self.take(pos, quanta);
        }
        if let Some(pos) = self.find_run(self.usable_start, self.cursor, quanta) {
            return self.take(pos, quanta);
        }

        let pos = self.capacity - self.free_tail();
        let shortfall = (pos + quanta).saturating_sub(self.capacity);
        self.grow(shortfall.max(self.extension));
        self.take(pos, quanta)
    }

    fn free(&mut self, position: u64, quanta: u64) -> CoreResult<()> {
        if position < self.usable_start || position + quanta > self.capacity {
            return Err(CoreError::invariant(format!(
                "free of quanta {position}..{} outside usable range {}..{}",
                position + quanta,
                self.usable_start,
                self.capacity
            )));
        }
        if let Some(bit) = (position..position + quanta).find(|&bit| !self.is_used(bit)) {
            return Err(CoreError::invariant(format!(
                "double free: quantum {bit} is not allocated"
            )));
        }
        self.clear_range(position, quanta);
        self.used -= quanta;
        Ok(())
    }

    fn reserve(&mut self, position: u64, quanta: u64) -> CoreResult<()> {
        if position < self.usable_start {
            return Err(CoreError::invariant(format!(
                "quantum {position} lies in the reserved header region"
            )));
        }
        self.resize(position + quanta);
        if let Some(bit) = (position..position + quanta).find(|&bit| self.is_used(bit)) {
            return Err(CoreError::invariant(format!(
                "overlapping allocations at quantum {bit}"
            )));
        }
        self.set_range(position, quanta);
        self.used += quanta;
        Ok(())
    }

    fn grow(&mut self, quanta: u64) {
        self.resize(self.capacity + quanta);
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn used(&self) -> u64 {
        self.used
    }
}

fn words_for(bits: u64) -> usize {
    bits.div_ceil(WORD_BITS) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn allocates_after_reserved_region() {
        let mut a = BitmapAllocator::new(64, 8, 16);
        assert_eq!(a.used(), 8);
        assert_eq!(a.allocate(2), 8);
        assert_eq!(a.allocate(3), 10);
        assert_eq!(a.cursor(), 13);
        assert_eq!(a.used(), 13);
    }

    #[test]
    fn freed_range_is_reused_after_wrap() {
        let mut a = BitmapAllocator::new(16, 0, 16);
        let first = a.allocate(4);
        let _second = a.allocate(12);
        assert_eq!(a.capacity(), 16);

        a.free(first, 4).unwrap();
        assert_eq!(a.allocate(4), first);
        assert_eq!(a.capacity(), 16);
    }

    #[test]
    fn grows_when_full() {
        let mut a = BitmapAllocator::new(8, 0, 32);
        assert_eq!(a.allocate(8), 0);
        assert_eq!(a.allocate(2), 8);
        assert_eq!(a.capacity(), 40);
    }

    #[test]
    fn growth_extends_free_tail() {
        let mut a = BitmapAllocator::new(10, 0, 4);
        a.allocate(8);
        // Two free quanta at the tail plus growth must host the run.
        let pos = a.allocate(5);
        assert_eq!(pos, 8);
        assert_eq!(a.capacity(), 14);
    }

    #[test]
    fn large_request_grows_past_extension() {
        let mut a = BitmapAllocator::new(0, 0, 2);
        assert_eq!(a.allocate(100), 0);
        assert!(a.capacity() >= 100);
    }

    #[test]
    fn double_free_is_fatal() {
        let mut a = BitmapAllocator::new(16, 0, 16);
        let pos = a.allocate(2);
        a.free(pos, 2).unwrap();
        assert!(a.free(pos, 2).unwrap_err().is_fatal());
    }

    #[test]
    fn free_in_header_region_is_fatal() {
        let mut a = BitmapAllocator::new(16, 8, 16);
        assert!(a.free(0, 1).unwrap_err().is_fatal());
    }

    #[test]
    fn reserve_detects_overlap() {
        let mut a = BitmapAllocator::new(0, 8, 16);
        a.reserve(10, 4).unwrap();
        assert!(a.capacity() >= 14);
        assert!(a.reserve(12, 4).unwrap_err().is_fatal());
        assert!(a.reserve(4, 1).is_err());
        a.reserve(14, 2).unwrap();
        assert_eq!(a.used(), 8 + 6);
    }

    #[test]
    fn skips_full_words() {
        let mut a = BitmapAllocator::new(256, 0, 64);
        a.reserve(0, 128).unwrap();
        a.reserve(130, 126).unwrap();
        let pos = a.allocate(2);
        assert_eq!(pos, 128);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Alloc(u64),
        Free(usize),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1u64..12).prop_map(Op::Alloc),
            any::<usize>().prop_map(Op::Free),
        ]
    }

    proptest! {
        #[test]
        fn live_allocations_never_overlap(ops in prop::collection::vec(op_strategy(), 1..200)) {
            let mut a = BitmapAllocator::new(32, 4, 16);
            let mut live: Vec<(u64, u64)> = Vec::new();

            for op in ops {
                match op {
                    Op::Alloc(n) => {
                        let pos = a.allocate(n);
                        prop_assert!(pos >= 4);
                        prop_assert!(pos + n <= a.capacity());
                        for &(p, m) in &live {
                            prop_assert!(pos + n <= p || p + m <= pos, "overlap {pos}+{n} with {p}+{m}");
                        }
                        live.push((pos, n));
                    }
                    Op::Free(i) if !live.is_empty() => {
                        let (p, m) = live.swap_remove(i % live.len());
                        a.free(p, m).unwrap();
                    }
                    Op::Free(_) => {}
                }
            }

            let live_quanta: u64 = live.iter().map(|&(_, m)| m).sum();
            prop_assert_eq!(a.used(), live_quanta + 4);
        }

        #[test]
        fn freed_run_satisfies_same_request(n in 1u64..16) {
            let mut a = BitmapAllocator::new(64, 0, 64);
            let pos = a.allocate(n);
            let _rest = a.allocate(64 - n);
            let capacity = a.capacity();

            a.free(pos, n).unwrap();
            prop_assert_eq!(a.allocate(n), pos);
            prop_assert_eq!(a.capacity(), capacity);
        }
    }
}
