// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A fixed-size bitset keyed by bytecode offset.

use alloc::vec;
use alloc::vec::Vec;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct BitSet {
    bits: Vec<u64>,
    len: usize,
}

impl BitSet {
    #[must_use]
    pub(crate) fn new_empty(len: usize) -> Self {
        Self {
            bits: vec![0; len.div_ceil(64)],
            len,
        }
    }

    #[must_use]
    pub(crate) fn get(&self, idx: usize) -> bool {
        if idx >= self.len {
            return false;
        }
        (self.bits[idx / 64] >> (idx % 64)) & 1 == 1
    }

    /// Sets `idx`, returning `true` if it was previously clear. Out-of-range indices are ignored.
    pub(crate) fn insert(&mut self, idx: usize) -> bool {
        if idx >= self.len {
            return false;
        }
        let mask = 1_u64 << (idx % 64);
        let word = &mut self.bits[idx / 64];
        let fresh = *word & mask == 0;
        *word |= mask;
        fresh
    }

    pub(crate) fn clear_all(&mut self) {
        self.bits.fill(0);
    }

    /// Iterates over set indices in increasing order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter().enumerate().flat_map(|(w, &word)| {
            let mut rest = word;
            core::iter::from_fn(move || {
                if rest == 0 {
                    return None;
                }
                let b = rest.trailing_zeros() as usize;
                rest &= rest - 1;
                Some(w * 64 + b)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::BitSet;
    use alloc::vec::Vec;

    #[test]
    fn insert_reports_first_set() {
        let mut s = BitSet::new_empty(130);
        assert!(s.insert(129));
        assert!(!s.insert(129));
        assert!(!s.insert(130));
        assert!(s.get(129));
        assert!(!s.get(128));
    }

    #[test]
    fn iter_yields_sorted_indices() {
        let mut s = BitSet::new_empty(200);
        for i in [150, 3, 64, 63] {
            s.insert(i);
        }
        assert_eq!(s.iter().collect::<Vec<_>>(), [3, 63, 64, 150]);
        s.clear_all();
        assert_eq!(s.iter().count(), 0);
    }
}
