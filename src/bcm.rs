//! Binary code modulation schedule for the weighted strategy.
//!
//! Every data transfer shows one plane for the same amount of time. To give
//! plane `p` its weight of `2^p` the transfer engine walks a table of
//! `2^bits` entries where entry `i` points at plane
//! `bits - 1 - trailing_zeros(i)`. The most significant plane lands on every
//! odd entry and the least significant plane on exactly one.

use alloc::vec::Vec;

use crate::panel::BitDepth;
use crate::panel::PanelConfig;

/// Plane offsets into the scan buffer in display order.
///
/// Entry 0 is always `None`; the counter used with [`next_index`] never
/// rests on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressTable {
    bits: BitDepth,
    entries: Vec<Option<usize>>,
}

impl AddressTable {
    /// Build the table for a panel at `bits` planes.
    #[must_use]
    pub fn new(panel: &PanelConfig, bits: BitDepth) -> Self {
        let n = u32::from(bits.get());
        let words_per_plane = panel.words_per_plane();
        let mut entries = Vec::with_capacity(1 << n);
        entries.push(None);
        for i in 1usize..(1 << n) {
            let plane = n - 1 - i.trailing_zeros();
            entries.push(Some(plane as usize * words_per_plane));
        }
        Self { bits, entries }
    }

    /// Depth the table was built for.
    #[must_use]
    pub fn bits(&self) -> BitDepth {
        self.bits
    }

    /// Number of entries, `2^bits`.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always `false`; a table has at least the reserved entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<usize> {
        self.entries.get(index).copied().flatten()
    }

    /// All entries.
    #[must_use]
    pub fn entries(&self) -> &[Option<usize>] {
        &self.entries
    }
}

/// Look up the plane offset for `counter` and advance it.
///
/// Returns the next counter and the scan buffer offset to transfer. The
/// counter runs `1..2^bits` and wraps back to 1; a return of 1 therefore marks
/// the end of a full cycle. A counter that is 0 or past the table is treated
/// as 1.
#[must_use]
pub fn next_index(table: &AddressTable, counter: usize) -> (usize, usize) {
    let counter = if counter == 0 || counter >= table.len() {
        1
    } else {
        counter
    };
    let offset = table.get(counter).unwrap_or_default();
    let next = if counter + 1 >= table.len() { 1 } else { counter + 1 };
    (next, offset)
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::vec;
    use std::vec::Vec;

    use super::*;
    use crate::panel::PANEL_64X64;

    fn table(bits: u8) -> AddressTable {
        AddressTable::new(&PANEL_64X64, BitDepth::clamped(i32::from(bits)))
    }

    #[test]
    fn test_table_layout() {
        let t = table(4);
        let wpp = PANEL_64X64.words_per_plane();
        assert_eq!(t.len(), 16);
        assert_eq!(t.get(0), None);
        assert_eq!(t.get(1), Some(3 * wpp));
        assert_eq!(t.get(2), Some(2 * wpp));
        assert_eq!(t.get(4), Some(wpp));
        assert_eq!(t.get(8), Some(0));
        assert_eq!(t.get(12), Some(wpp));
        assert_eq!(t.get(16), None);
        assert!(t.entries()[1..].iter().all(Option::is_some));
    }

    #[test]
    fn test_plane_weights() {
        let wpp = PANEL_64X64.words_per_plane();
        for bits in 4..=8u8 {
            let t = table(bits);
            let mut counts = vec![0usize; usize::from(bits)];
            let mut counter = 1;
            for _ in 0..crate::compute_frame_count(bits) {
                let (next, offset) = next_index(&t, counter);
                counts[offset / wpp] += 1;
                counter = next;
            }
            // back at the start after one full cycle
            assert_eq!(counter, 1);
            for (plane, &count) in counts.iter().enumerate() {
                assert_eq!(count, 1 << plane, "plane {plane} at {bits} bits");
            }
        }
    }

    #[test]
    fn test_next_index_wraps_to_one() {
        let t = table(4);
        assert_eq!(next_index(&t, 14).0, 15);
        assert_eq!(next_index(&t, 15).0, 1);
    }

    #[test]
    fn test_next_index_recovers_from_bad_counter() {
        let t = table(4);
        assert_eq!(next_index(&t, 0), next_index(&t, 1));
        assert_eq!(next_index(&t, 99), next_index(&t, 1));
    }

    #[test]
    fn test_sequence_interleaves_planes() {
        let t = table(4);
        let wpp = PANEL_64X64.words_per_plane();
        let mut counter = 1;
        let planes: Vec<usize> = (0..15)
            .map(|_| {
                let (next, offset) = next_index(&t, counter);
                counter = next;
                offset / wpp
            })
            .collect();
        assert_eq!(planes, [3, 2, 3, 1, 3, 2, 3, 0, 3, 2, 3, 1, 3, 2, 3]);
    }
}
