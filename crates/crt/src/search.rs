//! Wildcard replacement search.
//!
//! When a key is deleted, the region it vacates must revert to whatever the
//! trie would have answered had the key never existed: the `DATA` entry
//! with the longest key length strictly below the deleted one whose prefix
//! the deleted key shares — or `FAIL` when no such cover exists.
//!
//! The search walks dyadic shells outward from the vacated range. The shell
//! for prefix length `L` is the set of slots agreeing with the key on `L`
//! bits minus those agreeing on `L + 1`; a surviving copy of the best cover
//! must show up in the innermost shell that contains any `DATA` leaf whose
//! length does not exceed `L` (shorter covers are shadowed by the best one
//! and longer occupants of the shell diverge from the key past `L`, so the
//! first such leaf found is the best cover). Shells inside the deletion's
//! final table are scanned first, then each trace ancestor's shells in
//! turn, depth-first through child tables, all bounded by the level
//! ceiling.

use bank::Bank;
use iptd::{DataIndex, IptdEntry};

use crate::table::{extract_bits, PathStep, TableRef};
use crate::{CrtError, CrtTable};

/// Slot range of `t` whose occupants agree with `key` on its first `l`
/// bits. `l` must satisfy `t.bit_offset <= l <= t.bit_offset + t.bits`.
fn region(t: &TableRef, key: &[u8], l: u32) -> (u32, u32) {
    let take = l - t.bit_offset;
    let width = 1u32 << (t.bits as u32 - take);
    let lo = extract_bits(key, t.bit_offset, take as u8) << (t.bits as u32 - take);
    (lo, lo + width)
}

impl<B: Bank> CrtTable<B> {
    /// Finds the substitute cover for a deletion of `key`/`key_bits` whose
    /// final table is `final_t` with trace `path`, excluding the vacated
    /// range `[ex_lo, ex_hi)` itself.
    pub(crate) fn find_replacement(
        &self,
        final_t: &TableRef,
        path: &[PathStep],
        key: &[u8],
        key_bits: u32,
        ex_lo: u32,
        ex_hi: u32,
    ) -> Result<Option<(DataIndex, u16)>, CrtError> {
        // Shells inside the final table, innermost first.
        let depth = path.len() + 1;
        let (mut ex_lo, mut ex_hi) = (ex_lo, ex_hi);
        for l in (final_t.bit_offset..key_bits).rev() {
            let (lo, hi) = region(final_t, key, l);
            if let Some(found) = self.scan_shell(final_t, lo, hi, ex_lo, ex_hi, l, depth)? {
                return Ok(Some(found));
            }
            (ex_lo, ex_hi) = (lo, hi);
        }

        // Ancestor tables, deepest first; the slot already searched below
        // is the single index the descent took.
        let mut depth = depth;
        for step in path.iter().rev() {
            depth -= 1;
            let t = &step.table;
            let (mut ex_lo, mut ex_hi) = (step.index, step.index + 1);
            for l in (t.bit_offset..t.bit_offset + t.bits as u32).rev() {
                let (lo, hi) = region(t, key, l);
                if let Some(found) = self.scan_shell(t, lo, hi, ex_lo, ex_hi, l, depth)? {
                    return Ok(Some(found));
                }
                (ex_lo, ex_hi) = (lo, hi);
            }
        }
        Ok(None)
    }

    /// Scans `[lo, ex_lo)` and `[ex_hi, hi)` of `t` for the longest `DATA`
    /// leaf not exceeding `cap` bits, descending into child tables.
    fn scan_shell(
        &self,
        t: &TableRef,
        lo: u32,
        hi: u32,
        ex_lo: u32,
        ex_hi: u32,
        cap: u32,
        depth: usize,
    ) -> Result<Option<(DataIndex, u16)>, CrtError> {
        let mut best: Option<(DataIndex, u16)> = None;
        for i in (lo..ex_lo).chain(ex_hi..hi) {
            let entry = self.read_entry(t, i)?;
            self.scan_cell(entry, t.bit_offset + t.bits as u32, cap, depth, &mut best)?;
        }
        Ok(best)
    }

    fn scan_cell(
        &self,
        entry: IptdEntry,
        child_off: u32,
        cap: u32,
        depth: usize,
        best: &mut Option<(DataIndex, u16)>,
    ) -> Result<(), CrtError> {
        match entry {
            IptdEntry::Data { slot, key_bits } if (key_bits as u32) <= cap => {
                if best.map_or(true, |(_, b)| key_bits > b) {
                    *best = Some((slot, key_bits));
                }
            }
            IptdEntry::Simple { .. } | IptdEntry::RunDelta { .. } => {
                if depth + 1 > self.cfg.max_iptd_levels as usize {
                    return Err(CrtError::ChainTooLong(self.cfg.max_iptd_levels));
                }
                let child = self.child_ref(entry, child_off)?;
                for i in 0..child.len() {
                    let sub = self.read_entry(&child, i)?;
                    self.scan_cell(sub, child_off + child.bits as u32, cap, depth + 1, best)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}
