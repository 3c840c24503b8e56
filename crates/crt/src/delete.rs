//! Delete path: trace descent, range delete, redundancy collapsing.
//!
//! Deletion records its descent on an explicit trace (the path of
//! `(table, index)` steps) because the walk must come back up afterwards:
//! removing a key can leave ancestor tables holding nothing but `FAIL` or
//! nothing but copies of one wildcard, and such tables are collapsed into
//! the single parent entry that reached them, from the deepest ancestor
//! outward until the first table that still earns its keep.
//!
//! The vacated range is not simply cleared: the next-best cover — the
//! longest strictly-shorter prefix match, found by the replacement search —
//! is written over every slot the deleted key occupied, so lookups fall
//! back exactly as if the deleted key had never been inserted.

use bank::Bank;
use iptd::{DataIndex, IptdEntry};

use crate::table::{extract_bits, PathStep, TableRef};
use crate::{CrtError, CrtTable};

impl<B: Bank> CrtTable<B> {
    /// Deletes the entry matching exactly `key_bits` bits of `key`.
    ///
    /// # Errors
    ///
    /// [`CrtError::EntryNotExist`] if no entry has this exact key and
    /// length; the trie is untouched. Fatal kinds as per [`CrtError`].
    pub fn delete(&mut self, key: &[u8], key_bits: u32) -> Result<(), CrtError> {
        self.check_key(key, key_bits)?;
        self.delete_matching(key, key_bits, None)
    }

    /// Delete with an optional required data slot.
    ///
    /// The slot filter makes the compensating unwind in the insert path
    /// precise: it removes only copies of the half-inserted entry, never a
    /// pre-existing entry that happens to share the key position.
    pub(crate) fn delete_matching(
        &mut self,
        key: &[u8],
        key_bits: u32,
        want: Option<DataIndex>,
    ) -> Result<(), CrtError> {
        if self.empty {
            return Err(CrtError::EntryNotExist);
        }

        // Descent, recording the trace for the collapse walk back up.
        let mut path: Vec<PathStep> = Vec::new();
        let mut cur = self.root_ref();
        loop {
            let remaining = key_bits - cur.bit_offset;
            if remaining <= cur.bits as u32 {
                break;
            }
            let idx = extract_bits(key, cur.bit_offset, cur.bits);
            match self.read_entry(&cur, idx)? {
                // The key is longer than anything stored through this slot.
                IptdEntry::Fail | IptdEntry::Data { .. } => {
                    return Err(CrtError::EntryNotExist)
                }
                entry @ (IptdEntry::Simple { .. } | IptdEntry::RunDelta { .. }) => {
                    let child = self.child_ref(entry, cur.bit_offset + cur.bits as u32)?;
                    path.push(PathStep { table: cur, index: idx });
                    if path.len() + 1 > self.cfg.max_iptd_levels as usize {
                        return Err(CrtError::ChainTooLong(self.cfg.max_iptd_levels));
                    }
                    cur = child;
                }
            }
        }

        let remaining = key_bits - cur.bit_offset;
        let lo = extract_bits(key, cur.bit_offset, remaining as u8) << (cur.bits as u32 - remaining);
        let span = 1u32 << (cur.bits as u32 - remaining);
        let depth = path.len() + 1;

        let target = match self.find_target(&cur, lo, lo + span, key_bits, want, depth)? {
            Some(t) => t,
            None => return Err(CrtError::EntryNotExist),
        };

        let replacement = match self.find_replacement(&cur, &path, key, key_bits, lo, lo + span)? {
            Some((slot, len)) => IptdEntry::Data {
                slot,
                key_bits: len,
            },
            None => IptdEntry::Fail,
        };

        // Range delete over the materialized final table. As in the insert
        // path, the image is stored back even if a slot visit fails, so the
        // bank never holds stale compression metadata.
        let mut tbl = self.load_table(&cur)?;
        let mut res = Ok(());
        let child_off = cur.bit_offset + cur.bits as u32;
        for cell in tbl.iter_mut().skip(lo as usize).take(span as usize) {
            if let Err(e) = self.delete_cell(cell, target, key_bits, replacement, child_off, depth)
            {
                res = Err(e);
                break;
            }
        }
        if let Some(up) = self.store_table(&mut cur, &tbl)? {
            self.patch_links(&mut path, up)?;
        }
        res?;

        if self.data.ref_count(target)? == 0 {
            self.data.free(target)?;
        }

        self.collapse_up(&mut path, cur)
    }

    /// Locates the data slot of the entry being deleted: any `DATA` leaf in
    /// the range with the exact key length (and slot, when filtered).
    fn find_target(
        &self,
        t: &TableRef,
        lo: u32,
        hi: u32,
        key_bits: u32,
        want: Option<DataIndex>,
        depth: usize,
    ) -> Result<Option<DataIndex>, CrtError> {
        if depth > self.cfg.max_iptd_levels as usize {
            return Err(CrtError::ChainTooLong(self.cfg.max_iptd_levels));
        }
        for i in lo..hi {
            match self.read_entry(t, i)? {
                IptdEntry::Data { slot, key_bits: kb }
                    if kb as u32 == key_bits && want.map_or(true, |w| w == slot) =>
                {
                    return Ok(Some(slot));
                }
                entry @ (IptdEntry::Simple { .. } | IptdEntry::RunDelta { .. }) => {
                    let child = self.child_ref(entry, t.bit_offset + t.bits as u32)?;
                    if let Some(found) =
                        self.find_target(&child, 0, child.len(), key_bits, want, depth + 1)?
                    {
                        return Ok(Some(found));
                    }
                }
                _ => {}
            }
        }
        Ok(None)
    }

    /// Removes the target from one logical slot, substituting the
    /// replacement cover and collapsing child tables that stop carrying
    /// information.
    fn delete_cell(
        &mut self,
        cell: &mut IptdEntry,
        target: DataIndex,
        key_bits: u32,
        replacement: IptdEntry,
        child_off: u32,
        depth: usize,
    ) -> Result<(), CrtError> {
        match *cell {
            IptdEntry::Data { slot, key_bits: kb } if slot == target && kb as u32 == key_bits => {
                self.data.ref_dec(target, 1)?;
                if let IptdEntry::Data { slot: rs, .. } = replacement {
                    self.data.ref_inc(rs, 1)?;
                }
                *cell = replacement;
            }
            IptdEntry::Fail | IptdEntry::Data { .. } => {}
            IptdEntry::Simple { .. } | IptdEntry::RunDelta { .. } => {
                if depth + 1 > self.cfg.max_iptd_levels as usize {
                    return Err(CrtError::ChainTooLong(self.cfg.max_iptd_levels));
                }
                let mut t = self.child_ref(*cell, child_off)?;
                let mut tbl = self.load_table(&t)?;
                let mut res = Ok(());
                for sub in tbl.iter_mut() {
                    if let Err(e) = self.delete_cell(
                        sub,
                        target,
                        key_bits,
                        replacement,
                        child_off + t.bits as u32,
                        depth + 1,
                    ) {
                        res = Err(e);
                        break;
                    }
                }
                if res.is_ok() {
                    if let Some(rep) = iptd::redundant(&tbl, t.bit_offset) {
                        // The child now carries a single message; fold it
                        // into the parent slot. Of its 2^bits logical
                        // copies only the parent's one survives.
                        if let IptdEntry::Data { slot, .. } = rep {
                            self.data.ref_dec(slot, t.len() - 1)?;
                        }
                        self.blocks.free(t.base)?;
                        *cell = rep;
                        return Ok(());
                    }
                }
                self.store_table(&mut t, &tbl)?;
                *cell = t.link_entry();
                res?;
            }
        }
        Ok(())
    }

    /// Walks the trace from the deepest table outward, collapsing each
    /// now-redundant table into its parent entry, stopping at the first
    /// table that is not redundant. Once the root is reached, a fully
    /// drained trie is flagged empty.
    fn collapse_up(&mut self, path: &mut Vec<PathStep>, mut child: TableRef) -> Result<(), CrtError> {
        loop {
            let tbl = self.load_table(&child)?;
            if child.bit_offset == 0 {
                // Root table: never collapsed, but a blank root means the
                // trie has drained.
                if tbl.iter().all(IptdEntry::is_fail) {
                    self.empty = true;
                }
                return Ok(());
            }
            match iptd::redundant(&tbl, child.bit_offset) {
                Some(rep) => {
                    if let IptdEntry::Data { slot, .. } = rep {
                        self.data.ref_dec(slot, child.len() - 1)?;
                    }
                    self.blocks.free(child.base)?;
                    let mut step = path.pop().ok_or(CrtError::TableCorrupted(
                        "non-root table without a parent step",
                    ))?;
                    if let Some(up) = self.modify_entry(&mut step.table, step.index, rep)? {
                        self.patch_links(path, up)?;
                    }
                    child = step.table;
                }
                None => return Ok(()),
            }
        }
    }
}
