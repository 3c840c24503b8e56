//! Insert path: descent, chain extension, range insert and wildcard fill.
//!
//! An insert descends the trie consuming table strides until the remaining
//! key fits inside the current table. Hitting a `FAIL` or `DATA` entry with
//! key bits still owed means the chain must be extended: the whole run of
//! missing tables is built against unlinked blocks first and spliced into
//! the existing parent with a single entry rewrite, so an allocation
//! failure frees the half-built run and leaves the trie untouched.
//!
//! Once the remaining key fits, every logical slot the key's range spans is
//! visited: `FAIL` and strictly-shorter `DATA` occupants are replaced,
//! equal-or-longer occupants are left alone, and child tables are filled
//! recursively (the wildcard broadcast). If the pass changes nothing the
//! freshly allocated data entry is discarded and the caller gets
//! `EntryExists` or `RedundantEntry`; if it fails after committing copies,
//! a compensating slot-targeted delete restores the previous cover.

use bank::Bank;
use iptd::{DataIndex, IptdEntry, TableIndex};

use crate::table::{extract_bits, PathStep, TableRef};
use crate::{CrtError, CrtTable};

/// Bookkeeping for one in-flight insert.
pub(crate) struct InsertOp {
    pub slot: DataIndex,
    /// Net new references committed to `slot`. 0 after a full pass means
    /// the trie did not change.
    pub refs_added: u32,
    /// Saw an occupant with the same key length (the identical key).
    pub saw_equal: bool,
}

impl<B: Bank> CrtTable<B> {
    /// Inserts `data` under the leading `key_bits` bits of `key`.
    ///
    /// Returns the data slot now holding the payload. Keys shorter than the
    /// configured width act as wildcards covering every key that shares the
    /// prefix, unless a more specific entry overrides them.
    ///
    /// # Errors
    ///
    /// [`CrtError::EntryExists`] if the identical key is present (stored
    /// data is not updated), [`CrtError::RedundantEntry`] if strictly longer
    /// entries already shadow the whole range, [`CrtError::OutOfMemory`]
    /// when a table block or data slot cannot be allocated (the trie is
    /// unchanged), plus the fatal kinds.
    pub fn insert(&mut self, key: &[u8], key_bits: u32, data: &[u8]) -> Result<DataIndex, CrtError> {
        self.check_key(key, key_bits)?;
        if data.len() != self.cfg.kdata_bytes() {
            return Err(CrtError::BadDataLength {
                expected: self.cfg.kdata_bytes(),
                got: data.len(),
            });
        }

        let created_root = self.empty;
        if created_root {
            self.init_root()?;
        }

        let slot = match self.data.alloc() {
            Ok(s) => s,
            Err(e) => {
                if created_root {
                    self.empty = true;
                }
                return Err(e.into());
            }
        };
        self.write_data_record(slot, data)?;

        let mut op = InsertOp {
            slot,
            refs_added: 0,
            saw_equal: false,
        };
        match self.insert_walk(&mut op, key, key_bits) {
            Ok(()) if op.refs_added > 0 => Ok(slot),
            Ok(()) => {
                // Nothing changed; discard the provisional data entry.
                self.data.free(slot)?;
                if created_root {
                    self.empty = true;
                }
                Err(if op.saw_equal {
                    CrtError::EntryExists
                } else {
                    CrtError::RedundantEntry
                })
            }
            Err(e) => {
                if matches!(e, CrtError::OutOfMemory | CrtError::ChainTooLong(_)) {
                    self.unwind_insert(&op, key, key_bits, created_root);
                }
                Err(e)
            }
        }
    }

    /// Converts a failed insert back to "never attempted".
    ///
    /// With no committed references only the data entry needs discarding;
    /// with committed references a compensating delete targeted at the new
    /// slot removes exactly the copies the broadcast managed to write (the
    /// replacement search re-finds the cover they displaced, and collapsing
    /// reclaims any chain tables that served only this key).
    fn unwind_insert(&mut self, op: &InsertOp, key: &[u8], key_bits: u32, created_root: bool) {
        if matches!(self.data.ref_count(op.slot), Ok(n) if n > 0) {
            let _ = self.delete_matching(key, key_bits, Some(op.slot));
        }
        // The compensating delete frees the slot when the count drains;
        // otherwise it is still ours to release.
        if self.data.ref_count(op.slot).is_ok() {
            let _ = self.data.free(op.slot);
        }
        if created_root {
            self.empty = true;
        }
    }

    /// Descends from the root and dispatches to range insert or chain
    /// extension.
    fn insert_walk(&mut self, op: &mut InsertOp, key: &[u8], key_bits: u32) -> Result<(), CrtError> {
        let mut path: Vec<PathStep> = Vec::new();
        let mut cur = self.root_ref();
        loop {
            let remaining = key_bits - cur.bit_offset;
            if remaining <= cur.bits as u32 {
                return self.insert_range(op, &mut path, &mut cur, key, key_bits);
            }
            let idx = extract_bits(key, cur.bit_offset, cur.bits);
            let entry = self.read_entry(&cur, idx)?;
            match entry {
                IptdEntry::Fail | IptdEntry::Data { .. } => {
                    return self.extend_chain(op, &mut path, &mut cur, idx, entry, key, key_bits);
                }
                IptdEntry::Simple { .. } | IptdEntry::RunDelta { .. } => {
                    let child = self.child_ref(entry, cur.bit_offset + cur.bits as u32)?;
                    path.push(PathStep { table: cur, index: idx });
                    if path.len() + 1 > self.cfg.max_iptd_levels as usize {
                        return Err(CrtError::ChainTooLong(self.cfg.max_iptd_levels));
                    }
                    cur = child;
                }
            }
        }
    }

    /// Builds the run of missing tables below `cur[idx]` and splices it in.
    ///
    /// Every new table is broadcast-filled with the entry it displaces (so
    /// a displaced wildcard keeps covering everything it covered), the
    /// innermost table carries the new key's range, and only after all
    /// blocks are fully written is the parent entry rewritten. Allocation
    /// failure on the way frees the partial run; the trie never saw it.
    fn extend_chain(
        &mut self,
        op: &mut InsertOp,
        path: &mut Vec<PathStep>,
        cur: &mut TableRef,
        idx: u32,
        replaced: IptdEntry,
        key: &[u8],
        key_bits: u32,
    ) -> Result<(), CrtError> {
        // Plan the chain: strides and offsets, blocks allocated up front.
        let mut bases = Vec::new();
        let mut specs: Vec<(u8, u32)> = Vec::new();
        let mut off = cur.bit_offset + cur.bits as u32;
        let mut depth = path.len() + 1;
        loop {
            let rem = key_bits - off;
            let bits = self.cfg.child_bits(rem);
            depth += 1;
            if depth > self.cfg.max_iptd_levels as usize {
                self.release_blocks(&bases);
                return Err(CrtError::ChainTooLong(self.cfg.max_iptd_levels));
            }
            match self.blocks.alloc() {
                Ok(b) => bases.push(b),
                Err(e) => {
                    self.release_blocks(&bases);
                    return Err(e.into());
                }
            }
            specs.push((bits, off));
            if rem <= bits as u32 {
                break;
            }
            off += bits as u32;
        }

        // Write the run innermost-first so every link target is complete
        // before anything points at it.
        let new_data = IptdEntry::Data {
            slot: op.slot,
            key_bits: key_bits as u16,
        };
        let mut span = 0u32;
        let mut link: Option<IptdEntry> = None;
        for (i, &(bits, off)) in specs.iter().enumerate().rev() {
            let len = 1usize << bits;
            let mut tbl = vec![replaced; len];
            if i == specs.len() - 1 {
                let rem = key_bits - off;
                let lo = extract_bits(key, off, rem as u8) << (bits as u32 - rem);
                span = 1u32 << (bits as u32 - rem);
                for cell in tbl.iter_mut().skip(lo as usize).take(span as usize) {
                    *cell = new_data;
                }
            } else {
                let j = extract_bits(key, off, bits);
                tbl[j as usize] = link.expect("inner table already written");
            }
            let t = self.write_new_table(bases[i], bits, off, &tbl)?;
            link = Some(t.link_entry());
        }

        // All records are in place; commit the reference accounting.
        self.data.ref_inc(op.slot, span)?;
        op.refs_added += span;
        if let IptdEntry::Data { slot, .. } = replaced {
            // Broadcast copies across the run, minus the slots taken by
            // links and by the new key's range, minus the displaced parent
            // entry itself.
            let mut copies: i64 = -1;
            for (i, &(bits, _)) in specs.iter().enumerate() {
                copies += 1i64 << bits;
                copies -= if i == specs.len() - 1 { span as i64 } else { 1 };
            }
            if copies >= 0 {
                self.data.ref_inc(slot, copies as u32)?;
            } else {
                self.data.ref_dec(slot, (-copies) as u32)?;
            }
        }

        // Single-entry splice into the live parent.
        let first = link.expect("chain is non-empty");
        if let Some(up) = self.modify_entry(cur, idx, first)? {
            self.patch_links(path, up)?;
        }
        Ok(())
    }

    fn release_blocks(&mut self, bases: &[TableIndex]) {
        for b in bases {
            let _ = self.blocks.free(*b);
        }
    }

    /// Inserts into the range the key's remaining bits span inside `cur`.
    ///
    /// The table is materialized once, every covered slot is visited, and
    /// the image is stored back (with one upward link patch) even when a
    /// slot visit fails, so partially filled children are never left
    /// referenced by stale compression metadata.
    fn insert_range(
        &mut self,
        op: &mut InsertOp,
        path: &mut Vec<PathStep>,
        cur: &mut TableRef,
        key: &[u8],
        key_bits: u32,
    ) -> Result<(), CrtError> {
        let remaining = key_bits - cur.bit_offset;
        let lo = extract_bits(key, cur.bit_offset, remaining as u8) << (cur.bits as u32 - remaining);
        let span = 1u32 << (cur.bits as u32 - remaining);
        let new_data = IptdEntry::Data {
            slot: op.slot,
            key_bits: key_bits as u16,
        };

        let mut tbl = self.load_table(cur)?;
        let mut res = Ok(());
        let child_off = cur.bit_offset + cur.bits as u32;
        let depth = path.len() + 1;
        for cell in tbl.iter_mut().skip(lo as usize).take(span as usize) {
            if let Err(e) = self.insert_cell(cell, new_data, child_off, depth, op) {
                res = Err(e);
                break;
            }
        }
        if let Some(up) = self.store_table(cur, &tbl)? {
            self.patch_links(path, up)?;
        }
        res
    }

    /// Applies the new data entry to one logical slot of a materialized
    /// (engine-independent) table image.
    fn insert_cell(
        &mut self,
        cell: &mut IptdEntry,
        new_data: IptdEntry,
        child_off: u32,
        depth: usize,
        op: &mut InsertOp,
    ) -> Result<(), CrtError> {
        let IptdEntry::Data {
            slot: new_slot,
            key_bits: new_bits,
        } = new_data
        else {
            return Err(CrtError::TableCorrupted("broadcast entry must be DATA"));
        };
        match *cell {
            IptdEntry::Fail => {
                *cell = new_data;
                self.data.ref_inc(new_slot, 1)?;
                op.refs_added += 1;
            }
            IptdEntry::Data { slot, key_bits } => {
                if key_bits < new_bits {
                    // Strictly shorter cover: the new entry is more
                    // specific here. The old wildcard keeps its copies
                    // outside this range.
                    self.data.ref_dec(slot, 1)?;
                    *cell = new_data;
                    self.data.ref_inc(new_slot, 1)?;
                    op.refs_added += 1;
                } else if key_bits == new_bits {
                    // Same position, same length: the identical key.
                    op.saw_equal = true;
                }
                // Longer occupant: more specific entry wins, leave it.
            }
            IptdEntry::Simple { .. } | IptdEntry::RunDelta { .. } => {
                self.fill_table(cell, new_data, child_off, depth + 1, op)?;
            }
        }
        Ok(())
    }

    /// Broadcasts the new data entry into every eligible leaf of a child
    /// table (and its descendants).
    fn fill_table(
        &mut self,
        cell: &mut IptdEntry,
        new_data: IptdEntry,
        table_off: u32,
        depth: usize,
        op: &mut InsertOp,
    ) -> Result<(), CrtError> {
        if depth > self.cfg.max_iptd_levels as usize {
            return Err(CrtError::ChainTooLong(self.cfg.max_iptd_levels));
        }
        let mut t = self.child_ref(*cell, table_off)?;
        let mut tbl = self.load_table(&t)?;
        let child_off = table_off + t.bits as u32;

        let mut res = Ok(());
        for sub in tbl.iter_mut() {
            if let Err(e) = self.insert_cell(sub, new_data, child_off, depth, op) {
                res = Err(e);
                break;
            }
        }
        // Store what happened regardless, then hand the (possibly updated)
        // link entry back to the caller's materialized image.
        self.store_table(&mut t, &tbl)?;
        *cell = t.link_entry();
        res
    }
}
