//! Node-table access primitives.
//!
//! Everything above this module manipulates node tables as materialized
//! `Vec<IptdEntry>` images; this module owns the mapping between those
//! images and the bank records behind them, including rundelta
//! recompression and the upward propagation of entropy changes.
//!
//! An entropy change cannot stay local: the code lives in the parent's
//! `RUNDELTA` entry, so rewriting it may change the parent's own stored
//! image, and so on toward the root. [`CrtTable::patch_links`] walks a path
//! of `(table, index)` steps applying exactly that ripple; it terminates at
//! the latest at the root, which is stored uncompressed at a fixed base.

use bank::Bank;
use iptd::{rundelta, IptdEntry, TableIndex};

use crate::{CrtError, CrtTable};

/// A node table as the walk sees it: where it lives, how wide it is, how it
/// is stored, and how many key bits were consumed to reach it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TableRef {
    pub base: TableIndex,
    /// Key bits this table consumes; logical size is `2^bits`.
    pub bits: u8,
    /// `Some(code)` when stored rundelta-compressed.
    pub entropy: Option<u32>,
    /// Key bits consumed before indexing into this table.
    pub bit_offset: u32,
}

impl TableRef {
    /// Logical entry count.
    pub fn len(&self) -> u32 {
        1u32 << self.bits
    }

    /// The entry a parent table holds to reach this table.
    pub fn link_entry(&self) -> IptdEntry {
        match self.entropy {
            None => IptdEntry::Simple {
                base: self.base,
                bits: self.bits,
            },
            Some(entropy) => IptdEntry::RunDelta {
                base: self.base,
                bits: self.bits,
                entropy,
            },
        }
    }
}

/// One step of a root-to-leaf walk: the table and the logical index taken.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PathStep {
    pub table: TableRef,
    pub index: u32,
}

/// Extracts `count` bits (MSB-first) starting at bit `offset` of `key`.
pub(crate) fn extract_bits(key: &[u8], offset: u32, count: u8) -> u32 {
    debug_assert!(count <= 16);
    let mut v = 0u32;
    for i in 0..count as u32 {
        let bit = offset + i;
        let byte = key[(bit / 8) as usize];
        v = (v << 1) | ((byte >> (7 - bit % 8)) as u32 & 1);
    }
    v
}

impl<B: Bank> CrtTable<B> {
    /// Reference to the root table. Valid only while the trie is non-empty.
    pub(crate) fn root_ref(&self) -> TableRef {
        TableRef {
            base: TableIndex::ROOT,
            bits: self.cfg.root_bits(),
            entropy: None,
            bit_offset: 0,
        }
    }

    /// Turns a `SIMPLE`/`RUNDELTA` entry into a child-table reference.
    pub(crate) fn child_ref(
        &self,
        entry: IptdEntry,
        bit_offset: u32,
    ) -> Result<TableRef, CrtError> {
        match entry {
            IptdEntry::Simple { base, bits } => Ok(TableRef {
                base,
                bits,
                entropy: None,
                bit_offset,
            }),
            IptdEntry::RunDelta {
                base,
                bits,
                entropy,
            } => Ok(TableRef {
                base,
                bits,
                entropy: Some(entropy),
                bit_offset,
            }),
            _ => Err(CrtError::TableCorrupted("expected a child-table entry")),
        }
    }

    /// Reads one logical entry without materializing the table.
    pub(crate) fn read_entry(&self, t: &TableRef, logical: u32) -> Result<IptdEntry, CrtError> {
        let phys = match t.entropy {
            None => logical,
            Some(entropy) => rundelta::physical_index(t.bits, entropy, logical)?,
        };
        Ok(IptdEntry::decode(&self.bank.read_record(t.base.get() + phys)?)?)
    }

    /// Materializes the full logical table.
    pub(crate) fn load_table(&self, t: &TableRef) -> Result<Vec<IptdEntry>, CrtError> {
        match t.entropy {
            None => {
                let mut out = Vec::with_capacity(t.len() as usize);
                for i in 0..t.len() {
                    out.push(IptdEntry::decode(&self.bank.read_record(t.base.get() + i)?)?);
                }
                Ok(out)
            }
            Some(entropy) => {
                let plen = rundelta::physical_len(t.bits, entropy)?;
                let mut phys = Vec::with_capacity(plen as usize);
                for i in 0..plen {
                    phys.push(IptdEntry::decode(&self.bank.read_record(t.base.get() + i)?)?);
                }
                let mut out = Vec::with_capacity(t.len() as usize);
                rundelta::decompress(t.bits, entropy, &phys, &mut out)?;
                Ok(out)
            }
        }
    }

    /// Writes a materialized image back over the table's block,
    /// recompressing when the table is stored compressed.
    ///
    /// Returns the table's updated link entry when its stored representation
    /// changed — the caller owns patching it into the parent.
    pub(crate) fn store_table(
        &mut self,
        t: &mut TableRef,
        entries: &[IptdEntry],
    ) -> Result<Option<IptdEntry>, CrtError> {
        debug_assert_eq!(entries.len(), t.len() as usize);
        match t.entropy {
            None => {
                for (i, e) in entries.iter().enumerate() {
                    self.bank.write_record(t.base.get() + i as u32, e.encode())?;
                }
                Ok(None)
            }
            Some(old) => {
                let mut phys = Vec::with_capacity(entries.len());
                let entropy = rundelta::compress(entries, &mut phys)?;
                for (i, e) in phys.iter().enumerate() {
                    self.bank.write_record(t.base.get() + i as u32, e.encode())?;
                }
                if entropy != old {
                    t.entropy = Some(entropy);
                    Ok(Some(t.link_entry()))
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Rewrites one logical entry, recompressing compressed tables.
    ///
    /// Same contract as [`store_table`](Self::store_table) for the return
    /// value.
    pub(crate) fn modify_entry(
        &mut self,
        t: &mut TableRef,
        logical: u32,
        new: IptdEntry,
    ) -> Result<Option<IptdEntry>, CrtError> {
        match t.entropy {
            None => {
                self.bank
                    .write_record(t.base.get() + logical, new.encode())?;
                Ok(None)
            }
            Some(_) => {
                let mut tbl = self.load_table(t)?;
                tbl[logical as usize] = new;
                self.store_table(t, &tbl)
            }
        }
    }

    /// Patches a changed child link into its parent, then keeps patching
    /// upward while ancestors' stored representations keep changing.
    ///
    /// `path` must be the chain of ancestors of the table whose link
    /// changed, shallowest first; steps are updated in place so callers see
    /// fresh entropy values afterwards.
    pub(crate) fn patch_links(
        &mut self,
        path: &mut [PathStep],
        mut link: IptdEntry,
    ) -> Result<(), CrtError> {
        for step in path.iter_mut().rev() {
            match self.modify_entry(&mut step.table, step.index, link)? {
                Some(up) => link = up,
                None => return Ok(()),
            }
        }
        Ok(())
    }

    /// Writes a brand-new table image to an unlinked block, compressing when
    /// enabled and the stride is wide enough for an entropy code.
    pub(crate) fn write_new_table(
        &mut self,
        base: TableIndex,
        bits: u8,
        bit_offset: u32,
        entries: &[IptdEntry],
    ) -> Result<TableRef, CrtError> {
        debug_assert_eq!(entries.len(), 1usize << bits);
        if self.cfg.compress && bits >= 4 {
            let mut phys = Vec::with_capacity(entries.len());
            let entropy = rundelta::compress(entries, &mut phys)?;
            for (i, e) in phys.iter().enumerate() {
                self.bank.write_record(base.get() + i as u32, e.encode())?;
            }
            Ok(TableRef {
                base,
                bits,
                entropy: Some(entropy),
                bit_offset,
            })
        } else {
            for (i, e) in entries.iter().enumerate() {
                self.bank.write_record(base.get() + i as u32, e.encode())?;
            }
            Ok(TableRef {
                base,
                bits,
                entropy: None,
                bit_offset,
            })
        }
    }
}
