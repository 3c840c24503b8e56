//! # CRT — compressed-trie lookup-table engine
//!
//! A longest-prefix-match table over a fixed-size bank region, as programmed
//! into a network-processor lookup engine: a multi-level trie of node tables
//! ("IPTD" tables) whose leaves reference fixed-width data entries, with
//! rundelta compression keeping sparse node tables cheap.
//!
//! ## Architecture
//!
//! ```text
//! Caller (control plane, one writer per table)
//!   |
//!   v
//! ┌──────────────────────────────────────────────────┐
//! │                  CRT TABLE                       │
//! │                                                  │
//! │ insert.rs → descend → extend chain / range fill  │
//! │ delete.rs → descend (trace) → range delete       │
//! │               → replacement search (search.rs)   │
//! │               → collapse redundant ancestors     │
//! │ lookup.rs → software walk of the hardware search │
//! │                                                  │
//! │ table.rs  → materialize / recompress node tables │
//! │             and bubble entropy changes upward    │
//! └──────┬──────────────┬───────────────┬────────────┘
//!        v              v               v
//!   iptd (codec)   heap (blocks,   bank (records,
//!                   data slots)     table_config)
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module        | Purpose                                                |
//! |---------------|--------------------------------------------------------|
//! | [`lib.rs`]    | `CrtTable` struct, creation/layout, accessors, `Debug` |
//! | [`table.rs`]  | table references, load/store, entropy bubbling         |
//! | [`insert.rs`] | `insert()`: descent, chain extension, range fill       |
//! | [`delete.rs`] | `delete()`: trace descent, range delete, collapsing    |
//! | [`search.rs`] | wildcard replacement search for vacated regions        |
//! | [`lookup.rs`] | `lookup()`: the software equivalent of the hw search   |
//!
//! ## Region layout
//!
//! ```text
//! record 0 ──────────────► ┌──────────────────────────┐
//!                          │ root table (2^max bits)  │  reserved, never moves
//! root_records ──────────► ├──────────────────────────┤
//!                          │ block heap: node tables  │  one block per table
//! capacity - kdata_n ────► ├──────────────────────────┤
//!                          │ data heap: leaf payloads │  one record per slot
//! capacity ──────────────► └──────────────────────────┘
//! ```
//!
//! ## Concurrency
//!
//! Not internally synchronized. Exactly one logical writer per table
//! instance; mutation takes `&mut self` and every call completes
//! synchronously, bounded by the configured level ceiling.

mod delete;
mod insert;
mod lookup;
mod search;
mod table;

use bank::{Bank, BankError, ConfigSink, TableConfig, RECORD_BYTES};
use config::ConfigError;
use heap::{BlockHeap, DataHeap, HeapError};
use iptd::{CodecError, IptdEntry};
use thiserror::Error;

pub use config::CrtConfig;
pub use iptd::DataIndex;

/// Everything an engine operation can report.
///
/// The recoverable kinds (`OutOfMemory` plus the three logical outcomes) are
/// safe to retry or ignore; partial work has been unwound before they
/// surface. The fatal kinds mean the instance must not be mutated further.
#[derive(Debug, Error)]
pub enum CrtError {
    /// A construction parameter was rejected; no table was created.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The bank region cannot hold the data heap plus the root table.
    #[error("bank region too small: need {needed} records, have {have}")]
    RegionTooSmall { needed: u32, have: u32 },

    /// Key length of 0, above the configured width, or longer than the
    /// supplied buffer.
    #[error("bad key length: {0} bits")]
    BadKeyLength(u32),

    /// Data payload does not match the configured entry width.
    #[error("data payload must be {expected} bytes, got {got}")]
    BadDataLength { expected: usize, got: usize },

    /// Allocator exhausted. Partial writes have been unwound; recoverable.
    #[error("out of memory")]
    OutOfMemory,

    /// The identical key is already present. The stored data is untouched;
    /// delete-then-insert is the update path.
    #[error("entry already exists")]
    EntryExists,

    /// No entry with this exact key and length.
    #[error("entry does not exist")]
    EntryNotExist,

    /// The new wildcard is shadowed everywhere by strictly longer entries;
    /// inserting it would change nothing.
    #[error("entry is shadowed by more specific entries")]
    RedundantEntry,

    /// A walk exceeded the configured level ceiling. Unreachable when the
    /// stride configuration covers the key width within the ceiling;
    /// surfaced instead of asserting so harnesses can detect a sizing
    /// miscalculation.
    #[error("table chain exceeded {0} levels")]
    ChainTooLong(u8),

    /// An entry had a type the walk cannot accept here, or heap bookkeeping
    /// disagreed with the trie. Indicates a bug, not a runtime condition.
    #[error("table corrupted: {0}")]
    TableCorrupted(&'static str),

    /// An entry record or entropy code failed to decode.
    #[error("table corrupted: {0}")]
    Codec(#[from] CodecError),

    /// The bank itself failed. What reached storage is unknown; the caller
    /// should treat the whole instance as unusable.
    #[error("storage access failed: {0}")]
    Storage(#[from] BankError),
}

impl From<HeapError> for CrtError {
    fn from(e: HeapError) -> Self {
        match e {
            HeapError::OutOfMemory => CrtError::OutOfMemory,
            _ => CrtError::TableCorrupted("heap bookkeeping out of sync"),
        }
    }
}

impl CrtError {
    /// Logical outcome, not a fault: the trie is exactly as it was.
    #[must_use]
    pub fn is_logical(&self) -> bool {
        matches!(
            self,
            CrtError::EntryExists | CrtError::EntryNotExist | CrtError::RedundantEntry
        )
    }

    /// Safe to retry after freeing resources; all partial work was unwound.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        self.is_logical() || matches!(self, CrtError::OutOfMemory)
    }

    /// The instance may be inconsistent; stop mutating it.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CrtError::TableCorrupted(_) | CrtError::Codec(_) | CrtError::Storage(_)
        )
    }
}

/// A longest-prefix-match trie bound to one bank region.
///
/// Created once over a pre-sized region, mutated in place by interleaved
/// [`insert`](CrtTable::insert) / [`delete`](CrtTable::delete) calls, and
/// released with [`free`](CrtTable::free), which hands the region back
/// without requiring the trie to be emptied first.
pub struct CrtTable<B: Bank> {
    cfg: CrtConfig,
    table_id: u32,
    bank: B,
    blocks: BlockHeap,
    data: DataHeap,
    /// No key has been inserted since creation or since the trie last
    /// drained; the root table contents are meaningless while set.
    empty: bool,
}

impl<B: Bank> CrtTable<B> {
    /// Binds a new trie to `bank` and programs the lookup engine through
    /// `sink` (exactly once — the root table's base and logical size are
    /// constants of the configuration).
    ///
    /// Fails with [`CrtError::Config`] / [`CrtError::RegionTooSmall`]
    /// without constructing anything or touching the sink.
    pub fn create(
        table_id: u32,
        cfg: CrtConfig,
        bank: B,
        sink: &mut dyn ConfigSink,
    ) -> Result<Self, CrtError> {
        cfg.validate()?;

        let root_records = 1u32 << cfg.root_bits();
        let needed = root_records + cfg.kdata_entries;
        if bank.capacity() < needed {
            return Err(CrtError::RegionTooSmall {
                needed,
                have: bank.capacity(),
            });
        }

        let data_base = bank.capacity() - cfg.kdata_entries;
        let blocks = BlockHeap::new(root_records, data_base, 1u32 << cfg.max_iptd_bits);
        let data = DataHeap::new(data_base, cfg.kdata_entries);

        sink.table_config(&TableConfig {
            table_id,
            key_bits: cfg.key_bits,
            kdata_bits: cfg.kdata_bits,
            root_table_entries: root_records,
            bank_index: 0,
            bank_offset: 0,
        })?;

        Ok(Self {
            cfg,
            table_id,
            bank,
            blocks,
            data,
            empty: true,
        })
    }

    /// Releases the trie, returning the whole bank region. Nothing needs to
    /// be deleted first.
    #[must_use]
    pub fn free(self) -> B {
        self.bank
    }

    /// True when no key is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// The configuration this table was created with.
    #[must_use]
    pub fn config(&self) -> &CrtConfig {
        &self.cfg
    }

    /// Hardware table slot this instance programs.
    #[must_use]
    pub fn table_id(&self) -> u32 {
        self.table_id
    }

    /// Read-only view of the underlying region (e.g. for snapshots).
    #[must_use]
    pub fn bank(&self) -> &B {
        &self.bank
    }

    /// Live reference count of a data slot, if it is currently allocated.
    #[must_use]
    pub fn ref_count(&self, slot: DataIndex) -> Option<u32> {
        self.data.ref_count(slot).ok()
    }

    /// Data slots currently allocated.
    #[must_use]
    pub fn data_in_use(&self) -> u32 {
        self.data.in_use()
    }

    /// Node-table blocks currently allocated (the root is not counted; its
    /// area is reserved outside the block heap).
    #[must_use]
    pub fn tables_in_use(&self) -> u32 {
        self.blocks.blocks_in_use()
    }

    /// Validates a key reference against the configured width.
    fn check_key(&self, key: &[u8], key_bits: u32) -> Result<(), CrtError> {
        if key_bits == 0 || key_bits > self.cfg.key_bits {
            return Err(CrtError::BadKeyLength(key_bits));
        }
        if (key.len() as u32) * 8 < key_bits {
            return Err(CrtError::BadKeyLength(key_bits));
        }
        Ok(())
    }

    /// Fills the reserved root area with `FAIL` and arms the trie.
    fn init_root(&mut self) -> Result<(), CrtError> {
        let fail = IptdEntry::Fail.encode();
        for i in 0..1u32 << self.cfg.root_bits() {
            self.bank.write_record(i, fail)?;
        }
        self.empty = false;
        Ok(())
    }

    /// Writes a leaf payload into a data slot's record.
    fn write_data_record(&mut self, slot: DataIndex, data: &[u8]) -> Result<(), CrtError> {
        let mut rec = [0u8; RECORD_BYTES];
        rec[..data.len()].copy_from_slice(data);
        self.bank.write_record(self.data.record_index(slot)?, rec)?;
        Ok(())
    }

    /// Reads a leaf payload back out of a data slot's record.
    fn read_data_record(&self, slot: DataIndex) -> Result<Vec<u8>, CrtError> {
        let rec = self.bank.read_record(self.data.record_index(slot)?)?;
        Ok(rec[..self.cfg.kdata_bytes()].to_vec())
    }
}

impl<B: Bank> std::fmt::Debug for CrtTable<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrtTable")
            .field("table_id", &self.table_id)
            .field("key_bits", &self.cfg.key_bits)
            .field("kdata_bits", &self.cfg.kdata_bits)
            .field("empty", &self.empty)
            .field("data_in_use", &self.data.in_use())
            .field("data_capacity", &self.data.capacity())
            .field("tables_in_use", &self.blocks.blocks_in_use())
            .field("table_blocks", &self.blocks.blocks_total())
            .field("compress", &self.cfg.compress)
            .finish()
    }
}

#[cfg(test)]
mod tests;
