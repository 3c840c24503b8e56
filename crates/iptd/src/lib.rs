//! # IPTD — node-table entry codec
//!
//! One trie node slot is a fixed two-word record in bank memory. This crate
//! owns its packed representation, the rundelta compression scheme applied to
//! whole node tables, and the table-redundancy predicate the engine collapses
//! on.
//!
//! ## Entry record (8 bytes, two u32 LE words)
//!
//! ```text
//! word0  [1:0]    type tag: 0 = FAIL, 1 = DATA, 2 = SIMPLE, 3 = RUNDELTA
//!        [5:2]    table bits - 1        (SIMPLE / RUNDELTA, else 0)
//!        [29:6]   base: table start record (SIMPLE / RUNDELTA)
//!                 or data slot index    (DATA)
//!        [31:30]  reserved, must be 0
//! word1           entropy code          (RUNDELTA)
//!                 matched key length in bits (DATA)
//!                 0                     (FAIL / SIMPLE)
//! ```
//!
//! The source hardware format overloads the second word across entry types;
//! in memory each variant carries its own named field instead and only the
//! codec knows the packing.

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

pub mod rundelta;

/// Size of one packed entry record in bytes.
pub const ENTRY_BYTES: usize = 8;

/// One packed bank record.
pub type EntryRecord = [u8; ENTRY_BYTES];

const TAG_FAIL: u32 = 0;
const TAG_DATA: u32 = 1;
const TAG_SIMPLE: u32 = 2;
const TAG_RUNDELTA: u32 = 3;

const BASE_MAX: u32 = (1 << 24) - 1;

/// Decoding or compression failed; the table image does not describe a
/// well-formed trie node.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// An entry record violates the packing rules (reserved bits set,
    /// impossible field combination).
    #[error("malformed table entry {0:#018x}")]
    MalformedEntry(u64),

    /// An entropy code that no compressor emits (block 0 continuing a
    /// nonexistent run, or a HALF class on a one-entry block).
    #[error("invalid entropy code {entropy:#010x} for a {bits}-bit table")]
    BadEntropy { bits: u8, entropy: u32 },

    /// A physical table image whose length disagrees with its entropy code.
    #[error("physical table length mismatch: expected {expected}, got {got}")]
    LengthMismatch { expected: usize, got: usize },

    /// Rundelta applies to tables of 16..=65536 power-of-two entries.
    #[error("table of {0} logical entries cannot be rundelta-compressed")]
    NotCompressible(usize),
}

/// Index of a node table's first record in the bank. Minted by the block
/// allocator; the codec only transports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableIndex(u32);

impl TableIndex {
    /// The distinguished root table base.
    pub const ROOT: TableIndex = TableIndex(0);

    #[must_use]
    pub fn new(index: u32) -> Self {
        debug_assert!(index <= BASE_MAX);
        Self(index)
    }

    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }
}

/// Index of one data-heap slot. Minted by the data heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataIndex(u32);

impl DataIndex {
    #[must_use]
    pub fn new(index: u32) -> Self {
        debug_assert!(index <= BASE_MAX);
        Self(index)
    }

    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }
}

/// One decoded trie node slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IptdEntry {
    /// Terminal negative: no key matches through this slot.
    Fail,
    /// Leaf reference. `key_bits` is the matched key length; an entry whose
    /// `key_bits` is shorter than the depth it sits at is a wildcard covering
    /// every key that shares its prefix.
    Data { slot: DataIndex, key_bits: u16 },
    /// Uncompressed child table of `2^bits` entries starting at `base`.
    Simple { base: TableIndex, bits: u8 },
    /// Rundelta-compressed child table: `2^bits` logical entries, physical
    /// layout described by `entropy` (see [`rundelta`]).
    RunDelta {
        base: TableIndex,
        bits: u8,
        entropy: u32,
    },
}

impl IptdEntry {
    /// Packs the entry into its two-word bank record.
    #[must_use]
    pub fn encode(&self) -> EntryRecord {
        let (w0, w1) = match *self {
            IptdEntry::Fail => (TAG_FAIL, 0),
            IptdEntry::Data { slot, key_bits } => {
                (TAG_DATA | (slot.get() << 6), key_bits as u32)
            }
            IptdEntry::Simple { base, bits } => {
                debug_assert!((1..=16).contains(&bits));
                (TAG_SIMPLE | (((bits as u32) - 1) << 2) | (base.get() << 6), 0)
            }
            IptdEntry::RunDelta {
                base,
                bits,
                entropy,
            } => {
                debug_assert!((4..=16).contains(&bits));
                (
                    TAG_RUNDELTA | (((bits as u32) - 1) << 2) | (base.get() << 6),
                    entropy,
                )
            }
        };
        let mut rec = [0u8; ENTRY_BYTES];
        LittleEndian::write_u32(&mut rec[0..4], w0);
        LittleEndian::write_u32(&mut rec[4..8], w1);
        rec
    }

    /// Unpacks a bank record, rejecting any image no encoder produces.
    pub fn decode(rec: &EntryRecord) -> Result<Self, CodecError> {
        let w0 = LittleEndian::read_u32(&rec[0..4]);
        let w1 = LittleEndian::read_u32(&rec[4..8]);
        let malformed = || CodecError::MalformedEntry(((w1 as u64) << 32) | w0 as u64);

        if w0 >> 30 != 0 {
            return Err(malformed());
        }
        let tag = w0 & 0x3;
        let size_field = (w0 >> 2) & 0xF;
        let base = (w0 >> 6) & BASE_MAX;

        match tag {
            TAG_FAIL => {
                if w0 != 0 || w1 != 0 {
                    return Err(malformed());
                }
                Ok(IptdEntry::Fail)
            }
            TAG_DATA => {
                if size_field != 0 || w1 == 0 || w1 > u16::MAX as u32 {
                    return Err(malformed());
                }
                Ok(IptdEntry::Data {
                    slot: DataIndex::new(base),
                    key_bits: w1 as u16,
                })
            }
            TAG_SIMPLE => {
                if w1 != 0 {
                    return Err(malformed());
                }
                Ok(IptdEntry::Simple {
                    base: TableIndex::new(base),
                    bits: size_field as u8 + 1,
                })
            }
            TAG_RUNDELTA => {
                // Entropy codes only describe tables of at least 16 entries.
                if size_field < 3 {
                    return Err(malformed());
                }
                Ok(IptdEntry::RunDelta {
                    base: TableIndex::new(base),
                    bits: size_field as u8 + 1,
                    entropy: w1,
                })
            }
            _ => unreachable!("2-bit tag"),
        }
    }

    /// True for `FAIL`.
    #[must_use]
    pub fn is_fail(&self) -> bool {
        matches!(self, IptdEntry::Fail)
    }

    /// True for `SIMPLE` or `RUNDELTA` — an entry that points at a child
    /// table rather than terminating the walk.
    #[must_use]
    pub fn is_table(&self) -> bool {
        matches!(self, IptdEntry::Simple { .. } | IptdEntry::RunDelta { .. })
    }
}

/// Tests whether a fully materialized table is collapsible into the single
/// parent entry that reaches it, returning the representative entry if so.
///
/// A table is redundant when every logical entry is `FAIL`, or when every
/// logical entry is the same `DATA` entry whose key length is strictly
/// shorter than `table_bit_offset` (the key bits consumed to reach the
/// table) — a wildcard that covers the parent slot just as well from one
/// level up. A uniform `DATA` table whose key length equals the offset is a
/// genuine terminal at that exact depth and is kept.
///
/// The root (offset 0) never satisfies either arm.
#[must_use]
pub fn redundant(entries: &[IptdEntry], table_bit_offset: u32) -> Option<IptdEntry> {
    let first = *entries.first()?;
    match first {
        IptdEntry::Fail => {}
        IptdEntry::Data { key_bits, .. } if (key_bits as u32) < table_bit_offset => {}
        _ => return None,
    }
    entries.iter().all(|e| *e == first).then_some(first)
}
