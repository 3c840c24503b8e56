use std::collections::HashMap;

use bank::{MemBank, NullConfigSink};
use config::CrtConfig;
use iptd::IptdEntry;

use crate::table::TableRef;
use crate::CrtTable;

/// 32-bit keys, 8-bit data, compressed tables: the common test shape.
pub fn small_cfg() -> CrtConfig {
    CrtConfig {
        key_bits: 32,
        kdata_bits: 8,
        kdata_entries: 64,
        min_iptd_bits: 4,
        max_iptd_bits: 8,
        max_iptd_levels: 16,
        compress: true,
    }
}

pub fn new_table(cfg: CrtConfig, records: u32) -> CrtTable<MemBank> {
    CrtTable::create(1, cfg, MemBank::new(records), &mut NullConfigSink).unwrap()
}

/// A comfortably sized table for multi-key tests.
pub fn default_table() -> CrtTable<MemBank> {
    new_table(small_cfg(), 32 * 1024)
}

/// Big-endian bytes give the MSB-first bit order the trie indexes by.
pub fn key32(v: u32) -> [u8; 4] {
    v.to_be_bytes()
}

/// Recounts every slot's logical `DATA` references by walking the trie.
pub fn recount_refs(t: &CrtTable<MemBank>) -> HashMap<u32, u32> {
    let mut counts = HashMap::new();
    if !t.is_empty() {
        walk_refs(t, &t.root_ref(), &mut counts);
    }
    counts
}

fn walk_refs(t: &CrtTable<MemBank>, tref: &TableRef, counts: &mut HashMap<u32, u32>) {
    for entry in t.load_table(tref).unwrap() {
        match entry {
            IptdEntry::Data { slot, .. } => *counts.entry(slot.get()).or_insert(0) += 1,
            IptdEntry::Simple { .. } | IptdEntry::RunDelta { .. } => {
                let child = t
                    .child_ref(entry, tref.bit_offset + tref.bits as u32)
                    .unwrap();
                walk_refs(t, &child, counts);
            }
            IptdEntry::Fail => {}
        }
    }
}

fn walk_redundancy(t: &CrtTable<MemBank>, tref: &TableRef) {
    let tbl = t.load_table(tref).unwrap();
    if tref.bit_offset > 0 {
        assert!(
            iptd::redundant(&tbl, tref.bit_offset).is_none(),
            "reachable table at offset {} is redundant",
            tref.bit_offset
        );
    }
    for entry in tbl {
        if entry.is_table() {
            let child = t
                .child_ref(entry, tref.bit_offset + tref.bits as u32)
                .unwrap();
            walk_redundancy(t, &child);
        }
    }
}

/// Structural invariants that must hold after every completed mutation:
/// heap reference counts equal the number of reachable `DATA` entries per
/// slot, every live slot is reachable, and no reachable non-root table is
/// collapsible.
pub fn check_invariants(t: &CrtTable<MemBank>) {
    let counts = recount_refs(t);
    for (slot, n) in &counts {
        assert_eq!(
            t.ref_count(iptd::DataIndex::new(*slot)),
            Some(*n),
            "slot {slot} reference count"
        );
    }
    assert_eq!(
        counts.len() as u32,
        t.data_in_use(),
        "live slots not all reachable"
    );
    if !t.is_empty() {
        walk_redundancy(t, &t.root_ref());
    }
}
