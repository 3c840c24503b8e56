use super::helpers::*;
use crate::CrtError;
use bank::{MemBank, NullConfigSink, RecordingConfigSink};
use config::CrtConfig;
use crate::CrtTable;

// --------------------- creation ---------------------

#[test]
fn create_programs_the_lookup_engine_once() {
    let mut sink = RecordingConfigSink::default();
    let t = CrtTable::create(7, small_cfg(), MemBank::new(4096), &mut sink).unwrap();

    assert_eq!(sink.calls.len(), 1);
    let call = sink.calls[0];
    assert_eq!(call.table_id, 7);
    assert_eq!(call.key_bits, 32);
    assert_eq!(call.root_table_entries, 256);
    assert!(t.is_empty());
}

#[test]
fn create_rejects_bad_parameters() {
    let cfg = CrtConfig {
        key_bits: 40,
        ..small_cfg()
    };
    let err = CrtTable::create(1, cfg, MemBank::new(4096), &mut NullConfigSink).unwrap_err();
    assert!(matches!(err, CrtError::Config(_)));
}

#[test]
fn create_rejects_undersized_region() {
    // Root (256) + data heap (64) does not fit in 300 records.
    let err =
        CrtTable::create(1, small_cfg(), MemBank::new(300), &mut NullConfigSink).unwrap_err();
    assert!(matches!(err, CrtError::RegionTooSmall { needed: 320, .. }));
}

// --------------------- basic insert / lookup ---------------------

#[test]
fn insert_and_lookup_full_key() {
    let mut t = default_table();
    t.insert(&key32(0x0A0B_0C0D), 32, &[0x7F]).unwrap();

    assert!(!t.is_empty());
    assert_eq!(t.lookup(&key32(0x0A0B_0C0D)).unwrap(), Some(vec![0x7F]));
    assert_eq!(t.lookup(&key32(0x0A0B_0C0C)).unwrap(), None);
    assert_eq!(t.lookup(&key32(0xFFFF_FFFF)).unwrap(), None);
    check_invariants(&t);
}

#[test]
fn insert_many_distinct_keys() {
    let mut t = default_table();
    for i in 0u32..32 {
        let k = 0x1000_0000 | (i * 0x0101);
        t.insert(&key32(k), 32, &[i as u8]).unwrap();
    }
    for i in 0u32..32 {
        let k = 0x1000_0000 | (i * 0x0101);
        assert_eq!(t.lookup(&key32(k)).unwrap(), Some(vec![i as u8]));
    }
    check_invariants(&t);
}

#[test]
fn wildcard_covers_its_whole_range() {
    let mut t = default_table();
    // 24-bit prefix: matches every key 0x0A0B0Cxx.
    t.insert(&key32(0x0A0B_0C00), 24, &[0x01]).unwrap();

    assert_eq!(t.lookup(&key32(0x0A0B_0C00)).unwrap(), Some(vec![0x01]));
    assert_eq!(t.lookup(&key32(0x0A0B_0C7F)).unwrap(), Some(vec![0x01]));
    assert_eq!(t.lookup(&key32(0x0A0B_0CFF)).unwrap(), Some(vec![0x01]));
    assert_eq!(t.lookup(&key32(0x0A0B_0D00)).unwrap(), None);
    check_invariants(&t);
}

#[test]
fn longer_key_overrides_wildcard_in_either_insert_order() {
    for wildcard_first in [true, false] {
        let mut t = default_table();
        if wildcard_first {
            t.insert(&key32(0x0A0B_0C00), 24, &[0x01]).unwrap();
            t.insert(&key32(0x0A0B_0C0D), 32, &[0x7F]).unwrap();
        } else {
            t.insert(&key32(0x0A0B_0C0D), 32, &[0x7F]).unwrap();
            t.insert(&key32(0x0A0B_0C00), 24, &[0x01]).unwrap();
        }

        assert_eq!(t.lookup(&key32(0x0A0B_0C0D)).unwrap(), Some(vec![0x7F]));
        assert_eq!(t.lookup(&key32(0x0A0B_0C05)).unwrap(), Some(vec![0x01]));
        check_invariants(&t);
    }
}

#[test]
fn nested_wildcards_resolve_by_length() {
    let mut t = default_table();
    t.insert(&key32(0x2000_0000), 8, &[0xAA]).unwrap();
    t.insert(&key32(0x2030_0000), 16, &[0xBB]).unwrap();
    t.insert(&key32(0x2030_4000), 24, &[0xCC]).unwrap();

    assert_eq!(t.lookup(&key32(0x20FF_FFFF)).unwrap(), Some(vec![0xAA]));
    assert_eq!(t.lookup(&key32(0x2030_FF00)).unwrap(), Some(vec![0xBB]));
    assert_eq!(t.lookup(&key32(0x2030_40FF)).unwrap(), Some(vec![0xCC]));
    check_invariants(&t);
}

#[test]
fn short_wildcard_inside_root_table() {
    let mut t = default_table();
    // 4 bits: covers a sixteenth of the whole key space inside the root.
    t.insert(&key32(0x5000_0000), 4, &[0x05]).unwrap();

    assert_eq!(t.lookup(&key32(0x5ABC_DEF0)).unwrap(), Some(vec![0x05]));
    assert_eq!(t.lookup(&key32(0x6000_0000)).unwrap(), None);
    check_invariants(&t);
}

// --------------------- duplicate / shadowed outcomes ---------------------

#[test]
fn duplicate_insert_is_entry_exists_and_keeps_original_data() {
    let mut t = default_table();
    t.insert(&key32(0xDEAD_BEEF), 32, &[0x11]).unwrap();
    let before = t.data_in_use();

    let err = t.insert(&key32(0xDEAD_BEEF), 32, &[0x22]).unwrap_err();
    assert!(matches!(err, CrtError::EntryExists));
    assert!(err.is_recoverable());

    assert_eq!(t.data_in_use(), before);
    assert_eq!(t.lookup(&key32(0xDEAD_BEEF)).unwrap(), Some(vec![0x11]));
    check_invariants(&t);
}

#[test]
fn duplicate_wildcard_is_entry_exists() {
    let mut t = default_table();
    t.insert(&key32(0x0A0B_0C00), 24, &[0x01]).unwrap();
    let err = t.insert(&key32(0x0A0B_0C00), 24, &[0x02]).unwrap_err();
    assert!(matches!(err, CrtError::EntryExists));
    check_invariants(&t);
}

#[test]
fn fully_shadowed_wildcard_is_redundant() {
    let mut t = default_table();
    // Occupy every 32-bit key under the 28-bit prefix 0x0A0B0C0.
    for x in 0u32..16 {
        t.insert(&key32(0x0A0B_0C00 | x), 32, &[x as u8]).unwrap();
    }
    let before = t.data_in_use();

    let err = t.insert(&key32(0x0A0B_0C00), 28, &[0x55]).unwrap_err();
    assert!(matches!(err, CrtError::RedundantEntry));
    assert_eq!(t.data_in_use(), before);

    for x in 0u32..16 {
        assert_eq!(
            t.lookup(&key32(0x0A0B_0C00 | x)).unwrap(),
            Some(vec![x as u8])
        );
    }
    check_invariants(&t);
}

// --------------------- argument validation ---------------------

#[test]
fn insert_rejects_bad_arguments() {
    let mut t = default_table();
    assert!(matches!(
        t.insert(&key32(1), 0, &[0]).unwrap_err(),
        CrtError::BadKeyLength(0)
    ));
    assert!(matches!(
        t.insert(&key32(1), 33, &[0]).unwrap_err(),
        CrtError::BadKeyLength(33)
    ));
    assert!(matches!(
        t.insert(&[0u8; 2], 32, &[0]).unwrap_err(),
        CrtError::BadKeyLength(32)
    ));
    assert!(matches!(
        t.insert(&key32(1), 32, &[0, 0]).unwrap_err(),
        CrtError::BadDataLength {
            expected: 1,
            got: 2
        }
    ));
    assert!(t.is_empty());
}

// --------------------- wider configurations ---------------------

#[test]
fn wide_keys_and_wide_data() {
    let cfg = CrtConfig {
        key_bits: 128,
        kdata_bits: 64,
        kdata_entries: 32,
        min_iptd_bits: 4,
        max_iptd_bits: 8,
        max_iptd_levels: 32,
        compress: true,
    };
    let mut t = new_table(cfg, 64 * 1024);

    let key: [u8; 16] = [
        0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x42,
    ];
    let data = [1, 2, 3, 4, 5, 6, 7, 8];
    t.insert(&key, 128, &data).unwrap();

    // A /32-style prefix over the same leading bytes.
    let prefix: [u8; 16] = [0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
    t.insert(&prefix, 32, &[9, 9, 9, 9, 9, 9, 9, 9]).unwrap();

    assert_eq!(t.lookup(&key).unwrap(), Some(data.to_vec()));
    let mut other = key;
    other[15] = 0x43;
    assert_eq!(t.lookup(&other).unwrap(), Some(vec![9; 8]));
    check_invariants(&t);
}

#[test]
fn uncompressed_tables_behave_identically() {
    let cfg = CrtConfig {
        compress: false,
        ..small_cfg()
    };
    let mut t = new_table(cfg, 32 * 1024);
    t.insert(&key32(0x0A0B_0C0D), 32, &[0x7F]).unwrap();
    t.insert(&key32(0x0A0B_0C00), 24, &[0x01]).unwrap();

    assert_eq!(t.lookup(&key32(0x0A0B_0C0D)).unwrap(), Some(vec![0x7F]));
    assert_eq!(t.lookup(&key32(0x0A0B_0C05)).unwrap(), Some(vec![0x01]));
    check_invariants(&t);

    t.delete(&key32(0x0A0B_0C0D), 32).unwrap();
    assert_eq!(t.lookup(&key32(0x0A0B_0C0D)).unwrap(), Some(vec![0x01]));
    check_invariants(&t);
}

// --------------------- out of memory ---------------------

#[test]
fn chain_allocation_failure_is_clean_and_retriable() {
    // Root (256) + data heap (64) + zero spare blocks.
    let cfg = small_cfg();
    let mut t = new_table(cfg, 320);

    // A full-width key needs six chain tables; there are none to give.
    let err = t.insert(&key32(0x0A0B_0C0D), 32, &[0x7F]).unwrap_err();
    assert!(matches!(err, CrtError::OutOfMemory));
    assert!(err.is_recoverable());
    assert!(t.is_empty());
    assert_eq!(t.data_in_use(), 0);
    assert_eq!(t.tables_in_use(), 0);

    // Keys that fit inside the root still insert fine.
    t.insert(&key32(0x0A00_0000), 8, &[0x01]).unwrap();
    assert_eq!(t.lookup(&key32(0x0AFF_FFFF)).unwrap(), Some(vec![0x01]));
    check_invariants(&t);
}

#[test]
fn data_heap_exhaustion_is_recoverable() {
    let cfg = CrtConfig {
        kdata_entries: 2,
        ..small_cfg()
    };
    let mut t = new_table(cfg, 32 * 1024);
    t.insert(&key32(0x0100_0000), 8, &[1]).unwrap();
    t.insert(&key32(0x0200_0000), 8, &[2]).unwrap();

    let err = t.insert(&key32(0x0300_0000), 8, &[3]).unwrap_err();
    assert!(matches!(err, CrtError::OutOfMemory));
    check_invariants(&t);

    // Deleting one key frees its slot for reuse.
    t.delete(&key32(0x0100_0000), 8).unwrap();
    t.insert(&key32(0x0300_0000), 8, &[3]).unwrap();
    assert_eq!(t.lookup(&key32(0x03FF_FFFF)).unwrap(), Some(vec![3]));
    check_invariants(&t);
}
