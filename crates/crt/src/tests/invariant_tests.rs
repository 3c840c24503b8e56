//! Randomized churn against a shadow model.
//!
//! Keys are drawn from a small pool of prefixes so chains overlap and
//! collapse paths get exercised; after every operation the structural
//! invariants are re-checked and a sample of lookups is compared against a
//! brute-force longest-prefix model.

use std::collections::HashMap;

use super::helpers::*;
use crate::CrtError;
use config::CrtConfig;

fn xorshift(s: &mut u32) -> u32 {
    *s ^= *s << 13;
    *s ^= *s >> 17;
    *s ^= *s << 5;
    *s
}

/// Masks `key` down to its leading `bits` bits.
fn masked(key: u32, bits: u32) -> u32 {
    if bits == 0 {
        0
    } else {
        key & (u32::MAX << (32 - bits))
    }
}

/// Brute-force longest-prefix match over the model.
fn model_lookup(model: &HashMap<(u32, u32), u8>, probe: u32) -> Option<u8> {
    (1..=32u32)
        .rev()
        .find_map(|bits| model.get(&(masked(probe, bits), bits)).copied())
}

fn churn(cfg: CrtConfig, seed: u32, ops: usize) {
    // Enough data slots that the pool never exhausts the heap mid-churn.
    let cfg = CrtConfig {
        kdata_entries: 512,
        ..cfg
    };
    let mut t = new_table(cfg, 64 * 1024);
    let mut model: HashMap<(u32, u32), u8> = HashMap::new();
    let mut rng = seed;

    for step in 0..ops {
        // Keys from a deliberately narrow pool: 2 top bytes, 4 mid values,
        // 8 tails, lengths on stride boundaries and off them.
        let r = xorshift(&mut rng);
        let top: u32 = if r & 1 == 0 { 0x10 } else { 0x8C };
        let key = (top << 24)
            | (((r >> 1) & 0x3) * 0x31) << 16
            | (((r >> 3) & 0x3) * 0x0F) << 8
            | ((r >> 5) & 0x7);
        let bits = [4u32, 8, 12, 16, 20, 24, 30, 32][((r >> 8) & 0x7) as usize];
        let key = masked(key, bits);
        let data = (r >> 11) as u8;

        if r >> 16 & 0x3 == 0 {
            // Delete.
            match t.delete(&key32(key), bits) {
                Ok(()) => {
                    assert!(
                        model.remove(&(key, bits)).is_some(),
                        "step {step}: deleted a key the model does not hold"
                    );
                }
                Err(CrtError::EntryNotExist) => {
                    assert!(!model.contains_key(&(key, bits)), "step {step}");
                }
                Err(e) => panic!("step {step}: delete failed: {e}"),
            }
        } else {
            // Insert.
            match t.insert(&key32(key), bits, &[data]) {
                Ok(_) => {
                    assert!(
                        model.insert((key, bits), data).is_none(),
                        "step {step}: inserted a key the model already holds"
                    );
                }
                Err(CrtError::EntryExists) => {
                    assert!(model.contains_key(&(key, bits)), "step {step}");
                }
                Err(CrtError::RedundantEntry) => {
                    assert!(!model.contains_key(&(key, bits)), "step {step}");
                }
                Err(e) => panic!("step {step}: insert failed: {e}"),
            }
        }

        check_invariants(&t);

        // Probe the model: every stored key's exact bits plus jittered
        // neighbours.
        for (&(k, _), _) in model.iter() {
            for probe in [k, k | 1, k | 0x33, k ^ 0x0100_0000] {
                let want = model_lookup(&model, probe);
                let got = t
                    .lookup(&key32(probe))
                    .unwrap()
                    .map(|payload| payload[0]);
                assert_eq!(got, want, "step {step}: probe {probe:#010x}");
            }
        }
    }

    // Drain completely; the region must return to its blank state.
    let stored: Vec<(u32, u32)> = model.keys().copied().collect();
    for (k, bits) in stored {
        t.delete(&key32(k), bits).unwrap();
        check_invariants(&t);
    }
    assert!(t.is_empty());
    assert_eq!(t.data_in_use(), 0);
    assert_eq!(t.tables_in_use(), 0);
}

#[test]
fn churn_with_compression() {
    churn(small_cfg(), 0xDECA_FBAD, 160);
}

#[test]
fn churn_without_compression() {
    let cfg = CrtConfig {
        compress: false,
        ..small_cfg()
    };
    churn(cfg, 0xFEED_F00D, 160);
}

#[test]
fn churn_with_coarse_strides() {
    let cfg = CrtConfig {
        min_iptd_bits: 8,
        max_iptd_bits: 8,
        ..small_cfg()
    };
    churn(cfg, 0x1234_5678, 120);
}
