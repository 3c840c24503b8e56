///! # CLI - CRT Table Interactive Shell
///!
///! A REPL-style command-line interface for driving one CRT lookup table
///! over an in-memory bank region. Reads commands from stdin, executes them
///! against the engine, and prints results to stdout. Designed for both
///! interactive use and scripted testing (pipe commands via stdin).
///!
///! ## Commands
///!
///! ```text
///! INSERT key/bits data   Insert an entry (key and data in hex)
///! DELETE key/bits        Delete the entry with that exact key and length
///! LOOKUP key             Full-width lookup (prints data or "(miss)")
///! SAVE path              Write a checksummed snapshot of the region
///! CHECK path             Verify a snapshot file's integrity
///! STATS                  Print engine debug info
///! EXIT / QUIT            Shut down
///! ```
///!
///! ## Configuration
///!
///! All settings are controlled via environment variables:
///!
///! ```text
///! CRT_KEY_BITS        Key width in bits            (default: 32)
///! CRT_KDATA_BITS      Data width in bits           (default: 32)
///! CRT_KDATA_ENTRIES   Data heap capacity           (default: 256)
///! CRT_MIN_BITS        Minimum table stride         (default: 4)
///! CRT_MAX_BITS        Maximum table stride         (default: 8)
///! CRT_LEVELS          Table level ceiling          (default: 32)
///! CRT_COMPRESS        Rundelta compression on/off  (default: "true")
///! CRT_REGION          Bank region size in records  (default: 65536)
///! ```
///!
///! ## Example
///!
///! ```text
///! $ cargo run -p cli
///! CRT table ready (key=32b, data=32b, region=65536 records)
///! > INSERT 0A0B0C0D/32 0000007F
///! OK slot=0
///! > INSERT 0A0B0C00/24 00000001
///! OK slot=1
///! > LOOKUP 0A0B0C05
///! 00000001 (24 bits)
///! > EXIT
///! bye
///! ```

use anyhow::{anyhow, bail, Context, Result};
use bank::{snapshot, Bank, MemBank, NullConfigSink};
use config::CrtConfig;
use crt::{CrtError, CrtTable};
use std::io::{self, BufRead, Write};

/// Reads a configuration value from the environment, falling back to `default`.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parses `key/bits` (key in hex) into a byte buffer and a bit length.
fn parse_key(arg: &str) -> Result<(Vec<u8>, u32)> {
    let (hex, bits) = arg
        .split_once('/')
        .ok_or_else(|| anyhow!("expected key/bits, got {arg:?}"))?;
    let key = parse_hex(hex)?;
    let bits: u32 = bits.parse().context("bad bit length")?;
    Ok((key, bits))
}

fn parse_hex(hex: &str) -> Result<Vec<u8>> {
    if hex.len() % 2 != 0 {
        bail!("hex string {hex:?} has odd length");
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).context("bad hex"))
        .collect()
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

fn main() -> Result<()> {
    let cfg = CrtConfig {
        key_bits: env_or("CRT_KEY_BITS", "32").parse().unwrap_or(32),
        kdata_bits: env_or("CRT_KDATA_BITS", "32").parse().unwrap_or(32),
        kdata_entries: env_or("CRT_KDATA_ENTRIES", "256").parse().unwrap_or(256),
        min_iptd_bits: env_or("CRT_MIN_BITS", "4").parse().unwrap_or(4),
        max_iptd_bits: env_or("CRT_MAX_BITS", "8").parse().unwrap_or(8),
        max_iptd_levels: env_or("CRT_LEVELS", "32").parse().unwrap_or(32),
        compress: env_or("CRT_COMPRESS", "true").parse().unwrap_or(true),
    };
    let region: u32 = env_or("CRT_REGION", "65536").parse().unwrap_or(65536);

    let mut table = CrtTable::create(0, cfg, MemBank::new(region), &mut NullConfigSink)
        .context("failed to create CRT table")?;

    println!(
        "CRT table ready (key={}b, data={}b, region={} records)",
        cfg.key_bits, cfg.kdata_bits, region
    );
    println!("Commands: INSERT key/bits data | DELETE key/bits | LOOKUP key");
    println!("          SAVE path | CHECK path | STATS | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            match cmd.to_uppercase().as_str() {
                "INSERT" => match (parts.next(), parts.next()) {
                    (Some(k), Some(d)) => match run_insert(&mut table, k, d) {
                        Ok(msg) => println!("{msg}"),
                        Err(e) => println!("ERR insert failed: {e:#}"),
                    },
                    _ => println!("ERR usage: INSERT key/bits data"),
                },
                "DELETE" => match parts.next() {
                    Some(k) => match run_delete(&mut table, k) {
                        Ok(msg) => println!("{msg}"),
                        Err(e) => println!("ERR delete failed: {e:#}"),
                    },
                    None => println!("ERR usage: DELETE key/bits"),
                },
                "LOOKUP" => match parts.next() {
                    Some(k) => match run_lookup(&table, k) {
                        Ok(msg) => println!("{msg}"),
                        Err(e) => println!("ERR lookup failed: {e:#}"),
                    },
                    None => println!("ERR usage: LOOKUP key"),
                },
                "SAVE" => match parts.next() {
                    Some(path) => match run_save(&table, path) {
                        Ok(()) => println!("OK"),
                        Err(e) => println!("ERR save failed: {e:#}"),
                    },
                    None => println!("ERR usage: SAVE path"),
                },
                "CHECK" => match parts.next() {
                    Some(path) => match run_check(path) {
                        Ok(records) => println!("OK {records} records"),
                        Err(e) => println!("ERR check failed: {e:#}"),
                    },
                    None => println!("ERR usage: CHECK path"),
                },
                "STATS" => println!("{table:?}"),
                "EXIT" | "QUIT" => {
                    println!("bye");
                    break;
                }
                other => println!("unknown command: {other}"),
            }
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    Ok(())
}

fn run_insert(table: &mut CrtTable<MemBank>, key_arg: &str, data_arg: &str) -> Result<String> {
    let (key, bits) = parse_key(key_arg)?;
    let data = parse_hex(data_arg)?;
    match table.insert(&key, bits, &data) {
        Ok(slot) => Ok(format!("OK slot={}", slot.get())),
        Err(CrtError::EntryExists) => Ok("EXISTS (unchanged)".to_string()),
        Err(CrtError::RedundantEntry) => Ok("REDUNDANT (shadowed, unchanged)".to_string()),
        Err(e) => Err(e.into()),
    }
}

fn run_delete(table: &mut CrtTable<MemBank>, key_arg: &str) -> Result<String> {
    let (key, bits) = parse_key(key_arg)?;
    match table.delete(&key, bits) {
        Ok(()) => Ok("OK".to_string()),
        Err(CrtError::EntryNotExist) => Ok("(not found)".to_string()),
        Err(e) => Err(e.into()),
    }
}

fn run_lookup(table: &CrtTable<MemBank>, key_arg: &str) -> Result<String> {
    let key = parse_hex(key_arg)?;
    match table.lookup_match(&key)? {
        Some((_slot, matched_bits)) => {
            let data = table.lookup(&key)?.expect("matched entry has a payload");
            Ok(format!("{} ({} bits)", to_hex(&data), matched_bits))
        }
        None => Ok("(miss)".to_string()),
    }
}

fn run_save(table: &CrtTable<MemBank>, path: &str) -> Result<()> {
    let mut f = std::fs::File::create(path)?;
    snapshot::write_snapshot(table.bank(), &mut f)?;
    Ok(())
}

fn run_check(path: &str) -> Result<u32> {
    let mut f = std::fs::File::open(path)?;
    let bank = snapshot::read_snapshot(&mut f)?;
    Ok(bank.capacity())
}
