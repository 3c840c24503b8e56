//! Region snapshots.
//!
//! Serializes a bank region to any `Write` sink and reconstructs a
//! [`MemBank`] from any `Read` source, so a programmed table image can be
//! kept across restarts or shipped between hosts.
//!
//! ## File layout (all little-endian)
//!
//! ```text
//! [magic: u32 = "CRTB"][record_count: u32][crc32: u32][records: count * 8 bytes]
//! ```
//!
//! The CRC32 covers the raw record bytes only. Truncated input, a foreign
//! magic, and a checksum mismatch are reported as distinct errors.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use std::io::{self, Read, Write};
use thiserror::Error;

use crate::{Bank, BankError, MemBank, Record, RECORD_BYTES};

/// Magic number identifying a bank snapshot (ASCII "CRTB").
pub const SNAPSHOT_MAGIC: u32 = 0x4352_5442;

/// Snapshot encode/decode failure.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Reading the source region failed.
    #[error("bank error: {0}")]
    Bank(#[from] BankError),

    /// The input does not start with [`SNAPSHOT_MAGIC`].
    #[error("not a bank snapshot (magic {0:#010x})")]
    BadMagic(u32),

    /// The record payload does not match its checksum.
    #[error("snapshot checksum mismatch")]
    Corrupt,
}

/// Writes a snapshot of the whole region to `w`.
pub fn write_snapshot<B: Bank, W: Write>(bank: &B, w: &mut W) -> Result<(), SnapshotError> {
    let count = bank.capacity();

    let mut payload = Vec::with_capacity(count as usize * RECORD_BYTES);
    for i in 0..count {
        payload.extend_from_slice(&bank.read_record(i)?);
    }

    let mut hasher = Crc32::new();
    hasher.update(&payload);

    w.write_u32::<LittleEndian>(SNAPSHOT_MAGIC)?;
    w.write_u32::<LittleEndian>(count)?;
    w.write_u32::<LittleEndian>(hasher.finalize())?;
    w.write_all(&payload)?;
    Ok(())
}

/// Reads a snapshot from `r`, reconstructing the region as a [`MemBank`].
pub fn read_snapshot<R: Read>(r: &mut R) -> Result<MemBank, SnapshotError> {
    let magic = r.read_u32::<LittleEndian>()?;
    if magic != SNAPSHOT_MAGIC {
        return Err(SnapshotError::BadMagic(magic));
    }
    let count = r.read_u32::<LittleEndian>()?;
    let crc = r.read_u32::<LittleEndian>()?;

    let mut payload = vec![0u8; count as usize * RECORD_BYTES];
    r.read_exact(&mut payload)?;

    let mut hasher = Crc32::new();
    hasher.update(&payload);
    if hasher.finalize() != crc {
        return Err(SnapshotError::Corrupt);
    }

    let mut bank = MemBank::new(count);
    for (i, chunk) in payload.chunks_exact(RECORD_BYTES).enumerate() {
        let mut rec: Record = [0u8; RECORD_BYTES];
        rec.copy_from_slice(chunk);
        bank.write_record(i as u32, rec)?;
    }
    Ok(bank)
}
