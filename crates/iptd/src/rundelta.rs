//! Rundelta compression of node tables.
//!
//! A table of `2^bits` logical entries (`bits >= 4`) is divided into 16
//! blocks of `2^(bits-4)` entries. A 32-bit entropy code assigns each block
//! a 2-bit class, consumed in block order 0..16:
//!
//! ```text
//! NONE   (0)  no physical entries; the whole block repeats the last
//!             reconstructed entry (run continuation)
//! SINGLE (1)  one physical entry, broadcast to the whole block
//! HALF   (2)  the first half repeats the last reconstructed entry, the
//!             second half is stored (block length must be >= 2)
//! FULL   (3)  every entry stored
//! ```
//!
//! Block 0 has no preceding entry, so `NONE` and `HALF` are invalid there.
//! The compressor picks the cheapest exact class per block, preferring
//! `NONE` over `SINGLE` over `HALF` over `FULL`, which makes compression a
//! pure function of the logical content: recompressing an unmodified table
//! reproduces the identical entropy code and physical image.

use crate::{CodecError, IptdEntry};

/// Blocks per table; the entropy code carries 2 bits for each.
pub const BLOCKS: u32 = 16;

/// Per-block compression class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockClass {
    None,
    Single,
    Half,
    Full,
}

impl BlockClass {
    fn from_code(code: u32) -> Self {
        match code & 0x3 {
            0 => BlockClass::None,
            1 => BlockClass::Single,
            2 => BlockClass::Half,
            _ => BlockClass::Full,
        }
    }

    fn code(self) -> u32 {
        match self {
            BlockClass::None => 0,
            BlockClass::Single => 1,
            BlockClass::Half => 2,
            BlockClass::Full => 3,
        }
    }
}

/// Class assigned to block `b` by `entropy`.
#[must_use]
pub fn class_at(entropy: u32, b: u32) -> BlockClass {
    BlockClass::from_code(entropy >> (2 * b))
}

/// Logical entries per block for a `bits`-bit table.
#[must_use]
pub fn block_len(bits: u8) -> u32 {
    debug_assert!(bits >= 4);
    1 << (bits - 4)
}

/// Physical entries block `b` contributes.
fn contribution(bits: u8, entropy: u32, b: u32) -> Result<u32, CodecError> {
    let bl = block_len(bits);
    match class_at(entropy, b) {
        BlockClass::None => {
            if b == 0 {
                return Err(CodecError::BadEntropy { bits, entropy });
            }
            Ok(0)
        }
        BlockClass::Single => Ok(1),
        BlockClass::Half => {
            if b == 0 || bl < 2 {
                return Err(CodecError::BadEntropy { bits, entropy });
            }
            Ok(bl / 2)
        }
        BlockClass::Full => Ok(bl),
    }
}

/// Physical entry count of a `bits`-bit table compressed under `entropy`.
pub fn physical_len(bits: u8, entropy: u32) -> Result<u32, CodecError> {
    let mut n = 0;
    for b in 0..BLOCKS {
        n += contribution(bits, entropy, b)?;
    }
    Ok(n)
}

/// Maps a logical entry index to the physical index holding its value.
///
/// For run-continuation positions (`NONE` blocks, the leading half of `HALF`
/// blocks) this is the most recently stored physical entry, which is always
/// the one just before the block's own contribution starts — block 0 is
/// never a continuation, so the subtraction cannot underflow.
pub fn physical_index(bits: u8, entropy: u32, logical: u32) -> Result<u32, CodecError> {
    let bl = block_len(bits);
    debug_assert!(logical < bl * BLOCKS);
    let block = logical / bl;
    let intra = logical % bl;

    let mut before = 0;
    for b in 0..block {
        before += contribution(bits, entropy, b)?;
    }
    // Validate the remaining blocks too, so a bad code is rejected no matter
    // which index is asked for.
    for b in block..BLOCKS {
        contribution(bits, entropy, b)?;
    }

    Ok(match class_at(entropy, block) {
        BlockClass::None => before - 1,
        BlockClass::Single => before,
        BlockClass::Half => {
            if intra < bl / 2 {
                before - 1
            } else {
                before + intra - bl / 2
            }
        }
        BlockClass::Full => before + intra,
    })
}

/// Reconstructs the full logical table from its physical image.
///
/// `physical` must be exactly `physical_len(bits, entropy)` entries; the
/// result is appended to `out` (cleared first).
pub fn decompress(
    bits: u8,
    entropy: u32,
    physical: &[IptdEntry],
    out: &mut Vec<IptdEntry>,
) -> Result<(), CodecError> {
    let expected = physical_len(bits, entropy)? as usize;
    if physical.len() != expected {
        return Err(CodecError::LengthMismatch {
            expected,
            got: physical.len(),
        });
    }

    out.clear();
    let bl = block_len(bits) as usize;
    let mut p = 0;
    for b in 0..BLOCKS {
        match class_at(entropy, b) {
            BlockClass::None => {
                let last = *out.last().expect("block 0 validated non-NONE");
                out.extend(std::iter::repeat(last).take(bl));
            }
            BlockClass::Single => {
                out.extend(std::iter::repeat(physical[p]).take(bl));
                p += 1;
            }
            BlockClass::Half => {
                let last = *out.last().expect("block 0 validated non-HALF");
                out.extend(std::iter::repeat(last).take(bl / 2));
                out.extend_from_slice(&physical[p..p + bl / 2]);
                p += bl / 2;
            }
            BlockClass::Full => {
                out.extend_from_slice(&physical[p..p + bl]);
                p += bl;
            }
        }
    }
    Ok(())
}

/// Compresses a fully materialized logical table.
///
/// Appends the physical image to `out` (cleared first) and returns the
/// entropy code. `logical` must be a power-of-two length in `16..=65536`.
pub fn compress(logical: &[IptdEntry], out: &mut Vec<IptdEntry>) -> Result<u32, CodecError> {
    let n = logical.len();
    if n < 16 || n > 65536 || !n.is_power_of_two() {
        return Err(CodecError::NotCompressible(n));
    }
    let bl = n / 16;

    out.clear();
    let mut entropy = 0u32;
    let mut last: Option<IptdEntry> = None;
    for b in 0..BLOCKS as usize {
        let blk = &logical[b * bl..(b + 1) * bl];
        let uniform = blk.iter().all(|e| *e == blk[0]);

        let class = if b > 0 && uniform && last == Some(blk[0]) {
            BlockClass::None
        } else if uniform {
            BlockClass::Single
        } else if b > 0 && bl >= 2 && blk[..bl / 2].iter().all(|e| last == Some(*e)) {
            BlockClass::Half
        } else {
            BlockClass::Full
        };

        match class {
            BlockClass::None => {}
            BlockClass::Single => out.push(blk[0]),
            BlockClass::Half => out.extend_from_slice(&blk[bl / 2..]),
            BlockClass::Full => out.extend_from_slice(blk),
        }
        entropy |= class.code() << (2 * b);
        last = Some(*blk.last().expect("blocks are non-empty"));
    }
    Ok(entropy)
}
