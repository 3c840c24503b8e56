//! # Config — CRT table parameters
//!
//! Construction-time configuration for a CRT lookup table: key width, data
//! width, data-entry capacity, node-table stride bounds, the recursion
//! ceiling, and the compression switch. Validation is synchronous — a table
//! is never constructed from a configuration that fails [`CrtConfig::validate`].

use thiserror::Error;

/// Key widths the lookup hardware can be programmed for, in bits.
pub const KEY_BITS: [u32; 4] = [32, 64, 96, 128];

/// Data-entry widths the data heap can be programmed for, in bits.
pub const KDATA_BITS: [u32; 4] = [8, 16, 32, 64];

/// Widest node table expressible in an entry's 4-bit size field (`bits - 1`).
pub const MAX_TABLE_BITS: u8 = 16;

/// A configuration parameter was rejected at table-creation time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// `key_bits` is not one of the supported widths.
    #[error("unsupported key width: {0} bits")]
    BadKeyBits(u32),

    /// `kdata_bits` is not one of the supported widths.
    #[error("unsupported data width: {0} bits")]
    BadKdataBits(u32),

    /// The data heap must hold at least one entry.
    #[error("data entry count must be non-zero")]
    NoDataEntries,

    /// Table stride bounds are out of range or inverted.
    #[error("bad table stride bounds: min {min}, max {max}")]
    BadTableBits { min: u8, max: u8 },

    /// The recursion ceiling must admit at least the root table.
    #[error("max table levels must be non-zero")]
    NoLevels,
}

/// Parameters fixed for the lifetime of one CRT table instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrtConfig {
    /// Total key width in bits. One of [`KEY_BITS`].
    pub key_bits: u32,
    /// Data-entry width in bits. One of [`KDATA_BITS`].
    pub kdata_bits: u32,
    /// Capacity of the data heap in entries.
    pub kdata_entries: u32,
    /// Smallest node-table stride in key bits. Interior tables use this.
    pub min_iptd_bits: u8,
    /// Largest node-table stride in key bits. The root uses this, and one
    /// allocator block holds `2^max_iptd_bits` entry records.
    pub max_iptd_bits: u8,
    /// Hard ceiling on table-chain depth and on every recursive walk.
    pub max_iptd_levels: u8,
    /// Store child tables rundelta-compressed where the stride allows it.
    pub compress: bool,
}

impl CrtConfig {
    /// Checks every parameter against the supported ranges.
    ///
    /// Deliberately does **not** check that `max_iptd_levels` is deep enough
    /// for `key_bits` at the configured strides: an under-provisioned ceiling
    /// surfaces as a `ChainTooLong` on the first over-deep insert, which test
    /// harnesses rely on being reachable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !KEY_BITS.contains(&self.key_bits) {
            return Err(ConfigError::BadKeyBits(self.key_bits));
        }
        if !KDATA_BITS.contains(&self.kdata_bits) {
            return Err(ConfigError::BadKdataBits(self.kdata_bits));
        }
        if self.kdata_entries == 0 {
            return Err(ConfigError::NoDataEntries);
        }
        if self.min_iptd_bits == 0
            || self.max_iptd_bits > MAX_TABLE_BITS
            || self.min_iptd_bits > self.max_iptd_bits
        {
            return Err(ConfigError::BadTableBits {
                min: self.min_iptd_bits,
                max: self.max_iptd_bits,
            });
        }
        if self.max_iptd_levels == 0 {
            return Err(ConfigError::NoLevels);
        }
        Ok(())
    }

    /// Key bits consumed by the root table.
    ///
    /// Every supported key width exceeds [`MAX_TABLE_BITS`], so the root
    /// always uses the full maximum stride.
    #[must_use]
    pub fn root_bits(&self) -> u8 {
        self.max_iptd_bits
    }

    /// Stride of a child table given the key bits left below its parent.
    ///
    /// Interior tables use the minimum stride; the last table absorbs
    /// whatever remainder is smaller than it.
    #[must_use]
    pub fn child_bits(&self, remaining: u32) -> u8 {
        remaining.min(self.min_iptd_bits as u32) as u8
    }

    /// Data-entry width in whole bytes.
    #[must_use]
    pub fn kdata_bytes(&self) -> usize {
        (self.kdata_bits / 8) as usize
    }
}

impl Default for CrtConfig {
    fn default() -> Self {
        Self {
            key_bits: 32,
            kdata_bits: 32,
            kdata_entries: 256,
            min_iptd_bits: 4,
            max_iptd_bits: 8,
            max_iptd_levels: 32,
            compress: true,
        }
    }
}
