//! Software lookup walk.
//!
//! The hardware performs this search on its own; the engine carries an
//! equivalent walk so control-plane code and tests can observe what the
//! lookup engine would answer. Full-width keys only — partial-prefix
//! queries are a property of stored entries (wildcards), not of lookups.

use bank::Bank;
use iptd::{DataIndex, IptdEntry};

use crate::table::extract_bits;
use crate::{CrtError, CrtTable};

impl<B: Bank> CrtTable<B> {
    /// Looks up a full-width key, returning the stored payload of the
    /// longest matching entry.
    pub fn lookup(&self, key: &[u8]) -> Result<Option<Vec<u8>>, CrtError> {
        Ok(match self.lookup_match(key)? {
            Some((slot, _)) => Some(self.read_data_record(slot)?),
            None => None,
        })
    }

    /// Looks up a full-width key, returning the matching entry's data slot
    /// and matched key length (shorter than the key width for wildcard
    /// hits).
    pub fn lookup_match(&self, key: &[u8]) -> Result<Option<(DataIndex, u16)>, CrtError> {
        let key_bits = self.cfg.key_bits;
        self.check_key(key, key_bits)?;
        if self.empty {
            return Ok(None);
        }

        let mut cur = self.root_ref();
        let mut depth = 1usize;
        loop {
            if key_bits - cur.bit_offset < cur.bits as u32 {
                return Err(CrtError::TableCorrupted("table chain deeper than the key"));
            }
            let idx = extract_bits(key, cur.bit_offset, cur.bits);
            match self.read_entry(&cur, idx)? {
                IptdEntry::Fail => return Ok(None),
                IptdEntry::Data { slot, key_bits } => return Ok(Some((slot, key_bits))),
                entry @ (IptdEntry::Simple { .. } | IptdEntry::RunDelta { .. }) => {
                    depth += 1;
                    if depth > self.cfg.max_iptd_levels as usize {
                        return Err(CrtError::ChainTooLong(self.cfg.max_iptd_levels));
                    }
                    cur = self.child_ref(entry, cur.bit_offset + cur.bits as u32)?;
                }
            }
        }
    }
}
