//! APDU filters
//!
//! An APDU filter restricts APDU access to the commands whose header matches
//! a bit-masked template.

use std::fmt;

use crate::{
    Error, Result,
    constants::filter::{ENCODED_LENGTH, HEADER_LENGTH},
};

/// Header and mask pattern for APDU commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ApduFilter {
    /// Expected command header (CLA INS P1 P2)
    header: [u8; HEADER_LENGTH],
    /// Mask applied to both the command header and the expected header
    mask: [u8; HEADER_LENGTH],
}

impl ApduFilter {
    /// Create a new filter from a header and a mask
    pub const fn new(header: [u8; HEADER_LENGTH], mask: [u8; HEADER_LENGTH]) -> Self {
        Self { header, mask }
    }

    /// Get the header template
    pub const fn header(&self) -> &[u8; HEADER_LENGTH] {
        &self.header
    }

    /// Get the mask
    pub const fn mask(&self) -> &[u8; HEADER_LENGTH] {
        &self.mask
    }

    /// Check whether a command header matches this filter
    ///
    /// Only the first four bytes of `command` are considered. Commands shorter
    /// than a header never match.
    pub fn matches(&self, command: &[u8]) -> bool {
        if command.len() < HEADER_LENGTH {
            return false;
        }

        self.header
            .iter()
            .zip(&self.mask)
            .zip(command)
            .all(|((header, mask), byte)| byte & mask == header & mask)
    }

    /// Encode as header followed by mask
    pub fn to_bytes(&self) -> [u8; ENCODED_LENGTH] {
        let mut out = [0u8; ENCODED_LENGTH];
        out[..HEADER_LENGTH].copy_from_slice(&self.header);
        out[HEADER_LENGTH..].copy_from_slice(&self.mask);
        out
    }
}

impl TryFrom<&[u8]> for ApduFilter {
    type Error = Error;

    fn try_from(data: &[u8]) -> Result<Self> {
        if data.len() != ENCODED_LENGTH {
            return Err(Error::InvalidLength {
                expected: ENCODED_LENGTH,
                actual: data.len(),
            });
        }

        let mut header = [0u8; HEADER_LENGTH];
        let mut mask = [0u8; HEADER_LENGTH];
        header.copy_from_slice(&data[..HEADER_LENGTH]);
        mask.copy_from_slice(&data[HEADER_LENGTH..]);

        Ok(Self::new(header, mask))
    }
}

impl fmt::Display for ApduFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}",
            hex::encode_upper(self.header),
            hex::encode_upper(self.mask)
        )
    }
}
