//! Constants used during access rule resolution
//!
//! This module contains the reserved AID values and the reason strings
//! attached to decisions synthesized by the cache.

/// AID values with a reserved meaning
pub mod aid {
    /// AID that designates the default selected applet
    pub const DEFAULT_APPLICATION: [u8; 5] = [0x00, 0x00, 0x00, 0x00, 0x00];
}

/// APDU filter layout
pub mod filter {
    /// Length of the command header covered by a filter (CLA INS P1 P2)
    pub const HEADER_LENGTH: usize = 4;
    /// Length of an encoded filter (header followed by mask)
    pub const ENCODED_LENGTH: usize = HEADER_LENGTH * 2;
}

/// Reasons attached to synthesized decisions
pub mod reason {
    /// APDU access rule says NEVER
    pub const APDU_NEVER: &str = "NEVER is explicitly specified as the APDU access rule policy";
    /// No APDU access rule after combination
    pub const NO_APDU_RULE: &str = "No APDU access rule is available";
    /// Conflict resolution for a specific AID (case A)
    pub const SPECIFIC_AID_OTHER_HASH: &str =
        "AID has a specific access rule with a different hash. (Case A)";
    /// Conflict resolution for all AIDs (case C)
    pub const ALL_AID_OTHER_HASH: &str =
        "An access rule with a different hash and all AIDs was found. (Case C)";
    /// Nothing matched at all
    pub const NO_RULE_FOUND: &str = "No access rule found";
    /// APDU command not covered by any filter
    pub const NO_FILTER_MATCH: &str = "APDU command does not match any APDU filter";
    /// NFC event access not granted
    pub const NFC_EVENT_DENIED: &str = "NFC event access is not allowed";
}
