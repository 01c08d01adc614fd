//! GlobalPlatform Secure Element Access Control rule cache
//!
//! This crate holds the access rules read from a Secure Element (through the
//! ARA-M applet or the ARF file system) and resolves them into access
//! decisions for device applications.
//!
//! ## Overview
//!
//! - [`AccessRuleCache`] stores rules keyed by [`RuleKey`] (AID reference and
//!   certificate hash reference), merges overlapping rules and runs the SEAC
//!   conflict resolution on lookup
//! - [`ChannelAccess`] is the resulting decision for APDU access, APDU
//!   filters and NFC event dispatch
//! - Carrier privilege rules are kept apart and checked with
//!   [`AccessRuleCache::check_carrier_privilege`]
//!
//! Reading and parsing the rule objects from the card is left to the caller,
//! which feeds the cache through [`AccessRuleCache::merge_ar_do`] or
//! [`AccessRuleCache::merge_rule`] and uses the refresh tag to decide when the
//! cache must be rebuilt.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

pub mod access;
pub mod cache;
pub mod config;
pub mod constants;
pub mod filter;
pub mod rule;

mod error;
pub use error::{Error, Result};

// Re-exports for common types
pub use access::{Access, ChannelAccess};
pub use cache::AccessRuleCache;
pub use config::CacheConfig;
pub use filter::ApduFilter;
pub use rule::{
    AidRef, ApduArDo, ArDo, CarrierPrivilege, HashRef, NfcArDo, PackageRef, RuleKey, RuleRef,
};

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{
        Access, AccessRuleCache, AidRef, ApduArDo, ApduFilter, ArDo, CacheConfig,
        CarrierPrivilege, ChannelAccess, Error, HashRef, NfcArDo, PackageRef, Result, RuleKey,
        RuleRef,
    };
}
