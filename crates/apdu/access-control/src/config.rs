//! Configuration options for the access rule cache

use bytes::Bytes;

use crate::constants::aid;

/// Configuration options for [`AccessRuleCache`](crate::AccessRuleCache)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Log full rule keys and decisions at debug level
    pub log_rule_contents: bool,

    /// Requested AID that designates the default applet
    pub default_applet_aid: Bytes,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            log_rule_contents: false,
            default_applet_aid: Bytes::from_static(&aid::DEFAULT_APPLICATION),
        }
    }
}

impl CacheConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether rule contents are logged
    pub const fn with_log_rule_contents(mut self, log_rule_contents: bool) -> Self {
        self.log_rule_contents = log_rule_contents;
        self
    }

    /// Set the AID that designates the default applet
    pub fn with_default_applet_aid(mut self, aid: impl Into<Bytes>) -> Self {
        self.default_applet_aid = aid.into();
        self
    }
}
