//! Access rule cache and resolution
//!
//! The cache is filled by a rule loader, one parsed rule object at a time,
//! and queried by the access control enforcer for every channel opening,
//! APDU and NFC event dispatch.
//!
//! Rules for the same key are combined with "most restrictive wins"
//! semantics. Lookups follow the GlobalPlatform SEAC search order:
//!
//! | Case | AID              | Device application |
//! |------|------------------|--------------------|
//! | A    | requested AID    | certificate hash   |
//! | B    | requested AID    | all                |
//! | C    | all              | certificate hash   |
//! | D    | all              | all                |
//!
//! with specific rules taking precedence over generic ones: if another device
//! application has a rule for the requested AID (case A) or for all AIDs
//! (case C), the generic cases below it are never consulted.

use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::{
    access::{Access, ChannelAccess},
    config::CacheConfig,
    constants::reason,
    rule::{AidRef, ArDo, CarrierPrivilege, HashRef, RuleKey, RuleRef},
};

/// Search case that produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SearchCase {
    A,
    B,
    C,
    D,
}

/// Cache of the access rules read from a Secure Element
///
/// The cache has no internal locking. Mutation needs `&mut self`, so the
/// owner of one SE session must serialize rule loading and lookups, e.g. by
/// keeping the cache behind its own mutex or on a single service thread.
#[derive(Debug, Default)]
pub struct AccessRuleCache {
    config: CacheConfig,
    refresh_tag: Option<Bytes>,
    rules: HashMap<RuleKey, ChannelAccess>,
    carrier_privileges: Vec<CarrierPrivilege>,
}

impl AccessRuleCache {
    /// Create an empty cache with the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty cache with the given configuration
    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Get the configuration
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Clear all rules and the refresh tag
    pub fn reset(&mut self) {
        self.refresh_tag = None;
        self.clear_cache();
    }

    /// Clear all rules, keeping the refresh tag
    pub fn clear_cache(&mut self) {
        self.rules.clear();
        self.carrier_privileges.clear();
    }

    /// Number of AID rules
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Carrier privilege rules, in insertion order
    pub fn carrier_privileges(&self) -> &[CarrierPrivilege] {
        &self.carrier_privileges
    }

    /// Check if the cache holds no rule at all
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.carrier_privileges.is_empty()
    }

    /// Add a raw rule to the cache, merging with any rule for the same key
    pub fn merge_ar_do(&mut self, rule: impl Into<RuleRef>, ar_do: &ArDo) {
        match rule.into() {
            RuleRef::CarrierPrivilege(carrier) => self.add_carrier_privilege(carrier),
            RuleRef::Access(key) => self.merge_access(key, ChannelAccess::from(ar_do)),
        }
    }

    /// Add a rule to the cache, merging with any rule for the same key
    ///
    /// Carrier privilege rules are appended to their own list and never
    /// merged. For AID rules, each access dimension is combined so that
    /// DENIED beats ALLOWED beats UNDEFINED.
    pub fn merge_rule(&mut self, rule: impl Into<RuleRef>, access: ChannelAccess) {
        match rule.into() {
            RuleRef::CarrierPrivilege(carrier) => self.add_carrier_privilege(carrier),
            RuleRef::Access(key) => self.merge_access(key, access),
        }
    }

    fn add_carrier_privilege(&mut self, carrier: CarrierPrivilege) {
        if self.config.log_rule_contents {
            debug!(rule = %carrier, "Add carrier privilege rule");
        }
        self.carrier_privileges.push(carrier);
    }

    fn merge_access(&mut self, key: RuleKey, incoming: ChannelAccess) {
        let key = key.normalized();
        let Some(existing) = self.rules.get_mut(&key) else {
            if self.config.log_rule_contents {
                debug!(rule = %key, access = %incoming, "Add access rule");
            }
            self.rules.insert(key, incoming);
            return;
        };

        if existing.access() != Access::Denied {
            match incoming.access() {
                Access::Denied => existing.set_access(Access::Denied, incoming.reason()),
                Access::Allowed => existing.set_access(Access::Allowed, ""),
                Access::Undefined => {}
            }
        }

        // NFC (NEVER) > NFC (ALWAYS) > no NFC attribute
        if existing.nfc_event_access() != Access::Denied {
            match incoming.nfc_event_access() {
                Access::Denied => existing.set_nfc_event_access(Access::Denied),
                Access::Allowed => existing.set_nfc_event_access(Access::Allowed),
                Access::Undefined => {}
            }
        }

        // APDU (NEVER) > APDU (filter) > APDU (ALWAYS) > no APDU attribute.
        // A filtered combination keeps APDU access undefined, the filters
        // themselves express the grant.
        if existing.apdu_access() != Access::Denied {
            if incoming.apdu_access() == Access::Denied {
                existing.set_apdu_access(Access::Denied);
            } else if !existing.uses_apdu_filter()
                && !incoming.uses_apdu_filter()
                && incoming.apdu_access() == Access::Allowed
            {
                existing.set_apdu_access(Access::Allowed);
            }
        }

        if existing.apdu_access() == Access::Denied {
            existing.clear_apdu_filters();
        } else if incoming.uses_apdu_filter() {
            trace!(rule = %key, added = incoming.apdu_filters().len(), "Combine APDU filters");
            existing.append_apdu_filters(incoming.apdu_filters());
        }

        if self.config.log_rule_contents {
            debug!(rule = %key, access = %existing, "Merged access rule");
        }
    }

    /// Find the access rule for an SE application and a device application
    ///
    /// # Arguments
    ///
    /// * `aid` - AID of the SE application, `None` or empty for the default applet
    /// * `cert_hashes` - Certificate hashes of the device application, end entity first
    ///
    /// # Returns
    ///
    /// A copy of the applicable rule with missing attributes resolved, or
    /// `None` if no rule applies. Callers must treat `None` as a denial, see
    /// [`resolve`](Self::resolve).
    pub fn find_access_rule<H: AsRef<[u8]>>(
        &self,
        aid: Option<&[u8]>,
        cert_hashes: &[H],
    ) -> Option<ChannelAccess> {
        let mut access = self.search(aid, cert_hashes)?;
        access.apply_missing_rule_defaults();
        Some(access)
    }

    /// Resolve the access decision, denying everything when no rule applies
    pub fn resolve<H: AsRef<[u8]>>(&self, aid: Option<&[u8]>, cert_hashes: &[H]) -> ChannelAccess {
        self.find_access_rule(aid, cert_hashes)
            .unwrap_or_else(|| ChannelAccess::denied(reason::NO_RULE_FOUND))
    }

    fn search<H: AsRef<[u8]>>(&self, aid: Option<&[u8]>, cert_hashes: &[H]) -> Option<ChannelAccess> {
        let aid_ref = AidRef::from_aid_with_default(aid, &self.config.default_applet_aid);

        if let Some(access) = self.lookup_hashes(SearchCase::A, &aid_ref, cert_hashes) {
            return Some(access);
        }
        if let Some(key) = self.find_specific_hash_rule(&aid_ref) {
            debug!(aid = %aid_ref, conflict = %key, "Conflict resolution case A, access NEVER");
            return Some(ChannelAccess::denied(reason::SPECIFIC_AID_OTHER_HASH));
        }

        let any_app = RuleKey::new(aid_ref.clone(), HashRef::AllDeviceApplications);
        if let Some(access) = self.lookup(SearchCase::B, &any_app) {
            return Some(access);
        }

        let all_aids = AidRef::AllSeApplications;
        if let Some(access) = self.lookup_hashes(SearchCase::C, &all_aids, cert_hashes) {
            return Some(access);
        }
        if let Some(key) = self.find_specific_hash_rule(&all_aids) {
            debug!(conflict = %key, "Conflict resolution case C, access NEVER");
            return Some(ChannelAccess::denied(reason::ALL_AID_OTHER_HASH));
        }

        let catch_all = RuleKey::new(all_aids, HashRef::AllDeviceApplications);
        if let Some(access) = self.lookup(SearchCase::D, &catch_all) {
            return Some(access);
        }

        debug!(aid = %aid_ref, "No access rule found");
        None
    }

    fn lookup_hashes<H: AsRef<[u8]>>(
        &self,
        case: SearchCase,
        aid_ref: &AidRef,
        cert_hashes: &[H],
    ) -> Option<ChannelAccess> {
        cert_hashes.iter().find_map(|hash| {
            let key = RuleKey::new(aid_ref.clone(), HashRef::from_slice(hash.as_ref()));
            self.lookup(case, &key)
        })
    }

    fn lookup(&self, case: SearchCase, key: &RuleKey) -> Option<ChannelAccess> {
        let access = self.rules.get(key)?;
        if self.config.log_rule_contents {
            debug!(?case, rule = %key, %access, "Access rule found");
        } else {
            trace!(?case, "Access rule found");
        }
        Some(access.clone())
    }

    /// Find a rule binding `aid_ref` to some specific device application
    fn find_specific_hash_rule(&self, aid_ref: &AidRef) -> Option<&RuleKey> {
        self.rules
            .keys()
            .find(|key| &key.aid == aid_ref && key.hash.is_specific())
    }

    /// Check if a carrier privilege rule grants privileges to a package
    ///
    /// Hashes are tried in order, each against every carrier privilege rule
    /// in insertion order.
    pub fn check_carrier_privilege<H: AsRef<[u8]>>(
        &self,
        package_name: &str,
        cert_hashes: &[H],
    ) -> bool {
        let granted = cert_hashes.iter().any(|hash| {
            let hash = HashRef::from_slice(hash.as_ref());
            self.carrier_privileges
                .iter()
                .any(|carrier| carrier.grants(package_name, &hash))
        });

        trace!(package = package_name, granted, "Carrier privilege check");
        granted
    }

    /// Get the refresh tag of the cached rule set
    pub const fn refresh_tag(&self) -> Option<&Bytes> {
        self.refresh_tag.as_ref()
    }

    /// Set the refresh tag of the cached rule set
    pub fn set_refresh_tag(&mut self, refresh_tag: Option<Bytes>) {
        self.refresh_tag = refresh_tag;
    }

    /// Check if the given refresh tag is equal to the last known one
    ///
    /// Always false if either tag is unknown.
    pub fn is_refresh_tag_equal(&self, refresh_tag: Option<&[u8]>) -> bool {
        match (&self.refresh_tag, refresh_tag) {
            (Some(current), Some(other)) => current.as_ref() == other,
            _ => false,
        }
    }

    /// Write a human readable dump of the cache
    pub fn dump<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        writeln!(out, "AccessRuleCache:")?;

        write!(out, "Current refresh tag is: ")?;
        match &self.refresh_tag {
            Some(tag) => {
                for byte in tag.iter() {
                    write!(out, "{byte:02X}:")?;
                }
            }
            None => write!(out, "<null>")?,
        }
        writeln!(out)?;

        writeln!(out, "Rules:")?;
        let mut rules: Vec<(String, &ChannelAccess)> = self
            .rules
            .iter()
            .map(|(key, access)| (key.to_string(), access))
            .collect();
        rules.sort_by(|a, b| a.0.cmp(&b.0));
        for (i, (key, access)) in rules.iter().enumerate() {
            writeln!(out, "rule {}: {} -> {}", i + 1, key, access)?;
        }
        writeln!(out)?;

        writeln!(out, "Carrier Privilege:")?;
        for (i, carrier) in self.carrier_privileges.iter().enumerate() {
            writeln!(out, "carrier privilege {}: {}", i + 1, carrier)?;
        }
        writeln!(out)
    }
}

impl fmt::Display for AccessRuleCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.dump(f)
    }
}
