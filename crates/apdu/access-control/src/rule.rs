//! Access rule references and raw rule descriptors
//!
//! A rule reference names which SE application ([`AidRef`]) and which device
//! application ([`HashRef`], optionally [`PackageRef`]) a rule applies to. The
//! raw descriptors ([`ArDo`]) carry the policy of one parsed rule object
//! before it is turned into a [`ChannelAccess`].

use std::fmt;

use bytes::Bytes;
use derive_more::{Deref, Display, From};
use tracing::warn;

use crate::{
    Error, Result,
    access::{Access, ChannelAccess},
    constants::{aid, reason},
    filter::ApduFilter,
};

/// Reference to one or more SE applications
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AidRef {
    /// A specific applet AID
    Specific(Bytes),
    /// The default selected applet
    DefaultApplication,
    /// Every SE application
    AllSeApplications,
}

impl AidRef {
    /// Create a reference for a specific AID
    ///
    /// An empty AID designates every SE application.
    pub fn specific(aid: impl Into<Bytes>) -> Self {
        Self::Specific(aid.into()).normalized()
    }

    /// Replace an empty specific AID by [`AidRef::AllSeApplications`]
    pub fn normalized(self) -> Self {
        match self {
            Self::Specific(aid) if aid.is_empty() => Self::AllSeApplications,
            other => other,
        }
    }

    /// Normalize a requested AID
    ///
    /// A missing or empty AID, or the reserved all-zero AID, designates the
    /// default applet.
    pub fn from_aid(aid: Option<&[u8]>) -> Self {
        Self::from_aid_with_default(aid, &aid::DEFAULT_APPLICATION)
    }

    pub(crate) fn from_aid_with_default(aid: Option<&[u8]>, default_aid: &[u8]) -> Self {
        match aid {
            None => Self::DefaultApplication,
            Some(aid) if aid.is_empty() || aid == default_aid => Self::DefaultApplication,
            Some(aid) => Self::Specific(Bytes::copy_from_slice(aid)),
        }
    }
}

impl fmt::Display for AidRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Specific(aid) => write!(f, "AID={}", hex::encode_upper(aid)),
            Self::DefaultApplication => write!(f, "AID=<default>"),
            Self::AllSeApplications => write!(f, "AID=<all>"),
        }
    }
}

/// Reference to one or more device applications by certificate hash
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashRef {
    /// A specific certificate hash
    Specific(Bytes),
    /// Every device application
    AllDeviceApplications,
}

impl HashRef {
    /// Create a reference from a certificate hash
    ///
    /// An empty hash designates every device application.
    pub fn new(hash: impl Into<Bytes>) -> Self {
        let hash = hash.into();
        if hash.is_empty() {
            Self::AllDeviceApplications
        } else {
            Self::Specific(hash)
        }
    }

    /// Create a reference from a borrowed certificate hash
    pub fn from_slice(hash: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(hash))
    }

    /// Check if this references a specific, non-empty hash
    pub fn is_specific(&self) -> bool {
        matches!(self, Self::Specific(hash) if !hash.is_empty())
    }

    /// Replace an empty specific hash by [`HashRef::AllDeviceApplications`]
    pub fn normalized(self) -> Self {
        match self {
            Self::Specific(hash) if hash.is_empty() => Self::AllDeviceApplications,
            other => other,
        }
    }
}

impl fmt::Display for HashRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Specific(hash) => write!(f, "hash={}", hex::encode_upper(hash)),
            Self::AllDeviceApplications => write!(f, "hash=<all>"),
        }
    }
}

/// Package name a carrier privilege rule is scoped to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, From, Deref)]
#[display("package={}", _0)]
pub struct PackageRef(String);

impl PackageRef {
    /// Create a new package reference
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the package name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PackageRef {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Lookup key of an AID access rule
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display)]
#[display("REF_DO [{}, {}]", aid, hash)]
pub struct RuleKey {
    /// SE application(s) the rule applies to
    pub aid: AidRef,
    /// Device application(s) the rule applies to
    pub hash: HashRef,
}

impl RuleKey {
    /// Create a new rule key
    pub const fn new(aid: AidRef, hash: HashRef) -> Self {
        Self { aid, hash }
    }

    /// Normalize both references so empty specific values key the same
    /// rule as their wildcard counterparts
    pub fn normalized(self) -> Self {
        Self::new(self.aid.normalized(), self.hash.normalized())
    }
}

/// Carrier privilege rule
///
/// Grants privileges to a device application by certificate hash, optionally
/// limited to one package, independently of any AID.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CarrierPrivilege {
    hash: HashRef,
    package: Option<PackageRef>,
}

impl CarrierPrivilege {
    /// Create a new carrier privilege rule
    ///
    /// The hash must reference a specific certificate.
    pub fn new(hash: HashRef, package: Option<PackageRef>) -> Result<Self> {
        if !hash.is_specific() {
            return Err(Error::MissingCarrierHash);
        }
        Ok(Self { hash, package })
    }

    /// Get the certificate hash reference
    pub const fn hash(&self) -> &HashRef {
        &self.hash
    }

    /// Get the package the rule is scoped to, if any
    pub const fn package(&self) -> Option<&PackageRef> {
        self.package.as_ref()
    }

    /// Check whether this rule grants privileges to a caller
    pub(crate) fn grants(&self, package_name: &str, hash: &HashRef) -> bool {
        if &self.hash != hash {
            return false;
        }
        self.package
            .as_ref()
            .is_none_or(|package| package.as_str() == package_name)
    }
}

impl fmt::Display for CarrierPrivilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.package {
            Some(package) => write!(f, "REF_DO [{}, {}]", self.hash, package),
            None => write!(f, "REF_DO [{}]", self.hash),
        }
    }
}

/// Reference part of one parsed rule object
#[derive(Debug, Clone, PartialEq, Eq, From)]
pub enum RuleRef {
    /// Rule taking part in AID resolution
    Access(RuleKey),
    /// Carrier privilege rule
    CarrierPrivilege(CarrierPrivilege),
}

impl RuleRef {
    /// Classify the parts of a parsed rule reference
    ///
    /// A package reference makes a carrier privilege rule whatever the AID. A
    /// reference without AID and without package is a carrier privilege rule
    /// for every package. Anything else is an AID rule.
    pub fn from_parts(
        aid: Option<AidRef>,
        hash: HashRef,
        package: Option<PackageRef>,
    ) -> Result<Self> {
        match (aid, package) {
            (Some(aid), None) => Ok(Self::Access(RuleKey::new(aid, hash))),
            (_, package) => CarrierPrivilege::new(hash, package).map(Self::CarrierPrivilege),
        }
    }

    /// Check if this is a carrier privilege rule
    pub const fn is_carrier_privilege(&self) -> bool {
        matches!(self, Self::CarrierPrivilege(_))
    }
}

impl fmt::Display for RuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Access(key) => fmt::Display::fmt(key, f),
            Self::CarrierPrivilege(carrier) => fmt::Display::fmt(carrier, f),
        }
    }
}

/// APDU policy of a raw rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApduArDo {
    /// APDU access is never allowed
    Never,
    /// APDU access is allowed for every command
    Always,
    /// APDU access is allowed for commands matching one of the filters
    Filtered(Vec<ApduFilter>),
}

impl ApduArDo {
    /// Build an "allowed" policy from separate header and mask lists
    ///
    /// Filters are only built when both lists are non-empty and of the same
    /// length. Otherwise the policy grants general APDU access.
    pub fn allowed_with_lists(headers: &[[u8; 4]], masks: &[[u8; 4]]) -> Self {
        if headers.is_empty() || masks.is_empty() {
            return Self::Always;
        }
        if headers.len() != masks.len() {
            warn!(
                headers = headers.len(),
                masks = masks.len(),
                "APDU filter header and mask lists differ in length, granting general access"
            );
            return Self::Always;
        }

        Self::Filtered(
            headers
                .iter()
                .zip(masks)
                .map(|(header, mask)| ApduFilter::new(*header, *mask))
                .collect(),
        )
    }
}

/// NFC event policy of a raw rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NfcArDo {
    /// NFC events are never dispatched
    Never,
    /// NFC events are always dispatched
    Always,
}

/// Access policy of one parsed rule object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArDo {
    /// APDU policy, if the rule carries one
    pub apdu: Option<ApduArDo>,
    /// NFC event policy, if the rule carries one
    pub nfc: Option<NfcArDo>,
}

impl ArDo {
    /// Create a new raw rule
    pub const fn new(apdu: Option<ApduArDo>, nfc: Option<NfcArDo>) -> Self {
        Self { apdu, nfc }
    }
}

impl From<&ArDo> for ChannelAccess {
    /// Missing attributes stay undefined here. They are resolved only once
    /// rule combination is done, see [`ChannelAccess::apply_missing_rule_defaults`].
    fn from(ar_do: &ArDo) -> Self {
        let mut access = Self::new();

        match &ar_do.apdu {
            Some(ApduArDo::Always) => {
                access.set_access(Access::Allowed, "");
                access.set_apdu_access(Access::Allowed);
            }
            Some(ApduArDo::Filtered(filters)) if !filters.is_empty() => {
                access.set_access(Access::Allowed, "");
                access.set_apdu_filters(filters.iter().copied());
            }
            Some(ApduArDo::Filtered(_)) => {
                access.set_access(Access::Allowed, "");
                access.set_apdu_access(Access::Allowed);
            }
            Some(ApduArDo::Never) => {
                access.set_access(Access::Denied, reason::APDU_NEVER);
                access.set_apdu_access(Access::Denied);
            }
            None => {}
        }

        match ar_do.nfc {
            Some(NfcArDo::Always) => access.set_nfc_event_access(Access::Allowed),
            Some(NfcArDo::Never) => access.set_nfc_event_access(Access::Denied),
            None => {}
        }

        access
    }
}

impl From<ArDo> for ChannelAccess {
    fn from(ar_do: ArDo) -> Self {
        Self::from(&ar_do)
    }
}
