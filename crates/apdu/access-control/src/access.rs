//! Channel access decisions
//!
//! A [`ChannelAccess`] bundles the outcome of access rule resolution for one
//! (AID, device application) pair: overall access, APDU access, NFC event
//! access and the APDU filters that narrow APDU access.

use std::fmt;

use derive_more::Display;

use crate::{
    Error, Result,
    constants::{filter::HEADER_LENGTH, reason},
    filter::ApduFilter,
};

/// Outcome of one access dimension
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display)]
pub enum Access {
    /// Access is granted
    #[display("ALLOWED")]
    Allowed,
    /// Access is refused
    #[display("DENIED")]
    Denied,
    /// No rule said anything about this dimension
    #[default]
    #[display("UNDEFINED")]
    Undefined,
}

impl Access {
    /// Check if access is granted
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Check if access is refused
    pub const fn is_denied(&self) -> bool {
        matches!(self, Self::Denied)
    }

    /// Check if no rule defined this dimension
    pub const fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }
}

/// Resolved access decision for one rule key
///
/// When APDU access is denied the decision never carries APDU filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelAccess {
    access: Access,
    reason: String,
    apdu_access: Access,
    nfc_event_access: Access,
    use_apdu_filter: bool,
    apdu_filters: Vec<ApduFilter>,
}

impl ChannelAccess {
    /// Create a decision with every dimension undefined
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a decision that denies everything
    pub fn denied<S: Into<String>>(reason: S) -> Self {
        let mut access = Self::new();
        access.set_access(Access::Denied, reason);
        access.set_apdu_access(Access::Denied);
        access.set_nfc_event_access(Access::Denied);
        access
    }

    /// Get the overall access
    pub const fn access(&self) -> Access {
        self.access
    }

    /// Get the reason attached to the overall access
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Set the overall access and its reason
    pub fn set_access<S: Into<String>>(&mut self, access: Access, reason: S) {
        self.access = access;
        self.reason = reason.into();
    }

    /// Get the APDU access
    pub const fn apdu_access(&self) -> Access {
        self.apdu_access
    }

    /// Set the APDU access
    ///
    /// Denying APDU access drops any APDU filter.
    pub fn set_apdu_access(&mut self, access: Access) {
        self.apdu_access = access;
        if access.is_denied() {
            self.clear_apdu_filters();
        }
    }

    /// Get the NFC event access
    pub const fn nfc_event_access(&self) -> Access {
        self.nfc_event_access
    }

    /// Set the NFC event access
    pub const fn set_nfc_event_access(&mut self, access: Access) {
        self.nfc_event_access = access;
    }

    /// Check if APDU access is narrowed by filters
    pub const fn uses_apdu_filter(&self) -> bool {
        self.use_apdu_filter
    }

    /// Get the APDU filters, in rule order
    pub fn apdu_filters(&self) -> &[ApduFilter] {
        &self.apdu_filters
    }

    /// Narrow APDU access to the given filters
    ///
    /// Ignored while APDU access is denied.
    pub fn set_apdu_filters(&mut self, filters: impl IntoIterator<Item = ApduFilter>) {
        if self.apdu_access.is_denied() {
            return;
        }
        self.use_apdu_filter = true;
        self.apdu_filters = filters.into_iter().collect();
    }

    /// Append filters to the existing ones, keeping order and duplicates
    pub(crate) fn append_apdu_filters(&mut self, filters: &[ApduFilter]) {
        if self.apdu_access.is_denied() {
            return;
        }
        self.use_apdu_filter = true;
        self.apdu_filters.extend_from_slice(filters);
    }

    /// Remove every APDU filter
    pub fn clear_apdu_filters(&mut self) {
        self.use_apdu_filter = false;
        self.apdu_filters.clear();
    }

    /// Resolve attributes that are still undefined after rule combination
    ///
    /// Without APDU access rule (and no filter) APDU access is never allowed.
    /// A missing NFC rule follows the APDU outcome, except that an APDU filter
    /// leaves NFC events allowed.
    pub fn apply_missing_rule_defaults(&mut self) {
        if self.apdu_access.is_undefined() && !self.use_apdu_filter {
            self.set_access(Access::Denied, reason::NO_APDU_RULE);
            self.set_apdu_access(Access::Denied);
        }

        if self.nfc_event_access.is_undefined() {
            self.nfc_event_access = if self.use_apdu_filter {
                Access::Allowed
            } else {
                self.apdu_access
            };
        }
    }

    /// Check that a command APDU may be sent under this decision
    ///
    /// # Arguments
    ///
    /// * `command` - The command APDU, or at least its four header bytes
    ///
    /// # Returns
    ///
    /// `Ok(())` if overall access is allowed and either a filter matches the
    /// command or, without filters, APDU access is allowed
    pub fn check_command(&self, command: &[u8]) -> Result<()> {
        if command.len() < HEADER_LENGTH {
            return Err(Error::InvalidLength {
                expected: HEADER_LENGTH,
                actual: command.len(),
            });
        }

        if !self.access.is_allowed() {
            return Err(Error::denied(self.denial_reason()));
        }

        // Filters narrow access even when ALWAYS was merged in
        if self.use_apdu_filter {
            if self.apdu_filters.iter().any(|f| f.matches(command)) {
                return Ok(());
            }
            return Err(Error::denied(reason::NO_FILTER_MATCH));
        }

        if self.apdu_access.is_allowed() {
            Ok(())
        } else {
            Err(Error::denied(self.denial_reason()))
        }
    }

    /// Check that NFC events may be dispatched under this decision
    pub fn check_nfc_event(&self) -> Result<()> {
        if self.nfc_event_access.is_allowed() {
            Ok(())
        } else {
            Err(Error::denied(reason::NFC_EVENT_DENIED))
        }
    }

    fn denial_reason(&self) -> String {
        if self.reason.is_empty() {
            format!("Access is {}, APDU access is {}", self.access, self.apdu_access)
        } else {
            self.reason.clone()
        }
    }
}

impl fmt::Display for ChannelAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ChannelAccess [access={}, reason={:?}, apdu={}, nfc={}",
            self.access, self.reason, self.apdu_access, self.nfc_event_access
        )?;
        if self.use_apdu_filter {
            let filters: Vec<String> = self.apdu_filters.iter().map(ToString::to_string).collect();
            write!(f, ", filters=[{}]", filters.join(", "))?;
        }
        write!(f, "]")
    }
}
