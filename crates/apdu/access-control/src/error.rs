//! Error type for access rule handling
//!
//! Resolution itself never fails: "no rule" is a normal outcome. Errors only
//! come from building rule data and from enforcing a resolved decision.

/// Result type for access control operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for access control operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Wrong data length
    #[error("Invalid length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Carrier privilege rule without a specific certificate hash
    #[error("Carrier privilege rule requires a specific certificate hash")]
    MissingCarrierHash,

    /// The resolved decision does not grant the requested access
    #[error("Access denied: {0}")]
    AccessDenied(String),
}

impl Error {
    /// Create a new access denied error
    pub fn denied<S: Into<String>>(reason: S) -> Self {
        Self::AccessDenied(reason.into())
    }
}
