use core::fmt;
use std::error::Error;
use std::fmt::Display;

use crate::store::{LeaseId, MemberId};

/// Failure reported by the consensus store client.
#[derive(Clone, Debug, Eq, PartialEq, Display)]
pub enum StoreError {
    /// The request did not complete in time. Its outcome is unknown.
    #[display(fmt = "Store request timed out: {}", _0)]
    Timeout(String),

    /// The store cannot be reached.
    #[display(fmt = "Store unavailable: {}", _0)]
    Unavailable(String),

    #[display(fmt = "Lease {} not found", _0)]
    LeaseNotFound(LeaseId),

    #[display(fmt = "Member {} not found", _0)]
    MemberNotFound(MemberId),

    /// The calling process itself is no longer a cluster member.
    #[display(fmt = "Member {} was removed from the cluster", _0)]
    MemberRemoved(MemberId),
}

impl StoreError {
    /// Transient errors are retried with backoff and never escalate while retries continue.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Timeout(_) | StoreError::Unavailable(_))
    }
}

impl Error for StoreError {}

/// Failure of a membership operation.
#[derive(Clone, Debug, Eq, PartialEq, Display)]
pub enum MembershipError {
    /// No member with this name exists (or it was removed concurrently).
    #[display(fmt = "not found, member: {}", _0)]
    NotFound(String),

    #[display(fmt = "{}", _0)]
    Store(StoreError),
}

impl Error for MembershipError {}

impl From<StoreError> for MembershipError {
    fn from(err: StoreError) -> Self {
        MembershipError::Store(err)
    }
}

/// Fatal error surfaced to the owner of the process: invalid configuration
/// or a store that cannot be reached at startup.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CoordinatorError {
    text: String,
    cause: String,
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;

pub fn new_err<T>(text: String, cause: String) -> Result<T> {
    Err(CoordinatorError { text, cause })
}

impl CoordinatorError {
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl Display for CoordinatorError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let cause_word = {
            if !self.cause.is_empty() {
                " Cause: ".to_string()
            } else {
                String::new()
            }
        };
        write!(f, "{}.{}{}", self.text, cause_word, self.cause)
    }
}

impl Error for CoordinatorError {}
