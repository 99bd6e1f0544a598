//! # Credentials
//!
//! Credential entries as held by an external, read-only store, and the pure
//! selection rule that picks a local identity for a connect, listen or accept.
//!
//! ## Selection rule
//!
//! 1. Candidates are entries of the provider's principal type whose validity
//!    window contains now.
//! 2. An exact required principal selects only that entry. Absent or expired
//!    is `UnsupportedConstraint`; refused by the permission check is
//!    `PermissionDenied`.
//! 3. Otherwise candidates are stable-sorted by principal name and the first
//!    one the permission check allows wins. A previous (sticky) choice is kept
//!    while it is still a usable candidate.
//! 4. No usable candidate: `UnsupportedConstraint("no usable principal")` if
//!    authentication is required, anonymous otherwise.

mod selector;
mod types;

pub use selector::{select_identity, SelectionCriteria};
pub use types::{
    AuthAction, AuthNeed, CredentialEntry, CredentialMaterial, NegotiatedIdentity, Role,
    ValidityWindow,
};
