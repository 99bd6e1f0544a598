//! # TLS-Style Provider
//!
//! Certificate-authenticated sessions over rustls. Principals are X.500
//! distinguished names taken from certificate subjects. Peer chains are
//! verified against configured trust anchors; host names are not checked,
//! the required server principal is.
//!
//! ## Support matrix
//!
//! | Constraint                       | Supported                                  |
//! |----------------------------------|--------------------------------------------|
//! | Integrity / Confidentiality      | yes only (no null-encryption suites)       |
//! | ServerAuthentication             | yes only (no anonymous-server suites)      |
//! | ClientAuthentication             | yes and no                                 |
//! | Delegation                       | no; yes only for an anonymous client       |
//! | Client{Min,Max}Principal(Type)   | X.500 only                                 |
//! | ServerMinPrincipal               | a single X.500 principal                   |
//! | Connection{Absolute,Relative}Time| yes                                        |

mod config;
mod provider;
mod support;
mod verifier;

pub use config::TlsProviderConfig;
pub use provider::TlsProvider;
pub use verifier::subject_principal;

#[cfg(test)]
mod tests;
