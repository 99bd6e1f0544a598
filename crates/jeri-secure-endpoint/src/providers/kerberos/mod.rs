//! # Kerberos-Style Provider
//!
//! Ticket-authenticated sessions. A key distribution center issues the client a
//! ticket sealed under the server's long-term key; the client proves possession
//! of the session key inside it with a fresh authenticator (AP-REQ) and the
//! server answers with the authenticator timestamp (AP-REP), which gives mutual
//! authentication. Requests then travel over a [`KerberosChannel`] sealed or
//! MACed under the session key.
//!
//! ## Support matrix
//!
//! | Constraint                        | Supported                                 |
//! |-----------------------------------|-------------------------------------------|
//! | Client/ServerAuthentication       | yes only                                  |
//! | Integrity                         | yes only                                  |
//! | Confidentiality                   | per configured mechanisms                 |
//! | Delegation                        | yes and no                                |
//! | Client/ServerMinPrincipal         | exactly one Kerberos principal            |
//! | ClientMaxPrincipal, MinPrincipalType | Kerberos only                          |
//! | Connection{Absolute,Relative}Time | yes                                       |

mod channel;
mod config;
mod exchange;
mod provider;
mod replay;
mod support;
mod ticket;

pub use channel::KerberosChannel;
pub use config::{KerberosProviderConfig, Mechanism};
pub use provider::KerberosProvider;
pub use replay::ReplayCache;
pub use ticket::{generate_key, Ticket};
