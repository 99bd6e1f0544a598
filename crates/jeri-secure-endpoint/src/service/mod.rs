//! # Service Layer
//!
//! Stateful orchestration on top of the domain and the providers:
//!
//! - [`credential_selector`]: sticky local identity selection.
//! - [`connection_manager`]: pooled client connections with single-flight
//!   negotiation and a background reaper.
//! - [`listener`]: server-side accept loop.

pub mod connection_manager;
pub mod credential_selector;
pub mod listener;

pub use connection_manager::{
    ConnectionManager, ConnectionManagerBuilder, ConnectionManagerConfig, Lease,
};
pub use credential_selector::CredentialSelector;
pub use listener::{InboundContext, Listener, ListenerHandle};
