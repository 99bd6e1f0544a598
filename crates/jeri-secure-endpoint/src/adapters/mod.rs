//! # Adapters
//!
//! Ready-made implementations of the driven ports plus configuration loading
//! and logging setup. Hosts with their own clock, credential store or policy
//! engine implement the traits in [`crate::ports`] instead.

pub mod config;
pub mod credentials;
pub mod kdc;
pub mod network;
pub mod permissions;
pub mod telemetry;
pub mod time;

pub use config::ConfigFile;
pub use credentials::InMemoryCredentialStore;
pub use kdc::InMemoryKdc;
pub use network::{StaticHostResolver, TcpSocketConnector, TokioHostResolver};
pub use permissions::{AllowAll, Grant, PolicyPermissionCheck};
pub use telemetry::{init_tracing, LoggingConfig};
pub use time::SystemTimeSource;
