//! # Connection Lifecycle Manager
//!
//! Pools established sessions per `(endpoint, local principal)` and hands them
//! out as [`Lease`]s. A pooled session is reused only when the constraints it
//! was negotiated for cover every requirement of the new request; otherwise a
//! new session is negotiated. Concurrent requests for the same session share
//! one negotiation.
//!
//! ```text
//! Absent -> Connecting -> Established -> Expiring -> Closed
//!              |                                       ^
//!              +----------------(failure)--------------+
//! ```

mod config;
mod lease;
mod manager;

pub use config::ConnectionManagerConfig;
pub use lease::Lease;
pub use manager::{ConnectionManager, ConnectionManagerBuilder};

#[cfg(test)]
mod tests;
