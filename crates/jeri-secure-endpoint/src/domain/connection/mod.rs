//! # Connection Lifecycle
//!
//! Pure bookkeeping for pooled connections: the state machine, the pool key and
//! the properties an established session actually provides.
//!
//! ```text
//! Absent -> Connecting -> Established -> Expiring -> Closed
//!               |                            ^
//!               +--> (failure) Absent        |
//!                    Established --(I/O failure)--> Closed
//! ```
//!
//! `Established` moves to `Expiring` when the session bound is reached or the
//! backing credential stops being valid. `Expiring` connections take no new
//! requests and close once their in-flight requests finish.

mod session;
mod state;

pub use session::SessionProperties;
pub use state::{ConnectionId, ConnectionRecord, ConnectionState, PoolKey, RetireReason};
