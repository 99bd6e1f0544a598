//! # JERI Secure Endpoint Test Suite
//!
//! Flows that cross module boundaries: a caller negotiating through the
//! connection manager against a real listener, discovery feeding a provider
//! bridge, and pool reuse observed through the public API.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── fixtures.rs         # CA, realm, echo dispatcher, listener startup
//!     ├── tls_flows.rs        # TLS-style provider end to end
//!     ├── kerberos_flows.rs   # discovery -> Kerberos bridge -> pooled session
//!     ├── discovery_flows.rs  # address fallback and locator rejection
//!     └── pool_flows.rs       # reuse and single-flight through SecureEndpointApi
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p jeri-tests
//! cargo test -p jeri-tests integration::tls_flows
//! ```

pub mod integration;
