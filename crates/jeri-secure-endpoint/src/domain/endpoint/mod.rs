//! # Endpoints
//!
//! Immutable values naming a transport target: client-side [`Endpoint`],
//! server-side [`ListenEndpoint`], and the `jini://host[:port]/`
//! [`LookupLocator`] used for unicast discovery.
//!
//! Endpoint equality is by value including the provider tag, so pooled
//! connections are never shared across providers.

mod locator;
mod types;

pub use locator::{LookupLocator, DEFAULT_DISCOVERY_PORT};
pub use types::{Endpoint, ListenEndpoint, ProviderTag, SocketFactoryId};
