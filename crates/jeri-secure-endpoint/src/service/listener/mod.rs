//! # Listener
//!
//! Accept loop for a [`ListenEndpoint`]. Every inbound socket gets a freshly
//! selected local credential, the provider's server handshake and an accept
//! permission check before it reaches the [`RequestDispatcher`].
//!
//! Server-side sessions are closed at their session bound so clients
//! renegotiate with current credentials.
//!
//! [`ListenEndpoint`]: crate::domain::ListenEndpoint
//! [`RequestDispatcher`]: crate::ports::RequestDispatcher

mod listener;

pub use listener::{InboundContext, Listener, ListenerHandle};
