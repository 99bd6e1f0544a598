use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::debug;
use zeroize::Zeroizing;

use crate::domain::{HandshakeError, Principal, PrincipalType, Timestamp};
use crate::ports::{KeyDistributionCenter, TicketGrant};
use crate::providers::kerberos::{generate_key, Ticket};

/// Key distribution center holding every principal's long-term key in memory.
#[derive(Default)]
pub struct InMemoryKdc {
    keys: RwLock<HashMap<Principal, Zeroizing<[u8; 32]>>>,
    non_forwardable: RwLock<Vec<Principal>>,
}

impl InMemoryKdc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `principal` with a fresh key and return a copy of it.
    pub fn register(&self, principal: Principal) -> Zeroizing<[u8; 32]> {
        let key = generate_key();
        self.keys.write().insert(principal, key.clone());
        key
    }

    /// Register `principal` with a known key.
    pub fn register_with_key(&self, principal: Principal, key: Zeroizing<[u8; 32]>) {
        self.keys.write().insert(principal, key);
    }

    /// Tickets issued to `client` will not allow delegation.
    pub fn deny_forwarding(&self, client: Principal) {
        self.non_forwardable.write().push(client);
    }
}

impl KeyDistributionCenter for InMemoryKdc {
    fn issue_ticket(
        &self,
        client: &Principal,
        client_key: &[u8; 32],
        server: &Principal,
        now: Timestamp,
        lifetime: Duration,
    ) -> Result<TicketGrant, HandshakeError> {
        if client.kind() != PrincipalType::Kerberos || server.kind() != PrincipalType::Kerberos {
            return Err(HandshakeError::Credential(
                "tickets are issued to kerberos principals only".to_string(),
            ));
        }
        let keys = self.keys.read();
        match keys.get(client) {
            Some(known) if **known == *client_key => {}
            _ => {
                return Err(HandshakeError::Credential(format!(
                    "KDC does not recognize {client}"
                )))
            }
        }
        let server_key = keys
            .get(server)
            .ok_or_else(|| HandshakeError::Credential(format!("KDC does not know {server}")))?;

        let session_key = generate_key();
        let ticket = Ticket {
            client: client.clone(),
            server: server.clone(),
            session_key: *session_key,
            issued_at: now,
            expires_at: now.saturating_add(lifetime),
            forwardable: !self.non_forwardable.read().contains(client),
        };
        let sealed = ticket.seal(server_key)?;
        debug!(%client, %server, expires_at = %ticket.expires_at, "issued service ticket");

        Ok(TicketGrant {
            ticket: sealed,
            session_key,
            expires_at: ticket.expires_at,
        })
    }
}

impl std::fmt::Debug for InMemoryKdc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryKdc")
            .field("principals", &self.keys.read().len())
            .finish_non_exhaustive()
    }
}
