use crate::domain::{
    Constraint, ConstraintKind, ConstraintSet, Endpoint, NegotiationError, Principal,
    PrincipalType, ProviderTag,
};

use super::unicast::UnicastDiscoveryResult;

pub const TLS_DISCOVERY_FORMAT: &str = "net.jini.discovery.ssl";
pub const KERBEROS_DISCOVERY_FORMAT: &str = "net.jini.discovery.kerberos";

/// Builds a provider endpoint from a unicast discovery result.
pub trait DiscoveryBridge: Send + Sync {
    /// Discovery format name this bridge serves.
    fn format(&self) -> &'static str;

    fn provider(&self) -> ProviderTag;

    /// Endpoint at the discovered host and port carrying the peer principal
    /// the caller wants to reach.
    fn endpoint(
        &self,
        result: &UnicastDiscoveryResult,
        constraints: &ConstraintSet,
    ) -> Result<Endpoint, NegotiationError>;
}

/// Bridge for a discovery format name.
pub fn bridge_for_format(format: &str) -> Option<Box<dyn DiscoveryBridge>> {
    match format {
        TLS_DISCOVERY_FORMAT => Some(Box::new(TlsDiscoveryBridge)),
        KERBEROS_DISCOVERY_FORMAT => Some(Box::new(KerberosDiscoveryBridge)),
        _ => None,
    }
}

/// Peer principal of type `kind` named by `ServerMinPrincipal` constraints.
///
/// Requirements are consulted first and must name one principal of `kind`.
/// Without a requirement, the first preference naming a single principal of
/// `kind` wins. `Ok(None)` when neither names one.
pub fn select_peer_principal(
    constraints: &ConstraintSet,
    kind: PrincipalType,
) -> Result<Option<Principal>, NegotiationError> {
    if let Some(alternatives) = constraints.requirements().find(|c| {
        matches!(c, Constraint::Alternatives(elements)
            if elements.iter().any(|e| e.kind() == ConstraintKind::ServerMinPrincipal))
    }) {
        return Err(NegotiationError::unsupported(
            alternatives,
            "alternative server principals cannot name a discovery peer",
        ));
    }

    let mut required = constraints.requirements_of(ConstraintKind::ServerMinPrincipal);
    if let Some(first) = required.next() {
        if let Some(second) = required.next() {
            return Err(NegotiationError::unsupported(
                second,
                "more than one required server principal set",
            ));
        }
        let Constraint::ServerMinPrincipal(set) = first else {
            return Ok(None);
        };
        let mut principals = set.iter();
        let principal = principals.next();
        if principals.next().is_some() {
            return Err(NegotiationError::unsupported(
                first,
                "two different required server principals",
            ));
        }
        return match principal {
            Some(p) if p.kind() == kind => Ok(Some(p.clone())),
            Some(p) => Err(NegotiationError::unsupported(
                first,
                format!("{p} is not a {kind} principal"),
            )),
            None => Ok(None),
        };
    }

    Ok(constraints
        .preferences_of(ConstraintKind::ServerMinPrincipal)
        .find_map(|c| match c {
            Constraint::ServerMinPrincipal(set) if set.len() == 1 => {
                set.first().filter(|p| p.kind() == kind).cloned()
            }
            _ => None,
        }))
}

fn bound_endpoint(result: &UnicastDiscoveryResult, provider: ProviderTag) -> Endpoint {
    Endpoint::new(result.locator.host(), result.locator.port(), provider)
}

/// `net.jini.discovery.ssl`: the peer principal is optional; the handshake
/// verifies whatever the constraints require.
#[derive(Debug, Clone, Copy, Default)]
pub struct TlsDiscoveryBridge;

impl DiscoveryBridge for TlsDiscoveryBridge {
    fn format(&self) -> &'static str {
        TLS_DISCOVERY_FORMAT
    }

    fn provider(&self) -> ProviderTag {
        ProviderTag::TLS
    }

    fn endpoint(
        &self,
        result: &UnicastDiscoveryResult,
        constraints: &ConstraintSet,
    ) -> Result<Endpoint, NegotiationError> {
        let endpoint = bound_endpoint(result, ProviderTag::TLS);
        Ok(match select_peer_principal(constraints, PrincipalType::X500)? {
            Some(principal) => endpoint.with_server_principal(principal),
            None => endpoint,
        })
    }
}

/// `net.jini.discovery.kerberos`: a ticket is always for a named server, so
/// a peer principal is mandatory.
#[derive(Debug, Clone, Copy, Default)]
pub struct KerberosDiscoveryBridge;

impl DiscoveryBridge for KerberosDiscoveryBridge {
    fn format(&self) -> &'static str {
        KERBEROS_DISCOVERY_FORMAT
    }

    fn provider(&self) -> ProviderTag {
        ProviderTag::KERBEROS
    }

    fn endpoint(
        &self,
        result: &UnicastDiscoveryResult,
        constraints: &ConstraintSet,
    ) -> Result<Endpoint, NegotiationError> {
        let principal = select_peer_principal(constraints, PrincipalType::Kerberos)?
            .ok_or_else(|| NegotiationError::unsupported_reason("no usable peer principal"))?;
        Ok(bound_endpoint(result, ProviderTag::KERBEROS).with_server_principal(principal))
    }
}
