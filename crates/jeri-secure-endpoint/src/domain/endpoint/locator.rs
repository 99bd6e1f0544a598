use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::Ipv6Addr;
use std::str::FromStr;

use super::types::write_host_port;
use crate::domain::errors::LocatorError;

/// Port used when a locator names none.
pub const DEFAULT_DISCOVERY_PORT: u16 = 4160;

const SCHEME: &str = "jini";

/// Address of a lookup service: `jini://host[:port]/`.
///
/// Hosts compare case-insensitively. IPv6 literals are held without brackets
/// and bracketed again when displayed.
#[derive(Debug, Clone)]
pub struct LookupLocator {
    host: String,
    port: u16,
}

impl LookupLocator {
    /// Locator for a host and port. Port 0 is rejected.
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, LocatorError> {
        let host = host.into();
        let host = match host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
            Some(inner) => parse_ipv6_literal(inner)?,
            None => validate_host(&host)?,
        };
        if port == 0 {
            return Err(LocatorError::PortOutOfRange(0));
        }
        Ok(Self { host, port })
    }

    /// Parse a `jini://host[:port]/` URL.
    ///
    /// Scheme is case-insensitive. Opaque forms, user info, paths other than
    /// `/`, queries and fragments are rejected, as is any port outside 1..=65535.
    pub fn parse(url: &str) -> Result<Self, LocatorError> {
        let (scheme, rest) = url
            .split_once(':')
            .ok_or_else(|| LocatorError::Malformed(url.to_string()))?;
        if scheme.is_empty()
            || !scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        {
            return Err(LocatorError::Malformed(url.to_string()));
        }
        if !scheme.eq_ignore_ascii_case(SCHEME) {
            return Err(LocatorError::UnsupportedScheme(scheme.to_string()));
        }
        let rest = rest.strip_prefix("//").ok_or(LocatorError::Opaque)?;

        let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
        let (authority, tail) = rest.split_at(authority_end);

        if let Some(fragment_at) = tail.find('#') {
            if tail[..fragment_at].contains('?') {
                return Err(LocatorError::Query);
            }
            return Err(LocatorError::Fragment);
        }
        if tail.contains('?') {
            return Err(LocatorError::Query);
        }
        if !tail.is_empty() && tail != "/" {
            return Err(LocatorError::Path(tail.to_string()));
        }

        if authority.contains('@') {
            return Err(LocatorError::UserInfo);
        }

        let (host, port) = split_authority(authority)?;
        Ok(Self { host, port })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

fn split_authority(authority: &str) -> Result<(String, u16), LocatorError> {
    let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
        let (inner, after) = bracketed
            .split_once(']')
            .ok_or_else(|| LocatorError::InvalidHost(authority.to_string()))?;
        let port = match after {
            "" => None,
            _ => Some(
                after
                    .strip_prefix(':')
                    .ok_or_else(|| LocatorError::InvalidHost(authority.to_string()))?,
            ),
        };
        (parse_ipv6_literal(inner)?, port)
    } else {
        match authority.split_once(':') {
            Some((host, port)) => (validate_host(host)?, Some(port)),
            None => (validate_host(authority)?, None),
        }
    };

    let port = match port {
        None | Some("") => DEFAULT_DISCOVERY_PORT,
        Some(digits) => parse_port(digits)?,
    };
    Ok((host, port))
}

fn parse_port(digits: &str) -> Result<u16, LocatorError> {
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(LocatorError::InvalidPort(digits.to_string()));
    }
    let value = digits
        .parse::<u64>()
        .map_err(|_| LocatorError::PortOutOfRange(u64::MAX))?;
    match u16::try_from(value) {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(LocatorError::PortOutOfRange(value)),
    }
}

fn parse_ipv6_literal(inner: &str) -> Result<String, LocatorError> {
    Ipv6Addr::from_str(inner)
        .map(|_| inner.to_string())
        .map_err(|_| LocatorError::InvalidHost(inner.to_string()))
}

fn validate_host(host: &str) -> Result<String, LocatorError> {
    if host.is_empty() {
        return Err(LocatorError::MissingHost);
    }
    if !host
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_'))
    {
        return Err(LocatorError::InvalidHost(host.to_string()));
    }
    Ok(host.to_string())
}

impl FromStr for LookupLocator {
    type Err = LocatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl PartialEq for LookupLocator {
    fn eq(&self, other: &Self) -> bool {
        self.port == other.port && self.host.eq_ignore_ascii_case(&other.host)
    }
}

impl Eq for LookupLocator {}

impl Hash for LookupLocator {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.to_ascii_lowercase().hash(state);
        self.port.hash(state);
    }
}

impl fmt::Display for LookupLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}://")?;
        write_host_port(f, &self.host, self.port)?;
        f.write_str("/")
    }
}
