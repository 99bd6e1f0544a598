//! Cross-module integration flows.

#[cfg(test)]
mod fixtures;

#[cfg(test)]
mod discovery_flows;
#[cfg(test)]
mod kerberos_flows;
#[cfg(test)]
mod pool_flows;
#[cfg(test)]
mod tls_flows;
