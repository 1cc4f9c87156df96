//! Own-address resolution.
//!
//! Peers reach this pod directly, so the address written to the directory
//! must be one they can route to.

use std::net::{IpAddr, SocketAddr};

use async_trait::async_trait;
use tracing::debug;

use crate::error::RegistrarError;

/// Source of the address this process publishes.
#[async_trait]
pub trait AddressResolver: Send + Sync {
    async fn resolve(&self) -> Result<IpAddr, RegistrarError>;
}

/// Resolves the system hostname through the system resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostnameResolver;

#[async_trait]
impl AddressResolver for HostnameResolver {
    async fn resolve(&self) -> Result<IpAddr, RegistrarError> {
        let hostname = nix::unistd::gethostname()
            .map_err(|e| RegistrarError::ResolveFailed(format!("gethostname failed: {e}")))?
            .into_string()
            .map_err(|_| RegistrarError::ResolveFailed("hostname is not valid UTF-8".into()))?;

        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((hostname.as_str(), 0))
            .await
            .map_err(|e| RegistrarError::ResolveFailed(format!("{hostname}: {e}")))?
            .collect();
        debug!(%hostname, candidates = addrs.len(), "resolved hostname");

        pick_address(&addrs)
            .ok_or_else(|| RegistrarError::ResolveFailed(format!("{hostname}: no addresses")))
    }
}

/// Always returns the same address.
#[derive(Debug, Clone, Copy)]
pub struct StaticResolver(pub IpAddr);

#[async_trait]
impl AddressResolver for StaticResolver {
    async fn resolve(&self) -> Result<IpAddr, RegistrarError> {
        Ok(self.0)
    }
}

/// First IPv4 candidate, else the first candidate.
pub fn pick_address(addrs: &[SocketAddr]) -> Option<IpAddr> {
    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .map(SocketAddr::ip)
}

/// Reject addresses no peer could reach.
pub fn ensure_routable(ip: IpAddr) -> Result<IpAddr, RegistrarError> {
    if ip.is_loopback() || ip.is_unspecified() {
        return Err(RegistrarError::UnroutableAddress(ip));
    }
    Ok(ip)
}
