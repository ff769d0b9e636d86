//! Host network address discovery, used by the Config Store's `get_access_ip` (spec.md §4.1)

use std::net::{IpAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use tracing::{debug, warn};

use crate::errors::{McsError, Result};

/// Curated list of public HTTP echo services queried in order; the first to
/// respond within the per-service timeout wins.
const PUBLIC_IP_SERVICES: &[&str] =
    &["https://api.ipify.org", "https://ifconfig.me/ip", "https://icanhazip.com"];

const PUBLIC_IP_TIMEOUT: Duration = Duration::from_secs(5);

/// First non-loopback IPv4 address of the host.
///
/// Uses the "connect a UDP socket, inspect the local address" trick rather
/// than enumerating interfaces, since it requires no extra dependency and
/// correctly follows the OS's own routing table to pick the outbound
/// interface.
pub fn local_ipv4() -> Result<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0")
        .map_err(|e| McsError::network(format!("binding probe socket: {e}")))?;
    // 203.0.113.0/24 is TEST-NET-3 (RFC 5737); nothing is actually sent.
    socket
        .connect("203.0.113.1:80")
        .map_err(|e| McsError::network(format!("probing local route: {e}")))?;
    let addr = socket.local_addr().map_err(|e| McsError::network(e.to_string()))?;
    Ok(addr.ip())
}

/// External IP via a short list of public HTTP echo services, each bounded
/// by a hard per-service timeout. Returns the first successful, trimmed
/// response; if every service fails, returns a `Network` error so the
/// caller can fall back to [`local_ipv4`] per spec.md §4.1.
pub async fn public_ip() -> Result<String> {
    let client = reqwest::Client::builder()
        .timeout(PUBLIC_IP_TIMEOUT)
        .build()
        .map_err(|e| McsError::internal(format!("building HTTP client: {e}")))?;

    for service in PUBLIC_IP_SERVICES {
        debug!(service, "querying public IP service");
        match client.get(*service).send().await {
            Ok(response) => match response.text().await {
                Ok(body) => {
                    let trimmed = body.trim();
                    if trimmed.parse::<IpAddr>().is_ok() {
                        return Ok(trimmed.to_string());
                    }
                    warn!(service, "response was not a valid IP, trying next service");
                }
                Err(e) => warn!(service, error = %e, "failed to read response body"),
            },
            Err(e) => warn!(service, error = %e, "public IP service request failed"),
        }
    }

    Err(McsError::network("all public IP lookup services failed"))
}

/// Resolve the remote HEAD of `host:port` purely for reachability checks used
/// by [`crate::repo`]'s pre-flight validation; not used for IP discovery.
pub fn is_reachable(host: &str, port: u16) -> bool {
    format!("{host}:{port}").to_socket_addrs().map(|mut i| i.next().is_some()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_ipv4_is_not_loopback() {
        let addr = local_ipv4().unwrap();
        assert!(!addr.is_loopback());
    }
}
