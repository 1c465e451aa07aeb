//! Host network facts exposed to service templates.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};

use tracing::debug;

/// Address used only to pick the outbound interface. Connecting a UDP
/// socket sends no packets.
const ROUTE_PROBE: &str = "8.8.8.8:80";

/// The address this host uses to reach the local network.
///
/// Falls back to `127.0.0.1` when there is no route.
pub fn lan_ip() -> IpAddr {
    let discovered = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .and_then(|socket| {
            socket.connect(ROUTE_PROBE)?;
            socket.local_addr()
        })
        .map(|addr| addr.ip());

    match discovered {
        Ok(ip) if !ip.is_unspecified() => ip,
        Ok(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
        Err(e) => {
            debug!(error = %e, "No LAN route, using loopback");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

/// Values for the built-in template variables.
pub fn builtins() -> BTreeMap<String, String> {
    BTreeMap::from([("lan_ip".to_string(), lan_ip().to_string())])
}
