//! Discovery of the local address the device should call back on.

use std::net::{IpAddr, SocketAddr, UdpSocket};

use crate::error::{EventsError, Result};

/// Finds the local IP address that is reachable from the remote device.
///
/// The session asks once per startup, after the receiver is bound and before
/// the handshake. An error aborts startup.
pub trait LocalAddressResolver: Send + Sync + 'static {
    fn resolve(&self, device_host: &str) -> Result<IpAddr>;
}

/// Resolves the outbound interface address by "connecting" a UDP socket.
///
/// No datagram is sent; the OS only picks the route. By default the probe
/// targets the device itself, so the address chosen is the one on the device's
/// network. Use [`UdpProbe::via`] to probe a fixed target instead.
#[derive(Debug, Clone, Default)]
pub struct UdpProbe {
    target: Option<String>,
}

impl UdpProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe a fixed `host:port` instead of the device.
    pub fn via(target: impl Into<String>) -> Self {
        Self {
            target: Some(target.into()),
        }
    }

    fn probe(target: &str) -> std::io::Result<IpAddr> {
        let bind = if target.starts_with('[') { "[::]:0" } else { "0.0.0.0:0" };
        let socket = UdpSocket::bind(bind)?;
        socket.connect(target)?;
        Ok(socket.local_addr()?.ip())
    }
}

impl LocalAddressResolver for UdpProbe {
    fn resolve(&self, device_host: &str) -> Result<IpAddr> {
        let target = match &self.target {
            Some(target) => target.clone(),
            // The port is irrelevant, nothing is sent
            None => match device_host.parse::<IpAddr>() {
                Ok(ip) => SocketAddr::new(ip, 1400).to_string(),
                Err(_) => format!("{}:1400", device_host),
            },
        };

        let ip = Self::probe(&target).map_err(|e| {
            EventsError::Transport(format!(
                "Failed to determine local address towards {}: {}",
                target, e
            ))
        })?;

        if ip.is_unspecified() {
            return Err(EventsError::Transport(format!(
                "No route towards {} to determine local address",
                target
            )));
        }

        tracing::debug!(%ip, target = %target, "Detected local address");
        Ok(ip)
    }
}

/// Always returns the same address.
#[derive(Debug, Clone, Copy)]
pub struct FixedAddress(pub IpAddr);

impl LocalAddressResolver for FixedAddress {
    fn resolve(&self, _device_host: &str) -> Result<IpAddr> {
        Ok(self.0)
    }
}

impl<F> LocalAddressResolver for F
where
    F: Fn(&str) -> Result<IpAddr> + Send + Sync + 'static,
{
    fn resolve(&self, device_host: &str) -> Result<IpAddr> {
        self(device_host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_fixed_address() {
        let ip = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 50));
        assert_eq!(FixedAddress(ip).resolve("192.168.1.100").unwrap(), ip);
    }

    #[test]
    fn test_probe_towards_loopback_is_loopback() {
        let ip = UdpProbe::new().resolve("127.0.0.1").unwrap();
        assert!(ip.is_loopback());
    }

    #[test]
    fn test_probe_invalid_host_is_transport_error() {
        let result = UdpProbe::new().resolve("not a host name");
        assert!(matches!(result, Err(EventsError::Transport(_))));
    }

    #[test]
    fn test_closure_resolver() {
        let resolver = |_: &str| -> Result<IpAddr> {
            Err(EventsError::Transport("no interfaces".to_string()))
        };
        assert!(resolver.resolve("10.0.0.2").is_err());
    }
}
