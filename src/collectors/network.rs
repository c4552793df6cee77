use crate::provider::MetricsProvider;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tracing::warn;

pub const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkInfo {
    pub ip_address: IpAddr,
}

pub fn resolve_network(provider: &mut dyn MetricsProvider, target: SocketAddr) -> NetworkInfo {
    let ip_address = match provider.outbound_local_addr(target) {
        Ok(ip) if !ip.is_unspecified() => ip,
        Ok(ip) => {
            warn!(%target, %ip, "маршрут не выбрал локальный адрес, используется 127.0.0.1");
            LOOPBACK
        }
        Err(err) => {
            warn!(%target, error = %err, "не удалось определить IP-адрес, используется 127.0.0.1");
            LOOPBACK
        }
    };
    NetworkInfo { ip_address }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::fake::FakeProvider;
    use crate::provider::SysinfoProvider;
    use std::io::ErrorKind;

    fn target() -> SocketAddr {
        "8.8.8.8:80".parse().unwrap()
    }

    #[test]
    fn routed_address_is_reported() {
        let mut provider = FakeProvider::default();
        let info = resolve_network(&mut provider, target());
        assert_eq!(info.ip_address.to_string(), "192.168.1.20");
    }

    #[test]
    fn no_route_falls_back_to_loopback() {
        let mut provider = FakeProvider {
            route: Err(ErrorKind::AddrNotAvailable),
            ..FakeProvider::default()
        };
        let info = resolve_network(&mut provider, target());
        assert_eq!(info.ip_address.to_string(), "127.0.0.1");
    }

    #[test]
    fn unspecified_address_falls_back_to_loopback() {
        let mut provider = FakeProvider {
            route: Ok(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            ..FakeProvider::default()
        };
        let info = resolve_network(&mut provider, target());
        assert_eq!(info.ip_address, LOOPBACK);
    }

    #[test]
    fn real_socket_with_unroutable_family_falls_back() {
        let mut provider = SysinfoProvider::new();
        let v6: SocketAddr = "[::1]:80".parse().unwrap();
        let info = resolve_network(&mut provider, v6);
        assert_eq!(info.ip_address.to_string(), "127.0.0.1");
    }
}
