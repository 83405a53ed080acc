//! TCP/UDP reachability probes for service re-verification: closed,
//! refused, and filtered all collapse to `Closed` — a stale service only
//! needs to know whether it's still there, not why it isn't.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::net::{TcpStream, UdpSocket};
use tracing::instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceVerdict {
    Active,
    Closed,
}

#[instrument]
pub async fn verify_tcp_service(ip: IpAddr, port: u16, timeout: Duration) -> ServiceVerdict {
    let addr = SocketAddr::new(ip, port);
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_)) => ServiceVerdict::Active,
        Ok(Err(_)) | Err(_) => ServiceVerdict::Closed,
    }
}

/// UDP has no handshake: an ICMP port-unreachable reply (surfaced as a send
/// or recv error on a connected socket) means closed; anything else
/// (a reply, or silence until the timeout) is treated as active, since a
/// silently-dropping UDP service is indistinguishable from an open one
/// without an application-specific probe.
#[instrument]
pub async fn verify_udp_service(ip: IpAddr, port: u16, timeout: Duration) -> ServiceVerdict {
    let local: SocketAddr = if ip.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" }.parse().unwrap();
    let socket = match UdpSocket::bind(local).await {
        Ok(s) => s,
        Err(_) => return ServiceVerdict::Closed,
    };
    if socket.connect(SocketAddr::new(ip, port)).await.is_err() {
        return ServiceVerdict::Closed;
    }
    if socket.send(&[]).await.is_err() {
        return ServiceVerdict::Closed;
    }

    let mut buf = [0u8; 1];
    match tokio::time::timeout(timeout, socket.recv(&mut buf)).await {
        Ok(Err(_)) => ServiceVerdict::Closed,
        Ok(Ok(_)) | Err(_) => ServiceVerdict::Active,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn open_tcp_port_is_active() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });
        let verdict = verify_tcp_service(addr.ip(), addr.port(), Duration::from_secs(2)).await;
        assert_eq!(verdict, ServiceVerdict::Active);
    }

    #[tokio::test]
    async fn connection_refused_is_closed() {
        // Bind then drop immediately so nothing listens on this port.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let verdict = verify_tcp_service(addr.ip(), addr.port(), Duration::from_secs(2)).await;
        assert_eq!(verdict, ServiceVerdict::Closed);
    }
}
