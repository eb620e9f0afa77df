//! Address resolution helpers shared by election, membership, and worker
//! bootstrap: best-effort local IP discovery and the hairpin-avoidance
//! substitution a worker applies when dialing the advertised master
//! address.

use std::net::IpAddr;
use std::time::Duration;

use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;

/// Best-effort local (non-loopback) IP this process would use to reach the
/// outside world. Falls back to loopback if nothing is routable -- this is
/// a single-process demo environment, not a production network stack.
pub async fn local_ip() -> IpAddr {
    if let Ok(sock) = UdpSocket::bind("0.0.0.0:0").await {
        if sock.connect("8.8.8.8:80").await.is_ok() {
            if let Ok(addr) = sock.local_addr() {
                return addr.ip();
            }
        }
    }
    IpAddr::from([127, 0, 0, 1])
}

/// Substitutes the local host for `advertised`'s host when it matches
/// `public_host`, avoiding a hairpin round-trip through NAT to reach a peer
/// colocated on the same machine or network.
#[must_use]
pub fn avoid_hairpin(advertised: &str, public_host: &str, local_host: &str) -> String {
    match advertised.rsplit_once(':') {
        Some((host, port)) if host == public_host => format!("{local_host}:{port}"),
        _ => advertised.to_string(),
    }
}

/// Opens a TCP connection to `addr`, bounded by `timeout_dur`. Used for
/// liveness probes and health checks; the caller never retries on failure.
pub async fn probe_tcp(addr: &str, timeout_dur: Duration) -> bool {
    matches!(timeout(timeout_dur, TcpStream::connect(addr)).await, Ok(Ok(_)))
}
