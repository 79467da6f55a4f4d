//! TCP connect probe.

use std::time::{Duration, Instant};
use tokio::net::TcpStream;

/// Attempt a TCP handshake with `address:port`.
///
/// Returns the connect time in milliseconds, or `None` if the connection was
/// refused, failed, or did not complete within `timeout`. Name resolution
/// counts against the timeout.
pub async fn tcp_probe(address: &str, port: u16, timeout: Duration) -> Option<f64> {
    let start = Instant::now();

    match tokio::time::timeout(timeout, TcpStream::connect((address, port))).await {
        Ok(Ok(stream)) => {
            let elapsed = start.elapsed();
            drop(stream);
            Some(elapsed.as_secs_f64() * 1000.0)
        }
        Ok(Err(e)) => {
            tracing::debug!("TCP probe {}:{} failed: {}", address, port, e);
            None
        }
        Err(_) => {
            tracing::debug!("TCP probe {}:{} timed out after {:?}", address, port, timeout);
            None
        }
    }
}

/// Try each port in order and return the first that accepts a connection.
pub async fn tcp_probe_ports(address: &str, ports: &[u16], timeout: Duration) -> Option<(u16, f64)> {
    for &port in ports {
        if let Some(latency) = tcp_probe(address, port, timeout).await {
            return Some((port, latency));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_connect_to_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let latency = tcp_probe("127.0.0.1", port, Duration::from_secs(2)).await;
        assert!(latency.is_some());
        assert!(latency.unwrap() >= 0.0);
    }

    #[tokio::test]
    async fn test_refused_port() {
        let port = closed_port().await;
        assert!(tcp_probe("127.0.0.1", port, Duration::from_secs(2)).await.is_none());
    }

    #[tokio::test]
    async fn test_ports_tried_in_order() {
        let closed = closed_port().await;
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().port();

        let hit = tcp_probe_ports("127.0.0.1", &[closed, open], Duration::from_secs(2)).await;
        assert_eq!(hit.map(|(p, _)| p), Some(open));

        let miss = tcp_probe_ports("127.0.0.1", &[closed], Duration::from_secs(2)).await;
        assert!(miss.is_none());
    }
}
