//! Native ICMP echo probe.
//!
//! Uses blocking sockets in spawn_blocking for sub-millisecond timing precision.
//! Any failure here (no raw socket capability, permission denied, timeout,
//! resolution failure) means "no ICMP result" and the caller falls back to TCP.

use std::io;
use std::mem::MaybeUninit;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;

use super::ProbeError;

const ICMP_ECHO_REQUEST: u8 = 8;
const ICMP_ECHO_REPLY: u8 = 0;
const ICMPV6_ECHO_REQUEST: u8 = 128;
const ICMPV6_ECHO_REPLY: u8 = 129;

/// Which kind of ICMP socket this process is allowed to open.
#[derive(Debug, Clone, Copy, PartialEq)]
enum IcmpCapability {
    /// RAW socket (CAP_NET_RAW or root)
    Raw,
    /// DGRAM "ping" socket (unprivileged, Linux ping_group_range or macOS)
    Datagram,
    Unavailable,
}

impl IcmpCapability {
    fn socket_type(self) -> Option<Type> {
        match self {
            IcmpCapability::Raw => Some(Type::RAW),
            IcmpCapability::Datagram => Some(Type::DGRAM),
            IcmpCapability::Unavailable => None,
        }
    }
}

static ICMP_CAPABILITY: OnceLock<IcmpCapability> = OnceLock::new();

/// Ping sequence counter for unique identification
static PING_SEQUENCE: AtomicU16 = AtomicU16::new(0);

#[derive(Error, Debug)]
enum IcmpError {
    #[error("no echo reply within {0:?}")]
    Timeout(Duration),
    #[error("ICMP not permitted: {0}")]
    PermissionDenied(io::Error),
    #[error("ICMP socket error: {0}")]
    Io(#[from] io::Error),
}

fn io_to_icmp_error(e: io::Error, timeout: Duration) -> IcmpError {
    match e.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => IcmpError::Timeout(timeout),
        io::ErrorKind::PermissionDenied => IcmpError::PermissionDenied(e),
        _ => IcmpError::Io(e),
    }
}

/// Generate a unique identifier for each ping request.
fn generate_ping_id() -> (u16, u16) {
    let identifier: u16 = rand::random();
    let sequence = PING_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    (identifier, sequence)
}

/// Detect ICMP capability by attempting to create a socket.
fn detect_icmp_capability() -> IcmpCapability {
    if Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4)).is_ok() {
        tracing::info!("ICMP probe: using RAW socket (privileged)");
        return IcmpCapability::Raw;
    }

    if Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::ICMPV4)).is_ok() {
        tracing::info!("ICMP probe: using DGRAM socket (unprivileged)");
        return IcmpCapability::Datagram;
    }

    tracing::info!("ICMP probe: no ICMP socket available, probes will use TCP only");
    IcmpCapability::Unavailable
}

/// Send one ICMP echo request and wait for the reply.
///
/// Returns the round-trip time in milliseconds, or `None` when ICMP gave no
/// answer for any reason. The whole attempt, name resolution included, is
/// bounded by `timeout`.
pub async fn icmp_probe(address: &str, timeout: Duration) -> Result<Option<f64>, ProbeError> {
    let capability = *ICMP_CAPABILITY.get_or_init(detect_icmp_capability);
    let Some(socket_type) = capability.socket_type() else {
        return Ok(None);
    };

    let deadline = Instant::now() + timeout;

    let ip = match tokio::time::timeout(timeout, resolve_address(address)).await {
        Ok(Some(ip)) => ip,
        Ok(None) | Err(_) => {
            tracing::debug!("ICMP probe: could not resolve {}", address);
            return Ok(None);
        }
    };

    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        return Ok(None);
    }

    let result = tokio::task::spawn_blocking(move || run_blocking_ping(ip, socket_type, remaining))
        .await
        .map_err(|e| ProbeError::Task(format!("ICMP task failed: {}", e)))?;

    match result {
        Ok(rtt) => Ok(Some(rtt.as_secs_f64() * 1000.0)),
        Err(e) => {
            tracing::debug!("ICMP probe to {} gave no result: {}", address, e);
            Ok(None)
        }
    }
}

/// Resolve hostname to IP address.
async fn resolve_address(address: &str) -> Option<IpAddr> {
    if let Ok(ip) = address.parse::<IpAddr>() {
        return Some(ip);
    }

    tokio::net::lookup_host((address, 0))
        .await
        .ok()?
        .next()
        .map(|sa| sa.ip())
}

/// Run blocking ICMP ping with precise timing.
/// This runs in a dedicated thread via spawn_blocking.
fn run_blocking_ping(ip: IpAddr, socket_type: Type, timeout: Duration) -> Result<Duration, IcmpError> {
    let (domain, protocol) = match ip {
        IpAddr::V4(_) => (Domain::IPV4, Protocol::ICMPV4),
        IpAddr::V6(_) => (Domain::IPV6, Protocol::ICMPV6),
    };

    let socket = Socket::new(domain, socket_type, Some(protocol))
        .map_err(|e| io_to_icmp_error(e, timeout))?;
    socket.set_write_timeout(Some(timeout))?;
    socket
        .connect(&SocketAddr::new(ip, 0).into())
        .map_err(|e| io_to_icmp_error(e, timeout))?;

    let (identifier, sequence) = generate_ping_id();
    let packet = match ip {
        IpAddr::V4(_) => build_icmp_echo_request(identifier, sequence),
        IpAddr::V6(_) => build_icmpv6_echo_request(identifier, sequence),
    };

    // The kernel rewrites the identifier on DGRAM sockets, so only the
    // sequence number can be matched there.
    let expected_id = (socket_type == Type::RAW).then_some(identifier);

    let start = Instant::now();
    let deadline = start + timeout;

    socket.send(&packet).map_err(|e| io_to_icmp_error(e, timeout))?;

    let mut buf = [MaybeUninit::<u8>::uninit(); 1500];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(IcmpError::Timeout(timeout));
        }
        socket.set_read_timeout(Some(remaining))?;

        let len = socket
            .recv(&mut buf)
            .map_err(|e| io_to_icmp_error(e, timeout))?;
        let elapsed = start.elapsed();

        // SAFETY: recv initialized `len` bytes
        let reply: &[u8] = unsafe { std::slice::from_raw_parts(buf.as_ptr() as *const u8, len) };

        if is_echo_reply(reply, ip.is_ipv6(), expected_id, sequence) {
            return Ok(elapsed);
        }
        // Someone else's packet, keep waiting for ours
    }
}

/// Check whether a received datagram is the echo reply we are waiting for.
fn is_echo_reply(buf: &[u8], ipv6: bool, expected_id: Option<u16>, sequence: u16) -> bool {
    let (offset, reply_type) = if ipv6 {
        (0, ICMPV6_ECHO_REPLY)
    } else if !buf.is_empty() && buf[0] >> 4 == 4 {
        // RAW IPv4 sockets deliver the IP header too
        (((buf[0] & 0x0F) as usize) * 4, ICMP_ECHO_REPLY)
    } else {
        (0, ICMP_ECHO_REPLY)
    };

    if buf.len() < offset + 8 {
        return false;
    }

    let icmp = &buf[offset..];
    let reply_id = u16::from_be_bytes([icmp[4], icmp[5]]);
    let reply_seq = u16::from_be_bytes([icmp[6], icmp[7]]);

    icmp[0] == reply_type
        && reply_seq == sequence
        && expected_id.map_or(true, |id| id == reply_id)
}

/// Build an ICMP Echo Request packet (type 8, code 0).
fn build_icmp_echo_request(identifier: u16, sequence: u16) -> Vec<u8> {
    let mut packet = echo_request(ICMP_ECHO_REQUEST, identifier, sequence);
    let checksum = icmp_checksum(&packet);
    packet[2..4].copy_from_slice(&checksum.to_be_bytes());
    packet
}

/// Build an ICMPv6 Echo Request packet (type 128, code 0).
///
/// The checksum covers a pseudo-header and is filled in by the kernel.
fn build_icmpv6_echo_request(identifier: u16, sequence: u16) -> Vec<u8> {
    echo_request(ICMPV6_ECHO_REQUEST, identifier, sequence)
}

fn echo_request(kind: u8, identifier: u16, sequence: u16) -> Vec<u8> {
    let mut packet = vec![0u8; 64]; // 8 byte header + 56 byte payload

    packet[0] = kind;
    packet[1] = 0;
    packet[4..6].copy_from_slice(&identifier.to_be_bytes());
    packet[6..8].copy_from_slice(&sequence.to_be_bytes());

    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    packet[8..16].copy_from_slice(&timestamp.to_be_bytes());

    packet
}

/// Compute ICMP checksum (RFC 1071).
fn icmp_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = data
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]) as u32,
            [hi] => (*hi as u32) << 8,
            _ => 0,
        })
        .sum();

    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !sum as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_verifies_to_zero() {
        let packet = build_icmp_echo_request(0x1234, 0x0001);
        // A packet including its own checksum sums to 0xFFFF, whose complement is 0.
        assert_eq!(icmp_checksum(&packet), 0);
    }

    #[test]
    fn test_checksum_odd_length() {
        assert_eq!(icmp_checksum(&[0x01]), !0x0100u16);
    }

    #[test]
    fn test_build_icmp_packet() {
        let packet = build_icmp_echo_request(0x1234, 0x0001);
        assert_eq!(packet.len(), 64);
        assert_eq!(packet[0], 8);
        assert_eq!(packet[1], 0);
        assert_eq!(packet[4..6], [0x12, 0x34]);
        assert_eq!(packet[6..8], [0x00, 0x01]);
    }

    #[test]
    fn test_build_icmpv6_packet() {
        let packet = build_icmpv6_echo_request(0xBEEF, 7);
        assert_eq!(packet[0], 128);
        assert_eq!(packet[2..4], [0, 0]);
        assert_eq!(packet[6..8], [0x00, 0x07]);
    }

    #[test]
    fn test_echo_reply_matching() {
        let mut reply = vec![0u8; 8];
        reply[4..6].copy_from_slice(&0x1234u16.to_be_bytes());
        reply[6..8].copy_from_slice(&5u16.to_be_bytes());

        assert!(is_echo_reply(&reply, false, Some(0x1234), 5));
        assert!(is_echo_reply(&reply, false, None, 5));
        assert!(!is_echo_reply(&reply, false, Some(0x9999), 5));
        assert!(!is_echo_reply(&reply, false, None, 6));

        // Echo request echoed back (type 8) is not a reply
        reply[0] = 8;
        assert!(!is_echo_reply(&reply, false, None, 5));
    }

    #[test]
    fn test_echo_reply_with_ip_header() {
        let mut packet = vec![0u8; 28];
        packet[0] = 0x45; // IPv4, 20-byte header
        packet[20] = ICMP_ECHO_REPLY;
        packet[24..26].copy_from_slice(&42u16.to_be_bytes());
        packet[26..28].copy_from_slice(&3u16.to_be_bytes());

        assert!(is_echo_reply(&packet, false, Some(42), 3));
        assert!(!is_echo_reply(&packet[..24], false, Some(42), 3));
    }

    #[test]
    fn test_echo_reply_v6() {
        let mut reply = vec![0u8; 8];
        reply[0] = ICMPV6_ECHO_REPLY;
        reply[6..8].copy_from_slice(&9u16.to_be_bytes());
        assert!(is_echo_reply(&reply, true, None, 9));
        assert!(!is_echo_reply(&reply, false, None, 9));
    }
}
