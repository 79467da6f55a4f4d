//! Host identifier parsing.

/// A parsed host identifier: an address plus an optional explicit port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostTarget {
    pub address: String,
    pub port: Option<u16>,
}

impl HostTarget {
    /// Parse `address` or `address:port`.
    ///
    /// Bracketed IPv6 (`[::1]:22`) is accepted. A bare IPv6 literal is taken
    /// as an address without a port. A non-numeric port is dropped and the
    /// address part kept, so the probe falls back to the default port list.
    pub fn parse(host: &str) -> Self {
        let host = host.trim();

        if let Some(rest) = host.strip_prefix('[') {
            if let Some((addr, tail)) = rest.split_once(']') {
                let port = tail.strip_prefix(':').and_then(|p| parse_port(host, p));
                return Self {
                    address: addr.to_string(),
                    port,
                };
            }
        }

        match host.rsplit_once(':') {
            // More than one colon without brackets: an IPv6 literal.
            Some((addr, _)) if addr.contains(':') => Self {
                address: host.to_string(),
                port: None,
            },
            Some((addr, port)) if !addr.is_empty() => Self {
                address: addr.to_string(),
                port: parse_port(host, port),
            },
            _ => Self {
                address: host.to_string(),
                port: None,
            },
        }
    }
}

fn parse_port(host: &str, port: &str) -> Option<u16> {
    match port.parse::<u16>() {
        Ok(p) if p > 0 => Some(p),
        _ => {
            tracing::debug!("Ignoring invalid port in host {:?}, using default ports", host);
            None
        }
    }
}
