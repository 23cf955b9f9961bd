use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub const PLAIN_SERVERS: &[&str] = &[
    "1.1.1.1:53",
    "1.0.0.1:53",
    "8.8.8.8:53",
    "8.8.4.4:53",
    "9.9.9.9:53",
];

pub const TLS_SERVERS: &[&str] = &["1.1.1.1:853", "1.0.0.1:853", "8.8.8.8:853", "8.8.4.4:853"];

pub const QUERIES: &[&str] = &[
    "www.google.com",
    "www.youtube.com",
    "www.facebook.com",
    "www.duckduckgo.com",
    "golang.org",
    "www.github.com",
];

/// Network carrier for a DNS query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Udp,
    Tcp,
    Tls,
}

impl Transport {
    /// Label used on the progress line and in diagnostics
    pub fn as_str(self) -> &'static str {
        match self {
            Transport::Udp => "udp",
            Transport::Tcp => "tcp",
            Transport::Tls => "tcp-tls",
        }
    }

    pub fn default_servers(self) -> &'static [&'static str] {
        match self {
            Transport::Udp | Transport::Tcp => PLAIN_SERVERS,
            Transport::Tls => TLS_SERVERS,
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One transport's full set of probes: every server crossed with every query
#[derive(Debug, Clone)]
pub struct Sweep {
    pub transport: Transport,
    pub servers: Arc<[String]>,
    pub queries: Arc<[String]>,
    pub timeout: Duration,
}

impl Sweep {
    pub fn new(
        transport: Transport,
        servers: impl Into<Arc<[String]>>,
        queries: impl Into<Arc<[String]>>,
        timeout: Duration,
    ) -> Self {
        Sweep {
            transport,
            servers: servers.into(),
            queries: queries.into(),
            timeout,
        }
    }

    /// Sweep against the built-in resolver and query lists
    pub fn with_defaults(transport: Transport, timeout: Duration) -> Self {
        Self::new(
            transport,
            owned(transport.default_servers()),
            owned(QUERIES),
            timeout,
        )
    }

    pub fn total(&self) -> usize {
        self.servers.len() * self.queries.len()
    }
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Sweeps for the enabled transports, in tcp, udp, tcp-tls order
pub fn plan(tcp: bool, udp: bool, dot: bool, timeout: Duration) -> Vec<Sweep> {
    [(tcp, Transport::Tcp), (udp, Transport::Udp), (dot, Transport::Tls)]
        .into_iter()
        .filter(|(enabled, _)| *enabled)
        .map(|(_, transport)| Sweep::with_defaults(transport, timeout))
        .collect()
}

/// Parse a Go-style duration: one or more decimal numbers, each with a unit
/// suffix (`ns`, `us`, `µs`, `ms`, `s`, `m`, `h`), such as `250ms` or `1m30s`
pub fn parse_timeout(input: &str) -> Result<Duration, String> {
    let mut rest = input.trim();
    if rest.is_empty() {
        return Err("empty duration".to_string());
    }

    let mut nanos: u128 = 0;
    while !rest.is_empty() {
        let split = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(split);
        let split = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(split);

        let value: f64 = number
            .parse()
            .map_err(|_| format!("invalid duration: {:?}", input))?;

        let scale: f64 = match unit {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            "" => return Err(format!("missing unit in duration {:?}", input)),
            other => return Err(format!("unknown duration unit {:?}", other)),
        };

        let part = (value * scale).round();
        if !part.is_finite() || part >= u64::MAX as f64 {
            return Err(format!("duration out of range: {:?}", input));
        }
        nanos += part as u128;
        rest = tail;
    }

    let nanos =
        u64::try_from(nanos).map_err(|_| format!("duration out of range: {:?}", input))?;
    if nanos == 0 {
        return Err("timeout must be greater than zero".to_string());
    }

    Ok(Duration::from_nanos(nanos))
}
