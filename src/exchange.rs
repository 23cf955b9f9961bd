use std::io::{self, Read, Write};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpStream, UdpSocket};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{BufMut, BytesMut};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};
use thiserror::Error;

use crate::config::Transport;
use crate::dns_message::{build_query, parse_reply, Reply, WireError};

// EDNS-less responses fit here; anything longer comes back truncated
const UDP_BUFFER: usize = 512;

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("invalid resolver address {0:?}")]
    Address(String),
    #[error("timed out")]
    Timeout,
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("tls error: {0}")]
    Tls(#[from] rustls::Error),
    #[error("bad response: {0}")]
    Wire(#[from] WireError),
}

/// Performs one DNS request/response exchange with a resolver
pub trait Exchanger: Send + Sync {
    fn exchange(
        &self,
        transport: Transport,
        server: &str,
        name: &str,
        timeout: Duration,
    ) -> Result<Reply, ExchangeError>;
}

/// Talks to resolvers directly over std sockets
pub struct WireExchanger {
    tls: Arc<ClientConfig>,
}

impl WireExchanger {
    pub fn new() -> Result<Self, ExchangeError> {
        let roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let tls = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_root_certificates(roots)
            .with_no_client_auth();

        Ok(Self { tls: Arc::new(tls) })
    }

    fn udp(
        &self,
        server: SocketAddr,
        query: &[u8],
        id: u16,
        timeout: Duration,
    ) -> Result<Reply, ExchangeError> {
        let local: IpAddr = if server.is_ipv4() {
            Ipv4Addr::UNSPECIFIED.into()
        } else {
            Ipv6Addr::UNSPECIFIED.into()
        };
        let socket = UdpSocket::bind(SocketAddr::new(local, 0))?;
        socket.connect(server)?;
        socket.send(query)?;

        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; UDP_BUFFER];

        // Stray datagrams with another id are skipped until the deadline
        loop {
            let remaining = deadline
                .checked_duration_since(Instant::now())
                .filter(|left| !left.is_zero())
                .ok_or(ExchangeError::Timeout)?;
            socket.set_read_timeout(Some(remaining))?;

            let size = socket.recv(&mut buf).map_err(timeout_or_io)?;
            match parse_reply(&buf[..size], id) {
                Err(WireError::IdMismatch { .. }) => continue,
                other => return Ok(other?),
            }
        }
    }

    fn tcp(
        &self,
        server: SocketAddr,
        query: &[u8],
        id: u16,
        timeout: Duration,
    ) -> Result<Reply, ExchangeError> {
        let mut stream = connect(server, timeout)?;
        framed_exchange(&mut stream, query, id)
    }

    fn tls(
        &self,
        server: SocketAddr,
        query: &[u8],
        id: u16,
        timeout: Duration,
    ) -> Result<Reply, ExchangeError> {
        let socket = connect(server, timeout)?;
        let name = ServerName::IpAddress(server.ip().into());
        let session = ClientConnection::new(self.tls.clone(), name)?;
        let mut stream = StreamOwned::new(session, socket);

        let reply = framed_exchange(&mut stream, query, id)?;
        stream.conn.send_close_notify();
        // The peer may already be gone; the answer is in hand either way
        let _ = stream.flush();
        Ok(reply)
    }
}

impl Exchanger for WireExchanger {
    fn exchange(
        &self,
        transport: Transport,
        server: &str,
        name: &str,
        timeout: Duration,
    ) -> Result<Reply, ExchangeError> {
        let addr: SocketAddr = server
            .parse()
            .map_err(|_| ExchangeError::Address(server.to_string()))?;
        let id = rand::random::<u16>();
        let query = build_query(id, name)?;

        match transport {
            Transport::Udp => self.udp(addr, &query, id, timeout),
            Transport::Tcp => self.tcp(addr, &query, id, timeout),
            Transport::Tls => self.tls(addr, &query, id, timeout),
        }
    }
}

fn connect(server: SocketAddr, timeout: Duration) -> Result<TcpStream, ExchangeError> {
    let stream = TcpStream::connect_timeout(&server, timeout).map_err(timeout_or_io)?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Send `query` with a two-byte length prefix and read one framed response
fn framed_exchange<S: Read + Write>(
    stream: &mut S,
    query: &[u8],
    id: u16,
) -> Result<Reply, ExchangeError> {
    let mut frame = BytesMut::with_capacity(query.len() + 2);
    frame.put_u16(query.len() as u16);
    frame.put_slice(query);

    stream.write_all(&frame).map_err(timeout_or_io)?;
    stream.flush().map_err(timeout_or_io)?;

    let mut len = [0u8; 2];
    stream.read_exact(&mut len).map_err(timeout_or_io)?;

    let mut response = vec![0u8; u16::from_be_bytes(len) as usize];
    stream.read_exact(&mut response).map_err(timeout_or_io)?;

    Ok(parse_reply(&response, id)?)
}

fn timeout_or_io(error: io::Error) -> ExchangeError {
    match error.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ExchangeError::Timeout,
        _ => ExchangeError::Io(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns_message::tests::response_for;
    use std::net::TcpListener;
    use std::thread;

    const WAIT: Duration = Duration::from_secs(2);

    /// Loopback UDP resolver answering one query with `rcode`, after an optional decoy
    fn udp_responder(rcode: u8, decoy: bool) -> (SocketAddr, thread::JoinHandle<()>) {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = socket.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let mut buf = [0u8; 512];
            let (size, peer) = socket.recv_from(&mut buf).unwrap();
            let response = response_for(&buf[..size], rcode);
            if decoy {
                let mut stray = response.clone();
                stray[0] ^= 0xFF;
                socket.send_to(&stray, peer).unwrap();
            }
            socket.send_to(&response, peer).unwrap();
        });
        (addr, handle)
    }

    fn tcp_responder(rcode: u8) -> (SocketAddr, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut len = [0u8; 2];
            stream.read_exact(&mut len).unwrap();
            let mut query = vec![0u8; u16::from_be_bytes(len) as usize];
            stream.read_exact(&mut query).unwrap();

            let response = response_for(&query, rcode);
            stream.write_all(&(response.len() as u16).to_be_bytes()).unwrap();
            stream.write_all(&response).unwrap();
        });
        (addr, handle)
    }

    #[test]
    fn test_udp_success() {
        let (addr, handle) = udp_responder(0, false);
        let exchanger = WireExchanger::new().unwrap();

        let reply = exchanger
            .exchange(Transport::Udp, &addr.to_string(), "www.google.com", WAIT)
            .unwrap();
        assert!(reply.is_success());
        handle.join().unwrap();
    }

    #[test]
    fn test_udp_skips_mismatched_id() {
        let (addr, handle) = udp_responder(3, true);
        let exchanger = WireExchanger::new().unwrap();

        let reply = exchanger
            .exchange(Transport::Udp, &addr.to_string(), "golang.org", WAIT)
            .unwrap();
        assert_eq!(reply.rcode, 3);
        handle.join().unwrap();
    }

    #[test]
    fn test_udp_timeout() {
        // Bound but never answers
        let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = silent.local_addr().unwrap();
        let exchanger = WireExchanger::new().unwrap();

        let result = exchanger.exchange(
            Transport::Udp,
            &addr.to_string(),
            "golang.org",
            Duration::from_millis(50),
        );
        assert!(matches!(result, Err(ExchangeError::Timeout)));
    }

    #[test]
    fn test_tcp_rcode_passed_through() {
        let (addr, handle) = tcp_responder(5);
        let exchanger = WireExchanger::new().unwrap();

        let reply = exchanger
            .exchange(Transport::Tcp, &addr.to_string(), "www.github.com", WAIT)
            .unwrap();
        assert_eq!(reply.rcode, 5);
        assert!(!reply.is_success());
        handle.join().unwrap();
    }

    #[test]
    fn test_tcp_connection_refused() {
        // Grab a free port, then close it so nothing listens there
        let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
        let exchanger = WireExchanger::new().unwrap();

        let result = exchanger.exchange(Transport::Tcp, &addr.to_string(), "golang.org", WAIT);
        assert!(result.is_err());
    }

    #[test]
    fn test_bad_address() {
        let exchanger = WireExchanger::new().unwrap();
        let result = exchanger.exchange(Transport::Udp, "not-an-address", "golang.org", WAIT);
        assert!(matches!(result, Err(ExchangeError::Address(_))));
    }
}
