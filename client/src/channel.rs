//! Query channel: one UDP socket, one resolved endpoint, one exchange at
//! a time, with the inactivity timer racing the socket.

use log::{debug, info, warn};
use shared::{decode_response, PacketError, PacketHeader, Query};
use std::io;
use std::net::{SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::net::{lookup_host, UdpSocket};
use tokio::time::{sleep_until, Instant};

/// How an exchange decides the server is done talking.
///
/// Some server revisions send an explicit zero-length terminator fragment;
/// others just go silent. `EndOnEmpty` matches the former. Under
/// `InactivityOnly` an empty fragment re-arms the timer but contributes
/// no output line, and only silence ends the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationPolicy {
    InactivityOnly,
    EndOnEmpty,
}

/// Exchange lifecycle, observable for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Sent,
    Waiting,
    Complete,
    Failed,
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("failed to resolve {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        source: io::Error,
    },
    #[error("no IPv4 address found for {host}")]
    NoIpv4Address { host: String },
    #[error("failed to open UDP socket: {0}")]
    Socket(io::Error),
    #[error("failed to send query: {0}")]
    Send(io::Error),
    #[error("failed to receive response: {0}")]
    Receive(io::Error),
    #[error(transparent)]
    Packet(#[from] PacketError),
}

/// Resolves a host/port pair to one concrete IPv4 socket address.
///
/// Resolution happens once per session; the result is owned by the
/// channel and never refreshed mid-session.
pub async fn resolve(host: &str, port: u16) -> Result<SocketAddrV4, ChannelError> {
    let addrs = lookup_host((host, port))
        .await
        .map_err(|source| ChannelError::Resolve {
            host: host.to_string(),
            port,
            source,
        })?;
    addrs
        .into_iter()
        .find_map(|addr| match addr {
            SocketAddr::V4(v4) => Some(v4),
            SocketAddr::V6(_) => None,
        })
        .ok_or_else(|| ChannelError::NoIpv4Address {
            host: host.to_string(),
        })
}

/// Performs one logical query exchange at a time against a single SA-MP
/// server: send one request, then collect validated response fragments
/// until the inactivity timer fires (or the termination policy ends the
/// exchange early).
pub struct QueryChannel {
    socket: UdpSocket,
    endpoint: SocketAddrV4,
    timeout: Duration,
    policy: TerminationPolicy,
    state: ChannelState,
}

impl QueryChannel {
    /// Binds a fresh ephemeral socket aimed at an already-resolved
    /// endpoint.
    pub async fn open(
        endpoint: SocketAddrV4,
        timeout: Duration,
        policy: TerminationPolicy,
    ) -> Result<Self, ChannelError> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(ChannelError::Socket)?;
        Ok(QueryChannel {
            socket,
            endpoint,
            timeout,
            policy,
            state: ChannelState::Idle,
        })
    }

    /// Resolves `host:port` and opens a channel to the first IPv4 result.
    pub async fn connect(
        host: &str,
        port: u16,
        timeout: Duration,
        policy: TerminationPolicy,
    ) -> Result<Self, ChannelError> {
        let endpoint = resolve(host, port).await?;
        info!("Resolved {}:{} to {}", host, port, endpoint);
        Self::open(endpoint, timeout, policy).await
    }

    pub fn endpoint(&self) -> SocketAddrV4 {
        self.endpoint
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Aborts any pending exchange and returns the channel to `Idle`.
    /// Safe to call in any state, any number of times; the socket stays
    /// open for the next `exchange`.
    pub fn cancel(&mut self) {
        self.state = ChannelState::Idle;
    }

    /// Runs one exchange: encode and send the query, then collect every
    /// fragment whose header echoes the request, in arrival order, until
    /// the inactivity timeout elapses with nothing new.
    ///
    /// Foreign and malformed datagrams are dropped without re-arming the
    /// timer. Zero fragments before the first timeout is not an error;
    /// it yields an empty line list.
    pub async fn exchange(&mut self, query: &Query) -> Result<Vec<String>, ChannelError> {
        let address = *self.endpoint.ip();
        let port = self.endpoint.port();
        let request_header = PacketHeader::new(address, port, query.opcode);
        let request = query.encode(address, port)?;

        self.state = ChannelState::Sent;
        if let Err(e) = self
            .socket
            .send_to(&request, SocketAddr::V4(self.endpoint))
            .await
        {
            self.state = ChannelState::Failed;
            return Err(ChannelError::Send(e));
        }

        self.state = ChannelState::Waiting;
        let mut lines = Vec::new();
        // Holds the largest fragment the text cap allows, with headroom;
        // anything bigger arrives truncated and is dropped as malformed.
        let mut buf = [0u8; 4096];
        // Timer runs from the send until the first valid fragment, then
        // from the most recent valid fragment.
        let mut deadline = Instant::now() + self.timeout;

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buf) => match result {
                    Ok((len, _)) => match decode_response(&buf[..len]) {
                        Ok(response) if response.header.is_echo_of(&request_header) => {
                            if response.text.is_empty()
                                && self.policy == TerminationPolicy::EndOnEmpty
                            {
                                debug!("End-of-stream fragment received");
                                break;
                            }
                            if !response.text.is_empty() {
                                lines.push(response.text_lossy());
                            }
                            deadline = Instant::now() + self.timeout;
                        }
                        Ok(_) => {
                            debug!("Dropping datagram with non-matching header");
                        }
                        Err(e) => {
                            debug!("Dropping malformed datagram: {}", e);
                        }
                    },
                    Err(e) if matches!(
                        e.kind(),
                        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionRefused
                    ) => {
                        // ICMP port-unreachable bounce; the server may just
                        // be restarting. Keep waiting out the timeout.
                        warn!("Connection reset by {}", self.endpoint);
                    }
                    Err(e) => {
                        self.state = ChannelState::Failed;
                        return Err(ChannelError::Receive(e));
                    }
                },
                _ = sleep_until(deadline) => break,
            }
        }

        self.state = ChannelState::Complete;
        Ok(lines)
    }
}
