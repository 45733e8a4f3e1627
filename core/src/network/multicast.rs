//! UDP multicast transport
//!
//! The socket is owned by a worker task. The node talks to it through a
//! command channel, so a slow socket never blocks the caller; received
//! datagrams come back on an event channel.

use super::{NetworkEvent, Transport};
use crate::{Error, Result};
use bytes::Bytes;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Largest payload an IPv4 UDP datagram can carry
const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Multicast group settings
#[derive(Debug, Clone)]
pub struct MulticastConfig {
    /// Group address (224.0.0.0/4)
    pub group: Ipv4Addr,

    /// UDP port shared by all members
    pub port: u16,

    /// Local interface used to join the group
    pub interface: Ipv4Addr,

    /// Multicast TTL
    pub ttl: u32,

    /// Deliver our own datagrams back to us
    pub loopback: bool,
}

impl Default for MulticastConfig {
    fn default() -> Self {
        Self {
            group: Ipv4Addr::new(224, 1, 1, 1),
            port: 5007,
            interface: Ipv4Addr::UNSPECIFIED,
            ttl: 128,
            loopback: true,
        }
    }
}

impl MulticastConfig {
    pub fn group_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.group, self.port))
    }
}

/// Commands sent to the socket worker
#[derive(Debug)]
enum TransportCommand {
    Send(Bytes),
    Shutdown,
}

/// Handle to a joined multicast group
pub struct MulticastTransport {
    group: SocketAddr,
    command_tx: mpsc::UnboundedSender<TransportCommand>,
}

/// Internal worker that owns the socket
struct MulticastWorker {
    socket: UdpSocket,
    group: SocketAddr,
    event_tx: mpsc::UnboundedSender<NetworkEvent>,
    command_rx: mpsc::UnboundedReceiver<TransportCommand>,
}

impl MulticastTransport {
    /// Bind the group port, join the group and start the socket worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn join(config: MulticastConfig) -> Result<(Self, mpsc::UnboundedReceiver<NetworkEvent>)> {
        if !config.group.is_multicast() {
            return Err(Error::Config(format!(
                "{} is not a multicast address",
                config.group
            )));
        }

        let socket = open_socket(&config)?;
        let group = config.group_addr();

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let worker = MulticastWorker {
            socket,
            group,
            event_tx,
            command_rx,
        };
        tokio::spawn(worker.run());

        info!(%group, interface = %config.interface, ttl = config.ttl, "Joined multicast group");

        Ok((Self { group, command_tx }, event_rx))
    }

    /// The group address datagrams are sent to
    pub fn group_addr(&self) -> SocketAddr {
        self.group
    }
}

impl Transport for MulticastTransport {
    fn send(&self, data: Bytes) -> Result<()> {
        self.command_tx
            .send(TransportCommand::Send(data))
            .map_err(|_| Error::Network("Multicast worker stopped".to_string()))
    }

    fn close(&self) {
        let _ = self.command_tx.send(TransportCommand::Shutdown);
    }
}

impl MulticastWorker {
    async fn run(mut self) {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buf) => {
                    match received {
                        Ok((len, source)) => {
                            let event = NetworkEvent::Datagram {
                                data: Bytes::copy_from_slice(&buf[..len]),
                                source: source.to_string(),
                            };
                            if self.event_tx.send(event).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "Multicast receive failed");
                        }
                    }
                }
                command = self.command_rx.recv() => {
                    match command {
                        Some(TransportCommand::Send(data)) => {
                            if let Err(e) = self.socket.send_to(&data, self.group).await {
                                warn!(error = %e, bytes = data.len(), "Multicast send failed, datagram dropped");
                            }
                        }
                        Some(TransportCommand::Shutdown) | None => break,
                    }
                }
            }
        }

        debug!(group = %self.group, "Multicast worker stopped");
    }
}

fn net_err(what: &'static str) -> impl Fn(std::io::Error) -> Error {
    move |e| Error::Network(format!("{}: {}", what, e))
}

fn open_socket(config: &MulticastConfig) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(net_err("Failed to create socket"))?;

    // Several nodes on one host share the group port
    socket
        .set_reuse_address(true)
        .map_err(net_err("Failed to set SO_REUSEADDR"))?;
    #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
    socket
        .set_reuse_port(true)
        .map_err(net_err("Failed to set SO_REUSEPORT"))?;

    socket
        .set_nonblocking(true)
        .map_err(net_err("Failed to set non-blocking mode"))?;

    let bind_addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.port));
    socket
        .bind(&bind_addr.into())
        .map_err(net_err("Failed to bind group port"))?;
    socket
        .join_multicast_v4(&config.group, &config.interface)
        .map_err(net_err("Failed to join multicast group"))?;
    socket
        .set_multicast_ttl_v4(config.ttl)
        .map_err(net_err("Failed to set multicast TTL"))?;
    socket
        .set_multicast_loop_v4(config.loopback)
        .map_err(net_err("Failed to set multicast loopback"))?;

    UdpSocket::from_std(socket.into()).map_err(net_err("Failed to register socket"))
}
