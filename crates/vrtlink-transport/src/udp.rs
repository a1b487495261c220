//! UDP transport for radio streaming.
//!
//! This module provides [`UdpTransport`], the datagram socket behind every
//! vrtlink stream:
//!
//! - RX sample streams (one VITA-49 frame per datagram, via
//!   [`DatagramSource`])
//! - TX flow-control status datagrams from the radio (also a
//!   [`DatagramSource`])
//! - TX sample frames, broadcast on a named interface and written with a
//!   single scatter/gather send (via [`DatagramSink`])
//!
//! # Example
//!
//! ```no_run
//! use vrtlink_transport::UdpTransport;
//! use std::time::Duration;
//!
//! # async fn example() -> vrtlink_core::Result<()> {
//! // Listen for a DDC stream on its well-known port
//! let transport = UdpTransport::bind("0.0.0.0:42820").await?;
//!
//! let mut buf = [0u8; 9000];
//! let (n, src) = transport.recv_from(&mut buf, Duration::from_secs(5)).await?;
//! println!("Received {} bytes from {}", n, src);
//! # Ok(())
//! # }
//! ```

use std::io::IoSlice;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use socket2::{SockAddr, SockRef};
use tokio::io::Interest;
use tokio::net::UdpSocket;

use vrtlink_core::error::{Error, Result};
use vrtlink_core::transport::{DatagramSink, DatagramSource};

/// IPv4 address and broadcast address of a network interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceAddr {
    /// The interface's own address.
    pub ip: Ipv4Addr,
    /// The subnet broadcast address.
    pub broadcast: Ipv4Addr,
}

/// Look up the first IPv4 address (and its broadcast address) assigned to
/// the interface called `name`.
///
/// # Errors
///
/// Returns [`Error::Socket`] if the interface list cannot be read, no
/// interface has that name, or it has no IPv4 broadcast address.
pub fn resolve_interface(name: &str) -> Result<InterfaceAddr> {
    let interfaces = if_addrs::get_if_addrs()
        .map_err(|e| Error::Socket(format!("failed to list network interfaces: {}", e)))?;

    let mut found = false;
    for iface in interfaces.iter().filter(|i| i.name == name) {
        found = true;
        if let if_addrs::IfAddr::V4(v4) = &iface.addr {
            if let Some(broadcast) = v4.broadcast {
                tracing::debug!(
                    interface = %name,
                    ip = %v4.ip,
                    broadcast = %broadcast,
                    "Resolved interface broadcast address"
                );
                return Ok(InterfaceAddr {
                    ip: v4.ip,
                    broadcast,
                });
            }
        }
    }

    if found {
        Err(Error::Socket(format!(
            "interface {} has no IPv4 broadcast address",
            name
        )))
    } else {
        Err(Error::Socket(format!("no such interface: {}", name)))
    }
}

/// UDP transport for datagram-based radio streaming.
///
/// Wraps a [`tokio::net::UdpSocket`] with error mapping consistent with the
/// rest of vrtlink. Socket setup failures surface as [`Error::Socket`];
/// failures on an established socket as [`Error::Io`] or
/// [`Error::Transport`].
#[derive(Debug)]
pub struct UdpTransport {
    /// The underlying UDP socket.
    socket: UdpSocket,
    /// The local address the socket is bound to.
    local_addr: SocketAddr,
    /// Where [`DatagramSink`] sends go.
    destination: Option<SocketAddr>,
}

impl UdpTransport {
    /// Bind to a local address.
    ///
    /// Use `"0.0.0.0:0"` to bind to any available port on all interfaces,
    /// or specify a port like `"0.0.0.0:42810"` for a well-known service.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use vrtlink_transport::UdpTransport;
    /// # async fn example() -> vrtlink_core::Result<()> {
    /// let transport = UdpTransport::bind("0.0.0.0:0").await?;
    /// println!("Bound to {}", transport.local_addr());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn bind(addr: &str) -> Result<Self> {
        tracing::debug!(addr = %addr, "Binding UDP socket");

        let socket = UdpSocket::bind(addr).await.map_err(|e| {
            tracing::error!(addr = %addr, error = %e, "Failed to bind UDP socket");
            Error::Socket(format!("failed to bind UDP socket on {}: {}", addr, e))
        })?;

        let local_addr = socket.local_addr().map_err(|e| {
            tracing::error!(error = %e, "Failed to get local address");
            Error::Socket(format!("failed to get local address: {}", e))
        })?;

        tracing::debug!(local_addr = %local_addr, "UDP socket bound");

        Ok(Self {
            socket,
            local_addr,
            destination: None,
        })
    }

    /// Bind to a specific port on all interfaces.
    ///
    /// Convenience method equivalent to `bind(&format!("0.0.0.0:{port}"))`.
    pub async fn bind_port(port: u16) -> Result<Self> {
        Self::bind(&format!("0.0.0.0:{}", port)).await
    }

    /// Open a broadcast socket on the named interface.
    ///
    /// The socket is bound to the interface's IPv4 address, broadcast is
    /// enabled, and the sink destination is set to the interface's
    /// broadcast address on `port`.
    pub async fn bind_interface_broadcast(interface: &str, port: u16) -> Result<Self> {
        let iface = resolve_interface(interface)?;
        let mut transport = Self::bind(&SocketAddr::new(IpAddr::V4(iface.ip), 0).to_string()).await?;
        transport.set_broadcast(true)?;
        transport.set_destination(SocketAddr::new(IpAddr::V4(iface.broadcast), port));

        tracing::info!(
            interface = %interface,
            local = %transport.local_addr,
            destination = %SocketAddr::new(IpAddr::V4(iface.broadcast), port),
            "Broadcast UDP socket ready"
        );

        Ok(transport)
    }

    /// Get the local address this socket is bound to.
    ///
    /// This is useful when binding to port 0 to discover the assigned port.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Set the destination used by [`DatagramSink::send_datagram`].
    pub fn set_destination(&mut self, addr: SocketAddr) {
        self.destination = Some(addr);
    }

    /// The destination used by [`DatagramSink::send_datagram`], if set.
    pub fn destination(&self) -> Option<SocketAddr> {
        self.destination
    }

    /// Send a datagram to the specified address.
    pub async fn send_to(&self, data: &[u8], addr: SocketAddr) -> Result<()> {
        tracing::trace!(
            local = %self.local_addr,
            remote = %addr,
            bytes = data.len(),
            "Sending datagram"
        );

        self.socket.send_to(data, addr).await.map_err(|e| {
            tracing::error!(
                local = %self.local_addr,
                remote = %addr,
                error = %e,
                "Failed to send datagram"
            );
            Error::Io(e)
        })?;

        Ok(())
    }

    /// Send the concatenation of `bufs` to `addr` as one datagram, without
    /// first copying the pieces into a contiguous buffer.
    ///
    /// Returns the number of bytes the kernel accepted.
    pub async fn send_vectored_to(&self, bufs: &[IoSlice<'_>], addr: SocketAddr) -> Result<usize> {
        let dest = SockAddr::from(addr);
        let sock = SockRef::from(&self.socket);

        let n = self
            .socket
            .async_io(Interest::WRITABLE, || sock.send_to_vectored(bufs, &dest))
            .await
            .map_err(|e| {
                tracing::error!(
                    local = %self.local_addr,
                    remote = %addr,
                    error = %e,
                    "Failed to send vectored datagram"
                );
                Error::Io(e)
            })?;

        tracing::trace!(
            local = %self.local_addr,
            remote = %addr,
            bytes = n,
            "Vectored datagram sent"
        );

        Ok(n)
    }

    /// Receive a datagram with timeout. Returns `(bytes_read, source_addr)`.
    ///
    /// The buffer should be large enough to hold an entire datagram. Any
    /// bytes beyond `buf.len()` are silently discarded (standard UDP
    /// behavior).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if no datagram arrives within `timeout`.
    pub async fn recv_from(
        &self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<(usize, SocketAddr)> {
        let result = tokio::time::timeout(timeout, self.socket.recv_from(buf)).await;

        match result {
            Ok(Ok((n, src))) => {
                tracing::trace!(
                    local = %self.local_addr,
                    remote = %src,
                    bytes = n,
                    "Received datagram"
                );
                Ok((n, src))
            }
            Ok(Err(e)) => {
                tracing::error!(
                    local = %self.local_addr,
                    error = %e,
                    "Failed to receive datagram"
                );
                Err(Error::Io(e))
            }
            Err(_) => {
                tracing::trace!(
                    local = %self.local_addr,
                    timeout_ms = timeout.as_millis(),
                    "Timeout waiting for datagram"
                );
                Err(Error::Timeout)
            }
        }
    }

    /// Receive a datagram with timeout, ignoring the source address.
    pub async fn recv(&self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let (n, _src) = self.recv_from(buf, timeout).await?;
        Ok(n)
    }

    /// Enable or disable broadcast on this socket.
    ///
    /// This must be enabled before sending to broadcast addresses.
    pub fn set_broadcast(&self, enable: bool) -> Result<()> {
        tracing::debug!(
            local = %self.local_addr,
            enable = enable,
            "Setting broadcast"
        );

        self.socket.set_broadcast(enable).map_err(|e| {
            tracing::error!(
                local = %self.local_addr,
                error = %e,
                "Failed to set broadcast"
            );
            Error::Socket(format!("failed to set SO_BROADCAST: {}", e))
        })
    }

    /// Connect this socket to a specific remote address.
    ///
    /// After connecting, datagrams are only received from that address,
    /// which keeps stray traffic out of a stream. The address also becomes
    /// the sink destination.
    pub async fn connect(&mut self, addr: SocketAddr) -> Result<()> {
        tracing::debug!(
            local = %self.local_addr,
            remote = %addr,
            "Connecting UDP socket to remote address"
        );

        self.socket.connect(addr).await.map_err(|e| {
            tracing::error!(
                local = %self.local_addr,
                remote = %addr,
                error = %e,
                "Failed to connect UDP socket"
            );
            Error::Socket(format!("failed to connect UDP socket to {}: {}", addr, e))
        })?;
        self.destination = Some(addr);

        Ok(())
    }
}

#[async_trait]
impl DatagramSource for UdpTransport {
    async fn recv_datagram(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.socket.recv(buf).await.map_err(|e| {
            tracing::error!(
                local = %self.local_addr,
                error = %e,
                "Failed to receive datagram"
            );
            Error::Io(e)
        })?;
        tracing::trace!(local = %self.local_addr, bytes = n, "Received datagram");
        Ok(n)
    }
}

#[async_trait]
impl DatagramSink for UdpTransport {
    async fn send_datagram(&mut self, bufs: &[IoSlice<'_>]) -> Result<usize> {
        let dest = self.destination.ok_or(Error::NotConnected)?;
        self.send_vectored_to(bufs, dest).await
    }
}
