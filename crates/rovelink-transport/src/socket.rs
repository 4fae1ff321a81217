use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// Bind a UDP socket on `addr`.
pub async fn bind_udp(addr: SocketAddr) -> Result<UdpSocket> {
    let socket = UdpSocket::bind(addr)
        .await
        .map_err(|source| TransportError::Bind { addr, source })?;
    let local = socket.local_addr()?;
    info!(%local, "bound udp socket");
    Ok(socket)
}

/// Bind and listen for TCP stream connections on `addr`.
pub async fn bind_tcp(addr: SocketAddr) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| TransportError::Bind { addr, source })?;
    let local = listener.local_addr()?;
    info!(%local, "listening for tcp connections");
    Ok(listener)
}

/// Accept one pending stream connection.
pub async fn accept_tcp(listener: &TcpListener) -> Result<(TcpStream, SocketAddr)> {
    let (stream, peer) = listener.accept().await.map_err(TransportError::Accept)?;
    configure_stream(&stream)?;
    debug!(%peer, "accepted tcp connection");
    Ok((stream, peer))
}

/// Open a stream connection to `addr`.
pub async fn connect_tcp(addr: SocketAddr) -> Result<TcpStream> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|source| TransportError::Connect { addr, source })?;
    configure_stream(&stream)?;
    debug!(%addr, "connected tcp stream");
    Ok(stream)
}

/// The wildcard address of the same family as `peer`, on an ephemeral port.
pub fn unspecified_for(peer: SocketAddr) -> SocketAddr {
    let ip = match peer.ip() {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    };
    SocketAddr::new(ip, 0)
}

// Control frames are tiny; Nagle would hold handshakes and heartbeats back.
fn configure_stream(stream: &TcpStream) -> Result<()> {
    stream.set_nodelay(true)?;
    Ok(())
}
