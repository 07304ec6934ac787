use crate::error::{OverlayError, Result};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::time::Duration;

/// Open a TCP connection to `host:port` with bounded connect and I/O timeouts
pub fn open_stream(
    host: &str,
    port: u16,
    connect_timeout: Duration,
    io_timeout: Duration,
) -> Result<TcpStream> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| OverlayError::Network(format!("Failed to resolve {host}:{port}: {e}")))?
        .collect();

    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, connect_timeout) {
            Ok(stream) => {
                configure_stream(&stream, io_timeout)?;
                return Ok(stream);
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(OverlayError::Network(match last_error {
        Some(e) => format!("Failed to connect to {host}:{port}: {e}"),
        None => format!("No address found for {host}:{port}"),
    }))
}

/// Apply read/write timeouts and disable Nagle for small request frames
pub fn configure_stream(stream: &TcpStream, io_timeout: Duration) -> Result<()> {
    stream
        .set_read_timeout(Some(io_timeout))
        .map_err(|e| OverlayError::Network(format!("Failed to set read timeout: {e}")))?;
    stream
        .set_write_timeout(Some(io_timeout))
        .map_err(|e| OverlayError::Network(format!("Failed to set write timeout: {e}")))?;
    stream
        .set_nodelay(true)
        .map_err(|e| OverlayError::Network(format!("Failed to set nodelay: {e}")))?;
    Ok(())
}

/// The address this machine would use to reach the outside world.
/// No packet is sent; connecting a UDP socket only selects a route.
pub fn local_ip() -> IpAddr {
    let probe = || -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect(("10.255.255.255", 1))?;
        Ok(socket.local_addr()?.ip())
    };
    probe().unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}
