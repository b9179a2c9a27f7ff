use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use shellyfleet_domain::DiscoverySource;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::RawHit;

const SSDP_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);
const SSDP_PORT: u16 = 1900;
const RECV_BUF_LEN: usize = 4096;

/// Joins the SSDP multicast group and forwards the sender of every inbound
/// `NOTIFY`/search-response packet as a candidate hit, deferring
/// classification to an HTTP follow-up probe. See [`crate::mdns`]
/// for the same rationale on using raw `socket2` multicast here.
pub async fn listen(tx: mpsc::Sender<RawHit>, shutdown: CancellationToken) -> std::io::Result<()> {
    let socket = bind_multicast(SSDP_ADDR, SSDP_PORT)?;
    let socket = UdpSocket::from_std(socket.into())?;
    let mut buf = [0u8; RECV_BUF_LEN];

    loop {
        tokio::select! {
            result = socket.recv_from(&mut buf) => {
                match result {
                    Ok((_len, SocketAddr::V4(from))) => {
                        debug!(ip = %from.ip(), "ssdp packet received");
                        if tx.send(RawHit { ip: *from.ip(), source: DiscoverySource::Ssdp }).await.is_err() {
                            break;
                        }
                    }
                    Ok((_, SocketAddr::V6(_))) => continue,
                    Err(e) => {
                        warn!(error = %e, "ssdp recv failed");
                        continue;
                    }
                }
            }
            _ = shutdown.cancelled() => {
                debug!("ssdp listener shutting down");
                break;
            }
        }
    }
    Ok(())
}

fn bind_multicast(group: Ipv4Addr, port: u16) -> std::io::Result<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;
    let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
    socket.bind(&bind_addr.into())?;
    socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)?;
    Ok(socket)
}
