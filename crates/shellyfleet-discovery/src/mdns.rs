use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use shellyfleet_domain::DiscoverySource;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::RawHit;

const MDNS_ADDR: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);
const MDNS_PORT: u16 = 5353;
const RECV_BUF_LEN: usize = 4096;

/// Joins the mDNS multicast group and forwards the sender of every inbound
/// packet as a candidate hit. Shelly's mDNS announcements don't reliably
/// carry a full device JSON body, so payloads are discarded here; the
/// sender IP alone is handed to [`crate::scan::probe_host`] for
/// classification.
///
/// There's no corpus precedent for raw multicast sockets; `socket2` is used
/// here as the idiomatic choice for the ecosystem regardless.
pub async fn listen(tx: mpsc::Sender<RawHit>, shutdown: CancellationToken) -> std::io::Result<()> {
    let socket = bind_multicast(MDNS_ADDR, MDNS_PORT)?;
    let socket = UdpSocket::from_std(socket.into())?;
    let mut buf = [0u8; RECV_BUF_LEN];

    loop {
        tokio::select! {
            result = socket.recv_from(&mut buf) => {
                match result {
                    Ok((_len, SocketAddr::V4(from))) => {
                        debug!(ip = %from.ip(), "mdns packet received");
                        if tx.send(RawHit { ip: *from.ip(), source: DiscoverySource::Mdns }).await.is_err() {
                            break;
                        }
                    }
                    Ok((_, SocketAddr::V6(_))) => continue,
                    Err(e) => {
                        warn!(error = %e, "mdns recv failed");
                        continue;
                    }
                }
            }
            _ = shutdown.cancelled() => {
                debug!("mdns listener shutting down");
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
