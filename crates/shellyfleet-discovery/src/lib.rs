pub mod classify;
pub mod mdns;
pub mod scan;
pub mod ssdp;

use std::net::Ipv4Addr;

use shellyfleet_domain::DiscoverySource;

pub use classify::{classify, extract_mac};
pub use scan::{probe_host, scan};

/// A candidate sighting handed from the mDNS/SSDP listeners to the HTTP
/// probe for classification. The listeners only know a sender IP;
/// confirming the hit and extracting its MAC/model happens in `scan`.
#[derive(Debug, Clone, Copy)]
pub struct RawHit {
    pub ip: Ipv4Addr,
    pub source: DiscoverySource,
}
