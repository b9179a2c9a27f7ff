pub mod bus;
pub mod ring;
pub mod ws;

pub use bus::{run_system_sampler, MetricsBus, Point, SYSTEM_SERIES};
pub use ring::{RingBuffer, DEFAULT_CAPACITY};
pub use ws::{ConnectionGuard, ConnectionTracker, WsHubConfig};
