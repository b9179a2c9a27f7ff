pub mod admin;
pub mod deviceconfig;
pub mod devices;
pub mod discovery;
pub mod health;
pub mod metrics;
pub mod notifications;
pub mod provisioner;
pub mod sync;

use serde::Deserialize;
use shellyfleet_domain::PageParams;

/// Shared pagination query-string shape: `?page=&page_size=`.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl PageQuery {
    pub fn clamp(&self) -> PageParams {
        PageParams::clamp(self.page, self.page_size)
    }
}
