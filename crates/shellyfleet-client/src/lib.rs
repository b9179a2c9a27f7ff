pub mod client;
pub mod digest;
pub mod error;
pub mod gen1;
pub mod gen2;
pub mod registry;

pub use client::{normalize_body, DeviceAuth, DeviceClient};
pub use error::ClientError;
pub use gen1::Gen1Client;
pub use gen2::Gen2Client;
pub use registry::ClientRegistry;
