pub mod error;
pub mod orchestrator;
pub mod state_machine;

pub use error::ProvisioningError;
pub use orchestrator::{bulk_status, BulkStatus, Orchestrator, AGENT_HEARTBEAT_TIMEOUT_SECS};
pub use state_machine::{apply, TaskEvent, DEFAULT_MAX_ATTEMPTS};
