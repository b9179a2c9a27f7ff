pub mod envelope;
pub mod error;
pub mod types;

pub use envelope::{Envelope, ErrorBody, Meta};
pub use error::{DomainError, ErrorKind};
pub use types::*;
