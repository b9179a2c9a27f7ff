pub mod convert;
pub mod drift;
pub mod error;
pub mod normalize;
pub mod template;

pub use convert::{from_api_config, to_api_config};
pub use drift::{classify_severity, detect as detect_drift, DriftReport};
pub use error::DeviceCfgError;
pub use normalize::{diff, normalize, normalize_hash, ChangeSet, FieldChange};
pub use template::{render_template, validate_template, TemplateCache};
