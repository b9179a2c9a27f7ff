use shellyfleet_domain::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeviceCfgError {
    #[error("template uses disallowed function '{0}'")]
    TemplateUnsafe(String),

    #[error("template references unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("template render error: {0}")]
    RenderError(String),

    #[error("unsupported arithmetic on non-numeric operand in '{0}'")]
    NotNumeric(String),

    #[error("device client error: {0}")]
    Client(#[from] shellyfleet_client::ClientError),

    #[error("conversion error: {0}")]
    Conversion(String),
}

impl DeviceCfgError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeviceCfgError::TemplateUnsafe(_) => ErrorKind::TemplateUnsafe,
            DeviceCfgError::UnknownVariable(_)
            | DeviceCfgError::RenderError(_)
            | DeviceCfgError::NotNumeric(_)
            | DeviceCfgError::Conversion(_) => ErrorKind::Validation,
            DeviceCfgError::Client(e) => e.kind(),
        }
    }
}
