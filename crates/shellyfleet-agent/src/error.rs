use thiserror::Error;

/// Failures a Provisioner agent can hit. There is no server-side HTTP
/// surface here, so these map to process exit behavior rather than the
/// shared error taxonomy — the agent is a client of the Manager, not a peer.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("could not reach manager at {0}: {1}")]
    ManagerUnreachable(String, String),

    #[error("manager rejected the request: {0}")]
    ManagerRejected(String),

    #[error("unexpected response from manager: {0}")]
    ProtocolError(String),

    #[error("wifi association with '{0}' failed: {1}")]
    WifiAssociationFailed(String, String),

    #[error("wifi adapter error: {0}")]
    WifiAdapter(String),
}
