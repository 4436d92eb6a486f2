use thiserror::Error;

/// Errors surfaced from encoder configuration and startup. Steady-state
/// encode failures are contained in the worker and only show up in logs.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("codec unavailable: {0}")]
    CodecUnavailable(&'static str),

    #[error("failed to configure codec: {0}")]
    Configure(String),

    #[error("encoder already configured")]
    AlreadyConfigured,

    #[error("failed to start encoder thread: {0}")]
    Startup(#[from] std::io::Error),
}
