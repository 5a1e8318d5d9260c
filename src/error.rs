use std::process::ExitCode;

/// Errors that cause checkpost to exit with a specific code.
#[derive(Debug, thiserror::Error)]
pub enum ExitError {
    #[error("config error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("{0}")]
    Other(String),
}

impl ExitError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            ExitError::Config(_) => ExitCode::from(2),
            ExitError::Storage(_) => ExitCode::from(3),
            ExitError::Transport(_) => ExitCode::from(4),
            ExitError::Other(_) => ExitCode::from(1),
        }
    }
}
