use thiserror::Error;

/// Common error types for the ephemeral onion service publisher
#[derive(Debug, Error)]
pub enum OnionError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Entropy failure: {0}")]
    Entropy(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type for onion service operations
pub type Result<T> = std::result::Result<T, OnionError>;

impl OnionError {
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn entropy(msg: impl Into<String>) -> Self {
        Self::Entropy(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helpers_pick_the_right_variant() {
        assert!(matches!(
            OnionError::protocol("missing ServiceID"),
            OnionError::Protocol(_)
        ));
        assert!(matches!(
            OnionError::authentication("bad password"),
            OnionError::Authentication(_)
        ));
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: OnionError = io.into();
        assert!(matches!(err, OnionError::Io(_)));
    }
}
