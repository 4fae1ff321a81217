use std::net::SocketAddr;

/// Errors that can occur in socket transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified local address.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Failed to connect to the specified remote address.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Failed to accept an incoming stream connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on an established socket.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether the local socket resource itself is unusable.
    ///
    /// Fatal errors are never retried; everything else is treated as a
    /// transient condition of the current connection.
    pub fn is_fatal(&self) -> bool {
        match self {
            TransportError::Bind { .. } => true,
            TransportError::Io(err) | TransportError::Accept(err) => matches!(
                err.kind(),
                std::io::ErrorKind::PermissionDenied | std::io::ErrorKind::AddrNotAvailable
            ),
            TransportError::Connect { .. } => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_failures_are_fatal() {
        let err = TransportError::Bind {
            addr: "127.0.0.1:9".parse().unwrap(),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };
        assert!(err.is_fatal());
    }

    #[test]
    fn refused_connections_are_recoverable() {
        let err = TransportError::Connect {
            addr: "127.0.0.1:9".parse().unwrap(),
            source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
        };
        assert!(!err.is_fatal());

        let reset = TransportError::Io(std::io::Error::from(std::io::ErrorKind::ConnectionReset));
        assert!(!reset.is_fatal());
    }
}
