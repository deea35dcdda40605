use std::io;
use std::time::Duration;

use thiserror::Error;

/// Everything that can go wrong while talking to the simulator.
///
/// Only the variants for which [`LinkError::is_fatal`] returns `true` end a
/// session; everything else is recovered where it happens.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The socket to the simulator could not be established.
    #[error("unable to connect to {host}:{port}: {source}")]
    Connection {
        /// Host that was dialed
        host: String,
        /// Port that was dialed
        port: u16,
        /// Underlying socket error
        #[source]
        source: io::Error,
    },

    /// Reading or writing the established channel failed.
    #[error("transport fault: {0}")]
    Transport(#[from] io::Error),

    /// The remote side closed the channel.
    #[error("connection closed by the simulator")]
    Closed,

    /// No response arrived before the read deadline.
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// A telemetry response was not a decimal number.
    #[error("invalid value received for {path}: {response:?}")]
    Parse {
        /// Property path that was requested
        path: String,
        /// Raw response line
        response: String,
    },

    /// A value fell outside the range its field accepts.
    #[error("{field} value {value} outside [{min}, {max}]")]
    OutOfRange {
        /// Name of the rejected field
        field: &'static str,
        /// Rejected value
        value: f64,
        /// Lower inclusive bound
        min: f64,
        /// Upper inclusive bound
        max: f64,
    },

    /// An operation that needs a live channel was called without one.
    #[error("not connected")]
    NotConnected,

    /// `connect` was called on a session that is already connected.
    #[error("already connected")]
    AlreadyConnected,

    /// `connect` was called while a faulted session is still being torn down.
    #[error("the previous session is still shutting down")]
    ShuttingDown,

    /// A transaction was abandoned because the session is shutting down.
    #[error("operation cancelled")]
    Cancelled,

    /// A request line could not be understood.
    #[error("malformed request: {0:?}")]
    MalformedRequest(String),

    /// A configuration value could not be used.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl LinkError {
    /// Returns true for failures that leave the channel unusable.
    ///
    /// A timed out read is fatal as well: the late response would otherwise be
    /// paired with the next request.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LinkError::Transport(_) | LinkError::Closed | LinkError::Timeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_channel_failures_are_fatal() {
        assert!(LinkError::Closed.is_fatal());
        assert!(LinkError::Timeout(Duration::from_secs(1)).is_fatal());
        assert!(LinkError::Transport(io::Error::from(io::ErrorKind::BrokenPipe)).is_fatal());

        assert!(!LinkError::Cancelled.is_fatal());
        assert!(!LinkError::NotConnected.is_fatal());
        assert!(!LinkError::ShuttingDown.is_fatal());
        assert!(
            !LinkError::Parse {
                path: "/position/latitude-deg".to_string(),
                response: "ERR".to_string(),
            }
            .is_fatal()
        );
    }

    #[test]
    fn parse_error_names_the_path() {
        let err = LinkError::Parse {
            path: "/position/longitude-deg".to_string(),
            response: "abc".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid value received for /position/longitude-deg: \"abc\""
        );
    }
}
