use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the tracker client.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The session could not be established or negotiated.
    #[error("cannot connect to tracker: {0}")]
    Connect(String),

    /// Operation requires a connected tracker.
    #[error("tracker is not connected")]
    NotConnected,

    /// `connect` or `bind` called on a live session.
    #[error("tracker is already connected; close it first")]
    AlreadyConnected,

    /// Well-formed reply carrying a failure status.
    #[error("tracker protocol error {code} on '{category}'{}", status_suffix(.message))]
    Protocol {
        code: u16,
        category: String,
        message: Option<String>,
    },

    /// Inbound message that cannot be decoded.
    #[error("malformed tracker message: {0}")]
    MalformedMessage(String),

    /// Socket closed or failed while a reply was expected.
    #[error("connection to tracker lost")]
    ConnectionLost,

    /// Push stream ended because the listener saw the connection go away.
    #[error("tracker stream closed")]
    ConnectionClosed,

    #[error("no reply from tracker within {0:?}")]
    Timeout(Duration),

    /// The push listener ignored the stop signal for too long.
    #[error("frame listener did not stop within {0:?}")]
    ShutdownTimeout(Duration),

    #[error("invalid configuration: {0}")]
    Config(String),
}

fn status_suffix(message: &Option<String>) -> String {
    message.as_deref().map(|m| format!(": {m}")).unwrap_or_default()
}

impl TrackerError {
    /// True for errors after which the socket cannot be used again.
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(
            self,
            Self::ConnectionLost | Self::ConnectionClosed | Self::ShutdownTimeout(_)
        )
    }
}

impl From<serde_json::Error> for TrackerError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedMessage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TrackerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_display() {
        let err = TrackerError::Protocol {
            code: 403,
            category: "tracker".to_string(),
            message: Some("not calibrated".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "tracker protocol error 403 on 'tracker': not calibrated"
        );

        let bare = TrackerError::Protocol {
            code: 500,
            category: "heartbeat".to_string(),
            message: None,
        };
        assert_eq!(bare.to_string(), "tracker protocol error 500 on 'heartbeat'");
    }

    #[test]
    fn test_fatal_classification() {
        assert!(TrackerError::ConnectionLost.is_fatal_to_session());
        assert!(!TrackerError::MalformedMessage("x".into()).is_fatal_to_session());
        assert!(!TrackerError::NotConnected.is_fatal_to_session());
        assert!(!TrackerError::Timeout(std::time::Duration::from_secs(1)).is_fatal_to_session());
    }
}
