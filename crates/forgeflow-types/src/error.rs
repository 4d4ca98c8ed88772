//! Error types shared across all forgeflow crates.

/// Errors that can occur while driving an assistant session.
///
/// Transient controller failures surface as [`ForgeflowError::Session`] and are
/// retried by the automation loop; once the retry budget is spent they are
/// escalated to [`ForgeflowError::ResourceExhausted`]. A policy that matches
/// nothing is a configuration defect and is reported as
/// [`ForgeflowError::PolicyMisconfigured`].
#[derive(Debug, thiserror::Error)]
pub enum ForgeflowError {
    #[error("session controller error: {0}")]
    Session(String),

    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    ResourceExhausted {
        operation: String,
        attempts: u32,
        last_error: String,
    },

    #[error("rule policy misconfigured: {0}")]
    PolicyMisconfigured(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ForgeflowError {
    /// Whether the automation loop may retry the failed operation.
    pub fn is_transient(&self) -> bool {
        matches!(self, ForgeflowError::Session(_))
    }

    /// Whether this error ends the loop as a named fatal condition.
    pub fn is_fatal(&self) -> bool {
        !self.is_transient()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_session_errors_are_transient() {
        assert!(ForgeflowError::Session("pane busy".into()).is_transient());
        assert!(!ForgeflowError::PolicyMisconfigured("empty".into()).is_transient());
        assert!(!ForgeflowError::Config("bad key".into()).is_transient());
        assert!(ForgeflowError::ResourceExhausted {
            operation: "capture".into(),
            attempts: 3,
            last_error: "gone".into(),
        }
        .is_fatal());
    }

    #[test]
    fn resource_exhausted_message_is_single_line() {
        let err = ForgeflowError::ResourceExhausted {
            operation: "capture".into(),
            attempts: 3,
            last_error: "no server running".into(),
        };
        let msg = err.to_string();
        assert_eq!(msg, "capture failed after 3 attempts: no server running");
        assert!(!msg.contains('\n'));
    }
}
