use std::fmt;

use contractgate_storage::StorageError;

use crate::remote::RemoteError;

/// Why a transition did not happen.
///
/// Every variant leaves the subject exactly as it was.
#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    /// The local table has no edge `from -> to` (or does not know the type).
    #[error("invalid transition for {subject_type}: '{from}' -> '{to}'")]
    InvalidTransition {
        subject_type: String,
        from: String,
        to: String,
    },

    #[error("{subject_type} is in terminal status '{from}' and cannot move to '{to}'")]
    TerminalState {
        subject_type: String,
        from: String,
        to: String,
    },

    /// Remote mode only: the authority could not be reached.
    #[error("remote authority unavailable: {0}")]
    RemoteUnavailable(#[source] RemoteError),

    /// Remote mode only: the authority said no.
    #[error("remote authority rejected '{from}' -> '{to}': {reason}")]
    RemoteRejected {
        from: String,
        to: String,
        reason: String,
    },

    /// Another writer changed the subject between read and write.
    #[error("concurrent modification of {subject_type}/{subject_id}")]
    ConcurrentModification {
        subject_type: String,
        subject_id: String,
    },

    #[error("subject not found: {subject_type}/{subject_id}")]
    SubjectNotFound {
        subject_type: String,
        subject_id: String,
    },

    /// The command key is already recorded for a different intent.
    #[error("command key '{command_key}' was already used for a different transition")]
    CommandKeyReused { command_key: String },

    /// The caller cancelled before the subject lock was taken.
    #[error("transition cancelled")]
    Cancelled,

    #[error("storage error: {0}")]
    Internal(#[source] StorageError),
}

/// Stable, matchable classification of a [`TransitionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidTransition,
    TerminalState,
    RemoteUnavailable,
    RemoteRejected,
    ConcurrentModification,
    SubjectNotFound,
    CommandKeyReused,
    Cancelled,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::TerminalState => "terminal_state",
            ErrorKind::RemoteUnavailable => "remote_unavailable",
            ErrorKind::RemoteRejected => "remote_rejected",
            ErrorKind::ConcurrentModification => "concurrent_modification",
            ErrorKind::SubjectNotFound => "subject_not_found",
            ErrorKind::CommandKeyReused => "command_key_reused",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TransitionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransitionError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            TransitionError::TerminalState { .. } => ErrorKind::TerminalState,
            TransitionError::RemoteUnavailable(_) => ErrorKind::RemoteUnavailable,
            TransitionError::RemoteRejected { .. } => ErrorKind::RemoteRejected,
            TransitionError::ConcurrentModification { .. } => ErrorKind::ConcurrentModification,
            TransitionError::SubjectNotFound { .. } => ErrorKind::SubjectNotFound,
            TransitionError::CommandKeyReused { .. } => ErrorKind::CommandKeyReused,
            TransitionError::Cancelled => ErrorKind::Cancelled,
            TransitionError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the same request may succeed if simply tried again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::RemoteUnavailable | ErrorKind::ConcurrentModification | ErrorKind::Cancelled
        )
    }

    /// Message for the end user. A remote rejection carries the remote's own
    /// reason.
    pub fn reason(&self) -> String {
        match self {
            TransitionError::RemoteRejected { reason, .. } => reason.clone(),
            other => other.to_string(),
        }
    }
}

impl From<StorageError> for TransitionError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ConcurrentConflict {
                subject_type,
                subject_id,
                ..
            } => TransitionError::ConcurrentModification {
                subject_type,
                subject_id,
            },
            StorageError::SubjectNotFound {
                subject_type,
                subject_id,
            } => TransitionError::SubjectNotFound {
                subject_type,
                subject_id,
            },
            StorageError::DuplicateCommandKey { command_key } => {
                TransitionError::CommandKeyReused { command_key }
            }
            other => TransitionError::Internal(other),
        }
    }
}
