//! Workflow error types.

use thiserror::Error;

use super::record::{RecordAction, RecordStatus};
use crate::auth::AuthError;

/// Errors from requesting a record transition.
///
/// The first three variants are resolved locally, before any network
/// call; a rejected transition never produces a half-applied record.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WorkflowError {
    /// The action is not in the transition table for the record's current
    /// status.
    #[error("cannot {action} a record that is {status}")]
    InvalidTransition {
        /// The requested action.
        action: RecordAction,
        /// The record's current status.
        status: RecordStatus,
    },

    /// The acting principal's roles and relation to the record do not
    /// permit the action.
    #[error("not permitted to {action} this record while it is {status}")]
    NotPermitted {
        /// The requested action.
        action: RecordAction,
        /// The record's current status.
        status: RecordStatus,
    },

    /// A rejection was requested without a non-empty reason.
    #[error("a rejection requires a non-empty reason")]
    MissingReason,

    /// The authenticated request path failed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The service answered success but the payload did not decode as a
    /// record.
    #[error("unexpected record payload: {message}")]
    Payload {
        /// Decode failure description.
        message: String,
    },
}
