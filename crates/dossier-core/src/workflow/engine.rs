//! The workflow engine: validates and executes record transitions.

use std::sync::Arc;

use serde_json::json;
use tracing::info;

use super::error::WorkflowError;
use super::record::{ClientRecord, RecordAction, RecordPage, RecordStatus};
use crate::auth::{ApiRequest, AuthError, AuthenticatedGateway, Transport};
use crate::credentials::CredentialStore;
use crate::permissions::PermissionContext;

/// What an accepted transition does to the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    /// The record moves to a new status.
    Move(RecordStatus),
    /// The record is removed.
    Removal,
}

/// Looks up `(status, action)` in the transition table.
///
/// Returns `None` for every pair the table does not list; the caller must
/// treat that as a local validation failure, not something to send to the
/// service.
#[must_use]
pub const fn transition_kind(status: RecordStatus, action: RecordAction) -> Option<TransitionKind> {
    match (status, action) {
        (RecordStatus::InProgress | RecordStatus::BeingModified, RecordAction::Submit) => {
            Some(TransitionKind::Move(RecordStatus::AwaitingAdminValidation))
        },
        (RecordStatus::AwaitingAdminValidation, RecordAction::ValidateAsAdmin) => {
            Some(TransitionKind::Move(RecordStatus::AwaitingSuperAdminValidation))
        },
        (RecordStatus::AwaitingSuperAdminValidation, RecordAction::ValidateAsSuperAdmin) => {
            Some(TransitionKind::Move(RecordStatus::Validated))
        },
        (
            RecordStatus::AwaitingAdminValidation | RecordStatus::AwaitingSuperAdminValidation,
            RecordAction::Reject,
        ) => Some(TransitionKind::Move(RecordStatus::Rejected)),
        (RecordStatus::Rejected, RecordAction::Edit) => {
            Some(TransitionKind::Move(RecordStatus::BeingModified))
        },
        (RecordStatus::InProgress, RecordAction::Delete) => Some(TransitionKind::Removal),
        _ => None,
    }
}

/// Result of an executed transition.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// The service applied the transition and returned the updated record.
    Updated(ClientRecord),
    /// The record was removed.
    Deleted {
        /// Identifier of the removed record.
        id: String,
    },
}

/// Validates requested transitions and executes them through the
/// authenticated gateway.
pub struct WorkflowEngine<T: Transport> {
    gateway: Arc<AuthenticatedGateway<T>>,
    store: Arc<CredentialStore>,
}

impl<T: Transport> WorkflowEngine<T> {
    /// Creates an engine issuing calls through `gateway`.
    #[must_use]
    pub fn new(gateway: Arc<AuthenticatedGateway<T>>, store: Arc<CredentialStore>) -> Self {
        Self { gateway, store }
    }

    /// Requests `action` on `record`, with `reason` for rejections.
    ///
    /// Validation happens in three local steps before any network call:
    /// the transition table, the rejection-reason requirement, and the
    /// permission evaluation for the acting principal. Only then is the
    /// transition dispatched. On success the service's returned record is
    /// handed back verbatim; its status wins over the table's prediction,
    /// which absorbs races with other reviewers.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::InvalidTransition`] when the table has no entry
    ///   for `(record.status, action)`.
    /// - [`WorkflowError::MissingReason`] when `action` is a rejection and
    ///   `reason` is absent or blank.
    /// - [`WorkflowError::NotPermitted`] when the acting principal may not
    ///   perform the action.
    /// - [`WorkflowError::Auth`] for authentication, session, transport,
    ///   and service errors from the gateway.
    /// - [`WorkflowError::Payload`] when a success response does not
    ///   decode as a record.
    pub async fn request_transition(
        &self,
        record: &ClientRecord,
        action: RecordAction,
        reason: Option<&str>,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let Some(kind) = transition_kind(record.status, action) else {
            return Err(WorkflowError::InvalidTransition {
                action,
                status: record.status,
            });
        };

        let reason = match action {
            RecordAction::Reject => match reason.map(str::trim) {
                Some(reason) if !reason.is_empty() => Some(reason.to_string()),
                _ => return Err(WorkflowError::MissingReason),
            },
            _ => None,
        };

        let context = self.acting_context(record)?;
        if !context.permitted_actions(record.status).contains(&action) {
            return Err(WorkflowError::NotPermitted {
                action,
                status: record.status,
            });
        }

        let request = Self::transition_request(&record.id, action, reason.as_deref());
        let response = self.gateway.call(&request).await?;

        info!(record_id = %record.id, action = %action, "record transition applied");

        match kind {
            TransitionKind::Removal => Ok(TransitionOutcome::Deleted {
                id: record.id.clone(),
            }),
            TransitionKind::Move(_) => {
                let updated: ClientRecord = serde_json::from_value(response.body)
                    .map_err(|e| WorkflowError::Payload {
                        message: e.to_string(),
                    })?;
                Ok(TransitionOutcome::Updated(updated))
            },
        }
    }

    /// Fetches one page of the record listing.
    ///
    /// Filtering by creator and role is enforced server-side; this is a
    /// plain pass-through.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Auth`] for gateway failures and
    /// [`WorkflowError::Payload`] when the envelope does not decode.
    pub async fn list_records(
        &self,
        page: u32,
        per_page: u32,
    ) -> Result<RecordPage, WorkflowError> {
        let request = ApiRequest::get(format!("/records?page={page}&perPage={per_page}"));
        let response = self.gateway.call(&request).await?;
        serde_json::from_value(response.body).map_err(|e| WorkflowError::Payload {
            message: e.to_string(),
        })
    }

    /// Fetches a single record by id.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Auth`] for gateway failures and
    /// [`WorkflowError::Payload`] when the payload does not decode.
    pub async fn fetch_record(&self, id: &str) -> Result<ClientRecord, WorkflowError> {
        let request = ApiRequest::get(format!("/records/{id}"));
        let response = self.gateway.call(&request).await?;
        serde_json::from_value(response.body).map_err(|e| WorkflowError::Payload {
            message: e.to_string(),
        })
    }

    /// Derives the acting principal's permission context for `record`.
    fn acting_context(&self, record: &ClientRecord) -> Result<PermissionContext, WorkflowError> {
        let state = self.store.read().map_err(AuthError::from)?;
        let Some(session) = state.session() else {
            return Err(WorkflowError::Auth(AuthError::MissingCredential));
        };
        let principal = session.principal();
        Ok(PermissionContext::for_record(
            &principal.user_id,
            &principal.roles,
            record,
        ))
    }

    /// Builds the service request for an accepted transition.
    fn transition_request(id: &str, action: RecordAction, reason: Option<&str>) -> ApiRequest {
        match action {
            RecordAction::Submit => ApiRequest::post_empty(format!("/records/{id}/submit")),
            RecordAction::ValidateAsAdmin => {
                ApiRequest::post_empty(format!("/records/{id}/validate-as-admin"))
            },
            RecordAction::ValidateAsSuperAdmin => {
                ApiRequest::post_empty(format!("/records/{id}/validate-as-superadmin"))
            },
            RecordAction::Reject => ApiRequest::post(
                format!("/records/{id}/reject"),
                json!({ "reason": reason.unwrap_or_default() }),
            ),
            RecordAction::Edit => ApiRequest::post_empty(format!("/records/{id}/edit-reopen")),
            RecordAction::Delete => ApiRequest::delete(format!("/records/{id}")),
        }
    }
}

impl<T: Transport> std::fmt::Debug for WorkflowEngine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
