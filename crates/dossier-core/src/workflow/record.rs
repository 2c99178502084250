//! Client record model and status vocabulary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Review status of a client record.
///
/// The status may only change through the transition table in the
/// [`engine`](super::engine) module; see the module documentation of
/// [`workflow`](crate::workflow) for the full state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    /// Draft owned by its creator; not yet submitted for review.
    InProgress,
    /// Submitted; waiting for an admin reviewer.
    AwaitingAdminValidation,
    /// Admin-approved; waiting for a super-admin reviewer.
    #[serde(rename = "AWAITING_SUPERADMIN_VALIDATION")]
    AwaitingSuperAdminValidation,
    /// Reopened by its creator after a rejection.
    BeingModified,
    /// Rejected by a reviewer; carries a rejection reason.
    Rejected,
    /// Fully validated. Terminal: no further transition is accepted.
    Validated,
}

impl RecordStatus {
    /// Returns the status as its canonical wire string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "IN_PROGRESS",
            Self::AwaitingAdminValidation => "AWAITING_ADMIN_VALIDATION",
            Self::AwaitingSuperAdminValidation => "AWAITING_SUPERADMIN_VALIDATION",
            Self::BeingModified => "BEING_MODIFIED",
            Self::Rejected => "REJECTED",
            Self::Validated => "VALIDATED",
        }
    }

    /// Returns `true` if no action can move the record out of this status.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Validated)
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An action a principal can request on a client record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordAction {
    /// Submit a draft or reopened record for admin review.
    Submit,
    /// First-level approval by an admin.
    ValidateAsAdmin,
    /// Final approval by a super-admin.
    ValidateAsSuperAdmin,
    /// Reject the record with a reason.
    Reject,
    /// Reopen a rejected record for editing.
    Edit,
    /// Remove a draft record.
    Delete,
}

impl RecordAction {
    /// Returns the action as a stable lowercase identifier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::ValidateAsAdmin => "validate-as-admin",
            Self::ValidateAsSuperAdmin => "validate-as-superadmin",
            Self::Reject => "reject",
            Self::Edit => "edit",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for RecordAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A client record as returned by the record service.
///
/// The service's copy is authoritative: after a transition the engine
/// replaces its view with the record from the response rather than its own
/// prediction, which absorbs races with other reviewers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRecord {
    /// Service-assigned record identifier.
    pub id: String,
    /// Identifier of the advisor who created the record. Immutable.
    pub creator_id: String,
    /// Current review status.
    pub status: RecordStatus,
    /// When an admin validated the record, if it got that far.
    #[serde(default)]
    pub admin_validated_at: Option<DateTime<Utc>>,
    /// When a super-admin validated the record, if it got that far.
    #[serde(default)]
    pub super_admin_validated_at: Option<DateTime<Utc>>,
    /// Reason supplied by the rejecting reviewer, if rejected.
    #[serde(default)]
    pub rejection_reason: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl ClientRecord {
    /// Returns `true` if the given user created this record.
    #[must_use]
    pub fn is_created_by(&self, user_id: &str) -> bool {
        self.creator_id == user_id
    }
}

/// One page of a record listing.
///
/// Filtering by creator and role happens server-side; this client only
/// consumes the envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPage {
    /// Records on this page.
    pub items: Vec<ClientRecord>,
    /// 1-based page number.
    pub page: u32,
    /// Requested page size.
    pub per_page: u32,
    /// Total number of records matching the listing.
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_names_round_trip() {
        for status in [
            RecordStatus::InProgress,
            RecordStatus::AwaitingAdminValidation,
            RecordStatus::AwaitingSuperAdminValidation,
            RecordStatus::BeingModified,
            RecordStatus::Rejected,
            RecordStatus::Validated,
        ] {
            let json = serde_json::to_value(status).unwrap();
            assert_eq!(json, serde_json::Value::String(status.as_str().to_string()));
            let back: RecordStatus = serde_json::from_value(json).unwrap();
            assert_eq!(back, status);
        }
    }

    #[test]
    fn test_superadmin_status_uses_legacy_spelling() {
        // The service spells this one without an underscore between SUPER
        // and ADMIN.
        assert_eq!(
            serde_json::to_value(RecordStatus::AwaitingSuperAdminValidation).unwrap(),
            serde_json::json!("AWAITING_SUPERADMIN_VALIDATION")
        );
    }

    #[test]
    fn test_only_validated_is_terminal() {
        assert!(RecordStatus::Validated.is_terminal());
        assert!(!RecordStatus::Rejected.is_terminal());
        assert!(!RecordStatus::BeingModified.is_terminal());
        assert!(!RecordStatus::InProgress.is_terminal());
    }

    #[test]
    fn test_record_deserializes_from_service_payload() {
        let record: ClientRecord = serde_json::from_value(serde_json::json!({
            "id": "rec-001",
            "creatorId": "u1",
            "status": "REJECTED",
            "rejectionReason": "incomplete documents",
            "createdAt": "2024-03-01T09:00:00Z",
            "updatedAt": "2024-03-02T10:30:00Z",
        }))
        .unwrap();

        assert_eq!(record.status, RecordStatus::Rejected);
        assert_eq!(
            record.rejection_reason.as_deref(),
            Some("incomplete documents")
        );
        assert!(record.admin_validated_at.is_none());
        assert!(record.is_created_by("u1"));
        assert!(!record.is_created_by("u2"));
    }
}
