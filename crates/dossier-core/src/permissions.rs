//! Role-based permission evaluation.
//!
//! Permissions are a pure function of three inputs: the acting principal's
//! role set, whether the principal created the record, and the record's
//! current status. Evaluation never performs I/O and is total: every input
//! combination yields a (possibly empty) action set.
//!
//! # Rules
//!
//! Each rule is evaluated independently; the result is the union of all
//! rules that match.
//!
//! | condition | granted actions |
//! |-----------|-----------------|
//! | creator, status `IN_PROGRESS` or `BEING_MODIFIED` | `submit` |
//! | creator, status `IN_PROGRESS` | `delete` |
//! | creator, status `REJECTED` | `edit` |
//! | `ADMIN`, status `AWAITING_ADMIN_VALIDATION` | `validate-as-admin`, `reject` |
//! | `SUPER_ADMIN`, status `AWAITING_SUPERADMIN_VALIDATION` | `validate-as-superadmin`, `reject` |
//!
//! View permission is separate from mutation and is granted to the creator
//! always, to `ADMIN` while a record awaits admin validation or is
//! validated, and to `SUPER_ADMIN` while a record awaits super-admin
//! validation or is validated.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::workflow::{ClientRecord, RecordAction, RecordStatus};

/// A role held by a principal.
///
/// Roles are a closed vocabulary; a principal may hold several at once.
/// Using an enum rather than comparing role strings removes the
/// case-sensitivity and typo failure modes of the string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Creates and maintains client records.
    Advisor,
    /// First-level reviewer.
    Admin,
    /// Final reviewer.
    SuperAdmin,
}

impl Role {
    /// Returns the role as its canonical wire string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Advisor => "ADVISOR",
            Self::Admin => "ADMIN",
            Self::SuperAdmin => "SUPER_ADMIN",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The set of roles held by one principal.
pub type RoleSet = BTreeSet<Role>;

/// The acting principal's relationship to a record.
///
/// Derived fresh per evaluation from the live session and the record; it
/// is never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionContext {
    /// Roles held by the acting principal.
    pub roles: RoleSet,
    /// Whether the acting principal created the record under evaluation.
    pub is_creator: bool,
}

impl PermissionContext {
    /// Derives the context for `user_id` acting on `record`.
    #[must_use]
    pub fn for_record(user_id: &str, roles: &RoleSet, record: &ClientRecord) -> Self {
        Self {
            roles: roles.clone(),
            is_creator: record.is_created_by(user_id),
        }
    }

    /// Returns the actions this context may request at `status`.
    #[must_use]
    pub fn permitted_actions(&self, status: RecordStatus) -> BTreeSet<RecordAction> {
        permitted_actions(&self.roles, self.is_creator, status)
    }

    /// Returns `true` if this context may view a record at `status`.
    #[must_use]
    pub fn can_view(&self, status: RecordStatus) -> bool {
        can_view(&self.roles, self.is_creator, status)
    }
}

/// Returns the set of actions permitted for the given roles, ownership
/// relation, and record status.
#[must_use]
pub fn permitted_actions(
    roles: &RoleSet,
    is_creator: bool,
    status: RecordStatus,
) -> BTreeSet<RecordAction> {
    let mut actions = BTreeSet::new();

    if is_creator {
        match status {
            RecordStatus::InProgress => {
                actions.insert(RecordAction::Submit);
                actions.insert(RecordAction::Delete);
            },
            RecordStatus::BeingModified => {
                actions.insert(RecordAction::Submit);
            },
            RecordStatus::Rejected => {
                actions.insert(RecordAction::Edit);
            },
            _ => {},
        }
    }

    if roles.contains(&Role::Admin) && status == RecordStatus::AwaitingAdminValidation {
        actions.insert(RecordAction::ValidateAsAdmin);
        actions.insert(RecordAction::Reject);
    }

    if roles.contains(&Role::SuperAdmin) && status == RecordStatus::AwaitingSuperAdminValidation {
        actions.insert(RecordAction::ValidateAsSuperAdmin);
        actions.insert(RecordAction::Reject);
    }

    actions
}

/// Returns `true` if the given roles and ownership relation may view a
/// record at `status`.
#[must_use]
pub fn can_view(roles: &RoleSet, is_creator: bool, status: RecordStatus) -> bool {
    if is_creator {
        return true;
    }

    if roles.contains(&Role::Admin)
        && matches!(
            status,
            RecordStatus::AwaitingAdminValidation | RecordStatus::Validated
        )
    {
        return true;
    }

    roles.contains(&Role::SuperAdmin)
        && matches!(
            status,
            RecordStatus::AwaitingSuperAdminValidation | RecordStatus::Validated
        )
}
