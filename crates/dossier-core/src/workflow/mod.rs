//! Client record approval workflow.
//!
//! A record moves through multi-level human review. Transitions are
//! validated locally against the table below and against the acting
//! principal's permissions before any network call, then executed through
//! the authenticated gateway; the service's returned record is
//! authoritative.
//!
//! # State Machine
//!
//! ```text
//!              submit                      validateAsAdmin                   validateAsSuperAdmin
//! IN_PROGRESS ──────► AWAITING_ADMIN_VALIDATION ──────► AWAITING_SUPERADMIN_VALIDATION ──────► VALIDATED
//!     │                        │                                    │
//!     │ delete                 │ reject                             │ reject
//!     ▼                        ▼                                    │
//! (removed)                 REJECTED ◄──────────────────────────────┘
//!                              │ edit
//!                              ▼
//!                       BEING_MODIFIED ── submit ──► AWAITING_ADMIN_VALIDATION
//! ```
//!
//! # Valid Transitions
//!
//! | From | Action | To | Required role/relation |
//! |------|--------|----|------------------------|
//! | `IN_PROGRESS`, `BEING_MODIFIED` | `submit` | `AWAITING_ADMIN_VALIDATION` | creator |
//! | `AWAITING_ADMIN_VALIDATION` | `validate-as-admin` | `AWAITING_SUPERADMIN_VALIDATION` | `ADMIN` |
//! | `AWAITING_SUPERADMIN_VALIDATION` | `validate-as-superadmin` | `VALIDATED` | `SUPER_ADMIN` |
//! | `AWAITING_ADMIN_VALIDATION` | `reject` | `REJECTED` | `ADMIN` |
//! | `AWAITING_SUPERADMIN_VALIDATION` | `reject` | `REJECTED` | `SUPER_ADMIN` |
//! | `REJECTED` | `edit` | `BEING_MODIFIED` | creator |
//! | `IN_PROGRESS` | `delete` | (removed) | creator |
//!
//! Any `(status, action)` pair not in the table fails with
//! [`WorkflowError::InvalidTransition`] before any network call. A
//! super-admin rejection deliberately has no path back to the admin queue
//! other than the creator reopening and resubmitting; the service has
//! always worked that way and this client preserves it.

pub mod engine;
pub mod error;
pub mod record;


pub use engine::{transition_kind, TransitionKind, TransitionOutcome, WorkflowEngine};
pub use error::WorkflowError;
pub use record::{ClientRecord, RecordAction, RecordPage, RecordStatus};
