//! Strongly-typed identifiers used throughout the workspace.
//!
//! UUID-backed ids identify rows the platform allocates (tenants, workflows,
//! executions, ...). String-backed ids identify elements chosen by the graph
//! editor (node ids, edge ids, ports) and externally-issued user ids.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random id.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            #[must_use]
            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// The underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an id string.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// The id as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

uuid_id!(
    /// Identifies a tenant.
    TenantId
);
uuid_id!(
    /// Identifies a workflow.
    WorkflowId
);
uuid_id!(
    /// Identifies one execution of a workflow version.
    ExecutionId
);
uuid_id!(
    /// Identifies one step within an execution.
    StepId
);
uuid_id!(
    /// Identifies a webhook endpoint attached to a workflow.
    WebhookId
);
uuid_id!(
    /// Identifies an inbound webhook event record.
    EventId
);
uuid_id!(
    /// Identifies a cron schedule attached to a workflow.
    ScheduleId
);

string_id!(
    /// Identifies a node within a workflow definition. Chosen by the editor.
    NodeId
);
string_id!(
    /// Identifies an edge within a workflow definition. Chosen by the editor.
    EdgeId
);
string_id!(
    /// Identifies a user across the platform. Issued by the account system.
    UserId
);
