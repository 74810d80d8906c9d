//! Type-safe identifier wrappers around [`String`].
//!
//! Every entity in the office world is keyed by a stable, human-readable
//! string (`task_req_001_02`, `art_research_report_v2`, ...). Wrapping each
//! kind in its own newtype prevents a task id from being handed to a lookup
//! that expects an agent id. Ordering is plain lexicographic string order,
//! which is the order every deterministic iteration in the store relies on.

use std::borrow::Borrow;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Generates a newtype wrapper around [`String`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub String);

        impl $name {
            /// Wrap an existing identifier string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Return the inner [`String`].
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
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

        impl core::ops::Deref for $name {
            type Target = str;

            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

define_id! {
    /// Unique identifier for an agent (NPC or the player avatar).
    AgentId
}

define_id! {
    /// Unique identifier for a project.
    ProjectId
}

define_id! {
    /// Unique identifier for a task within a project.
    TaskId
}

define_id! {
    /// Unique identifier for one artifact revision.
    ArtifactId
}

define_id! {
    /// Unique identifier for a decision raised to the user.
    DecisionId
}

define_id! {
    /// Unique identifier for an office decor item.
    DecorId
}

define_id! {
    /// Unique identifier for a background-work (`OpenClaw`) run.
    RunId
}

define_id! {
    /// Unique identifier for a connected client session.
    SessionId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_as_bare_strings() {
        let id = TaskId::new("task_copy");
        let json = serde_json::to_string(&id).ok();
        assert_eq!(json.as_deref(), Some("\"task_copy\""));
    }

    #[test]
    fn ids_order_lexicographically() {
        let mut ids = vec![
            AgentId::from("agent_research_1"),
            AgentId::from("agent_bd"),
            AgentId::from("agent_eng_1"),
        ];
        ids.sort();
        let names: Vec<&str> = ids.iter().map(AgentId::as_str).collect();
        assert_eq!(names, vec!["agent_bd", "agent_eng_1", "agent_research_1"]);
    }

    #[test]
    fn ids_compare_with_str() {
        let id = ProjectId::from("proj_abc");
        assert!(id == "proj_abc");
        assert_eq!(id.to_string(), "proj_abc");
    }
}
