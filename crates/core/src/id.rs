//! String identifiers for resources.
//!
//! Resources are referenced by id, never by pointer, so every identifier here
//! is a cheap-to-clone, serializable newtype over `String`.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! define_string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier from anything string-like.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// Unique name of a resource within one orchestrator graph.
    ResourceId
);

define_string_id!(
    /// Opaque tag grouping resources that share provisioning behaviour
    /// (for example `"topic"` or `"model"`).
    ResourceKind
);

define_string_id!(
    /// Stable key used to recognise that a remote create already succeeded.
    ///
    /// The key never embeds a run or attempt number, so the same resource
    /// produces the same key across orchestrator restarts.
    IdempotencyKey
);

impl IdempotencyKey {
    /// Derive the default key for a resource: its id.
    #[must_use]
    pub fn for_resource(id: &ResourceId) -> Self {
        Self(id.as_str().to_owned())
    }
}
