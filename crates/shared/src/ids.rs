//! Identifier newtypes.
//!
//! Identifiers travel as text: the posts service generates them as UUID v4
//! strings, while the comments service stores whatever identifier arrives in
//! a replication payload without re-checking its shape.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Error returned when a caller-supplied identifier is not a UUID.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid identifier: {0}")]
pub struct InvalidIdError(pub String);

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh UUID v4 identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Parse a caller-supplied identifier, requiring the UUID form.
            pub fn parse(s: &str) -> Result<Self, InvalidIdError> {
                Uuid::parse_str(s)
                    .map(|_| Self(s.to_string()))
                    .map_err(|_| InvalidIdError(s.to_string()))
            }

            /// Wrap an identifier as-is, without validation.
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Identifier of a post, owned by the posts service.
    PostId
);
string_id!(
    /// Identifier of a comment, owned by the comments service.
    CommentId
);
string_id!(
    /// Identifier of the user who authored a post or comment.
    UserId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_uuids() {
        let id = PostId::new();
        assert!(Uuid::parse_str(id.as_str()).is_ok());
        assert_ne!(PostId::new(), id);
    }

    #[test]
    fn parse_rejects_non_uuid() {
        assert_eq!(
            CommentId::parse("p1"),
            Err(InvalidIdError("p1".to_string()))
        );
        let raw = "45b5fbd3-755f-4379-8f07-a58d4a30fa2f";
        assert_eq!(PostId::parse(raw).unwrap().as_str(), raw);
    }

    #[test]
    fn from_string_keeps_opaque_ids() {
        let id = PostId::from_string("p1");
        assert_eq!(id.to_string(), "p1");
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = UserId::from_string("u-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"u-1\"");
    }
}
