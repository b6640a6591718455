//! Subject names for post replication.
//!
//! The posts service publishes on these subjects and the comments service
//! subscribes to them, so both sides take the names from here.
//!
//! ```rust
//! use agora_shared::event_topics::post_topics;
//!
//! assert_eq!(post_topics::CREATED, "post-created");
//! ```

/// Post lifecycle subjects
pub mod post_topics {
    /// A post was created; payload is the full post
    pub const CREATED: &str = "post-created";
    /// A post was updated; payload is the full post after the update
    pub const UPDATED: &str = "post-updated";
    /// A post was deleted; payload is the bare identifier
    pub const DELETED: &str = "post-deleted";
    /// Messages that exhausted their delivery attempts
    pub const DEAD_LETTER: &str = "post-dead-letter";

    /// Every subject the replication subscriber listens on
    pub const ALL: [&str; 3] = [CREATED, UPDATED, DELETED];
}

/// Header carrying the original subject of a dead-lettered message
pub const ORIGINAL_SUBJECT_HEADER: &str = "Agora-Original-Subject";

/// JetStream stream name for a broker cluster id.
///
/// Stream names may not contain `.`, `*`, `>` or whitespace, so anything
/// outside `[A-Za-z0-9_]` becomes `_`.
///
/// ```rust
/// use agora_shared::event_topics::stream_name;
///
/// assert_eq!(stream_name("social-network"), "SOCIAL_NETWORK_POSTS");
/// ```
pub fn stream_name(cluster_id: &str) -> String {
    let sanitized: String = cluster_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{}_POSTS", sanitized)
}

/// Durable consumer name for one subject within a queue group.
///
/// Every instance of a service uses the same queue group, so they bind to the
/// same durable consumer and share its messages.
pub fn durable_name(queue_group: &str, subject: &str) -> String {
    format!("{}-{}", queue_group, subject)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_subjects_are_distinct() {
        let mut subjects = post_topics::ALL.to_vec();
        subjects.push(post_topics::DEAD_LETTER);
        subjects.sort();
        subjects.dedup();
        assert_eq!(subjects.len(), 4);
    }

    #[test]
    fn test_stream_name_sanitizes() {
        assert_eq!(stream_name("social-network"), "SOCIAL_NETWORK_POSTS");
        assert_eq!(stream_name("a.b c"), "A_B_C_POSTS");
    }

    #[test]
    fn test_durable_name_scoped_per_subject() {
        assert_eq!(durable_name("posts", "post-created"), "posts-post-created");
        assert_ne!(
            durable_name("posts", post_topics::CREATED),
            durable_name("posts", post_topics::DELETED)
        );
    }
}
