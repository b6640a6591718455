//! Comments, owned by the comments service, and the joined read model that
//! pairs them with replicated posts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::posts::{require_text, Post};
use crate::shared_kernel::{CommentId, DomainError, PostId, Result, UserId};
use crate::transaction::Transactional;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub description: String,
    pub post_id: PostId,
    pub user_id: UserId,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewComment {
    pub description: String,
    pub post_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateComment {
    pub description: Option<String>,
}

/// A replicated post with one of its comments, or with none when the post
/// has no comments yet. Computed at query time, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostComment {
    pub post: Post,
    pub comment: Option<Comment>,
}

impl NewComment {
    pub fn validate(&self) -> Result<()> {
        require_text("description", &self.description)?;
        PostId::parse(&self.post_id)
            .map_err(|_| DomainError::validation("post_id", "must be a UUID"))?;
        UserId::parse(&self.user_id)
            .map_err(|_| DomainError::validation("user_id", "must be a UUID"))?;
        Ok(())
    }

    pub fn into_comment(self, id: CommentId, now: DateTime<Utc>) -> Comment {
        Comment {
            id,
            description: self.description,
            post_id: PostId::from_string(self.post_id),
            user_id: UserId::from_string(self.user_id),
            date_created: now,
            date_updated: now,
        }
    }
}

impl UpdateComment {
    pub fn validate(&self) -> Result<()> {
        if let Some(description) = &self.description {
            require_text("description", description)?;
        }
        Ok(())
    }
}

impl Comment {
    pub fn apply(&mut self, update: UpdateComment, now: DateTime<Utc>) {
        if let Some(description) = update.description {
            self.description = description;
        }
        self.date_updated = now;
    }
}

/// Storage port of the comments service's own records.
#[async_trait]
pub trait CommentRepository: Transactional {
    async fn create(&self, comment: &Comment) -> Result<()>;

    async fn update(&self, comment: &Comment) -> Result<()>;

    async fn delete(&self, comment_id: &CommentId) -> Result<bool>;

    async fn query(&self, page_number: u32, rows_per_page: u32) -> Result<Vec<Comment>>;

    async fn query_by_id(&self, comment_id: &CommentId) -> Result<Comment>;

    async fn query_by_user_id(&self, user_id: &UserId) -> Result<Vec<Comment>>;

    async fn query_by_post_id(&self, post_id: &PostId) -> Result<Vec<Comment>>;

    /// Outer join of the replicated post with its comments.
    ///
    /// Empty when the post has not been replicated (yet); one row with
    /// `comment: None` when it has no comments.
    async fn query_post_comments(&self, post_id: &PostId) -> Result<Vec<PostComment>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn new_comment() -> NewComment {
        NewComment {
            description: "Nice post".to_string(),
            post_id: "45b5fbd3-755f-4379-8f07-a58d4a30fa2f".to_string(),
            user_id: "5cf37266-3473-4006-984f-9325122678b7".to_string(),
        }
    }

    #[test]
    fn validates_required_fields() {
        assert!(new_comment().validate().is_ok());

        let missing = NewComment {
            description: String::new(),
            ..new_comment()
        };
        assert!(matches!(
            missing.validate(),
            Err(DomainError::Validation { field, .. }) if field == "description"
        ));

        let bad_post = NewComment {
            post_id: "p1".to_string(),
            ..new_comment()
        };
        assert!(bad_post.validate().is_err());
    }

    #[test]
    fn apply_moves_date_updated() {
        let created = Utc.with_ymd_and_hms(2018, 10, 1, 0, 0, 0).unwrap();
        let mut comment = new_comment().into_comment(CommentId::new(), created);
        let later = created + chrono::Duration::minutes(5);

        comment.apply(
            UpdateComment {
                description: Some("Edited".to_string()),
            },
            later,
        );

        assert_eq!(comment.description, "Edited");
        assert_eq!(comment.date_created, created);
        assert_eq!(comment.date_updated, later);
    }
}
