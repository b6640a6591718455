//! Posts, owned by the posts service.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared_kernel::{DomainError, PostId, Result, UserId};
use crate::transaction::Transactional;

/// A post as stored by the posts service and replicated to the comments
/// service field for field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub title: String,
    pub description: String,
    pub user_id: UserId,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}

/// What a caller supplies to create a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPost {
    pub title: String,
    pub description: String,
    pub user_id: String,
}

/// Partial update; absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePost {
    pub title: Option<String>,
    pub description: Option<String>,
}

impl NewPost {
    pub fn validate(&self) -> Result<()> {
        require_text("title", &self.title)?;
        require_text("description", &self.description)?;
        UserId::parse(&self.user_id)
            .map_err(|_| DomainError::validation("user_id", "must be a UUID"))?;
        Ok(())
    }

    /// Build the post this request describes, stamped at `now`.
    pub fn into_post(self, id: PostId, now: DateTime<Utc>) -> Post {
        Post {
            id,
            title: self.title,
            description: self.description,
            user_id: UserId::from_string(self.user_id),
            date_created: now,
            date_updated: now,
        }
    }
}

impl UpdatePost {
    pub fn validate(&self) -> Result<()> {
        if let Some(title) = &self.title {
            require_text("title", title)?;
        }
        if let Some(description) = &self.description {
            require_text("description", description)?;
        }
        Ok(())
    }
}

impl Post {
    /// Apply a partial update and move `date_updated` to `now`.
    pub fn apply(&mut self, update: UpdatePost, now: DateTime<Utc>) {
        if let Some(title) = update.title {
            self.title = title;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        self.date_updated = now;
    }
}

pub(crate) fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(field, "is required"));
    }
    Ok(())
}

/// Storage port of the posts service.
///
/// Every method runs against whatever the store is bound to: the pool, or
/// the transaction handed out by [`Transactional::within_transaction`].
#[async_trait]
pub trait PostRepository: Transactional {
    async fn create(&self, post: &Post) -> Result<()>;

    /// Overwrite the mutable fields of an existing post.
    async fn update(&self, post: &Post) -> Result<()>;

    /// Remove a post; `false` when no row matched.
    async fn delete(&self, post_id: &PostId) -> Result<bool>;

    /// One page of posts ordered by creation date, then id. Pages are 1-based.
    async fn query(&self, page_number: u32, rows_per_page: u32) -> Result<Vec<Post>>;

    async fn query_by_id(&self, post_id: &PostId) -> Result<Post>;

    async fn query_by_user_id(&self, user_id: &UserId) -> Result<Vec<Post>>;
}

/// Row offset of a 1-based page. Page 0 is treated as page 1.
pub fn page_offset(page_number: u32, rows_per_page: u32) -> u64 {
    u64::from(page_number.max(1) - 1) * u64::from(rows_per_page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn fixed_date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 10, 1, 0, 0, 0).unwrap()
    }

    fn new_post() -> NewPost {
        NewPost {
            title: "First post".to_string(),
            description: "Hello".to_string(),
            user_id: "5cf37266-3473-4006-984f-9325122678b7".to_string(),
        }
    }

    #[test]
    fn new_post_builds_record() {
        let id = PostId::new();
        let post = new_post().into_post(id.clone(), fixed_date());

        assert_eq!(post.id, id);
        assert_eq!(post.date_created, fixed_date());
        assert_eq!(post.date_updated, fixed_date());
    }

    #[rstest]
    #[case::missing_title(NewPost { title: "".into(), ..new_post() }, "title")]
    #[case::blank_description(NewPost { description: "  ".into(), ..new_post() }, "description")]
    #[case::bad_user(NewPost { user_id: "bob".into(), ..new_post() }, "user_id")]
    fn new_post_validation(#[case] input: NewPost, #[case] field: &str) {
        match input.validate() {
            Err(DomainError::Validation { field: got, .. }) => assert_eq!(got, field),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn update_applies_only_present_fields() {
        let mut post = new_post().into_post(PostId::new(), fixed_date());
        let later = fixed_date() + chrono::Duration::hours(1);

        post.apply(
            UpdatePost {
                title: Some("Edited".to_string()),
                description: None,
            },
            later,
        );

        assert_eq!(post.title, "Edited");
        assert_eq!(post.description, "Hello");
        assert_eq!(post.date_created, fixed_date());
        assert_eq!(post.date_updated, later);
    }

    #[test]
    fn update_rejects_blank_fields() {
        let update = UpdatePost {
            title: Some(String::new()),
            description: None,
        };
        assert!(update.validate().is_err());
        assert!(UpdatePost::default().validate().is_ok());
    }

    #[test]
    fn page_offsets() {
        assert_eq!(page_offset(1, 10), 0);
        assert_eq!(page_offset(3, 10), 20);
        assert_eq!(page_offset(0, 10), 0);
    }
}
