//! Comments use cases of the dependent service.

use agora_domain::comments::{Comment, CommentRepository, NewComment, PostComment, UpdateComment};
use agora_domain::transaction::Transactional;
use agora_domain::{CommentId, DomainError, PostId, Result, UserId};
use chrono::{DateTime, Utc};
use tracing::info;

pub struct CommentService<S> {
    store: S,
}

impl<S: CommentRepository> CommentService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn create(&self, new_comment: NewComment, now: DateTime<Utc>) -> Result<Comment> {
        new_comment.validate()?;
        let comment = new_comment.into_comment(CommentId::new(), now);

        let comment = self
            .store
            .within_transaction(move |tx| {
                Box::pin(async move {
                    tx.create(&comment).await?;
                    Ok(comment)
                })
            })
            .await?;

        info!(comment_id = %comment.id, post_id = %comment.post_id, "Comment created");
        Ok(comment)
    }

    pub async fn update(
        &self,
        comment_id: &str,
        update: UpdateComment,
        now: DateTime<Utc>,
    ) -> Result<Comment> {
        let comment_id = CommentId::parse(comment_id)?;
        update.validate()?;

        self.store
            .within_transaction(move |tx| {
                Box::pin(async move {
                    let mut comment = tx.query_by_id(&comment_id).await?;
                    comment.apply(update, now);
                    tx.update(&comment).await?;
                    Ok(comment)
                })
            })
            .await
    }

    pub async fn delete(&self, comment_id: &str) -> Result<()> {
        let comment_id = CommentId::parse(comment_id)?;
        if !self.store.delete(&comment_id).await? {
            return Err(DomainError::CommentNotFound { comment_id });
        }
        Ok(())
    }

    pub async fn query(&self, page_number: u32, rows_per_page: u32) -> Result<Vec<Comment>> {
        self.store.query(page_number, rows_per_page).await
    }

    pub async fn query_by_id(&self, comment_id: &str) -> Result<Comment> {
        let comment_id = CommentId::parse(comment_id)?;
        self.store.query_by_id(&comment_id).await
    }

    pub async fn query_by_user_id(&self, user_id: &str) -> Result<Vec<Comment>> {
        let user_id = UserId::parse(user_id)?;
        self.store.query_by_user_id(&user_id).await
    }

    pub async fn query_by_post_id(&self, post_id: &str) -> Result<Vec<Comment>> {
        let post_id = PostId::parse(post_id)?;
        self.store.query_by_post_id(&post_id).await
    }

    /// The replicated post joined with its comments.
    pub async fn query_post_comments(&self, post_id: &str) -> Result<Vec<PostComment>> {
        let post_id = PostId::parse(post_id)?;
        self.store.query_post_comments(&post_id).await
    }
}
