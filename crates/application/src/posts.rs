//! Posts use cases of the owning service.
//!
//! Every write validates first, commits inside a transaction, and only then
//! publishes the matching event.

use agora_domain::events::PostEvent;
use agora_domain::posts::{NewPost, Post, PostRepository, UpdatePost};
use agora_domain::transaction::Transactional;
use agora_domain::{DomainError, PostId, Result, UserId};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::publisher::PostEventPublisher;

pub struct PostService<S> {
    store: S,
    publisher: PostEventPublisher,
}

impl<S: PostRepository> PostService<S> {
    pub fn new(store: S, publisher: PostEventPublisher) -> Self {
        Self { store, publisher }
    }

    pub async fn create(&self, new_post: NewPost, now: DateTime<Utc>) -> Result<Post> {
        new_post.validate()?;
        let post = new_post.into_post(PostId::new(), now);

        let post = self
            .store
            .within_transaction(move |tx| {
                Box::pin(async move {
                    tx.create(&post).await?;
                    Ok(post)
                })
            })
            .await?;

        info!(post_id = %post.id, "Post created");
        self.publisher.publish(&PostEvent::Created(post.clone())).await?;
        Ok(post)
    }

    pub async fn update(
        &self,
        post_id: &str,
        update: UpdatePost,
        now: DateTime<Utc>,
    ) -> Result<Post> {
        let post_id = PostId::parse(post_id)?;
        update.validate()?;

        let post = self
            .store
            .within_transaction(move |tx| {
                Box::pin(async move {
                    let mut post = tx.query_by_id(&post_id).await?;
                    post.apply(update, now);
                    tx.update(&post).await?;
                    Ok(post)
                })
            })
            .await?;

        info!(post_id = %post.id, "Post updated");
        self.publisher.publish(&PostEvent::Updated(post.clone())).await?;
        Ok(post)
    }

    /// Delete a post and announce it. Deleting an unknown post is
    /// `PostNotFound` and publishes nothing.
    pub async fn delete(&self, post_id: &str) -> Result<()> {
        let post_id = PostId::parse(post_id)?;

        let deleted = self
            .store
            .within_transaction(move |tx| {
                Box::pin(async move {
                    if !tx.delete(&post_id).await? {
                        return Err(DomainError::PostNotFound { post_id });
                    }
                    Ok(post_id)
                })
            })
            .await?;

        info!(post_id = %deleted, "Post deleted");
        self.publisher.publish(&PostEvent::Deleted(deleted)).await
    }

    pub async fn query(&self, page_number: u32, rows_per_page: u32) -> Result<Vec<Post>> {
        debug!(page_number, rows_per_page, "Querying posts");
        self.store.query(page_number, rows_per_page).await
    }

    pub async fn query_by_id(&self, post_id: &str) -> Result<Post> {
        let post_id = PostId::parse(post_id)?;
        self.store.query_by_id(&post_id).await
    }

    pub async fn query_by_user_id(&self, user_id: &str) -> Result<Vec<Post>> {
        let user_id = UserId::parse(user_id)?;
        self.store.query_by_user_id(&user_id).await
    }
}
