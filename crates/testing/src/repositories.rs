//! In-memory repositories - TEST ONLY
//!
//! The post and comment repositories honor the transactional contract:
//! writes made through a store bound to a transaction are staged and only
//! become visible to other stores on commit.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use agora_domain::comments::{Comment, CommentRepository, PostComment};
use agora_domain::posts::{page_offset, Post, PostRepository};
use agora_domain::replica::{ReplicaRepository, ReplicaWrite};
use agora_domain::transaction::Transactional;
use agora_domain::{CommentId, DomainError, PostId, Result, UserId};
use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

/// Staged writes of one transaction; `None` once committed or rolled back.
pub type StagedWrites<K, V> = Arc<Mutex<Option<Vec<(K, Option<V>)>>>>;

/// Keyed table with staged-transaction support and write failure injection.
struct Table<K, V> {
    rows: Arc<RwLock<BTreeMap<K, V>>>,
    failing_keys: Arc<RwLock<HashSet<K>>>,
    tx: Option<StagedWrites<K, V>>,
}

impl<K, V> Clone for Table<K, V> {
    fn clone(&self) -> Self {
        Self {
            rows: self.rows.clone(),
            failing_keys: self.failing_keys.clone(),
            tx: self.tx.clone(),
        }
    }
}

impl<K, V> Default for Table<K, V> {
    fn default() -> Self {
        Self {
            rows: Arc::default(),
            failing_keys: Arc::default(),
            tx: None,
        }
    }
}

impl<K, V> Table<K, V>
where
    K: Ord + Clone + std::hash::Hash + std::fmt::Display + Send + Sync,
    V: Clone + Send + Sync,
{
    fn bound(&self, tx: StagedWrites<K, V>) -> Self {
        Self {
            rows: self.rows.clone(),
            failing_keys: self.failing_keys.clone(),
            tx: Some(tx),
        }
    }

    /// Rows as this store sees them: committed rows overlaid with its own
    /// staged writes.
    async fn snapshot(&self) -> Result<BTreeMap<K, V>> {
        let mut rows = self.rows.read().await.clone();
        if let Some(tx) = &self.tx {
            let staged = tx.lock().await;
            let writes = staged.as_ref().ok_or_else(completed)?;
            for (key, value) in writes {
                match value {
                    Some(value) => rows.insert(key.clone(), value.clone()),
                    None => rows.remove(key),
                };
            }
        }
        Ok(rows)
    }

    async fn write(&self, key: K, value: Option<V>) -> Result<()> {
        if self.failing_keys.read().await.contains(&key) {
            return Err(DomainError::infrastructure(format!(
                "injected write failure for {}",
                key
            )));
        }
        match &self.tx {
            Some(tx) => {
                let mut staged = tx.lock().await;
                staged.as_mut().ok_or_else(completed)?.push((key, value));
            }
            None => {
                let mut rows = self.rows.write().await;
                match value {
                    Some(value) => rows.insert(key, value),
                    None => rows.remove(&key),
                };
            }
        }
        Ok(())
    }

    async fn commit(&self, tx: StagedWrites<K, V>) -> Result<()> {
        let writes = tx.lock().await.take().ok_or_else(completed)?;
        let mut rows = self.rows.write().await;
        for (key, value) in writes {
            match value {
                Some(value) => rows.insert(key, value),
                None => rows.remove(&key),
            };
        }
        Ok(())
    }

    async fn rollback(&self, tx: StagedWrites<K, V>) -> Result<()> {
        tx.lock().await.take().ok_or_else(completed)?;
        Ok(())
    }
}

fn completed() -> DomainError {
    DomainError::Transaction {
        message: "transaction already completed".to_string(),
    }
}

fn page<T: Clone>(rows: impl Iterator<Item = T>, page_number: u32, rows_per_page: u32) -> Vec<T> {
    rows.skip(page_offset(page_number, rows_per_page) as usize)
        .take(rows_per_page as usize)
        .collect()
}

// ============================================================================
// Posts
// ============================================================================

#[derive(Clone, Default)]
pub struct InMemoryPostRepository {
    table: Table<PostId, Post>,
}

impl InMemoryPostRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write touching `post_id` fail.
    pub async fn fail_writes_for(&self, post_id: &PostId) {
        self.table.failing_keys.write().await.insert(post_id.clone());
    }

    /// Committed rows, bypassing any transaction.
    pub async fn committed(&self) -> Vec<Post> {
        self.table.rows.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl Transactional for InMemoryPostRepository {
    type Tx = StagedWrites<PostId, Post>;

    async fn begin(&self) -> Result<Self::Tx> {
        Ok(Arc::new(Mutex::new(Some(Vec::new()))))
    }

    async fn commit(&self, tx: Self::Tx) -> Result<()> {
        self.table.commit(tx).await
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<()> {
        self.table.rollback(tx).await
    }

    fn with_transaction(&self, tx: Self::Tx) -> Self {
        Self {
            table: self.table.bound(tx),
        }
    }

    fn in_transaction(&self) -> bool {
        self.table.tx.is_some()
    }
}

#[async_trait]
impl PostRepository for InMemoryPostRepository {
    async fn create(&self, post: &Post) -> Result<()> {
        if self.table.snapshot().await?.contains_key(&post.id) {
            return Err(DomainError::infrastructure(format!(
                "duplicate key value violates unique constraint: {}",
                post.id
            )));
        }
        self.table.write(post.id.clone(), Some(post.clone())).await
    }

    async fn update(&self, post: &Post) -> Result<()> {
        self.table.write(post.id.clone(), Some(post.clone())).await
    }

    async fn delete(&self, post_id: &PostId) -> Result<bool> {
        if !self.table.snapshot().await?.contains_key(post_id) {
            return Ok(false);
        }
        self.table.write(post_id.clone(), None).await?;
        Ok(true)
    }

    async fn query(&self, page_number: u32, rows_per_page: u32) -> Result<Vec<Post>> {
        let mut rows: Vec<_> = self.table.snapshot().await?.into_values().collect();
        rows.sort_by(|a, b| (a.date_created, &a.id).cmp(&(b.date_created, &b.id)));
        Ok(page(rows.into_iter(), page_number, rows_per_page))
    }

    async fn query_by_id(&self, post_id: &PostId) -> Result<Post> {
        self.table
            .snapshot()
            .await?
            .remove(post_id)
            .ok_or_else(|| DomainError::PostNotFound {
                post_id: post_id.clone(),
            })
    }

    async fn query_by_user_id(&self, user_id: &UserId) -> Result<Vec<Post>> {
        let rows = self.table.snapshot().await?;
        Ok(rows
            .into_values()
            .filter(|post| &post.user_id == user_id)
            .collect())
    }
}

// ============================================================================
// Replica
// ============================================================================

#[derive(Clone, Default)]
pub struct InMemoryReplicaRepository {
    rows: Arc<RwLock<BTreeMap<PostId, Post>>>,
    tombstones: Arc<RwLock<HashSet<PostId>>>,
    failing: Arc<RwLock<HashSet<PostId>>>,
}

impl InMemoryReplicaRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write touching `post_id` fail until cleared.
    pub async fn fail_writes_for(&self, post_id: &PostId) {
        self.failing.write().await.insert(post_id.clone());
    }

    pub async fn clear_failures(&self) {
        self.failing.write().await.clear();
    }

    pub async fn all(&self) -> Vec<Post> {
        self.rows.read().await.values().cloned().collect()
    }

    async fn check(&self, post_id: &PostId) -> Result<()> {
        if self.failing.read().await.contains(post_id) {
            return Err(DomainError::infrastructure(format!(
                "injected replica failure for {}",
                post_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ReplicaRepository for InMemoryReplicaRepository {
    async fn insert(&self, post: &Post) -> Result<ReplicaWrite> {
        self.check(&post.id).await?;
        if self.tombstones.read().await.contains(&post.id) {
            return Ok(ReplicaWrite::Tombstoned);
        }
        let mut rows = self.rows.write().await;
        if rows.contains_key(&post.id) {
            return Ok(ReplicaWrite::AlreadyPresent);
        }
        rows.insert(post.id.clone(), post.clone());
        Ok(ReplicaWrite::Applied)
    }

    async fn update(&self, post: &Post) -> Result<ReplicaWrite> {
        self.check(&post.id).await?;
        let mut rows = self.rows.write().await;
        match rows.get_mut(&post.id) {
            Some(row) => {
                row.title = post.title.clone();
                row.description = post.description.clone();
                row.user_id = post.user_id.clone();
                row.date_updated = post.date_updated;
                Ok(ReplicaWrite::Applied)
            }
            None => Ok(ReplicaWrite::Missing),
        }
    }

    async fn delete(&self, post_id: &PostId) -> Result<ReplicaWrite> {
        self.check(post_id).await?;
        self.tombstones.write().await.insert(post_id.clone());
        match self.rows.write().await.remove(post_id) {
            Some(_) => Ok(ReplicaWrite::Applied),
            None => Ok(ReplicaWrite::Missing),
        }
    }

    async fn find_by_id(&self, post_id: &PostId) -> Result<Option<Post>> {
        Ok(self.rows.read().await.get(post_id).cloned())
    }
}

// ============================================================================
// Comments
// ============================================================================

/// Comments repository joined against an [`InMemoryReplicaRepository`].
#[derive(Clone)]
pub struct InMemoryCommentRepository {
    table: Table<CommentId, Comment>,
    replica: InMemoryReplicaRepository,
}

impl InMemoryCommentRepository {
    pub fn new(replica: InMemoryReplicaRepository) -> Self {
        Self {
            table: Table::default(),
            replica,
        }
    }
}

#[async_trait]
impl Transactional for InMemoryCommentRepository {
    type Tx = StagedWrites<CommentId, Comment>;

    async fn begin(&self) -> Result<Self::Tx> {
        Ok(Arc::new(Mutex::new(Some(Vec::new()))))
    }

    async fn commit(&self, tx: Self::Tx) -> Result<()> {
        self.table.commit(tx).await
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<()> {
        self.table.rollback(tx).await
    }

    fn with_transaction(&self, tx: Self::Tx) -> Self {
        Self {
            table: self.table.bound(tx),
            replica: self.replica.clone(),
        }
    }

    fn in_transaction(&self) -> bool {
        self.table.tx.is_some()
    }
}

#[async_trait]
impl CommentRepository for InMemoryCommentRepository {
    async fn create(&self, comment: &Comment) -> Result<()> {
        self.table
            .write(comment.id.clone(), Some(comment.clone()))
            .await
    }

    async fn update(&self, comment: &Comment) -> Result<()> {
        self.table
            .write(comment.id.clone(), Some(comment.clone()))
            .await
    }

    async fn delete(&self, comment_id: &CommentId) -> Result<bool> {
        if !self.table.snapshot().await?.contains_key(comment_id) {
            return Ok(false);
        }
        self.table.write(comment_id.clone(), None).await?;
        Ok(true)
    }

    async fn query(&self, page_number: u32, rows_per_page: u32) -> Result<Vec<Comment>> {
        let mut rows: Vec<_> = self.table.snapshot().await?.into_values().collect();
        rows.sort_by(|a, b| (a.date_created, &a.id).cmp(&(b.date_created, &b.id)));
        Ok(page(rows.into_iter(), page_number, rows_per_page))
    }

    async fn query_by_id(&self, comment_id: &CommentId) -> Result<Comment> {
        self.table
            .snapshot()
            .await?
            .remove(comment_id)
            .ok_or_else(|| DomainError::CommentNotFound {
                comment_id: comment_id.clone(),
            })
    }

    async fn query_by_user_id(&self, user_id: &UserId) -> Result<Vec<Comment>> {
        let rows = self.table.snapshot().await?;
        Ok(rows
            .into_values()
            .filter(|comment| &comment.user_id == user_id)
            .collect())
    }

    async fn query_by_post_id(&self, post_id: &PostId) -> Result<Vec<Comment>> {
        let rows = self.table.snapshot().await?;
        Ok(rows
            .into_values()
            .filter(|comment| &comment.post_id == post_id)
            .collect())
    }

    async fn query_post_comments(&self, post_id: &PostId) -> Result<Vec<PostComment>> {
        let Some(post) = self.replica.find_by_id(post_id).await? else {
            return Ok(Vec::new());
        };

        let comments = self.query_by_post_id(post_id).await?;
        if comments.is_empty() {
            return Ok(vec![PostComment {
                post,
                comment: None,
            }]);
        }

        Ok(comments
            .into_iter()
            .map(|comment| PostComment {
                post: post.clone(),
                comment: Some(comment),
            })
            .collect())
    }
}
