use agora_application::CommentService;
use agora_domain::comments::UpdateComment;
use agora_domain::replica::ReplicaRepository;
use agora_domain::{CommentId, DomainError, PostId};
use agora_testing::fixtures::{new_comment, post, test_date, USER_ID};
use agora_testing::{InMemoryCommentRepository, InMemoryReplicaRepository};

const POST_ID: &str = "45b5fbd3-755f-4379-8f07-a58d4a30fa2f";

fn service() -> (InMemoryReplicaRepository, CommentService<InMemoryCommentRepository>) {
    let replica = InMemoryReplicaRepository::new();
    let service = CommentService::new(InMemoryCommentRepository::new(replica.clone()));
    (replica, service)
}

#[tokio::test]
async fn comment_crud() {
    let (_replica, service) = service();
    let post_id = PostId::from_string(POST_ID);

    let created = service
        .create(new_comment(&post_id, "First!"), test_date())
        .await
        .unwrap();
    assert_eq!(service.query_by_id(created.id.as_str()).await.unwrap(), created);
    assert_eq!(service.query_by_post_id(POST_ID).await.unwrap().len(), 1);
    assert_eq!(service.query_by_user_id(USER_ID).await.unwrap().len(), 1);

    let updated = service
        .update(
            created.id.as_str(),
            UpdateComment {
                description: Some("Edited".to_string()),
            },
            test_date() + chrono::Duration::minutes(1),
        )
        .await
        .unwrap();
    assert_eq!(updated.description, "Edited");
    assert_eq!(updated.date_created, created.date_created);

    service.delete(created.id.as_str()).await.unwrap();
    assert!(service.query(1, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_comments_are_reported() {
    let (_replica, service) = service();
    let unknown = CommentId::new();

    assert!(matches!(
        service.delete(unknown.as_str()).await,
        Err(DomainError::CommentNotFound { .. })
    ));
    assert!(matches!(
        service.query_by_id("nope").await,
        Err(DomainError::InvalidId { .. })
    ));
}

#[tokio::test]
async fn post_comments_join_against_the_replica() {
    let (replica, service) = service();
    let post_id = PostId::from_string(POST_ID);

    // Not replicated yet: nothing to join.
    service
        .create(new_comment(&post_id, "early"), test_date())
        .await
        .unwrap();
    assert!(service.query_post_comments(POST_ID).await.unwrap().is_empty());

    replica.insert(&post(POST_ID, "T")).await.unwrap();
    service
        .create(new_comment(&post_id, "late"), test_date())
        .await
        .unwrap();

    let rows = service.query_post_comments(POST_ID).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| row.post.title == "T"));
    assert!(rows.iter().all(|row| row.comment.is_some()));
}

#[tokio::test]
async fn post_without_comments_yields_one_row() {
    let (replica, service) = service();
    replica.insert(&post(POST_ID, "T")).await.unwrap();

    let rows = service.query_post_comments(POST_ID).await.unwrap();

    assert_eq!(rows.len(), 1);
    assert!(rows[0].comment.is_none());
}
