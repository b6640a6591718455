//! Post write path: validate, commit, then publish.

use std::sync::Arc;

use agora_application::{PostEventPublisher, PostService};
use agora_domain::codec::{BincodeCodec, PayloadCodec};
use agora_domain::event_topics::post_topics;
use agora_domain::events::{EventKind, PostEvent};
use agora_domain::posts::{PostRepository, UpdatePost};
use agora_domain::transaction::Transactional;
use agora_domain::{DomainError, PostId};
use agora_testing::fixtures::{new_post, post, test_date};
use agora_testing::{InMemoryBroker, InMemoryPostRepository};

struct Harness {
    broker: InMemoryBroker,
    store: InMemoryPostRepository,
    service: PostService<InMemoryPostRepository>,
}

fn harness() -> Harness {
    let broker = InMemoryBroker::new();
    let store = InMemoryPostRepository::new();
    let publisher = PostEventPublisher::new(Arc::new(broker.clone()), Arc::new(BincodeCodec));
    Harness {
        service: PostService::new(store.clone(), publisher),
        broker,
        store,
    }
}

async fn published_events(broker: &InMemoryBroker, kind: EventKind) -> Vec<PostEvent> {
    broker
        .published(kind.subject())
        .await
        .iter()
        .map(|m| BincodeCodec.decode(kind, &m.payload).unwrap())
        .collect()
}

#[tokio::test]
async fn create_commits_then_publishes_full_post() {
    let h = harness();

    let created = h.service.create(new_post("Hello"), test_date()).await.unwrap();

    assert_eq!(h.store.committed().await, vec![created.clone()]);
    assert_eq!(
        published_events(&h.broker, EventKind::Created).await,
        vec![PostEvent::Created(created)]
    );
}

#[tokio::test]
async fn invalid_input_writes_and_publishes_nothing() {
    let h = harness();

    let err = h.service.create(new_post(""), test_date()).await.unwrap_err();

    assert!(matches!(err, DomainError::Validation { .. }));
    assert!(h.store.committed().await.is_empty());
    assert!(h.broker.published(post_topics::CREATED).await.is_empty());
}

#[tokio::test]
async fn publish_failure_surfaces_after_commit() {
    let h = harness();
    h.broker.set_fail_publishes(true);

    let err = h.service.create(new_post("Hello"), test_date()).await.unwrap_err();

    match err {
        DomainError::Publish { subject, .. } => assert_eq!(subject, "post-created"),
        other => panic!("expected publish error, got {other}"),
    }
    let committed = h.store.committed().await;
    assert_eq!(committed.len(), 1);
    assert_eq!(committed[0].title, "Hello");
}

#[tokio::test]
async fn update_publishes_post_after_update() {
    let h = harness();
    let created = h.service.create(new_post("Hello"), test_date()).await.unwrap();
    let later = test_date() + chrono::Duration::hours(2);

    let updated = h
        .service
        .update(
            created.id.as_str(),
            UpdatePost {
                title: Some("Edited".to_string()),
                description: None,
            },
            later,
        )
        .await
        .unwrap();

    assert_eq!(updated.title, "Edited");
    assert_eq!(updated.description, created.description);
    assert_eq!(updated.date_updated, later);
    assert_eq!(
        published_events(&h.broker, EventKind::Updated).await,
        vec![PostEvent::Updated(updated.clone())]
    );
    assert_eq!(h.service.query_by_id(created.id.as_str()).await.unwrap(), updated);
}

#[tokio::test]
async fn update_rejects_bad_ids() {
    let h = harness();

    let err = h
        .service
        .update("not-a-uuid", UpdatePost::default(), test_date())
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidId { .. }));

    let missing = PostId::new();
    let err = h
        .service
        .update(missing.as_str(), UpdatePost::default(), test_date())
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::PostNotFound { post_id } if post_id == missing));
    assert!(h.broker.published(post_topics::UPDATED).await.is_empty());
}

#[tokio::test]
async fn delete_publishes_bare_identifier() {
    let h = harness();
    let created = h.service.create(new_post("Hello"), test_date()).await.unwrap();

    h.service.delete(created.id.as_str()).await.unwrap();

    assert!(h.store.committed().await.is_empty());
    assert_eq!(
        published_events(&h.broker, EventKind::Deleted).await,
        vec![PostEvent::Deleted(created.id)]
    );
}

#[tokio::test]
async fn delete_of_unknown_post_publishes_nothing() {
    let h = harness();

    let err = h.service.delete(&PostId::new().to_string()).await.unwrap_err();

    assert!(matches!(err, DomainError::PostNotFound { .. }));
    assert!(h.broker.published(post_topics::DELETED).await.is_empty());
}

#[tokio::test]
async fn failed_second_statement_rolls_back_the_first() {
    let store = InMemoryPostRepository::new();
    let first = post("45b5fbd3-755f-4379-8f07-a58d4a30fa2f", "first");
    let second = post("a2b0639f-2cc6-44b8-b97b-15d69dbb511e", "second");
    store.fail_writes_for(&second.id).await;

    let result = store
        .within_transaction(move |tx| {
            Box::pin(async move {
                tx.create(&first).await?;
                tx.create(&second).await?;
                Ok(())
            })
        })
        .await;

    assert!(result.is_err());
    assert!(store.committed().await.is_empty());
}

#[tokio::test]
async fn queries_page_and_filter() {
    let h = harness();
    for title in ["a", "b", "c"] {
        h.service.create(new_post(title), test_date()).await.unwrap();
    }

    assert_eq!(h.service.query(1, 2).await.unwrap().len(), 2);
    assert_eq!(h.service.query(2, 2).await.unwrap().len(), 1);
    assert!(h.service.query(3, 2).await.unwrap().is_empty());

    let mine = h
        .service
        .query_by_user_id(agora_testing::fixtures::USER_ID)
        .await
        .unwrap();
    assert_eq!(mine.len(), 3);
    assert!(matches!(
        h.service.query_by_user_id("bob").await,
        Err(DomainError::InvalidId { .. })
    ));
}

#[tokio::test]
async fn query_pages_follow_creation_date() {
    let h = harness();
    let later = h
        .service
        .create(new_post("later"), test_date() + chrono::Duration::hours(1))
        .await
        .unwrap();
    let earlier = h.service.create(new_post("earlier"), test_date()).await.unwrap();

    let first = h.service.query(1, 1).await.unwrap();
    let second = h.service.query(2, 1).await.unwrap();
    assert_eq!(first, vec![earlier]);
    assert_eq!(second, vec![later]);
}
