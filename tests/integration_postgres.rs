use attachment_coordinator::adapters::database::AttachmentRepository;
use attachment_coordinator::adapters::storage::{InMemoryStorage, ObjectStorage};
use attachment_coordinator::config::HealthConfig;
use attachment_coordinator::core::health_service::HealthService;
use attachment_coordinator::domain::attachment::{AttachmentStatus, NewAttachment};
use attachment_coordinator::error::{AppError, MetadataError};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

mod common;

fn new_attachment() -> NewAttachment {
    let id = Uuid::new_v4();
    NewAttachment {
        id,
        key: format!("attachments/test/{id}.png"),
        file_name: "cat.png".to_string(),
        mime_type: "image/png".to_string(),
        size_bytes: 4,
    }
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_repository_lifecycle() {
    let pool = common::get_test_pool().await;
    let repo = attachment_coordinator::adapters::database::PgAttachmentRepository::new(pool);

    let created = repo.create(new_attachment()).await.unwrap();
    assert_eq!(created.status, AttachmentStatus::Pending);
    assert!(created.url.is_none());

    let completed = repo.complete(created.id, "http://cdn.local/a.png").await.unwrap();
    assert_eq!(completed.status, AttachmentStatus::Complete);
    assert_eq!(completed.url.as_deref(), Some("http://cdn.local/a.png"));
    assert!(completed.updated_at >= created.updated_at);

    let found = repo.find_by_id(created.id).await.unwrap().unwrap();
    assert_eq!(found.key, created.key);

    repo.delete(created.id).await.unwrap();
    assert!(repo.find_by_id(created.id).await.unwrap().is_none());
    assert!(matches!(repo.delete(created.id).await, Err(MetadataError::NotFound)));
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_complete_does_not_revive_deleted_record() {
    let pool = common::get_test_pool().await;
    let repo = attachment_coordinator::adapters::database::PgAttachmentRepository::new(pool);

    let created = repo.create(new_attachment()).await.unwrap();
    repo.delete(created.id).await.unwrap();

    assert!(matches!(repo.complete(created.id, "http://cdn.local/a.png").await, Err(MetadataError::NotFound)));
    assert!(matches!(repo.mark_failed(created.id).await, Err(MetadataError::NotFound)));
    assert!(repo.find_by_id(created.id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_duplicate_key_rejected() {
    let pool = common::get_test_pool().await;
    let repo = attachment_coordinator::adapters::database::PgAttachmentRepository::new(pool);

    let first = repo.create(new_attachment()).await.unwrap();
    let clash = NewAttachment { key: first.key.clone(), ..new_attachment() };

    assert!(repo.create(clash).await.is_err());
    repo.delete(first.id).await.unwrap();
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_fetch_stale_returns_failed_and_old_pending() {
    let pool = common::get_test_pool().await;
    let repo = attachment_coordinator::adapters::database::PgAttachmentRepository::new(pool.clone());

    let old = repo.create(new_attachment()).await.unwrap();
    sqlx::query("UPDATE attachments SET created_at = NOW() - INTERVAL '2 days' WHERE id = $1")
        .bind(old.id)
        .execute(&pool)
        .await
        .unwrap();
    let failed = repo.create(new_attachment()).await.unwrap();
    repo.mark_failed(failed.id).await.unwrap();
    let fresh = repo.create(new_attachment()).await.unwrap();

    let stale = repo.fetch_stale(OffsetDateTime::now_utc() - Duration::days(1), 10_000).await.unwrap();
    let ids: Vec<Uuid> = stale.iter().map(|a| a.id).collect();

    assert!(ids.contains(&old.id));
    assert!(ids.contains(&failed.id));
    assert!(!ids.contains(&fresh.id));

    for id in [old.id, failed.id, fresh.id] {
        repo.delete(id).await.unwrap();
    }
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_upload_and_delete_against_postgres() {
    let (service, repo, storage, _pool) = common::postgres_service().await;

    let attachment = service.upload(common::png("cat.png")).await.unwrap();
    assert_eq!(repo.find_by_id(attachment.id).await.unwrap().unwrap().status, AttachmentStatus::Complete);
    assert!(storage.exists(&attachment.key).await.unwrap());

    service.delete(attachment.id).await.unwrap();
    assert!(matches!(service.delete(attachment.id).await, Err(AppError::NotFound)));
    assert!(!storage.exists(&attachment.key).await.unwrap());
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_health_checks() {
    let pool = common::get_test_pool().await;
    let storage = Arc::new(InMemoryStorage::default());
    let health = HealthService::new(pool, storage, HealthConfig { db_timeout_ms: 2000, storage_timeout_ms: 2000 });

    assert!(health.check_db().await.is_ok());
    assert!(health.check_storage().await.is_ok());
}
