//! Postgres store tests. Run with a scratch database:
//! `DATABASE_URL=postgres://... cargo test -- --ignored`

use gateway_service::{
    config::DatabaseConfig,
    db::{create_pool, run_migrations, PgStore, Store, StoreError},
    models::{Account, AccountKind, Invite},
};

async fn store() -> PgStore {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = create_pool(&DatabaseConfig {
        url,
        max_connections: 2,
        min_connections: 1,
    })
    .await
    .expect("Failed to connect");
    run_migrations(&pool).await.expect("Failed to migrate");
    PgStore::new(pool)
}

fn unique_email(prefix: &str) -> String {
    format!("{}-{}@example.com", prefix, uuid::Uuid::new_v4())
}

/// A pending admin whose creator row already exists.
async fn pending_admin(store: &PgStore) -> Account {
    let creator = Account::super_admin("Root".into(), unique_email("root"), "unused".into());
    store.insert_account(&creator).await.unwrap();
    Account::pending_admin("Ada".into(), unique_email("ada"), creator.id)
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn uncommitted_unit_leaves_nothing_behind() {
    let store = store().await;
    let account = pending_admin(&store).await;

    {
        let mut unit = store.begin().await.unwrap();
        unit.insert_account(&account).await.unwrap();
        // dropped without commit
    }

    let found = store
        .find_account_by_email(AccountKind::Admin, &account.email)
        .await
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn second_invite_for_an_account_conflicts() {
    let store = store().await;
    let account = pending_admin(&store).await;
    let ttl = chrono::Duration::hours(1);

    let mut unit = store.begin().await.unwrap();
    unit.insert_account(&account).await.unwrap();
    unit.insert_invite(&Invite::new(AccountKind::Admin, account.id, "hash-a".repeat(4), ttl))
        .await
        .unwrap();
    let duplicate = unit
        .insert_invite(&Invite::new(AccountKind::Admin, account.id, "hash-b".repeat(4), ttl))
        .await;
    assert!(matches!(duplicate, Err(StoreError::Conflict(_))));
    unit.rollback().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn committed_invite_is_found_by_hash() {
    let store = store().await;
    let account = pending_admin(&store).await;
    let hash = uuid::Uuid::new_v4().simple().to_string();

    let mut unit = store.begin().await.unwrap();
    unit.insert_account(&account).await.unwrap();
    unit.insert_invite(&Invite::new(
        AccountKind::Admin,
        account.id,
        hash.clone(),
        chrono::Duration::hours(1),
    ))
    .await
    .unwrap();
    unit.commit().await.unwrap();

    let mut unit = store.begin().await.unwrap();
    let invite = unit
        .lock_invite_by_hash(AccountKind::Admin, &hash)
        .await
        .unwrap()
        .expect("invite should exist");
    assert_eq!(invite.account_id, account.id);
    unit.rollback().await.unwrap();
}
