//! PostgreSQL integration tests
//!
//! These start a container through `test_utils::TestDatabase` and need
//! Docker. Run with `cargo test -- --ignored`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use domain_cooperative::invitation_code::redeem;
use domain_cooperative::{
    seed_organization, InvitationCode, MemberProfile, OrganizationSeed, Registries, DEFAULT_CHART,
};
use infra_registry::{Filter, FilterSet, SortSet, Store};
use test_utils::{
    assert_concurrency_timeout, assert_not_found, create_isolated_test_database, init_test_tracing,
    ContextFixtures, RecordingDispatcher,
};

async fn seeded(registries: &Registries) -> OrganizationSeed {
    let seed = OrganizationSeed {
        name: "Harbor Cooperative".to_string(),
        email: "office@harbor.coop".to_string(),
        branch_name: "Harbor Main".to_string(),
        branch_code: "HBR".to_string(),
    };
    seed_organization(&ContextFixtures::system(), registries, &seed)
        .await
        .unwrap();
    seed
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires Docker"]
async fn test_postgres_seed_and_redeem() {
    init_test_tracing();
    let db = create_isolated_test_database().await.unwrap();
    let store: Arc<dyn Store> = Arc::new(db.store(Duration::from_secs(5)));
    let dispatcher = RecordingDispatcher::new();
    let registries = Registries::new(store, dispatcher.shared()).unwrap();
    let ctx = ContextFixtures::system();

    let seed = seeded(&registries).await;
    let report = seed_organization(&ctx, &registries, &seed).await.unwrap();
    assert!(report.is_noop());

    let organization_id = report.organization_id.unwrap();
    let branch_id = report.branch_id.unwrap();
    let accounts = registries
        .accounts
        .count(&ctx, FilterSet::new().and(Filter::eq("organization_id", organization_id)))
        .await
        .unwrap();
    assert_eq!(accounts, DEFAULT_CHART.len() as u64);

    let invitation = InvitationCode::new(
        organization_id,
        branch_id,
        "HARBOR-01",
        3,
        Utc::now() + ChronoDuration::days(1),
    );
    let invitation = registries.invitation_codes.create(&ctx, invitation).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let registry = Arc::clone(&registries.invitation_codes);
        let ctx = ctx.clone();
        handles.push(tokio::spawn(async move { redeem(&registry, &ctx, "HARBOR-01").await }));
    }
    let mut succeeded = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            succeeded += 1;
        }
    }
    assert_eq!(succeeded, 3);

    let stored = registries
        .invitation_codes
        .get_by_id(&ctx, invitation.id)
        .await
        .unwrap();
    assert_eq!(stored.current_use, 3);
    assert_eq!(stored.branch.as_deref().map(|b| b.code.as_str()), Some("HBR"));

    db.clear_data().await.unwrap();
    assert_eq!(registries.organizations.count(&ctx, FilterSet::new()).await.unwrap(), 0);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_postgres_lock_timeout_and_soft_delete() {
    init_test_tracing();
    let db = create_isolated_test_database().await.unwrap();
    let store: Arc<dyn Store> = Arc::new(db.store(Duration::from_millis(100)));
    let registries = Registries::new(store, RecordingDispatcher::new().shared()).unwrap();
    let ctx = ContextFixtures::system();
    seeded(&registries).await;

    let branch = registries
        .branches
        .arr_find_one(
            &ctx,
            FilterSet::new().and(Filter::eq("code", "HBR")),
            SortSet::new(),
            &[],
        )
        .await
        .unwrap();
    let member = registries
        .member_profiles
        .create(
            &ctx,
            MemberProfile::new(branch.organization_id, branch.id, "Ola", "Berg", "PB-1000"),
        )
        .await
        .unwrap();

    let mut holder = registries.start_transaction(&ctx).await.unwrap();
    registries
        .member_profiles
        .get_by_id_lock(&ctx, &mut holder, member.id)
        .await
        .unwrap();
    let mut waiter = registries.start_transaction(&ctx).await.unwrap();
    let result = registries
        .member_profiles
        .get_by_id_lock(&ctx, &mut waiter, member.id)
        .await;
    assert_concurrency_timeout(&result);
    waiter.rollback().await.unwrap();
    holder.rollback().await.unwrap();

    registries.member_profiles.delete(&ctx, member.id).await.unwrap();
    assert_not_found(&registries.member_profiles.get_by_id(&ctx, member.id).await);

    let (hidden,): (i64,) = sqlx::query_as("SELECT count(*) FROM member_profiles WHERE deleted_at IS NOT NULL")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(hidden, 1);
}
