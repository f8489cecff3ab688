//! Integration tests for the cooperative domain on the in-memory store

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use core_kernel::{month_range, EntityId, OperationContext};
use domain_cooperative::invitation_code::{self, redeem, redeem_with_tx, verify};
use domain_cooperative::member_profile::member_profile_response;
use domain_cooperative::{
    seed_default_accounts, seed_organization, Account, AccountKind, Branch, InvitationCode,
    MemberProfile, MemberProfileId, MemberStatus, Organization, OrganizationSeed, Registries,
    DEFAULT_CHART,
};
use infra_registry::{
    Entity, Filter, FilterSet, Lifecycle, MemoryStore, Sort, SortSet, Store, Topic, TopicBuilder,
};
use proptest::prelude::*;
use rust_decimal_macros::dec;
use test_utils::{
    assert_aborted, assert_concurrency_timeout, assert_constraint_violation, assert_not_found,
    assert_sorted_by, assert_standard_topics, assert_within, branch_id_strategy, code_strategy,
    init_test_tracing, organization_id_strategy, ContextFixtures, NameFixtures, RecordingDispatcher,
    StoreFixtures,
};

struct World {
    registries: Registries,
    dispatcher: RecordingDispatcher,
    ctx: OperationContext,
    organization: Organization,
    branch: Branch,
}

async fn world_on(store: Arc<dyn Store>) -> World {
    init_test_tracing();
    let dispatcher = RecordingDispatcher::new();
    let registries = Registries::new(store, dispatcher.shared()).unwrap();
    let ctx = ContextFixtures::system();

    let organization = registries
        .organizations
        .create(&ctx, Organization::new(NameFixtures::organization_name(), NameFixtures::email()))
        .await
        .unwrap();
    let branch = registries
        .branches
        .create(&ctx, Branch::new(organization.id, NameFixtures::branch_name(), "MAIN"))
        .await
        .unwrap();
    dispatcher.clear();

    World {
        registries,
        dispatcher,
        ctx,
        organization,
        branch,
    }
}

async fn world() -> World {
    world_on(StoreFixtures::memory()).await
}

impl World {
    async fn invitation(&self, code: &str, max_use: i64, expires_in: ChronoDuration) -> InvitationCode {
        let invitation = InvitationCode::new(
            self.organization.id,
            self.branch.id,
            code,
            max_use,
            Utc::now() + expires_in,
        );
        let created = self
            .registries
            .invitation_codes
            .create(&self.ctx, invitation)
            .await
            .unwrap();
        self.dispatcher.clear();
        created
    }

    fn member(&self, first_name: &str, passbook: &str) -> MemberProfile {
        MemberProfile::new(
            self.organization.id,
            self.branch.id,
            first_name,
            NameFixtures::last_name(),
            passbook,
        )
    }
}

fn topic_strings(topics: &[Topic]) -> Vec<String> {
    topics.iter().map(Topic::to_string).collect()
}

// ============================================================================
// Invitation codes
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_redemptions_never_exceed_max_use() {
    let world = world().await;
    let invitation = world.invitation("JOIN-2024", 5, ChronoDuration::days(7)).await;

    let mut handles = Vec::new();
    for _ in 0..20 {
        let registry = Arc::clone(&world.registries.invitation_codes);
        let ctx = world.ctx.clone();
        handles.push(tokio::spawn(async move {
            redeem(&registry, &ctx, "JOIN-2024").await
        }));
    }

    let mut succeeded = 0;
    let mut exhausted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(redeemed) => {
                assert!(redeemed.current_use <= 5);
                succeeded += 1;
            }
            Err(error) if error.is_max_uses_reached() => exhausted += 1,
            Err(error) => panic!("unexpected redemption error: {error}"),
        }
    }

    assert_eq!(succeeded, 5);
    assert_eq!(exhausted, 15);

    let stored = world
        .registries
        .invitation_codes
        .get_by_id(&world.ctx, invitation.id)
        .await
        .unwrap();
    assert_eq!(stored.current_use, 5);
    assert_eq!(stored.remaining_uses(), 0);
    assert_eq!(world.dispatcher.len(), 5);
}

#[tokio::test]
async fn test_expired_code_is_rejected_without_writing() {
    let world = world().await;
    let invitation = world.invitation("OLD-CODE", 10, ChronoDuration::days(-1)).await;

    let error = redeem(&world.registries.invitation_codes, &world.ctx, "OLD-CODE")
        .await
        .unwrap_err();
    assert!(error.is_expired());

    let stored = world
        .registries
        .invitation_codes
        .get_by_id(&world.ctx, invitation.id)
        .await
        .unwrap();
    assert_eq!(stored.current_use, 0);
    assert!(world.dispatcher.is_empty());
}

#[tokio::test]
async fn test_unknown_code_is_invalid() {
    let world = world().await;

    let error = redeem(&world.registries.invitation_codes, &world.ctx, "NOPE-0000")
        .await
        .unwrap_err();
    assert!(error.is_invalid_code());

    let error = verify(&world.registries.invitation_codes, &world.ctx, "NOPE-0000")
        .await
        .unwrap_err();
    assert!(error.is_invalid_code());
}

#[tokio::test]
async fn test_verify_does_not_consume_a_use() {
    let world = world().await;
    let invitation = world.invitation("VERIFY-ME", 1, ChronoDuration::hours(1)).await;

    for _ in 0..3 {
        let verified = verify(&world.registries.invitation_codes, &world.ctx, "VERIFY-ME")
            .await
            .unwrap();
        assert_eq!(verified.id, invitation.id);
        assert_eq!(verified.current_use, 0);
    }
    assert!(world.dispatcher.is_empty());
}

#[tokio::test]
async fn test_redeem_with_caller_transaction_rolls_back() {
    let world = world().await;
    let invitation = world.invitation("TX-CODE", 3, ChronoDuration::days(1)).await;
    let registry = &world.registries.invitation_codes;

    let mut tx = world.registries.start_transaction(&world.ctx).await.unwrap();
    let redeemed = redeem_with_tx(registry, &world.ctx, &mut tx, "TX-CODE").await.unwrap();
    assert_eq!(redeemed.current_use, 1);
    assert_eq!(tx.pending_notifications(), 1);
    tx.rollback().await.unwrap();

    let stored = registry.get_by_id(&world.ctx, invitation.id).await.unwrap();
    assert_eq!(stored.current_use, 0);
    assert!(world.dispatcher.is_empty());
}

#[tokio::test]
async fn test_duplicate_code_is_a_constraint_violation() {
    let world = world().await;
    world.invitation("DUP-CODE", 1, ChronoDuration::days(1)).await;

    let duplicate = InvitationCode::new(
        world.organization.id,
        world.branch.id,
        "DUP-CODE",
        1,
        Utc::now() + ChronoDuration::days(1),
    );
    let result = world.registries.invitation_codes.create(&world.ctx, duplicate).await;
    assert_constraint_violation(&result);
    assert!(world.dispatcher.is_empty());
}

#[tokio::test]
async fn test_expiration_month_boundaries_are_inclusive() {
    let world = world().await;
    let registry = &world.registries.invitation_codes;
    let instants = [
        ("DEC-LAST", Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap()),
        ("JAN-FIRST", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
        (
            "JAN-LAST",
            Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap() + ChronoDuration::microseconds(999_999),
        ),
        ("FEB-FIRST", Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()),
    ];
    for (code, expiration) in instants {
        let invitation = InvitationCode::new(world.organization.id, world.branch.id, code, 1, expiration);
        registry.create(&world.ctx, invitation).await.unwrap();
    }

    let (start, end) = month_range(2024, 1).unwrap();
    let january = registry
        .arr_find(
            &world.ctx,
            FilterSet::new().between("expiration_date", start, end),
            SortSet::new().then(Sort::asc("expiration_date")),
            &[],
        )
        .await
        .unwrap();

    let codes: Vec<&str> = january.iter().map(|i| i.code.as_str()).collect();
    assert_eq!(codes, vec!["JAN-FIRST", "JAN-LAST"]);
    for invitation in &january {
        assert_within(invitation.expiration_date, start, end);
    }
}

// ============================================================================
// Members
// ============================================================================

proptest! {
    #[test]
    fn prop_member_topics_follow_tenant(
        organization_id in organization_id_strategy(),
        branch_id in branch_id_strategy(),
        passbook in code_strategy(),
    ) {
        let mut member = MemberProfile::new(organization_id, branch_id, "Ana", "Cruz", passbook);
        member.id = MemberProfileId::generate();

        for event in [Lifecycle::Create, Lifecycle::Update, Lifecycle::Delete] {
            let topics = TopicBuilder::standard(event, &member);
            assert_standard_topics(
                &topics,
                "member_profile",
                event,
                *member.id.as_uuid(),
                *branch_id.as_uuid(),
                *organization_id.as_uuid(),
            );
        }
    }
}

#[tokio::test]
async fn test_member_create_publishes_tenant_topics() {
    let world = world().await;
    let member = world
        .registries
        .member_profiles
        .create(&world.ctx, world.member("Ana", "PB-0001"))
        .await
        .unwrap();

    let notification = world.dispatcher.last().unwrap();
    assert_standard_topics(
        &notification.topics,
        "member_profile",
        Lifecycle::Create,
        member.uuid(),
        *world.branch.id.as_uuid(),
        *world.organization.id.as_uuid(),
    );
    assert_eq!(notification.topics.len(), 4);
    assert!(notification.payload["full_name"].as_str().unwrap().starts_with("Ana "));
    assert_eq!(notification.payload["status"], "pending");
}

#[tokio::test]
async fn test_member_preloads_branch_organization() {
    let world = world().await;
    let member = world
        .registries
        .member_profiles
        .create(&world.ctx, world.member("Ben", "PB-0002"))
        .await
        .unwrap();

    let loaded = world
        .registries
        .member_profiles
        .get_by_id(&world.ctx, member.id)
        .await
        .unwrap();
    let branch = loaded.branch.as_deref().unwrap();
    assert_eq!(branch.id, world.branch.id);
    assert_eq!(
        branch.organization.as_deref().map(|o| o.name.as_str()),
        Some(world.organization.name.as_str())
    );
    assert_eq!(loaded.organization.as_deref().map(|o| o.id), Some(world.organization.id));

    let response = member_profile_response(&loaded);
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["branch"]["code"], "MAIN");
}

#[tokio::test]
async fn test_soft_deleted_member_is_hidden_but_kept() {
    init_test_tracing();
    let memory = Arc::new(MemoryStore::new());
    let store: Arc<dyn Store> = memory.clone();
    let world = world_on(store).await;
    let registry = &world.registries.member_profiles;

    let member = registry.create(&world.ctx, world.member("Cai", "PB-0003")).await.unwrap();
    world.dispatcher.clear();

    let deleted = registry.delete(&world.ctx, member.id).await.unwrap();
    assert_eq!(deleted.id, member.id);

    assert_not_found(&registry.get_by_id(&world.ctx, member.id).await);
    assert_eq!(registry.count(&world.ctx, FilterSet::new()).await.unwrap(), 0);
    assert_eq!(memory.rows("member_profiles").await.len(), 1);

    let delete_topic = format!("member_profile.delete.{}", member.uuid());
    assert_eq!(world.dispatcher.count_for(&delete_topic), 1);
}

#[tokio::test]
async fn test_tenant_filters_isolate_branches() {
    let world = world().await;
    let other_branch = world
        .registries
        .branches
        .create(&world.ctx, Branch::new(world.organization.id, "North", "NORTH"))
        .await
        .unwrap();

    let registry = &world.registries.member_profiles;
    registry.create(&world.ctx, world.member("Dee", "PB-0004")).await.unwrap();
    registry.create(&world.ctx, world.member("Eli", "PB-0005")).await.unwrap();
    let mut outsider = world.member("Fay", "PB-0006");
    outsider.branch_id = other_branch.id;
    registry.create(&world.ctx, outsider).await.unwrap();

    let in_main = FilterSet::new()
        .and(Filter::eq("organization_id", world.organization.id))
        .and(Filter::eq("branch_id", world.branch.id));
    let members = registry
        .arr_find(&world.ctx, in_main.clone(), SortSet::new().then(Sort::asc("first_name")), &[])
        .await
        .unwrap();

    assert_eq!(members.len(), 2);
    assert_sorted_by(&members, |m| m.first_name.clone());
    assert!(members.iter().all(|m| m.branch_id == world.branch.id));
    assert_eq!(registry.count(&world.ctx, in_main).await.unwrap(), 2);
}

#[tokio::test]
async fn test_template_find_always_matches_status() {
    let world = world().await;
    let registry = &world.registries.member_profiles;
    registry.create(&world.ctx, world.member("Gus", "PB-0007")).await.unwrap();
    let mut active = world.member("Hal", "PB-0008");
    active.status = MemberStatus::Active;
    active.share_capital = dec!(1500.00);
    registry.create(&world.ctx, active).await.unwrap();

    let template = MemberProfile {
        organization_id: world.organization.id,
        status: MemberStatus::Active,
        ..MemberProfile::default()
    };
    let found = registry.find(&world.ctx, &template).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].first_name, "Hal");
    assert_eq!(found[0].share_capital, dec!(1500.00));
    assert!(found[0].is_active());

    let pending = registry.find(&world.ctx, &MemberProfile::default()).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].first_name, "Gus");
}

#[tokio::test]
async fn test_updates_keep_creation_audit_and_advance_updated_at() {
    let (actor, ctx) = ContextFixtures::actor();
    let world = world().await;
    let registry = &world.registries.member_profiles;

    let created = registry.create(&ctx, world.member("Ivy", "PB-0009")).await.unwrap();
    assert_eq!(created.audit.created_by_id, Some(actor));

    let first = registry
        .patch_by_id(&world.ctx, created.id, |m| m.status = MemberStatus::Active)
        .await
        .unwrap();
    let second = registry
        .patch_by_id(&world.ctx, created.id, |m| m.status = MemberStatus::Suspended)
        .await
        .unwrap();

    assert_eq!(second.audit.created_at, created.audit.created_at);
    assert_eq!(second.audit.created_by_id, Some(actor));
    assert!(first.audit.updated_at > created.audit.updated_at);
    assert!(second.audit.updated_at > first.audit.updated_at);
    assert_eq!(second.status, MemberStatus::Suspended);
}

#[tokio::test]
async fn test_nil_projection() {
    let world = world().await;
    assert!(world.registries.member_profiles.to_model(None).is_none());

    let bare = world.member("Jo", "PB-0010");
    let response = world.registries.member_profiles.to_model(Some(&bare)).unwrap();
    assert!(response.branch.is_none());
    assert_eq!(response.full_name, bare.full_name());
}

// ============================================================================
// Transactions
// ============================================================================

#[tokio::test]
async fn test_rollback_discards_writes_and_notifications() {
    let world = world().await;
    let registry = &world.registries.member_profiles;

    let mut tx = world.registries.start_transaction(&world.ctx).await.unwrap();
    let member = registry
        .create_with_tx(&world.ctx, &mut tx, world.member("Kit", "PB-0011"))
        .await
        .unwrap();
    assert_eq!(tx.pending_notifications(), 1);
    tx.rollback().await.unwrap();

    assert_not_found(&registry.get_by_id(&world.ctx, member.id).await);
    assert!(world.dispatcher.is_empty());
}

#[tokio::test]
async fn test_dropped_transaction_sends_nothing() {
    let world = world().await;
    {
        let mut tx = world.registries.start_transaction(&world.ctx).await.unwrap();
        world
            .registries
            .member_profiles
            .create_with_tx(&world.ctx, &mut tx, world.member("Lou", "PB-0012"))
            .await
            .unwrap();
    }
    assert!(world.dispatcher.is_empty());
    let count = world
        .registries
        .member_profiles
        .count(&world.ctx, FilterSet::new())
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_second_lock_times_out() {
    let world = world_on(StoreFixtures::memory_with_lock_timeout(Duration::from_millis(50))).await;
    let invitation = world.invitation("LOCKED", 5, ChronoDuration::days(1)).await;
    let registry = &world.registries.invitation_codes;

    let mut holder = world.registries.start_transaction(&world.ctx).await.unwrap();
    registry.get_by_id_lock(&world.ctx, &mut holder, invitation.id).await.unwrap();

    let mut waiter = world.registries.start_transaction(&world.ctx).await.unwrap();
    let result = registry.get_by_id_lock(&world.ctx, &mut waiter, invitation.id).await;
    assert_concurrency_timeout(&result);
    waiter.rollback().await.unwrap();

    holder.rollback().await.unwrap();
    let mut next = world.registries.start_transaction(&world.ctx).await.unwrap();
    assert!(registry.get_by_id_lock(&world.ctx, &mut next, invitation.id).await.is_ok());
    next.commit().await.unwrap();
}

#[tokio::test]
async fn test_expired_deadline_aborts_without_writes() {
    let world = world().await;
    let expired = ContextFixtures::expired();

    let result = world
        .registries
        .member_profiles
        .create(&expired, world.member("Max", "PB-0013"))
        .await;
    assert_aborted(&result);

    let count = world
        .registries
        .member_profiles
        .count(&world.ctx, FilterSet::new())
        .await
        .unwrap();
    assert_eq!(count, 0);
    assert!(world.dispatcher.is_empty());
}

#[tokio::test]
async fn test_failed_dispatch_keeps_committed_data() {
    let world = world().await;
    world.dispatcher.set_failing(true);

    let error = world
        .registries
        .member_profiles
        .create(&world.ctx, world.member("Ned", "PB-0014"))
        .await
        .unwrap_err();
    assert!(error.is_notification());
    assert_eq!(world.dispatcher.len(), 1);
    let committed = error.into_committed::<MemberProfile>().unwrap();
    assert!(!committed.id.is_nil());
    assert_eq!(committed.first_name, "Ned");
    assert_eq!(committed.audit.created_at, committed.audit.updated_at);

    world.dispatcher.set_failing(false);
    let members = world
        .registries
        .member_profiles
        .arr_find(&world.ctx, FilterSet::new(), SortSet::new(), &[])
        .await
        .unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].id, committed.id);
    assert_eq!(members[0].first_name, "Ned");
}

#[tokio::test]
async fn test_failed_dispatch_returns_state_of_every_mutation() {
    let world = world().await;
    let registry = &world.registries.member_profiles;
    let member = registry
        .create(&world.ctx, world.member("Ida", "PB-0015"))
        .await
        .unwrap();
    world.dispatcher.set_failing(true);

    let error = registry
        .patch_by_id(&world.ctx, member.id, |m| m.status = MemberStatus::Suspended)
        .await
        .unwrap_err();
    let patched = error.committed::<MemberProfile>().unwrap();
    assert_eq!(patched.status, MemberStatus::Suspended);
    assert!(patched.audit.updated_at > member.audit.updated_at);

    let error = registry.delete(&world.ctx, member.id).await.unwrap_err();
    assert!(error.is_notification());
    assert_eq!(error.into_committed::<MemberProfile>().map(|m| m.id), Some(member.id));
    assert_not_found(&registry.get_by_id(&world.ctx, member.id).await);
}

#[tokio::test]
async fn test_failed_dispatch_after_redeem_keeps_the_use() {
    let world = world().await;
    let invitation = world.invitation("LOUD-CODE", 2, ChronoDuration::days(1)).await;
    world.dispatcher.set_failing(true);

    let error = redeem(&world.registries.invitation_codes, &world.ctx, "LOUD-CODE")
        .await
        .unwrap_err();
    let registry_error = error.registry().unwrap();
    assert!(registry_error.is_notification());
    let redeemed = registry_error.committed::<InvitationCode>().unwrap();
    assert_eq!(redeemed.id, invitation.id);
    assert_eq!(redeemed.current_use, 1);
}

// ============================================================================
// Accounts and seeding
// ============================================================================

#[tokio::test]
async fn test_child_account_publishes_parent_topic() {
    let world = world().await;
    let registry = &world.registries.accounts;
    let parent = registry
        .create(
            &world.ctx,
            Account::new(world.organization.id, world.branch.id, "1000", "Assets", AccountKind::Asset),
        )
        .await
        .unwrap();
    let child = registry
        .create(
            &world.ctx,
            Account::new(world.organization.id, world.branch.id, "1010", "Cash", AccountKind::Asset)
                .with_parent(parent.id),
        )
        .await
        .unwrap();

    let topics = world.dispatcher.topics();
    assert_eq!(topics.len(), 2);
    assert_eq!(topics[0].len(), 4);
    assert_eq!(
        topics[1].last().map(String::as_str),
        Some(format!("account.create.parent_account.{}", parent.uuid()).as_str())
    );
    assert_eq!(child.parent_account.as_deref().map(|a| a.code.as_str()), Some("1000"));
    assert_eq!(
        topic_strings(&world.dispatcher.last().unwrap().topics)[1],
        format!("account.create.{}", child.uuid())
    );
}

#[tokio::test]
async fn test_seed_organization_is_idempotent() {
    let world = world().await;
    let seed = OrganizationSeed {
        name: "Riverside Cooperative".to_string(),
        email: "office@riverside.coop".to_string(),
        branch_name: "Riverside Main".to_string(),
        branch_code: "RIV".to_string(),
    };

    let first = seed_organization(&world.ctx, &world.registries, &seed).await.unwrap();
    assert!(first.organization_created);
    assert!(first.branch_created);
    assert_eq!(first.accounts_created, DEFAULT_CHART.len());

    let second = seed_organization(&world.ctx, &world.registries, &seed).await.unwrap();
    assert!(second.is_noop());
    assert_eq!(second.organization_id, first.organization_id);
    assert_eq!(second.branch_id, first.branch_id);

    let organization_id = first.organization_id.unwrap();
    let accounts = world
        .registries
        .accounts
        .arr_find(
            &world.ctx,
            FilterSet::new().and(Filter::eq("organization_id", organization_id)),
            SortSet::new().then(Sort::asc("code")),
            &["ChildAccounts"],
        )
        .await
        .unwrap();
    assert_eq!(accounts.len(), DEFAULT_CHART.len());
    assert_sorted_by(&accounts, |a| a.code.clone());

    let assets = accounts.iter().find(|a| a.code == "1000").unwrap();
    assert_eq!(assets.child_accounts.len(), 3);
    let cash = accounts.iter().find(|a| a.code == "1010").unwrap();
    assert_eq!(cash.parent_account_id, Some(assets.id));
}

#[tokio::test]
async fn test_seed_default_accounts_skips_seeded_branch() {
    let world = world().await;

    let created = seed_default_accounts(&world.ctx, &world.registries, world.organization.id, world.branch.id)
        .await
        .unwrap();
    assert_eq!(created, DEFAULT_CHART.len());

    world.dispatcher.clear();
    let again = seed_default_accounts(&world.ctx, &world.registries, world.organization.id, world.branch.id)
        .await
        .unwrap();
    assert_eq!(again, 0);
    assert!(world.dispatcher.is_empty());
}

#[tokio::test]
async fn test_seed_rejects_invalid_input() {
    let world = world().await;
    let seed = OrganizationSeed {
        name: String::new(),
        email: "not-an-email".to_string(),
        branch_name: "Main".to_string(),
        branch_code: "MAIN".to_string(),
    };
    let error = seed_organization(&world.ctx, &world.registries, &seed).await.unwrap_err();
    assert!(error.is_validation());
    assert!(error.to_string().contains("email"));
}

#[tokio::test]
async fn test_invitation_response_reports_remaining_uses() {
    let world = world().await;
    let invitation = world.invitation("MOD-CODE", 2, ChronoDuration::days(3)).await;
    let response = invitation_code::invitation_code_response(&invitation);
    assert_eq!(response.remaining_uses, 2);
    assert_eq!(response.id, *invitation.id.as_uuid());
    assert_eq!(
        world.registries.invitation_codes.preload_paths(),
        vec!["Organization", "Branch"]
    );
}
