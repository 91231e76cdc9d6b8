//! Triggers, coalescing, subscriptions and background fetch.

mod common;

use async_trait::async_trait;
use common::*;
use goalsync_core::{ChangeToken, EntityKind, EntityStore};
use goalsync_sync_engine::{
    BackgroundFetchResult, PassOutcome, PassScope, PermissionPrompt, SyncEvent, SyncState,
    TriggerMode,
};
use goalsync_sync_protocol::{MutationKind, RemoteNotification, Subscription};
use goalsync_testkit::prelude::*;
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn triggers_during_a_pass_coalesce_into_one_follow_up() {
    let cloud = cloud();
    let phone = device(&cloud, "phone");
    phone.faults().close_gate();

    let first = tokio::spawn({
        let sync = phone.sync.clone();
        async move { sync.sync().await }
    });
    while phone.sync.state() != SyncState::Pulling {
        tokio::task::yield_now().await;
    }

    for _ in 0..10 {
        let outcome = phone.sync.sync().await.unwrap();
        assert!(matches!(outcome, PassOutcome::Coalesced));
    }
    let outcome = phone
        .sync
        .notification_received(&json!({ "recordType": "Goal" }))
        .await
        .unwrap();
    assert!(matches!(outcome, PassOutcome::Coalesced));
    assert!(phone.sync.has_pending_pass());

    phone.faults().open_gate();
    completed(first.await.unwrap());

    let stats = phone.sync.stats();
    assert_eq!(stats.passes, 2);
    assert_eq!(stats.coalesced, 11);
    assert!(!phone.sync.has_pending_pass());
    assert_eq!(phone.sync.state(), SyncState::Idle);
}

#[tokio::test]
async fn notification_scope_pulls_kind_and_parent_only() {
    let cloud = cloud();
    let phone = device(&cloud, "phone");

    let outcome = phone
        .sync
        .notification_received(&json!({ "subscriptionId": "task-changes" }))
        .await;
    completed(outcome);
    // Goal then Task.
    assert_eq!(phone.faults().calls("fetch_changed"), 2);
    assert!(phone.store().checkpoint(EntityKind::PurchasedItem).unwrap().is_none());

    completed(phone.sync.sync_scoped(PassScope::push_only()).await);
    assert_eq!(phone.faults().calls("fetch_changed"), 2);

    completed(phone.sync.notification_received(&json!("garbage")).await);
    assert_eq!(phone.faults().calls("fetch_changed"), 2 + 4);
}

#[tokio::test]
async fn subscription_setup_is_idempotent() {
    let cloud = cloud();
    let phone = device(&cloud, "phone");

    let report = phone.sync.setup_subscriptions().await;
    assert!(report.is_complete());
    assert_eq!(report.created.len(), 4);
    assert_eq!(cloud.subscription_ids().len(), 4);

    let report = phone.sync.setup_subscriptions().await;
    assert_eq!(report.existing.len(), 4);
    assert!(report.created.is_empty());
    assert_eq!(phone.faults().calls("fetch_subscription_ids"), 1);

    // A second device finds them remotely and creates nothing.
    let tablet = device(&cloud, "tablet");
    let report = tablet.sync.setup_subscriptions().await;
    assert_eq!(report.existing.len(), 4);
    assert_eq!(tablet.faults().calls("save_subscription"), 0);
    assert_eq!(cloud.subscription_ids().len(), 4);
}

#[tokio::test]
async fn failed_subscription_setup_is_not_fatal() {
    let cloud = cloud();
    let phone = device(&cloud, "phone");
    phone.faults().set_offline(true);

    let report = phone.sync.setup_subscriptions().await;
    assert!(!report.is_complete());
    assert_eq!(report.failed.len(), 4);
    assert!(phone.store().device_state().unwrap().subscriptions.is_empty());

    phone.faults().set_offline(false);
    let report = phone.sync.setup_subscriptions().await;
    assert_eq!(report.created.len(), 4);
}

struct Answer(bool);

#[async_trait]
impl PermissionPrompt for Answer {
    async fn request(&self) -> bool {
        self.0
    }
}

#[tokio::test]
async fn token_registration_enables_push() {
    let cloud = cloud();
    let phone = device(&cloud, "phone");
    let registrar = phone.sync.registrar();
    assert_eq!(registrar.mode(), TriggerMode::PollOnly);

    assert!(!registrar.request_permission(&Answer(false)).await);
    assert_eq!(registrar.mode(), TriggerMode::PollOnly);

    assert!(registrar.request_permission(&Answer(true)).await);
    let mode = registrar.register_device_token("apns-123").await.unwrap();
    assert_eq!(mode, TriggerMode::Push);
    assert_eq!(cloud.device_token("phone").as_deref(), Some("apns-123"));
    assert_eq!(
        phone.store().device_state().unwrap().push_token.as_deref(),
        Some("apns-123")
    );

    registrar.register_failure("no entitlement");
    assert_eq!(registrar.mode(), TriggerMode::PollOnly);
}

#[tokio::test]
async fn token_registration_failure_falls_back_to_polling() {
    let cloud = cloud();
    let phone = device(&cloud, "phone");
    phone.faults().set_offline(true);

    let mode = phone
        .sync
        .registrar()
        .register_device_token("apns-123")
        .await
        .unwrap();
    assert_eq!(mode, TriggerMode::PollOnly);
    assert_eq!(cloud.device_token("phone"), None);
    assert_eq!(
        phone.store().device_state().unwrap().push_token.as_deref(),
        Some("apns-123")
    );
}

#[tokio::test]
async fn push_notification_wakes_the_other_device() {
    let cloud = cloud();
    let phone = device(&cloud, "phone");
    let mut tablet = device(&cloud, "tablet");

    tablet
        .sync
        .registrar()
        .register_device_token("tablet-token")
        .await
        .unwrap();
    let (handle, task) = tablet.sync.clone().spawn();
    let mut events = tablet.sync.subscribe_events();

    completed(phone.sync.sync().await);
    // The pipeline's startup pass created the subscriptions.
    while cloud.subscription_ids().len() < 4 {
        tokio::task::yield_now().await;
    }

    seed(phone.store(), at(9, 0), vec![goal("G1", "Fitness").into()]);
    completed(phone.sync.sync().await);

    let payload = tokio::time::timeout(Duration::from_secs(2), tablet.pushes.recv())
        .await
        .unwrap()
        .unwrap();
    let notification = RemoteNotification::parse(&payload).unwrap();
    assert_eq!(notification.kind, Some(EntityKind::Goal));
    assert_eq!(notification.mutation, Some(MutationKind::Create));
    assert_eq!(notification.subscription_id, Some(Subscription::well_known_id(EntityKind::Goal)));

    handle.notification_received(payload).unwrap();
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let Ok(SyncEvent::PassCompleted { pulled, .. }) = events.recv().await {
                if pulled > 0 {
                    break;
                }
            }
        }
    })
    .await
    .unwrap();
    assert!(tablet.has(EntityKind::Goal, "G1"));

    handle.shutdown();
    task.await.unwrap();
    assert!(handle.local_mutation().is_err());
}

#[tokio::test]
async fn notification_survives_a_full_trigger_queue() {
    let cloud = cloud();
    let phone = device_with(&cloud, "phone", config().with_trigger_queue_depth(1));
    let (handle, task) = phone.sync.clone().spawn();
    while phone.sync.stats().passes < 1 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    phone.faults().close_gate();
    seed(phone.store(), at(9, 0), vec![goal("G1", "Fitness").into()]);
    handle.local_mutation().unwrap();
    while phone.sync.state() != SyncState::Pushing {
        tokio::task::yield_now().await;
    }

    // One trigger fills the queue; the notification finds it full.
    handle.local_mutation().unwrap();
    put_remote(&cloud, goal("G2", "Reading").into(), at(9, 0));
    handle
        .notification_received(json!({ "recordType": "Goal" }))
        .unwrap();
    phone.faults().open_gate();

    tokio::time::timeout(Duration::from_secs(2), async {
        while !phone.has(EntityKind::Goal, "G2") {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert!(!phone.get(EntityKind::Goal, "G1").needs_sync());

    handle.shutdown();
    task.await.unwrap();
}

#[tokio::test]
async fn handle_follows_reachability_and_lifecycle() {
    let cloud = cloud();
    let phone = device(&cloud, "phone");
    let (handle, task) = phone.sync.clone().spawn();

    handle.reachability_changed(false);
    while phone.sync.state() != SyncState::Paused {
        tokio::task::yield_now().await;
    }

    seed(phone.store(), at(9, 0), vec![goal("G1", "Fitness").into()]);
    handle.local_mutation().unwrap();
    handle.app_resumed().unwrap();
    tokio::task::yield_now().await;
    assert!(phone.get(EntityKind::Goal, "G1").needs_sync());

    handle.reachability_changed(true);
    tokio::time::timeout(Duration::from_secs(2), async {
        while phone.get(EntityKind::Goal, "G1").needs_sync() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    handle.manual_refresh().unwrap();
    handle.shutdown();
    task.await.unwrap();
    assert!(handle.is_shut_down());
}

#[tokio::test]
async fn background_fetch_reports_what_it_found() {
    let cloud = cloud();
    let phone = device(&cloud, "phone");

    assert_eq!(phone.sync.background_fetch().await, BackgroundFetchResult::NoData);

    for i in 0..3 {
        put_remote(&cloud, goal(&format!("G{i}"), "x").into(), at(9, 0));
    }
    assert_eq!(phone.sync.background_fetch().await, BackgroundFetchResult::NewData);
    assert_eq!(phone.store().list(EntityKind::Goal).unwrap().len(), 3);
    assert_eq!(phone.sync.background_fetch().await, BackgroundFetchResult::NoData);

    phone.sync.reachability_changed(false).await.unwrap();
    assert_eq!(phone.sync.background_fetch().await, BackgroundFetchResult::Failed);
}

#[tokio::test]
async fn background_fetch_caps_records_per_kind() {
    let cloud = cloud();
    let phone = device_with(
        &cloud,
        "phone",
        config()
            .with_pull_batch_size(100)
            .with_background_batch_cap(2),
    );
    for i in 0..5 {
        put_remote(&cloud, goal(&format!("G{i}"), "x").into(), at(9, 0));
    }

    assert_eq!(phone.sync.background_fetch().await, BackgroundFetchResult::NewData);
    assert_eq!(phone.store().list(EntityKind::Goal).unwrap().len(), 2);
    assert_eq!(
        phone.store().checkpoint(EntityKind::Goal).unwrap(),
        Some(ChangeToken::new(2))
    );

    // A foreground pass picks up the rest.
    let report = completed(phone.sync.sync().await);
    assert_eq!(report.pulled, 3);
}

#[tokio::test]
async fn background_fetch_respects_its_budget() {
    let cloud = cloud();
    let phone = device_with(
        &cloud,
        "phone",
        config().with_background_budget(Duration::from_millis(50)),
    );
    put_remote(&cloud, goal("G1", "x").into(), at(9, 0));
    phone.faults().set_latency(Some(Duration::from_millis(200)));

    assert_eq!(phone.sync.background_fetch().await, BackgroundFetchResult::Failed);
    assert!(phone.store().checkpoint(EntityKind::Goal).unwrap().is_none());
    assert_eq!(phone.sync.state(), SyncState::Idle);

    phone.faults().set_latency(None);
    assert_eq!(phone.sync.background_fetch().await, BackgroundFetchResult::NewData);
}

#[tokio::test]
async fn background_fetch_through_the_handle() {
    let cloud = cloud();
    let phone = device(&cloud, "phone");
    let (handle, task) = phone.sync.clone().spawn();

    put_remote(&cloud, goal("G1", "x").into(), at(9, 0));
    let result = handle.background_fetch().await;
    // The startup pass may already have pulled G1.
    assert!(matches!(
        result,
        BackgroundFetchResult::NewData | BackgroundFetchResult::NoData
    ));
    assert!(phone.has(EntityKind::Goal, "G1"));

    handle.shutdown();
    task.await.unwrap();
    assert_eq!(handle.background_fetch().await, BackgroundFetchResult::Failed);
}
