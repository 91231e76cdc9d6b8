//! The remote record client contract, as served by the reference cloud.

use goalsync_cloud::{CloudServer, ServerConfig};
use goalsync_core::{ChangeToken, Entity, EntityKind};
use goalsync_sync_protocol::{
    from_remote, record_id_for, to_remote, RemoteError, RemoteNotification, RemoteRecordClient,
    Subscription,
};
use goalsync_testkit::prelude::*;

#[tokio::test]
async fn save_fetch_and_change_tags() {
    let cloud = CloudServer::new(ServerConfig::default());
    let (phone, _) = cloud.connect("phone");

    let entity: Entity = profile("acct42", "Alice").into();
    let saved = phone.save(to_remote(&entity)).await.unwrap();
    assert!(saved.change_tag.is_some());
    assert!(saved.modified_at.is_some());

    let id = record_id_for(EntityKind::UserProfile, "acct42");
    let fetched = phone.fetch(EntityKind::UserProfile, &id).await.unwrap();
    assert_eq!(fetched, saved);

    let mapped = from_remote(&fetched, &|_: &str| true).unwrap().into_entity();
    assert_eq!(mapped.without_meta(), entity.without_meta());

    // A save based on a stale tag conflicts and carries the server copy.
    let mut stale = to_remote(&entity);
    stale.change_tag = Some("0".into());
    match phone.save(stale).await {
        Err(RemoteError::Conflict { server_record }) => assert_eq!(*server_record, saved),
        other => panic!("expected a conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_records() {
    let cloud = CloudServer::new(ServerConfig::default());
    let (phone, _) = cloud.connect("phone");

    let err = phone.fetch(EntityKind::Goal, &"G1".into()).await.unwrap_err();
    assert!(matches!(err, RemoteError::NotFound { .. }));
    let err = phone.delete(EntityKind::Goal, &"G1".into()).await.unwrap_err();
    assert!(matches!(err, RemoteError::NotFound { .. }));
}

#[tokio::test]
async fn change_feed_is_paged_and_capped() {
    let cloud = CloudServer::new(ServerConfig::default().with_max_fetch_batch(2));
    let (phone, _) = cloud.connect("phone");
    for i in 0..3 {
        phone
            .save(to_remote(&goal(&format!("G{i}"), "x").into()))
            .await
            .unwrap();
    }
    phone.delete(EntityKind::Goal, &"G0".into()).await.unwrap();

    let first = phone.fetch_changed(EntityKind::Goal, None, 50).await.unwrap();
    assert_eq!(first.len(), 2);
    assert!(first.has_more);

    let rest = phone
        .fetch_changed(EntityKind::Goal, Some(first.next_token), 50)
        .await
        .unwrap();
    assert_eq!(rest.records.len(), 0);
    assert_eq!(rest.deleted.len(), 1);
    assert_eq!(rest.deleted[0].id.as_str(), "G0");
    assert_eq!(rest.next_token, ChangeToken::new(4));
    assert!(!rest.has_more);
}

#[tokio::test]
async fn mutations_fan_out_to_registered_devices() {
    let cloud = CloudServer::new(ServerConfig::default());
    let (phone, _phone_pushes) = cloud.connect("phone");
    let (tablet, mut tablet_pushes) = cloud.connect("tablet");

    phone
        .save_subscription(Subscription::for_kind(EntityKind::Task))
        .await
        .unwrap();
    tablet.register_device_token("tablet-token").await.unwrap();
    assert_eq!(phone.fetch_subscription_ids().await.unwrap(), ["task-changes"]);

    let record = to_remote(&task("T1", "G1", "Run").into());
    let saved = phone.save(record).await.unwrap();
    phone.save(saved).await.unwrap();
    phone.delete(EntityKind::Task, &"T1".into()).await.unwrap();

    let mut reasons = Vec::new();
    while let Ok(payload) = tablet_pushes.try_recv() {
        let notification = RemoteNotification::parse(&payload).unwrap();
        assert_eq!(notification.kind, Some(EntityKind::Task));
        reasons.push(notification.mutation.unwrap());
    }
    use goalsync_sync_protocol::MutationKind::*;
    assert_eq!(reasons, [Create, Update, Delete]);

    // Goals have no subscription.
    phone.save(to_remote(&goal("G1", "x").into())).await.unwrap();
    assert!(tablet_pushes.try_recv().is_err());
}

#[tokio::test]
async fn injected_faults() {
    let cloud = CloudServer::new(ServerConfig::default());
    let (phone, _) = cloud.connect("phone");

    phone.faults().reject("G1");
    let err = phone.save(to_remote(&goal("G1", "x").into())).await.unwrap_err();
    assert!(matches!(err, RemoteError::Rejected { .. }));

    cloud.faults("phone").unwrap().set_offline(true);
    let err = phone.fetch_subscription_ids().await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(phone.faults().calls("save"), 1);
    assert_eq!(phone.faults().calls("fetch_subscription_ids"), 1);
    assert!(cloud.zone().is_empty());
}
