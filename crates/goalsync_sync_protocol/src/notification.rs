//! Push notification payloads.
//!
//! A payload only has to say "something of this kind changed". Anything the
//! parser cannot recognise is treated as a notification for every kind.

use crate::record::RecordId;
use crate::subscription::Subscription;
use goalsync_core::EntityKind;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Payload keys.
const SUBSCRIPTION_ID: &str = "subscriptionId";
const RECORD_TYPE: &str = "recordType";
const RECORD_ID: &str = "recordId";
const REASON: &str = "reason";

/// Remote mutation that fired a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationKind {
    /// Record created.
    Create,
    /// Record updated.
    Update,
    /// Record deleted.
    Delete,
}

impl MutationKind {
    /// All mutations.
    pub const ALL: [MutationKind; 3] = [
        MutationKind::Create,
        MutationKind::Update,
        MutationKind::Delete,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Create => "create",
            MutationKind::Update => "update",
            MutationKind::Delete => "delete",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == s)
    }
}

/// A decoded change notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteNotification {
    /// Subscription that fired, if named.
    pub subscription_id: Option<String>,
    /// Record type, if named.
    pub kind: Option<EntityKind>,
    /// Record name, if named.
    pub record_id: Option<RecordId>,
    /// Mutation, if named.
    pub mutation: Option<MutationKind>,
}

impl RemoteNotification {
    /// Builds a notification for a mutation of one record.
    pub fn for_record(
        subscription_id: impl Into<String>,
        kind: EntityKind,
        record_id: RecordId,
        mutation: MutationKind,
    ) -> Self {
        Self {
            subscription_id: Some(subscription_id.into()),
            kind: Some(kind),
            record_id: Some(record_id),
            mutation: Some(mutation),
        }
    }

    /// Decodes a payload.
    ///
    /// Returns `None` if the payload is not an object or names none of the
    /// recognised keys.
    pub fn parse(payload: &Value) -> Option<Self> {
        let object = payload.as_object()?;
        let text = |key: &str| object.get(key).and_then(Value::as_str);

        let notification = Self {
            subscription_id: text(SUBSCRIPTION_ID).map(str::to_string),
            kind: text(RECORD_TYPE).and_then(|s| s.parse().ok()),
            record_id: text(RECORD_ID).map(RecordId::from),
            mutation: text(REASON).and_then(MutationKind::parse),
        };

        if notification.subscription_id.is_none() && notification.kind.is_none() {
            return None;
        }
        Some(notification)
    }

    /// Encodes the notification as a payload.
    pub fn to_payload(&self) -> Value {
        let mut payload = json!({});
        if let Some(object) = payload.as_object_mut() {
            if let Some(id) = &self.subscription_id {
                object.insert(SUBSCRIPTION_ID.into(), json!(id));
            }
            if let Some(kind) = self.kind {
                object.insert(RECORD_TYPE.into(), json!(kind.record_type()));
            }
            if let Some(id) = &self.record_id {
                object.insert(RECORD_ID.into(), json!(id.as_str()));
            }
            if let Some(mutation) = self.mutation {
                object.insert(REASON.into(), json!(mutation.as_str()));
            }
        }
        payload
    }

    /// The kind whose records changed.
    ///
    /// Uses the record type if present, otherwise the well-known subscription
    /// id.
    pub fn affected_kind(&self) -> Option<EntityKind> {
        self.kind.or_else(|| {
            self.subscription_id
                .as_deref()
                .and_then(Subscription::kind_for_id)
        })
    }
}
