//! Syncable entities.

mod id;
mod model;
mod schedule;

pub use id::{new_entity_id, profile_id_for_account};
pub use model::{Entity, Goal, PurchasedItem, SyncMeta, Task, UserProfile};
pub use schedule::{HourWindow, ProductiveHours};
