//! Inspect command implementation.

use goalsync_core::{CoreResult, Entity, EntityKind, EntityStore, LocalStore, PendingDelete};
use serde::Serialize;
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store file path.
    pub path: String,
    /// Per-kind counts and checkpoints.
    pub kinds: Vec<KindStats>,
    /// Remote deletes not yet confirmed.
    pub pending_deletes: Vec<PendingDelete>,
    /// Tasks waiting for their goal.
    pub deferred_tasks: Vec<String>,
    /// Whether a push token is stored.
    pub push_registered: bool,
    /// Subscriptions known to exist remotely.
    pub subscriptions: Vec<String>,
    /// Entities listed (dirty ones unless everything was requested).
    pub entities: Vec<Entity>,
}

/// Statistics for one entity kind.
#[derive(Debug, Serialize)]
pub struct KindStats {
    /// Entity kind.
    pub kind: EntityKind,
    /// Number of entities.
    pub total: usize,
    /// Number with unpushed edits.
    pub dirty: usize,
    /// Last applied change token.
    pub checkpoint: Option<u64>,
}

/// Runs the inspect command.
pub fn run(path: &Path, all: bool, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No store found at {:?}", path).into());
    }
    let store = LocalStore::open(path)?;
    let result = inspect(&store, &path.display().to_string(), all)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Collects a store's sync state.
pub fn inspect(store: &impl EntityStore, path: &str, all: bool) -> CoreResult<InspectResult> {
    let mut kinds = Vec::new();
    let mut entities = Vec::new();

    for kind in EntityKind::ALL {
        let listed = store.list(kind)?;
        let dirty = listed.iter().filter(|e| e.needs_sync()).count();
        kinds.push(KindStats {
            kind,
            total: listed.len(),
            dirty,
            checkpoint: store.checkpoint(kind)?.map(|token| token.as_u64()),
        });
        entities.extend(listed.into_iter().filter(|e| all || e.needs_sync()));
    }

    let device = store.device_state()?;
    Ok(InspectResult {
        path: path.to_string(),
        kinds,
        pending_deletes: store.pending_deletes()?,
        deferred_tasks: store.deferred_tasks()?.into_iter().map(|t| t.id).collect(),
        push_registered: device.push_token.is_some(),
        subscriptions: device.subscriptions.into_iter().collect(),
        entities,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("goalsync store: {}", result.path);
    println!();
    println!("{:<16} {:>8} {:>8} {:>12}", "Kind", "Total", "Dirty", "Checkpoint");
    for stats in &result.kinds {
        let checkpoint = stats
            .checkpoint
            .map_or_else(|| "-".to_string(), |c| c.to_string());
        println!(
            "{:<16} {:>8} {:>8} {:>12}",
            stats.kind.record_type(),
            stats.total,
            stats.dirty,
            checkpoint
        );
    }
    println!();

    println!("Pending remote deletes: {}", result.pending_deletes.len());
    for pending in &result.pending_deletes {
        println!("  {} {} (deleted {})", pending.kind, pending.id, pending.deleted_at);
    }
    println!("Deferred tasks: {}", result.deferred_tasks.len());
    for id in &result.deferred_tasks {
        println!("  {id}");
    }
    println!(
        "Push: {}",
        if result.push_registered {
            "registered"
        } else {
            "poll-only"
        }
    );
    println!("Subscriptions: {}", result.subscriptions.join(", "));

    if !result.entities.is_empty() {
        println!();
        println!("Entities:");
        for entity in &result.entities {
            let meta = entity.meta();
            println!(
                "  {:<14} {:<24} rev {:<4} {} {}",
                entity.kind().record_type(),
                entity.id(),
                meta.local_revision,
                if meta.needs_sync { "dirty" } else { "clean" },
                meta.modified_at.to_rfc3339()
            );
        }
    }
}
