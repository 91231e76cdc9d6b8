//! Simulate command implementation.
//!
//! Two devices share one in-memory cloud. The script exercises the usual
//! paths: first upload, first download, an offline edit racing a newer edit
//! from the other device, and recovery when the network returns.

use chrono::{Duration, Utc};
use goalsync_cloud::{CloudClient, CloudServer, ServerConfig};
use goalsync_core::{Entity, EntityKind, EntityStore, Goal, LocalStore, Task, UserProfile};
use goalsync_sync_engine::{
    PassOutcome, ReachabilityMonitor, SyncConfig, SyncOrchestrator, SyncResult,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

type Engine = SyncOrchestrator<LocalStore, CloudClient>;

/// One scripted step.
#[derive(Debug, Serialize)]
pub struct Step {
    /// Device that acted.
    pub device: String,
    /// What it did.
    pub action: String,
    /// What the sync engine reported.
    pub outcome: String,
}

/// Simulation result.
#[derive(Debug, Serialize)]
pub struct SimulationResult {
    /// Steps in order.
    pub steps: Vec<Step>,
    /// Whether both devices ended with the same data.
    pub converged: bool,
    /// The first device's final entities.
    pub entities: Vec<Entity>,
}

struct Device {
    name: &'static str,
    client: Arc<CloudClient>,
    sync: Engine,
}

impl Device {
    fn connect(cloud: &Arc<CloudServer>, name: &'static str, account: &str) -> Self {
        // Nothing reads the push channel; passes are driven by the script.
        let (client, _pushes) = cloud.connect(name);
        let client = Arc::new(client);
        let sync = SyncOrchestrator::new(
            SyncConfig::new(account),
            Arc::new(LocalStore::open_in_memory()),
            Arc::clone(&client),
            ReachabilityMonitor::new(true),
        );
        Self { name, client, sync }
    }

    fn store(&self) -> &LocalStore {
        self.sync.store()
    }
}

/// Runs the simulate command.
pub fn run(account: &str, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(simulate(account))?;

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

/// Plays the two-device script.
pub async fn simulate(account: &str) -> Result<SimulationResult, Box<dyn std::error::Error>> {
    let cloud = CloudServer::new(ServerConfig::default());
    let phone = Device::connect(&cloud, "phone", account);
    let tablet = Device::connect(&cloud, "tablet", account);
    let mut steps = Vec::new();

    let profile_id = phone.sync.config().profile_id();
    phone
        .store()
        .save(UserProfile::new(profile_id, "goal-getter").into())?;
    phone.store().save(Goal::new("G1", "Run a marathon").into())?;
    phone
        .store()
        .save(Task::new("T1", "G1", "Five kilometre loop").into())?;
    let outcome = phone.sync.sync().await;
    record(&mut steps, &phone, "created a profile, a goal and a task", outcome);

    let outcome = tablet.sync.sync().await;
    record(&mut steps, &tablet, "opened the app", outcome);

    tablet.client.faults().set_offline(true);
    let outcome = tablet.sync.reachability_changed(false).await;
    record(&mut steps, &tablet, "lost connectivity", outcome);

    let earlier = Utc::now() - Duration::minutes(10);
    rename_goal(&tablet, "Run a half marathon", earlier)?;
    let outcome = tablet.sync.sync().await;
    record(&mut steps, &tablet, "renamed G1 while offline", outcome);

    rename_goal(&phone, "Run a marathon in spring", Utc::now())?;
    let outcome = phone.sync.sync().await;
    record(&mut steps, &phone, "renamed G1 later", outcome);

    tablet.client.faults().set_offline(false);
    let outcome = tablet.sync.reachability_changed(true).await;
    record(&mut steps, &tablet, "came back online", outcome);

    let outcome = phone.sync.sync().await;
    record(&mut steps, &phone, "refreshed", outcome);

    let converged = snapshot(phone.store())? == snapshot(tablet.store())?;
    let mut entities = Vec::new();
    for kind in EntityKind::ALL {
        entities.extend(phone.store().list(kind)?);
    }

    Ok(SimulationResult {
        steps,
        converged,
        entities,
    })
}

fn rename_goal(
    device: &Device,
    name: &str,
    at: chrono::DateTime<Utc>,
) -> Result<(), Box<dyn std::error::Error>> {
    let Some(Entity::Goal(mut goal)) = device.store().get(EntityKind::Goal, "G1")? else {
        return Err(format!("{} has no goal G1", device.name).into());
    };
    goal.name = name.to_string();
    device.store().save_at(goal.into(), at)?;
    Ok(())
}

fn snapshot(store: &LocalStore) -> Result<Vec<Entity>, Box<dyn std::error::Error>> {
    let mut entities = Vec::new();
    for kind in EntityKind::ALL {
        entities.extend(store.list(kind)?.iter().map(Entity::without_meta));
    }
    Ok(entities)
}

fn record(steps: &mut Vec<Step>, device: &Device, action: &str, outcome: SyncResult<PassOutcome>) {
    let outcome = match outcome {
        Ok(PassOutcome::Completed(report)) => format!(
            "pass {}: pushed {}, pulled {}, conflicts {}",
            report.pass,
            report.pushed,
            report.pulled,
            report.conflicts.len()
        ),
        Ok(PassOutcome::Coalesced) => "coalesced".to_string(),
        Ok(PassOutcome::Deferred(reason)) => format!("deferred ({reason:?})"),
        Err(err) => format!("failed: {err}"),
    };
    debug!(device = device.name, action, outcome = %outcome, "simulation step");
    steps.push(Step {
        device: device.name.to_string(),
        action: action.to_string(),
        outcome,
    });
}

fn print_text_output(result: &SimulationResult) {
    for (i, step) in result.steps.iter().enumerate() {
        println!(
            "{:>2}. {:<7} {:<40} {}",
            i + 1,
            step.device,
            step.action,
            step.outcome
        );
    }
    println!();
    println!(
        "Devices {}",
        if result.converged {
            "converged"
        } else {
            "diverged"
        }
    );
    for entity in &result.entities {
        println!("  {:<14} {}", entity.kind().record_type(), entity.id());
    }
}
