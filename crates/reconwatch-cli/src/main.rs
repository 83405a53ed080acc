//! ReconWatch CLI
//!
//! A thin clap shell over the store traits — every subcommand is a direct
//! library call, no business logic of its own. Exposes the operations
//! spec'd as the external surface: target creation, pipeline triggering,
//! run discarding, verification triggering, and inventory listing.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};

use reconwatch_core::domain::{JobType, Run, RunConfig, RunTrigger, Target};
use reconwatch_store::{InventoryStore, JobQueue, NewJob, RunStore, SurrealStore, TargetStore};

#[derive(Parser)]
#[command(name = "reconwatch")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "ReconWatch: recon / attack-surface monitoring engine", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Target management
    Target {
        #[command(subcommand)]
        action: TargetAction,
    },

    /// Trigger a manual pipeline run for a target
    TriggerPipeline {
        /// Target ID
        target_id: String,
    },

    /// Discard a run (cooperative cancel cascade)
    DiscardRun {
        /// Run ID
        run_id: String,
    },

    /// Force re-verification of a stale asset or service
    TriggerVerification {
        #[command(subcommand)]
        action: VerifyAction,
    },

    /// Inventory listing
    Inventory {
        #[command(subcommand)]
        action: InventoryAction,
    },
}

#[derive(Subcommand)]
enum TargetAction {
    /// Register a new target
    Create {
        /// Display name
        name: String,
        /// Root domain, seeds the default scope policy
        root_domain: String,
    },
    /// List all targets
    List,
}

#[derive(Subcommand)]
enum VerifyAction {
    /// Re-verify a single asset by id
    Asset { asset_id: String },
    /// Re-verify a single service by id
    Service { service_id: String },
}

#[derive(Subcommand)]
enum InventoryAction {
    /// List assets for a target
    Assets { target_id: String },
    /// List services for a target
    Services { target_id: String },
    /// List findings for a target
    Findings { target_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    reconwatch_core::init_tracing(cli.json, level);

    let store = SurrealStore::from_env()
        .await
        .context("failed to connect to the ReconWatch database")?;

    match cli.command {
        Commands::Target { action } => match action {
            TargetAction::Create { name, root_domain } => cmd_target_create(&store, &name, &root_domain).await,
            TargetAction::List => cmd_target_list(&store).await,
        },
        Commands::TriggerPipeline { target_id } => cmd_trigger_pipeline(&store, &target_id).await,
        Commands::DiscardRun { run_id } => cmd_discard_run(&store, &run_id).await,
        Commands::TriggerVerification { action } => match action {
            VerifyAction::Asset { asset_id } => cmd_trigger_verify_asset(&store, &asset_id).await,
            VerifyAction::Service { service_id } => cmd_trigger_verify_service(&store, &service_id).await,
        },
        Commands::Inventory { action } => match action {
            InventoryAction::Assets { target_id } => cmd_list_assets(&store, &target_id).await,
            InventoryAction::Services { target_id } => cmd_list_services(&store, &target_id).await,
            InventoryAction::Findings { target_id } => cmd_list_findings(&store, &target_id).await,
        },
    }
}

async fn cmd_target_create(store: &SurrealStore, name: &str, root_domain: &str) -> Result<()> {
    let target = Target::new(name, root_domain);
    let created = store.create_target(target).await?;
    info!(target_id = %created.id, "target created");
    println!("Created target {} ({})", created.id, created.display_name);
    println!("Default scope: {:?}", created.scope.dns_suffixes);
    Ok(())
}

async fn cmd_target_list(store: &SurrealStore) -> Result<()> {
    let targets = store.list_targets().await?;
    if targets.is_empty() {
        println!("No targets registered.");
        return Ok(());
    }
    for t in targets {
        println!("{}\t{}\t{}", t.id, t.display_name, t.root_domain);
    }
    Ok(())
}

async fn cmd_trigger_pipeline(store: &SurrealStore, target_id: &str) -> Result<()> {
    let target_id = parse_id(target_id, "target")?;
    if store.has_active_pipeline(target_id).await? {
        anyhow::bail!("target already has an active pipeline run");
    }
    let run = Run::new(target_id, RunTrigger::Manual, RunConfig::default());
    let run = store.create_run(run).await?;
    store
        .enqueue(NewJob::now(
            target_id,
            Some(run.id),
            JobType::Pipeline,
            serde_json::json!({}),
            0,
        ))
        .await?;
    println!("Triggered pipeline run {}", run.id);
    Ok(())
}

async fn cmd_discard_run(store: &SurrealStore, run_id: &str) -> Result<()> {
    let run_id = parse_id(run_id, "run")?;
    let (queued, running) = store.cancel_children(run_id).await?;
    for job in &running {
        store.request_cancel(job.id).await?;
    }
    store.discard_run(run_id).await?;
    println!(
        "Discarded run {} ({} queued jobs cancelled, {} running jobs signalled)",
        run_id,
        queued.len(),
        running.len()
    );
    Ok(())
}

async fn cmd_trigger_verify_asset(store: &SurrealStore, asset_id: &str) -> Result<()> {
    let id = parse_id(asset_id, "asset")?;
    let asset = store.get_asset(reconwatch_core::domain::AssetId(id)).await?;
    store
        .enqueue(NewJob::now(
            asset.target_id,
            None,
            JobType::VerifyAsset,
            serde_json::json!({ "asset_id": asset_id }),
            5,
        ))
        .await?;
    println!("Queued verification for asset {asset_id}");
    Ok(())
}

async fn cmd_trigger_verify_service(store: &SurrealStore, service_id: &str) -> Result<()> {
    // A service's target isn't known without a lookup helper on the
    // trait; the orchestrator's handler re-derives it from the service
    // itself, so the CLI only needs the id here.
    let _ = parse_id(service_id, "service")?;
    anyhow::bail!(
        "trigger-verification service requires a target context; use `reconwatchd` \
         change detection, which enqueues this automatically for candidate-stale services"
    )
}

async fn cmd_list_assets(store: &SurrealStore, target_id: &str) -> Result<()> {
    let target_id = parse_id(target_id, "target")?;
    let assets = store.list_assets(target_id).await?;
    for a in assets {
        println!(
            "{}\t{:?}\t{}\t{:?}",
            a.id, a.asset_type, a.normalized_value, a.status
        );
    }
    Ok(())
}

async fn cmd_list_services(store: &SurrealStore, target_id: &str) -> Result<()> {
    let target_id = parse_id(target_id, "target")?;
    let services = store.list_services(target_id).await?;
    for s in services {
        println!("{}\t{}/{:?}\t{:?}", s.id, s.port, s.proto, s.status);
    }
    Ok(())
}

async fn cmd_list_findings(store: &SurrealStore, target_id: &str) -> Result<()> {
    let target_id = parse_id(target_id, "target")?;
    let findings = reconwatch_store::FindingStore::list_findings(store, target_id).await?;
    for f in findings {
        println!("{}\t{:?}\t{}", f.id, f.severity, f.title);
    }
    Ok(())
}

fn parse_id(raw: &str, kind: &str) -> Result<uuid::Uuid> {
    raw.parse().with_context(|| format!("invalid {kind} id: {raw}"))
}
