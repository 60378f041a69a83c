// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Platform orchestrator CLI.

use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use orchestrator_audit::{AuditEventBus, AuditLogger, FileAuditStorage, RotationPolicy};
use orchestrator_core::dag;
use orchestrator_core::{
    ApplicationInstance, EventBusRef, NullEventBus, OrchestratorConfig, PersistenceRef, PhaseRunner, Workflow,
    WorkflowExecutor, WorkflowResolver,
};
use orchestrator_executors::register_default_executors;
use orchestrator_state::PostgresPersistence;

#[derive(Parser)]
#[command(name = "orchestrator")]
#[command(version, about = "Platform Orchestration Engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Postgres connection string; falls back to an in-memory store when unset
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Path to the tamper-evident audit log (JSON Lines); disabled when unset
    #[arg(long, global = true, env = "AUDIT_LOG_PATH")]
    audit_log: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a workflow definition: structure, dependency references, and
    /// acyclicity
    Validate {
        /// Path to workflow file
        #[arg(value_name = "FILE")]
        file: String,
    },

    /// Resolve and run every platform/product/application-tier workflow for
    /// one application instance
    Run {
        /// Application instance name, e.g. "checkout-api"
        application_name: String,

        /// Root directory containing `platform/` and `products/<name>/` workflow trees
        #[arg(long, default_value = "workflows")]
        root: String,

        /// Resource names the application declares (comma-separated), e.g. "db,cache"
        #[arg(long, value_delimiter = ',')]
        resources: Vec<String>,

        /// Platform workflow names that must resolve for every application
        #[arg(long, value_delimiter = ',')]
        required_platform_workflows: Vec<String>,

        /// Max resolved workflows run concurrently within one phase
        #[arg(long, default_value = "5")]
        max_concurrency: usize,
    },

    /// Retry a failed workflow execution from its first failed step (§4.8)
    RetryWorkflow {
        /// Path to the workflow file that was originally run
        #[arg(value_name = "FILE")]
        file: String,

        /// Application instance name the execution belongs to
        application_name: String,

        /// The execution id to retry
        parent_execution_id: i64,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("orchestrator={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let result = run(cli).await;

    if let Err(e) = result {
        error!("{:#}", e);
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Validate { file } => validate_workflow(&file),
        Commands::Run {
            application_name,
            root,
            resources,
            required_platform_workflows,
            max_concurrency,
        } => {
            run_application(
                &cli.database_url,
                &cli.audit_log,
                &application_name,
                &root,
                resources,
                required_platform_workflows,
                max_concurrency,
            )
            .await
        }
        Commands::RetryWorkflow {
            file,
            application_name,
            parent_execution_id,
        } => retry_workflow(&cli.database_url, &cli.audit_log, &file, &application_name, parent_execution_id).await,
    }
}

fn validate_workflow(file_path: &str) -> Result<()> {
    info!("Validating workflow: {}", file_path);
    println!("{} {}", "Validating workflow:".cyan().bold(), file_path);

    let content =
        fs::read_to_string(file_path).with_context(|| format!("Failed to read workflow file: {}", file_path))?;

    let workflow: Workflow =
        serde_yaml::from_str(&content).with_context(|| format!("Failed to parse workflow YAML: {}", file_path))?;

    info!("Parsed workflow: {}", workflow.name);

    workflow.validate().with_context(|| "Workflow validation failed")?;
    dag::validate_acyclic(&workflow.steps).with_context(|| "Workflow dependency graph has a cycle")?;

    println!("{}", "Workflow is valid".green().bold());
    println!("  Name: {}", workflow.name);
    println!("  Steps: {}", workflow.steps.len());

    Ok(())
}

/// Builds the persistence backend: Postgres when `--database-url` is set,
/// otherwise an in-memory store (migrations run automatically for Postgres).
async fn build_persistence(database_url: &Option<String>) -> Result<PersistenceRef> {
    match database_url {
        Some(url) => {
            let persistence = PostgresPersistence::connect(url)
                .await
                .with_context(|| "Failed to connect to the database")?;
            persistence
                .migrate()
                .await
                .with_context(|| "Failed to run database migrations")?;
            Ok(Arc::new(persistence))
        }
        None => {
            info!("No --database-url given, using an in-memory persistence store");
            Ok(Arc::new(orchestrator_core::InMemoryPersistence::new()))
        }
    }
}

/// Builds the event bus: a `FileAuditStorage`-backed audit trail when
/// `--audit-log` is set, otherwise a bus that discards every event.
fn build_event_bus(audit_log: &Option<String>) -> Result<EventBusRef> {
    match audit_log {
        Some(path) => {
            let storage = FileAuditStorage::new(path.into(), RotationPolicy::Daily)
                .with_context(|| format!("Failed to open audit log: {}", path))?;
            let logger = AuditLogger::new(Arc::new(storage));
            Ok(Arc::new(AuditEventBus::new(logger)))
        }
        None => Ok(Arc::new(NullEventBus)),
    }
}

async fn run_application(
    database_url: &Option<String>,
    audit_log: &Option<String>,
    application_name: &str,
    root: &str,
    resources: Vec<String>,
    required_platform_workflows: Vec<String>,
    max_concurrency: usize,
) -> Result<()> {
    println!("{} {}", "Resolving workflows for:".cyan().bold(), application_name);

    let persistence = build_persistence(database_url).await?;
    let events = build_event_bus(audit_log)?;

    let resolver = WorkflowResolver::new(root, persistence.clone(), required_platform_workflows);
    let app = ApplicationInstance {
        name: application_name.to_string(),
        configuration: HashMap::new(),
        resources,
    };
    let plan = resolver.resolve(&app).await.with_context(|| "Failed to resolve workflows")?;

    let total: usize = plan.values().map(|v| v.len()).sum();
    println!("  Resolved {} workflow(s) across 3 phases", total);

    let mut registry = orchestrator_core::StepExecutorRegistry::new();
    let resource_manager = Arc::new(orchestrator_core::InMemoryResourceManager::new());
    register_default_executors(&mut registry, resource_manager.clone());

    let config = OrchestratorConfig::from_env();
    let executor = Arc::new(WorkflowExecutor::new(
        Arc::new(registry),
        persistence,
        resource_manager,
        events,
        config,
    ));
    let runner = PhaseRunner::new(executor, max_concurrency);

    println!("{}", "Executing phases...".cyan());
    let outcomes = runner.run(application_name, &plan).await;

    let failed = outcomes.iter().filter(|o| o.failed_step.is_some()).count();
    for outcome in &outcomes {
        let status = if outcome.failed_step.is_some() {
            "failed".red().bold()
        } else {
            "completed".green().bold()
        };
        println!(
            "  execution #{} ({}): {}",
            outcome.execution.id, outcome.execution.workflow_name, status
        );
    }

    if failed > 0 {
        anyhow::bail!("{} of {} workflow execution(s) failed", failed, outcomes.len());
    }

    println!("{}", "All workflows completed successfully".green().bold());
    Ok(())
}

async fn retry_workflow(
    database_url: &Option<String>,
    audit_log: &Option<String>,
    file_path: &str,
    application_name: &str,
    parent_execution_id: i64,
) -> Result<()> {
    let database_url = database_url
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("retry-workflow requires --database-url: the parent execution's state must be persisted"))?;

    println!(
        "{} execution #{} for {}",
        "Retrying workflow:".cyan().bold(),
        parent_execution_id,
        application_name
    );

    let content =
        fs::read_to_string(file_path).with_context(|| format!("Failed to read workflow file: {}", file_path))?;
    let workflow: Workflow =
        serde_yaml::from_str(&content).with_context(|| format!("Failed to parse workflow YAML: {}", file_path))?;

    let persistence = build_persistence(&Some(database_url.clone())).await?;
    let events = build_event_bus(audit_log)?;

    let mut registry = orchestrator_core::StepExecutorRegistry::new();
    let resource_manager = Arc::new(orchestrator_core::InMemoryResourceManager::new());
    register_default_executors(&mut registry, resource_manager.clone());

    let config = OrchestratorConfig::from_env();
    let executor = WorkflowExecutor::new(Arc::new(registry), persistence, resource_manager, events, config);

    let outcome = executor
        .retry(application_name, &workflow, parent_execution_id)
        .await
        .with_context(|| "Workflow retry failed")?;

    if let Some(failed_step) = &outcome.failed_step {
        anyhow::bail!("retry execution #{} failed at step '{}'", outcome.execution.id, failed_step);
    }

    println!(
        "{} retry execution #{} (attempt {})",
        "Retry completed successfully:".green().bold(),
        outcome.execution.id,
        outcome.execution.retry_count
    );
    Ok(())
}
