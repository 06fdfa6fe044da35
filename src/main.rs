mod cli;
mod ui;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Command};
use opensesame_sync::api::OpenSesameClient;
use opensesame_sync::config::SyncConfig;
use opensesame_sync::handler::{CourseSyncHandler, rename_activities};
use opensesame_sync::host::CourseRepository;
use opensesame_sync::host::lock::SnapshotLock;
use opensesame_sync::host::memory::MemoryHost;
use opensesame_sync::orchestrator::SyncOrchestrator;
use opensesame_sync::queue::{CircuitBreaker, TaskQueue, TaskRunner};
use opensesame_sync::state_machine::StateMachine;
use opensesame_sync::status::StatusReport;

type Queue<'a> = TaskQueue<'a, MemoryHost, MemoryHost>;

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .init();
}

fn build_client(config: &SyncConfig) -> Result<OpenSesameClient> {
    config.validate()?;
    Ok(OpenSesameClient::new(
        config.auth_url.clone(),
        config.base_url.clone(),
        config.credentials(),
        config.retry_policy(),
        config.timeouts(),
    )?)
}

async fn run(
    command: Command,
    config: &SyncConfig,
    host: &MemoryHost,
    queue: &Queue<'_>,
    machine: StateMachine,
) -> Result<()> {
    match command {
        Command::Sync => {
            let client = build_client(config)?;
            let handler = CourseSyncHandler::new(&client, host, queue, config.handler_settings());
            let progress = ui::SweepProgress::start();
            let on_page = |page: u32, records: usize| progress.page(page, records);

            let result = SyncOrchestrator::new(&client, host, host, &handler, machine)
                .page_size(config.page_size)
                .root_category(config.root_category)
                .on_page(&on_page)
                .run()
                .await;
            match result {
                Ok(report) => progress.complete(&report),
                Err(e) => {
                    progress.fail(&e.to_string());
                    return Err(e.into());
                }
            }
        }
        Command::Work => {
            let client = build_client(config)?;
            let handler = CourseSyncHandler::new(&client, host, queue, config.handler_settings());
            let runner = TaskRunner::new(machine, &handler, host, queue);
            let results = runner.run_due(Utc::now()).await?;
            ui::print_task_results(&results);
        }
        Command::Status { page, page_size } => {
            let report = StatusReport::collect(host, queue, page, page_size)?;
            ui::print_status(&report);
        }
        Command::Resume => {
            let requeued = queue.resume(host)?;
            info!(requeued, "breaker cleared");
        }
        Command::Reset { remote_id } => {
            let mut course = host
                .find_by_remote_id(&remote_id)?
                .with_context(|| format!("no synced course with remote id {remote_id}"))?;
            let previous = course.status;
            course.reset();
            host.save(&mut course)?;
            info!(remote_id, %previous, "course reset to retrieved");
        }
        Command::RenameActivities => {
            rename_activities(host, host, config.activity_naming, &config.activity_prefix)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = SyncConfig::load(cli.config.as_deref())?;

    // Held until the snapshot is written back.
    let mut snapshot_lock = SnapshotLock::open(&config.state_file)?;
    let _held = snapshot_lock.try_hold()?;

    let host = MemoryHost::load_snapshot(&config.state_file)
        .with_context(|| format!("loading state from {}", config.state_file.display()))?;
    let machine = StateMachine::new()?;
    let queue = TaskQueue::new(
        &host,
        CircuitBreaker::new(&host, config.failure_threshold, config.lock_timeout()),
        config.task_delay(),
    );

    // Progress made before a failure is still written back.
    let result = run(cli.command, &config, &host, &queue, machine).await;
    host.save_snapshot(&config.state_file)
        .with_context(|| format!("saving state to {}", config.state_file.display()))?;
    result
}
