//! Binary entrypoint: wires `EnvConfig` → Postgres pool → `PostgresRepository`
//! → provider clients → `PipelineRunner` → `WorkerPool`, plus a `maintenance`
//! subcommand.

mod logging;
mod maintenance;

use std::sync::Arc;

use aac_core::repository::Repository;
use aac_core::EnvConfig;
use aac_persistence::{create_pool, run_migrations, PostgresRepository};
use aac_pipeline::PipelineRunner;
use aac_providers::asset_store::AssetStore;
use aac_providers::{OpenAiAssistantClient, ReplicateImageGenClient};
use aac_worker::WorkerPool;

const DATABASE_MAX_CONNECTIONS: u32 = 10;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let env = match EnvConfig::from_env() {
        Ok(env) => env,
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(1)
        }
    };
    logging::configure_logging(&env.log_level);

    let command = std::env::args().nth(1).unwrap_or_else(|| "serve".to_string());

    if let Err(err) = run(&env, &command).await {
        log::error!("{command} failed: {err}");
        std::process::exit(1);
    }
}

async fn run(env: &EnvConfig, command: &str) -> Result<(), aac_core::EngineError> {
    let pool = create_pool(&env.database_url, DATABASE_MAX_CONNECTIONS).await?;
    run_migrations(&pool).await?;
    let repo: Arc<dyn Repository> = Arc::new(PostgresRepository::new(pool));

    match command {
        "serve" => serve(env, repo).await,
        "maintenance" => run_maintenance(env, repo).await,
        other => {
            eprintln!("unknown command '{other}', expected 'serve' or 'maintenance'");
            std::process::exit(2)
        }
    }
}

async fn serve(env: &EnvConfig, repo: Arc<dyn Repository>) -> Result<(), aac_core::EngineError> {
    let config = repo.get_runtime_config().await?;
    log::info!("worker starting, max_parallel_runs={} worker_poll_seconds={}", config.max_parallel_runs, config.worker_poll_seconds);

    let assistant = Arc::new(OpenAiAssistantClient::new(
        env.assistant_base_url.clone(),
        env.assistant_api_key.clone(),
        config.assistant_id.clone(),
        config.max_api_retries.max(0) as u32,
    ));
    let image_gen = Arc::new(ReplicateImageGenClient::new(env.image_gen_base_url.clone(), env.image_gen_api_key.clone(), config.max_api_retries.max(0) as u32));
    let assets = AssetStore::new(env.runtime_data_root.clone());
    let runner = Arc::new(PipelineRunner::new(repo.clone(), assistant, image_gen, assets));

    WorkerPool::new(repo, runner).run_forever().await
}

async fn run_maintenance(env: &EnvConfig, repo: Arc<dyn Repository>) -> Result<(), aac_core::EngineError> {
    let now_stamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
    match maintenance::backup_database(&env.database_url, &env.runtime_data_root, &now_stamp) {
        Ok(path) => log::info!("backup complete: {}", path.display()),
        Err(err) => log::error!("backup failed: {err}"),
    }

    let report = maintenance::storage_integrity_report(&repo).await?;
    log::info!("storage integrity report: {}/{} assets missing on disk", report.missing_assets, report.total_assets);
    Ok(())
}
