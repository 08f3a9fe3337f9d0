//! The bounded worker pool: claims queued runs up to `max_parallel_runs`
//! and drives each through `PipelineRunner::process_run` on its own task.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use aac_core::repository::Repository;
use aac_pipeline::PipelineRunner;

const IDLE_WITH_WORK_IN_FLIGHT: Duration = Duration::from_millis(250);

pub struct WorkerPool {
    repo: Arc<dyn Repository>,
    runner: Arc<PipelineRunner>,
}

impl WorkerPool {
    pub fn new(repo: Arc<dyn Repository>, runner: Arc<PipelineRunner>) -> Self {
        Self { repo, runner }
    }

    /// Runs the poll loop forever. Never returns under normal operation;
    /// intended to be the body of the worker process's main task.
    pub async fn run_forever(&self) -> ! {
        let mut in_flight: JoinSet<()> = JoinSet::new();
        loop {
            self.tick(&mut in_flight).await;
        }
    }

    /// One iteration of the poll loop: reap, claim up to `max_parallel_runs`,
    /// sleep if idle. Exposed separately so tests can drive a bounded number
    /// of iterations instead of looping forever.
    async fn tick(&self, in_flight: &mut JoinSet<()>) {
        self.reap_finished(in_flight).await;

        let config = match self.repo.get_runtime_config().await {
            Ok(config) => config,
            Err(err) => {
                log::error!("worker pool failed to read runtime config: {err}");
                tokio::time::sleep(Duration::from_secs(1)).await;
                return;
            }
        };
        let max_parallel_runs = aac_domain::runtime_config::clamp_max_parallel_runs(config.max_parallel_runs) as usize;

        let mut claimed_any = false;
        while in_flight.len() < max_parallel_runs {
            match self.repo.claim_next_queued_run().await {
                Ok(Some(run)) => {
                    claimed_any = true;
                    log::info!("run {} claimed, status={}", run.id, run.status);
                    let runner = self.runner.clone();
                    in_flight.spawn(async move {
                        match runner.process_run(run).await {
                            Ok(finished) => log::info!("run {} finished with status {}", finished.id, finished.status),
                            Err(err) => log::error!("run processing failed outside the pipeline's own recovery path: {err}"),
                        }
                    });
                }
                Ok(None) => break,
                Err(err) => {
                    log::error!("worker pool failed to claim a run: {err}");
                    break;
                }
            }
        }

        if !claimed_any && in_flight.is_empty() {
            tokio::time::sleep(Duration::from_secs(config.worker_poll_seconds.max(1) as u64)).await;
        } else if !claimed_any {
            tokio::time::sleep(IDLE_WITH_WORK_IN_FLIGHT).await;
        }
    }

    async fn reap_finished(&self, in_flight: &mut JoinSet<()>) {
        while let Some(result) = in_flight.try_join_next() {
            if let Err(join_err) = result {
                log::error!("worker task panicked: {join_err}");
            }
        }
    }

    /// Drains the queue by repeatedly ticking until nothing is claimable and
    /// nothing is in flight. Used by tests and by the maintenance CLI's
    /// "run to completion" mode; the production entrypoint uses
    /// `run_forever` instead.
    pub async fn run_until_drained(&self, max_ticks: usize) {
        let mut in_flight: JoinSet<()> = JoinSet::new();
        for _ in 0..max_ticks {
            self.tick(&mut in_flight).await;
            if in_flight.is_empty() && !self.anything_claimable().await {
                return;
            }
        }
    }

    async fn anything_claimable(&self) -> bool {
        match self.repo.list_runs(aac_core::repository::RunFilter::default()).await {
            Ok(runs) => runs.iter().any(|r| r.status.is_claimable()),
            Err(_) => false,
        }
    }
}
