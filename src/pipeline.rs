use std::future::Future;
use std::process::ExitCode;

use anyhow::Result;
use tokio::signal;

use crate::channels::{Channel, DeliveryError};
use crate::config::ScheduleConfig;
use crate::history::{HistoryStore, Ledger};
use crate::jokes::Fetcher;
use crate::scheduler::Scheduler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExecutionMode {
    /// One pass, then exit with its status (CI / cron-job style).
    BatchOnce,
    /// One pass at startup, then one per schedule tick until interrupted.
    Continuous,
}

pub struct Pipeline {
    fetcher: Fetcher,
    channel: Box<dyn Channel>,
    store: HistoryStore,
}

impl Pipeline {
    pub fn new(fetcher: Fetcher, channel: Box<dyn Channel>, store: HistoryStore) -> Self {
        Self {
            fetcher,
            channel,
            store,
        }
    }

    /// Fetch, deliver and, on success, record and persist one joke.
    /// The ledger is left untouched when delivery fails.
    pub async fn run_pass(&self, ledger: &mut Ledger) -> Result<String, DeliveryError> {
        let fetched = self.fetcher.fetch(ledger).await;
        if fetched.is_fallback() {
            tracing::info!("Delivering a fallback joke");
        }
        let delivered = self.channel.deliver(&fetched.text).await?;
        ledger.record(delivered.clone());
        self.store.save(ledger);
        Ok(delivered)
    }

    /// The schedule is only parsed in continuous mode; batch runs never
    /// look at it.
    pub async fn run(
        &self,
        mode: ExecutionMode,
        schedule: &ScheduleConfig,
    ) -> Result<ExitCode> {
        match mode {
            ExecutionMode::BatchOnce => Ok(self.run_batch().await),
            ExecutionMode::Continuous => {
                let scheduler = Scheduler::new(schedule)?;
                self.run_continuous(&scheduler, async {
                    signal::ctrl_c().await.ok();
                })
                .await;
                Ok(ExitCode::SUCCESS)
            }
        }
    }

    pub async fn run_batch(&self) -> ExitCode {
        let mut ledger = self.store.load();
        match self.run_pass(&mut ledger).await {
            Ok(_) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!("Joke delivery via {} failed: {e}", self.channel.name());
                ExitCode::FAILURE
            }
        }
    }

    /// Passes run back to back on the scheduler's ticks; the next tick is
    /// only computed once the previous pass has finished, so they never
    /// overlap. Returns once `shutdown` resolves.
    pub async fn run_continuous(
        &self,
        scheduler: &Scheduler,
        shutdown: impl Future<Output = ()>,
    ) {
        tokio::pin!(shutdown);
        let mut ledger = self.store.load();
        self.tick(&mut ledger).await;

        tracing::info!("Scheduled with '{}'", scheduler.expr());
        loop {
            tokio::select! {
                tick = scheduler.wait_for_tick() => {
                    if tick.is_none() {
                        tracing::warn!(
                            "Schedule '{}' has no future runs, stopping",
                            scheduler.expr()
                        );
                        break;
                    }
                }
                _ = &mut shutdown => {
                    tracing::info!("Shutting down");
                    break;
                }
            }
            self.tick(&mut ledger).await;
        }
    }

    async fn tick(&self, ledger: &mut Ledger) {
        if let Err(e) = self.run_pass(ledger).await {
            tracing::error!("Joke delivery via {} failed: {e}", self.channel.name());
        }
    }
}
