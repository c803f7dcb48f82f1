//! Background job scheduling.
//!
//! A slim interval runner for maintenance work that must not ride on the
//! request path. Jobs receive a [`JobContext`] with the store handle and a
//! cancellation token; failures are logged and the schedule continues.

mod popular_refresh;

pub use popular_refresh::PopularTracksRefreshJob;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::store::RecommendationStore;

/// Context provided to jobs during execution.
#[derive(Clone)]
pub struct JobContext {
    /// Token to check for shutdown requests.
    pub cancellation_token: CancellationToken,
    /// Access to the track and interaction store.
    pub store: Arc<dyn RecommendationStore>,
}

/// Trait for interval-scheduled background jobs.
#[async_trait]
pub trait BackgroundJob: Send + Sync {
    /// Unique identifier for this job.
    fn id(&self) -> &'static str;

    /// Human-readable name.
    fn name(&self) -> &'static str;

    /// Time between runs.
    fn interval(&self) -> Duration;

    /// Execute one run.
    async fn run(&self, ctx: &JobContext) -> anyhow::Result<()>;
}

/// Runs each registered job on its interval until cancellation.
pub struct JobRunner {
    ctx: JobContext,
    jobs: Vec<Arc<dyn BackgroundJob>>,
}

impl JobRunner {
    pub fn new(ctx: JobContext) -> Self {
        Self {
            ctx,
            jobs: Vec::new(),
        }
    }

    pub fn register(&mut self, job: Arc<dyn BackgroundJob>) {
        self.jobs.push(job);
    }

    /// Spawn one task per job. Each runs immediately, then on its
    /// interval, until the cancellation token fires.
    pub fn spawn(self) -> Vec<JoinHandle<()>> {
        let JobRunner { ctx, jobs } = self;
        jobs.into_iter()
            .map(|job| {
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    info!(job = job.id(), "background job scheduled");
                    loop {
                        if let Err(err) = job.run(&ctx).await {
                            error!(job = job.id(), error = %err, "background job run failed");
                        }
                        tokio::select! {
                            _ = ctx.cancellation_token.cancelled() => {
                                info!(job = job.id(), "background job stopped");
                                break;
                            }
                            _ = tokio::time::sleep(job.interval()) => {}
                        }
                    }
                })
            })
            .collect()
    }
}
