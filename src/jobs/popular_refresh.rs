//! Popularity aggregate refresh job.
//!
//! The cold-start path reads the `popular_tracks` aggregate; this job
//! rebuilds it on an interval so popularity tracks recent listening.

use std::time::Duration;

use async_trait::async_trait;

use super::{BackgroundJob, JobContext};
use crate::deadline::Deadline;

/// Budget for one refresh; the rebuild scans the interaction log.
const REFRESH_BUDGET: Duration = Duration::from_secs(60);

pub struct PopularTracksRefreshJob {
    interval: Duration,
}

impl PopularTracksRefreshJob {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

#[async_trait]
impl BackgroundJob for PopularTracksRefreshJob {
    fn id(&self) -> &'static str {
        "popular-tracks-refresh"
    }

    fn name(&self) -> &'static str {
        "Popular tracks refresh"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self, ctx: &JobContext) -> anyhow::Result<()> {
        ctx.store
            .refresh_popular_tracks(Deadline::after(REFRESH_BUDGET))
            .await?;
        Ok(())
    }
}
