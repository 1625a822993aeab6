//! Remote tracker import scheduling.
//!
//! Every tracker query carries a schedule expression. The [`Scheduler`]
//! turns the stored queries into periodic jobs that hand the query to a
//! [`RemoteFetcher`] together with the access token of the tracker's
//! provider. Re-planning always starts from scratch: all running jobs are
//! cancelled and the current set of queries is scheduled again.

mod schedule;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use witrack_protocol::{
    AccessTokens, SchedulerPort, Tracker, TrackerQuery, TrackerQueryId, TrackerQueryStore,
    TrackerStore, WitResult,
};

pub use schedule::Schedule;

/// Fetches the items matching a tracker query from the remote provider.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// Returns the number of remote items fetched.
    async fn fetch(
        &self,
        tracker: &Tracker,
        query: &TrackerQuery,
        access_token: Option<&str>,
    ) -> WitResult<usize>;
}

/// Logs every run without contacting the provider.
#[derive(Debug, Default, Clone)]
pub struct NoopFetcher;

#[async_trait]
impl RemoteFetcher for NoopFetcher {
    async fn fetch(
        &self,
        tracker: &Tracker,
        query: &TrackerQuery,
        access_token: Option<&str>,
    ) -> WitResult<usize> {
        debug!(
            tracker = %tracker.url,
            provider = %tracker.provider,
            query = %query.query,
            authenticated = access_token.is_some(),
            "remote fetch skipped"
        );
        Ok(0)
    }
}

pub struct Scheduler {
    queries: Arc<dyn TrackerQueryStore>,
    trackers: Arc<dyn TrackerStore>,
    fetcher: Arc<dyn RemoteFetcher>,
    jobs: Mutex<HashMap<TrackerQueryId, CancellationToken>>,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn new(
        queries: Arc<dyn TrackerQueryStore>,
        trackers: Arc<dyn TrackerStore>,
        fetcher: Arc<dyn RemoteFetcher>,
    ) -> Self {
        Self {
            queries,
            trackers,
            fetcher,
            jobs: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// IDs of the queries with a running job, sorted.
    pub fn jobs(&self) -> Vec<TrackerQueryId> {
        let mut ids: Vec<_> = self.jobs.lock().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Stops every job. Later re-plans still spawn new jobs.
    pub fn stop_all(&self) {
        for (_, job) in self.jobs.lock().drain() {
            job.cancel();
        }
    }

    /// Stops every job and refuses to plan new ones.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.stop_all();
    }

    async fn plan(
        &self,
        query: TrackerQuery,
        access_tokens: &AccessTokens,
    ) -> Option<CancellationToken> {
        let schedule = match query.schedule.parse::<Schedule>() {
            Ok(schedule) => schedule,
            Err(error) => {
                warn!(query_id = %query.id, %error, "skipping tracker query with invalid schedule");
                return None;
            }
        };
        let tracker = match self.trackers.load(query.tracker_id).await {
            Ok(tracker) => tracker,
            Err(error) => {
                warn!(query_id = %query.id, %error, "skipping tracker query without tracker");
                return None;
            }
        };
        let access_token = access_tokens
            .get(&tracker.provider)
            .filter(|token| !token.is_empty())
            .cloned();

        let cancel = self.shutdown.child_token();
        tokio::spawn(run_job(
            schedule,
            self.fetcher.clone(),
            tracker,
            query,
            access_token,
            cancel.clone(),
        ));
        Some(cancel)
    }
}

#[async_trait]
impl SchedulerPort for Scheduler {
    #[instrument(skip(self, access_tokens), fields(providers = access_tokens.len()))]
    async fn schedule_all_queries(&self, access_tokens: AccessTokens) {
        self.stop_all();
        if self.shutdown.is_cancelled() {
            debug!("scheduler shut down, not planning");
            return;
        }

        let queries = match self.queries.list().await {
            Ok(queries) => queries,
            Err(error) => {
                error!(%error, "failed to list tracker queries");
                return;
            }
        };

        let mut planned = HashMap::new();
        for query in queries {
            let query_id = query.id;
            if let Some(job) = self.plan(query, &access_tokens).await {
                planned.insert(query_id, job);
            }
        }

        let count = planned.len();
        let mut jobs = self.jobs.lock();
        for (_, stale) in jobs.drain() {
            stale.cancel();
        }
        *jobs = planned;
        info!(planned = count, "tracker queries scheduled");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run_job(
    schedule: Schedule,
    fetcher: Arc<dyn RemoteFetcher>,
    tracker: Tracker,
    query: TrackerQuery,
    access_token: Option<String>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(schedule.period());
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                match fetcher.fetch(&tracker, &query, access_token.as_deref()).await {
                    Ok(fetched) => debug!(query_id = %query.id, fetched, "tracker query run"),
                    Err(error) => warn!(query_id = %query.id, %error, "tracker query run failed"),
                }
            }
        }
    }
    debug!(query_id = %query.id, "tracker query job stopped");
}
