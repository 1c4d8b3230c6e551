use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{error, info, instrument};

use crate::state::AppState;

mod clean_tag_values;
mod delete_orphaned_tags;
mod fix_image_sizes;

pub use clean_tag_values::CleanTagValues;
pub use delete_orphaned_tags::DeleteOrphanedTags;
pub use fix_image_sizes::FixImageSizes;

/// A periodic maintenance task.
#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &'static str;
    fn every(&self) -> Duration;
    async fn execute(&self, state: &AppState) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub name: &'static str,
    pub interval_seconds: u64,
    pub is_running: bool,
    pub run_count: u64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_run_utc: Option<OffsetDateTime>,
    pub last_elapsed_ms: Option<u64>,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct History {
    run_count: u64,
    last_run_utc: Option<OffsetDateTime>,
    last_elapsed_ms: Option<u64>,
    last_error: Option<String>,
}

struct Entry {
    job: Arc<dyn Job>,
    running: AtomicBool,
    history: Mutex<History>,
}

impl Entry {
    async fn status(&self) -> JobStatus {
        let history = self.history.lock().await;
        JobStatus {
            name: self.job.name(),
            interval_seconds: self.job.every().as_secs(),
            is_running: self.running.load(Ordering::SeqCst),
            run_count: history.run_count,
            last_run_utc: history.last_run_utc,
            last_elapsed_ms: history.last_elapsed_ms,
            last_error: history.last_error.clone(),
        }
    }

    /// Runs the job unless a run is already in flight. Failures land in the history.
    async fn run(&self, state: &AppState) -> bool {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        let name = self.job.name();
        let started_utc = OffsetDateTime::now_utc();
        let started = Instant::now();
        let result = self.job.execute(state).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        {
            let mut history = self.history.lock().await;
            history.run_count += 1;
            history.last_run_utc = Some(started_utc);
            history.last_elapsed_ms = Some(elapsed_ms);
            history.last_error = match &result {
                Ok(()) => None,
                Err(e) => Some(format!("{:#}", e)),
            };
        }
        match result {
            Ok(()) => info!(job = name, elapsed_ms, "job complete"),
            Err(e) => error!(job = name, error = %e, "job failed"),
        }

        self.running.store(false, Ordering::SeqCst);
        true
    }
}

/// Owns the registered jobs, their running flags and their last results.
pub struct JobManager {
    entries: Vec<Arc<Entry>>,
}

impl JobManager {
    pub fn new(jobs: Vec<Arc<dyn Job>>) -> Self {
        let entries = jobs
            .into_iter()
            .map(|job| {
                Arc::new(Entry {
                    job,
                    running: AtomicBool::new(false),
                    history: Mutex::new(History::default()),
                })
            })
            .collect();
        Self { entries }
    }

    pub fn with_default_jobs() -> Self {
        Self::new(vec![
            Arc::new(CleanTagValues),
            Arc::new(DeleteOrphanedTags),
            Arc::new(FixImageSizes),
        ])
    }

    fn entry(&self, name: &str) -> Option<&Arc<Entry>> {
        self.entries.iter().find(|e| e.job.name() == name)
    }

    pub async fn statuses(&self) -> Vec<JobStatus> {
        let mut statuses = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            statuses.push(entry.status().await);
        }
        statuses
    }

    /// Runs one job now. `None` when no job has that name.
    #[instrument(skip(self, state))]
    pub async fn run(&self, state: &AppState, name: &str) -> Option<JobStatus> {
        let entry = self.entry(name)?;
        if !entry.run(state).await {
            info!(job = name, "job already running; skipped");
        }
        Some(entry.status().await)
    }

    /// Spawns one interval task per job. The first run happens one interval after start.
    pub fn start(&self, state: AppState) {
        for entry in &self.entries {
            let name = entry.job.name();
            let entry = Arc::clone(entry);
            let state = state.clone();
            tokio::spawn(async move {
                let every = entry.job.every();
                let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    entry.run(&state).await;
                }
            });
            info!(job = name, "job scheduled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Counting {
        calls: Arc<AtomicUsize>,
        fail: bool,
        pause: Duration,
        every: Duration,
    }

    #[async_trait]
    impl Job for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn every(&self) -> Duration {
            self.every
        }

        async fn execute(&self, _state: &AppState) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.pause).await;
            if self.fail {
                anyhow::bail!("nope");
            }
            Ok(())
        }
    }

    fn manager(fail: bool, pause: Duration) -> (JobManager, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let job = Counting {
            calls: Arc::clone(&calls),
            fail,
            pause,
            every: Duration::from_secs(60),
        };
        (JobManager::new(vec![Arc::new(job)]), calls)
    }

    #[tokio::test]
    async fn default_jobs_are_registered() {
        let names: Vec<_> = JobManager::with_default_jobs()
            .statuses()
            .await
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(
            names,
            vec!["clean_tag_values", "delete_orphaned_tags", "fix_image_sizes"]
        );
    }

    #[tokio::test]
    async fn unknown_job_is_none() {
        let state = AppState::fake();
        let (jobs, _) = manager(false, Duration::ZERO);
        assert!(jobs.run(&state, "missing").await.is_none());
    }

    #[tokio::test]
    async fn failures_are_recorded_not_raised() {
        let state = AppState::fake();
        let (jobs, calls) = manager(true, Duration::ZERO);
        let status = jobs.run(&state, "counting").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(status.run_count, 1);
        assert!(!status.is_running);
        assert_eq!(status.last_error.as_deref(), Some("nope"));
    }

    #[tokio::test]
    async fn overlapping_runs_are_skipped() {
        let state = AppState::fake();
        let (jobs, calls) = manager(false, Duration::from_millis(100));
        let (a, b) = tokio::join!(jobs.run(&state, "counting"), jobs.run(&state, "counting"));
        assert!(a.is_some() && b.is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn started_jobs_run_on_their_interval() {
        let state = AppState::fake();
        let calls = Arc::new(AtomicUsize::new(0));
        let job = Counting {
            calls: Arc::clone(&calls),
            fail: false,
            pause: Duration::ZERO,
            every: Duration::from_millis(20),
        };
        let jobs = JobManager::new(vec![Arc::new(job)]);
        jobs.start(state);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(calls.load(Ordering::SeqCst) >= 2);
        let status = &jobs.statuses().await[0];
        assert!(status.run_count >= 2);
        assert!(status.last_run_utc.is_some());
    }
}
