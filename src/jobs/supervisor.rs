//! Job supervisor
//!
//! Owns the registry of crawl jobs and at most one runner task per job. The
//! registry lock and the per-job locks are only held for synchronous work;
//! waiting on a runner always happens after both are released.

use crate::balance::{self, BalanceAtDate};
use crate::client::{ChainApi, EtherscanClient};
use crate::config::Config;
use crate::crawler::{CrawlRunner, RunnerSettings};
use crate::jobs::job::{Job, JobParams, JobResults, JobSnapshot};
use crate::state::JobStatus;
use crate::{FetchResult, JobError, JobResult};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

/// Creates one API client per runner so each job has its own backoff budget
pub type ApiFactory = Arc<dyn Fn() -> FetchResult<Arc<dyn ChainApi>> + Send + Sync>;

/// A spawned runner and the means to stop and await it
struct RunnerHandle {
    cancel: CancellationToken,
    finished: watch::Receiver<bool>,
    _task: JoinHandle<()>,
}

impl RunnerHandle {
    fn is_finished(&self) -> bool {
        *self.finished.borrow()
    }
}

struct JobEntry {
    job: Arc<RwLock<Job>>,
    runner: Option<RunnerHandle>,
}

impl JobEntry {
    fn read(&self) -> RwLockReadGuard<'_, Job> {
        self.job.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Job> {
        self.job.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_running(&self) -> bool {
        self.runner.as_ref().is_some_and(|r| !r.is_finished()) || self.read().status.is_active()
    }
}

#[derive(Default)]
struct Registry {
    jobs: HashMap<String, JobEntry>,
    /// Insertion order, oldest first
    order: VecDeque<String>,
}

impl Registry {
    fn entry(&self, id: &str) -> JobResult<&JobEntry> {
        self.jobs
            .get(id)
            .ok_or_else(|| JobError::NotFound(id.to_string()))
    }

    fn entry_mut(&mut self, id: &str) -> JobResult<&mut JobEntry> {
        self.jobs
            .get_mut(id)
            .ok_or_else(|| JobError::NotFound(id.to_string()))
    }

    fn remove(&mut self, id: &str) -> Option<JobEntry> {
        self.order.retain(|existing| existing != id);
        self.jobs.remove(id)
    }

    /// Drops the oldest jobs that are not running until there is room for one more
    fn evict_for_new(&mut self, max_retained: usize) {
        while self.jobs.len() >= max_retained {
            let victim = self
                .order
                .iter()
                .find(|id| self.jobs.get(*id).is_some_and(|entry| !entry.is_running()))
                .cloned();
            match victim {
                Some(id) => {
                    info!(job_id = %id, "Evicting job to respect retention limit");
                    self.remove(&id);
                }
                None => {
                    warn!(
                        retained = self.jobs.len(),
                        "Every retained job is running; exceeding retention limit"
                    );
                    break;
                }
            }
        }
    }
}

/// Manages crawl jobs and their runners
pub struct JobSupervisor {
    registry: Mutex<Registry>,
    api_factory: ApiFactory,
    runner_settings: RunnerSettings,
    default_page_size: u32,
    max_records: u32,
    segment_log_size: usize,
    max_retained: usize,
}

impl JobSupervisor {
    pub fn new(config: &Config, api_factory: ApiFactory) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            api_factory,
            runner_settings: RunnerSettings::from(&config.crawl),
            default_page_size: config.crawl.default_page_size,
            max_records: config.crawl.max_records_per_query,
            segment_log_size: config.crawl.segment_log_size,
            max_retained: config.jobs.max_retained.max(1),
        }
    }

    /// Supervisor whose runners talk to the configured Etherscan endpoint
    pub fn with_etherscan(config: &Config) -> Self {
        let client_config = config.clone();
        let factory: ApiFactory = Arc::new(move || -> FetchResult<Arc<dyn ChainApi>> {
            let client = EtherscanClient::from_config(&client_config)?;
            Ok(Arc::new(client) as Arc<dyn ChainApi>)
        });
        Self::new(config, factory)
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn job(&self, id: &str) -> JobResult<Arc<RwLock<Job>>> {
        Ok(self.registry().entry(id)?.job.clone())
    }

    /// Creates a job and starts its runner; returns the job id
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, params: JobParams) -> JobResult<String> {
        let spec = params.resolve(self.default_page_size, self.max_records)?;
        let id = spec.id.clone();

        let mut registry = self.registry();
        if registry.jobs.contains_key(&id) {
            return Err(JobError::DuplicateId(id));
        }
        let api = (self.api_factory)()?;
        registry.evict_for_new(self.max_retained);

        let mut job = Job::new(spec, self.segment_log_size);
        job.transition(JobStatus::Running)?;
        info!(
            job_id = %id,
            address = %job.spec.address,
            start_block = job.spec.start_block,
            include_tokens = job.spec.include_tokens,
            "Job started"
        );

        let job = Arc::new(RwLock::new(job));
        let runner = self.spawn_runner(&id, job.clone(), api);
        registry.jobs.insert(
            id.clone(),
            JobEntry {
                job,
                runner: Some(runner),
            },
        );
        registry.order.push_back(id.clone());

        Ok(id)
    }

    fn spawn_runner(&self, id: &str, job: Arc<RwLock<Job>>, api: Arc<dyn ChainApi>) -> RunnerHandle {
        let cancel = CancellationToken::new();
        let (done_tx, finished) = watch::channel(false);
        let runner = CrawlRunner::new(api, job, self.runner_settings.clone(), cancel.clone());

        let task = tokio::spawn(
            async move {
                let outcome = runner.run().await;
                debug!(?outcome, "Runner finished");
                let _ = done_tx.send(true);
            }
            .instrument(info_span!("job", job_id = %id)),
        );

        RunnerHandle {
            cancel,
            finished,
            _task: task,
        }
    }

    pub fn status(&self, id: &str) -> JobResult<JobSnapshot> {
        let job = self.job(id)?;
        let snapshot = job.read().unwrap_or_else(PoisonError::into_inner).snapshot();
        Ok(snapshot)
    }

    /// Requests a cooperative stop
    ///
    /// The runner finishes its in-flight page and then moves the job to
    /// `Paused`. Pausing a paused job is a no-op.
    pub fn pause(&self, id: &str) -> JobResult<()> {
        let registry = self.registry();
        let entry = registry.entry(id)?;
        let mut job = entry.write();

        match job.status {
            JobStatus::Paused => Ok(()),
            JobStatus::Idle | JobStatus::Running => {
                if !job.stop_requested {
                    job.stop_requested = true;
                    job.touch();
                    if let Some(runner) = &entry.runner {
                        runner.cancel.cancel();
                    }
                    info!(job_id = %id, "Pause requested");
                }
                Ok(())
            }
            from => Err(JobError::InvalidTransition {
                from,
                to: JobStatus::Paused,
            }),
        }
    }

    /// Starts a new runner continuing from the last covered block
    ///
    /// Resuming a running job is a no-op; if a pause is still pending the
    /// call waits for it to land first.
    pub async fn resume(&self, id: &str) -> JobResult<()> {
        loop {
            let pending = {
                let mut registry = self.registry();
                let entry = registry.entry_mut(id)?;
                let status = entry.read().status;
                let stop_requested = entry.read().stop_requested;

                match status {
                    JobStatus::Running if stop_requested => entry
                        .runner
                        .as_ref()
                        .map(|runner| runner.finished.clone()),
                    JobStatus::Running => return Ok(()),
                    JobStatus::Paused => {
                        let api = (self.api_factory)()?;
                        {
                            let mut job = entry.write();
                            job.transition(JobStatus::Running)?;
                            job.stop_requested = false;
                            job.limit_reached = false;
                        }
                        let runner = self.spawn_runner(id, entry.job.clone(), api);
                        entry.runner = Some(runner);
                        info!(job_id = %id, "Job resumed");
                        return Ok(());
                    }
                    from => {
                        return Err(JobError::InvalidTransition {
                            from,
                            to: JobStatus::Running,
                        })
                    }
                }
            };

            match pending {
                Some(finished) => wait_finished(finished).await,
                // A pending stop with no runner cannot land; treat as running
                None => return Ok(()),
            }
        }
    }

    /// Discards a paused job: `Paused -> Stopped`
    pub fn stop(&self, id: &str) -> JobResult<()> {
        let registry = self.registry();
        let entry = registry.entry(id)?;
        let mut job = entry.write();

        match job.status {
            JobStatus::Stopped => Ok(()),
            JobStatus::Running | JobStatus::Idle => Err(JobError::StillRunning(id.to_string())),
            _ => job.transition(JobStatus::Stopped),
        }
    }

    /// Waits for the job's current runner to exit and returns the final snapshot
    pub async fn wait(&self, id: &str) -> JobResult<JobSnapshot> {
        let finished = {
            let registry = self.registry();
            let entry = registry.entry(id)?;
            entry.runner.as_ref().map(|runner| runner.finished.clone())
        };
        if let Some(finished) = finished {
            wait_finished(finished).await;
        }
        self.status(id)
    }

    /// Sorted copies of everything fetched so far, in any job state
    pub fn results(&self, id: &str) -> JobResult<JobResults> {
        let job = self.job(id)?;
        let results = job.read().unwrap_or_else(PoisonError::into_inner).results();
        Ok(results)
    }

    /// Removes a job that is not running and returns its last snapshot
    pub fn remove(&self, id: &str) -> JobResult<JobSnapshot> {
        let mut registry = self.registry();
        let entry = registry.entry(id)?;
        if entry.is_running() {
            return Err(JobError::StillRunning(id.to_string()));
        }
        let snapshot = entry.read().snapshot();
        registry.remove(id);
        info!(job_id = %id, "Job removed");
        Ok(snapshot)
    }

    /// Snapshots of every retained job, oldest first
    pub fn list(&self) -> Vec<JobSnapshot> {
        let registry = self.registry();
        registry
            .order
            .iter()
            .filter_map(|id| registry.jobs.get(id))
            .map(|entry| entry.read().snapshot())
            .collect()
    }

    /// Native balance of `address` at 00:00 UTC on `date` (`YYYY-MM-DD`)
    pub async fn balance_at_date(&self, address: &str, date: &str) -> crate::Result<BalanceAtDate> {
        let api = (self.api_factory)()?;
        balance::balance_at_date(api.as_ref(), address, date).await
    }
}

async fn wait_finished(mut finished: watch::Receiver<bool>) {
    while !*finished.borrow_and_update() {
        if finished.changed().await.is_err() {
            break;
        }
    }
}
