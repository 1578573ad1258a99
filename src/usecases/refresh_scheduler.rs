//! Refresh Scheduler - Recurring Job Execution and Health Tracking
//!
//! A single dispatcher task sleeps until the earliest due job, then
//! spawns each due job into its own task. Every run is wrapped so that:
//! - start, end, duration and outcome are always recorded
//! - errors and panics stay inside the run and never stop other jobs
//! - a job still in flight when it comes due again is skipped
//! - shutdown cancels in-flight runs and records them as errors
//!
//! Job state: registered → scheduled → running → scheduled, until the
//! job is removed or the scheduler stops.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex, Notify, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::metrics::MetricsRegistry;
use crate::domain::schedule::Schedule;
use crate::error::SchedulerError;

/// Default number of execution records kept per job.
pub const DEFAULT_HISTORY_SIZE: usize = 100;

/// Error message recorded for a run cut short by shutdown.
pub const CANCELLED_MESSAGE: &str = "cancelled by scheduler shutdown";

/// Dispatcher sleep when no job is due at all.
const IDLE_WAIT: Duration = Duration::from_secs(3600);

/// A named, schedule-bound unit of recurring work.
#[async_trait]
pub trait Job: Send + Sync + 'static {
  /// Unique job id.
  fn id(&self) -> &str;

  /// Human-readable name.
  fn name(&self) -> &str;

  /// Schedule expression (see [`Schedule::parse`]).
  fn schedule(&self) -> &str;

  /// Run once. Long-running work should watch `ctx` for cancellation.
  async fn execute(&self, ctx: &JobContext) -> anyhow::Result<()>;

  /// Called after a successful run.
  fn on_success(&self) {}

  /// Called after a failed, panicked or cancelled run.
  fn on_error(&self, error: &str) {
    let _ = error;
  }
}

/// Cancellation context shared by every run of one scheduler.
#[derive(Debug, Clone)]
pub struct JobContext {
  cancel_rx: watch::Receiver<bool>,
}

impl JobContext {
  fn new(cancel_rx: watch::Receiver<bool>) -> Self {
    Self { cancel_rx }
  }

  /// Whether the scheduler is shutting down.
  pub fn is_cancelled(&self) -> bool {
    *self.cancel_rx.borrow()
  }

  /// Resolve once the scheduler starts shutting down.
  pub async fn cancelled(&self) {
    let mut rx = self.cancel_rx.clone();
    // A dropped sender means the scheduler is gone.
    let _ = rx.wait_for(|cancelled| *cancelled).await;
  }

  /// Run `fut` unless cancellation comes first.
  pub async fn run_until_cancelled<F: Future>(&self, fut: F) -> Option<F::Output> {
    tokio::select! {
      biased;
      () = self.cancelled() => None,
      out = fut => Some(out),
    }
  }
}

/// Lifecycle state of a registered job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
  /// Known to the scheduler, which is not running.
  Registered,
  /// Waiting for its next fire.
  Scheduled,
  /// A run is in flight.
  Running,
}

/// Outcome of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
  Running,
  Success,
  Error,
}

/// One run of a job.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
  pub run_id: Uuid,
  pub started_at: DateTime<Utc>,
  pub finished_at: Option<DateTime<Utc>>,
  pub duration: Option<Duration>,
  pub status: ExecutionStatus,
  pub error_message: Option<String>,
}

/// Aggregate statistics of one job plus its recent history.
#[derive(Debug, Clone, Serialize)]
pub struct JobStats {
  pub job_id: String,
  pub job_name: String,
  pub schedule: String,
  pub state: JobState,
  pub last_execution: Option<DateTime<Utc>>,
  pub last_success: Option<DateTime<Utc>>,
  pub last_error_at: Option<DateTime<Utc>>,
  pub last_error_message: Option<String>,
  pub total_runs: u64,
  pub success_count: u64,
  pub failure_count: u64,
  /// Fires dropped because the previous run was still in flight.
  pub skipped_count: u64,
  /// Running average over finished runs.
  pub average_duration: Duration,
  pub next_scheduled: Option<DateTime<Utc>>,
  /// Oldest → newest, bounded by the scheduler's history size.
  pub history: Vec<ExecutionRecord>,
}

struct JobEntry {
  job: Arc<dyn Job>,
  schedule: Schedule,
  state: JobState,
  in_flight: bool,
  last_execution: Option<DateTime<Utc>>,
  last_success: Option<DateTime<Utc>>,
  last_error_at: Option<DateTime<Utc>>,
  last_error_message: Option<String>,
  total_runs: u64,
  success_count: u64,
  failure_count: u64,
  skipped_count: u64,
  average_duration: Duration,
  next_scheduled: Option<DateTime<Utc>>,
  history: VecDeque<ExecutionRecord>,
}

impl JobEntry {
  fn new(job: Arc<dyn Job>, schedule: Schedule) -> Self {
    Self {
      job,
      schedule,
      state: JobState::Registered,
      in_flight: false,
      last_execution: None,
      last_success: None,
      last_error_at: None,
      last_error_message: None,
      total_runs: 0,
      success_count: 0,
      failure_count: 0,
      skipped_count: 0,
      average_duration: Duration::ZERO,
      next_scheduled: None,
      history: VecDeque::new(),
    }
  }

  fn stats(&self) -> JobStats {
    JobStats {
      job_id: self.job.id().to_string(),
      job_name: self.job.name().to_string(),
      schedule: self.job.schedule().to_string(),
      state: self.state,
      last_execution: self.last_execution,
      last_success: self.last_success,
      last_error_at: self.last_error_at,
      last_error_message: self.last_error_message.clone(),
      total_runs: self.total_runs,
      success_count: self.success_count,
      failure_count: self.failure_count,
      skipped_count: self.skipped_count,
      average_duration: self.average_duration,
      next_scheduled: self.next_scheduled,
      history: self.history.iter().cloned().collect(),
    }
  }

  fn record_duration(&mut self, duration: Duration) {
    let n = self.total_runs.max(1) as f64;
    let previous = self.average_duration.as_secs_f64();
    let average = previous + (duration.as_secs_f64() - previous) / n;
    self.average_duration = Duration::from_secs_f64(average.max(0.0));
  }
}

/// State shared between the scheduler handle, the dispatcher and runs.
struct Shared {
  jobs: RwLock<HashMap<String, JobEntry>>,
  history_size: usize,
  wake: Notify,
  cancel_tx: watch::Sender<bool>,
  running: AtomicBool,
  metrics: Option<Arc<MetricsRegistry>>,
}

/// Periodic job runner.
pub struct RefreshScheduler {
  shared: Arc<Shared>,
  dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshScheduler {
  /// Create a stopped scheduler keeping `history_size` records per job.
  pub fn new(history_size: usize) -> Self {
    Self::build(history_size, None)
  }

  /// Create a scheduler that reports run counts and durations.
  pub fn with_metrics(history_size: usize, metrics: Arc<MetricsRegistry>) -> Self {
    Self::build(history_size, Some(metrics))
  }

  fn build(history_size: usize, metrics: Option<Arc<MetricsRegistry>>) -> Self {
    let (cancel_tx, _) = watch::channel(false);
    Self {
      shared: Arc::new(Shared {
        jobs: RwLock::new(HashMap::new()),
        history_size: history_size.max(1),
        wake: Notify::new(),
        cancel_tx,
        running: AtomicBool::new(false),
        metrics,
      }),
      dispatcher: Mutex::new(None),
    }
  }

  /// Whether the dispatcher is running.
  pub fn is_running(&self) -> bool {
    self.shared.running.load(Ordering::Relaxed)
  }

  /// Register a job.
  ///
  /// # Errors
  /// [`SchedulerError::InvalidSchedule`] for a malformed schedule,
  /// [`SchedulerError::DuplicateJob`] if the id is taken.
  pub async fn add_job(&self, job: Arc<dyn Job>) -> Result<(), SchedulerError> {
    let schedule = Schedule::parse(job.schedule())?;
    let id = job.id().to_string();

    let mut jobs = self.shared.jobs.write().await;
    if jobs.contains_key(&id) {
      return Err(SchedulerError::DuplicateJob(id));
    }

    let mut entry = JobEntry::new(job, schedule);
    if self.is_running() {
      entry.state = JobState::Scheduled;
      entry.next_scheduled = entry.schedule.next_after(Utc::now());
    }
    info!(job_id = %id, job_name = %entry.job.name(), schedule = %entry.job.schedule(), "Job registered");
    jobs.insert(id, entry);
    drop(jobs);

    self.shared.wake.notify_one();
    Ok(())
  }

  /// Unregister a job. A run already in flight finishes unrecorded.
  ///
  /// # Errors
  /// [`SchedulerError::JobNotFound`] for an unknown id.
  pub async fn remove_job(&self, id: &str) -> Result<(), SchedulerError> {
    let removed = self.shared.jobs.write().await.remove(id);
    match removed {
      Some(_) => {
        info!(job_id = %id, "Job removed");
        self.shared.wake.notify_one();
        Ok(())
      }
      None => Err(SchedulerError::JobNotFound(id.to_string())),
    }
  }

  /// Statistics of one job.
  pub async fn get_job_stats(&self, id: &str) -> Option<JobStats> {
    self.shared.jobs.read().await.get(id).map(JobEntry::stats)
  }

  /// Statistics of every job, sorted by id.
  pub async fn list_jobs(&self) -> Vec<JobStats> {
    let mut stats: Vec<JobStats> = self.shared.jobs.read().await.values().map(JobEntry::stats).collect();
    stats.sort_by(|a, b| a.job_id.cmp(&b.job_id));
    stats
  }

  /// Start the dispatcher.
  ///
  /// # Errors
  /// [`SchedulerError::AlreadyRunning`] if already started.
  #[instrument(skip(self))]
  pub async fn start(&self) -> Result<(), SchedulerError> {
    let mut dispatcher = self.dispatcher.lock().await;
    if dispatcher.is_some() {
      return Err(SchedulerError::AlreadyRunning);
    }

    self.shared.cancel_tx.send_replace(false);
    let now = Utc::now();
    let job_count = {
      let mut jobs = self.shared.jobs.write().await;
      for entry in jobs.values_mut() {
        entry.state = JobState::Scheduled;
        entry.next_scheduled = entry.schedule.next_after(now);
      }
      jobs.len()
    };

    self.shared.running.store(true, Ordering::Relaxed);
    *dispatcher = Some(tokio::spawn(dispatch(Arc::clone(&self.shared))));

    info!(jobs = job_count, "Refresh scheduler started");
    Ok(())
  }

  /// Cancel in-flight runs and wait until none is left. Idempotent.
  #[instrument(skip(self))]
  pub async fn stop(&self) {
    let Some(handle) = self.dispatcher.lock().await.take() else {
      return;
    };

    self.shared.running.store(false, Ordering::Relaxed);
    self.shared.cancel_tx.send_replace(true);

    if let Err(e) = handle.await {
      error!(error = %e, "Scheduler dispatcher ended abnormally");
    }

    let mut jobs = self.shared.jobs.write().await;
    for entry in jobs.values_mut() {
      entry.state = JobState::Registered;
      entry.next_scheduled = None;
    }
    info!("Refresh scheduler stopped");
  }
}

/// Dispatcher loop: fire due jobs, then sleep until the next one.
async fn dispatch(shared: Arc<Shared>) {
  let mut cancel_rx = shared.cancel_tx.subscribe();
  let mut runs: JoinSet<()> = JoinSet::new();

  loop {
    if *cancel_rx.borrow_and_update() {
      break;
    }

    for job in shared.take_due(Utc::now()).await {
      runs.spawn(run_job(Arc::clone(&shared), job));
    }

    let wait = shared.time_until_next(Utc::now()).await;

    tokio::select! {
      _ = cancel_rx.changed() => {}
      () = shared.wake.notified() => {}
      Some(joined) = runs.join_next(), if !runs.is_empty() => {
        if let Err(e) = joined {
          error!(error = %e, "Job wrapper task failed");
        }
      }
      () = tokio::time::sleep(wait) => {}
    }
  }

  // Runs observe the cancellation themselves; wait for all of them.
  while let Some(joined) = runs.join_next().await {
    if let Err(e) = joined {
      error!(error = %e, "Job wrapper task failed during shutdown");
    }
  }
}

impl Shared {
  /// Claim every due job. In-flight jobs are skipped for this fire.
  async fn take_due(&self, now: DateTime<Utc>) -> Vec<(Arc<dyn Job>, Uuid, DateTime<Utc>)> {
    let mut jobs = self.jobs.write().await;
    let mut due = Vec::new();

    for entry in jobs.values_mut() {
      let Some(next) = entry.next_scheduled else {
        continue;
      };
      if next > now {
        continue;
      }
      entry.next_scheduled = entry.schedule.next_after(now);

      if entry.in_flight {
        entry.skipped_count += 1;
        debug!(job_id = %entry.job.id(), "Previous run still in flight, skipping fire");
        if let Some(metrics) = &self.metrics {
          metrics.job_runs.with_label_values(&[entry.job.id(), "skipped"]).inc();
        }
        continue;
      }

      let run_id = Uuid::new_v4();
      entry.in_flight = true;
      entry.state = JobState::Running;
      entry.last_execution = Some(now);
      entry.history.push_back(ExecutionRecord {
        run_id,
        started_at: now,
        finished_at: None,
        duration: None,
        status: ExecutionStatus::Running,
        error_message: None,
      });
      while entry.history.len() > self.history_size {
        entry.history.pop_front();
      }
      due.push((Arc::clone(&entry.job), run_id, now));
    }

    due
  }

  async fn time_until_next(&self, now: DateTime<Utc>) -> Duration {
    self
      .jobs
      .read()
      .await
      .values()
      .filter_map(|entry| entry.next_scheduled)
      .min()
      .map_or(IDLE_WAIT, |next| (next - now).to_std().unwrap_or(Duration::ZERO))
  }

  /// Record the outcome of a run claimed by [`Self::take_due`].
  async fn finish_run(&self, job_id: &str, run_id: Uuid, outcome: &Result<(), String>, duration: Duration) {
    let finished_at = Utc::now();
    let mut jobs = self.jobs.write().await;
    let Some(entry) = jobs.get_mut(job_id) else {
      return;
    };
    let Some(record) = entry.history.iter_mut().rev().find(|r| r.run_id == run_id) else {
      return;
    };

    record.finished_at = Some(finished_at);
    record.duration = Some(duration);
    match outcome {
      Ok(()) => record.status = ExecutionStatus::Success,
      Err(message) => {
        record.status = ExecutionStatus::Error;
        record.error_message = Some(message.clone());
      }
    }

    entry.in_flight = false;
    entry.state = if self.running.load(Ordering::Relaxed) {
      JobState::Scheduled
    } else {
      JobState::Registered
    };
    entry.total_runs += 1;
    entry.record_duration(duration);
    match outcome {
      Ok(()) => {
        entry.success_count += 1;
        entry.last_success = Some(finished_at);
      }
      Err(message) => {
        entry.failure_count += 1;
        entry.last_error_at = Some(finished_at);
        entry.last_error_message = Some(message.clone());
      }
    }

    if let Some(metrics) = &self.metrics {
      let status = if outcome.is_ok() { "success" } else { "error" };
      metrics.job_runs.with_label_values(&[job_id, status]).inc();
      metrics
        .job_duration_seconds
        .with_label_values(&[job_id])
        .observe(duration.as_secs_f64());
    }
  }
}

/// Execution wrapper: run, catch, record, notify hooks.
async fn run_job(shared: Arc<Shared>, (job, run_id, _fired_at): (Arc<dyn Job>, Uuid, DateTime<Utc>)) {
  let job_id = job.id().to_string();
  let ctx = JobContext::new(shared.cancel_tx.subscribe());
  let started = Instant::now();
  debug!(job_id = %job_id, run_id = %run_id, "Job run started");

  let task_job = Arc::clone(&job);
  let task_ctx = ctx.clone();
  let mut handle = tokio::spawn(async move { task_job.execute(&task_ctx).await });

  let outcome: Result<(), String> = tokio::select! {
    biased;
    joined = &mut handle => match joined {
      Ok(Ok(())) => Ok(()),
      Ok(Err(e)) => Err(format!("{e:#}")),
      Err(e) if e.is_panic() => Err("job panicked".to_string()),
      Err(e) => Err(format!("job task failed: {e}")),
    },
    () = ctx.cancelled() => {
      handle.abort();
      let _ = handle.await;
      Err(CANCELLED_MESSAGE.to_string())
    }
  };

  let duration = started.elapsed();
  match &outcome {
    Ok(()) => {
      info!(job_id = %job_id, run_id = %run_id, duration_ms = duration.as_millis(), "Job run succeeded");
      job.on_success();
    }
    Err(message) => {
      warn!(job_id = %job_id, run_id = %run_id, duration_ms = duration.as_millis(), error = %message, "Job run failed");
      job.on_error(message);
    }
  }

  shared.finish_run(&job_id, run_id, &outcome, duration).await;
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::AtomicUsize;

  struct TestJob {
    id: &'static str,
    schedule: &'static str,
    behavior: Behavior,
    runs: AtomicUsize,
    errors_seen: AtomicUsize,
  }

  #[derive(Clone, Copy)]
  enum Behavior {
    Succeed,
    Fail,
    Panic,
    Hang,
  }

  impl TestJob {
    fn new(id: &'static str, schedule: &'static str, behavior: Behavior) -> Arc<Self> {
      Arc::new(Self {
        id,
        schedule,
        behavior,
        runs: AtomicUsize::new(0),
        errors_seen: AtomicUsize::new(0),
      })
    }
  }

  #[async_trait]
  impl Job for TestJob {
    fn id(&self) -> &str {
      self.id
    }

    fn name(&self) -> &str {
      self.id
    }

    fn schedule(&self) -> &str {
      self.schedule
    }

    async fn execute(&self, _ctx: &JobContext) -> anyhow::Result<()> {
      self.runs.fetch_add(1, Ordering::SeqCst);
      match self.behavior {
        Behavior::Succeed => Ok(()),
        Behavior::Fail => anyhow::bail!("upstream unavailable"),
        Behavior::Panic => panic!("job blew up"),
        Behavior::Hang => {
          tokio::time::sleep(Duration::from_secs(30)).await;
          Ok(())
        }
      }
    }

    fn on_error(&self, _error: &str) {
      self.errors_seen.fetch_add(1, Ordering::SeqCst);
    }
  }

  #[tokio::test]
  async fn test_duplicate_and_invalid_jobs_rejected() {
    let scheduler = RefreshScheduler::new(DEFAULT_HISTORY_SIZE);
    scheduler
      .add_job(TestJob::new("a", "@every 1s", Behavior::Succeed))
      .await
      .unwrap();

    let dup = scheduler
      .add_job(TestJob::new("a", "@every 2s", Behavior::Succeed))
      .await;
    assert_eq!(dup, Err(SchedulerError::DuplicateJob("a".to_string())));

    let bad = scheduler
      .add_job(TestJob::new("b", "every so often", Behavior::Succeed))
      .await;
    assert!(matches!(bad, Err(SchedulerError::InvalidSchedule { .. })));

    assert_eq!(
      scheduler.remove_job("missing").await,
      Err(SchedulerError::JobNotFound("missing".to_string()))
    );
    let stats = scheduler.get_job_stats("a").await.unwrap();
    assert_eq!(stats.state, JobState::Registered);
  }

  #[tokio::test]
  async fn test_oversized_interval_rejected_at_registration() {
    let scheduler = RefreshScheduler::new(DEFAULT_HISTORY_SIZE);
    for schedule in ["@every 1000000000000h", "@every 18446744073709551615m"] {
      let result = scheduler
        .add_job(TestJob::new("huge", schedule, Behavior::Succeed))
        .await;
      assert!(matches!(result, Err(SchedulerError::InvalidSchedule { .. })));
    }
    assert!(scheduler.list_jobs().await.is_empty());
  }

  #[tokio::test]
  async fn test_failing_job_does_not_stop_healthy_job() {
    let scheduler = RefreshScheduler::new(DEFAULT_HISTORY_SIZE);
    let healthy = TestJob::new("healthy", "@every 100ms", Behavior::Succeed);
    let failing = TestJob::new("failing", "@every 100ms", Behavior::Fail);
    scheduler.add_job(healthy.clone()).await.unwrap();
    scheduler.add_job(failing.clone()).await.unwrap();

    scheduler.start().await.unwrap();
    assert_eq!(scheduler.start().await, Err(SchedulerError::AlreadyRunning));
    tokio::time::sleep(Duration::from_millis(550)).await;
    scheduler.stop().await;

    let healthy_stats = scheduler.get_job_stats("healthy").await.unwrap();
    let failing_stats = scheduler.get_job_stats("failing").await.unwrap();

    assert!(healthy_stats.success_count >= 3, "{healthy_stats:?}");
    assert_eq!(healthy_stats.failure_count, 0);
    assert!(failing_stats.failure_count >= 3, "{failing_stats:?}");
    assert_eq!(failing_stats.success_count, 0);
    assert_eq!(failing_stats.last_error_message.as_deref(), Some("upstream unavailable"));
    assert_eq!(failing.errors_seen.load(Ordering::SeqCst) as u64, failing_stats.failure_count);
    assert!(healthy_stats.last_success.is_some());
  }

  #[tokio::test]
  async fn test_panicking_job_is_recorded_as_error() {
    let scheduler = RefreshScheduler::new(DEFAULT_HISTORY_SIZE);
    scheduler
      .add_job(TestJob::new("panicky", "@every 100ms", Behavior::Panic))
      .await
      .unwrap();

    scheduler.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(350)).await;
    scheduler.stop().await;

    let stats = scheduler.get_job_stats("panicky").await.unwrap();
    assert!(stats.failure_count >= 2);
    assert_eq!(stats.last_error_message.as_deref(), Some("job panicked"));
  }

  #[tokio::test]
  async fn test_stop_cancels_in_flight_and_skips_overlap() {
    let scheduler = RefreshScheduler::new(DEFAULT_HISTORY_SIZE);
    let hanging = TestJob::new("hanging", "@every 50ms", Behavior::Hang);
    scheduler.add_job(hanging.clone()).await.unwrap();

    scheduler.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let begun = Instant::now();
    scheduler.stop().await;
    assert!(begun.elapsed() < Duration::from_secs(5));

    let stats = scheduler.get_job_stats("hanging").await.unwrap();
    assert_eq!(hanging.runs.load(Ordering::SeqCst), 1);
    assert_eq!(stats.total_runs, 1);
    assert_eq!(stats.failure_count, 1);
    assert!(stats.skipped_count >= 2);
    assert_eq!(stats.last_error_message.as_deref(), Some(CANCELLED_MESSAGE));
    assert_eq!(stats.history.len(), 1);
    assert_eq!(stats.history[0].status, ExecutionStatus::Error);
    assert_eq!(stats.state, JobState::Registered);
  }

  #[tokio::test]
  async fn test_history_is_bounded() {
    let scheduler = RefreshScheduler::new(3);
    scheduler
      .add_job(TestJob::new("fast", "@every 40ms", Behavior::Succeed))
      .await
      .unwrap();

    scheduler.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;
    scheduler.stop().await;

    let stats = scheduler.get_job_stats("fast").await.unwrap();
    assert!(stats.total_runs > 3);
    assert_eq!(stats.history.len(), 3);
    assert!(stats.history.windows(2).all(|w| w[0].started_at <= w[1].started_at));
  }

  #[tokio::test]
  async fn test_job_added_while_running_is_scheduled() {
    let scheduler = RefreshScheduler::new(DEFAULT_HISTORY_SIZE);
    scheduler.start().await.unwrap();

    let late = TestJob::new("late", "@every 100ms", Behavior::Succeed);
    scheduler.add_job(late.clone()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(350)).await;

    let listed = scheduler.list_jobs().await;
    assert_eq!(listed.len(), 1);
    assert!(listed[0].next_scheduled.is_some());
    scheduler.stop().await;

    assert!(late.runs.load(Ordering::SeqCst) >= 2);
    scheduler.remove_job("late").await.unwrap();
    assert!(scheduler.list_jobs().await.is_empty());
  }
}
