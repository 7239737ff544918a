//! Repricing scheduler.
//!
//! A single control task owns the lane of every marketplace and is driven by
//! [`SchedulerHandle`] commands, the fallback timer and cycle completions.
//! A lane is `Idle` until work is queued; it then runs one cycle at a time:
//! open a [`Run`] against the profile snapshot active at that moment, hand SKUs
//! to at most `max_concurrency` workers, close the Run once the queue is empty
//! and nothing is in flight.

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, Notify};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::application::alerts::AlertDispatcher;
use crate::application::evaluate::{cycle_aborted, EvaluationPolicy, Evaluator};
use crate::application::pricing::{PricingEngine, DEFAULT_SNAPSHOT_MAX_AGE_MINUTES};
use crate::application::profiles::ProfileRegistry;
use crate::application::retry::RetryPolicy;
use crate::application::work_queue::{EnqueueOutcome, WorkItem, WorkQueue, DEFAULT_QUEUE_CAPACITY};
use crate::domain::entities::price_decision::{DecisionStatus, PriceDecision};
use crate::domain::entities::run::{Run, RunCounts, RunStatus};
use crate::domain::error::DomainError;
use crate::domain::ports::audit_sink::{AlertSink, AuditSink};
use crate::domain::ports::catalog::CatalogStore;
use crate::domain::ports::floor_source::FloorPriceSource;
use crate::domain::ports::pricing_client::CompetitivePricingClient;
use crate::domain::values::alert::{AlertKind, AlertSeverity};
use crate::domain::values::execution::ExecutionMode;
use crate::domain::values::guardrail::{GuardrailProfile, VersionedProfile};
use crate::domain::values::trigger::TriggerKind;

const COMMAND_BUFFER: usize = 256;
const RUN_BROADCAST_BUFFER: usize = 64;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub max_concurrency: usize,
    pub queue_capacity: usize,
    pub fallback_interval: Duration,
    pub fallback_batch_size: usize,
    pub floor_stale_after: ChronoDuration,
    pub snapshot_max_age: ChronoDuration,
    /// Consecutive `SKIPPED_NO_DATA` decisions before a SKU is alerted on.
    pub no_data_alert_after: u32,
    /// Consecutive permanent rejections before a SKU is alerted on.
    pub rejection_alert_after: u32,
    /// Minimum spacing between two alerts with the same key.
    pub alert_throttle: ChronoDuration,
    pub execution_mode: ExecutionMode,
    pub retry: RetryPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            fallback_interval: Duration::from_secs(60),
            fallback_batch_size: 40,
            floor_stale_after: ChronoDuration::minutes(90),
            snapshot_max_age: ChronoDuration::minutes(DEFAULT_SNAPSHOT_MAX_AGE_MINUTES),
            no_data_alert_after: 3,
            rejection_alert_after: 3,
            alert_throttle: ChronoDuration::minutes(60),
            execution_mode: ExecutionMode::Live,
            retry: RetryPolicy::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.max_concurrency == 0 {
            return Err(DomainError::Config("max_concurrency must be at least 1".into()));
        }
        if self.queue_capacity == 0 {
            return Err(DomainError::Config("queue_capacity must be at least 1".into()));
        }
        if self.fallback_interval.is_zero() {
            return Err(DomainError::Config("fallback_interval must be positive".into()));
        }
        if self.floor_stale_after <= ChronoDuration::zero() {
            return Err(DomainError::Config("floor_stale_after must be positive".into()));
        }
        if self.snapshot_max_age <= ChronoDuration::zero() {
            return Err(DomainError::Config("snapshot_max_age must be positive".into()));
        }
        Ok(())
    }
}

/// Ports the scheduler drives.
#[derive(Clone)]
pub struct SchedulerDeps {
    pub catalog: Arc<dyn CatalogStore>,
    pub floors: Arc<dyn FloorPriceSource>,
    pub pricing: Arc<dyn CompetitivePricingClient>,
    pub audit: Arc<dyn AuditSink>,
    pub alerts: Arc<dyn AlertSink>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkuSelection {
    All,
    Skus(Vec<String>),
}

enum Command {
    Enqueue {
        marketplace: String,
        selection: SkuSelection,
        trigger: TriggerKind,
        reply: oneshot::Sender<Result<Vec<EnqueueOutcome>, DomainError>>,
    },
    Fallback {
        reply: oneshot::Sender<Result<usize, DomainError>>,
    },
    CycleFinished {
        marketplace: String,
    },
    WaitIdle {
        reply: oneshot::Sender<()>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable front door to a running scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: mpsc::Sender<Command>,
    profiles: Arc<ProfileRegistry>,
    runs: broadcast::Sender<Run>,
}

impl SchedulerHandle {
    /// Queue SKUs named by a change notification (high priority).
    pub async fn notify(&self, marketplace: &str, skus: Vec<String>) -> Result<Vec<EnqueueOutcome>, DomainError> {
        self.enqueue(marketplace, SkuSelection::Skus(skus), TriggerKind::Notification)
            .await
    }

    /// Operator-requested evaluation of some or all SKUs (high priority).
    pub async fn manual_trigger(
        &self,
        marketplace: &str,
        selection: SkuSelection,
    ) -> Result<Vec<EnqueueOutcome>, DomainError> {
        self.enqueue(marketplace, selection, TriggerKind::Manual).await
    }

    /// Run the fallback sweep now instead of waiting for the timer. Returns
    /// the number of SKUs newly queued.
    pub async fn trigger_fallback(&self) -> Result<usize, DomainError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Fallback { reply }).await?;
        rx.await.map_err(|_| stopped())?
    }

    pub fn active_profile(&self) -> Arc<VersionedProfile> {
        self.profiles.active()
    }

    /// Takes effect for cycles opened after this call.
    pub fn set_active_profile(&self, profile: GuardrailProfile) -> Arc<VersionedProfile> {
        self.profiles.publish(profile)
    }

    /// Closed Runs, in completion order.
    pub fn subscribe_runs(&self) -> broadcast::Receiver<Run> {
        self.runs.subscribe()
    }

    /// Resolves once every lane is idle with nothing queued.
    pub async fn wait_idle(&self) -> Result<(), DomainError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::WaitIdle { reply }).await?;
        rx.await.map_err(|_| stopped())
    }

    /// Drop queued work, let in-flight cycles finish, then stop.
    pub async fn shutdown(&self) -> Result<(), DomainError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Shutdown { reply }).await?;
        rx.await.map_err(|_| stopped())
    }

    async fn enqueue(
        &self,
        marketplace: &str,
        selection: SkuSelection,
        trigger: TriggerKind,
    ) -> Result<Vec<EnqueueOutcome>, DomainError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Enqueue {
            marketplace: marketplace.to_string(),
            selection,
            trigger,
            reply,
        })
        .await?;
        rx.await.map_err(|_| stopped())?
    }

    async fn send(&self, command: Command) -> Result<(), DomainError> {
        self.commands.send(command).await.map_err(|_| stopped())
    }
}

fn stopped() -> DomainError {
    DomainError::Scheduler("scheduler is not running".into())
}

/// State shared by the control task and every cycle it spawns.
struct Shared {
    config: SchedulerConfig,
    catalog: Arc<dyn CatalogStore>,
    pricing: Arc<dyn CompetitivePricingClient>,
    audit: Arc<dyn AuditSink>,
    alerts: Arc<AlertDispatcher>,
    evaluator: Arc<Evaluator>,
    profiles: Arc<ProfileRegistry>,
    runs: broadcast::Sender<Run>,
}

struct Lane {
    queue: Arc<Mutex<WorkQueue>>,
    wake: Arc<Notify>,
    running: bool,
}

impl Lane {
    fn new(capacity: usize) -> Self {
        Self {
            queue: Arc::new(Mutex::new(WorkQueue::new(capacity))),
            wake: Arc::new(Notify::new()),
            running: false,
        }
    }
}

fn lock(queue: &Mutex<WorkQueue>) -> MutexGuard<'_, WorkQueue> {
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Scheduler;

impl Scheduler {
    /// Start the control task on the current tokio runtime.
    pub fn spawn(
        deps: SchedulerDeps,
        config: SchedulerConfig,
        profiles: Arc<ProfileRegistry>,
    ) -> Result<SchedulerHandle, DomainError> {
        config.validate()?;

        let alerts = Arc::new(AlertDispatcher::new(deps.alerts.clone(), config.alert_throttle));
        let evaluator = Arc::new(build_evaluator(&deps, &config, alerts.clone()));

        let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
        let (runs, _) = broadcast::channel(RUN_BROADCAST_BUFFER);
        let shared = Arc::new(Shared {
            config,
            catalog: deps.catalog,
            pricing: deps.pricing,
            audit: deps.audit,
            alerts,
            evaluator,
            profiles: profiles.clone(),
            runs: runs.clone(),
        });

        info!(
            max_concurrency = shared.config.max_concurrency,
            fallback_secs = shared.config.fallback_interval.as_secs(),
            mode = %shared.config.execution_mode,
            "scheduler started"
        );
        let control = Control {
            shared,
            lanes: HashMap::new(),
            commands: commands.clone(),
            idle_waiters: Vec::new(),
            shutdown: None,
        };
        tokio::spawn(control.run(rx));

        Ok(SchedulerHandle {
            commands,
            profiles,
            runs,
        })
    }
}

/// The worker pipeline as the scheduler would configure it.
pub fn build_evaluator(deps: &SchedulerDeps, config: &SchedulerConfig, alerts: Arc<AlertDispatcher>) -> Evaluator {
    Evaluator::new(
        deps.catalog.clone(),
        deps.floors.clone(),
        deps.pricing.clone(),
        deps.audit.clone(),
        alerts,
        PricingEngine::new(config.snapshot_max_age),
        EvaluationPolicy {
            execution_mode: config.execution_mode,
            retry: config.retry.clone(),
            floor_stale_after: config.floor_stale_after,
            no_data_alert_after: config.no_data_alert_after,
            rejection_alert_after: config.rejection_alert_after,
        },
    )
}

struct Control {
    shared: Arc<Shared>,
    lanes: HashMap<String, Lane>,
    /// Cloned into cycles so they can report completion.
    commands: mpsc::Sender<Command>,
    idle_waiters: Vec<oneshot::Sender<()>>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Control {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        let period = self.shared.config.fallback_interval;
        let mut fallback = tokio::time::interval_at(Instant::now() + period, period);
        fallback.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                command = rx.recv() => {
                    let Some(command) = command else { break };
                    if self.handle(command).await {
                        break;
                    }
                }
                _ = fallback.tick(), if self.shutdown.is_none() => {
                    if let Err(e) = self.fallback_sweep().await {
                        error!("fallback sweep failed: {e}");
                    }
                }
            }
        }
        info!("scheduler stopped");
    }

    /// Returns true when the control loop should exit.
    async fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Enqueue {
                marketplace,
                selection,
                trigger,
                reply,
            } => {
                let result = self.enqueue_selection(&marketplace, selection, trigger).await;
                let _ = reply.send(result);
            }
            Command::Fallback { reply } => {
                let _ = reply.send(self.fallback_sweep().await);
            }
            Command::CycleFinished { marketplace } => {
                self.cycle_finished(&marketplace);
            }
            Command::WaitIdle { reply } => {
                self.idle_waiters.push(reply);
            }
            Command::Shutdown { reply } => {
                info!("scheduler shutting down");
                for lane in self.lanes.values() {
                    let dropped = lock(&lane.queue).drain_pending();
                    if !dropped.is_empty() {
                        debug!(count = dropped.len(), "dropping queued work on shutdown");
                    }
                }
                self.shutdown = Some(reply);
            }
        }
        self.settle()
    }

    /// Answer idle waiters and the shutdown request once nothing is running.
    fn settle(&mut self) -> bool {
        let busy = self
            .lanes
            .values()
            .any(|lane| lane.running || lock(&lane.queue).has_pending());
        if busy {
            return false;
        }
        for waiter in self.idle_waiters.drain(..) {
            let _ = waiter.send(());
        }
        match self.shutdown.take() {
            Some(reply) => {
                let _ = reply.send(());
                true
            }
            None => false,
        }
    }

    async fn enqueue_selection(
        &mut self,
        marketplace: &str,
        selection: SkuSelection,
        trigger: TriggerKind,
    ) -> Result<Vec<EnqueueOutcome>, DomainError> {
        if self.shutdown.is_some() {
            return Err(DomainError::Scheduler("scheduler is shutting down".into()));
        }
        let skus = match selection {
            SkuSelection::Skus(skus) => skus,
            SkuSelection::All => self
                .shared
                .catalog
                .list_skus(marketplace)
                .await?
                .into_iter()
                .map(|r| r.sku)
                .collect(),
        };
        let items = skus.into_iter().map(|sku| WorkItem::new(sku, trigger)).collect();
        Ok(self.enqueue_items(marketplace, items, trigger).await)
    }

    async fn enqueue_items(
        &mut self,
        marketplace: &str,
        items: Vec<WorkItem>,
        trigger: TriggerKind,
    ) -> Vec<EnqueueOutcome> {
        let capacity = self.shared.config.queue_capacity;
        let lane = self
            .lanes
            .entry(marketplace.to_string())
            .or_insert_with(|| Lane::new(capacity));

        let outcomes: Vec<EnqueueOutcome> = {
            let mut queue = lock(&lane.queue);
            items.into_iter().map(|item| queue.enqueue(item)).collect()
        };
        debug!(marketplace, trigger = %trigger, count = outcomes.len(), "enqueued");

        let dropped: Vec<&str> = outcomes
            .iter()
            .filter_map(|o| match o {
                EnqueueOutcome::Overflow { dropped } => Some(dropped.as_str()),
                _ => None,
            })
            .collect();
        if !dropped.is_empty() {
            self.shared
                .alerts
                .raise_throttled(
                    &format!("queue_overflow:{marketplace}"),
                    AlertKind::QueueOverflow,
                    AlertSeverity::Warning,
                    format!("work queue for {marketplace} is full, dropped {} SKUs", dropped.len()),
                    json!({ "marketplace": marketplace, "dropped": dropped }),
                )
                .await;
        }

        self.start_if_idle(marketplace);
        outcomes
    }

    async fn fallback_sweep(&mut self) -> Result<usize, DomainError> {
        let batch = self.shared.config.fallback_batch_size;
        let mut queued = 0;
        for marketplace in self.shared.catalog.marketplaces().await? {
            let records = self
                .shared
                .catalog
                .least_recently_evaluated(&marketplace, batch)
                .await?;
            if records.is_empty() {
                continue;
            }
            let items = records
                .into_iter()
                .map(|r| WorkItem::new(r.sku, TriggerKind::Fallback))
                .collect();
            queued += self
                .enqueue_items(&marketplace, items, TriggerKind::Fallback)
                .await
                .iter()
                .filter(|o| **o == EnqueueOutcome::Queued)
                .count();
        }
        debug!(queued, "fallback sweep");
        Ok(queued)
    }

    fn start_if_idle(&mut self, marketplace: &str) {
        let Some(lane) = self.lanes.get_mut(marketplace) else {
            return;
        };
        if lane.running {
            lane.wake.notify_one();
            return;
        }
        let Some(trigger) = lock(&lane.queue).peek().map(|item| item.trigger) else {
            return;
        };
        lane.running = true;
        let cycle = Cycle {
            shared: self.shared.clone(),
            marketplace: marketplace.to_string(),
            queue: lane.queue.clone(),
            wake: lane.wake.clone(),
            profile: self.shared.profiles.active(),
            trigger,
        };
        let done = self.commands.clone();
        tokio::spawn(async move {
            let marketplace = cycle.marketplace.clone();
            cycle.run().await;
            let _ = done.send(Command::CycleFinished { marketplace }).await;
        });
    }

    fn cycle_finished(&mut self, marketplace: &str) {
        let Some(lane) = self.lanes.get_mut(marketplace) else {
            return;
        };
        lane.running = false;
        if self.shutdown.is_some() {
            return;
        }
        // Work queued after the cycle's last check starts a fresh cycle.
        self.start_if_idle(marketplace);
    }
}

/// Releases an in-flight SKU when its worker ends, panics included.
struct InFlight {
    queue: Arc<Mutex<WorkQueue>>,
    sku: String,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        lock(&self.queue).complete(&self.sku);
    }
}

struct Cycle {
    shared: Arc<Shared>,
    marketplace: String,
    queue: Arc<Mutex<WorkQueue>>,
    wake: Arc<Notify>,
    profile: Arc<VersionedProfile>,
    trigger: TriggerKind,
}

impl Cycle {
    async fn run(self) {
        let mut run = Run::open(
            self.marketplace.clone(),
            self.trigger,
            self.profile.profile.name().to_string(),
            self.profile.version,
        );
        if let Err(e) = self.shared.audit.open_run(&run).await {
            error!(run_id = %run.id, "failed to record run start: {e}");
        }
        info!(
            run_id = %run.id,
            marketplace = %self.marketplace,
            trigger = %self.trigger,
            profile = %run.profile_name,
            profile_version = run.profile_version,
            "run started"
        );

        let (status, counts) = match self.shared.pricing.connect(&self.marketplace).await {
            Ok(()) => (RunStatus::Completed, self.drive(&run.id).await),
            Err(e) => (RunStatus::Aborted, self.abort(&run.id, &e.to_string()).await),
        };

        run.close(status, counts);
        if let Err(e) = self.shared.audit.close_run(&run).await {
            error!(run_id = %run.id, "failed to record run end: {e}");
        }
        info!(
            run_id = %run.id,
            marketplace = %self.marketplace,
            status = %run.status,
            processed = counts.processed,
            updated = counts.updated,
            errors = counts.errors,
            "run finished"
        );
        let _ = self.shared.runs.send(run);
    }

    async fn drive(&self, run_id: &str) -> RunCounts {
        let limit = self.shared.config.max_concurrency;
        let mut workers = JoinSet::new();
        let mut counts = RunCounts::default();

        loop {
            while workers.len() < limit {
                let Some(item) = lock(&self.queue).dequeue() else {
                    break;
                };
                let guard = InFlight {
                    queue: self.queue.clone(),
                    sku: item.sku.clone(),
                };
                let evaluator = self.shared.evaluator.clone();
                let profile = self.profile.clone();
                let marketplace = self.marketplace.clone();
                let run_id = run_id.to_string();
                workers.spawn(async move {
                    let _guard = guard;
                    let result = evaluator
                        .evaluate(&run_id, &marketplace, &profile.profile, &item)
                        .await;
                    (item.sku, result)
                });
            }

            if workers.is_empty() {
                break;
            }

            tokio::select! {
                joined = workers.join_next() => {
                    let Some(joined) = joined else { continue };
                    counts.processed += 1;
                    match joined {
                        Ok((_, Ok(decision))) => tally(&mut counts, &decision),
                        Ok((sku, Err(e))) => {
                            counts.errors += 1;
                            error!(run_id, marketplace = %self.marketplace, sku = %sku, "evaluation failed: {e}");
                        }
                        Err(e) => {
                            counts.errors += 1;
                            error!(run_id, marketplace = %self.marketplace, "worker task failed: {e}");
                        }
                    }
                }
                _ = self.wake.notified() => {}
            }
        }
        counts
    }

    /// Record every queued SKU as aborted and raise a critical alert.
    async fn abort(&self, run_id: &str, cause: &str) -> RunCounts {
        error!(run_id, marketplace = %self.marketplace, "handshake failed, aborting cycle: {cause}");
        let pending = lock(&self.queue).drain_pending();
        let now = Utc::now();
        let mut counts = RunCounts::default();

        for item in &pending {
            let record = match self.shared.catalog.get_sku(&self.marketplace, &item.sku).await {
                Ok(record) => record,
                Err(e) => {
                    warn!(sku = %item.sku, "catalog lookup failed while aborting: {e}");
                    None
                }
            };
            let decision = cycle_aborted(&self.marketplace, item, record.as_ref(), cause, now).with_run(run_id);
            if let Err(e) = self.shared.audit.record_decision(&decision).await {
                error!(run_id, sku = %item.sku, "failed to record aborted decision: {e}");
            }
            counts.processed += 1;
            counts.errors += 1;
        }

        self.shared
            .alerts
            .raise(
                AlertKind::CycleAborted,
                AlertSeverity::Critical,
                format!("cycle for {} aborted: {cause}", self.marketplace),
                json!({
                    "marketplace": self.marketplace,
                    "run_id": run_id,
                    "pending": pending.len(),
                    "error": cause,
                }),
            )
            .await;
        counts
    }
}

fn tally(counts: &mut RunCounts, decision: &PriceDecision) {
    match decision.status {
        DecisionStatus::Applied | DecisionStatus::DryRun => counts.updated += 1,
        DecisionStatus::Failed => counts.errors += 1,
        _ => {}
    }
}
