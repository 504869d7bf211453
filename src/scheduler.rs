//! Named Task Scheduler
//!
//! Registry of repeating and one-shot actions keyed by name:
//! - Re-registering a name replaces the previous timer
//! - `cancel_all` tears everything down when a session ends
//! - A failing or panicking action costs one tick, never the timer
//!
//! Every task is a tokio task on the caller's runtime. Cancellation is
//! signalled through a oneshot channel that is only polled while the task
//! waits for its next tick, so an in-flight action always runs to completion.

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Boxed task body
pub type TaskAction = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// How a task repeats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Runs every period until cancelled
    Interval(Duration),
    /// Runs once after the delay (zero = immediately)
    OneShot(Duration),
}

/// A registered task
struct ScheduledTask {
    /// Registration generation, distinguishes replacements of the same name
    id: u64,
    kind: TaskKind,
    /// Dropping or firing this stops the task
    cancel: Option<oneshot::Sender<()>>,
}

impl ScheduledTask {
    fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}

/// Snapshot of one active task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    pub name: String,
    pub kind: TaskKind,
}

/// Name-keyed scheduler. Cheap to clone; clones share the registry.
#[derive(Clone, Default)]
pub struct Scheduler {
    tasks: Arc<Mutex<HashMap<String, ScheduledTask>>>,
    next_id: Arc<AtomicU64>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task. `None` runs the action once immediately; `Some(period)`
    /// runs it every period, first after one period. A zero period is refused.
    pub fn register<F, Fut>(&self, name: &str, period: Option<Duration>, action: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let kind = match period {
            Some(period) => TaskKind::Interval(period),
            None => TaskKind::OneShot(Duration::ZERO),
        };
        self.install(name, kind, boxed(action));
    }

    /// Register an action that runs once after `delay`
    pub fn register_delayed<F, Fut>(&self, name: &str, delay: Duration, action: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.install(name, TaskKind::OneShot(delay), boxed(action));
    }

    /// Stop a task; unknown names are ignored
    pub fn cancel(&self, name: &str) -> bool {
        match self.tasks.lock().remove(name) {
            Some(mut task) => {
                task.stop();
                debug!("Cancelled task '{}'", name);
                true
            }
            None => false,
        }
    }

    /// Stop every task. Returns how many were active.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<(String, ScheduledTask)> = self.tasks.lock().drain().collect();
        let count = drained.len();
        for (_, mut task) in drained {
            task.stop();
        }
        if count > 0 {
            info!("Cancelled {} scheduled task(s)", count);
        }
        count
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.tasks.lock().contains_key(name)
    }

    /// Active tasks sorted by name
    pub fn active_tasks(&self) -> Vec<TaskInfo> {
        let mut tasks: Vec<TaskInfo> = self
            .tasks
            .lock()
            .iter()
            .map(|(name, task)| TaskInfo {
                name: name.clone(),
                kind: task.kind,
            })
            .collect();
        tasks.sort_by(|a, b| a.name.cmp(&b.name));
        tasks
    }

    fn install(&self, name: &str, kind: TaskKind, action: TaskAction) {
        if kind == TaskKind::Interval(Duration::ZERO) {
            warn!("Refusing to schedule '{}' with a zero period", name);
            return;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (cancel_tx, cancel_rx) = oneshot::channel();

        {
            let mut tasks = self.tasks.lock();
            if let Some(mut previous) = tasks.insert(
                name.to_string(),
                ScheduledTask {
                    id,
                    kind,
                    cancel: Some(cancel_tx),
                },
            ) {
                previous.stop();
                debug!("Replaced task '{}'", name);
            }
        }

        let name = name.to_string();
        match kind {
            TaskKind::Interval(period) => {
                debug!("Scheduled task '{}' every {:?}", name, period);
                tokio::spawn(run_interval(name, period, action, cancel_rx));
            }
            TaskKind::OneShot(delay) => {
                debug!("Scheduled task '{}' once after {:?}", name, delay);
                let tasks = Arc::clone(&self.tasks);
                tokio::spawn(async move {
                    run_once(&name, delay, action, cancel_rx).await;
                    // Forget the entry unless a newer task took the name
                    let mut tasks = tasks.lock();
                    if tasks.get(&name).map(|t| t.id) == Some(id) {
                        tasks.remove(&name);
                    }
                });
            }
        }
    }
}

fn boxed<F, Fut>(action: F) -> TaskAction
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move || action().boxed())
}

async fn run_interval(
    name: String,
    period: Duration,
    action: TaskAction,
    mut cancel: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = &mut cancel => break,
            _ = ticker.tick() => run_tick(&name, &action).await,
        }
    }

    debug!("Task '{}' stopped", name);
}

async fn run_once(
    name: &str,
    delay: Duration,
    action: TaskAction,
    mut cancel: oneshot::Receiver<()>,
) {
    if !delay.is_zero() {
        tokio::select! {
            biased;
            _ = &mut cancel => {
                debug!("Task '{}' cancelled before running", name);
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }
    } else if cancel.try_recv().is_ok() {
        return;
    }

    run_tick(name, &action).await;
}

/// Run one invocation, containing errors and panics
async fn run_tick(name: &str, action: &TaskAction) {
    match AssertUnwindSafe(action()).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Task '{}' failed: {:#}", name, e),
        Err(_) => warn!("Task '{}' panicked; skipping this tick", name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter_action(
        counter: &Arc<AtomicUsize>,
    ) -> impl Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync + 'static {
        let counter = Arc::clone(counter);
        move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_fires_every_period() {
        let scheduler = Scheduler::new();
        let count = Arc::new(AtomicUsize::new(0));

        scheduler.register("tick", Some(Duration::from_millis(100)), counter_action(&count));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(scheduler.is_active("tick"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reregister_replaces_timer() {
        let scheduler = Scheduler::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        scheduler.register("chat", Some(Duration::from_millis(100)), counter_action(&first));
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(first.load(Ordering::SeqCst), 2);

        scheduler.register("chat", Some(Duration::from_millis(100)), counter_action(&second));
        tokio::time::sleep(Duration::from_millis(1020)).await;

        assert_eq!(first.load(Ordering::SeqCst), 2);
        assert_eq!(second.load(Ordering::SeqCst), 10);
        assert_eq!(scheduler.active_tasks().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_shot_runs_immediately_and_unregisters() {
        let scheduler = Scheduler::new();
        let count = Arc::new(AtomicUsize::new(0));

        scheduler.register("once", None, counter_action(&count));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_active("once"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_can_be_cancelled() {
        let scheduler = Scheduler::new();
        let count = Arc::new(AtomicUsize::new(0));

        scheduler.register_delayed("release", Duration::from_millis(500), counter_action(&count));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(scheduler.cancel("release"));
        tokio::time::sleep(Duration::from_millis(1000)).await;

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!scheduler.cancel("release"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_replaced_one_shot_keeps_newer_entry() {
        let scheduler = Scheduler::new();
        let count = Arc::new(AtomicUsize::new(0));

        scheduler.register_delayed("release", Duration::from_millis(100), counter_action(&count));
        scheduler.register_delayed("release", Duration::from_millis(300), counter_action(&count));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(scheduler.is_active("release"));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_active("release"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_action_keeps_ticking() {
        let scheduler = Scheduler::new();
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&attempts);

        scheduler.register("flaky", Some(Duration::from_millis(100)), move || {
            let n = seen.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    anyhow::bail!("no target in range");
                }
                if n == 1 {
                    panic!("boom");
                }
                Ok(())
            }
        });

        tokio::time::sleep(Duration::from_millis(450)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        assert!(scheduler.is_active("flaky"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all() {
        let scheduler = Scheduler::new();
        let count = Arc::new(AtomicUsize::new(0));

        assert_eq!(scheduler.cancel_all(), 0);

        scheduler.register("a", Some(Duration::from_millis(100)), counter_action(&count));
        scheduler.register("b", Some(Duration::from_millis(100)), counter_action(&count));
        assert_eq!(
            scheduler.active_tasks(),
            vec![
                TaskInfo { name: "a".into(), kind: TaskKind::Interval(Duration::from_millis(100)) },
                TaskInfo { name: "b".into(), kind: TaskKind::Interval(Duration::from_millis(100)) },
            ]
        );

        assert_eq!(scheduler.cancel_all(), 2);
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(scheduler.active_tasks().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_period_is_refused() {
        let scheduler = Scheduler::new();
        let count = Arc::new(AtomicUsize::new(0));

        scheduler.register("spin", Some(Duration::ZERO), counter_action(&count));
        assert!(!scheduler.is_active("spin"));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        // Zero delay on a one-shot still means "run now"
        scheduler.register_delayed("now", Duration::ZERO, counter_action(&count));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
