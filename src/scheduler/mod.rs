//! Cron-style scheduled tasks
//!
//! Tasks are registered on the `BotBuilder` before the bot starts. Every
//! expression is parsed at registration time so a malformed schedule keeps
//! the bot from ever serving. Once started, each task runs on its own tokio
//! timer loop, independent of message dispatch.

mod cron;

pub use cron::CronExpression;

use crate::bot::Bot;
use crate::error::Result;
use chrono::Utc;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// Callback run on every tick of a schedule
pub type TaskFn = Arc<dyn Fn(Bot) -> BoxFuture<'static, ()> + Send + Sync>;

/// A parsed schedule plus its callback
#[derive(Clone)]
pub struct ScheduledTask {
    expression: CronExpression,
    task: TaskFn,
}

impl ScheduledTask {
    pub fn expression(&self) -> &CronExpression {
        &self.expression
    }
}

impl std::fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("expression", &self.expression.as_str())
            .finish()
    }
}

/// Registered tasks and their running timer loops
#[derive(Default)]
pub struct Scheduler {
    tasks: Vec<ScheduledTask>,
    running: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task; fails with `InvalidCron` on a malformed expression
    pub fn schedule<F, Fut>(&mut self, expression: &str, task: F) -> Result<()>
    where
        F: Fn(Bot) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let expression = CronExpression::parse(expression)?;
        self.tasks.push(ScheduledTask {
            expression,
            task: Arc::new(move |bot| Box::pin(task(bot))),
        });
        Ok(())
    }

    pub fn tasks(&self) -> &[ScheduledTask] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Spawn one timer loop per task
    ///
    /// Calling `start` again while loops are running is a no-op.
    pub fn start(&self, bot: &Bot) {
        let mut running = match self.running.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !running.is_empty() {
            return;
        }

        for scheduled in &self.tasks {
            let scheduled = scheduled.clone();
            let bot = bot.clone();
            running.push(tokio::spawn(async move {
                run_task(scheduled, bot).await;
            }));
        }

        tracing::info!(tasks = self.tasks.len(), "Scheduler started");
    }

    /// Abort every timer loop
    pub fn stop(&self) {
        let mut running = match self.running.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if running.is_empty() {
            return;
        }
        for handle in running.drain(..) {
            handle.abort();
        }
        tracing::info!("Scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().map(|r| !r.is_empty()).unwrap_or(false)
    }
}

async fn run_task(scheduled: ScheduledTask, bot: Bot) {
    loop {
        let now = Utc::now();
        let Some(next) = scheduled.expression.next_after(now) else {
            tracing::warn!(
                expression = %scheduled.expression.as_str(),
                "Schedule has no upcoming run, stopping task"
            );
            return;
        };
        let wait = (next - now).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        tracing::debug!(expression = %scheduled.expression.as_str(), "Running scheduled task");
        // Ticks run detached from the timer loop
        let task = Arc::clone(&scheduled.task);
        let bot = bot.clone();
        tokio::spawn(async move { task(bot).await });
    }
}
