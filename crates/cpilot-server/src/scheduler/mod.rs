//! Work-order scheduler.
//!
//! Wraps a [`JobScheduler`] with a map from work-order ID to the registered
//! one-shot job, so rescheduling replaces the prior timer instead of stacking
//! a second one. The map is in-process and not durable; startup recovery
//! rebuilds it from the `pending` rows in the database.

pub mod execute;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use uuid::Uuid;

use cpilot_core::AppConfig;
use cpilot_db::WorkOrderRow;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("job scheduler error: {0}")]
    Jobs(#[from] JobSchedulerError),

    #[error(transparent)]
    Db(#[from] cpilot_db::DbError),
}

/// Handle to the running scheduler. Cheap to clone; all clones share the same
/// job registry.
#[derive(Clone)]
pub struct WorkOrderScheduler {
    inner: JobScheduler,
    pool: PgPool,
    config: Arc<AppConfig>,
    jobs: Arc<Mutex<HashMap<i64, Uuid>>>,
}

impl WorkOrderScheduler {
    /// Builds and starts the underlying job scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Jobs`] if the scheduler cannot be initialised
    /// or started.
    pub async fn new(pool: PgPool, config: Arc<AppConfig>) -> Result<Self, SchedulerError> {
        let inner = JobScheduler::new().await?;
        inner.start().await?;

        Ok(Self {
            inner,
            pool,
            config,
            jobs: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Registers a work order for execution.
    ///
    /// `execute_immediately`, a missing `scheduled_at`, or a `scheduled_at`
    /// already in the past all spawn execution right away without a timer.
    /// A future `scheduled_at` registers a one-shot job at that instant,
    /// replacing any job previously registered for the same work-order ID.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Jobs`] if the one-shot job cannot be
    /// registered.
    pub async fn schedule(&self, order: &WorkOrderRow) -> Result<(), SchedulerError> {
        let delay = order
            .scheduled_at
            .map(|at| at - Utc::now())
            .and_then(|d| d.to_std().ok());

        let delay = match (order.execute_immediately, delay) {
            (true, _) | (false, None) => {
                self.spawn_execution(order.id);
                return Ok(());
            }
            (false, Some(delay)) => delay,
        };

        let order_id = order.id;
        let pool = self.pool.clone();
        let config = Arc::clone(&self.config);
        let jobs = Arc::clone(&self.jobs);

        let job = Job::new_one_shot_at_instant_async(
            std::time::Instant::now() + delay,
            move |_uuid, _lock| {
                let pool = pool.clone();
                let config = Arc::clone(&config);
                let jobs = Arc::clone(&jobs);

                Box::pin(async move {
                    jobs.lock().await.remove(&order_id);
                    execute::run_work_order(&pool, &config, order_id).await;
                })
            },
        )?;

        let job_uuid = self.inner.add(job).await?;

        if let Some(previous) = self.jobs.lock().await.insert(order_id, job_uuid) {
            if let Err(e) = self.inner.remove(&previous).await {
                tracing::warn!(
                    work_order_id = order_id,
                    error = %e,
                    "failed to remove superseded scheduler job"
                );
            }
        }

        tracing::info!(
            work_order_id = order_id,
            delay_secs = delay.as_secs(),
            "work order scheduled"
        );
        Ok(())
    }

    /// Drops the timer registered for a work order, if any. Used when a
    /// pending order is archived before it fires.
    pub async fn unschedule(&self, order_id: i64) {
        let removed = self.jobs.lock().await.remove(&order_id);
        if let Some(job_uuid) = removed {
            if let Err(e) = self.inner.remove(&job_uuid).await {
                tracing::warn!(
                    work_order_id = order_id,
                    error = %e,
                    "failed to remove scheduler job"
                );
            }
        }
    }

    /// Startup recovery: re-registers every `pending` work order.
    ///
    /// Overdue orders execute immediately; future ones get a fresh one-shot
    /// timer. The guarded claim makes a double registration harmless.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Db`] if pending orders cannot be loaded, or
    /// [`SchedulerError::Jobs`] if a timer cannot be registered.
    pub async fn recover(&self) -> Result<usize, SchedulerError> {
        let pending = cpilot_db::list_pending_work_orders(&self.pool).await?;
        let count = pending.len();

        for order in &pending {
            self.schedule(order).await?;
        }

        if count > 0 {
            tracing::info!(count, "recovered pending work orders after restart");
        }
        Ok(count)
    }

    fn spawn_execution(&self, order_id: i64) {
        let pool = self.pool.clone();
        let config = Arc::clone(&self.config);
        tokio::spawn(async move {
            execute::run_work_order(&pool, &config, order_id).await;
        });
    }
}
