pub mod tasks;

use std::future::Future;
use std::pin::Pin;

use anyhow::{Context, Result};
use chrono::Local;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;
use uuid::Uuid;

/// Boxed future produced by a job on every firing
pub type JobFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Wrapper around tokio-cron-scheduler for the recurring jobs
pub struct Scheduler {
    inner: JobScheduler,
}

impl Scheduler {
    pub async fn new() -> Result<Self> {
        let inner = JobScheduler::new()
            .await
            .context("Failed to create job scheduler")?;
        Ok(Self { inner })
    }

    /// Add a recurring job. `cron_expr` has six fields, seconds first, and is
    /// evaluated in the host's local time zone.
    ///
    /// Firings are independent: a job that is still running when its next
    /// firing (or another job's) comes due runs concurrently with it.
    pub async fn add_cron_job<F>(&self, cron_expr: &str, name: &str, task: F) -> Result<Uuid>
    where
        F: Fn() -> JobFuture + Send + Sync + 'static,
    {
        let job_name = name.to_string();
        let job = Job::new_async_tz(cron_expr, Local, move |_uuid, _lock| {
            let name = job_name.clone();
            let fut = task();
            Box::pin(async move {
                info!("Running scheduled job: {}", name);
                fut.await;
                info!("Finished scheduled job: {}", name);
            })
        })
        .with_context(|| format!("Invalid cron expression for {}: {}", name, cron_expr))?;

        let id = self
            .inner
            .add(job)
            .await
            .with_context(|| format!("Failed to add job: {}", name))?;

        info!("Scheduled job '{}' with cron: {}", name, cron_expr);
        Ok(id)
    }

    pub async fn start(&self) -> Result<()> {
        self.inner
            .start()
            .await
            .context("Failed to start scheduler")?;
        info!("Scheduler started");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner
            .shutdown()
            .await
            .context("Failed to shutdown scheduler")?;
        info!("Scheduler stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Timelike, Utc};

    use super::*;

    #[tokio::test]
    async fn test_rejects_invalid_cron() {
        let scheduler = Scheduler::new().await.unwrap();
        let result = scheduler
            .add_cron_job("not a cron", "broken", || Box::pin(async {}))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_accepts_builtin_expressions() {
        let scheduler = Scheduler::new().await.unwrap();
        for cron in ["0 0 0 * * *", "0 0 0 * * Mon", "0 0 0 1 * *", "0 0 0 1 1 *", "0 0 2 * * *"] {
            scheduler
                .add_cron_job(cron, cron, || Box::pin(async {}))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_jobs_fire_at_local_midnight() {
        let scheduler = Scheduler::new().await.unwrap();
        let id = scheduler
            .add_cron_job("0 0 0 * * *", "midnight", || Box::pin(async {}))
            .await
            .unwrap();

        let next = scheduler.inner.clone().next_tick_for_job(id).await.unwrap().unwrap();
        let local = next.with_timezone(&Local);
        assert_eq!((local.hour(), local.minute(), local.second()), (0, 0, 0));
        assert!(next > Utc::now());
        assert!(next - Utc::now() <= chrono::Duration::days(1));
    }
}
