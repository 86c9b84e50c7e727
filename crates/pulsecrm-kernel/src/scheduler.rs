//! Background job scheduler.
//!
//! One tokio task per job, each sleeping for its configured interval and
//! stopping when the shutdown watch flips.

use crate::error::{KernelError, KernelResult};
use crate::CrmKernel;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Names accepted by [`CrmKernel::run_job`].
pub const JOB_NAMES: [&str; 7] = [
    "follow_up",
    "nurturing",
    "cart_recovery",
    "payment_reminder",
    "alerts",
    "dedup",
    "dispatch",
];

/// Outcome of one batch job run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReport {
    pub job: String,
    /// Rows the job looked at.
    pub examined: usize,
    /// Messages sent, records changed or alerts raised.
    pub actions: usize,
    pub errors: usize,
}

impl JobReport {
    pub fn new(job: &str) -> Self {
        Self {
            job: job.to_string(),
            ..Default::default()
        }
    }
}

impl CrmKernel {
    /// Run a batch job once by name.
    pub async fn run_job(&self, name: &str) -> KernelResult<JobReport> {
        match name {
            "follow_up" => self.check_follow_ups().await,
            "nurturing" => self.process_nurturing().await,
            "cart_recovery" => self.recover_carts().await,
            "payment_reminder" => self.send_payment_reminders().await,
            "alerts" => self.check_all_alerts().await,
            "dedup" => self.run_dedup_job().await,
            "dispatch" => self.dispatch_due().await,
            other => Err(KernelError::UnknownJob(other.to_string())),
        }
    }

    fn job_interval(&self, name: &str) -> Duration {
        let jobs = &self.config.jobs;
        let secs = match name {
            "follow_up" => jobs.follow_up_secs,
            "nurturing" => jobs.nurturing_secs,
            "cart_recovery" => jobs.cart_recovery_secs,
            "payment_reminder" => jobs.payment_reminder_secs,
            "alerts" => jobs.alerts_secs,
            "dedup" => jobs.dedup_secs,
            _ => jobs.dispatch_secs,
        };
        Duration::from_secs(secs.max(1))
    }
}

/// Spawn every job loop. Loops exit once `shutdown` reads `true`.
pub fn spawn_scheduler(
    kernel: Arc<CrmKernel>,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    if !kernel.config.jobs.enabled {
        info!("Background jobs disabled");
        return Vec::new();
    }
    JOB_NAMES
        .iter()
        .map(|&name| {
            let kernel = Arc::clone(&kernel);
            let mut shutdown = shutdown.clone();
            let every = kernel.job_interval(name);
            info!(job = name, interval_secs = every.as_secs(), "Scheduling job");
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                break;
                            }
                            continue;
                        }
                        _ = tokio::time::sleep(every) => {}
                    }
                    match kernel.run_job(name).await {
                        Ok(report) => debug!(
                            job = name,
                            examined = report.examined,
                            actions = report.actions,
                            errors = report.errors,
                            "Job tick finished"
                        ),
                        Err(e) => error!(job = name, error = %e, "Job tick failed"),
                    }
                }
                info!(job = name, "Job loop stopped");
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_config, test_kernel, test_kernel_with};

    #[tokio::test]
    async fn run_job_by_name() {
        let (kernel, _) = test_kernel(None);
        for name in JOB_NAMES {
            let report = kernel.run_job(name).await.unwrap();
            assert_eq!(report.job, name);
            assert_eq!(report.errors, 0);
        }
        let err = kernel.run_job("bogus").await.unwrap_err();
        assert!(matches!(err, KernelError::UnknownJob(_)));
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn loops_stop_on_shutdown() {
        let (kernel, _) = test_kernel(None);
        let (tx, rx) = watch::channel(false);
        let handles = spawn_scheduler(Arc::new(kernel), rx);
        assert_eq!(handles.len(), JOB_NAMES.len());
        tx.send(true).unwrap();
        for h in handles {
            tokio::time::timeout(Duration::from_secs(5), h)
                .await
                .expect("loop did not stop")
                .unwrap();
        }
    }

    #[tokio::test]
    async fn disabled_jobs_spawn_nothing() {
        let mut config = test_config();
        config.jobs.enabled = false;
        let (kernel, _) = test_kernel_with(config, None);
        let (_tx, rx) = watch::channel(false);
        assert!(spawn_scheduler(Arc::new(kernel), rx).is_empty());
    }
}
