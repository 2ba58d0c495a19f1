use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use futures::stream::{self, StreamExt};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Running,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct EmployeeFailure {
    pub employee_id: u64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct BatchReport {
    #[schema(value_type = String, format = "uuid")]
    pub run_id: Uuid,
    pub status: BatchStatus,
    pub total: usize,
    pub computed: Vec<u64>,
    pub failed: Vec<EmployeeFailure>,
    /// Employees never started because the run was cancelled.
    pub skipped: Vec<u64>,
}

#[derive(Debug)]
enum EmployeeOutcome {
    Computed(u64),
    Failed(EmployeeFailure),
    Skipped(u64),
}

/// Shared state of one background run. Cancelling only stops new employees
/// from being scheduled; in-flight computations finish and keep their writes.
#[derive(Debug)]
pub struct BatchRun {
    cancelled: AtomicBool,
    report: Mutex<BatchReport>,
}

impl BatchRun {
    pub fn new(total: usize) -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            report: Mutex::new(BatchReport {
                run_id: Uuid::new_v4(),
                status: BatchStatus::Running,
                total,
                computed: Vec::new(),
                failed: Vec::new(),
                skipped: Vec::new(),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.report.lock().unwrap_or_else(PoisonError::into_inner).run_id
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> BatchReport {
        let mut report = self.report.lock().unwrap_or_else(PoisonError::into_inner).clone();
        report.computed.sort_unstable();
        report.skipped.sort_unstable();
        report.failed.sort_by_key(|f| f.employee_id);
        report
    }

    fn record(&self, outcome: EmployeeOutcome) {
        let mut report = self.report.lock().unwrap_or_else(PoisonError::into_inner);
        match outcome {
            EmployeeOutcome::Computed(id) => report.computed.push(id),
            EmployeeOutcome::Failed(failure) => report.failed.push(failure),
            EmployeeOutcome::Skipped(id) => report.skipped.push(id),
        }
    }

    fn finish(&self) {
        let mut report = self.report.lock().unwrap_or_else(PoisonError::into_inner);
        report.status = if self.is_cancelled() {
            BatchStatus::Cancelled
        } else {
            BatchStatus::Completed
        };
    }
}

/// Runs `compute` for every employee with at most `max_concurrency` in
/// flight. A failure is recorded against its employee and never aborts the
/// rest of the run.
pub async fn fan_out<F, Fut, T>(run: &BatchRun, employee_ids: Vec<u64>, max_concurrency: usize, compute: F)
where
    F: Fn(u64) -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let compute = &compute;
    stream::iter(employee_ids)
        .map(|employee_id| async move {
            if run.is_cancelled() {
                return EmployeeOutcome::Skipped(employee_id);
            }
            match compute(employee_id).await {
                Ok(_) => EmployeeOutcome::Computed(employee_id),
                Err(e) => {
                    tracing::error!(error = %e, employee_id, "Batch payroll computation failed");
                    EmployeeOutcome::Failed(EmployeeFailure {
                        employee_id,
                        message: e.to_string(),
                    })
                }
            }
        })
        .buffer_unordered(max_concurrency.max(1))
        .for_each(|outcome| {
            run.record(outcome);
            futures::future::ready(())
        })
        .await;

    run.finish();
    let report = run.snapshot();
    tracing::info!(
        run_id = %report.run_id,
        computed = report.computed.len(),
        failed = report.failed.len(),
        skipped = report.skipped.len(),
        "Payroll batch finished"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    #[actix_web::test]
    async fn failures_are_recorded_per_employee() {
        let run = BatchRun::new(5);
        fan_out(&run, vec![1, 2, 3, 4, 5], 3, |id| async move {
            if id == 3 {
                Err(AppError::ConfigurationMissing("no compensation".into()))
            } else {
                Ok(id)
            }
        })
        .await;

        let report = run.snapshot();
        assert_eq!(report.status, BatchStatus::Completed);
        assert_eq!(report.computed, vec![1, 2, 4, 5]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].employee_id, 3);
        assert!(report.skipped.is_empty());
    }

    #[actix_web::test]
    async fn cancellation_stops_scheduling() {
        let run = BatchRun::new(4);
        let handle = &run;
        fan_out(&run, vec![1, 2, 3, 4], 1, |id| async move {
            if id == 2 {
                handle.cancel();
            }
            Ok(())
        })
        .await;

        let report = run.snapshot();
        assert_eq!(report.status, BatchStatus::Cancelled);
        assert_eq!(report.computed, vec![1, 2]);
        assert_eq!(report.skipped, vec![3, 4]);
    }
}
