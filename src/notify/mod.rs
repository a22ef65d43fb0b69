//! Notification Gate
//!
//! Decides whether a freshly closed job warrants a low-performance alert.
//! Delivery (Telegram, SMS, webhooks) lives outside this crate behind the
//! [`Notifier`] trait; the gate only computes the decision and flips the
//! job's `notification_sent` flag in the same transaction so a job never
//! alerts twice.

use bigdecimal::{BigDecimal, ToPrimitive};
use diesel::prelude::*;
use log::{info, warn};

use crate::shared::error::ReconcileError;
use crate::shared::models::Job;
use crate::shared::schema::{branches, job_special_shifts, jobs, shifts};
use crate::shared::state::AppState;

pub trait PerformanceCalculator: Send + Sync {
    /// Performance ratio for a closed job given planned and actual hours.
    /// Values below the configured threshold trigger the alert.
    fn performance(&self, plan_hours: f64, actual_hours: f64) -> f64;
}

/// Plan-over-actual ratio: burning more hours than planned drops below 1.0.
pub struct HoursPerformance;

impl PerformanceCalculator for HoursPerformance {
    fn performance(&self, plan_hours: f64, actual_hours: f64) -> f64 {
        if actual_hours <= 0.0 {
            return 1.0;
        }
        plan_hours / actual_hours
    }
}

pub trait Notifier: Send + Sync {
    fn low_performance_alert(
        &self,
        job_name: &str,
        branch_telegram_group: Option<&str>,
        performance: f64,
    );
}

/// Default sink when no delivery channel is wired up.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn low_performance_alert(
        &self,
        job_name: &str,
        branch_telegram_group: Option<&str>,
        performance: f64,
    ) {
        warn!(
            "low performance on closed job '{}' ({:.2}), telegram group {:?}",
            job_name, performance, branch_telegram_group
        );
    }
}

/// Run the gate for a job that just transitioned to Closed.
pub fn evaluate_closed_job(
    state: &AppState,
    conn: &mut PgConnection,
    job: &Job,
) -> Result<(), ReconcileError> {
    if job.notification_sent {
        return Ok(());
    }

    let regular_hours: Option<BigDecimal> = shifts::table
        .filter(shifts::job_id.eq(job.id))
        .select(diesel::dsl::sum(shifts::hours))
        .first(conn)?;
    let special_hours: Option<BigDecimal> = job_special_shifts::table
        .filter(job_special_shifts::job_id.eq(job.id))
        .select(diesel::dsl::sum(job_special_shifts::hours))
        .first(conn)?;

    let actual = regular_hours.unwrap_or_else(|| BigDecimal::from(0))
        + special_hours.unwrap_or_else(|| BigDecimal::from(0));
    let plan = job.cl_estimated_plan_hours.to_f64().unwrap_or(0.0);
    let actual = actual.to_f64().unwrap_or(0.0);

    let performance = state.performance.performance(plan, actual);
    if performance >= state.config.reconcile.low_performance_threshold {
        info!(
            "job '{}' closed at performance {:.2}, no alert",
            job.name, performance
        );
        return Ok(());
    }

    conn.transaction::<_, ReconcileError, _>(|conn| {
        let telegram_group: Option<String> = branches::table
            .find(job.branch_id)
            .select(branches::telegram_group_id)
            .first::<Option<String>>(conn)
            .optional()?
            .flatten();
        state
            .notifier
            .low_performance_alert(&job.name, telegram_group.as_deref(), performance);
        diesel::update(jobs::table.filter(jobs::id.eq(job.id)))
            .set(jobs::notification_sent.eq(true))
            .execute(conn)?;
        Ok(())
    })
}
