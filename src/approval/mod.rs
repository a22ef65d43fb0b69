//! Shift Approval
//!
//! Shifts are persisted as suggestions (`approved_shift = false`) and only
//! a human approval batch moves them on: approve flips the flag, reject
//! deletes the row. Both transitions are idempotent no-ops on anything not
//! currently suggested. After every batch the closure rule runs per touched
//! job: a job with zero unapproved regular and special shifts transitions
//! to the terminal Closed status. The pending-count read and the status
//! write share one transaction with the job row locked, so two concurrent
//! batches cannot both observe "zero pending" and double-close.

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use bigdecimal::BigDecimal;
use chrono::Utc;
use diesel::prelude::*;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::notify;
use crate::shared::cache::StatusCache;
use crate::shared::error::ReconcileError;
use crate::shared::models::{Job, STATUS_CLOSED};
use crate::shared::schema::{crew_members, job_special_shifts, jobs, shifts, special_shift_types};
use crate::shared::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ShiftKey {
    pub crew_member_id: Uuid,
    pub job_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct SpecialShiftKey {
    pub special_shift_id: Uuid,
    pub job_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ApprovalBatch {
    #[serde(default)]
    pub shifts: Vec<ShiftKey>,
    #[serde(default)]
    pub special_shifts: Vec<SpecialShiftKey>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalResponse {
    pub shifts: usize,
    pub special_shifts: usize,
    pub jobs_closed: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct PendingQuery {
    pub branch_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingShift {
    pub crew_member_id: Uuid,
    pub crew_member_name: String,
    pub hours: BigDecimal,
    pub is_leader: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSpecialShift {
    pub special_shift_id: Uuid,
    pub special_shift_name: String,
    pub hours: BigDecimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingJob {
    pub job_id: Uuid,
    pub job_name: String,
    pub branch_id: Uuid,
    pub shifts: Vec<PendingShift>,
    pub special_shifts: Vec<PendingSpecialShift>,
}

pub fn configure_approval_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/approval/approve", post(approve))
        .route("/api/approval/reject", post(reject))
        .route("/api/approval/pending", get(pending))
}

pub async fn approve(
    State(state): State<Arc<AppState>>,
    Json(batch): Json<ApprovalBatch>,
) -> Result<Json<ApprovalResponse>, ReconcileError> {
    let mut conn = state.conn.get()?;

    let (approved, approved_special) =
        conn.transaction::<_, ReconcileError, _>(|conn| apply_approvals(conn, &batch))?;

    let jobs_closed = run_closure_checks(&state, &mut conn, touched_jobs(&batch))?;
    info!(
        "approved {} shifts, {} special shifts, closed {} jobs",
        approved,
        approved_special,
        jobs_closed.len()
    );
    Ok(Json(ApprovalResponse {
        shifts: approved,
        special_shifts: approved_special,
        jobs_closed,
    }))
}

pub async fn reject(
    State(state): State<Arc<AppState>>,
    Json(batch): Json<ApprovalBatch>,
) -> Result<Json<ApprovalResponse>, ReconcileError> {
    let mut conn = state.conn.get()?;

    let (rejected, rejected_special) =
        conn.transaction::<_, ReconcileError, _>(|conn| apply_rejections(conn, &batch))?;

    let jobs_closed = run_closure_checks(&state, &mut conn, touched_jobs(&batch))?;
    info!(
        "rejected {} shifts, {} special shifts, closed {} jobs",
        rejected,
        rejected_special,
        jobs_closed.len()
    );
    Ok(Json(ApprovalResponse {
        shifts: rejected,
        special_shifts: rejected_special,
        jobs_closed,
    }))
}

/// Flip suggested shifts to approved. Pairs that are not currently
/// suggested are no-ops, so replaying a batch is harmless.
pub fn apply_approvals(
    conn: &mut PgConnection,
    batch: &ApprovalBatch,
) -> Result<(usize, usize), ReconcileError> {
    let mut approved = 0usize;
    for key in &batch.shifts {
        approved += diesel::update(
            shifts::table
                .filter(shifts::job_id.eq(key.job_id))
                .filter(shifts::crew_member_id.eq(key.crew_member_id))
                .filter(shifts::approved_shift.eq(false)),
        )
        .set(shifts::approved_shift.eq(true))
        .execute(conn)?;
    }
    let mut approved_special = 0usize;
    for key in &batch.special_shifts {
        approved_special += diesel::update(
            job_special_shifts::table
                .filter(job_special_shifts::job_id.eq(key.job_id))
                .filter(job_special_shifts::special_shift_id.eq(key.special_shift_id))
                .filter(job_special_shifts::approved_shift.eq(false)),
        )
        .set(job_special_shifts::approved_shift.eq(true))
        .execute(conn)?;
    }
    Ok((approved, approved_special))
}

/// Delete suggested shifts. Rejection only removes suggestions; approved
/// shifts stay untouched.
pub fn apply_rejections(
    conn: &mut PgConnection,
    batch: &ApprovalBatch,
) -> Result<(usize, usize), ReconcileError> {
    let mut rejected = 0usize;
    for key in &batch.shifts {
        rejected += diesel::delete(
            shifts::table
                .filter(shifts::job_id.eq(key.job_id))
                .filter(shifts::crew_member_id.eq(key.crew_member_id))
                .filter(shifts::approved_shift.eq(false)),
        )
        .execute(conn)?;
    }
    let mut rejected_special = 0usize;
    for key in &batch.special_shifts {
        rejected_special += diesel::delete(
            job_special_shifts::table
                .filter(job_special_shifts::job_id.eq(key.job_id))
                .filter(job_special_shifts::special_shift_id.eq(key.special_shift_id))
                .filter(job_special_shifts::approved_shift.eq(false)),
        )
        .execute(conn)?;
    }
    Ok((rejected, rejected_special))
}

pub fn touched_jobs(batch: &ApprovalBatch) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = batch
        .shifts
        .iter()
        .map(|key| key.job_id)
        .chain(batch.special_shifts.iter().map(|key| key.job_id))
        .collect();
    ids.sort();
    ids.dedup();
    ids
}

fn run_closure_checks(
    state: &Arc<AppState>,
    conn: &mut PgConnection,
    job_ids: Vec<Uuid>,
) -> Result<Vec<String>, ReconcileError> {
    let mut closed = Vec::new();
    for job_id in job_ids {
        if let Some(job) = close_job_if_complete(conn, &state.statuses, job_id)? {
            notify::evaluate_closed_job(state, conn, &job)?;
            closed.push(job.name);
        }
    }
    Ok(closed)
}

/// Transition one job to Closed when it has nothing left to approve. Reads
/// the pending counts and writes the status in one transaction with the
/// job row locked, and only ever transitions Open → Closed once.
pub fn close_job_if_complete(
    conn: &mut PgConnection,
    statuses: &StatusCache,
    job_id: Uuid,
) -> Result<Option<Job>, ReconcileError> {
    conn.transaction::<_, ReconcileError, _>(|conn| {
        let Some(mut job) = jobs::table
            .find(job_id)
            .for_update()
            .first::<Job>(conn)
            .optional()?
        else {
            return Ok(None);
        };

        let closed_id = statuses.status_id(conn, STATUS_CLOSED)?;
        if job.status_id == closed_id {
            return Ok(None);
        }

        let pending_regular: i64 = shifts::table
            .filter(shifts::job_id.eq(job_id))
            .filter(shifts::approved_shift.eq(false))
            .count()
            .get_result(conn)?;
        let pending_special: i64 = job_special_shifts::table
            .filter(job_special_shifts::job_id.eq(job_id))
            .filter(job_special_shifts::approved_shift.eq(false))
            .count()
            .get_result(conn)?;
        if pending_regular > 0 || pending_special > 0 {
            return Ok(None);
        }

        let now = Utc::now();
        let closing_date = job.closing_date.unwrap_or(now);
        diesel::update(jobs::table.filter(jobs::id.eq(job_id)))
            .set((
                jobs::status_id.eq(closed_id),
                jobs::closing_date.eq(Some(closing_date)),
                jobs::updated_at.eq(now),
            ))
            .execute(conn)?;
        info!("job '{}' closed, all shifts approved", job.name);

        job.status_id = closed_id;
        job.closing_date = Some(closing_date);
        job.updated_at = now;
        Ok(Some(job))
    })
}

/// Unapproved shifts grouped by job, optionally filtered by branch, for
/// the human approval UI.
pub async fn pending(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PendingQuery>,
) -> Result<Json<Vec<PendingJob>>, ReconcileError> {
    let mut conn = state.conn.get()?;

    let mut regular_query = shifts::table
        .inner_join(jobs::table)
        .inner_join(crew_members::table)
        .select((
            jobs::id,
            jobs::name,
            jobs::branch_id,
            crew_members::id,
            crew_members::name,
            shifts::hours,
            shifts::is_leader,
        ))
        .into_boxed();
    regular_query = regular_query.filter(shifts::approved_shift.eq(false));
    if let Some(branch_id) = query.branch_id {
        regular_query = regular_query.filter(jobs::branch_id.eq(branch_id));
    }
    let regular: Vec<(Uuid, String, Uuid, Uuid, String, BigDecimal, bool)> =
        regular_query.load(&mut conn)?;

    let mut special_query = job_special_shifts::table
        .inner_join(jobs::table)
        .inner_join(special_shift_types::table)
        .select((
            jobs::id,
            jobs::name,
            jobs::branch_id,
            special_shift_types::id,
            special_shift_types::name,
            job_special_shifts::hours,
        ))
        .into_boxed();
    special_query = special_query.filter(job_special_shifts::approved_shift.eq(false));
    if let Some(branch_id) = query.branch_id {
        special_query = special_query.filter(jobs::branch_id.eq(branch_id));
    }
    let special: Vec<(Uuid, String, Uuid, Uuid, String, BigDecimal)> =
        special_query.load(&mut conn)?;

    let mut grouped: HashMap<Uuid, PendingJob> = HashMap::new();
    for (job_id, job_name, branch_id, member_id, member_name, hours, is_leader) in regular {
        grouped
            .entry(job_id)
            .or_insert_with(|| PendingJob {
                job_id,
                job_name,
                branch_id,
                shifts: Vec::new(),
                special_shifts: Vec::new(),
            })
            .shifts
            .push(PendingShift {
                crew_member_id: member_id,
                crew_member_name: member_name,
                hours,
                is_leader,
            });
    }
    for (job_id, job_name, branch_id, special_id, special_name, hours) in special {
        grouped
            .entry(job_id)
            .or_insert_with(|| PendingJob {
                job_id,
                job_name,
                branch_id,
                shifts: Vec::new(),
                special_shifts: Vec::new(),
            })
            .special_shifts
            .push(PendingSpecialShift {
                special_shift_id: special_id,
                special_shift_name: special_name,
                hours,
            });
    }

    let mut result: Vec<PendingJob> = grouped.into_values().collect();
    result.sort_by(|a, b| a.job_name.cmp(&b.job_name));
    Ok(Json(result))
}
