//! Timesheet Row Processing
//!
//! The reconciliation controller. One call maps a raw spreadsheet row onto
//! the relational model: decode the row through the sheet's column map,
//! resolve Branch / SalesPerson / Estimate / CrewMembers, extract shift
//! candidates, and persist the whole result atomically. Every shift lands
//! unapproved; reprocessing a row for a job replaces its entire candidate
//! set and revokes any prior approvals, so a re-synced job always goes back
//! through human review.

pub mod extractor;

pub use extractor::{extract_shifts, ExtractedShifts, ShiftCandidate};

use axum::{extract::State, routing::post, Json, Router};
use bigdecimal::BigDecimal;
use chrono::Utc;
use diesel::prelude::*;
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::columnmap::{self, RawRow};
use crate::resolver;
use crate::shared::cache::StatusCache;
use crate::shared::error::ReconcileError;
use crate::shared::models::{Estimate, Job, JobSpecialShift, Shift, STATUS_CLOSED, STATUS_OPEN};
use crate::shared::schema::{estimates, job_special_shifts, jobs, shifts};
use crate::shared::state::AppState;

static CREW_LEAD_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^crew\s*lead(?:er)?\s*:?\s*").expect("valid regex"));

#[derive(Debug, Deserialize)]
pub struct ProcessRowRequest {
    pub sheet_name: String,
    pub row_data: RawRow,
    pub row_number: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRowResponse {
    pub success: bool,
    pub job_id: Uuid,
    pub job_name: String,
    pub crew_leader: Option<PersonSummary>,
    pub estimate: Option<EstimateSummary>,
    pub crew_members: Vec<CrewMemberHours>,
    pub suggestions: Suggestions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonSummary {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateSummary {
    pub id: Uuid,
    pub name: String,
    pub attic_hours: BigDecimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrewMemberHours {
    pub id: Uuid,
    pub hours: BigDecimal,
    pub is_leader: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestions {
    pub missing_crew_members: Vec<MissingCrewMember>,
    pub suggested_shifts: Vec<SuggestedShift>,
    pub requires_approval: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingCrewMember {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub suggested_hours: BigDecimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedShift {
    pub name: String,
    pub hours: BigDecimal,
    pub kind: String,
}

pub fn configure_timesheet_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/timesheet/row", post(process_row))
}

/// Case-insensitive substring lookup over the transformed field map.
fn find_field<'a>(fields: &'a HashMap<String, String>, needle: &str) -> Option<&'a str> {
    fields
        .iter()
        .find(|(key, _)| key.to_lowercase().contains(needle))
        .map(|(_, value)| value.as_str())
}

/// Crew leader cells are typed as "Crew Lead: Alice" on some sheets.
fn clean_leader_name(raw: &str) -> String {
    CREW_LEAD_PREFIX.replace(raw, "").trim().to_string()
}

pub async fn process_row(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProcessRowRequest>,
) -> Result<Json<ProcessRowResponse>, ReconcileError> {
    let mut conn = state.conn.get()?;
    let response = conn.transaction::<_, ReconcileError, _>(|conn| {
        reconcile_row(
            conn,
            &state.statuses,
            state.config.reconcile.allow_legacy_special_columns,
            &req,
        )
    })?;
    info!(
        "row {} of sheet '{}' reconciled into job '{}' ({} shifts, {} missing)",
        req.row_number,
        req.sheet_name,
        response.job_name,
        response.crew_members.len(),
        response.suggestions.missing_crew_members.len()
    );
    Ok(Json(response))
}

/// The whole per-row pipeline, inside one transaction: resolution writes
/// (branch auto-create, first branch links), the job upsert, and the shift
/// replacement either all land or none do.
pub fn reconcile_row(
    conn: &mut PgConnection,
    statuses: &StatusCache,
    allow_legacy: bool,
    req: &ProcessRowRequest,
) -> Result<ProcessRowResponse, ReconcileError> {
    let map = columnmap::sheet_map(conn, &req.sheet_name)?;
    if map.is_empty() {
        return Err(ReconcileError::Validation(format!(
            "no column map configured for sheet '{}'",
            req.sheet_name
        )));
    }

    let cells = req.row_data.clone().into_cells();
    let fields = columnmap::transform_row(&cells, &map);

    let job_name = find_field(&fields, "job name")
        .map(str::to_string)
        .ok_or_else(|| {
            ReconcileError::Validation(format!(
                "row {} of sheet '{}' has no Job Name",
                req.row_number, req.sheet_name
            ))
        })?;

    // The sheet is named after the branch it belongs to.
    let branch = resolver::resolve_branch(conn, &req.sheet_name)?;

    let estimate = resolve_or_create_estimate(conn, statuses, &branch.id, &fields, &job_name)?;

    // Crew leader: resolve the name from the leader cell when present.
    let leader_raw = find_field(&fields, "crew lead").map(clean_leader_name);
    let mut missing: Vec<MissingCrewMember> = Vec::new();
    let crew_leader = match leader_raw.as_deref() {
        Some(name) if !name.is_empty() => {
            resolver::resolve_crew_member(conn, name, Some(branch.id))?
        }
        _ => None,
    };

    let leader_match_name = crew_leader
        .as_ref()
        .map(|l| l.name.clone())
        .or_else(|| leader_raw.clone());
    let extracted = extract_shifts(&map, &fields, leader_match_name.as_deref(), allow_legacy)?;

    let plan_hours = estimate
        .as_ref()
        .map(|e| e.attic_hours.clone())
        .unwrap_or_else(|| BigDecimal::from(0));

    // Resolve the regular crew columns; unresolved headers become
    // suggestions, never new people. A header that fuzzy-resolves to the
    // crew leader is their own column under a typo'd name, so its hours
    // are the leader hours, not a regular shift.
    let mut leader_column_hours = extracted.leader_hours.clone();
    let mut resolved_regular: Vec<(Uuid, BigDecimal)> = Vec::new();
    for candidate in &extracted.regular {
        match resolver::resolve_crew_member(conn, &candidate.header, Some(branch.id))? {
            Some(member) if Some(member.id) == crew_leader.as_ref().map(|l| l.id) => {
                if leader_column_hours.is_none() {
                    leader_column_hours = Some(candidate.hours.clone());
                }
            }
            Some(member) => resolved_regular.push((member.id, candidate.hours.clone())),
            None => missing.push(MissingCrewMember {
                name: candidate.header.clone(),
                kind: "crew_member".into(),
                suggested_hours: candidate.hours.clone(),
            }),
        }
    }

    // Leader hours: own column when the sheet has one, else the estimate's
    // planned crew-leader hours.
    let leader_hours = leader_column_hours.unwrap_or_else(|| plan_hours.clone());

    if crew_leader.is_none() {
        if let Some(name) = leader_raw.as_deref().filter(|n| !n.is_empty()) {
            missing.push(MissingCrewMember {
                name: name.to_string(),
                kind: "crew_member".into(),
                suggested_hours: leader_hours.clone(),
            });
        }
    }

    let mut special_rows: Vec<(Uuid, BigDecimal)> = Vec::new();
    for candidate in &extracted.special {
        let kind = resolver::find_or_create_special_shift(conn, &candidate.header)?;
        special_rows.push((kind.id, candidate.hours.clone()));
    }

    let job = upsert_job(
        conn,
        statuses,
        &job_name,
        branch.id,
        estimate.as_ref(),
        crew_leader.as_ref().map(|l| l.id),
        &leader_hours,
        &plan_hours,
    )?;

    replace_shifts(
        conn,
        job.id,
        crew_leader.as_ref().map(|l| (l.id, leader_hours.clone())),
        &resolved_regular,
        &special_rows,
    )?;

    let mut crew_members: Vec<CrewMemberHours> = Vec::new();
    let mut suggested_shifts: Vec<SuggestedShift> = Vec::new();
    if let Some(leader) = &crew_leader {
        crew_members.push(CrewMemberHours {
            id: leader.id,
            hours: leader_hours.clone(),
            is_leader: true,
        });
        suggested_shifts.push(SuggestedShift {
            name: leader.name.clone(),
            hours: leader_hours.clone(),
            kind: "regular".into(),
        });
    }
    for (member_id, hours) in &resolved_regular {
        crew_members.push(CrewMemberHours {
            id: *member_id,
            hours: hours.clone(),
            is_leader: false,
        });
    }
    for candidate in &extracted.regular {
        suggested_shifts.push(SuggestedShift {
            name: candidate.header.clone(),
            hours: candidate.hours.clone(),
            kind: "regular".into(),
        });
    }
    for candidate in &extracted.special {
        suggested_shifts.push(SuggestedShift {
            name: candidate.header.clone(),
            hours: candidate.hours.clone(),
            kind: "special".into(),
        });
    }

    let requires_approval = !crew_members.is_empty() || !special_rows.is_empty() || !missing.is_empty();

    Ok(ProcessRowResponse {
        success: true,
        job_id: job.id,
        job_name,
        crew_leader: crew_leader.map(|l| PersonSummary {
            id: l.id,
            name: l.name,
        }),
        estimate: estimate.map(|e| EstimateSummary {
            id: e.id,
            name: e.name,
            attic_hours: e.attic_hours,
        }),
        crew_members,
        suggestions: Suggestions {
            missing_crew_members: missing,
            suggested_shifts,
            requires_approval,
        },
    })
}

/// Look up the estimate backing this job. When none exists, a minimal
/// stand-in is created only if both a branch and a sales person resolved
/// unambiguously; otherwise the row is rejected, because an estimate
/// cannot exist without a sales person.
fn resolve_or_create_estimate(
    conn: &mut PgConnection,
    statuses: &StatusCache,
    branch_id: &Uuid,
    fields: &HashMap<String, String>,
    job_name: &str,
) -> Result<Option<Estimate>, ReconcileError> {
    if let Some(found) = resolver::resolve_estimate(conn, job_name)? {
        // Keep the branch-link side effect for the named sales person even
        // when the estimate already exists.
        if let Some(name) = find_field(fields, "sales") {
            resolver::resolve_sales_person(conn, statuses, name, *branch_id)?;
        }
        return Ok(Some(found));
    }

    let Some(sales_name) = find_field(fields, "sales") else {
        return Err(ReconcileError::MissingEntity {
            entity: "sales person".into(),
            name: format!("(none on row for job '{job_name}')"),
        });
    };
    let Some(sales_person) =
        resolver::resolve_sales_person(conn, statuses, sales_name, *branch_id)?
    else {
        return Err(ReconcileError::MissingEntity {
            entity: "sales person".into(),
            name: sales_name.to_string(),
        });
    };

    let stand_in = Estimate {
        id: Uuid::new_v4(),
        name: job_name.to_string(),
        branch_id: *branch_id,
        sales_person_id: sales_person.id,
        status_id: None,
        attic_hours: BigDecimal::from(0),
        created_at: Utc::now(),
    };
    diesel::insert_into(estimates::table)
        .values(&stand_in)
        .execute(conn)?;
    info!("created stand-in estimate for job '{}'", job_name);
    Ok(Some(stand_in))
}

#[allow(clippy::too_many_arguments)]
fn upsert_job(
    conn: &mut PgConnection,
    statuses: &StatusCache,
    job_name: &str,
    branch_id: Uuid,
    estimate: Option<&Estimate>,
    crew_leader_id: Option<Uuid>,
    leader_hours: &BigDecimal,
    plan_hours: &BigDecimal,
) -> Result<Job, ReconcileError> {
    let open_id = statuses.status_id(conn, STATUS_OPEN)?;
    let closed_id = statuses.status_id(conn, STATUS_CLOSED)?;
    let now = Utc::now();

    let existing: Option<Job> = jobs::table
        .filter(jobs::name.eq(job_name))
        .for_update()
        .first::<Job>(conn)
        .optional()?;

    match existing {
        Some(mut job) => {
            // Reprocessing revokes approval: a closed job reopens so it has
            // to pass the approval gate again.
            let status_id = if job.status_id == closed_id {
                open_id
            } else {
                job.status_id
            };
            diesel::update(jobs::table.filter(jobs::id.eq(job.id)))
                .set((
                    jobs::branch_id.eq(branch_id),
                    jobs::estimate_id.eq(estimate.map(|e| e.id)),
                    jobs::crew_leader_id.eq(crew_leader_id),
                    jobs::crew_leader_hours.eq(leader_hours),
                    jobs::cl_estimated_plan_hours.eq(plan_hours),
                    jobs::status_id.eq(status_id),
                    jobs::updated_at.eq(now),
                ))
                .execute(conn)?;
            job.branch_id = branch_id;
            job.estimate_id = estimate.map(|e| e.id);
            job.crew_leader_id = crew_leader_id;
            job.crew_leader_hours = leader_hours.clone();
            job.cl_estimated_plan_hours = plan_hours.clone();
            job.status_id = status_id;
            job.updated_at = now;
            Ok(job)
        }
        None => {
            let job = Job {
                id: Uuid::new_v4(),
                name: job_name.to_string(),
                branch_id,
                estimate_id: estimate.map(|e| e.id),
                crew_leader_id,
                crew_leader_hours: leader_hours.clone(),
                cl_estimated_plan_hours: plan_hours.clone(),
                closing_date: None,
                status_id: open_id,
                notification_sent: false,
                created_at: now,
                updated_at: now,
            };
            diesel::insert_into(jobs::table).values(&job).execute(conn)?;
            Ok(job)
        }
    }
}

/// Delete-then-reinsert the job's whole candidate set. Every inserted row
/// is unapproved regardless of what was approved before.
fn replace_shifts(
    conn: &mut PgConnection,
    job_id: Uuid,
    leader: Option<(Uuid, BigDecimal)>,
    regular: &[(Uuid, BigDecimal)],
    special: &[(Uuid, BigDecimal)],
) -> Result<(), ReconcileError> {
    diesel::delete(shifts::table.filter(shifts::job_id.eq(job_id))).execute(conn)?;
    diesel::delete(job_special_shifts::table.filter(job_special_shifts::job_id.eq(job_id)))
        .execute(conn)?;

    let now = Utc::now();
    let mut rows: Vec<Shift> = Vec::with_capacity(regular.len() + 1);
    if let Some((leader_id, hours)) = leader {
        rows.push(Shift {
            id: Uuid::new_v4(),
            job_id,
            crew_member_id: leader_id,
            hours,
            is_leader: true,
            approved_shift: false,
            created_at: now,
        });
    }
    for (member_id, hours) in regular {
        // The leader's own column never reaches the regular list, but a
        // duplicate header in the sheet could; one row per member wins.
        if rows.iter().any(|r| r.crew_member_id == *member_id) {
            continue;
        }
        rows.push(Shift {
            id: Uuid::new_v4(),
            job_id,
            crew_member_id: *member_id,
            hours: hours.clone(),
            is_leader: false,
            approved_shift: false,
            created_at: now,
        });
    }
    if !rows.is_empty() {
        diesel::insert_into(shifts::table).values(&rows).execute(conn)?;
    }

    let mut special_rows: Vec<JobSpecialShift> = Vec::with_capacity(special.len());
    for (special_id, hours) in special {
        if special_rows.iter().any(|r| r.special_shift_id == *special_id) {
            continue;
        }
        special_rows.push(JobSpecialShift {
            id: Uuid::new_v4(),
            job_id,
            special_shift_id: *special_id,
            hours: hours.clone(),
            approved_shift: false,
            created_at: now,
        });
    }
    if !special_rows.is_empty() {
        diesel::insert_into(job_special_shifts::table)
            .values(&special_rows)
            .execute(conn)?;
    }

    Ok(())
}
