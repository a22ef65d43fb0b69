//! Entity Resolver
//!
//! Maps the free-text names coming off a spreadsheet row onto existing
//! Branch, SalesPerson, CrewMember and Estimate rows. Matching is exact
//! (after normalisation) first, then fuzzy. The creation policy is strict:
//! branches and special shift types may be created on first sighting,
//! people never are — an unresolved crew member becomes a suggestion for a
//! human approver, an unresolved sales person aborts the row.
//!
//! Inactive sales persons and crew members are excluded from every
//! candidate pool and are never reactivated by resolution.

pub mod similarity;

pub use similarity::{normalize_name, similarity, MATCH_THRESHOLD};

use chrono::Utc;
use diesel::prelude::*;
use log::{debug, info};
use std::cmp::Ordering;
use uuid::Uuid;

use crate::shared::cache::StatusCache;
use crate::shared::error::ReconcileError;
use crate::shared::models::{
    Branch, CrewMember, CrewMemberBranch, Estimate, SalesPerson, SalesPersonBranch,
    SpecialShiftType, STATUS_CLOSED,
};
use crate::shared::schema::{
    branches, crew_member_branches, crew_members, estimates, sales_person_branches,
    sales_persons, shifts, special_shift_types,
};

struct Scored<T> {
    row: T,
    score: f64,
    has_contact: bool,
    workload: i64,
    id: Uuid,
}

/// Pick the best-scoring candidate above the acceptance threshold. Ties
/// break on: has a contact channel, then more active work items, then
/// stable id order.
fn pick_best<T>(mut scored: Vec<Scored<T>>) -> Option<T> {
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then(b.has_contact.cmp(&a.has_contact))
            .then(b.workload.cmp(&a.workload))
            .then(a.id.cmp(&b.id))
    });
    scored
        .into_iter()
        .next()
        .filter(|s| s.score > MATCH_THRESHOLD)
        .map(|s| s.row)
}

/// Resolve a branch by exact normalised name. Branch names are a small,
/// controlled set, so there is no fuzzy path: no match creates the branch,
/// more than one match is a configuration problem surfaced to the caller.
pub fn resolve_branch(
    conn: &mut PgConnection,
    name: &str,
) -> Result<Branch, ReconcileError> {
    let wanted = normalize_name(name);
    if wanted.is_empty() {
        return Err(ReconcileError::Validation("empty branch name".into()));
    }

    let all = branches::table.load::<Branch>(conn)?;
    let mut matches: Vec<Branch> = all
        .into_iter()
        .filter(|b| normalize_name(&b.name) == wanted)
        .collect();

    match matches.len() {
        1 => Ok(matches.remove(0)),
        0 => {
            let branch = Branch {
                id: Uuid::new_v4(),
                name: name.trim().to_string(),
                telegram_group_id: None,
                created_at: Utc::now(),
            };
            diesel::insert_into(branches::table)
                .values(&branch)
                .execute(conn)?;
            info!("created branch '{}' on first sighting", branch.name);
            Ok(branch)
        }
        _ => Err(ReconcileError::AmbiguousMatch {
            name: name.to_string(),
            candidates: matches.into_iter().map(|b| b.name).collect(),
        }),
    }
}

/// Resolve an active sales person by exact-then-fuzzy name match. Never
/// creates. On the first resolution of a person with zero branch links,
/// links them to the row's branch; later rows never add further links.
pub fn resolve_sales_person(
    conn: &mut PgConnection,
    statuses: &StatusCache,
    name: &str,
    branch_id: Uuid,
) -> Result<Option<SalesPerson>, ReconcileError> {
    let candidates = sales_persons::table
        .filter(sales_persons::is_active.eq(true))
        .load::<SalesPerson>(conn)?;

    let closed_id = statuses.status_id(conn, STATUS_CLOSED)?;
    let mut scored = Vec::with_capacity(candidates.len());
    for person in candidates {
        let score = similarity(name, &person.name);
        if score <= MATCH_THRESHOLD {
            continue;
        }
        // Workload counts only still-open estimates; closed work says
        // nothing about who is currently active.
        let workload = estimates::table
            .filter(estimates::sales_person_id.eq(person.id))
            .filter(
                estimates::status_id
                    .is_null()
                    .or(estimates::status_id.ne(closed_id)),
            )
            .count()
            .get_result::<i64>(conn)?;
        scored.push(Scored {
            has_contact: person.telegram_id.is_some(),
            workload,
            id: person.id,
            score,
            row: person,
        });
    }

    let Some(person) = pick_best(scored) else {
        debug!("no active sales person matches '{}'", name);
        return Ok(None);
    };

    let links = sales_person_branches::table
        .filter(sales_person_branches::sales_person_id.eq(person.id))
        .count()
        .get_result::<i64>(conn)?;
    if links == 0 {
        diesel::insert_into(sales_person_branches::table)
            .values(&SalesPersonBranch {
                id: Uuid::new_v4(),
                sales_person_id: person.id,
                branch_id,
            })
            .execute(conn)?;
        info!("linked sales person '{}' to their first branch", person.name);
    }

    Ok(Some(person))
}

/// Resolve an active crew member by exact-then-fuzzy name match. Never
/// creates; the caller turns a `None` into a "missing crew member"
/// suggestion. Applies the same first-branch-link rule as sales persons
/// when a row branch is known.
pub fn resolve_crew_member(
    conn: &mut PgConnection,
    name: &str,
    branch_id: Option<Uuid>,
) -> Result<Option<CrewMember>, ReconcileError> {
    let candidates = crew_members::table
        .filter(crew_members::is_active.eq(true))
        .load::<CrewMember>(conn)?;

    let mut scored = Vec::with_capacity(candidates.len());
    for member in candidates {
        let score = similarity(name, &member.name);
        if score <= MATCH_THRESHOLD {
            continue;
        }
        let workload = shifts::table
            .filter(shifts::crew_member_id.eq(member.id))
            .filter(shifts::approved_shift.eq(false))
            .count()
            .get_result::<i64>(conn)?;
        scored.push(Scored {
            has_contact: member.telegram_id.is_some(),
            workload,
            id: member.id,
            score,
            row: member,
        });
    }

    let Some(member) = pick_best(scored) else {
        debug!("no active crew member matches '{}'", name);
        return Ok(None);
    };

    if let Some(branch_id) = branch_id {
        let links = crew_member_branches::table
            .filter(crew_member_branches::crew_member_id.eq(member.id))
            .count()
            .get_result::<i64>(conn)?;
        if links == 0 {
            diesel::insert_into(crew_member_branches::table)
                .values(&CrewMemberBranch {
                    id: Uuid::new_v4(),
                    crew_member_id: member.id,
                    branch_id,
                })
                .execute(conn)?;
        }
    }

    Ok(Some(member))
}

/// Resolve the estimate backing a job by exact-then-fuzzy match on the job
/// name. Missing estimates are allowed; the controller may create a
/// stand-in when branch and sales person resolved unambiguously.
pub fn resolve_estimate(
    conn: &mut PgConnection,
    job_name: &str,
) -> Result<Option<Estimate>, ReconcileError> {
    let candidates = estimates::table.load::<Estimate>(conn)?;

    let scored = candidates
        .into_iter()
        .filter_map(|estimate| {
            let score = similarity(job_name, &estimate.name);
            (score > MATCH_THRESHOLD).then(|| Scored {
                has_contact: false,
                workload: 0,
                id: estimate.id,
                score,
                row: estimate,
            })
        })
        .collect();

    Ok(pick_best(scored))
}

/// Special shift types, unlike people, are auto-creatable.
pub fn find_or_create_special_shift(
    conn: &mut PgConnection,
    name: &str,
) -> Result<SpecialShiftType, ReconcileError> {
    let wanted = normalize_name(name);
    let existing = special_shift_types::table
        .load::<SpecialShiftType>(conn)?
        .into_iter()
        .find(|t| normalize_name(&t.name) == wanted);

    if let Some(found) = existing {
        return Ok(found);
    }

    let created = SpecialShiftType {
        id: Uuid::new_v4(),
        name: name.trim().to_string(),
    };
    diesel::insert_into(special_shift_types::table)
        .values(&created)
        .execute(conn)?;
    info!("created special shift type '{}'", created.name);
    Ok(created)
}
