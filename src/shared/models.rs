use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::schema::{
    branches, crew_member_branches, crew_members, estimates, job_special_shifts, job_statuses,
    jobs, sales_person_branches, sales_persons, shifts, special_shift_types,
};

/// Job status names seeded by the migrations. Matching is by name through
/// the [`StatusCache`](crate::shared::cache::StatusCache), never by raw id.
pub const STATUS_OPEN: &str = "Open";
pub const STATUS_CLOSED: &str = "Closed";

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = job_statuses)]
pub struct JobStatus {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = branches)]
pub struct Branch {
    pub id: Uuid,
    pub name: String,
    pub telegram_group_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = sales_persons)]
pub struct SalesPerson {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub telegram_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = sales_person_branches)]
pub struct SalesPersonBranch {
    pub id: Uuid,
    pub sales_person_id: Uuid,
    pub branch_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = crew_members)]
pub struct CrewMember {
    pub id: Uuid,
    pub name: String,
    pub is_leader: bool,
    pub is_active: bool,
    pub telegram_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = crew_member_branches)]
pub struct CrewMemberBranch {
    pub id: Uuid,
    pub crew_member_id: Uuid,
    pub branch_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = estimates)]
pub struct Estimate {
    pub id: Uuid,
    pub name: String,
    pub branch_id: Uuid,
    pub sales_person_id: Uuid,
    pub status_id: Option<Uuid>,
    pub attic_hours: BigDecimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = jobs)]
pub struct Job {
    pub id: Uuid,
    pub name: String,
    pub branch_id: Uuid,
    pub estimate_id: Option<Uuid>,
    pub crew_leader_id: Option<Uuid>,
    pub crew_leader_hours: BigDecimal,
    pub cl_estimated_plan_hours: BigDecimal,
    pub closing_date: Option<DateTime<Utc>>,
    pub status_id: Uuid,
    pub notification_sent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = shifts)]
pub struct Shift {
    pub id: Uuid,
    pub job_id: Uuid,
    pub crew_member_id: Uuid,
    pub hours: BigDecimal,
    pub is_leader: bool,
    pub approved_shift: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = special_shift_types)]
pub struct SpecialShiftType {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = job_special_shifts)]
pub struct JobSpecialShift {
    pub id: Uuid,
    pub job_id: Uuid,
    pub special_shift_id: Uuid,
    pub hours: BigDecimal,
    pub approved_shift: bool,
    pub created_at: DateTime<Utc>,
}
