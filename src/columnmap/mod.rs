//! Column Map Module
//!
//! Persists, per sheet name, the ordered mapping from spreadsheet column
//! positions to named fields. The map is produced by an external admin sync
//! step and replaced wholesale whenever a sheet header changes; the
//! reconciliation pipeline only ever reads it ordered by column index.

pub mod row;

pub use row::{RawRow, transform_row};

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use diesel::prelude::*;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::shared::error::ReconcileError;
use crate::shared::schema::column_maps;
use crate::shared::state::AppState;

/// Column kinds: a named field consumed by the controller, or a per-person
/// crew column whose header is the crew member's display name.
pub const KIND_FIELD: &str = "field";
pub const KIND_CREW_MEMBER: &str = "crew_member";

/// Sentinel headers that delimit the crew-hours and special-shift column
/// ranges. Located by case-insensitive substring match on the field name.
pub const SENTINEL_TECH_HOURS: &str = "techs hours";
pub const SENTINEL_UNBILLABLE: &str = "unbillable job hours";
pub const SENTINEL_JOB_TOTALS: &str = "job totals";

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = column_maps)]
pub struct ColumnMap {
    pub id: Uuid,
    pub sheet_name: String,
    pub field_name: String,
    pub column_index: i32,
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub struct ColumnMapEntry {
    pub field_name: String,
    pub column_index: i32,
    #[serde(default)]
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SyncColumnMapRequest {
    pub sheet_name: String,
    pub entries: Vec<ColumnMapEntry>,
}

#[derive(Debug, Serialize)]
pub struct SyncColumnMapResponse {
    pub sheet_name: String,
    pub inserted: usize,
}

pub fn configure_columnmap_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/columnmap/sync", post(sync_column_map))
        .route("/api/columnmap/:sheet", get(get_sheet_map))
}

/// Position of a sentinel field within a sheet map, if present.
pub fn sentinel_index(map: &[ColumnMap], needle: &str) -> Option<i32> {
    map.iter()
        .find(|entry| entry.field_name.to_lowercase().contains(needle))
        .map(|entry| entry.column_index)
}

/// Validate the sentinel ordering of a freshly synced map. The extractor
/// relies on `Techs hours < Unbillable Job Hours < Job Totals`; a map that
/// violates it only passes when the legacy allow-list fallback is enabled.
pub fn validate_sentinel_order(
    map: &[ColumnMap],
    allow_legacy: bool,
) -> Result<(), ReconcileError> {
    let tech = sentinel_index(map, SENTINEL_TECH_HOURS);
    let unbillable = sentinel_index(map, SENTINEL_UNBILLABLE);
    let totals = sentinel_index(map, SENTINEL_JOB_TOTALS);

    match (tech, unbillable, totals) {
        (Some(t), Some(u), Some(j)) if t < u && u < j => Ok(()),
        (Some(_), Some(u), Some(j)) if allow_legacy && u > j => {
            warn!(
                "sheet map has unbillable column {} after job totals {}; \
                 special shifts will fall back to the known-type allow-list",
                u, j
            );
            Ok(())
        }
        (Some(t), Some(u), Some(j)) => Err(ReconcileError::Validation(format!(
            "sentinel columns out of order: techs hours={t}, unbillable={u}, job totals={j}"
        ))),
        _ => Err(ReconcileError::Validation(
            "column map is missing one of the sentinel headers \
             (Techs hours / Unbillable Job Hours / Job Totals)"
                .into(),
        )),
    }
}

/// Fetch a sheet's map ordered by column index.
pub fn sheet_map(
    conn: &mut PgConnection,
    sheet: &str,
) -> Result<Vec<ColumnMap>, ReconcileError> {
    Ok(column_maps::table
        .filter(column_maps::sheet_name.eq(sheet))
        .order(column_maps::column_index.asc())
        .load::<ColumnMap>(conn)?)
}

/// Replace the whole map for one sheet inside a single transaction.
/// Partial patches are never applied; the admin sync always sends the
/// complete header row.
pub fn replace_sheet_map(
    conn: &mut PgConnection,
    sheet: &str,
    entries: &[ColumnMapEntry],
    allow_legacy: bool,
) -> Result<usize, ReconcileError> {
    let rows: Vec<ColumnMap> = entries
        .iter()
        .map(|entry| ColumnMap {
            id: Uuid::new_v4(),
            sheet_name: sheet.to_string(),
            field_name: entry.field_name.trim().to_string(),
            column_index: entry.column_index,
            kind: entry
                .kind
                .clone()
                .unwrap_or_else(|| KIND_FIELD.to_string()),
        })
        .collect();

    validate_sentinel_order(&rows, allow_legacy)?;

    conn.transaction::<_, ReconcileError, _>(|conn| {
        diesel::delete(column_maps::table.filter(column_maps::sheet_name.eq(sheet)))
            .execute(conn)?;
        diesel::insert_into(column_maps::table)
            .values(&rows)
            .execute(conn)?;
        Ok(rows.len())
    })
}

pub async fn sync_column_map(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SyncColumnMapRequest>,
) -> Result<Json<SyncColumnMapResponse>, ReconcileError> {
    let mut conn = state.conn.get()?;
    let inserted = replace_sheet_map(
        &mut conn,
        &req.sheet_name,
        &req.entries,
        state.config.reconcile.allow_legacy_special_columns,
    )?;
    info!("column map for sheet '{}' replaced, {} columns", req.sheet_name, inserted);
    Ok(Json(SyncColumnMapResponse {
        sheet_name: req.sheet_name,
        inserted,
    }))
}

pub async fn get_sheet_map(
    State(state): State<Arc<AppState>>,
    Path(sheet): Path<String>,
) -> Result<Json<Vec<ColumnMap>>, ReconcileError> {
    let mut conn = state.conn.get()?;
    Ok(Json(sheet_map(&mut conn, &sheet)?))
}
