//! Shift extraction from a transformed row.
//!
//! The sheet layout is position dependent: person columns sit between the
//! "Techs hours" and "Unbillable Job Hours" headers, special-shift columns
//! between "Unbillable Job Hours" and "Job Totals". Extraction works purely
//! on the column map and the decoded field values; resolving headers to
//! crew members happens later in the controller.

use bigdecimal::BigDecimal;
use log::warn;
use std::collections::HashMap;

use crate::columnmap::{
    sentinel_index, ColumnMap, SENTINEL_JOB_TOTALS, SENTINEL_TECH_HOURS, SENTINEL_UNBILLABLE,
};
use crate::resolver::normalize_name;
use crate::shared::error::ReconcileError;
use crate::shared::utils::parse_hours;

/// Special shift type names recognised by the legacy fallback when the
/// sentinel columns are misordered and position cannot be trusted.
pub const KNOWN_SPECIAL_SHIFT_TYPES: &[&str] = &[
    "Quality Control Visit",
    "Rework",
    "Training",
    "Warehouse",
];

#[derive(Debug, Clone, PartialEq)]
pub struct ShiftCandidate {
    /// Column header: a person's display name for regular candidates, a
    /// special shift type name for special ones.
    pub header: String,
    pub hours: BigDecimal,
}

#[derive(Debug, Default)]
pub struct ExtractedShifts {
    pub regular: Vec<ShiftCandidate>,
    pub special: Vec<ShiftCandidate>,
    /// Hours from the crew leader's own column, when the sheet has one.
    pub leader_hours: Option<BigDecimal>,
}

/// Partition the mapped columns into regular and special shift candidates.
/// Cells that are empty, unparsable or zero produce no candidate. The
/// column whose header names the already-resolved crew leader is excluded
/// from the regular list and feeds `leader_hours` instead, so leader hours
/// are never double counted.
pub fn extract_shifts(
    map: &[ColumnMap],
    fields: &HashMap<String, String>,
    crew_leader_name: Option<&str>,
    allow_legacy: bool,
) -> Result<ExtractedShifts, ReconcileError> {
    let tech = sentinel_index(map, SENTINEL_TECH_HOURS);
    let unbillable = sentinel_index(map, SENTINEL_UNBILLABLE);
    let totals = sentinel_index(map, SENTINEL_JOB_TOTALS);

    let (Some(tech), Some(unbillable), Some(totals)) = (tech, unbillable, totals) else {
        return Err(ReconcileError::Validation(
            "sheet map is missing a sentinel header, cannot locate shift columns".into(),
        ));
    };

    let misordered = unbillable >= totals;
    if misordered && !allow_legacy {
        // The sync-time validation should have rejected this map already.
        warn!("sheet map has misordered sentinels and the legacy fallback is off");
    }

    let leader_normalized = crew_leader_name.map(normalize_name);
    let mut extracted = ExtractedShifts::default();

    for entry in map {
        let Some(raw) = fields.get(&entry.field_name) else {
            continue;
        };
        let Some(hours) = parse_hours(raw) else {
            continue;
        };

        let header = entry.field_name.trim().to_string();

        // Misconfigured map kept alive by the legacy flag: column positions
        // cannot be trusted, so special columns match by known type name
        // and take precedence over the positional ranges.
        if misordered && allow_legacy && is_known_special_type(&header) {
            extracted.special.push(ShiftCandidate { header, hours });
        } else if entry.column_index > tech && entry.column_index < unbillable {
            if leader_normalized.as_deref() == Some(normalize_name(&header).as_str()) {
                extracted.leader_hours = Some(hours);
            } else {
                extracted.regular.push(ShiftCandidate { header, hours });
            }
        } else if !misordered && entry.column_index > unbillable && entry.column_index < totals {
            extracted.special.push(ShiftCandidate { header, hours });
        }
    }

    Ok(extracted)
}

fn is_known_special_type(header: &str) -> bool {
    let wanted = normalize_name(header);
    KNOWN_SPECIAL_SHIFT_TYPES
        .iter()
        .any(|known| normalize_name(known) == wanted)
}
