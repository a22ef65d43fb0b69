#[cfg(test)]
mod reconcile_integration_tests {
    use chrono::Utc;
    use diesel::prelude::*;
    use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
    use serde_json::json;
    use uuid::Uuid;

    use crewserver::approval::{
        apply_approvals, apply_rejections, close_job_if_complete, ApprovalBatch, ShiftKey,
        SpecialShiftKey,
    };
    use crewserver::columnmap::{replace_sheet_map, ColumnMapEntry, KIND_CREW_MEMBER, KIND_FIELD};
    use crewserver::resolver;
    use crewserver::shared::cache::StatusCache;
    use crewserver::shared::models::{
        CrewMember, Estimate, SalesPerson, STATUS_CLOSED, STATUS_OPEN,
    };
    use crewserver::shared::schema::{
        crew_member_branches, crew_members, estimates, job_special_shifts, jobs,
        sales_person_branches, sales_persons, shifts,
    };
    use crewserver::shared::utils::bd;
    use crewserver::timesheet::{reconcile_row, ProcessRowRequest};

    const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

    fn test_conn() -> Option<PgConnection> {
        // Skip when no database is available, same as CI without Postgres.
        let url = std::env::var("DATABASE_URL").ok()?;
        let mut conn = match PgConnection::establish(&url) {
            Ok(conn) => conn,
            Err(_) => {
                println!("Skipping test - cannot connect to Postgres");
                return None;
            }
        };
        if conn.run_pending_migrations(MIGRATIONS).is_err() {
            println!("Skipping test - migrations failed");
            return None;
        }
        Some(conn)
    }

    fn seed_crew_member(conn: &mut PgConnection, name: &str, is_leader: bool) -> CrewMember {
        let member = CrewMember {
            id: Uuid::new_v4(),
            name: name.to_string(),
            is_leader,
            is_active: true,
            telegram_id: None,
            created_at: Utc::now(),
        };
        diesel::insert_into(crew_members::table)
            .values(&member)
            .execute(conn)
            .expect("seed crew member");
        member
    }

    /// Deletes and reseeds a crew member by exact name so reruns against a
    /// persistent database do not accumulate duplicates.
    fn reseed_crew_member(conn: &mut PgConnection, name: &str) -> CrewMember {
        let stale: Vec<Uuid> = crew_members::table
            .filter(crew_members::name.eq(name))
            .select(crew_members::id)
            .load(conn)
            .expect("load stale");
        if !stale.is_empty() {
            diesel::delete(shifts::table.filter(shifts::crew_member_id.eq_any(&stale)))
                .execute(conn)
                .expect("clear shifts");
            diesel::delete(
                crew_member_branches::table
                    .filter(crew_member_branches::crew_member_id.eq_any(&stale)),
            )
            .execute(conn)
            .expect("clear links");
            diesel::update(jobs::table.filter(jobs::crew_leader_id.eq_any(&stale)))
                .set(jobs::crew_leader_id.eq(None::<Uuid>))
                .execute(conn)
                .expect("clear leader refs");
            diesel::delete(crew_members::table.filter(crew_members::id.eq_any(&stale)))
                .execute(conn)
                .expect("clear members");
        }
        seed_crew_member(conn, name, false)
    }

    /// Deletes and reseeds a sales person by exact name, detaching any
    /// estimates and jobs that still reference the stale rows.
    fn reseed_sales_person(conn: &mut PgConnection, name: &str) -> SalesPerson {
        let stale: Vec<Uuid> = sales_persons::table
            .filter(sales_persons::name.eq(name))
            .select(sales_persons::id)
            .load(conn)
            .expect("load stale");
        if !stale.is_empty() {
            let stale_estimates: Vec<Uuid> = estimates::table
                .filter(estimates::sales_person_id.eq_any(&stale))
                .select(estimates::id)
                .load(conn)
                .expect("load stale estimates");
            diesel::update(jobs::table.filter(jobs::estimate_id.eq_any(&stale_estimates)))
                .set(jobs::estimate_id.eq(None::<Uuid>))
                .execute(conn)
                .expect("clear estimate refs");
            diesel::delete(estimates::table.filter(estimates::id.eq_any(&stale_estimates)))
                .execute(conn)
                .expect("clear estimates");
            diesel::delete(
                sales_person_branches::table
                    .filter(sales_person_branches::sales_person_id.eq_any(&stale)),
            )
            .execute(conn)
            .expect("clear links");
            diesel::delete(sales_persons::table.filter(sales_persons::id.eq_any(&stale)))
                .execute(conn)
                .expect("clear persons");
        }
        seed_sales_person(conn, name, true)
    }

    fn seed_estimate(
        conn: &mut PgConnection,
        name: &str,
        branch_id: Uuid,
        sales_person_id: Uuid,
        status_id: Option<Uuid>,
    ) -> Estimate {
        let estimate = Estimate {
            id: Uuid::new_v4(),
            name: name.to_string(),
            branch_id,
            sales_person_id,
            status_id,
            attic_hours: bd(0.0),
            created_at: Utc::now(),
        };
        diesel::insert_into(estimates::table)
            .values(&estimate)
            .execute(conn)
            .expect("seed estimate");
        estimate
    }

    fn seed_sales_person(conn: &mut PgConnection, name: &str, is_active: bool) -> SalesPerson {
        let person = SalesPerson {
            id: Uuid::new_v4(),
            name: name.to_string(),
            is_active,
            telegram_id: None,
            created_at: Utc::now(),
        };
        diesel::insert_into(sales_persons::table)
            .values(&person)
            .execute(conn)
            .expect("seed sales person");
        person
    }

    fn sync_standard_map(conn: &mut PgConnection, sheet: &str, leader_col: &str, tech_col: &str) {
        let entries = vec![
            ColumnMapEntry { field_name: "Job Name".into(), column_index: 0, kind: Some(KIND_FIELD.into()) },
            ColumnMapEntry { field_name: "Sales Person".into(), column_index: 1, kind: Some(KIND_FIELD.into()) },
            ColumnMapEntry { field_name: "Crew Leader".into(), column_index: 2, kind: Some(KIND_FIELD.into()) },
            ColumnMapEntry { field_name: "Techs hours".into(), column_index: 3, kind: Some(KIND_FIELD.into()) },
            ColumnMapEntry { field_name: leader_col.into(), column_index: 4, kind: Some(KIND_CREW_MEMBER.into()) },
            ColumnMapEntry { field_name: tech_col.into(), column_index: 5, kind: Some(KIND_CREW_MEMBER.into()) },
            ColumnMapEntry { field_name: "Unbillable Job Hours".into(), column_index: 6, kind: Some(KIND_FIELD.into()) },
            ColumnMapEntry { field_name: "Quality Control Visit".into(), column_index: 7, kind: Some(KIND_FIELD.into()) },
            ColumnMapEntry { field_name: "Job Totals".into(), column_index: 8, kind: Some(KIND_FIELD.into()) },
        ];
        replace_sheet_map(conn, sheet, &entries, false).expect("sync column map");
    }

    fn row_request(sheet: &str, job: &str, sales: &str, leader_cell: &str) -> ProcessRowRequest {
        let row = json!([job, sales, leader_cell, "", "8", "4", "", "2", ""]);
        ProcessRowRequest {
            sheet_name: sheet.to_string(),
            row_data: serde_json::from_value(row).expect("row decodes"),
            row_number: 5,
        }
    }

    fn job_status(conn: &mut PgConnection, job_id: Uuid) -> Uuid {
        jobs::table
            .find(job_id)
            .select(jobs::status_id)
            .first(conn)
            .expect("job exists")
    }

    fn pending_count(conn: &mut PgConnection, job_id: Uuid) -> i64 {
        shifts::table
            .filter(shifts::job_id.eq(job_id))
            .filter(shifts::approved_shift.eq(false))
            .count()
            .get_result(conn)
            .expect("count")
    }

    #[test]
    fn row_reconciliation_approval_and_reopen_cycle() {
        let Some(mut conn) = test_conn() else { return };
        let statuses = StatusCache::new();
        let suffix = Uuid::new_v4();
        let sheet = format!("Kent {suffix}");
        let job_name = format!("Job A {suffix}");
        let leader_name = format!("Crew {suffix} Monroe");
        let sales_name = format!("Sales {suffix} Whitfield");

        seed_crew_member(&mut conn, &leader_name, true);
        seed_sales_person(&mut conn, &sales_name, true);
        sync_standard_map(&mut conn, &sheet, &leader_name, "Bob Naylor");

        let req = row_request(
            &sheet,
            &job_name,
            &sales_name,
            &format!("Crew Lead: {leader_name}"),
        );
        let first = conn
            .transaction(|conn| reconcile_row(conn, &statuses, false, &req))
            .expect("row reconciles");

        assert!(first.success);
        assert_eq!(
            first.crew_leader.as_ref().map(|l| l.name.as_str()),
            Some(leader_name.as_str())
        );
        assert!(first.suggestions.requires_approval);
        assert_eq!(first.suggestions.missing_crew_members.len(), 1);
        assert_eq!(first.suggestions.missing_crew_members[0].name, "Bob Naylor");
        assert_eq!(first.suggestions.missing_crew_members[0].suggested_hours, bd(4.0));
        // The leader's own column supplies the leader hours.
        assert_eq!(first.crew_members.len(), 1);
        assert!(first.crew_members[0].is_leader);
        assert_eq!(first.crew_members[0].hours, bd(8.0));
        // A stand-in estimate was created from branch + sales person.
        assert!(first.estimate.is_some());
        assert_eq!(pending_count(&mut conn, first.job_id), 1);

        // Idempotent reprocessing: unchanged row, unchanged suggestion set.
        let second = conn
            .transaction(|conn| reconcile_row(conn, &statuses, false, &req))
            .expect("reprocess");
        assert_eq!(second.job_id, first.job_id);
        assert_eq!(second.crew_members.len(), 1);
        assert_eq!(second.suggestions.missing_crew_members.len(), 1);
        assert_eq!(pending_count(&mut conn, first.job_id), 1);

        let leader_id = first.crew_members[0].id;
        let special_id: Uuid = job_special_shifts::table
            .filter(job_special_shifts::job_id.eq(first.job_id))
            .select(job_special_shifts::special_shift_id)
            .first(&mut conn)
            .expect("special shift persisted");

        // Approving only the regular shift must not close the job.
        let partial = ApprovalBatch {
            shifts: vec![ShiftKey { crew_member_id: leader_id, job_id: first.job_id }],
            special_shifts: vec![],
        };
        apply_approvals(&mut conn, &partial).expect("approve");
        assert!(close_job_if_complete(&mut conn, &statuses, first.job_id)
            .expect("closure check")
            .is_none());
        let open_id = statuses.status_id(&mut conn, STATUS_OPEN).unwrap();
        assert_eq!(job_status(&mut conn, first.job_id), open_id);

        // Replaying the same approval is a no-op.
        let (count, _) = apply_approvals(&mut conn, &partial).expect("replay");
        assert_eq!(count, 0);

        // Approving the special shift completes the job.
        let rest = ApprovalBatch {
            shifts: vec![],
            special_shifts: vec![SpecialShiftKey {
                special_shift_id: special_id,
                job_id: first.job_id,
            }],
        };
        apply_approvals(&mut conn, &rest).expect("approve special");
        let closed_job = close_job_if_complete(&mut conn, &statuses, first.job_id)
            .expect("closure check")
            .expect("job closes");
        assert!(closed_job.closing_date.is_some());
        let closed_id = statuses.status_id(&mut conn, STATUS_CLOSED).unwrap();
        assert_eq!(job_status(&mut conn, first.job_id), closed_id);

        // Invalidation drops the cached ids; the next lookup re-reads the
        // seeded rows and lands on the same ids.
        statuses.invalidate();
        assert_eq!(
            statuses.status_id(&mut conn, STATUS_CLOSED).unwrap(),
            closed_id
        );

        // Reprocessing revokes approval: shifts return to suggested and the
        // job reopens.
        let third = conn
            .transaction(|conn| reconcile_row(conn, &statuses, false, &req))
            .expect("reprocess closed job");
        assert_eq!(third.job_id, first.job_id);
        assert_eq!(pending_count(&mut conn, first.job_id), 1);
        assert_eq!(job_status(&mut conn, first.job_id), open_id);
    }

    #[test]
    fn rejection_removes_only_suggested_shifts_and_can_close_the_job() {
        let Some(mut conn) = test_conn() else { return };
        let statuses = StatusCache::new();
        let suffix = Uuid::new_v4();
        let sheet = format!("Burien {suffix}");
        let leader_name = format!("Crew {suffix} Ashford");
        let sales_name = format!("Sales {suffix} Tran");
        seed_crew_member(&mut conn, &leader_name, true);
        seed_sales_person(&mut conn, &sales_name, true);
        sync_standard_map(&mut conn, &sheet, &leader_name, "Bob Naylor");

        let req = row_request(
            &sheet,
            &format!("Job R {suffix}"),
            &sales_name,
            &format!("Crew Lead: {leader_name}"),
        );
        let result = conn
            .transaction(|conn| reconcile_row(conn, &statuses, false, &req))
            .expect("row reconciles");
        let leader_id = result.crew_members[0].id;
        let special_id: Uuid = job_special_shifts::table
            .filter(job_special_shifts::job_id.eq(result.job_id))
            .select(job_special_shifts::special_shift_id)
            .first(&mut conn)
            .expect("special shift persisted");

        apply_approvals(
            &mut conn,
            &ApprovalBatch {
                shifts: vec![ShiftKey { crew_member_id: leader_id, job_id: result.job_id }],
                special_shifts: vec![],
            },
        )
        .expect("approve leader shift");

        // Rejecting the approved shift is a no-op; rejecting the special
        // shift deletes the last suggestion.
        let batch = ApprovalBatch {
            shifts: vec![ShiftKey { crew_member_id: leader_id, job_id: result.job_id }],
            special_shifts: vec![SpecialShiftKey {
                special_shift_id: special_id,
                job_id: result.job_id,
            }],
        };
        let (rejected, rejected_special) =
            apply_rejections(&mut conn, &batch).expect("reject");
        assert_eq!(rejected, 0);
        assert_eq!(rejected_special, 1);

        let approved_still_there: i64 = shifts::table
            .filter(shifts::job_id.eq(result.job_id))
            .filter(shifts::approved_shift.eq(true))
            .count()
            .get_result(&mut conn)
            .expect("count");
        assert_eq!(approved_still_there, 1);

        // Nothing suggested remains, so the closure check closes the job.
        let closed_job = close_job_if_complete(&mut conn, &statuses, result.job_id)
            .expect("closure check")
            .expect("job closes");
        assert!(closed_job.closing_date.is_some());
        let closed_id = statuses.status_id(&mut conn, STATUS_CLOSED).unwrap();
        assert_eq!(job_status(&mut conn, result.job_id), closed_id);
    }

    #[test]
    fn typoed_leader_column_header_still_supplies_leader_hours() {
        let Some(mut conn) = test_conn() else { return };
        let statuses = StatusCache::new();
        let suffix = Uuid::new_v4();
        let sheet = format!("Renton {suffix}");
        let sales_name = format!("Sales {suffix} Ingram");
        let leader = reseed_crew_member(&mut conn, "Marta Kowalski");
        seed_sales_person(&mut conn, &sales_name, true);
        // The leader's own column header carries a typo, so positional
        // extraction cannot divert it and it arrives as a regular
        // candidate that fuzzy-resolves back to the leader.
        sync_standard_map(&mut conn, &sheet, "Marta Kowalsky", "Bob Naylor");

        let req = row_request(
            &sheet,
            &format!("Job T {suffix}"),
            &sales_name,
            "Crew Lead: Marta Kowalski",
        );
        let result = conn
            .transaction(|conn| reconcile_row(conn, &statuses, false, &req))
            .expect("row reconciles");

        assert_eq!(result.crew_leader.as_ref().map(|l| l.id), Some(leader.id));
        // Column hours win over the stand-in estimate's zero plan hours.
        assert_eq!(result.crew_members.len(), 1);
        assert!(result.crew_members[0].is_leader);
        assert_eq!(result.crew_members[0].hours, bd(8.0));
        let job_hours: bigdecimal::BigDecimal = jobs::table
            .find(result.job_id)
            .select(jobs::crew_leader_hours)
            .first(&mut conn)
            .expect("job exists");
        assert_eq!(job_hours, bd(8.0));
    }

    #[test]
    fn sales_workload_tiebreak_counts_only_open_estimates() {
        let Some(mut conn) = test_conn() else { return };
        let statuses = StatusCache::new();
        let suffix = Uuid::new_v4();
        let branch = resolver::resolve_branch(&mut conn, &format!("Olympia {suffix}"))
            .expect("branch auto-creates");
        let open_id = statuses.status_id(&mut conn, STATUS_OPEN).unwrap();
        let closed_id = statuses.status_id(&mut conn, STATUS_CLOSED).unwrap();

        // Two active sales persons with the same name. The first carries
        // two closed estimates, the second one open estimate; only the
        // open work counts toward the tiebreak.
        let retired = reseed_sales_person(&mut conn, "Nora Quill");
        let active = seed_sales_person(&mut conn, "Nora Quill", true);
        seed_estimate(&mut conn, &format!("Ledger {suffix} A"), branch.id, retired.id, Some(closed_id));
        seed_estimate(&mut conn, &format!("Ledger {suffix} B"), branch.id, retired.id, Some(closed_id));
        seed_estimate(&mut conn, &format!("Ledger {suffix} C"), branch.id, active.id, Some(open_id));

        let resolved =
            resolver::resolve_sales_person(&mut conn, &statuses, "Nora Quill", branch.id)
                .expect("resolution runs");
        assert_eq!(resolved.map(|p| p.id), Some(active.id));
    }

    #[test]
    fn sales_person_gets_exactly_one_branch_link() {
        let Some(mut conn) = test_conn() else { return };
        let statuses = StatusCache::new();
        let suffix = Uuid::new_v4();
        let leader_name = format!("Crew {suffix} Calloway");
        let sales_name = format!("Sales {suffix} Brandt");
        let dana = seed_sales_person(&mut conn, &sales_name, true);
        seed_crew_member(&mut conn, &leader_name, true);

        let link_count = |conn: &mut PgConnection| -> i64 {
            sales_person_branches::table
                .filter(sales_person_branches::sales_person_id.eq(dana.id))
                .count()
                .get_result(conn)
                .expect("count links")
        };

        let sheet_one = format!("Kent {suffix}");
        sync_standard_map(&mut conn, &sheet_one, &leader_name, "Bob Naylor");
        let req = row_request(
            &sheet_one,
            &format!("Job L1 {suffix}"),
            &sales_name,
            &format!("Crew Lead: {leader_name}"),
        );
        conn.transaction(|conn| reconcile_row(conn, &statuses, false, &req))
            .expect("first row");
        assert_eq!(link_count(&mut conn), 1);

        // A row from a different branch never adds a second link.
        let sheet_two = format!("Everett {suffix}");
        sync_standard_map(&mut conn, &sheet_two, &leader_name, "Bob Naylor");
        let req = row_request(
            &sheet_two,
            &format!("Job L2 {suffix}"),
            &sales_name,
            &format!("Crew Lead: {leader_name}"),
        );
        conn.transaction(|conn| reconcile_row(conn, &statuses, false, &req))
            .expect("second row");
        assert_eq!(link_count(&mut conn), 1);
    }

    #[test]
    fn inactive_sales_person_is_invisible_even_on_exact_match() {
        let Some(mut conn) = test_conn() else { return };
        let statuses = StatusCache::new();
        let suffix = Uuid::new_v4();
        let name = format!("Inactive {suffix} Howard");
        seed_sales_person(&mut conn, &name, false);

        let branch = resolver::resolve_branch(&mut conn, &format!("Tacoma {suffix}"))
            .expect("branch auto-creates");
        let resolved = resolver::resolve_sales_person(&mut conn, &statuses, &name, branch.id)
            .expect("resolution runs");
        assert!(resolved.is_none());

        // Resolution never reactivates.
        let still_inactive: bool = sales_persons::table
            .filter(sales_persons::name.eq(&name))
            .select(sales_persons::is_active)
            .first(&mut conn)
            .expect("row exists");
        assert!(!still_inactive);
    }

    #[test]
    fn fuzzy_match_resolves_typos_but_not_different_people() {
        let Some(mut conn) = test_conn() else { return };
        let eben = reseed_crew_member(&mut conn, "Eben Woodall");
        reseed_crew_member(&mut conn, "John Smith");

        let typo = resolver::resolve_crew_member(&mut conn, "Eben Woodbell", None)
            .expect("resolution runs");
        assert_eq!(typo.map(|m| m.id), Some(eben.id));

        let different = resolver::resolve_crew_member(&mut conn, "Jane Smith", None)
            .expect("resolution runs");
        assert!(different.is_none());
    }

    #[test]
    fn missing_sales_person_aborts_row_without_partial_writes() {
        let Some(mut conn) = test_conn() else { return };
        let statuses = StatusCache::new();
        let suffix = Uuid::new_v4();
        let sheet = format!("Spokane {suffix}");
        let leader_name = format!("Crew {suffix} Quist");
        seed_crew_member(&mut conn, &leader_name, true);
        sync_standard_map(&mut conn, &sheet, &leader_name, "Bob Naylor");

        // The named sales person does not exist and no estimate matches.
        let job_name = format!("Job X {suffix}");
        let req = row_request(
            &sheet,
            &job_name,
            &format!("Nobody {suffix} Sells"),
            &format!("Crew Lead: {leader_name}"),
        );
        let result = conn.transaction(|conn| reconcile_row(conn, &statuses, false, &req));
        assert!(result.is_err());

        let job_exists: i64 = jobs::table
            .filter(jobs::name.eq(&job_name))
            .count()
            .get_result(&mut conn)
            .expect("count");
        assert_eq!(job_exists, 0);
    }
}
