diesel::table! {
    job_statuses (id) {
        id -> Uuid,
        name -> Varchar,
    }
}

diesel::table! {
    branches (id) {
        id -> Uuid,
        name -> Varchar,
        telegram_group_id -> Nullable<Varchar>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    sales_persons (id) {
        id -> Uuid,
        name -> Varchar,
        is_active -> Bool,
        telegram_id -> Nullable<Varchar>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    sales_person_branches (id) {
        id -> Uuid,
        sales_person_id -> Uuid,
        branch_id -> Uuid,
    }
}

diesel::table! {
    crew_members (id) {
        id -> Uuid,
        name -> Varchar,
        is_leader -> Bool,
        is_active -> Bool,
        telegram_id -> Nullable<Varchar>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    crew_member_branches (id) {
        id -> Uuid,
        crew_member_id -> Uuid,
        branch_id -> Uuid,
    }
}

diesel::table! {
    estimates (id) {
        id -> Uuid,
        name -> Varchar,
        branch_id -> Uuid,
        sales_person_id -> Uuid,
        status_id -> Nullable<Uuid>,
        attic_hours -> Numeric,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    jobs (id) {
        id -> Uuid,
        name -> Varchar,
        branch_id -> Uuid,
        estimate_id -> Nullable<Uuid>,
        crew_leader_id -> Nullable<Uuid>,
        crew_leader_hours -> Numeric,
        cl_estimated_plan_hours -> Numeric,
        closing_date -> Nullable<Timestamptz>,
        status_id -> Uuid,
        notification_sent -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    column_maps (id) {
        id -> Uuid,
        sheet_name -> Varchar,
        field_name -> Varchar,
        column_index -> Int4,
        kind -> Varchar,
    }
}

diesel::table! {
    shifts (id) {
        id -> Uuid,
        job_id -> Uuid,
        crew_member_id -> Uuid,
        hours -> Numeric,
        is_leader -> Bool,
        approved_shift -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    special_shift_types (id) {
        id -> Uuid,
        name -> Varchar,
    }
}

diesel::table! {
    job_special_shifts (id) {
        id -> Uuid,
        job_id -> Uuid,
        special_shift_id -> Uuid,
        hours -> Numeric,
        approved_shift -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(shifts -> jobs (job_id));
diesel::joinable!(shifts -> crew_members (crew_member_id));
diesel::joinable!(job_special_shifts -> jobs (job_id));
diesel::joinable!(job_special_shifts -> special_shift_types (special_shift_id));
diesel::joinable!(jobs -> branches (branch_id));
diesel::joinable!(jobs -> job_statuses (status_id));
diesel::joinable!(estimates -> branches (branch_id));
diesel::joinable!(estimates -> sales_persons (sales_person_id));
diesel::joinable!(sales_person_branches -> sales_persons (sales_person_id));
diesel::joinable!(sales_person_branches -> branches (branch_id));
diesel::joinable!(crew_member_branches -> crew_members (crew_member_id));
diesel::joinable!(crew_member_branches -> branches (branch_id));

diesel::allow_tables_to_appear_in_same_query!(
    job_statuses,
    branches,
    sales_persons,
    sales_person_branches,
    crew_members,
    crew_member_branches,
    estimates,
    jobs,
    column_maps,
    shifts,
    special_shift_types,
    job_special_shifts,
);
