pub mod api_router;
pub mod approval;
pub mod columnmap;
pub mod notify;
pub mod resolver;
pub mod shared;
pub mod timesheet;
