//! API Router
//!
//! Combines the routers of all reconciliation modules into one. Auth and
//! rate limiting sit in front of this router in the deployment, not here.

use axum::Router;
use std::sync::Arc;

use crate::shared::state::AppState;

pub fn configure_api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(crate::columnmap::configure_columnmap_routes())
        .merge(crate::timesheet::configure_timesheet_routes())
        .merge(crate::approval::configure_approval_routes())
}
