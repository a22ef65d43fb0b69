use std::sync::Arc;

use crate::notify::{Notifier, PerformanceCalculator};
use crate::shared::cache::StatusCache;
use crate::shared::config::AppConfig;
use crate::shared::utils::DbPool;

pub struct AppState {
    pub conn: DbPool,
    pub config: AppConfig,
    pub statuses: Arc<StatusCache>,
    pub performance: Arc<dyn PerformanceCalculator>,
    pub notifier: Arc<dyn Notifier>,
}

impl Clone for AppState {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            config: self.config.clone(),
            statuses: Arc::clone(&self.statuses),
            performance: Arc::clone(&self.performance),
            notifier: Arc::clone(&self.notifier),
        }
    }
}
