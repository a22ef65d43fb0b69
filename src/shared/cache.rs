use diesel::prelude::*;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::shared::error::ReconcileError;
use crate::shared::schema::job_statuses;

/// Read-through cache for job status name → id. Held inside `AppState`
/// and passed by reference; writers to `job_statuses` must call
/// [`StatusCache::invalidate`].
#[derive(Default)]
pub struct StatusCache {
    inner: RwLock<HashMap<String, Uuid>>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status_id(
        &self,
        conn: &mut PgConnection,
        name: &str,
    ) -> Result<Uuid, ReconcileError> {
        if let Some(id) = self
            .inner
            .read()
            .ok()
            .and_then(|map| map.get(name).copied())
        {
            return Ok(id);
        }

        let id = job_statuses::table
            .filter(job_statuses::name.eq(name))
            .select(job_statuses::id)
            .first::<Uuid>(conn)
            .optional()?
            .ok_or_else(|| {
                ReconcileError::Internal(format!("job status '{name}' is not seeded"))
            })?;

        if let Ok(mut map) = self.inner.write() {
            map.insert(name.to_string(), id);
        }
        Ok(id)
    }

    pub fn invalidate(&self) {
        if let Ok(mut map) = self.inner.write() {
            map.clear();
        }
    }
}
