use axum::{response::IntoResponse, Json};

/// Error taxonomy for the reconciliation pipeline. A `Validation` or
/// `AmbiguousMatch` failure rejects the whole row with nothing persisted;
/// `MissingEntity` is only an error for entities the row cannot proceed
/// without (unresolvable crew members become suggestions instead).
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Ambiguous match for '{name}': candidates {candidates:?}")]
    AmbiguousMatch { name: String, candidates: Vec<String> },
    #[error("Missing {entity}: {name}")]
    MissingEntity { entity: String, name: String },
    #[error("Database error: {0}")]
    Database(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<diesel::result::Error> for ReconcileError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::NotFound => Self::NotFound(err.to_string()),
            other => Self::Database(other.to_string()),
        }
    }
}

impl From<r2d2::Error> for ReconcileError {
    fn from(err: r2d2::Error) -> Self {
        Self::Database(format!("connection pool: {err}"))
    }
}

impl IntoResponse for ReconcileError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;
        let (status, body) = match &self {
            Self::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                serde_json::json!({ "error": msg }),
            ),
            Self::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "error": msg }),
            ),
            Self::AmbiguousMatch { name, candidates } => (
                StatusCode::CONFLICT,
                serde_json::json!({
                    "error": format!("Ambiguous match for '{name}'"),
                    "candidates": candidates,
                }),
            ),
            Self::MissingEntity { entity, name } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                serde_json::json!({ "error": format!("Missing {entity}: {name}") }),
            ),
            Self::Database(msg) | Self::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": msg }),
            ),
        };
        (status, Json(body)).into_response()
    }
}
