use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{AppState, auth::password::random_urlsafe, db::errors::DbError, errors::Result};

/// Length in bytes of a generated secret, before encoding
const SECRET_BYTES: usize = 65;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SecretResponse {
    pub secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
}

/// Generate a value suitable for `secret_key`
#[utoipa::path(
    get,
    path = "/",
    tag = "default",
    summary = "Generate a secret key",
    responses((status = 200, description = "A fresh random secret", body = SecretResponse))
)]
pub async fn secret_key() -> Json<SecretResponse> {
    Json(SecretResponse {
        secret: random_urlsafe(SECRET_BYTES),
    })
}

#[utoipa::path(
    get,
    path = "/healthcheck",
    tag = "default",
    summary = "Health check",
    responses(
        (status = 200, description = "Service and database are up", body = HealthResponse),
        (status = 500, description = "Database unreachable"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn healthcheck(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    sqlx::query("SELECT 1")
        .execute(&state.db)
        .await
        .map_err(DbError::from)?;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
    }))
}
