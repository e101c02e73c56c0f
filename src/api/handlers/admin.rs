use axum::{extract::Extension, http::HeaderMap, Json};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    api::{error::PortalError, session::BrowserSession, state::PortalState},
    seed::{reseed, SeedSummary},
};

#[utoipa::path(
    post,
    path = "/v1/admin/seed",
    responses(
        (status = 200, description = "Demo data replaced.", body = SeedSummary),
        (status = 401, description = "Authentication required"),
        (status = 404, description = "Not found"),
    ),
    tag = "admin"
)]
/// Destructive demo reseed. Non-superusers get `404` so the route stays hidden.
pub async fn seed(
    headers: HeaderMap,
    state: Extension<Arc<PortalState>>,
    pool: Extension<PgPool>,
) -> Result<Json<SeedSummary>, PortalError> {
    let session = BrowserSession::load(&state, &headers).await?;
    let principal = session.require_officer(&state).await?;
    if !principal.is_superuser {
        warn!(officer = %principal.username, "non-superuser attempted reseed");
        return Err(PortalError::NotFound);
    }

    info!(officer = %principal.username, "reseeding demo data");
    Ok(Json(reseed(&pool).await?))
}
