//! Officer sign-in: password, then one-time code.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::{
    api::{
        error::PortalError,
        session::{with_cookie, BrowserSession},
        state::PortalState,
    },
    auth::{otp::ChallengeHandle, Principal},
};

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    /// Station ID, e.g. `LAG01`.
    pub username: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct ChallengeResponse {
    /// `email` or `sms`.
    pub channel: String,
    pub destination_hint: String,
    pub expires_at: DateTime<Utc>,
}

impl From<ChallengeHandle> for ChallengeResponse {
    fn from(handle: ChallengeHandle) -> Self {
        Self {
            channel: handle.channel.to_string(),
            destination_hint: handle.destination_hint,
            expires_at: handle.expires_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct VerifyRequest {
    pub code: String,
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 202, description = "Verification code sent.", body = ChallengeResponse),
        (status = 401, description = "Invalid Station ID or Password."),
        (status = 503, description = "The verification code could not be delivered."),
    ),
    tag = "auth"
)]
/// Checks the credentials and sends a one-time code.
/// A new login attempt replaces any code issued earlier in the same session.
pub async fn login(
    headers: HeaderMap,
    state: Extension<Arc<PortalState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Response, PortalError> {
    let Some(principal) = state
        .directory()
        .authenticate(request.username.trim(), &request.password)
        .await?
    else {
        warn!(officer = %request.username.trim(), "login rejected");
        return Err(PortalError::InvalidCredentials);
    };

    let mut session = BrowserSession::load(&state, &headers).await?;
    // Nothing started under an earlier sign-in carries over.
    session.data.officer_id = None;
    session.data.wizard = None;
    let issued = state
        .challenges()
        .issue_challenge(&mut session.data, &principal)
        .await;
    let cookie = session.persist(&state).await?;

    let response = match issued {
        Ok(handle) => (StatusCode::ACCEPTED, Json(ChallengeResponse::from(handle))).into_response(),
        Err(err) => PortalError::from(err).into_response(),
    };
    Ok(with_cookie(cookie, response))
}

#[utoipa::path(
    post,
    path = "/v1/auth/verify",
    request_body = VerifyRequest,
    responses(
        (status = 200, description = "Signed in; the session cookie is rotated.", body = Principal),
        (status = 400, description = "Invalid verification code."),
        (status = 401, description = "No verification in progress."),
    ),
    tag = "auth"
)]
/// Consumes the pending one-time code and signs the officer in.
pub async fn verify(
    headers: HeaderMap,
    state: Extension<Arc<PortalState>>,
    Json(request): Json<VerifyRequest>,
) -> Result<Response, PortalError> {
    let mut session = BrowserSession::load(&state, &headers).await?;
    let verified = state
        .challenges()
        .verify_challenge(&mut session.data, &request.code)
        .await;

    let principal = match verified {
        Ok(principal) => principal,
        Err(err) => {
            // Attempt counters and cleared challenges must survive the failure.
            let cookie = session.persist(&state).await?;
            return Ok(with_cookie(cookie, PortalError::from(err)));
        }
    };

    session.data.challenge = None;
    session.data.officer_id = Some(principal.officer_id);
    let cookie = session.rotate(&state).await?;
    info!(officer = %principal.username, "officer signed in");

    Ok(with_cookie(cookie, Json(principal)))
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session cleared")
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    state: Extension<Arc<PortalState>>,
) -> Result<Response, PortalError> {
    let mut session = BrowserSession::load(&state, &headers).await?;
    let cookie = session.destroy(&state).await?;
    Ok(with_cookie(Some(cookie), StatusCode::NO_CONTENT))
}

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Session is active", body = Principal),
        (status = 401, description = "Authentication required")
    ),
    tag = "auth"
)]
pub async fn session(
    headers: HeaderMap,
    state: Extension<Arc<PortalState>>,
) -> Result<Json<Principal>, PortalError> {
    let session = BrowserSession::load(&state, &headers).await?;
    Ok(Json(session.require_officer(&state).await?))
}
