//! Browser session cookie handling.
//!
//! The cookie only carries the opaque token; everything else lives in the
//! `SessionStore` under the token hash.

use anyhow::anyhow;
use axum::{
    http::{
        header::{InvalidHeaderValue, COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue,
    },
    response::{IntoResponse, Response},
};
use std::net::IpAddr;
use tracing::{debug, warn};

use super::{error::PortalError, state::PortalState};
use crate::{
    auth::Principal,
    session::{SessionData, SessionToken},
};

pub const SESSION_COOKIE_NAME: &str = "safeimei_session";

pub(crate) struct BrowserSession {
    token: Option<SessionToken>,
    pub(crate) data: SessionData,
}

impl BrowserSession {
    /// Resolve the request cookie. Missing, malformed and expired tokens all
    /// yield an empty session.
    pub(crate) async fn load(state: &PortalState, headers: &HeaderMap) -> Result<Self, PortalError> {
        let Some(token) = extract_session_token(headers) else {
            return Ok(Self::empty());
        };
        match state.sessions().load(&token.key()).await? {
            Some(data) => Ok(Self {
                token: Some(token),
                data,
            }),
            None => {
                debug!("session cookie did not resolve to a live session");
                Ok(Self::empty())
            }
        }
    }

    fn empty() -> Self {
        Self {
            token: None,
            data: SessionData::default(),
        }
    }

    /// Write the session back and return the `Set-Cookie` value to send.
    ///
    /// An empty session is removed from the store instead.
    pub(crate) async fn persist(
        &mut self,
        state: &PortalState,
    ) -> Result<Option<HeaderValue>, PortalError> {
        if self.data.is_empty() {
            return match self.token.take() {
                Some(token) => {
                    state.sessions().delete(&token.key()).await?;
                    Ok(Some(cookie_header(clear_session_cookie(state))?))
                }
                None => Ok(None),
            };
        }

        let token = match self.token.take() {
            Some(token) => token,
            None => SessionToken::generate()?,
        };
        state
            .sessions()
            .save(&token.key(), &self.data, state.config().session_ttl())
            .await?;
        let cookie = cookie_header(session_cookie(state, token.as_str()))?;
        self.token = Some(token);
        Ok(Some(cookie))
    }

    /// Move the session to a fresh token and return the new cookie.
    ///
    /// The old key is blanked before it is deleted, so nothing it held stays
    /// usable even when the delete fails.
    pub(crate) async fn rotate(
        &mut self,
        state: &PortalState,
    ) -> Result<Option<HeaderValue>, PortalError> {
        if let Some(previous) = self.token.take() {
            let key = previous.key();
            state
                .sessions()
                .save(&key, &SessionData::default(), state.config().session_ttl())
                .await?;
            if let Err(err) = state.sessions().delete(&key).await {
                warn!("failed to delete rotated session: {err:#}");
            }
        }
        self.persist(state).await
    }

    /// Remove the session entirely and return the clearing cookie.
    pub(crate) async fn destroy(&mut self, state: &PortalState) -> Result<HeaderValue, PortalError> {
        if let Some(token) = self.token.take() {
            state.sessions().delete(&token.key()).await?;
        }
        self.data = SessionData::default();
        cookie_header(clear_session_cookie(state))
    }

    /// Principal of the authenticated officer.
    pub(crate) async fn require_officer(
        &self,
        state: &PortalState,
    ) -> Result<Principal, PortalError> {
        let officer_id = self.data.officer_id.ok_or(PortalError::Unauthenticated)?;
        state
            .directory()
            .lookup(officer_id)
            .await?
            .ok_or(PortalError::Unauthenticated)
    }
}

/// Attach an optional `Set-Cookie` header to a response.
pub(crate) fn with_cookie(cookie: Option<HeaderValue>, response: impl IntoResponse) -> Response {
    let mut response = response.into_response();
    if let Some(cookie) = cookie {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    response
}

fn cookie_header(value: Result<HeaderValue, InvalidHeaderValue>) -> Result<HeaderValue, PortalError> {
    value.map_err(|err| PortalError::Persistence(anyhow!("invalid session cookie: {err}")))
}

pub(crate) fn session_cookie(
    state: &PortalState,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let ttl_seconds = state.config().session_ttl_seconds();
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
    );
    if state.config().session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn clear_session_cookie(state: &PortalState) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if state.config().session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn extract_session_token(headers: &HeaderMap) -> Option<SessionToken> {
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            let (Some(key), Some(val)) = (parts.next(), parts.next()) else {
                continue;
            };
            if key.trim() == SESSION_COOKIE_NAME {
                return SessionToken::parse(val.trim());
            }
        }
    }
    None
}

/// Client address as reported by the fronting proxy.
pub(crate) fn extract_client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
    };
    forwarded.or_else(real_ip)?.parse().ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{
        api::state::PortalConfig,
        session::{MemorySessionStore, SessionStore},
        test_support::{
            officer, FixedLocator, MemoryDirectory, MemoryReportRepository, RecordingSender,
            UndeletableSessionStore,
        },
    };
    use std::{net::Ipv4Addr, sync::Arc};
    use uuid::Uuid;

    fn state(
        base_url: &str,
        sessions: Arc<dyn SessionStore>,
        directory: MemoryDirectory,
    ) -> PortalState {
        PortalState::new(
            PortalConfig::new(base_url.to_string()).with_session_ttl_seconds(600),
            sessions,
            Arc::new(directory),
            Arc::new(MemoryReportRepository::default()),
            Arc::new(RecordingSender::default()),
            Arc::new(FixedLocator),
        )
    }

    fn cookie_headers(cookie: &HeaderValue) -> HeaderMap {
        let pair = cookie.to_str().unwrap().split(';').next().unwrap().to_string();
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(&format!("theme=dark; {pair}")).unwrap());
        headers
    }

    #[test]
    fn cookie_attributes_follow_base_url() {
        let secure = state(
            "https://safeimei.ng",
            Arc::new(MemorySessionStore::new()),
            MemoryDirectory::default(),
        );
        let cookie = session_cookie(&secure, "abc").unwrap();
        assert_eq!(
            cookie.to_str().unwrap(),
            "safeimei_session=abc; Path=/; HttpOnly; SameSite=Lax; Max-Age=600; Secure"
        );

        let plain = state(
            "http://localhost:8080",
            Arc::new(MemorySessionStore::new()),
            MemoryDirectory::default(),
        );
        assert!(!clear_session_cookie(&plain)
            .unwrap()
            .to_str()
            .unwrap()
            .contains("Secure"));
    }

    #[tokio::test]
    async fn empty_session_is_not_stored() {
        let sessions = Arc::new(MemorySessionStore::new());
        let state = state("https://safeimei.ng", sessions.clone(), MemoryDirectory::default());

        let mut session = BrowserSession::load(&state, &HeaderMap::new()).await.unwrap();
        assert!(session.persist(&state).await.unwrap().is_none());
        assert_eq!(sessions.len().await, 0);
    }

    #[tokio::test]
    async fn persisted_session_round_trips_through_cookie() {
        let sessions = Arc::new(MemorySessionStore::new());
        let principal = officer("LAG01");
        let state = state(
            "https://safeimei.ng",
            sessions.clone(),
            MemoryDirectory::with(&[&principal]),
        );

        let mut session = BrowserSession::load(&state, &HeaderMap::new()).await.unwrap();
        session.data.officer_id = Some(principal.officer_id);
        let cookie = session.persist(&state).await.unwrap().unwrap();

        let reloaded = BrowserSession::load(&state, &cookie_headers(&cookie)).await.unwrap();
        assert_eq!(reloaded.require_officer(&state).await.unwrap(), principal);
    }

    #[tokio::test]
    async fn rotate_invalidates_the_old_token() {
        let sessions = Arc::new(MemorySessionStore::new());
        let state = state("https://safeimei.ng", sessions.clone(), MemoryDirectory::default());

        let mut session = BrowserSession::load(&state, &HeaderMap::new()).await.unwrap();
        session.data.officer_id = Some(Uuid::new_v4());
        let first = session.persist(&state).await.unwrap().unwrap();

        let second = session.rotate(&state).await.unwrap().unwrap();
        assert_ne!(first, second);

        let stale = BrowserSession::load(&state, &cookie_headers(&first)).await.unwrap();
        assert!(stale.data.is_empty());
        assert_eq!(sessions.len().await, 1);

        let current = BrowserSession::load(&state, &cookie_headers(&second)).await.unwrap();
        assert!(current.data.officer_id.is_some());
    }

    #[tokio::test]
    async fn rotate_blanks_the_old_token_when_delete_fails() {
        let sessions = Arc::new(UndeletableSessionStore::default());
        let state = state("https://safeimei.ng", sessions.clone(), MemoryDirectory::default());

        let mut session = BrowserSession::load(&state, &HeaderMap::new()).await.unwrap();
        session.data.officer_id = Some(Uuid::new_v4());
        let first = session.persist(&state).await.unwrap().unwrap();

        let second = session.rotate(&state).await.unwrap().unwrap();
        assert_ne!(first, second);

        let stale = BrowserSession::load(&state, &cookie_headers(&first)).await.unwrap();
        assert!(stale.data.is_empty());
        assert_eq!(sessions.inner.len().await, 2);
    }

    #[tokio::test]
    async fn destroy_clears_store_and_cookie() {
        let sessions = Arc::new(MemorySessionStore::new());
        let state = state("https://safeimei.ng", sessions.clone(), MemoryDirectory::default());

        let mut session = BrowserSession::load(&state, &HeaderMap::new()).await.unwrap();
        session.data.officer_id = Some(Uuid::new_v4());
        let cookie = session.persist(&state).await.unwrap().unwrap();

        let mut session = BrowserSession::load(&state, &cookie_headers(&cookie)).await.unwrap();
        let cleared = session.destroy(&state).await.unwrap();
        assert!(cleared.to_str().unwrap().contains("Max-Age=0"));
        assert_eq!(sessions.len().await, 0);
    }

    #[tokio::test]
    async fn anonymous_session_requires_login() {
        let state = state(
            "https://safeimei.ng",
            Arc::new(MemorySessionStore::new()),
            MemoryDirectory::default(),
        );
        let session = BrowserSession::load(&state, &HeaderMap::new()).await.unwrap();
        assert!(matches!(
            session.require_officer(&state).await,
            Err(PortalError::Unauthenticated)
        ));
    }

    #[test]
    fn client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("102.89.1.1, 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(
            extract_client_ip(&headers),
            Some(IpAddr::V4(Ipv4Addr::new(102, 89, 1, 1)))
        );

        headers.remove("x-forwarded-for");
        assert_eq!(
            extract_client_ip(&headers),
            Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)))
        );

        headers.insert("x-real-ip", HeaderValue::from_static("not-an-ip"));
        assert_eq!(extract_client_ip(&headers), None);
    }
}
