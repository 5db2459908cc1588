//! Dashboard Session Cookie
//!
//! The cookie value is `{venue_id}.{hex hmac-sha256(venue_id)}`; nothing else
//! is stored server side.

use axum::extract::FromRequestParts;
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Redirect, Response};
use capture_core::{Venue, VenueId, VenueLookup};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_COOKIE: &str = "venue_session";

/// Thirty days
const SESSION_MAX_AGE_SECS: u32 = 30 * 24 * 60 * 60;

/// Signs and checks session cookie values
pub struct SessionKeys {
    secret: Vec<u8>,
}

impl SessionKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    fn mac(&self, venue_id: &str) -> Option<Vec<u8>> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).ok()?;
        mac.update(venue_id.as_bytes());
        Some(mac.finalize().into_bytes().to_vec())
    }

    pub fn sign(&self, venue_id: VenueId) -> String {
        let id = venue_id.to_string();
        let signature = self.mac(&id).map(hex::encode).unwrap_or_default();
        format!("{id}.{signature}")
    }

    /// The venue id a cookie value vouches for, if the signature holds
    pub fn verify(&self, value: &str) -> Option<VenueId> {
        let (id, signature) = value.rsplit_once('.')?;
        let provided = hex::decode(signature).ok()?;
        let expected = self.mac(id)?;

        if provided.len() != expected.len() || !bool::from(provided.ct_eq(&expected)) {
            return None;
        }
        VenueId::parse(id).ok()
    }

    /// `Set-Cookie` value logging `venue_id` in
    pub fn login_cookie(&self, venue_id: VenueId, secure: bool) -> String {
        let secure = if secure { "; Secure" } else { "" };
        format!(
            "{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={SESSION_MAX_AGE_SECS}{secure}",
            self.sign(venue_id)
        )
    }
}

/// `Set-Cookie` value clearing the session
pub fn logout_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// Append a `Set-Cookie` header to a response
pub fn with_cookie(mut response: Response, cookie: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(cookie) {
        response.headers_mut().append(SET_COOKIE, value);
    }
    response
}

/// Value of the session cookie from the request headers
pub fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value)
}

/// Load the logged-in venue, if any
pub async fn current_venue(state: &AppState, headers: &HeaderMap) -> capture_core::Result<Option<Venue>> {
    let Some(venue_id) = session_cookie(headers).and_then(|v| state.sessions.verify(v)) else {
        return Ok(None);
    };
    state.store.find_venue(VenueLookup::Id(venue_id)).await
}

/// Extractor for pages that need a logged-in venue.
///
/// Anonymous or stale sessions are sent to `/login`.
pub struct CurrentVenue(pub Venue);

impl FromRequestParts<AppState> for CurrentVenue {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match current_venue(state, &parts.headers).await {
            Ok(Some(venue)) => Ok(Self(venue)),
            Ok(None) => Err(with_cookie(Redirect::to("/login").into_response(), &logout_cookie())),
            Err(e) => {
                tracing::error!("Session lookup failed: {}", e);
                Err(crate::pages::error_page(
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "Something went wrong",
                    e.user_message().as_str(),
                ))
            }
        }
    }
}
