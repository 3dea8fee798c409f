use axum::extract::{FromRequestParts, Request};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::error::AppError;

/// Name of the cookie carrying the session identifier.
pub const SESSION_COOKIE: &str = "mdspace_session";

/// Lifetime of the session cookie (24 hours).
pub const SESSION_MAX_AGE_SECS: i64 = 24 * 60 * 60;

/// The opaque identifier of the requesting session.
///
/// Unauthenticated: it is only ever compared for equality with a
/// document's owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session(pub String);

impl Session {
    pub fn id(&self) -> &str {
        &self.0
    }
}

/// Attach a [`Session`] to every request.
///
/// Reuses the `mdspace_session` cookie when present, otherwise assigns a
/// fresh UUID and sets the cookie on the response.
pub async fn session_middleware(
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> (CookieJar, Response) {
    let existing = jar
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty());

    let (jar, session_id) = match existing {
        Some(session_id) => (jar, session_id),
        None => {
            let session_id = uuid::Uuid::new_v4().to_string();
            let cookie = Cookie::build((SESSION_COOKIE, session_id.clone()))
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax)
                .max_age(time::Duration::seconds(SESSION_MAX_AGE_SECS))
                .build();
            tracing::debug!(session_id = %session_id, "assigned new session");
            (jar.add(cookie), session_id)
        }
    };

    request.extensions_mut().insert(Session(session_id));
    (jar, next.run(request).await)
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or_else(|| AppError::Internal("Session middleware is not installed".into()))
    }
}
