use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::constants::{SESSION_COOKIE, SESSION_MAX_AGE_SECS};
use crate::handlers::redirect_home;

/// Decides whether a request carries a valid session, and issues sessions
/// on login. Routing only talks to this trait, so the credential scheme can
/// change without touching the handlers.
pub trait SessionGate: Send + Sync {
    /// True iff the request presents a valid session credential
    fn is_authenticated(&self, headers: &HeaderMap) -> bool;

    /// Check a submitted password. On success returns the `Set-Cookie`
    /// value that establishes the session.
    fn login(&self, password: &str) -> Option<String>;

    /// `Set-Cookie` value that makes the browser drop the session
    fn logout_cookie(&self) -> String {
        format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0")
    }
}

pub type SharedGate = Arc<dyn SessionGate>;

/// The configured password doubles as the session cookie value.
///
/// There is no server-side session registry and nothing is derived from the
/// secret, so anyone who reads the cookie knows the password.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecretGate {
    secret: String,
}

impl SharedSecretGate {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn matches(&self, candidate: &str) -> bool {
        bool::from(candidate.as_bytes().ct_eq(self.secret.as_bytes()))
    }
}

impl SessionGate for SharedSecretGate {
    fn is_authenticated(&self, headers: &HeaderMap) -> bool {
        CookieJar::from_headers(headers)
            .get(SESSION_COOKIE)
            .is_some_and(|cookie| self.matches(cookie.value()))
    }

    fn login(&self, password: &str) -> Option<String> {
        if !self.matches(password) {
            return None;
        }

        Some(format!(
            "{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Strict; Max-Age={SESSION_MAX_AGE_SECS}",
            self.secret
        ))
    }
}

/// Middleware for routes that mutate the store.
///
/// Requests without a valid session are sent back to the gallery with a
/// redirect rather than an error status.
pub async fn require_session(
    State(gate): State<SharedGate>,
    request: Request,
    next: Next,
) -> Response {
    if gate.is_authenticated(request.headers()) {
        return next.run(request).await;
    }

    tracing::debug!(path = %request.uri().path(), "Unauthenticated request redirected");
    redirect_home(None)
}
