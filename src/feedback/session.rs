use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum_extra::extract::cookie::CookieJar;
use tracing::{debug, warn};

use super::api::SharedState;
use super::models::{Actor, Admin, Role, Student};
use super::tokens::INVALID_ACCESS_TOKEN;
use crate::errors::{FeedbackError, FeedbackResult};

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

/// An authenticated admin, loaded fresh from the database.
#[derive(Debug, Clone)]
pub struct AdminSession(pub Admin);

/// An authenticated student, loaded fresh from the database.
#[derive(Debug, Clone)]
pub struct StudentSession(pub Student);

impl FromRequestParts<SharedState> for AdminSession {
    type Rejection = FeedbackError;

    async fn from_request_parts(parts: &mut Parts, state: &SharedState) -> Result<Self, Self::Rejection> {
        match authenticate(&parts.headers, state, Role::Admin).await? {
            Actor::Admin(admin) => Ok(Self(admin)),
            Actor::Student(_) => Err(FeedbackError::auth(INVALID_ACCESS_TOKEN)),
        }
    }
}

impl FromRequestParts<SharedState> for StudentSession {
    type Rejection = FeedbackError;

    async fn from_request_parts(parts: &mut Parts, state: &SharedState) -> Result<Self, Self::Rejection> {
        match authenticate(&parts.headers, state, Role::Student).await? {
            Actor::Student(student) => Ok(Self(student)),
            Actor::Admin(_) => Err(FeedbackError::auth(INVALID_ACCESS_TOKEN)),
        }
    }
}

/// Bearer header first, then the `accessToken` cookie.
pub fn access_token_from_headers(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }
    CookieJar::from_headers(headers)
        .get(ACCESS_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
}

/// Only the token's subject id is trusted. The actor is re-read on every
/// request so a deleted account stops working immediately.
async fn authenticate(headers: &HeaderMap, state: &SharedState, role: Role) -> FeedbackResult<Actor> {
    let token = access_token_from_headers(headers).ok_or_else(|| {
        debug!(role = role.as_str(), "Request carried no access token");
        FeedbackError::auth("Unauthorized request")
    })?;
    let claims = state.tokens.verify_access(&token, role)?;
    let id: i64 = claims
        .sub
        .parse()
        .map_err(|_| FeedbackError::auth(INVALID_ACCESS_TOKEN))?;

    let actor = state.db.call(move |db| Ok(db.get_actor(role, id)?)).await?;
    actor.ok_or_else(|| {
        warn!(role = role.as_str(), actor_id = id, "Valid token for an actor that no longer exists");
        FeedbackError::auth(INVALID_ACCESS_TOKEN)
    })
}
