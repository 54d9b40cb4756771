use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::debug;

use super::db::DbHandle;
use super::models::{Actor, Role};
use crate::config::TokenConfig;
use crate::errors::{FeedbackError, FeedbackResult};

/// Message used for every access-token rejection, whatever the cause.
pub const INVALID_ACCESS_TOKEN: &str = "Invalid or expired access token";
pub const INVALID_REFRESH_TOKEN: &str = "Invalid or expired refresh token";
/// The actor a pair was being issued for has been deleted.
pub const ACCOUNT_GONE: &str = "Account no longer exists";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admission_no: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll_no: Option<String>,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// Claims that name an actor.
trait Subject {
    fn sub(&self) -> &str;
    fn role(&self) -> Role;

    fn actor_id(&self) -> Option<i64> {
        self.sub().parse().ok()
    }
}

impl Subject for AccessClaims {
    fn sub(&self) -> &str {
        &self.sub
    }
    fn role(&self) -> Role {
        self.role
    }
}

impl Subject for RefreshClaims {
    fn sub(&self) -> &str {
        &self.sub
    }
    fn role(&self) -> Role {
        self.role
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Issues and verifies HS256 tokens. Access and refresh tokens are signed
/// with separate secrets, so one can never stand in for the other.
#[derive(Clone)]
pub struct TokenService {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl TokenService {
    pub fn new(config: &TokenConfig) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            access_ttl_secs: i64::try_from(config.access_ttl_secs).unwrap_or(i64::MAX / 2),
            refresh_ttl_secs: i64::try_from(config.refresh_ttl_secs).unwrap_or(i64::MAX / 2),
        }
    }

    pub fn sign_access(&self, actor: &Actor) -> FeedbackResult<String> {
        let iat = chrono::Utc::now().timestamp();
        let mut claims = AccessClaims {
            sub: actor.id().to_string(),
            role: actor.role(),
            username: None,
            admission_no: None,
            roll_no: None,
            iat,
            exp: iat + self.access_ttl_secs,
            jti: uuid::Uuid::new_v4().to_string(),
        };
        match actor {
            Actor::Admin(admin) => claims.username = Some(admin.username.clone()),
            Actor::Student(student) => {
                claims.admission_no = Some(student.admission_no.clone());
                claims.roll_no = Some(student.roll_no.clone());
            }
        }
        sign(&claims, &self.access_encoding)
    }

    pub fn sign_refresh(&self, actor: &Actor) -> FeedbackResult<String> {
        let iat = chrono::Utc::now().timestamp();
        let claims = RefreshClaims {
            sub: actor.id().to_string(),
            role: actor.role(),
            iat,
            exp: iat + self.refresh_ttl_secs,
            jti: uuid::Uuid::new_v4().to_string(),
        };
        sign(&claims, &self.refresh_encoding)
    }

    /// Sign a fresh pair and store the refresh token on the actor,
    /// replacing whatever session it had before.
    pub async fn issue_pair(&self, db: &DbHandle, actor: &Actor) -> FeedbackResult<TokenPair> {
        let pair = TokenPair {
            access_token: self.sign_access(actor)?,
            refresh_token: self.sign_refresh(actor)?,
        };
        let (role, id, stored) = (actor.role(), actor.id(), pair.refresh_token.clone());
        let updated = db
            .call(move |db| Ok(db.set_refresh_token(role, id, Some(&stored))?))
            .await?;
        if !updated {
            return Err(FeedbackError::auth(ACCOUNT_GONE));
        }
        debug!(role = role.as_str(), actor_id = id, "Issued token pair");
        Ok(pair)
    }

    /// Clear the stored refresh token. Outstanding access tokens stay valid
    /// until they expire.
    pub async fn revoke(&self, db: &DbHandle, role: Role, id: i64) -> FeedbackResult<()> {
        db.call(move |db| Ok(db.set_refresh_token(role, id, None)?))
            .await?;
        debug!(role = role.as_str(), actor_id = id, "Revoked refresh token");
        Ok(())
    }

    /// Verify signature, expiry and role. Every failure yields the same
    /// `Auth` error.
    pub fn verify_access(&self, token: &str, role: Role) -> FeedbackResult<AccessClaims> {
        verify(token, &self.access_decoding, role, INVALID_ACCESS_TOKEN)
    }

    pub fn verify_refresh(&self, token: &str, role: Role) -> FeedbackResult<RefreshClaims> {
        verify(token, &self.refresh_decoding, role, INVALID_REFRESH_TOKEN)
    }

    /// Exchange a refresh token for a new pair. The token must be the one
    /// currently stored for the actor; any earlier token is rejected.
    pub async fn rotate(
        &self,
        db: &DbHandle,
        refresh_token: &str,
        role: Role,
    ) -> FeedbackResult<(Actor, TokenPair)> {
        let claims = self.verify_refresh(refresh_token, role)?;
        let id = claims
            .actor_id()
            .ok_or_else(|| FeedbackError::auth(INVALID_REFRESH_TOKEN))?;
        let actor = db
            .call(move |db| Ok(db.get_actor(role, id)?))
            .await?
            .ok_or_else(|| FeedbackError::auth(INVALID_REFRESH_TOKEN))?;

        if actor.refresh_token() != Some(refresh_token) {
            debug!(role = role.as_str(), actor_id = id, "Refresh token does not match stored session");
            return Err(FeedbackError::auth(INVALID_REFRESH_TOKEN));
        }

        let pair = self.issue_pair(db, &actor).await?;
        Ok((actor, pair))
    }
}

fn sign<T: Serialize>(claims: &T, key: &EncodingKey) -> FeedbackResult<String> {
    encode(&Header::new(Algorithm::HS256), claims, key)
        .map_err(|e| FeedbackError::Internal(format!("Failed to sign token: {}", e)))
}

fn verify<T>(token: &str, key: &DecodingKey, role: Role, message: &str) -> FeedbackResult<T>
where
    T: DeserializeOwned + Subject,
{
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    let data = decode::<T>(token, key, &validation).map_err(|e| {
        debug!(error = %e, "Token rejected");
        FeedbackError::auth(message)
    })?;
    if data.claims.role() != role || data.claims.actor_id().is_none() {
        return Err(FeedbackError::auth(message));
    }
    Ok(data.claims)
}
