use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use common::{Error, Result};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::{handler::ApiError, state::AppState};

/// Resolves a bearer token to a user id
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, token: &str) -> Result<String>;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub exp: i64,
}

/// HS256 JWT verification against a shared secret
pub struct JwtAuthenticator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtAuthenticator {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

impl Authenticator for JwtAuthenticator {
    fn authenticate(&self, token: &str) -> Result<String> {
        let data = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| Error::Unauthorized(format!("Please authenticate: {}", e)))?;

        if data.claims.user_id.trim().is_empty() {
            return Err(Error::Unauthorized("Invalid token structure".to_string()));
        }
        Ok(data.claims.user_id)
    }
}

/// The authenticated caller, taken from the `Authorization: Bearer` header
#[derive(Debug, Clone)]
pub struct CurrentUser(pub String);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Unauthorized("Authentication required".to_string()))?;

        let user_id = state.auth.authenticate(token)?;
        Ok(CurrentUser(user_id))
    }
}

#[cfg(test)]
pub(crate) fn issue_token(secret: &str, user_id: &str) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let claims = Claims {
        user_id: user_id.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}
