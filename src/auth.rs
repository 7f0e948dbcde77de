use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{Json, Response},
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::error::{AppError, AppJson};

/// Lifetime of an issued bearer token, in seconds.
pub const TOKEN_LIFETIME_SECS: i64 = 60 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl JwtKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn issue(&self, email: &str) -> Result<String, AppError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            email: email.to_string(),
            iat: now,
            exp: now + TOKEN_LIFETIME_SECS,
        };
        self.sign(&claims)
    }

    fn sign(&self, claims: &Claims) -> Result<String, AppError> {
        encode(&Header::default(), claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("failed to sign token: {}", e)))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| {
                debug!("Rejected bearer token: {}", e);
                AppError::Auth("invalid authentication token".to_string())
            })
    }
}

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
}

// POST /login - Issue a bearer token for the given email
pub async fn login(
    State(state): State<AppState>,
    AppJson(request): AppJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    if request.email.trim().is_empty() {
        return Err(AppError::Auth("an email is required to log in".to_string()));
    }
    let token = state.keys.issue(&request.email)?;
    Ok(Json(LoginResponse { token }))
}

/// Rejects requests without a valid `Authorization: Bearer` token and makes
/// the verified [`Claims`] available to handlers as a request extension.
pub async fn require_bearer(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Auth("no authentication token provided".to_string()))?;

    let claims = state.keys.verify(token)?;
    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_tokens_verify_with_the_same_secret_only() {
        let keys = JwtKeys::new("secret");
        let token = keys.issue("ana@example.com").unwrap();

        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.email, "ana@example.com");
        assert_eq!(claims.exp - claims.iat, TOKEN_LIFETIME_SECS);

        assert!(matches!(JwtKeys::new("other").verify(&token), Err(AppError::Auth(_))));
        assert!(matches!(keys.verify("not-a-jwt"), Err(AppError::Auth(_))));
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let keys = JwtKeys::new("secret");
        let issued = Utc::now().timestamp() - 2 * TOKEN_LIFETIME_SECS;
        let token = keys
            .sign(&Claims {
                email: "ana@example.com".to_string(),
                iat: issued,
                exp: issued + TOKEN_LIFETIME_SECS,
            })
            .unwrap();

        assert!(matches!(keys.verify(&token), Err(AppError::Auth(_))));
    }
}
