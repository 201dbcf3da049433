use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use hail_core::{AuthUser, Role};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// JWT Claims
// ============================================================================

/// The identity service writes `sub` as a number; string ids are accepted too.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum Subject {
    Number(i64),
    Text(String),
}

impl Subject {
    pub fn user_id(&self) -> Option<i64> {
        match self {
            Subject::Number(id) => Some(*id),
            Subject::Text(text) => text.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Subject,
    pub role: String,
    pub exp: usize,
}

impl Claims {
    pub fn to_user(&self) -> Option<AuthUser> {
        let id = self.sub.user_id()?;
        let role = self.role.parse::<Role>().ok()?;
        Some(AuthUser { id, role })
    }
}

// ============================================================================
// Authentication
// ============================================================================

pub async fn auth_middleware(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::AuthenticationError("Missing or invalid token".to_string()))?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.auth.secret.expose().as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthenticationError("Invalid or expired token".to_string()))?;

    let user = token_data
        .claims
        .to_user()
        .ok_or_else(|| AppError::AuthenticationError("Invalid token payload".to_string()))?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

// ============================================================================
// Role checks (run after `auth_middleware`)
// ============================================================================

pub async fn require_passenger(req: Request, next: Next) -> Result<Response, AppError> {
    require_role(Role::Passenger, req, next).await
}

pub async fn require_driver(req: Request, next: Next) -> Result<Response, AppError> {
    require_role(Role::Driver, req, next).await
}

async fn require_role(role: Role, req: Request, next: Next) -> Result<Response, AppError> {
    match req.extensions().get::<AuthUser>() {
        Some(user) if user.role == role => Ok(next.run(req).await),
        Some(_) => Err(AppError::AuthorizationError(format!("Only {} accounts can do this", role))),
        None => Err(AppError::AuthenticationError("Missing or invalid token".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_accepts_numbers_and_numeric_strings() {
        let claims: Claims = serde_json::from_str(r#"{"sub":42,"role":"DRIVER","exp":0}"#).unwrap();
        assert_eq!(claims.to_user(), Some(AuthUser::driver(42)));

        let claims: Claims = serde_json::from_str(r#"{"sub":"7","role":"PASSENGER","exp":0,"email":"a@b.c"}"#).unwrap();
        assert_eq!(claims.to_user(), Some(AuthUser::passenger(7)));

        let claims: Claims = serde_json::from_str(r#"{"sub":"guest","role":"PASSENGER","exp":0}"#).unwrap();
        assert!(claims.to_user().is_none());

        let claims: Claims = serde_json::from_str(r#"{"sub":1,"role":"ADMIN","exp":0}"#).unwrap();
        assert!(claims.to_user().is_none());
    }
}
