use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use jsonwebtoken::{decode, DecodingKey, Validation};
use mercato_core::{Identity, IdentityError, IdentityVerifier, Role};
use serde::{Deserialize, Serialize};

use crate::{error::AppError, state::AppState};

// ============================================================================
// JWT Claims
// ============================================================================

/// Identity assertion issued by the external auth provider
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

/// HS256 verifier for bearer tokens, shared by HTTP and realtime
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }
}

impl IdentityVerifier for JwtVerifier {
    fn verify(&self, credential: &str) -> Result<Identity, IdentityError> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(IdentityError::MissingCredential);
        }

        let token_data = decode::<Claims>(credential, &self.key, &self.validation)
            .map_err(|e| IdentityError::Unauthenticated(e.to_string()))?;

        let role = token_data.claims.role.parse::<Role>()?;
        Ok(Identity {
            user_id: token_data.claims.sub,
            role,
        })
    }
}

// ============================================================================
// Identity Middleware
// ============================================================================

pub async fn identity_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    // 1. Extract bearer token
    let auth = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or_else(|| AppError::AuthenticationError("Missing bearer token".to_string()))?;

    // 2. Verify and resolve the caller
    let identity = state.verifier.verify(auth.token()).map_err(|e| {
        tracing::debug!("Rejected credential: {}", e);
        AppError::AuthenticationError("Invalid or expired token".to_string())
    })?;

    // 3. Inject identity for handlers
    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}

// ============================================================================
// Admin Gate
// ============================================================================

/// Runs after [`identity_middleware`]
pub async fn admin_middleware(req: Request, next: Next) -> Result<Response, AppError> {
    let is_admin = req
        .extensions()
        .get::<Identity>()
        .map(Identity::is_admin)
        .ok_or_else(|| AppError::AuthenticationError("Missing identity".to_string()))?;

    if !is_admin {
        return Err(AppError::AuthorizationError("Administrator role required".to_string()));
    }

    Ok(next.run(req).await)
}
