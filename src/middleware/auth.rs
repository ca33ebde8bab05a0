// src/middleware/auth.rs

use axum::{
    extract::{FromRequestParts, Query},
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{common::error::AppError, config::AppState};

// O que o token do painel carrega
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeClaims {
    pub sub: Uuid,       // ID do usuário
    pub tenant_id: Uuid, // Loja que o usuário está vendo
    pub exp: usize,
}

pub fn validate_token(token: &str, jwt_secret: &str) -> Result<RealtimeClaims, AppError> {
    let token_data = decode::<RealtimeClaims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_ref()),
        &Validation::default(),
    )
    .map_err(|_| AppError::InvalidToken)?;
    Ok(token_data.claims)
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

// Navegadores não mandam header no handshake do WebSocket: aceita `?token=` também
fn token_from_parts(parts: &Parts) -> Option<String> {
    let from_query = Query::<TokenQuery>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|Query(query)| query.token)
        .filter(|token| !token.is_empty());

    from_query.or_else(|| {
        parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::to_string)
    })
}

// Extrator para obter o usuário autenticado (e o tenant dele) diretamente nos handlers
#[derive(Debug, Clone)]
pub struct AuthenticatedTenant(pub RealtimeClaims);

impl FromRequestParts<AppState> for AuthenticatedTenant {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = token_from_parts(parts).ok_or(AppError::InvalidToken)?;
        let claims = validate_token(&token, &state.jwt_secret)?;
        Ok(AuthenticatedTenant(claims))
    }
}
