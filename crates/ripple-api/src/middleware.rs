use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use uuid::Uuid;

use ripple_types::api::Claims;

use crate::{ApiError, AppState, with_db};

/// The authenticated principal. The provider's token subject has already
/// been resolved to a user row by the time a handler sees this.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    pub username: String,
}

/// Extract and validate the bearer token, then resolve its subject to a
/// user. Fails with 401 before any core logic runs; an unknown subject is
/// indistinguishable from a missing token at this boundary.
pub async fn require_identity(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(ApiError::unauthorized)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(ApiError::unauthorized)?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::unauthorized())?;

    let subject = token_data.claims.sub;
    let user = with_db(state.clone(), move |db| {
        db.get_user_by_identity_ref(&subject)
    })
    .await?
    .ok_or_else(ApiError::unauthorized)?;

    req.extensions_mut().insert(CurrentUser {
        id: user.id,
        username: user.username,
    });
    Ok(next.run(req).await)
}
