use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use ripple_types::api::{UpdateProfileRequest, UsernameAvailableResponse};

use crate::middleware::CurrentUser;
use crate::{ApiError, AppState, with_db};

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct UsernameQuery {
    pub username: String,
}

pub async fn me(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = with_db(state, move |db| db.get_user(user.id)).await?;
    Ok(Json(profile))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(_user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = with_db(state, move |db| db.get_user(user_id)).await?;
    Ok(Json(profile))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = with_db(state, move |db| {
        db.update_profile(
            user.id,
            &req.username,
            req.fullname.as_deref(),
            req.bio.as_deref(),
        )
    })
    .await?;

    Ok(Json(profile))
}

pub async fn search_users(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let hits = with_db(state, move |db| db.search_users(user.id, &query.q)).await?;
    Ok(Json(hits))
}

pub async fn username_available(
    State(state): State<AppState>,
    Query(query): Query<UsernameQuery>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let available = with_db(state, move |db| {
        db.is_username_available(user.id, &query.username)
    })
    .await?;

    Ok(Json(UsernameAvailableResponse { available }))
}
