use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use ripple_types::api::{BookmarkToggleResponse, CreatePostRequest};

use crate::middleware::CurrentUser;
use crate::{ApiError, AppState, with_db};

pub async fn create_post(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let post = with_db(state, move |db| {
        db.create_post(user.id, &req.image_url, req.caption.as_deref())
    })
    .await?;

    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn get_post(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(_user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let post = with_db(state, move |db| db.get_post(post_id)).await?;
    Ok(Json(post))
}

/// Save/unsave toggle. The response body is the new membership state.
pub async fn toggle_bookmark(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let bookmarked = with_db(state, move |db| db.toggle_bookmark(user.id, post_id)).await?;
    Ok(Json(BookmarkToggleResponse { bookmarked }))
}

pub async fn list_bookmarks(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let posts = with_db(state, move |db| db.list_bookmarks(user.id)).await?;
    Ok(Json(posts))
}
