use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use ripple_types::api::FollowStateResponse;
use ripple_types::events::GatewayEvent;

use crate::middleware::CurrentUser;
use crate::{ApiError, AppState, with_db};

/// Follow/unfollow toggle. When an edge is created the store hands back
/// the follow notification, which is fanned out to the target if they
/// have a live gateway connection.
pub async fn toggle_follow(
    State(state): State<AppState>,
    Path(target_id): Path<Uuid>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let notification = with_db(state.clone(), move |db| {
        db.toggle_follow(user.id, target_id)
    })
    .await?;

    if let Some(notification) = notification {
        state
            .dispatcher
            .send_to_user(
                notification.receiver_id,
                GatewayEvent::NotificationCreate { notification },
            )
            .await;
    }

    Ok(StatusCode::NO_CONTENT)
}

pub async fn is_following(
    State(state): State<AppState>,
    Path(target_id): Path<Uuid>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let following = with_db(state, move |db| db.is_following(user.id, target_id)).await?;
    Ok(Json(FollowStateResponse { following }))
}

pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let notifications = with_db(state, move |db| db.list_notifications(user.id)).await?;
    Ok(Json(notifications))
}
