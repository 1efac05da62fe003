use super::{run_blocking, AppError, AppState, AuthenticatedAdmin};
use crate::admin::{AdminUser, AdminUserInput};
use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Serialize)]
pub struct UserListResponse {
    pub success: bool,
    pub users: Vec<AdminUser>,
}

/// Request body for PUT /api/admin/users/:username
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    pub display_name: Option<String>,
    pub email: Option<String>,
    /// Required when creating; omit to keep the current password
    pub password: Option<String>,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub success: bool,
    pub user: AdminUser,
}

#[derive(Serialize)]
pub struct DeleteUserResponse {
    pub success: bool,
}

/// GET /api/admin/users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
) -> Result<Json<UserListResponse>, AppError> {
    let admins = state.portal.admins.clone();
    let users = run_blocking(move || Ok(admins.list()?)).await?;

    Ok(Json(UserListResponse {
        success: true,
        users,
    }))
}

/// PUT /api/admin/users/:username
///
/// Creates the account (201) or updates it (200).
pub async fn save_user(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<AuthenticatedAdmin>,
    Path(username): Path<String>,
    Json(update): Json<UserUpdate>,
) -> Result<Response, AppError> {
    let admins = state.portal.admins.clone();
    let target = username.clone();
    let (user, created) = run_blocking(move || {
        admins.save_user(
            &target,
            AdminUserInput {
                display_name: update.display_name,
                email: update.email,
                password: update.password,
            },
        )
    })
    .await?;

    info!(actor = %actor.0, username = %username, created, "Admin user saved via API");

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(UserResponse { success: true, user })).into_response())
}

/// DELETE /api/admin/users/:username
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<AuthenticatedAdmin>,
    Path(username): Path<String>,
) -> Result<Json<DeleteUserResponse>, AppError> {
    let admins = state.portal.admins.clone();
    let target = username.clone();
    run_blocking(move || admins.delete_user(&target)).await?;

    info!(actor = %actor.0, username = %username, "Admin user deleted via API");
    Ok(Json(DeleteUserResponse { success: true }))
}
