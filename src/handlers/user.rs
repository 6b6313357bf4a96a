use crate::error::{AppError, AppResult};
use crate::middleware::auth::require_admin;
use crate::models::{Role, UserModel};
use crate::policy::Identity;
use crate::response::{ApiResponse, PaginatedResponse};
use crate::services::user::UserService;
use axum::{extract::Path, extract::Query, response::IntoResponse, Extension, Json};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateUserRequest {
    /// Organization the user belongs to, fixed for life
    pub organization_id: Uuid,
    /// Unique email address
    #[validate(email)]
    pub email: String,
    /// Responder role
    pub role: Role,
    /// Supervising user, optional
    pub supervisor_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    /// New role
    pub role: Option<Role>,
    /// New supervisor
    pub supervisor_id: Option<Uuid>,
    /// Remove the current supervisor
    pub clear_supervisor: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ListUsersQuery {
    /// Page number
    pub page: Option<u64>,
    /// Items per page
    pub per_page: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub email: String,
    pub role: Role,
    pub supervisor_id: Option<Uuid>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<UserModel> for UserResponse {
    fn from(u: UserModel) -> Self {
        Self {
            id: u.id,
            organization_id: u.organization_id,
            email: u.email,
            role: u.role,
            supervisor_id: u.supervisor_id,
            created_at: u.created_at.to_string(),
            updated_at: u.updated_at.to_string(),
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/users",
    security(("jwt_token" = [])),
    request_body = CreateUserRequest,
    responses(
        (status = 200, description = "User created", body = UserResponse),
        (status = 400, description = "Validation error", body = AppError),
        (status = 403, description = "Admin only", body = AppError),
        (status = 409, description = "Email already in use", body = AppError),
    ),
    tag = "admin"
)]
pub async fn create_user(
    Extension(db): Extension<DatabaseConnection>,
    identity: Identity,
    Json(payload): Json<CreateUserRequest>,
) -> AppResult<impl IntoResponse> {
    require_admin(&identity)?;
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let service = UserService::new(db);
    let user = service
        .create(
            payload.organization_id,
            &payload.email,
            payload.role,
            payload.supervisor_id,
        )
        .await?;

    Ok(ApiResponse::ok(UserResponse::from(user)))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/organizations/{id}/users",
    security(("jwt_token" = [])),
    params(
        ("id" = Uuid, Path, description = "Organization ID"),
        ("page" = Option<u64>, Query, description = "Page number"),
        ("per_page" = Option<u64>, Query, description = "Items per page"),
    ),
    responses(
        (status = 200, description = "Users in the organization", body = PaginatedResponse<UserResponse>),
        (status = 403, description = "Admin only", body = AppError),
    ),
    tag = "admin"
)]
pub async fn list_users(
    Extension(db): Extension<DatabaseConnection>,
    identity: Identity,
    Path(id): Path<Uuid>,
    Query(params): Query<ListUsersQuery>,
) -> AppResult<impl IntoResponse> {
    require_admin(&identity)?;

    let page = params.page.unwrap_or(1);
    let per_page = params.per_page.unwrap_or(20).min(100);

    let service = UserService::new(db);
    let (users, total) = service.list_by_organization(id, page, per_page).await?;
    let items = users.into_iter().map(UserResponse::from).collect();

    Ok(ApiResponse::ok(PaginatedResponse::new(
        items, total, page, per_page,
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/users/{id}",
    security(("jwt_token" = [])),
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User", body = UserResponse),
        (status = 403, description = "Admin only", body = AppError),
        (status = 404, description = "Not found", body = AppError),
    ),
    tag = "admin"
)]
pub async fn get_user(
    Extension(db): Extension<DatabaseConnection>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    require_admin(&identity)?;

    let service = UserService::new(db);
    let user = service.get_by_id(id).await?;

    Ok(ApiResponse::ok(UserResponse::from(user)))
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/users/{id}",
    security(("jwt_token" = [])),
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = UserResponse),
        (status = 400, description = "Validation error", body = AppError),
        (status = 403, description = "Admin only", body = AppError),
    ),
    tag = "admin"
)]
pub async fn update_user(
    Extension(db): Extension<DatabaseConnection>,
    identity: Identity,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> AppResult<impl IntoResponse> {
    require_admin(&identity)?;

    let supervisor_patch = if payload.clear_supervisor.unwrap_or(false) {
        Some(None)
    } else {
        payload.supervisor_id.map(Some)
    };

    let service = UserService::new(db);
    let user = service.update(id, payload.role, supervisor_patch).await?;

    Ok(ApiResponse::ok(UserResponse::from(user)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/admin/users/{id}",
    security(("jwt_token" = [])),
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User deleted"),
        (status = 400, description = "User still owns reports", body = AppError),
        (status = 403, description = "Admin only", body = AppError),
    ),
    tag = "admin"
)]
pub async fn delete_user(
    Extension(db): Extension<DatabaseConnection>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    require_admin(&identity)?;

    let service = UserService::new(db);
    service.delete(id).await?;

    Ok(ApiResponse::ok(serde_json::json!({ "deleted": id })))
}
