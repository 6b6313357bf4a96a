use crate::error::{AppError, AppResult};
use crate::middleware::auth::require_admin;
use crate::models::{OrganizationModel, OrgKind};
use crate::policy::Identity;
use crate::response::{ApiResponse, PaginatedResponse};
use crate::services::organization::OrganizationService;
use axum::{extract::Path, extract::Query, response::IntoResponse, Extension, Json};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateOrganizationRequest {
    /// Organization name (1-255 characters)
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    /// police or medical; immutable afterwards
    pub kind: OrgKind,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateOrganizationRequest {
    /// New name (1-255 characters)
    #[validate(length(min = 1, max = 255))]
    pub name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ListOrganizationsQuery {
    /// Page number
    pub page: Option<u64>,
    /// Items per page
    pub per_page: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrganizationResponse {
    pub id: Uuid,
    pub name: String,
    pub kind: OrgKind,
    pub created_at: String,
    pub updated_at: String,
}

impl From<OrganizationModel> for OrganizationResponse {
    fn from(o: OrganizationModel) -> Self {
        Self {
            id: o.id,
            name: o.name,
            kind: o.kind,
            created_at: o.created_at.to_string(),
            updated_at: o.updated_at.to_string(),
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/organizations",
    security(("jwt_token" = [])),
    request_body = CreateOrganizationRequest,
    responses(
        (status = 200, description = "Organization created", body = OrganizationResponse),
        (status = 400, description = "Validation error", body = AppError),
        (status = 403, description = "Admin only", body = AppError),
    ),
    tag = "admin"
)]
pub async fn create_organization(
    Extension(db): Extension<DatabaseConnection>,
    identity: Identity,
    Json(payload): Json<CreateOrganizationRequest>,
) -> AppResult<impl IntoResponse> {
    require_admin(&identity)?;
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let service = OrganizationService::new(db);
    let organization = service.create(&payload.name, payload.kind).await?;

    Ok(ApiResponse::ok(OrganizationResponse::from(organization)))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/organizations",
    security(("jwt_token" = [])),
    params(
        ("page" = Option<u64>, Query, description = "Page number"),
        ("per_page" = Option<u64>, Query, description = "Items per page"),
    ),
    responses(
        (status = 200, description = "Organizations", body = PaginatedResponse<OrganizationResponse>),
        (status = 403, description = "Admin only", body = AppError),
    ),
    tag = "admin"
)]
pub async fn list_organizations(
    Extension(db): Extension<DatabaseConnection>,
    identity: Identity,
    Query(params): Query<ListOrganizationsQuery>,
) -> AppResult<impl IntoResponse> {
    require_admin(&identity)?;

    let page = params.page.unwrap_or(1);
    let per_page = params.per_page.unwrap_or(20).min(100);

    let service = OrganizationService::new(db);
    let (organizations, total) = service.list(page, per_page).await?;
    let items = organizations
        .into_iter()
        .map(OrganizationResponse::from)
        .collect();

    Ok(ApiResponse::ok(PaginatedResponse::new(
        items, total, page, per_page,
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/organizations/{id}",
    security(("jwt_token" = [])),
    params(("id" = Uuid, Path, description = "Organization ID")),
    responses(
        (status = 200, description = "Organization", body = OrganizationResponse),
        (status = 403, description = "Admin only", body = AppError),
        (status = 404, description = "Not found", body = AppError),
    ),
    tag = "admin"
)]
pub async fn get_organization(
    Extension(db): Extension<DatabaseConnection>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    require_admin(&identity)?;

    let service = OrganizationService::new(db);
    let organization = service.get_by_id(id).await?;

    Ok(ApiResponse::ok(OrganizationResponse::from(organization)))
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/organizations/{id}",
    security(("jwt_token" = [])),
    params(("id" = Uuid, Path, description = "Organization ID")),
    request_body = UpdateOrganizationRequest,
    responses(
        (status = 200, description = "Organization renamed", body = OrganizationResponse),
        (status = 400, description = "Validation error", body = AppError),
        (status = 403, description = "Admin only", body = AppError),
    ),
    tag = "admin"
)]
pub async fn update_organization(
    Extension(db): Extension<DatabaseConnection>,
    identity: Identity,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrganizationRequest>,
) -> AppResult<impl IntoResponse> {
    require_admin(&identity)?;
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let service = OrganizationService::new(db);
    let organization = service.rename(id, &payload.name).await?;

    Ok(ApiResponse::ok(OrganizationResponse::from(organization)))
}
