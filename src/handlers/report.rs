use crate::error::{AppError, AppResult};
use crate::lifecycle::ReportState;
use crate::models::{ReportHistoryModel, ReportModel, SchemaType};
use crate::policy::Identity;
use crate::response::{ApiResponse, PaginatedResponse};
use crate::services::report::{ReportFilter, ReportPatch, ReportService};
use crate::websocket::hub::BroadcastHub;
use axum::{extract::Path, extract::Query, response::IntoResponse, Extension, Json};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateReportRequest {
    /// Field template the report follows
    pub schema_type: SchemaType,
    /// User the report is assigned to (same organization)
    pub assigned_to: Uuid,
    /// Initial field map, e.g. from the transcription parser
    #[serde(default = "empty_data")]
    pub data: serde_json::Value,
}

fn empty_data() -> serde_json::Value {
    serde_json::json!({})
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateReportRequest {
    /// Replacement field map
    pub data: Option<serde_json::Value>,
    /// Requested lifecycle transition
    pub state: Option<ReportState>,
    /// Reassignment target (same organization)
    pub assigned_to: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ListReportsQuery {
    /// Filter by lifecycle state
    pub state: Option<ReportState>,
    /// Show only reports assigned to the caller
    pub assigned_to_me: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct HistoryQuery {
    /// Page number
    pub page: Option<u64>,
    /// Items per page
    pub per_page: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReportResponse {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub created_by: Uuid,
    pub assigned_to: Uuid,
    pub state: ReportState,
    pub schema_type: SchemaType,
    pub data: serde_json::Value,
    pub version: i32,
    pub created_at: String,
    pub updated_at: String,
}

impl From<ReportModel> for ReportResponse {
    fn from(r: ReportModel) -> Self {
        Self {
            id: r.id,
            organization_id: r.organization_id,
            created_by: r.created_by,
            assigned_to: r.assigned_to,
            state: r.state,
            schema_type: r.schema_type,
            data: r.data,
            version: r.version,
            created_at: r.created_at.to_string(),
            updated_at: r.updated_at.to_string(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HistoryEntryResponse {
    pub id: Uuid,
    pub report_id: Uuid,
    pub modified_by: Uuid,
    pub data: serde_json::Value,
    pub version: i32,
    pub created_at: String,
}

impl From<ReportHistoryModel> for HistoryEntryResponse {
    fn from(h: ReportHistoryModel) -> Self {
        Self {
            id: h.id,
            report_id: h.report_id,
            modified_by: h.modified_by,
            data: h.data,
            version: h.version,
            created_at: h.created_at.to_string(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReportExportResponse {
    pub report: ReportResponse,
    pub history: Vec<HistoryEntryResponse>,
}

#[utoipa::path(
    post,
    path = "/api/v1/reports",
    security(("jwt_token" = [])),
    request_body = CreateReportRequest,
    responses(
        (status = 200, description = "Report created", body = ReportResponse),
        (status = 400, description = "Validation error", body = AppError),
        (status = 403, description = "Role may not create this report type", body = AppError),
    ),
    tag = "reports"
)]
pub async fn create_report(
    Extension(db): Extension<DatabaseConnection>,
    Extension(hub): Extension<BroadcastHub>,
    identity: Identity,
    Json(payload): Json<CreateReportRequest>,
) -> AppResult<impl IntoResponse> {
    let service = ReportService::new(db, hub);
    let report = service
        .create(&identity, payload.schema_type, payload.assigned_to, payload.data)
        .await?;

    Ok(ApiResponse::ok(ReportResponse::from(report)))
}

#[utoipa::path(
    get,
    path = "/api/v1/reports",
    security(("jwt_token" = [])),
    params(
        ("state" = Option<ReportState>, Query, description = "Filter by state"),
        ("assigned_to_me" = Option<bool>, Query, description = "Only reports assigned to me"),
    ),
    responses(
        (status = 200, description = "Reports the caller may view", body = [ReportResponse]),
    ),
    tag = "reports"
)]
pub async fn list_reports(
    Extension(db): Extension<DatabaseConnection>,
    Extension(hub): Extension<BroadcastHub>,
    identity: Identity,
    Query(params): Query<ListReportsQuery>,
) -> AppResult<impl IntoResponse> {
    let filter = ReportFilter {
        state: params.state,
        assigned_to_me: params.assigned_to_me.unwrap_or(false),
    };

    let service = ReportService::new(db, hub);
    let reports = service.list(&identity, filter).await?;
    let items: Vec<ReportResponse> = reports.into_iter().map(ReportResponse::from).collect();

    Ok(ApiResponse::ok(items))
}

#[utoipa::path(
    get,
    path = "/api/v1/reports/{id}",
    security(("jwt_token" = [])),
    params(("id" = Uuid, Path, description = "Report ID")),
    responses(
        (status = 200, description = "Report", body = ReportResponse),
        (status = 403, description = "Access denied", body = AppError),
        (status = 404, description = "Not found", body = AppError),
    ),
    tag = "reports"
)]
pub async fn get_report(
    Extension(db): Extension<DatabaseConnection>,
    Extension(hub): Extension<BroadcastHub>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let service = ReportService::new(db, hub);
    let report = service.get(&identity, id).await?;

    Ok(ApiResponse::ok(ReportResponse::from(report)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/reports/{id}",
    security(("jwt_token" = [])),
    params(("id" = Uuid, Path, description = "Report ID")),
    request_body = UpdateReportRequest,
    responses(
        (status = 200, description = "Report updated", body = ReportResponse),
        (status = 400, description = "Invalid transition or validation error", body = AppError),
        (status = 403, description = "Access denied", body = AppError),
        (status = 409, description = "Concurrent modification", body = AppError),
    ),
    tag = "reports"
)]
pub async fn update_report(
    Extension(db): Extension<DatabaseConnection>,
    Extension(hub): Extension<BroadcastHub>,
    identity: Identity,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateReportRequest>,
) -> AppResult<impl IntoResponse> {
    let patch = ReportPatch {
        data: payload.data,
        state: payload.state,
        assigned_to: payload.assigned_to,
    };

    let service = ReportService::new(db, hub);
    let report = service.update(&identity, id, patch).await?;

    Ok(ApiResponse::ok(ReportResponse::from(report)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/reports/{id}",
    security(("jwt_token" = [])),
    params(("id" = Uuid, Path, description = "Report ID")),
    responses(
        (status = 200, description = "Report deleted"),
        (status = 400, description = "Not in draft state", body = AppError),
        (status = 403, description = "Access denied", body = AppError),
    ),
    tag = "reports"
)]
pub async fn delete_report(
    Extension(db): Extension<DatabaseConnection>,
    Extension(hub): Extension<BroadcastHub>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let service = ReportService::new(db, hub);
    service.delete(&identity, id).await?;

    Ok(ApiResponse::ok(serde_json::json!({ "deleted": id })))
}

#[utoipa::path(
    get,
    path = "/api/v1/reports/{id}/history",
    security(("jwt_token" = [])),
    params(
        ("id" = Uuid, Path, description = "Report ID"),
        ("page" = Option<u64>, Query, description = "Page number"),
        ("per_page" = Option<u64>, Query, description = "Items per page"),
    ),
    responses(
        (status = 200, description = "Version history, ascending", body = PaginatedResponse<HistoryEntryResponse>),
        (status = 403, description = "Access denied", body = AppError),
    ),
    tag = "reports"
)]
pub async fn get_report_history(
    Extension(db): Extension<DatabaseConnection>,
    Extension(hub): Extension<BroadcastHub>,
    identity: Identity,
    Path(id): Path<Uuid>,
    Query(params): Query<HistoryQuery>,
) -> AppResult<impl IntoResponse> {
    let page = params.page.unwrap_or(1);
    let per_page = params.per_page.unwrap_or(50).min(200);

    let service = ReportService::new(db, hub);
    let (entries, total) = service.history(&identity, id, page, per_page).await?;
    let items = entries.into_iter().map(HistoryEntryResponse::from).collect();

    Ok(ApiResponse::ok(PaginatedResponse::new(
        items, total, page, per_page,
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/reports/{id}/export",
    security(("jwt_token" = [])),
    params(("id" = Uuid, Path, description = "Report ID")),
    responses(
        (status = 200, description = "Read-only snapshot for the PDF exporter", body = ReportExportResponse),
        (status = 403, description = "Access denied", body = AppError),
    ),
    tag = "reports"
)]
pub async fn export_report(
    Extension(db): Extension<DatabaseConnection>,
    Extension(hub): Extension<BroadcastHub>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let service = ReportService::new(db, hub);
    let (report, history) = service.export(&identity, id).await?;

    Ok(ApiResponse::ok(ReportExportResponse {
        report: ReportResponse::from(report),
        history: history.into_iter().map(HistoryEntryResponse::from).collect(),
    }))
}
