use super::super::dto::HealthResponse;
use axum::Json;

#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses(
        (status = 200, description = "サービス稼働中", body = HealthResponse)
    )
)]
pub(crate) async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "寄り道マップ API".to_string(),
    })
}
