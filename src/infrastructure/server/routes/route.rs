use super::super::dto::{ErrorResponse, RouteRequest, RouteResponse};
use super::super::state::ServerState;
use crate::deep_link::generate_google_maps_url;
use crate::maps::{MapsApi, MapsErrorKind};
use crate::model::ModelProvider;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use std::sync::Arc;
use tracing::{error, info};

fn status_for(kind: MapsErrorKind) -> StatusCode {
    match kind {
        MapsErrorKind::NotFound => StatusCode::BAD_REQUEST,
        MapsErrorKind::RateLimit => StatusCode::TOO_MANY_REQUESTS,
        MapsErrorKind::ConfigMissing => StatusCode::SERVICE_UNAVAILABLE,
        MapsErrorKind::ApiFailure => StatusCode::BAD_GATEWAY,
    }
}

async fn compute<M: MapsApi>(
    maps: &M,
    origin: &str,
    destination: &str,
    waypoints: &[String],
) -> Result<Json<RouteResponse>, (StatusCode, Json<ErrorResponse>)> {
    if origin.trim().is_empty() || destination.trim().is_empty() {
        error!("Rejecting route request due to missing origin or destination");
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                detail: "出発地と目的地を指定してください。".to_string(),
            }),
        ));
    }

    match maps.calculate_route(origin, destination, waypoints).await {
        Ok(mut route) => {
            route.google_maps_url = Some(generate_google_maps_url(
                &route.origin,
                &route.destination,
                &route.waypoints,
            ));
            info!(
                distance_meters = route.distance_meters,
                waypoints = route.waypoints.len(),
                "Route computed"
            );
            Ok(Json(RouteResponse { route }))
        }
        Err(err) => {
            error!(%err, "Route computation failed");
            Err((
                status_for(err.kind),
                Json(ErrorResponse {
                    detail: err.message,
                }),
            ))
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/navigation/calculate-route",
    tag = "navigation",
    request_body = RouteRequest,
    responses(
        (status = 200, description = "ルート計算結果", body = RouteResponse),
        (status = 400, description = "入力不備またはルートなし", body = ErrorResponse),
        (status = 429, description = "レート制限", body = ErrorResponse),
        (status = 502, description = "Maps API障害", body = ErrorResponse),
        (status = 503, description = "APIキー未設定", body = ErrorResponse)
    )
)]
pub(crate) async fn calculate_route_handler<P: ModelProvider, M: MapsApi>(
    State(state): State<Arc<ServerState<P, M>>>,
    Json(payload): Json<RouteRequest>,
) -> Result<Json<RouteResponse>, (StatusCode, Json<ErrorResponse>)> {
    info!(waypoints = payload.waypoints.len(), "Received calculate-route request");
    compute(
        state.maps().as_ref(),
        &payload.origin,
        &payload.destination,
        &payload.waypoints,
    )
    .await
}

/// Same computation with origin and destination swapped and the waypoints
/// visited in reverse order.
#[utoipa::path(
    post,
    path = "/api/navigation/return-route",
    tag = "navigation",
    request_body = RouteRequest,
    responses(
        (status = 200, description = "帰路のルート計算結果", body = RouteResponse),
        (status = 400, description = "入力不備またはルートなし", body = ErrorResponse),
        (status = 429, description = "レート制限", body = ErrorResponse),
        (status = 502, description = "Maps API障害", body = ErrorResponse),
        (status = 503, description = "APIキー未設定", body = ErrorResponse)
    )
)]
pub(crate) async fn return_route_handler<P: ModelProvider, M: MapsApi>(
    State(state): State<Arc<ServerState<P, M>>>,
    Json(payload): Json<RouteRequest>,
) -> Result<Json<RouteResponse>, (StatusCode, Json<ErrorResponse>)> {
    info!(waypoints = payload.waypoints.len(), "Received return-route request");
    let reversed: Vec<String> = payload.waypoints.iter().rev().cloned().collect();
    compute(
        state.maps().as_ref(),
        &payload.destination,
        &payload.origin,
        &reversed,
    )
    .await
}
