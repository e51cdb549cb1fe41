mod dto;
mod routes;
mod state;

use crate::concierge::{Concierge, WaypointCandidate};
use crate::maps::MapsApi;
use crate::model::ModelProvider;
use crate::types::{Coordinates, HistoryMessage, Place, Route, Toll};
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use dto::{
    ChatRequest, ChatResponse, ErrorResponse, HealthResponse, RouteRequest, RouteResponse,
    WaypointSuggestRequest, WaypointSuggestResponse,
};
use state::ServerState;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind HTTP listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("HTTP server error: {0}")]
    Serve(#[from] std::io::Error),
}

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::chat::chat_handler,
        routes::route::calculate_route_handler,
        routes::route::return_route_handler,
        routes::waypoints::suggest_handler,
        routes::health::health_handler
    ),
    components(
        schemas(
            ChatRequest,
            ChatResponse,
            RouteRequest,
            RouteResponse,
            WaypointSuggestRequest,
            WaypointSuggestResponse,
            ErrorResponse,
            HealthResponse,
            HistoryMessage,
            Route,
            Place,
            Toll,
            Coordinates,
            WaypointCandidate
        )
    ),
    tags(
        (name = "navigation", description = "チャット・ルート計算・経由地提案"),
        (name = "health", description = "死活監視")
    )
)]
struct ApiDoc;

pub async fn serve<P, M>(
    concierge: Arc<Concierge<P, M>>,
    maps: Arc<M>,
    addr: SocketAddr,
) -> Result<(), ServerError>
where
    P: ModelProvider + 'static,
    M: MapsApi + 'static,
{
    let api = ApiDoc::openapi();
    info!(%addr, "Binding REST server");

    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
        ])
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let state = Arc::new(ServerState::new(concierge, maps));
    let app = Router::new()
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", api))
        .route("/api/health", get(routes::health::health_handler))
        .route(
            "/api/navigation/chat",
            post(routes::chat::chat_handler::<P, M>),
        )
        .route(
            "/api/navigation/calculate-route",
            post(routes::route::calculate_route_handler::<P, M>),
        )
        .route(
            "/api/navigation/return-route",
            post(routes::route::return_route_handler::<P, M>),
        )
        .route(
            "/api/navigation/suggest-waypoints",
            post(routes::waypoints::suggest_handler::<P, M>),
        )
        .layer(cors)
        .with_state(state);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    info!(%addr, "REST server ready to accept connections");

    axum::serve(listener, app.into_make_service())
        .await
        .map_err(ServerError::Serve)
}
