use super::super::dto::{ChatRequest, ChatResponse, ErrorResponse};
use super::super::state::ServerState;
use crate::deep_link::generate_google_maps_url;
use crate::maps::MapsApi;
use crate::model::ModelProvider;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use std::sync::Arc;
use tracing::{error, info};

#[utoipa::path(
    post,
    path = "/api/navigation/chat",
    tag = "navigation",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "チャット応答", body = ChatResponse),
        (status = 400, description = "メッセージが空", body = ErrorResponse),
        (status = 503, description = "AIとの通信に失敗", body = ErrorResponse)
    )
)]
pub(crate) async fn chat_handler<P: ModelProvider, M: MapsApi>(
    State(state): State<Arc<ServerState<P, M>>>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<ErrorResponse>)> {
    info!(history_len = payload.history.len(), "Received chat request");

    if payload.message.trim().is_empty() {
        error!("Rejecting chat request due to empty message");
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                detail: "メッセージを入力してください。".to_string(),
            }),
        ));
    }

    match state
        .concierge()
        .send_message(&payload.message, &payload.history)
        .await
    {
        Ok(outcome) => {
            let route = outcome.route.map(|mut route| {
                route.google_maps_url = Some(generate_google_maps_url(
                    &route.origin,
                    &route.destination,
                    &route.waypoints,
                ));
                route
            });
            info!(route = route.is_some(), "Chat request completed");
            Ok(Json(ChatResponse {
                reply: outcome.reply,
                route,
                places: outcome.places,
            }))
        }
        Err(error) => {
            error!(%error, "Chat turn failed");
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    detail: error.user_message(),
                }),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concierge::{Concierge, ConciergeConfig};
    use crate::maps::MapsError;
    use crate::model::{GenerateRequest, GenerateResponse, ModelError};
    use crate::types::{Part, Place, Route};
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    struct ScriptedProvider {
        responses: Mutex<Vec<Result<GenerateResponse, ModelError>>>,
    }

    #[async_trait]
    impl ModelProvider for ScriptedProvider {
        async fn generate(
            &self,
            _request: GenerateRequest,
        ) -> Result<GenerateResponse, ModelError> {
            self.responses.lock().await.remove(0)
        }
    }

    struct StubMaps;

    #[async_trait]
    impl MapsApi for StubMaps {
        async fn search_places(
            &self,
            _location_query: &str,
            _place_type: &str,
        ) -> Result<Vec<Place>, MapsError> {
            Ok(Vec::new())
        }

        async fn calculate_route(
            &self,
            origin: &str,
            destination: &str,
            waypoints: &[String],
        ) -> Result<Route, MapsError> {
            Ok(Route {
                origin: origin.to_string(),
                destination: destination.to_string(),
                waypoints: waypoints.to_vec(),
                waypoint_coords: Vec::new(),
                duration_seconds: "3600s".into(),
                distance_meters: 50000,
                encoded_polyline: "abc123".into(),
                tolls: Vec::new(),
                google_maps_url: None,
            })
        }
    }

    fn state_with(
        responses: Vec<Result<GenerateResponse, ModelError>>,
    ) -> Arc<ServerState<ScriptedProvider, StubMaps>> {
        let provider = Arc::new(ScriptedProvider {
            responses: Mutex::new(responses),
        });
        let maps = Arc::new(StubMaps);
        let concierge = Arc::new(Concierge::new(
            provider,
            Arc::clone(&maps),
            ConciergeConfig::default(),
        ));
        Arc::new(ServerState::new(concierge, maps))
    }

    fn request(message: &str) -> ChatRequest {
        ChatRequest {
            message: message.to_string(),
            history: Vec::new(),
        }
    }

    #[tokio::test]
    async fn empty_message_is_rejected() {
        let state = state_with(vec![]);
        let result = chat_handler(State(state), Json(request("   "))).await;
        let (status, body) = result.expect_err("must reject");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.detail.contains("メッセージ"));
    }

    #[tokio::test]
    async fn route_in_outcome_gets_a_deep_link() {
        let state = state_with(vec![
            Ok(GenerateResponse {
                parts: vec![Part::FunctionCall {
                    name: "calculate_route".into(),
                    args: serde_json::json!({ "origin": "東京駅", "destination": "横浜駅" }),
                }],
            }),
            Ok(GenerateResponse {
                parts: vec![Part::Text("どうぞ！".into())],
            }),
        ]);
        let response = chat_handler(State(state), Json(request("横浜まで")))
            .await
            .expect("chat succeeds");
        let route = response.0.route.expect("route present");
        let url = route.google_maps_url.expect("deep link attached");
        assert!(url.starts_with("https://www.google.com/maps/dir/?api=1"));
        assert!(url.ends_with("&travelmode=driving"));
    }

    #[tokio::test]
    async fn provider_failure_maps_to_service_unavailable() {
        let state = state_with(vec![Err(ModelError::InvalidResponse(
            "no candidates".into(),
        ))]);
        let (status, body) = chat_handler(State(state), Json(request("やあ")))
            .await
            .expect_err("must fail");
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.detail.contains("AIとの通信に失敗"));
    }
}
