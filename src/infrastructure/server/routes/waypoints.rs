use super::super::dto::{ErrorResponse, WaypointSuggestRequest, WaypointSuggestResponse};
use super::super::state::ServerState;
use crate::concierge::SuggestionError;
use crate::maps::MapsApi;
use crate::model::ModelProvider;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use std::sync::Arc;
use tracing::{error, info};

#[utoipa::path(
    post,
    path = "/api/navigation/suggest-waypoints",
    tag = "navigation",
    request_body = WaypointSuggestRequest,
    responses(
        (status = 200, description = "経由地の提案", body = WaypointSuggestResponse),
        (status = 429, description = "レート制限", body = ErrorResponse),
        (status = 503, description = "提案の生成に失敗", body = ErrorResponse)
    )
)]
pub(crate) async fn suggest_handler<P: ModelProvider, M: MapsApi>(
    State(state): State<Arc<ServerState<P, M>>>,
    Json(payload): Json<WaypointSuggestRequest>,
) -> Result<Json<WaypointSuggestResponse>, (StatusCode, Json<ErrorResponse>)> {
    info!("Received suggest-waypoints request");

    match state
        .concierge()
        .suggest_waypoints(&payload.origin, &payload.destination, &payload.prompt)
        .await
    {
        Ok(suggestion) => {
            info!(candidates = suggestion.waypoints.len(), "Suggestion completed");
            Ok(Json(WaypointSuggestResponse {
                waypoints: suggestion.waypoints,
                ai_comment: suggestion.ai_comment,
            }))
        }
        Err(err) => {
            error!(%err, "Waypoint suggestion failed");
            let status = match err {
                SuggestionError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                SuggestionError::Failed => StatusCode::SERVICE_UNAVAILABLE,
            };
            Err((
                status,
                Json(ErrorResponse {
                    detail: err.user_message(),
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
    use serde_json::json;
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
            _origin: &str,
            _destination: &str,
            _waypoints: &[String],
        ) -> Result<Route, MapsError> {
            Err(MapsError {
                kind: crate::maps::MapsErrorKind::ApiFailure,
                message: "unused".into(),
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

    fn request() -> WaypointSuggestRequest {
        WaypointSuggestRequest {
            origin: "東京駅".into(),
            destination: "箱根湯本駅".into(),
            prompt: "景色のいい場所".into(),
        }
    }

    #[tokio::test]
    async fn suggestion_is_returned_as_is() {
        let payload = json!({
            "waypoints": [
                { "name": "芦ノ湖", "description": "湖畔の絶景" },
                { "name": "大涌谷", "description": "黒たまご" },
                { "name": "彫刻の森美術館", "description": "屋外アート" }
            ],
            "ai_comment": "箱根満喫コースです！"
        });
        let state = state_with(vec![Ok(GenerateResponse {
            parts: vec![Part::Text(payload.to_string())],
        })]);
        let response = suggest_handler(State(state), Json(request()))
            .await
            .expect("suggestion succeeds");
        assert_eq!(response.0.waypoints.len(), 3);
        assert_eq!(response.0.waypoints[0].name, "芦ノ湖");
    }

    #[tokio::test]
    async fn unparseable_output_maps_to_service_unavailable() {
        let state = state_with(vec![Ok(GenerateResponse {
            parts: vec![Part::Text("not json".into())],
        })]);
        let (status, body) = suggest_handler(State(state), Json(request()))
            .await
            .expect_err("must fail");
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.detail.contains("提案に失敗"));
    }
}
