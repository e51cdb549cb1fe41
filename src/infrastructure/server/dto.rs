use crate::concierge::WaypointCandidate;
use crate::types::{HistoryMessage, Place, Route};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<HistoryMessage>,
}

/// `route` and `places` are null unless the corresponding tool ran
/// successfully during the turn.
#[derive(Debug, Serialize, ToSchema)]
pub struct ChatResponse {
    pub reply: String,
    pub route: Option<Route>,
    pub places: Option<Vec<Place>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RouteRequest {
    pub origin: String,
    pub destination: String,
    #[serde(default)]
    pub waypoints: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RouteResponse {
    pub route: Route,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct WaypointSuggestRequest {
    pub origin: String,
    pub destination: String,
    pub prompt: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WaypointSuggestResponse {
    pub waypoints: Vec<WaypointCandidate>,
    pub ai_comment: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub detail: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}
