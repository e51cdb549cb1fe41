use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Model,
}

impl TurnRole {
    pub fn as_str(self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Model => "model",
        }
    }
}

/// A single part of a conversation turn. A model response may interleave
/// text with function calls; function responses are fed back as user parts.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    FunctionCall { name: String, args: Value },
    FunctionResponse { name: String, response: Value },
}

/// One entry of the chat transcript. Turns are append-only; the transcript
/// is never rewritten once a turn has been added.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: TurnRole,
    pub parts: Vec<Part>,
}

impl Turn {
    pub fn text(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![Part::Text(content.into())],
        }
    }

    pub fn function_response(name: impl Into<String>, response: Value) -> Self {
        Self {
            role: TurnRole::User,
            parts: vec![Part::FunctionResponse {
                name: name.into(),
                response,
            }],
        }
    }
}

/// A chat history entry as the frontend sends it. Roles other than "user"
/// (including "assistant") are treated as model turns.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct HistoryMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// A spot returned by place search. Absent provider fields fall back to
/// sentinel values instead of failing the whole result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Place {
    pub name: String,
    pub address: String,
    pub rating: f64,
    pub coords: Coordinates,
    pub price_level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Toll {
    #[serde(rename = "currencyCode")]
    pub currency_code: String,
    pub units: String,
}

/// A computed drive route. The record is a snapshot of the provider
/// response; only `google_maps_url` is attached afterwards, by the handler
/// layer. `waypoints` reflects the order actually driven when the provider
/// optimized it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Route {
    pub origin: String,
    pub destination: String,
    pub waypoints: Vec<String>,
    #[serde(default)]
    pub waypoint_coords: Vec<Coordinates>,
    pub duration_seconds: String,
    pub distance_meters: u64,
    pub encoded_polyline: String,
    #[serde(default)]
    pub tolls: Vec<Toll>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_maps_url: Option<String>,
}
