use crate::application::history;
use crate::maps::MapsApi;
use crate::model::{
    FunctionDeclaration, GenerateRequest, GenerateResponse, ModelError, ModelProvider,
};
use crate::types::{HistoryMessage, Part, Place, Route, Turn, TurnRole};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

const SYSTEM_PROMPT: &str = "あなたはGoogle Mapsと連携したプロのドライブコンシェルジュです。\n\
ユーザーの要望（「海が見たい」「ラーメン食べたい」）に応じて、\n\
toolsを使用して最適なプランを提案してください。\n\
\n\
ルール:\n\
1. 場所やルートの質問には必ずツール(search_places, calculate_route)を使って実データで答えること。\n\
2. ルートを計算した際は、料金(tolls)や所要時間を比較してアドバイスすること。\n\
3. ユーザーが「そこに寄る」「そのルートで」と決めたら、必ず calculate_route を再度呼び出してルートを確定させること。\n\
4. 常に明るく、ワクワクする口調で話すこと。\n";

const BUSY_REPLY: &str = "サーバーが混み合っています。しばらく待ってから再度お試しください。";

const DEFAULT_MAX_HISTORY: usize = 10;
/// Hard cap on automatic tool invocations per user turn.
const DEFAULT_MAX_TOOL_CALLS: usize = 5;

/// Backoff for the transient-overload signal from the model provider.
/// Three attempts total; sleeps double starting at one second (1s, 2s).
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    fn backoff_delay(&self, attempt: u32) -> Duration {
        self.initial_backoff * 2u32.saturating_pow(attempt)
    }
}

#[derive(Debug, Clone)]
pub struct ConciergeConfig {
    pub max_history: usize,
    pub max_tool_calls: usize,
    pub retry: RetryPolicy,
}

impl Default for ConciergeConfig {
    fn default() -> Self {
        Self {
            max_history: DEFAULT_MAX_HISTORY,
            max_tool_calls: DEFAULT_MAX_TOOL_CALLS,
            retry: RetryPolicy::default(),
        }
    }
}

/// Result of one chat round trip. `route`/`places` are present only when
/// the corresponding tool produced usable output during the turn.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub reply: String,
    pub route: Option<Route>,
    pub places: Option<Vec<Place>>,
}

#[derive(Debug, Error)]
pub enum ConciergeError {
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl ConciergeError {
    pub fn user_message(&self) -> String {
        match self {
            ConciergeError::Model(err) => err.user_message(),
        }
    }
}

/// A waypoint candidate proposed by the model.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WaypointCandidate {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coords: Option<crate::types::Coordinates>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaypointSuggestion {
    pub waypoints: Vec<WaypointCandidate>,
    pub ai_comment: String,
}

#[derive(Debug, Error)]
pub enum SuggestionError {
    #[error("model provider rate limited the suggestion request")]
    RateLimited,
    #[error("waypoint suggestion failed")]
    Failed,
}

impl SuggestionError {
    pub fn user_message(&self) -> String {
        match self {
            SuggestionError::RateLimited => {
                "リクエストが集中しています。しばらく待ってから再度お試しください。".to_string()
            }
            SuggestionError::Failed => {
                "経由地の提案に失敗しました。しばらく待ってから再度お試しください。".to_string()
            }
        }
    }
}

/// Tool-calling orchestrator. Owns the system prompt, the two declared
/// tool schemas, automatic dispatch to the mapping client, and retry for
/// transient provider overload. One instance is shared for the process
/// lifetime; each call is an independent round trip.
pub struct Concierge<P: ModelProvider, M: MapsApi> {
    provider: Arc<P>,
    maps: Arc<M>,
    config: ConciergeConfig,
}

impl<P: ModelProvider, M: MapsApi> Concierge<P, M> {
    pub fn new(provider: Arc<P>, maps: Arc<M>, config: ConciergeConfig) -> Self {
        Self {
            provider,
            maps,
            config,
        }
    }

    /// One conversational turn: history preparation, the tool-calling loop,
    /// and extraction of the last usable tool results from the transcript.
    pub async fn send_message(
        &self,
        message: &str,
        raw_history: &[HistoryMessage],
    ) -> Result<ChatOutcome, ConciergeError> {
        info!("Chat turn started");
        let window = history::truncate(raw_history, self.config.max_history);
        let mut transcript = history::adapt(window);
        transcript.push(Turn::text(TurnRole::User, message));

        let declarations = tool_declarations();
        let mut dispatched = 0usize;

        let reply = loop {
            let request = GenerateRequest {
                system_instruction: Some(SYSTEM_PROMPT.to_string()),
                contents: transcript.clone(),
                tools: declarations.clone(),
                response_schema: None,
            };
            let response = match self.generate_with_retry(request).await {
                Ok(response) => response,
                Err(ModelError::Overloaded { status }) => {
                    warn!(status, "Model overloaded after all retries; returning busy reply");
                    return Ok(ChatOutcome {
                        reply: BUSY_REPLY.to_string(),
                        route: None,
                        places: None,
                    });
                }
                Err(other) => return Err(other.into()),
            };

            let calls = response.function_calls();
            transcript.push(Turn {
                role: TurnRole::Model,
                parts: response.parts.clone(),
            });

            if calls.is_empty() {
                break response.text();
            }
            if dispatched >= self.config.max_tool_calls {
                warn!(dispatched, "Tool dispatch limit reached; ending turn");
                break response.text();
            }

            for (name, args) in calls {
                if dispatched >= self.config.max_tool_calls {
                    break;
                }
                dispatched += 1;
                info!(tool = name.as_str(), "Model requested tool execution");
                let result = self.dispatch(&name, &args).await;
                transcript.push(Turn::function_response(name, result));
            }
        };

        let (route, places) = extract_results(&transcript);
        info!(
            route = route.is_some(),
            places = places.is_some(),
            dispatched,
            "Chat turn completed"
        );
        Ok(ChatOutcome {
            reply,
            route,
            places,
        })
    }

    /// Ask the model for exactly three waypoint candidates as structured
    /// output; no tool calling is involved.
    pub async fn suggest_waypoints(
        &self,
        origin: &str,
        destination: &str,
        prompt: &str,
    ) -> Result<WaypointSuggestion, SuggestionError> {
        let user_prompt = format!(
            "出発地「{origin}」から目的地「{destination}」へのドライブで、\
             希望「{prompt}」に合う立ち寄りスポットをちょうど3件提案してください。\
             それぞれ name（スポット名）と description（短い紹介文）を必ず含め、\
             可能なら address と coords も含めてください。\
             全体への一言コメントを ai_comment に入れてください。"
        );
        let request = GenerateRequest {
            system_instruction: Some(SYSTEM_PROMPT.to_string()),
            contents: vec![Turn::text(TurnRole::User, user_prompt)],
            tools: Vec::new(),
            response_schema: Some(suggestion_schema()),
        };

        let response = match self.generate_with_retry(request).await {
            Ok(response) => response,
            Err(ModelError::Overloaded { status }) => {
                warn!(status, "Suggestion request rate limited after all retries");
                return Err(SuggestionError::RateLimited);
            }
            Err(err) => {
                warn!(%err, "Suggestion request failed");
                return Err(SuggestionError::Failed);
            }
        };

        let suggestion: WaypointSuggestion = serde_json::from_str(&response.text())
            .map_err(|err| {
                warn!(%err, "Suggestion response was not valid structured output");
                SuggestionError::Failed
            })?;
        info!(candidates = suggestion.waypoints.len(), "Waypoint suggestion completed");
        Ok(suggestion)
    }

    async fn generate_with_retry(
        &self,
        request: GenerateRequest,
    ) -> Result<GenerateResponse, ModelError> {
        let policy = &self.config.retry;
        let mut attempt = 0u32;
        loop {
            match self.provider.generate(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(ModelError::Overloaded { status }) if attempt + 1 < policy.max_attempts => {
                    let delay = policy.backoff_delay(attempt);
                    warn!(
                        status,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Model provider overloaded; backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Closed-set dispatch: the model may only name one of the two declared
    /// tools. The result (payload or tagged error) always flows back into
    /// the transcript; tool failures are terminal for that call.
    async fn dispatch(&self, name: &str, args: &Value) -> Value {
        match name {
            "search_places" => {
                let location_query = args
                    .get("location_query")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let place_type = args
                    .get("place_type")
                    .and_then(Value::as_str)
                    .unwrap_or("restaurant");
                match self.maps.search_places(location_query, place_type).await {
                    Ok(places) => json!({ "results": places }),
                    Err(err) => {
                        debug!(%err, "search_places returned a domain error");
                        err.to_tool_result()
                    }
                }
            }
            "calculate_route" => {
                let origin = args.get("origin").and_then(Value::as_str).unwrap_or_default();
                let destination = args
                    .get("destination")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let waypoints: Vec<String> = args
                    .get("waypoints")
                    .and_then(Value::as_array)
                    .map(|list| {
                        list.iter()
                            .filter_map(Value::as_str)
                            .map(String::from)
                            .collect()
                    })
                    .unwrap_or_default();
                match self.maps.calculate_route(origin, destination, &waypoints).await {
                    Ok(route) => serde_json::to_value(&route).unwrap_or(Value::Null),
                    Err(err) => {
                        debug!(%err, "calculate_route returned a domain error");
                        err.to_tool_result()
                    }
                }
            }
            other => {
                warn!(tool = other, "Model requested an undeclared tool");
                json!({ "error": format!("unknown tool: {other}"), "error_type": "api_failure" })
            }
        }
    }
}

/// Fold over the transcript keeping the last non-error result of each tool.
fn extract_results(transcript: &[Turn]) -> (Option<Route>, Option<Vec<Place>>) {
    let mut route = None;
    let mut places = None;
    for turn in transcript {
        for part in &turn.parts {
            let Part::FunctionResponse { name, response } = part else {
                continue;
            };
            if response.get("error").is_some() {
                continue;
            }
            match name.as_str() {
                "calculate_route" => {
                    if let Ok(parsed) = serde_json::from_value::<Route>(response.clone()) {
                        route = Some(parsed);
                    }
                }
                "search_places" => {
                    if let Some(results) = response.get("results")
                        && let Ok(parsed) = serde_json::from_value::<Vec<Place>>(results.clone())
                    {
                        places = Some(parsed);
                    }
                }
                _ => {}
            }
        }
    }
    (route, places)
}

fn tool_declarations() -> Vec<FunctionDeclaration> {
    vec![
        FunctionDeclaration {
            name: "search_places".into(),
            description: "指定した場所の周辺でスポットを検索します。".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "location_query": {
                        "type": "string",
                        "description": "検索する場所やエリア名（例: '箱根', '東京駅周辺'）"
                    },
                    "place_type": {
                        "type": "string",
                        "description": "検索する施設の種類（例: 'restaurant', 'tourist_attraction', 'cafe'）"
                    }
                },
                "required": ["location_query"]
            }),
        },
        FunctionDeclaration {
            name: "calculate_route".into(),
            description: "出発地から目的地までのドライブルートを計算します。経由地も指定できます。"
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "origin": { "type": "string", "description": "出発地（例: '東京駅'）" },
                    "destination": { "type": "string", "description": "目的地（例: '箱根湯本駅'）" },
                    "waypoints": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "経由地のリスト（例: ['手打ち蕎麦 山路']）"
                    }
                },
                "required": ["origin", "destination"]
            }),
        },
    ]
}

fn suggestion_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "waypoints": {
                "type": "array",
                "minItems": 3,
                "maxItems": 3,
                "items": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "description": { "type": "string" },
                        "address": { "type": "string" },
                        "coords": {
                            "type": "object",
                            "properties": {
                                "latitude": { "type": "number" },
                                "longitude": { "type": "number" }
                            },
                            "required": ["latitude", "longitude"]
                        }
                    },
                    "required": ["name", "description"]
                }
            },
            "ai_comment": { "type": "string" }
        },
        "required": ["waypoints", "ai_comment"]
    })
}
