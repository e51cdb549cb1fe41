use crate::config::GeminiConfig;
use crate::types::{Part, Turn};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

/// One round trip to the model. `tools` carries the declared function
/// schemas; `response_schema` switches the call into structured-output mode
/// (the two are never combined by callers).
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub system_instruction: Option<String>,
    pub contents: Vec<Turn>,
    pub tools: Vec<FunctionDeclaration>,
    pub response_schema: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone)]
pub struct GenerateResponse {
    pub parts: Vec<Part>,
}

impl GenerateResponse {
    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn function_calls(&self) -> Vec<(String, Value)> {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::FunctionCall { name, args } => Some((name.clone(), args.clone())),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model provider requires an API key")]
    MissingApiKey,
    #[error("model provider is overloaded (status {status})")]
    Overloaded { status: u16 },
    #[error("network error calling model provider: {0}")]
    Network(#[from] reqwest::Error),
    #[error("model provider returned invalid response: {0}")]
    InvalidResponse(String),
}

impl ModelError {
    pub fn user_message(&self) -> String {
        match self {
            ModelError::MissingApiKey => {
                "サービスの設定に問題があります。管理者にお問い合わせください。".to_string()
            }
            _ => "AIとの通信に失敗しました。しばらく待ってから再度お試しください。".to_string(),
        }
    }
}

#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, ModelError>;
}

/// REST client for the Gemini `generateContent` endpoint.
#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig) -> Self {
        Self {
            http: Client::new(),
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        }
    }

    fn request_url(&self) -> String {
        let base = self.endpoint.trim_end_matches('/');
        format!("{base}/v1beta/models/{}:generateContent", self.model)
    }
}

#[async_trait]
impl ModelProvider for GeminiClient {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, ModelError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ModelError::MissingApiKey)?;
        let url = self.request_url();
        let payload = build_payload(&request);

        info!(
            model = self.model.as_str(),
            contents = request.contents.len(),
            tools = request.tools.len(),
            "Sending request to Gemini"
        );

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE {
            return Err(ModelError::Overloaded {
                status: status.as_u16(),
            });
        }
        let body: WireResponse = response.error_for_status()?.json().await?;
        debug!("Received response from Gemini");

        parse_response(body)
    }
}

fn build_payload(request: &GenerateRequest) -> Value {
    let contents: Vec<WireContent> = request.contents.iter().map(WireContent::from).collect();
    let mut payload = serde_json::json!({ "contents": contents });

    if let Some(system) = &request.system_instruction {
        payload["systemInstruction"] = serde_json::json!({ "parts": [{ "text": system }] });
    }
    if !request.tools.is_empty() {
        payload["tools"] = serde_json::json!([{ "functionDeclarations": request.tools }]);
    }
    if let Some(schema) = &request.response_schema {
        payload["generationConfig"] = serde_json::json!({
            "responseMimeType": "application/json",
            "responseSchema": schema,
        });
    }
    payload
}

fn parse_response(body: WireResponse) -> Result<GenerateResponse, ModelError> {
    let content = body
        .candidates
        .unwrap_or_default()
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .ok_or_else(|| ModelError::InvalidResponse("missing candidates".into()))?;

    let parts = content
        .parts
        .into_iter()
        .filter_map(|part| {
            if let Some(text) = part.text {
                Some(Part::Text(text))
            } else {
                part.function_call.map(|call| Part::FunctionCall {
                    name: call.name,
                    args: call.args,
                })
            }
        })
        .collect();

    Ok(GenerateResponse { parts })
}

#[derive(Serialize)]
struct WireContent {
    role: &'static str,
    parts: Vec<WirePart>,
}

impl From<&Turn> for WireContent {
    fn from(turn: &Turn) -> Self {
        Self {
            role: turn.role.as_str(),
            parts: turn.parts.iter().map(WirePart::from).collect(),
        }
    }
}

#[derive(Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<WireFunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_response: Option<WireFunctionResponse>,
}

impl From<&Part> for WirePart {
    fn from(part: &Part) -> Self {
        match part {
            Part::Text(text) => WirePart {
                text: Some(text.clone()),
                ..Default::default()
            },
            Part::FunctionCall { name, args } => WirePart {
                function_call: Some(WireFunctionCall {
                    name: name.clone(),
                    args: args.clone(),
                }),
                ..Default::default()
            },
            Part::FunctionResponse { name, response } => WirePart {
                function_response: Some(WireFunctionResponse {
                    name: name.clone(),
                    response: response.clone(),
                }),
                ..Default::default()
            },
        }
    }
}

#[derive(Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Serialize, Deserialize)]
struct WireFunctionResponse {
    name: String,
    response: Value,
}

#[derive(Deserialize)]
struct WireResponse {
    candidates: Option<Vec<WireCandidate>>,
}

#[derive(Deserialize)]
struct WireCandidate {
    content: Option<WireResponseContent>,
}

#[derive(Deserialize)]
struct WireResponseContent {
    #[serde(default)]
    parts: Vec<WirePart>,
}
