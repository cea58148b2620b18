use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chat::{ConversationTurn, UserVisibleError};

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub session_id: Uuid,
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionRequest {
    pub session_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub session_id: Uuid,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub session_id: Uuid,
    pub reply: Option<String>,
    pub searched: bool,
    pub warning: Option<String>,
    pub error: Option<UserVisibleError>,
    pub turns: usize,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub session_id: Uuid,
    pub username: String,
    pub turns: Vec<ConversationTurn>,
}

/// Omitted fields are left unchanged; an empty `model` or `api_key` resets
/// that field to the server default.
#[derive(Debug, Serialize, Deserialize)]
pub struct SettingsUpdate {
    pub session_id: Uuid,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub api_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SettingsResponse {
    pub session_id: Uuid,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub api_key_configured: bool,
}
