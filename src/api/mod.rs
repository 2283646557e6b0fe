pub mod client;

use serde::{Deserialize, Serialize};

#[derive(Serialize, Clone)]
pub struct RegisterRequest {
    pub email: String,
    pub age: u32,
    pub sex: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RegisterResponse {
    pub success: Option<String>,
    pub chats: Option<i64>,
    pub error: Option<String>,
}

#[derive(Serialize, Clone)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginResponse {
    pub success: Option<String>,
    pub email: Option<String>,
    pub chats: Option<i64>,
    pub error: Option<String>,
}

#[derive(Serialize, Clone)]
pub struct ChatRequest {
    pub email: String,
    pub message: String,
    pub session_id: String,
}

#[derive(Deserialize)]
pub struct ChatReply {
    /// Absent on backends running in unmetered test deployments.
    pub allowed: Option<bool>,
    pub reply: Option<String>,
    pub chats: Option<i64>,
    pub error: Option<String>,
}

/// Request body shared by `user/chats`, `chat/history/list` and
/// `user/history/hide`.
#[derive(Serialize, Clone)]
pub struct AccountRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct QuotaResponse {
    pub chats: Option<i64>,
    pub error: Option<String>,
}

#[derive(Serialize, Clone)]
pub struct PurchaseRequest {
    pub email: String,
    pub purchase_token: String,
    pub product_id: String,
}

#[derive(Deserialize)]
pub struct PurchaseResponse {
    #[serde(default)]
    pub success: bool,
    pub chats_added: Option<i64>,
    pub remaining_chats: Option<i64>,
    pub message: Option<String>,
}

#[derive(Deserialize)]
pub struct SessionSummary {
    pub id: i64,
    pub title: String,
    pub preview: String,
    pub message_count: i64,
}

#[derive(Deserialize)]
pub struct HistoryListResponse {
    #[serde(default)]
    pub chats: Vec<SessionSummary>,
}

#[derive(Serialize, Clone)]
pub struct HistoryRequest {
    pub email: String,
    pub limit: u32,
    pub session_id: String,
}

#[derive(Deserialize)]
pub struct HistoryMessage {
    pub role: String,
    pub content: String,
    pub timestamp: Option<String>,
}

#[derive(Deserialize)]
pub struct HistoryMessagesResponse {
    #[serde(default)]
    pub messages: Vec<HistoryMessage>,
    pub count: Option<i64>,
}

#[derive(Deserialize)]
pub struct BasicResponse {
    pub success: Option<String>,
    pub error: Option<String>,
}
