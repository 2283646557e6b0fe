#[cfg(test)]
use std::collections::VecDeque;
#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};
#[cfg(test)]
use std::sync::Mutex;
#[cfg(test)]
use std::time::Duration;

#[cfg(test)]
use async_trait::async_trait;

#[cfg(test)]
use crate::api::client::{ApiError, ChatBackend};
#[cfg(test)]
use crate::api::{
    AccountRequest, BasicResponse, ChatReply, ChatRequest, HistoryListResponse,
    HistoryMessagesResponse, HistoryRequest, LoginRequest, LoginResponse, PurchaseRequest,
    PurchaseResponse, QuotaResponse, RegisterRequest, RegisterResponse,
};
#[cfg(test)]
use crate::core::purchase::BillingGateway;

/// A transport-level failure, as when the network drops before any HTTP
/// response arrives.
#[cfg(test)]
pub fn transport_error(endpoint: &'static str) -> ApiError {
    ApiError::Transport {
        endpoint,
        source: "connection reset by peer".into(),
    }
}

#[cfg(test)]
pub fn chat_reply(text: &str, chats: i64) -> ChatReply {
    ChatReply {
        allowed: Some(true),
        reply: Some(text.to_string()),
        chats: Some(chats),
        error: None,
    }
}

/// Scripted in-memory [`ChatBackend`]. Tests push responses per endpoint and
/// the fake pops them in order; running out of script is a test bug and
/// panics.
#[cfg(test)]
#[derive(Default)]
pub struct FakeBackend {
    chat_script: Mutex<VecDeque<Result<ChatReply, ApiError>>>,
    quota_script: Mutex<VecDeque<Result<QuotaResponse, ApiError>>>,
    verify_script: Mutex<VecDeque<Result<PurchaseResponse, ApiError>>>,
    register_script: Mutex<VecDeque<Result<RegisterResponse, ApiError>>>,
    login_script: Mutex<VecDeque<Result<LoginResponse, ApiError>>>,
    chat_count: AtomicUsize,
    verify_count: AtomicUsize,
    verify_delay_ms: AtomicUsize,
}

#[cfg(test)]
impl FakeBackend {
    pub fn push_chat(&self, response: Result<ChatReply, ApiError>) {
        self.chat_script.lock().unwrap().push_back(response);
    }

    pub fn push_quota(&self, response: Result<i64, ApiError>) {
        let response = response.map(|chats| QuotaResponse {
            chats: Some(chats),
            error: None,
        });
        self.quota_script.lock().unwrap().push_back(response);
    }

    pub fn push_verify(&self, response: Result<PurchaseResponse, ApiError>) {
        self.verify_script.lock().unwrap().push_back(response);
    }

    pub fn push_register(&self, response: Result<RegisterResponse, ApiError>) {
        self.register_script.lock().unwrap().push_back(response);
    }

    pub fn push_login(&self, response: Result<LoginResponse, ApiError>) {
        self.login_script.lock().unwrap().push_back(response);
    }

    /// Delay applied inside `verify_purchase`, for tests that need two
    /// deliveries of the same token to overlap.
    pub fn set_verify_delay_ms(&self, ms: usize) {
        self.verify_delay_ms.store(ms, Ordering::SeqCst);
    }

    pub fn chat_calls(&self) -> usize {
        self.chat_count.load(Ordering::SeqCst)
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_count.load(Ordering::SeqCst)
    }

    fn pop<T>(script: &Mutex<VecDeque<Result<T, ApiError>>>, endpoint: &str) -> Result<T, ApiError> {
        script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("FakeBackend: no scripted response for {endpoint}"))
    }
}

#[cfg(test)]
#[async_trait]
impl ChatBackend for FakeBackend {
    async fn register(&self, _req: &RegisterRequest) -> Result<RegisterResponse, ApiError> {
        Self::pop(&self.register_script, "auth/register")
    }

    async fn login(&self, _req: &LoginRequest) -> Result<LoginResponse, ApiError> {
        Self::pop(&self.login_script, "auth/login")
    }

    async fn chat(&self, _req: &ChatRequest) -> Result<ChatReply, ApiError> {
        self.chat_count.fetch_add(1, Ordering::SeqCst);
        Self::pop(&self.chat_script, "chat")
    }

    async fn remaining_chats(&self, _req: &AccountRequest) -> Result<QuotaResponse, ApiError> {
        Self::pop(&self.quota_script, "user/chats")
    }

    async fn verify_purchase(&self, _req: &PurchaseRequest) -> Result<PurchaseResponse, ApiError> {
        self.verify_count.fetch_add(1, Ordering::SeqCst);
        let delay = self.verify_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }
        Self::pop(&self.verify_script, "purchase/verify")
    }

    async fn history_list(&self, _req: &AccountRequest) -> Result<HistoryListResponse, ApiError> {
        Ok(HistoryListResponse { chats: Vec::new() })
    }

    async fn history_messages(
        &self,
        _req: &HistoryRequest,
    ) -> Result<HistoryMessagesResponse, ApiError> {
        Ok(HistoryMessagesResponse {
            messages: Vec::new(),
            count: Some(0),
        })
    }

    async fn hide_history(&self, _req: &AccountRequest) -> Result<BasicResponse, ApiError> {
        Ok(BasicResponse {
            success: Some("ok".to_string()),
            error: None,
        })
    }
}

/// [`BillingGateway`] that records every consume signal.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingBilling {
    consumed: Mutex<Vec<String>>,
    fail_next: Mutex<bool>,
}

#[cfg(test)]
impl RecordingBilling {
    pub fn consumed(&self) -> Vec<String> {
        self.consumed.lock().unwrap().clone()
    }

    pub fn fail_next_consume(&self) {
        *self.fail_next.lock().unwrap() = true;
    }
}

#[cfg(test)]
#[async_trait]
impl BillingGateway for RecordingBilling {
    async fn consume(&self, token: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut fail = self.fail_next.lock().unwrap();
        if *fail {
            *fail = false;
            return Err("billing service unavailable".into());
        }
        self.consumed.lock().unwrap().push(token.to_string());
        Ok(())
    }
}
