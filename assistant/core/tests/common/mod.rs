//! Scripted assistant backend shared by the integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assistant_core::{
    ApiError, AssistantApi, ByteStream, ChatRequest, ConversationSummary, CreateSessionRequest,
    MessageDto, ScheduleDto, SessionInfo,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;

/// How the next chat stream behaves
#[derive(Clone, Debug)]
pub enum StreamScript {
    /// Yield these fragments, then end
    Fragments(Vec<&'static str>),
    /// Yield these fragments, then fail with an I/O error
    FailAfter(Vec<&'static str>, &'static str),
    /// Yield these fragments, then never end
    Hang(Vec<&'static str>),
    /// Answer with a non-2xx status
    Status(u16),
}

/// In-memory [`AssistantApi`] with scripted answers and call recording
#[derive(Default)]
pub struct ScriptedApi {
    pub session_ids: Mutex<VecDeque<Result<String, u16>>>,
    pub session_delay: Option<Duration>,
    pub streams: Mutex<VecDeque<StreamScript>>,
    pub conversations: Mutex<Vec<ConversationSummary>>,
    pub history: Mutex<Vec<MessageDto>>,
    pub history_status: Option<u16>,
    pub schedules: Mutex<Vec<ScheduleDto>>,
    pub session_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    /// Each conversation list call waits for a permit
    pub list_gate: Option<Arc<Semaphore>>,
    pub chat_requests: Mutex<Vec<ChatRequest>>,
    pub deleted: Mutex<Vec<String>>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(self, id: &str) -> Self {
        self.session_ids.lock().unwrap().push_back(Ok(id.to_string()));
        self
    }

    pub fn with_session_failure(self, status: u16) -> Self {
        self.session_ids.lock().unwrap().push_back(Err(status));
        self
    }

    pub fn with_session_delay(mut self, delay: Duration) -> Self {
        self.session_delay = Some(delay);
        self
    }

    pub fn with_stream(self, script: StreamScript) -> Self {
        self.streams.lock().unwrap().push_back(script);
        self
    }

    pub fn with_history(self, history: Vec<MessageDto>) -> Self {
        *self.history.lock().unwrap() = history;
        self
    }

    pub fn with_conversations(self, conversations: Vec<ConversationSummary>) -> Self {
        *self.conversations.lock().unwrap() = conversations;
        self
    }

    pub fn with_list_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.list_gate = Some(gate);
        self
    }

    pub fn session_calls(&self) -> usize {
        self.session_calls.load(Ordering::SeqCst)
    }

    pub fn chat_requests(&self) -> Vec<ChatRequest> {
        self.chat_requests.lock().unwrap().clone()
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

fn fragments(parts: &[&'static str]) -> Vec<std::io::Result<Vec<u8>>> {
    parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect()
}

#[async_trait]
impl AssistantApi for ScriptedApi {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn create_session(
        &self,
        _request: &CreateSessionRequest,
    ) -> Result<SessionInfo, ApiError> {
        self.session_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.session_delay {
            tokio::time::sleep(delay).await;
        }
        let next = self
            .session_ids
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok("s-default".to_string()));
        match next {
            Ok(id) => Ok(SessionInfo {
                id,
                title: Some("New chat".to_string()),
                created_at: None,
            }),
            Err(status) => Err(ApiError::Http {
                status,
                body: String::new(),
            }),
        }
    }

    async fn open_chat_stream(&self, request: &ChatRequest) -> Result<ByteStream, ApiError> {
        self.chat_requests.lock().unwrap().push(request.clone());
        let script = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(StreamScript::Fragments(Vec::new()));

        match script {
            StreamScript::Fragments(parts) => Ok(stream::iter(fragments(&parts)).boxed()),
            StreamScript::FailAfter(parts, reason) => {
                let mut items = fragments(&parts);
                items.push(Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    reason,
                )));
                Ok(stream::iter(items).boxed())
            }
            StreamScript::Hang(parts) => Ok(stream::iter(fragments(&parts))
                .chain(stream::pending())
                .boxed()),
            StreamScript::Status(status) => Err(ApiError::Http {
                status,
                body: "Internal Server Error".to_string(),
            }),
        }
    }

    async fn list_conversations(
        &self,
        _user_id: &str,
    ) -> Result<Vec<ConversationSummary>, ApiError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.list_gate {
            gate.acquire().await.unwrap().forget();
        }
        Ok(self.conversations.lock().unwrap().clone())
    }

    async fn conversation_messages(
        &self,
        _conversation_id: &str,
    ) -> Result<Vec<MessageDto>, ApiError> {
        if let Some(status) = self.history_status {
            return Err(ApiError::Http {
                status,
                body: String::new(),
            });
        }
        Ok(self.history.lock().unwrap().clone())
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ApiError> {
        self.deleted
            .lock()
            .unwrap()
            .push(conversation_id.to_string());
        self.conversations
            .lock()
            .unwrap()
            .retain(|c| c.id != conversation_id);
        Ok(())
    }

    async fn list_schedules(&self, _user_id: &str) -> Result<Vec<ScheduleDto>, ApiError> {
        Ok(self.schedules.lock().unwrap().clone())
    }

    async fn schedules_in_range(
        &self,
        _user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ScheduleDto>, ApiError> {
        let schedules = self.schedules.lock().unwrap().clone();
        Ok(schedules
            .into_iter()
            .filter(|s| {
                NaiveDate::parse_from_str(&s.date, "%Y-%m-%d")
                    .is_ok_and(|d| d >= start && d <= end)
            })
            .collect())
    }
}

pub fn summary(id: &str, title: &str) -> ConversationSummary {
    ConversationSummary {
        id: id.to_string(),
        title: title.to_string(),
        last_message: None,
        message_count: 0,
        created_at: None,
        updated_at: None,
    }
}
