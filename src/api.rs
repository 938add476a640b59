use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::model::CollectionKey;
use crate::stream::{decode_frame, LineBuffer, StreamEvent, StreamFrame};

#[derive(Serialize, Debug, Clone)]
pub struct ChatRequest {
    pub query: String,
    pub user_id: String,
    pub dog_id: String,
    pub conversation_id: String,
    pub assistant_id: String,
    pub limit: u32,
    pub model: String,
}

#[derive(Deserialize)]
struct FallbackAnswer {
    answer: String,
}

#[derive(Deserialize)]
struct UsersResponse {
    users: Vec<String>,
    #[allow(dead_code)]
    default: Option<String>,
}

#[derive(Deserialize)]
struct DogsResponse {
    dogs: Vec<String>,
    #[allow(dead_code)]
    default: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ConversationInfo {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub last_message_time: i64,
}

#[derive(Deserialize)]
struct ConversationsResponse {
    conversations: Vec<ConversationInfo>,
}

#[derive(Deserialize)]
struct HealthResponse {
    status: String,
}

/// One retrieved memory, flattened from the backend's nested result shape.
#[derive(Debug, Clone)]
pub struct MemoryHit {
    pub memory_type: String,
    pub content: String,
    pub score: Option<f64>,
}

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn health(&self) -> Result<String> {
        let url = format!("{}/api/health", self.base_url);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(anyhow!("health check failed: {}", response.status()));
        }
        let health: HealthResponse = response.json().await?;
        Ok(health.status)
    }

    pub async fn list_users(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/users", self.base_url);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(anyhow!("failed to list users: {}", response.status()));
        }
        let users: UsersResponse = response.json().await?;
        Ok(users.users)
    }

    pub async fn list_dogs(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/dogs", self.base_url);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(anyhow!("failed to list dogs: {}", response.status()));
        }
        let dogs: DogsResponse = response.json().await?;
        Ok(dogs.dogs)
    }

    pub async fn list_conversations(
        &self,
        user_id: &str,
        dog_id: &str,
    ) -> Result<Vec<ConversationInfo>> {
        let url = format!("{}/api/conversations", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("user_id", user_id), ("dog_id", dog_id)])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(anyhow!("failed to list conversations: {}", response.status()));
        }
        let conversations: ConversationsResponse = response.json().await?;
        Ok(conversations.conversations)
    }

    /// Free-text retrieval against one of the four memory collections.
    pub async fn search_memory(
        &self,
        collection: CollectionKey,
        query: &str,
        user_id: &str,
        assistant_id: &str,
        limit: u32,
    ) -> Result<Vec<MemoryHit>> {
        let url = format!("{}/api/memory/search", self.base_url);
        let body = json!({
            "collection_key": collection.as_str(),
            "query": query,
            "filter": {
                "memory_type": ["profile_v1", "event_v1"],
                "user_id": user_id,
                "assistant_id": assistant_id,
            },
            "limit": limit,
        });
        let response = self.client.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("memory search failed {}: {}", status, text));
        }
        let result: Value = response.json().await?;
        Ok(parse_search_result(&result))
    }

    /// Open the streaming chat request and drive it to its terminal event.
    ///
    /// Every outcome is reported through `emit`; exactly one terminal event
    /// (`Done`, `Complete`, or `Failed`) is emitted per call and nothing is
    /// emitted after it. Malformed frames are logged and skipped. A response
    /// that is not `text/event-stream` is treated as the non-streaming
    /// fallback and surfaced as one `Complete` body.
    pub async fn chat<F: Fn(StreamEvent)>(&self, request: ChatRequest, emit: F) {
        let url = format!("{}/api/debug/chat", self.base_url);
        tracing::info!(
            user_id = %request.user_id,
            dog_id = %request.dog_id,
            conversation_id = %request.conversation_id,
            model = %request.model,
            "opening chat stream"
        );

        let response = match self.client.post(&url).json(&request).send().await {
            Ok(resp) => resp,
            Err(e) => {
                emit(StreamEvent::Failed(format!("request failed: {}", e)));
                return;
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            emit(StreamEvent::Failed(format!("backend error {}: {}", status, body)));
            return;
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if !content_type.contains("text/event-stream") {
            match response.json::<FallbackAnswer>().await {
                Ok(fallback) => emit(StreamEvent::Complete(fallback.answer)),
                Err(e) => emit(StreamEvent::Failed(format!("unreadable response: {}", e))),
            }
            return;
        }

        let mut response = response;
        let mut lines = LineBuffer::new();
        let mut chunk_count = 0usize;
        loop {
            match response.chunk().await {
                Ok(Some(bytes)) => {
                    for line in lines.push(&bytes) {
                        if self.handle_line(&line, &mut chunk_count, &emit) {
                            return;
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    emit(StreamEvent::Failed(format!("stream read failed: {}", e)));
                    return;
                }
            }
        }

        if let Some(rest) = lines.remainder() {
            if self.handle_line(&rest, &mut chunk_count, &emit) {
                return;
            }
        }

        // The backend normally terminates with a done frame; treat a bare
        // EOF as completion of whatever arrived.
        tracing::debug!(chunk_count, "stream ended without a done frame");
        emit(StreamEvent::Done { full_answer: None });
    }

    /// Returns true once a terminal event has been emitted.
    fn handle_line<F: Fn(StreamEvent)>(
        &self,
        line: &str,
        chunk_count: &mut usize,
        emit: &F,
    ) -> bool {
        match decode_frame(line) {
            Ok(Some(frame)) => {
                let terminal = frame.is_terminal();
                match frame {
                    StreamFrame::Content(content) => {
                        *chunk_count += 1;
                        emit(StreamEvent::Delta(content));
                    }
                    StreamFrame::Done { full_answer } => {
                        tracing::info!(chunk_count, "chat stream complete");
                        emit(StreamEvent::Done { full_answer });
                    }
                    StreamFrame::Error(message) => {
                        tracing::error!(%message, "upstream error frame");
                        emit(StreamEvent::Failed(message));
                    }
                }
                terminal
            }
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(line, error = %e, "skipping malformed frame");
                false
            }
        }
    }
}

/// Flatten the backend's `{"data": {"count", "result_list": [...]}}` search
/// result. Content extraction depends on the memory type: events prefer their
/// summary over the raw messages, profiles use the profile text, anything
/// else falls back to generic fields. The literal string "null" counts as
/// absent throughout.
pub fn parse_search_result(result: &Value) -> Vec<MemoryHit> {
    let mut hits = Vec::new();
    let Some(list) = result
        .get("data")
        .and_then(|d| d.get("result_list"))
        .and_then(|l| l.as_array())
    else {
        return hits;
    };

    for item in list {
        let memory_type = item
            .get("memory_type")
            .and_then(|t| t.as_str())
            .unwrap_or("unknown")
            .to_string();
        let Some(content) = extract_memory_content(item, &memory_type) else {
            tracing::warn!(%memory_type, "memory hit without usable content");
            continue;
        };
        let score = item.get("score").and_then(|s| s.as_f64());
        hits.push(MemoryHit {
            memory_type,
            content,
            score,
        });
    }
    hits
}

fn extract_memory_content(item: &Value, memory_type: &str) -> Option<String> {
    let info = item.get("memory_info");
    let field = |name: &str| -> Option<String> {
        info.and_then(|i| i.get(name))
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("null"))
            .map(str::to_string)
    };

    let content = match memory_type {
        "event_v1" => field("summary").or_else(|| field("original_messages")),
        "profile_v1" => field("user_profile"),
        _ => field("memory").or_else(|| field("summary")),
    };

    content.or_else(|| {
        item.get("memory")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("null"))
            .map(str::to_string)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_malformed_line_between_content_frames_loses_no_text() {
        let client = ApiClient::new("http://localhost:8000");
        let events: RefCell<Vec<StreamEvent>> = RefCell::new(Vec::new());
        let emit = |event: StreamEvent| events.borrow_mut().push(event);

        let mut chunk_count = 0usize;
        let mut terminal = false;
        for line in [
            r#"data: {"content": "He", "done": false}"#,
            "data: {broken",
            r#"data: {"content": "llo", "done": false}"#,
        ] {
            terminal |= client.handle_line(line, &mut chunk_count, &emit);
        }

        // The bad line is skipped without terminating the stream, and both
        // surrounding chunks come through in order.
        assert!(!terminal);
        assert_eq!(chunk_count, 2);
        let text: String = events
            .into_inner()
            .iter()
            .map(|event| match event {
                StreamEvent::Delta(chunk) => chunk.as_str(),
                other => panic!("unexpected event: {:?}", other),
            })
            .collect();
        assert_eq!(text, "Hello");
    }

    #[test]
    fn test_parse_search_result_event_prefers_summary() {
        let result = json!({
            "data": {
                "count": 2,
                "result_list": [
                    {
                        "memory_type": "event_v1",
                        "memory_info": {
                            "summary": "Played fetch in the park",
                            "original_messages": "user: let's play..."
                        },
                        "score": 0.91
                    },
                    {
                        "memory_type": "event_v1",
                        "memory_info": {
                            "summary": "null",
                            "original_messages": "user: good morning"
                        }
                    }
                ]
            }
        });
        let hits = parse_search_result(&result);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].content, "Played fetch in the park");
        assert_eq!(hits[0].score, Some(0.91));
        assert_eq!(hits[1].content, "user: good morning");
        assert_eq!(hits[1].score, None);
    }

    #[test]
    fn test_parse_search_result_profile_uses_profile_text() {
        let result = json!({
            "data": {
                "count": 1,
                "result_list": [{
                    "memory_type": "profile_v1",
                    "memory_info": { "user_profile": "Likes long walks" }
                }]
            }
        });
        let hits = parse_search_result(&result);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].memory_type, "profile_v1");
        assert_eq!(hits[0].content, "Likes long walks");
    }

    #[test]
    fn test_parse_search_result_skips_empty_hits() {
        let result = json!({
            "data": {
                "count": 2,
                "result_list": [
                    { "memory_type": "profile_v1", "memory_info": { "user_profile": "null" } },
                    { "memory_type": "other", "memory": "top-level fallback" }
                ]
            }
        });
        let hits = parse_search_result(&result);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "top-level fallback");
    }

    #[test]
    fn test_parse_search_result_tolerates_missing_data() {
        assert!(parse_search_result(&json!({})).is_empty());
        assert!(parse_search_result(&json!({"data": {"count": 0}})).is_empty());
    }
}
