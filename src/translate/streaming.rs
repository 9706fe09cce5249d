//! State machine for transcoding a Responses API SSE stream into Chat Completions SSE.
//!
//! SSE framing (field parsing, multi-line `data:`, dispatch on blank lines) is
//! done by `eventsource-stream`; the [`StreamTranscoder`] sees whole events and
//! turns each into zero or more [`SseFrame`]s for the caller.

use bytes::Bytes;

use super::chat_types::{ChatCompletionChunk, ChatUsage, ChunkChoice, ChunkDelta};
use super::response::{map_usage, new_completion_id};
use super::responses_types::{EventType, ResponseDoneEvent, TextDeltaEvent};

pub const DONE_SENTINEL: &str = "[DONE]";

/// Event name the SSE parser reports when a block has no `event:` field.
const UNNAMED_EVENT: &str = "message";

/// One unit written to the caller's stream.
#[derive(Debug, Clone)]
pub enum SseFrame {
    Chunk(ChatCompletionChunk),
    Done,
}

impl SseFrame {
    /// Wire form: `data: <json>` followed by a blank line.
    pub fn to_bytes(&self) -> Result<Bytes, serde_json::Error> {
        let data = match self {
            Self::Chunk(chunk) => serde_json::to_string(chunk)?,
            Self::Done => DONE_SENTINEL.to_string(),
        };
        Ok(Bytes::from(format!("data: {data}\n\n")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Streaming,
    Done,
}

/// Transcodes one upstream stream. Never shared across requests.
#[derive(Debug)]
pub struct StreamTranscoder {
    model: String,
    state: StreamState,
    emitted: u64,
}

impl StreamTranscoder {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            state: StreamState::Streaming,
            emitted: 0,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == StreamState::Done
    }

    /// Number of frames produced so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Process one dispatched SSE event. An unnamed event is routed on the
    /// `type` field of its payload.
    pub fn process_event(&mut self, event: &str, data: &str) -> Vec<SseFrame> {
        if self.is_done() {
            return Vec::new();
        }

        let data = data.trim();
        let event = match event.trim() {
            "" | UNNAMED_EVENT => match serde_json::from_str::<EventType>(data) {
                Ok(EventType {
                    event_type: Some(name),
                }) => name,
                _ => return Vec::new(),
            },
            name => name.to_string(),
        };

        let frames = self.dispatch(&event, data);
        self.emitted += frames.len() as u64;
        frames
    }

    /// Called when the upstream ends. Emits the terminal sentinel only when
    /// `synthesize_done` is set and no terminal event was seen.
    pub fn finish(&mut self, synthesize_done: bool) -> Vec<SseFrame> {
        if self.is_done() {
            return Vec::new();
        }
        self.state = StreamState::Done;

        if synthesize_done {
            tracing::warn!(model = %self.model, "Upstream stream ended without response.completed, closing with [DONE]");
            self.emitted += 1;
            vec![SseFrame::Done]
        } else {
            tracing::warn!(model = %self.model, "Upstream stream ended without response.completed");
            Vec::new()
        }
    }

    fn dispatch(&mut self, event: &str, data: &str) -> Vec<SseFrame> {
        match event {
            "response.output_text.delta" => match serde_json::from_str::<TextDeltaEvent>(data) {
                Ok(TextDeltaEvent { delta: Some(text) }) => vec![SseFrame::Chunk(self.chunk(
                    ChunkDelta {
                        role: None,
                        content: Some(text),
                    },
                    None,
                    None,
                ))],
                Ok(_) => Vec::new(),
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping unparseable delta event");
                    Vec::new()
                }
            },
            "response.completed" => self.terminate(data, "stop"),
            "response.incomplete" => self.terminate(data, "length"),
            other => {
                tracing::trace!(event = other, "Discarding stream event");
                Vec::new()
            }
        }
    }

    fn terminate(&mut self, data: &str, finish_reason: &str) -> Vec<SseFrame> {
        let usage = serde_json::from_str::<ResponseDoneEvent>(data)
            .ok()
            .and_then(|e| e.response)
            .and_then(|r| r.usage)
            .map(|u| map_usage(Some(&u)));

        self.state = StreamState::Done;
        vec![
            SseFrame::Chunk(self.chunk(ChunkDelta::default(), Some(finish_reason), usage)),
            SseFrame::Done,
        ]
    }

    fn chunk(
        &self,
        delta: ChunkDelta,
        finish_reason: Option<&str>,
        usage: Option<ChatUsage>,
    ) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: new_completion_id(),
            object: "chat.completion.chunk".to_string(),
            created: chrono::Utc::now().timestamp(),
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason: finish_reason.map(String::from),
            }],
            usage,
        }
    }
}
