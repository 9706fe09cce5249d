use super::chat_types::{ChatCompletionResponse, ChatUsage, Choice, ChoiceMessage};
use super::responses_types::{ResponsesResponse, ResponsesUsage};

/// Result of reshaping a Responses API body for a Chat Completions caller.
#[derive(Debug, Clone)]
pub enum TranslatedResponse {
    Chat(ChatCompletionResponse),
    /// The body carries an error object; the caller gets the upstream bytes as-is.
    UpstreamError,
}

/// Translate a Responses API response into a Chat Completions response.
/// Pure function: `model` is used when the upstream body does not name one.
pub fn responses_to_chat(resp: &ResponsesResponse, model: &str) -> TranslatedResponse {
    if resp.error.as_ref().is_some_and(|e| !e.is_null()) {
        return TranslatedResponse::UpstreamError;
    }

    let content = assistant_text(resp).unwrap_or_default();

    let id = resp
        .id
        .clone()
        .filter(|id| !id.is_empty())
        .unwrap_or_else(new_completion_id);

    TranslatedResponse::Chat(ChatCompletionResponse {
        id,
        object: "chat.completion".to_string(),
        created: resp.created_at.unwrap_or_else(|| chrono::Utc::now().timestamp()),
        model: resp
            .model
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| model.to_string()),
        choices: vec![Choice {
            index: 0,
            message: ChoiceMessage {
                role: "assistant".to_string(),
                content,
            },
            finish_reason: Some(finish_reason(resp)),
        }],
        usage: map_usage(resp.usage.as_ref()),
    })
}

/// Aggregated text if the backend supplied it, otherwise the first
/// `output_text` block of the first assistant message.
fn assistant_text(resp: &ResponsesResponse) -> Option<String> {
    if let Some(text) = resp.output_text.as_ref().filter(|t| !t.is_empty()) {
        return Some(text.clone());
    }
    if let Some(text) = resp.text.as_ref().and_then(|t| t.as_str()).filter(|t| !t.is_empty()) {
        return Some(text.to_string());
    }

    resp.output
        .iter()
        .flatten()
        .find(|item| item.item_type == "message" && item.role.as_deref() == Some("assistant"))
        .and_then(|item| {
            item.content
                .iter()
                .flatten()
                .find(|c| c.content_type == "output_text")
        })
        .and_then(|c| c.text.clone())
}

/// Map a Responses API status to a Chat Completions finish reason.
pub fn finish_reason(resp: &ResponsesResponse) -> String {
    match resp.status.as_deref() {
        Some("completed") => "stop".to_string(),
        _ => match resp
            .incomplete_details
            .as_ref()
            .and_then(|d| d.reason.as_deref())
        {
            Some("content_filter") => "content_filter".to_string(),
            _ => "length".to_string(),
        },
    }
}

/// Missing usage or missing fields count as zero.
pub fn map_usage(usage: Option<&ResponsesUsage>) -> ChatUsage {
    let usage = usage.copied().unwrap_or_default();
    ChatUsage {
        prompt_tokens: usage.input_tokens,
        completion_tokens: usage.output_tokens,
        total_tokens: usage.total_tokens,
    }
}

pub fn new_completion_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: serde_json::Value) -> ResponsesResponse {
        serde_json::from_value(json).unwrap()
    }

    fn chat(resp: &ResponsesResponse) -> ChatCompletionResponse {
        match responses_to_chat(resp, "o3-pro") {
            TranslatedResponse::Chat(c) => c,
            TranslatedResponse::UpstreamError => panic!("unexpected error passthrough"),
        }
    }

    #[test]
    fn test_output_item_text() {
        let resp = parse(serde_json::json!({
            "id": "resp_123",
            "created_at": 1741476542,
            "model": "o3-pro",
            "status": "completed",
            "output": [
                {"type": "reasoning", "summary": []},
                {"type": "message", "role": "assistant", "content": [
                    {"type": "refusal", "refusal": "no"},
                    {"type": "output_text", "text": "4", "annotations": []},
                    {"type": "output_text", "text": "ignored"}
                ]}
            ],
            "usage": {"input_tokens": 12, "output_tokens": 5, "total_tokens": 17}
        }));

        let out = chat(&resp);
        assert_eq!(out.id, "resp_123");
        assert_eq!(out.object, "chat.completion");
        assert_eq!(out.created, 1_741_476_542);
        assert_eq!(out.choices[0].message.role, "assistant");
        assert_eq!(out.choices[0].message.content, "4");
        assert_eq!(out.choices[0].finish_reason.as_deref(), Some("stop"));
        assert_eq!(
            out.usage,
            ChatUsage {
                prompt_tokens: 12,
                completion_tokens: 5,
                total_tokens: 17
            }
        );
    }

    #[test]
    fn test_aggregated_text_preferred() {
        let resp = parse(serde_json::json!({
            "status": "completed",
            "output_text": "aggregated",
            "output": [{"type": "message", "role": "assistant",
                        "content": [{"type": "output_text", "text": "item"}]}]
        }));
        assert_eq!(chat(&resp).choices[0].message.content, "aggregated");
    }

    #[test]
    fn test_text_config_object_is_not_text() {
        let resp = parse(serde_json::json!({
            "status": "completed",
            "text": {"format": {"type": "text"}},
            "output": [{"type": "message", "role": "assistant",
                        "content": [{"type": "output_text", "text": "item"}]}]
        }));
        assert_eq!(chat(&resp).choices[0].message.content, "item");
    }

    #[test]
    fn test_incomplete_status() {
        let resp = parse(serde_json::json!({"status": "incomplete"}));
        assert_eq!(chat(&resp).choices[0].finish_reason.as_deref(), Some("length"));

        let resp = parse(serde_json::json!({
            "status": "incomplete",
            "incomplete_details": {"reason": "content_filter"}
        }));
        assert_eq!(
            chat(&resp).choices[0].finish_reason.as_deref(),
            Some("content_filter")
        );
    }

    #[test]
    fn test_usage_defaults_to_zero() {
        let out = chat(&parse(serde_json::json!({"status": "completed"})));
        assert_eq!(out.usage, ChatUsage::default());

        let out = chat(&parse(serde_json::json!({"usage": {"input_tokens": 3}})));
        assert_eq!(out.usage.prompt_tokens, 3);
        assert_eq!(out.usage.completion_tokens, 0);

        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["usage"]["completion_tokens"], 0);
        assert_eq!(json["usage"]["total_tokens"], 0);
    }

    #[test]
    fn test_missing_fields_get_defaults() {
        let out = chat(&ResponsesResponse::default());
        assert!(out.id.starts_with("chatcmpl-"));
        assert_eq!(out.model, "o3-pro");
        assert_eq!(out.choices[0].message.content, "");
        assert!(out.created > 0);
    }

    #[test]
    fn test_error_object_passes_through() {
        let resp = parse(serde_json::json!({
            "status": "failed",
            "error": {"code": "server_error", "message": "boom"}
        }));
        assert!(matches!(
            responses_to_chat(&resp, "o3-pro"),
            TranslatedResponse::UpstreamError
        ));

        let resp = parse(serde_json::json!({"status": "completed", "error": null}));
        assert!(matches!(
            responses_to_chat(&resp, "o3-pro"),
            TranslatedResponse::Chat(_)
        ));
    }
}
