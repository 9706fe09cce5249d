//! Translate Chat Completions requests into Responses API requests.
//!
//! Used for reasoning-family models that the backend only serves through the
//! Responses API. A lone user message becomes a bare string `input`; any other
//! conversation becomes an ordered list of role-tagged input items.

use super::chat_types::ChatCompletionRequest;
use super::responses_types::{InputContent, InputItem, ResponsesInput, ResponsesRequest};

/// Translate a Chat Completions request into a Responses API request.
/// Pure function: the model name is carried over unchanged.
pub fn chat_to_responses(req: &ChatCompletionRequest) -> ResponsesRequest {
    let input = match req.messages.as_slice() {
        [only] if only.role == "user" => ResponsesInput::Text(message_text(only)),
        messages => ResponsesInput::Items(
            messages
                .iter()
                .map(|m| {
                    let text = message_text(m);
                    // Assistant turns are replayed as model output.
                    let content = if m.role == "assistant" {
                        InputContent::OutputText { text }
                    } else {
                        InputContent::InputText { text }
                    };
                    InputItem {
                        role: m.role.clone(),
                        content: vec![content],
                    }
                })
                .collect(),
        ),
    };

    let max_output_tokens = req
        .max_tokens
        .filter(|n| *n > 0)
        .or_else(|| req.max_completion_tokens.filter(|n| *n > 0));

    ResponsesRequest {
        model: req.model.clone(),
        input,
        temperature: req.temperature.filter(|t| *t > 0.0),
        max_output_tokens,
        stream: req.stream,
    }
}

/// Whether `model` belongs to a family that must go through the Responses API.
pub fn is_reasoning_model<S: AsRef<str>>(model: &str, prefixes: &[S]) -> bool {
    let model = model.to_lowercase();
    prefixes
        .iter()
        .any(|p| !p.as_ref().is_empty() && model.starts_with(&p.as_ref().to_lowercase()))
}

fn message_text(msg: &super::chat_types::ChatMessage) -> String {
    msg.content.as_ref().map(|c| c.as_text()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::chat_types::{ChatContent, ChatMessage};

    fn message(role: &str, text: &str) -> ChatMessage {
        ChatMessage {
            role: role.to_string(),
            content: Some(ChatContent::Text(text.to_string())),
        }
    }

    fn request(messages: Vec<ChatMessage>) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: "o3-pro".to_string(),
            messages,
            ..ChatCompletionRequest::default()
        }
    }

    #[test]
    fn test_single_user_message_is_scalar() {
        let out = chat_to_responses(&request(vec![message("user", "What is 2+2?")]));
        assert_eq!(out.model, "o3-pro");
        assert_eq!(out.input, ResponsesInput::Text("What is 2+2?".to_string()));
    }

    #[test]
    fn test_single_system_message_is_not_scalar() {
        let out = chat_to_responses(&request(vec![message("system", "Be brief.")]));
        assert!(matches!(out.input, ResponsesInput::Items(ref items) if items.len() == 1));
    }

    #[test]
    fn test_conversation_keeps_order() {
        let out = chat_to_responses(&request(vec![
            message("system", "Be brief."),
            message("user", "Hi"),
            message("assistant", "Hello!"),
            message("user", "Bye"),
        ]));

        let ResponsesInput::Items(items) = out.input else {
            panic!("expected input items");
        };
        let roles: Vec<&str> = items.iter().map(|i| i.role.as_str()).collect();
        assert_eq!(roles, ["system", "user", "assistant", "user"]);
        assert_eq!(
            items[0].content,
            vec![InputContent::InputText {
                text: "Be brief.".to_string()
            }]
        );
        assert_eq!(
            items[2].content,
            vec![InputContent::OutputText {
                text: "Hello!".to_string()
            }]
        );
    }

    #[test]
    fn test_sampling_params_only_when_positive() {
        let mut req = request(vec![message("user", "Hi")]);
        req.temperature = Some(0.0);
        req.max_tokens = Some(0);
        req.stream = Some(true);
        let out = chat_to_responses(&req);
        assert_eq!(out.temperature, None);
        assert_eq!(out.max_output_tokens, None);
        assert_eq!(out.stream, Some(true));

        req.temperature = Some(0.7);
        req.max_tokens = Some(256);
        let out = chat_to_responses(&req);
        assert_eq!(out.temperature, Some(0.7));
        assert_eq!(out.max_output_tokens, Some(256));

        let json = serde_json::to_value(chat_to_responses(&request(vec![]))).unwrap();
        assert!(json.get("temperature").is_none());
        assert!(json.get("max_output_tokens").is_none());
    }

    #[test]
    fn test_max_completion_tokens_fallback() {
        let mut req = request(vec![message("user", "Hi")]);
        req.max_completion_tokens = Some(64);
        assert_eq!(chat_to_responses(&req).max_output_tokens, Some(64));
    }

    #[test]
    fn test_reasoning_prefixes() {
        let prefixes = ["o1-pro", "codex-mini"];
        assert!(is_reasoning_model("o1-pro", &prefixes));
        assert!(is_reasoning_model("O1-PRO-2025-03-19", &prefixes));
        assert!(is_reasoning_model("codex-mini-latest", &prefixes));
        assert!(!is_reasoning_model("o1-mini", &prefixes));
        assert!(!is_reasoning_model("gpt-4o", &[""]));
    }
}
