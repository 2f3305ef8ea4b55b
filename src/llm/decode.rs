//! Decoding raw backend stream lines into [`StreamEvent`]s.
//!
//! OpenAI-compatible and Anthropic backends speak server-sent events
//! (`data: {...}` lines); Ollama emits one JSON object per line.

use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use tracing::debug;

use crate::error::TransportError;
use crate::llm::event::{StreamEvent, Usage};
use crate::llm::provider::Backend;
use crate::llm::transport::LineStream;

/// Decode one raw line. Lines that carry no event decode to an empty vec.
pub fn decode_line(backend: Backend, line: &str) -> Result<Vec<StreamEvent>, TransportError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Vec::new());
    }

    let payload = match backend {
        Backend::OpenAiCompatible | Backend::Anthropic => match sse_data(line) {
            Some(data) => data,
            None => return Ok(Vec::new()),
        },
        Backend::Ollama => line,
    };

    if payload == "[DONE]" {
        return Ok(vec![StreamEvent::StreamDone]);
    }

    let value: Value = match serde_json::from_str(payload) {
        Ok(value) => value,
        Err(e) => {
            debug!("Skipping undecodable stream line ({}): {}", e, payload);
            return Ok(Vec::new());
        }
    };

    match backend {
        Backend::OpenAiCompatible => decode_openai(&value),
        Backend::Anthropic => decode_anthropic(&value),
        Backend::Ollama => decode_ollama(&value),
    }
}

/// Decode a whole line stream, preserving order and transport errors.
pub fn decode_stream(
    lines: LineStream,
    backend: Backend,
) -> BoxStream<'static, Result<StreamEvent, TransportError>> {
    lines
        .flat_map(move |line| {
            let items: Vec<Result<StreamEvent, TransportError>> =
                match line.and_then(|l| decode_line(backend, &l)) {
                    Ok(events) => events.into_iter().map(Ok).collect(),
                    Err(e) => vec![Err(e)],
                };
            stream::iter(items)
        })
        .boxed()
}

/// Payload of an SSE `data:` line; `None` for comments, `event:` and others.
fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim)
}

fn decode_openai(value: &Value) -> Result<Vec<StreamEvent>, TransportError> {
    if let Some(message) = error_message(value) {
        return Err(TransportError::Backend(message));
    }

    let mut events = Vec::new();

    if let Some(delta) = value
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
    {
        if let Some(reasoning) = delta.get("reasoning_content").and_then(Value::as_str) {
            events.push(StreamEvent::ReasoningDelta(reasoning.to_string()));
        } else if let Some(content) = delta.get("content").and_then(Value::as_str) {
            events.push(StreamEvent::AnswerDelta(content.to_string()));
        }
    }

    if let Some(total) = value
        .get("usage")
        .and_then(|u| u.get("total_tokens"))
        .and_then(Value::as_u64)
    {
        events.push(StreamEvent::UsageUpdate(Usage::total(total)));
    }

    Ok(events)
}

fn decode_anthropic(value: &Value) -> Result<Vec<StreamEvent>, TransportError> {
    let kind = value.get("type").and_then(Value::as_str).unwrap_or_default();

    let events = match kind {
        "message_start" => value
            .pointer("/message/usage/input_tokens")
            .and_then(Value::as_u64)
            .map(|n| vec![StreamEvent::UsageUpdate(Usage::input(n))])
            .unwrap_or_default(),
        "content_block_delta" => {
            let delta = value.get("delta");
            let delta_type = delta
                .and_then(|d| d.get("type"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            match delta_type {
                "thinking_delta" => delta
                    .and_then(|d| d.get("thinking"))
                    .and_then(Value::as_str)
                    .map(|t| vec![StreamEvent::ReasoningDelta(t.to_string())])
                    .unwrap_or_default(),
                _ => delta
                    .and_then(|d| d.get("text"))
                    .and_then(Value::as_str)
                    .map(|t| vec![StreamEvent::AnswerDelta(t.to_string())])
                    .unwrap_or_default(),
            }
        }
        "message_delta" => value
            .pointer("/usage/output_tokens")
            .and_then(Value::as_u64)
            .map(|n| vec![StreamEvent::UsageUpdate(Usage::output(n))])
            .unwrap_or_default(),
        "message_stop" => vec![StreamEvent::StreamDone],
        "error" => {
            let message = error_message(value).unwrap_or_else(|| value.to_string());
            return Err(TransportError::Backend(message));
        }
        _ => Vec::new(),
    };

    Ok(events)
}

fn decode_ollama(value: &Value) -> Result<Vec<StreamEvent>, TransportError> {
    if let Some(message) = value.get("error").and_then(Value::as_str) {
        return Err(TransportError::Backend(message.to_string()));
    }

    let mut events = Vec::new();

    if let Some(message) = value.get("message") {
        if let Some(thinking) = message.get("thinking").and_then(Value::as_str)
            && !thinking.is_empty()
        {
            events.push(StreamEvent::ReasoningDelta(thinking.to_string()));
        }
        if let Some(content) = message.get("content").and_then(Value::as_str)
            && !content.is_empty()
        {
            events.push(StreamEvent::AnswerDelta(content.to_string()));
        }
    }

    if value.get("done").and_then(Value::as_bool).unwrap_or(false) {
        for key in ["total_duration", "load_duration", "prompt_eval_duration", "eval_duration"] {
            if let Some(ns) = value.get(key).and_then(Value::as_u64) {
                debug!("{}: {} ns", key, ns);
            }
        }

        let usage = Usage {
            input_tokens: value.get("prompt_eval_count").and_then(Value::as_u64),
            output_tokens: value.get("eval_count").and_then(Value::as_u64),
            total_tokens: None,
        };
        if !usage.is_empty() {
            events.push(StreamEvent::UsageUpdate(usage));
        }
        events.push(StreamEvent::StreamDone);
    }

    Ok(events)
}

/// `error.message` (or a bare `error` string) from an error payload.
fn error_message(value: &Value) -> Option<String> {
    let error = value.get("error")?;
    error
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| error.as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_content_and_reasoning() {
        let line = r#"data: {"choices":[{"delta":{"content":"feat"}}]}"#;
        assert_eq!(
            decode_line(Backend::OpenAiCompatible, line).unwrap(),
            vec![StreamEvent::AnswerDelta("feat".to_string())]
        );

        let line = r#"data: {"choices":[{"delta":{"content":null,"reasoning_content":"hm"}}]}"#;
        assert_eq!(
            decode_line(Backend::OpenAiCompatible, line).unwrap(),
            vec![StreamEvent::ReasoningDelta("hm".to_string())]
        );
    }

    #[test]
    fn test_openai_usage_chunk_and_done() {
        let line = r#"data: {"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":4,"total_tokens":14}}"#;
        assert_eq!(
            decode_line(Backend::OpenAiCompatible, line).unwrap(),
            vec![StreamEvent::UsageUpdate(Usage::total(14))]
        );
        assert_eq!(
            decode_line(Backend::OpenAiCompatible, "data: [DONE]").unwrap(),
            vec![StreamEvent::StreamDone]
        );
    }

    #[test]
    fn test_openai_error_payload_is_backend_error() {
        let line = r#"data: {"error":{"message":"invalid api key"}}"#;
        let err = decode_line(Backend::OpenAiCompatible, line).unwrap_err();
        assert!(matches!(err, TransportError::Backend(m) if m == "invalid api key"));
    }

    #[test]
    fn test_sse_noise_is_ignored() {
        for line in [": keep-alive", "event: message_start", "", "data: not json"] {
            assert!(decode_line(Backend::Anthropic, line).unwrap().is_empty());
        }
    }

    #[test]
    fn test_anthropic_event_sequence() {
        let lines = [
            r#"data: {"type":"message_start","message":{"usage":{"input_tokens":25,"output_tokens":1}}}"#,
            r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"thinking_delta","thinking":"why"}}"#,
            r#"data: {"type":"content_block_delta","index":1,"delta":{"type":"text_delta","text":"fix: x"}}"#,
            r#"data: {"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":15}}"#,
            r#"data: {"type":"message_stop"}"#,
        ];
        let events: Vec<StreamEvent> = lines
            .iter()
            .flat_map(|l| decode_line(Backend::Anthropic, l).unwrap())
            .collect();
        assert_eq!(
            events,
            vec![
                StreamEvent::UsageUpdate(Usage::input(25)),
                StreamEvent::ReasoningDelta("why".to_string()),
                StreamEvent::AnswerDelta("fix: x".to_string()),
                StreamEvent::UsageUpdate(Usage::output(15)),
                StreamEvent::StreamDone,
            ]
        );
    }

    #[test]
    fn test_anthropic_error_event() {
        let line = r#"data: {"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        let err = decode_line(Backend::Anthropic, line).unwrap_err();
        assert!(err.to_string().contains("Overloaded"));
    }

    #[test]
    fn test_ollama_chunks() {
        let line = r#"{"model":"qwen3:8b","message":{"role":"assistant","content":"<think>"},"done":false}"#;
        assert_eq!(
            decode_line(Backend::Ollama, line).unwrap(),
            vec![StreamEvent::AnswerDelta("<think>".to_string())]
        );

        let line = r#"{"message":{"role":"assistant","content":""},"done":true,"prompt_eval_count":30,"eval_count":12,"total_duration":1000}"#;
        assert_eq!(
            decode_line(Backend::Ollama, line).unwrap(),
            vec![
                StreamEvent::UsageUpdate(Usage {
                    input_tokens: Some(30),
                    output_tokens: Some(12),
                    total_tokens: None,
                }),
                StreamEvent::StreamDone,
            ]
        );
    }

    #[test]
    fn test_ollama_error_line() {
        let err = decode_line(Backend::Ollama, r#"{"error":"model not found"}"#).unwrap_err();
        assert!(matches!(err, TransportError::Backend(m) if m == "model not found"));
    }

    #[tokio::test]
    async fn test_decode_stream_keeps_order_and_errors() {
        let lines: LineStream = stream::iter(vec![
            Ok(r#"{"message":{"content":"a"},"done":false}"#.to_string()),
            Err(TransportError::Timeout(5)),
        ])
        .boxed();

        let items: Vec<_> = decode_stream(lines, Backend::Ollama).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(
            items[0].as_ref().unwrap(),
            &StreamEvent::AnswerDelta("a".to_string())
        );
        assert!(matches!(items[1], Err(TransportError::Timeout(5))));
    }
}
