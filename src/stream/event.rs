//! Structured-event parser for the agent's stream-json output.

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::warn;

use super::ParsedStream;

/// Envelope shapes the agent CLI emits with `--output-format stream-json`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum StreamEvent {
    #[serde(rename = "assistant")]
    Assistant { message: AssistantMessage },

    /// Incremental shape seen with partial-message streaming enabled.
    #[serde(rename = "stream_event")]
    Partial { event: PartialEvent },

    #[serde(rename = "result")]
    Result {
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        is_error: bool,
    },

    // Session banners and tool echoes; no transcript text
    #[serde(rename = "system")]
    System,
    #[serde(rename = "user")]
    User,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct PartialEvent {
    #[serde(default)]
    delta: Option<Delta>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    text: Option<String>,
}

/// Parse a stream-json reader to completion.
///
/// `on_line` receives display text as it arrives. Lines that do not decode
/// as an envelope are relayed verbatim rather than dropped; the agent
/// occasionally interleaves plain diagnostics with the JSON stream. Tool
/// results can push single lines past several megabytes, so the reader has
/// no length cap. When the stream carries a final `result` event, its text
/// replaces the accumulated transcript.
pub async fn parse_events<R, F>(reader: R, mut on_line: F) -> ParsedStream
where
    R: AsyncRead + Unpin,
    F: FnMut(&str),
{
    let mut lines = BufReader::new(reader).lines();

    let mut accumulated = String::new();
    let mut final_result: Option<String> = None;
    let mut error = None;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error = Some(e);
                break;
            }
        };
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<StreamEvent>(&line) {
            Ok(StreamEvent::Assistant { message }) => {
                for block in message.content {
                    if let ContentBlock::Text { text } = block {
                        on_line(&text);
                        accumulated.push_str(&text);
                        accumulated.push('\n');
                    }
                }
            }
            Ok(StreamEvent::Partial { event }) => {
                // Deltas are fragments; no separator between them
                if let Some(text) = event.delta.and_then(|d| d.text) {
                    on_line(&text);
                    accumulated.push_str(&text);
                }
            }
            Ok(StreamEvent::Result { result, is_error }) => {
                if is_error {
                    warn!("agent reported an error result");
                }
                final_result = result;
            }
            Ok(StreamEvent::System | StreamEvent::User) => {}
            Err(_) => {
                // Not an envelope; relay it untouched
                on_line(&line);
                accumulated.push_str(&line);
                accumulated.push('\n');
            }
        }
    }

    ParsedStream::finish(final_result.unwrap_or(accumulated), error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::Signal;

    async fn parse(input: &str) -> ParsedStream {
        parse_events(input.as_bytes(), |_| {}).await
    }

    #[tokio::test]
    async fn test_accumulates_assistant_text() {
        let input = concat!(
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"first"}]}}"#,
            "\n",
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"second"}]}}"#,
            "\n",
        );
        let parsed = parse(input).await;
        assert_eq!(parsed.output, "first\nsecond\n");
        assert!(parsed.signal.is_none());
        assert!(parsed.error.is_none());
    }

    #[tokio::test]
    async fn test_final_result_replaces_accumulated_text() {
        let input = concat!(
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"working..."}]}}"#,
            "\n",
            r#"{"type":"result","result":"the real answer","is_error":false}"#,
            "\n",
        );
        let parsed = parse(input).await;
        assert_eq!(parsed.output, "the real answer");
    }

    #[tokio::test]
    async fn test_unrecognized_lines_are_relayed_verbatim() {
        let input = "not json at all\n{\"type\":\"unknown_envelope\"}\n";
        let parsed = parse(input).await;
        assert_eq!(parsed.output, "not json at all\n{\"type\":\"unknown_envelope\"}\n");
    }

    #[tokio::test]
    async fn test_delta_fragments_join_without_separator() {
        let input = concat!(
            r#"{"type":"stream_event","event":{"type":"content_block_delta","delta":{"type":"text_delta","text":"hel"}}}"#,
            "\n",
            r#"{"type":"stream_event","event":{"type":"content_block_delta","delta":{"type":"text_delta","text":"lo"}}}"#,
            "\n",
        );
        let parsed = parse(input).await;
        assert_eq!(parsed.output, "hello");
    }

    #[tokio::test]
    async fn test_system_and_user_events_are_ignored() {
        let input = concat!(
            r#"{"type":"system","subtype":"init","session_id":"abc"}"#,
            "\n",
            r#"{"type":"user","tool_use_result":{}}"#,
            "\n",
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"only this"}]}}"#,
            "\n",
        );
        let parsed = parse(input).await;
        assert_eq!(parsed.output, "only this\n");
    }

    #[tokio::test]
    async fn test_tool_use_blocks_carry_no_text() {
        let input = concat!(
            r#"{"type":"assistant","message":{"content":[{"type":"tool_use","name":"Bash","input":{"command":"ls"},"id":"1"},{"type":"text","text":"done"}]}}"#,
            "\n",
        );
        let parsed = parse(input).await;
        assert_eq!(parsed.output, "done\n");
    }

    #[tokio::test]
    async fn test_detects_signal_in_final_result() {
        let input = concat!(
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"wrapping up"}]}}"#,
            "\n",
            r#"{"type":"result","result":"all finished\n<<<TOOL:ALL_TASKS_DONE>>>","is_error":false}"#,
            "\n",
        );
        let parsed = parse(input).await;
        assert_eq!(parsed.signal, Some(Signal::TasksCompleted));
    }

    #[tokio::test]
    async fn test_multi_megabyte_line_is_not_truncated() {
        let big = "x".repeat(2 * 1024 * 1024);
        let input = format!(
            "{}\n",
            serde_json::json!({
                "type": "assistant",
                "message": { "content": [{ "type": "text", "text": big }] }
            })
        );
        let parsed = parse(&input).await;
        assert_eq!(parsed.output.len(), 2 * 1024 * 1024 + 1);
    }

    #[tokio::test]
    async fn test_callback_sees_text_as_it_arrives() {
        let input = concat!(
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"one"}]}}"#,
            "\n",
            "plain line\n",
        );
        let mut seen = Vec::new();
        parse_events(input.as_bytes(), |line| seen.push(line.to_string())).await;
        assert_eq!(seen, vec!["one", "plain line"]);
    }
}
