use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Prefix marking a candidate frame line on the wire.
pub const FRAME_PREFIX: &str = "data:";

/// Payload of the terminal sentinel frame.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One decoded unit of an event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A non-empty content increment.
    Delta(String),
    /// An in-band error report. The stream carries nothing useful after it.
    Error(String),
    /// The terminal sentinel.
    Done,
}

impl Frame {
    pub fn delta(content: impl Into<String>) -> Self {
        Self::Delta(content.into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Frame::Done)
    }

    /// The `data:` payload of this frame in the relay's envelope.
    ///
    /// Deltas use the OpenAI chunk shape so that consumers written against
    /// the upstream API read relay output unchanged.
    pub fn payload(&self) -> String {
        match self {
            Frame::Delta(content) => envelope_json(&DeltaEnvelope {
                choices: [DeltaChoice {
                    index: 0,
                    delta: DeltaContent { content },
                }],
            }),
            Frame::Error(message) => envelope_json(&ErrorEnvelope {
                error: true,
                message,
            }),
            Frame::Done => DONE_SENTINEL.to_string(),
        }
    }

    /// Full wire form: `data: <payload>\n\n`.
    pub fn encode(&self) -> String {
        format!("{} {}\n\n", FRAME_PREFIX, self.payload())
    }
}

fn envelope_json<T: Serialize>(value: &T) -> String {
    // Serializing these borrowed-string structs cannot fail.
    serde_json::to_string(value).unwrap_or_default()
}

#[derive(Serialize)]
struct DeltaEnvelope<'a> {
    choices: [DeltaChoice<'a>; 1],
}

#[derive(Serialize)]
struct DeltaChoice<'a> {
    index: u32,
    delta: DeltaContent<'a>,
}

#[derive(Serialize)]
struct DeltaContent<'a> {
    content: &'a str,
}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    error: bool,
    message: &'a str,
}

/// Inbound chunk shape accepted from both the upstream API and the relay.
#[derive(Debug, Deserialize)]
pub(crate) struct ChunkPayload {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChunkChoice {
    #[serde(default)]
    pub delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChunkPayload {
    /// Error text if this chunk reports one. Accepts `{"error": true,
    /// "message": ..}`, `{"error": {"message": ..}}` and `{"error": ".."}`.
    pub fn error_message(&self) -> Option<String> {
        let fallback = || {
            self.message
                .clone()
                .unwrap_or_else(|| "upstream reported an error".to_string())
        };
        match self.error.as_ref()? {
            Value::Null | Value::Bool(false) => None,
            Value::String(text) => Some(text.clone()),
            Value::Object(map) => Some(
                map.get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(fallback),
            ),
            _ => Some(fallback()),
        }
    }

    pub fn content(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta)
            .and_then(|delta| delta.content)
            .filter(|content| !content.is_empty())
    }
}
