use crate::audio::Blob;
use crate::setup::Setup;
use crate::tools::{ToolCall, ToolResponse};

/// Messages sent to the Live API. Each one serializes as a single-key
/// object, ex: `{"realtimeInput": {...}}`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(Setup),
    RealtimeInput(RealtimeInput),
    ToolResponse(ToolResponse),
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    media_chunks: Vec<Blob>,
}

impl RealtimeInput {
    pub fn audio(chunk: Blob) -> Self {
        Self {
            media_chunks: vec![chunk],
        }
    }

    pub fn media_chunks(&self) -> &[Blob] {
        &self.media_chunks
    }
}

/// A message received from the Live API.
///
/// Payload kinds are independent and may co-occur, so each is an optional
/// field rather than an enum variant.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    setup_complete: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    server_content: Option<ServerContent>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call: Option<ToolCall>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_cancellation: Option<ToolCallCancellation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    go_away: Option<GoAway>,
}

impl ServerMessage {
    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }

    pub fn server_content(&self) -> Option<&ServerContent> {
        self.server_content.as_ref()
    }

    pub fn tool_call(&self) -> Option<&ToolCall> {
        self.tool_call.as_ref()
    }

    pub fn tool_call_cancellation(&self) -> Option<&ToolCallCancellation> {
        self.tool_call_cancellation.as_ref()
    }

    pub fn go_away(&self) -> Option<&GoAway> {
        self.go_away.as_ref()
    }

    /// Inline audio blobs of the model turn, in part order.
    pub fn audio_payloads(&self) -> impl Iterator<Item = &Blob> {
        self.server_content
            .iter()
            .filter_map(|c| c.model_turn.as_ref())
            .flat_map(|turn| turn.parts.iter())
            .filter_map(|part| part.inline_data.as_ref())
            .filter(|blob| blob.is_pcm_audio())
    }
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model_turn: Option<ModelTurn>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    turn_complete: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    interrupted: Option<bool>,
}

impl ServerContent {
    pub fn model_turn(&self) -> Option<&ModelTurn> {
        self.model_turn.as_ref()
    }

    pub fn turn_complete(&self) -> bool {
        self.turn_complete.unwrap_or(false)
    }

    pub fn interrupted(&self) -> bool {
        self.interrupted.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ModelTurn {
    #[serde(default)]
    parts: Vec<Part>,
}

impl ModelTurn {
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<Blob>,
}

impl Part {
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn inline_data(&self) -> Option<&Blob> {
        self.inline_data.as_ref()
    }
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ToolCallCancellation {
    #[serde(default)]
    ids: Vec<String>,
}

impl ToolCallCancellation {
    pub fn ids(&self) -> &[String] {
        &self.ids
    }
}

/// Notice that the server will close the connection soon.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    #[serde(default)]
    time_left: Option<String>,
}

impl GoAway {
    pub fn time_left(&self) -> Option<&str> {
        self.time_left.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn realtime_input_is_single_key_object() {
        let msg = ClientMessage::RealtimeInput(RealtimeInput::audio(Blob::new(
            "audio/pcm;rate=16000",
            "AAAA".to_string(),
        )));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            json!({
                "realtimeInput": {
                    "mediaChunks": [{ "mimeType": "audio/pcm;rate=16000", "data": "AAAA" }]
                }
            })
        );
    }

    #[test]
    fn setup_complete_is_detected() {
        let msg: ServerMessage = serde_json::from_str(r#"{"setupComplete":{}}"#).unwrap();
        assert!(msg.is_setup_complete());
        assert!(msg.tool_call().is_none());
        assert_eq!(msg.audio_payloads().count(), 0);
    }

    #[test]
    fn tool_call_and_audio_can_co_occur() {
        let msg: ServerMessage = serde_json::from_value(json!({
            "toolCall": {
                "functionCalls": [{ "id": "1", "name": "controlSnake", "args": { "action": "UP" } }]
            },
            "serverContent": {
                "modelTurn": {
                    "parts": [
                        { "text": "ok" },
                        { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "AAA=" } }
                    ]
                },
                "turnComplete": true
            }
        }))
        .unwrap();

        assert_eq!(msg.tool_call().map(|c| c.function_calls().len()), Some(1));
        let audio: Vec<_> = msg.audio_payloads().collect();
        assert_eq!(audio.len(), 1);
        assert_eq!(audio[0].sample_rate(), Some(24000));
        assert!(msg.server_content().is_some_and(|c| c.turn_complete()));
    }

    #[test]
    fn unknown_fields_are_tolerated() {
        let msg: ServerMessage =
            serde_json::from_str(r#"{"usageMetadata":{"totalTokenCount":3}}"#).unwrap();
        assert!(!msg.is_setup_complete());
        assert!(msg.server_content().is_none());
    }
}
