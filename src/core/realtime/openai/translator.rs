use base64::prelude::*;
use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, warn};

use super::config::OPENAI_REALTIME_SAMPLE_RATE;
use super::messages::{
    ClientEvent, ContentPart, ConversationItem, ServerEvent, SessionConfig, ToolDef,
    TurnDetection,
};
use crate::core::realtime::base::{
    HandshakeReply, InboundEvent, Modality, RealtimeError, RealtimeResult, SessionSettings,
    SessionTranslator, WireMessage,
};
use crate::core::tools::{ToolCall, ToolDeclaration, ToolResult};

/// Translator for the OpenAI Realtime JSON binding.
///
/// Function calls are only reported once a response completes, so every
/// `response.done` carrying calls becomes one batch. Each result is returned as
/// a `function_call_output` item followed by a single `response.create`.
#[derive(Debug, Clone, Default)]
pub struct OpenAITranslator;

impl OpenAITranslator {
    pub fn new(input_sample_rate: u32) -> Self {
        if input_sample_rate != OPENAI_REALTIME_SAMPLE_RATE {
            warn!(
                input_sample_rate,
                expected = OPENAI_REALTIME_SAMPLE_RATE,
                "OpenAI pcm16 input expects 24kHz audio; client audio is forwarded unchanged"
            );
        }
        Self
    }

    fn encode(event: &ClientEvent) -> RealtimeResult<WireMessage> {
        Ok(serde_json::to_string(event)?)
    }

    fn tool_def(tool: &ToolDeclaration) -> ToolDef {
        ToolDef {
            tool_type: "function",
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.parameters.to_json(),
        }
    }

    fn function_call_output(result: &ToolResult) -> RealtimeResult<ClientEvent> {
        Ok(ClientEvent::ConversationItemCreate {
            item: ConversationItem::FunctionCallOutput {
                call_id: result.id.clone(),
                output: serde_json::to_string(&result.response)?,
            },
        })
    }
}

/// Arguments arrive as a JSON string. Text that does not parse is kept as a
/// string so argument validation reports it.
fn parse_arguments(arguments: Option<String>) -> Value {
    match arguments {
        None => Value::Null,
        Some(raw) if raw.trim().is_empty() => Value::Null,
        Some(raw) => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
    }
}

impl SessionTranslator for OpenAITranslator {
    fn binding(&self) -> &'static str {
        "openai"
    }

    fn build_handshake(&self, settings: &SessionSettings) -> RealtimeResult<WireMessage> {
        let tools: Vec<ToolDef> = settings.tools.iter().map(Self::tool_def).collect();
        let tool_choice = (!tools.is_empty()).then(|| "auto".to_string());

        let session = SessionConfig {
            modalities: settings
                .response_modalities
                .iter()
                .map(|m| m.as_str().to_lowercase())
                .collect(),
            instructions: (!settings.persona.is_empty()).then(|| settings.persona.clone()),
            voice: settings.voice.clone(),
            input_audio_format: Some("pcm16".to_string()),
            output_audio_format: settings
                .response_modalities
                .contains(&Modality::Audio)
                .then(|| "pcm16".to_string()),
            turn_detection: Some(TurnDetection::ServerVad),
            tools,
            tool_choice,
        };

        Self::encode(&ClientEvent::SessionUpdate { session })
    }

    fn decode_handshake_reply(&self, frame: &str) -> RealtimeResult<HandshakeReply> {
        let event: ServerEvent = serde_json::from_str(frame)
            .map_err(|e| RealtimeError::MalformedFrame(e.to_string()))?;

        Ok(match event {
            ServerEvent::SessionUpdated => HandshakeReply::Accepted,
            ServerEvent::Error { error } => HandshakeReply::Rejected(error.message),
            _ => HandshakeReply::Pending,
        })
    }

    fn encode_client_audio(&self, audio: &[u8]) -> RealtimeResult<WireMessage> {
        Self::encode(&ClientEvent::InputAudioBufferAppend {
            audio: BASE64_STANDARD.encode(audio),
        })
    }

    fn encode_client_text(&self, text: &str) -> RealtimeResult<Vec<WireMessage>> {
        let item = ClientEvent::ConversationItemCreate {
            item: ConversationItem::Message {
                role: "user".to_string(),
                content: vec![ContentPart::InputText {
                    text: text.to_string(),
                }],
            },
        };
        Ok(vec![
            Self::encode(&item)?,
            Self::encode(&ClientEvent::ResponseCreate)?,
        ])
    }

    fn decode_upstream(&self, frame: &str) -> RealtimeResult<Vec<InboundEvent>> {
        let event: ServerEvent = serde_json::from_str(frame)
            .map_err(|e| RealtimeError::MalformedFrame(e.to_string()))?;

        let events = match event {
            ServerEvent::AudioDelta { delta } => {
                let audio = BASE64_STANDARD.decode(delta.as_bytes()).map_err(|e| {
                    RealtimeError::MalformedFrame(format!("invalid base64 audio: {e}"))
                })?;
                if audio.is_empty() {
                    Vec::new()
                } else {
                    vec![InboundEvent::Audio(Bytes::from(audio))]
                }
            }
            ServerEvent::TextDelta { delta } | ServerEvent::AudioTranscriptDelta { delta }
                if !delta.is_empty() =>
            {
                vec![InboundEvent::Text(delta)]
            }
            ServerEvent::ResponseDone { response } => {
                let calls: Vec<ToolCall> = response
                    .output
                    .into_iter()
                    .filter(|item| item.item_type == "function_call")
                    .map(|item| {
                        ToolCall::new(
                            item.call_id.unwrap_or_default(),
                            item.name.unwrap_or_default(),
                            parse_arguments(item.arguments),
                        )
                    })
                    .collect();
                if calls.is_empty() {
                    Vec::new()
                } else {
                    vec![InboundEvent::ToolCalls(calls)]
                }
            }
            ServerEvent::Error { error } => {
                warn!(
                    error_type = %error.error_type,
                    code = ?error.code,
                    message = %error.message,
                    "OpenAI reported an error"
                );
                Vec::new()
            }
            other => {
                debug!(event = ?other, "Ignoring OpenAI event");
                Vec::new()
            }
        };

        Ok(events)
    }

    fn encode_tool_result(&self, result: &ToolResult) -> RealtimeResult<WireMessage> {
        Self::encode(&Self::function_call_output(result)?)
    }

    /// One output item per call, then a single `response.create` for the batch.
    fn encode_tool_batch(&self, results: &[ToolResult]) -> RealtimeResult<Vec<WireMessage>> {
        let mut frames = results
            .iter()
            .map(|result| self.encode_tool_result(result))
            .collect::<RealtimeResult<Vec<_>>>()?;
        if !frames.is_empty() {
            frames.push(Self::encode(&ClientEvent::ResponseCreate)?);
        }
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tools::builtin::save_order_declaration;
    use serde_json::json;

    fn settings() -> SessionSettings {
        SessionSettings {
            model: "gpt-4o-realtime-preview".to_string(),
            persona: "Kamu adalah asisten drive thru.".to_string(),
            locale: Some("id-ID".to_string()),
            voice: Some("alloy".to_string()),
            response_modalities: vec![Modality::Audio, Modality::Text],
            input_sample_rate: 24000,
            tools: vec![save_order_declaration()],
        }
    }

    fn parse(frame: &str) -> Value {
        serde_json::from_str(frame).unwrap()
    }

    #[test]
    fn test_handshake_shape() {
        let frame = parse(&OpenAITranslator.build_handshake(&settings()).unwrap());

        assert_eq!(frame["type"], "session.update");
        let session = &frame["session"];
        assert_eq!(session["modalities"], json!(["audio", "text"]));
        assert_eq!(session["instructions"], "Kamu adalah asisten drive thru.");
        assert_eq!(session["voice"], "alloy");
        assert_eq!(session["input_audio_format"], "pcm16");
        assert_eq!(session["turn_detection"]["type"], "server_vad");
        assert_eq!(session["tool_choice"], "auto");
        assert_eq!(session["tools"][0]["type"], "function");
        assert_eq!(session["tools"][0]["name"], "save_order");
        assert_eq!(session["tools"][0]["parameters"]["type"], "object");
    }

    #[test]
    fn test_handshake_reply() {
        let translator = OpenAITranslator;

        assert_eq!(
            translator
                .decode_handshake_reply(r#"{"type": "session.created", "session": {}}"#)
                .unwrap(),
            HandshakeReply::Pending
        );
        assert_eq!(
            translator
                .decode_handshake_reply(r#"{"type": "session.updated", "session": {}}"#)
                .unwrap(),
            HandshakeReply::Accepted
        );
        assert_eq!(
            translator
                .decode_handshake_reply(
                    r#"{"type": "error", "error": {"type": "invalid_request_error", "message": "bad voice"}}"#
                )
                .unwrap(),
            HandshakeReply::Rejected("bad voice".to_string())
        );
    }

    #[test]
    fn test_encode_client_text_requests_response() {
        let frames = OpenAITranslator.encode_client_text("halo").unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(parse(&frames[0])["item"]["content"][0]["text"], "halo");
        assert_eq!(parse(&frames[1])["type"], "response.create");
    }

    #[test]
    fn test_decode_deltas() {
        let audio = BASE64_STANDARD.encode([1u8, 2]);
        let events = OpenAITranslator
            .decode_upstream(&json!({"type": "response.audio.delta", "delta": audio}).to_string())
            .unwrap();
        assert_eq!(events, vec![InboundEvent::Audio(Bytes::from_static(&[1, 2]))]);

        let events = OpenAITranslator
            .decode_upstream(r#"{"type": "response.audio_transcript.delta", "delta": "Baik"}"#)
            .unwrap();
        assert_eq!(events, vec![InboundEvent::Text("Baik".to_string())]);

        assert!(
            OpenAITranslator
                .decode_upstream(r#"{"type": "response.text.delta", "delta": ""}"#)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_decode_response_done_batch() {
        let frame = json!({
            "type": "response.done",
            "response": {"output": [
                {"type": "function_call", "call_id": "a", "name": "save_order", "arguments": "{\"items\":[{\"menu\":\"cola\",\"qty\":1}]}"},
                {"type": "function_call", "call_id": "b", "name": "save_order", "arguments": "{broken"},
                {"type": "function_call", "call_id": "c"},
                {"type": "message", "id": "m1"}
            ]}
        })
        .to_string();

        let events = OpenAITranslator.decode_upstream(&frame).unwrap();
        match &events[..] {
            [InboundEvent::ToolCalls(calls)] => {
                assert_eq!(calls.len(), 3);
                assert_eq!(calls[2].id, "c");
                assert_eq!(calls[2].name, "");
                assert_eq!(calls[0].args, json!({"items": [{"menu": "cola", "qty": 1}]}));
                assert_eq!(calls[1].args, Value::String("{broken".to_string()));
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn test_decode_unknown_event_yields_nothing() {
        assert!(
            OpenAITranslator
                .decode_upstream(r#"{"type": "input_audio_buffer.speech_started"}"#)
                .unwrap()
                .is_empty()
        );
        assert!(matches!(
            OpenAITranslator.decode_upstream("{}"),
            Err(RealtimeError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_encode_tool_batch() {
        let results = vec![
            ToolResult::unknown_tool(&ToolCall::new("a", "delete_order", json!({}))),
            ToolResult::unknown_tool(&ToolCall::new("b", "refund", json!({}))),
        ];

        let frames = OpenAITranslator.encode_tool_batch(&results).unwrap();
        assert_eq!(frames.len(), 3);
        let first = parse(&frames[0]);
        assert_eq!(first["item"]["call_id"], "a");
        assert_eq!(
            parse(first["item"]["output"].as_str().unwrap()),
            json!({"status": "unknown_tool"})
        );
        assert_eq!(parse(&frames[2])["type"], "response.create");

        assert!(OpenAITranslator.encode_tool_batch(&[]).unwrap().is_empty());
    }
}
