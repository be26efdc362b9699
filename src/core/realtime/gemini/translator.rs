use base64::prelude::*;
use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, warn};

use super::config::{GEMINI_INPUT_SAMPLE_RATE, qualified_model_name};
use super::messages::{
    Blob, ClientContent, ClientMessage, Content, FunctionDeclaration, FunctionResponse,
    GenerationConfig, Part, PrebuiltVoiceConfig, RealtimeInput, ServerMessage, Setup,
    SpeechConfig, ToolResponse, ToolSpec, VoiceConfig,
};
use crate::core::realtime::base::{
    HandshakeReply, InboundEvent, RealtimeError, RealtimeResult, SessionSettings,
    SessionTranslator, WireMessage,
};
use crate::core::tools::{Schema, ToolCall, ToolDeclaration, ToolResult};

/// Translator for the Gemini Live JSON binding.
#[derive(Debug, Clone)]
pub struct GeminiTranslator {
    input_sample_rate: u32,
}

impl Default for GeminiTranslator {
    fn default() -> Self {
        Self::new(GEMINI_INPUT_SAMPLE_RATE)
    }
}

impl GeminiTranslator {
    pub fn new(input_sample_rate: u32) -> Self {
        Self { input_sample_rate }
    }

    fn audio_mime_type(&self) -> String {
        format!("audio/pcm;rate={}", self.input_sample_rate)
    }

    fn encode(message: &ClientMessage) -> RealtimeResult<WireMessage> {
        Ok(serde_json::to_string(message)?)
    }

    fn function_declaration(tool: &ToolDeclaration) -> FunctionDeclaration {
        FunctionDeclaration {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: openapi_schema(&tool.parameters),
        }
    }
}

fn tool_response(results: &[ToolResult]) -> ClientMessage {
    ClientMessage::ToolResponse(ToolResponse {
        function_responses: results
            .iter()
            .map(|result| FunctionResponse {
                id: result.id.clone(),
                name: result.name.clone(),
                response: result.response.clone(),
            })
            .collect(),
    })
}

/// Gemini expects OpenAPI type names (`OBJECT`, `STRING`, ...) in declarations.
fn openapi_schema(schema: &Schema) -> Value {
    let mut value = schema.to_json();
    uppercase_types(&mut value);
    value
}

fn uppercase_types(value: &mut Value) {
    let Value::Object(map) = value else {
        return;
    };
    if let Some(Value::String(kind)) = map.get_mut("type") {
        *kind = kind.to_uppercase();
    }
    if let Some(Value::Object(properties)) = map.get_mut("properties") {
        properties.values_mut().for_each(uppercase_types);
    }
    if let Some(items) = map.get_mut("items") {
        uppercase_types(items);
    }
}

impl SessionTranslator for GeminiTranslator {
    fn binding(&self) -> &'static str {
        "gemini"
    }

    fn build_handshake(&self, settings: &SessionSettings) -> RealtimeResult<WireMessage> {
        let speech_config = if settings.locale.is_some() || settings.voice.is_some() {
            Some(SpeechConfig {
                language_code: settings.locale.clone(),
                voice_config: settings.voice.as_ref().map(|voice| VoiceConfig {
                    prebuilt_voice_config: PrebuiltVoiceConfig {
                        voice_name: voice.clone(),
                    },
                }),
            })
        } else {
            None
        };

        let system_instruction = (!settings.persona.is_empty()).then(|| Content {
            role: None,
            parts: vec![Part {
                text: Some(settings.persona.clone()),
                inline_data: None,
            }],
        });

        let tools = if settings.tools.is_empty() {
            Vec::new()
        } else {
            vec![ToolSpec {
                function_declarations: settings
                    .tools
                    .iter()
                    .map(Self::function_declaration)
                    .collect(),
            }]
        };

        Self::encode(&ClientMessage::Setup(Setup {
            model: qualified_model_name(&settings.model),
            generation_config: Some(GenerationConfig {
                response_modalities: settings
                    .response_modalities
                    .iter()
                    .map(|m| m.as_str().to_string())
                    .collect(),
                speech_config,
            }),
            system_instruction,
            tools,
        }))
    }

    fn decode_handshake_reply(&self, frame: &str) -> RealtimeResult<HandshakeReply> {
        let message: ServerMessage = serde_json::from_str(frame)
            .map_err(|e| RealtimeError::MalformedFrame(e.to_string()))?;

        if let Some(error) = message.error {
            return Ok(HandshakeReply::Rejected(error.message));
        }
        if message.setup_complete.is_some() {
            return Ok(HandshakeReply::Accepted);
        }
        Ok(HandshakeReply::Pending)
    }

    fn encode_client_audio(&self, audio: &[u8]) -> RealtimeResult<WireMessage> {
        Self::encode(&ClientMessage::RealtimeInput(RealtimeInput {
            media_chunks: vec![Blob {
                mime_type: self.audio_mime_type(),
                data: BASE64_STANDARD.encode(audio),
            }],
        }))
    }

    fn encode_client_text(&self, text: &str) -> RealtimeResult<Vec<WireMessage>> {
        let message = ClientMessage::ClientContent(ClientContent {
            turns: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(text.to_string()),
                    inline_data: None,
                }],
            }],
            turn_complete: true,
        });
        Ok(vec![Self::encode(&message)?])
    }

    fn decode_upstream(&self, frame: &str) -> RealtimeResult<Vec<InboundEvent>> {
        let message: ServerMessage = serde_json::from_str(frame)
            .map_err(|e| RealtimeError::MalformedFrame(e.to_string()))?;

        let mut events = Vec::new();

        if let Some(content) = message.server_content {
            for part in content.model_turn.map(|turn| turn.parts).unwrap_or_default() {
                if let Some(text) = part.text
                    && !text.is_empty()
                {
                    events.push(InboundEvent::Text(text));
                }
                if let Some(blob) = part.inline_data {
                    if !blob.mime_type.starts_with("audio/") {
                        debug!(mime_type = %blob.mime_type, "Ignoring non-audio inline data");
                        continue;
                    }
                    match BASE64_STANDARD.decode(blob.data.as_bytes()) {
                        Ok(audio) if !audio.is_empty() => {
                            events.push(InboundEvent::Audio(Bytes::from(audio)));
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "Skipping audio part with invalid base64"),
                    }
                }
            }
            if content.interrupted {
                debug!("Gemini reported an interrupted turn");
            }
            if content.turn_complete {
                debug!("Gemini turn complete");
            }
        }

        if let Some(batch) = message.tool_call
            && !batch.function_calls.is_empty()
        {
            events.push(InboundEvent::ToolCalls(
                batch
                    .function_calls
                    .into_iter()
                    .map(|call| ToolCall::new(call.id, call.name, call.args))
                    .collect(),
            ));
        }

        if let Some(cancellation) = message.tool_call_cancellation {
            debug!(ids = ?cancellation.ids, "Gemini cancelled tool calls");
        }
        if message.go_away.is_some() {
            debug!("Gemini announced an upcoming disconnect");
        }

        Ok(events)
    }

    fn encode_tool_result(&self, result: &ToolResult) -> RealtimeResult<WireMessage> {
        Self::encode(&tool_response(std::slice::from_ref(result)))
    }

    /// Gemini expects every call of a `toolCall` batch answered in one `toolResponse`.
    fn encode_tool_batch(&self, results: &[ToolResult]) -> RealtimeResult<Vec<WireMessage>> {
        Ok(vec![Self::encode(&tool_response(results))?])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::realtime::base::Modality;
    use crate::core::tools::builtin::save_order_declaration;
    use serde_json::{Map, json};

    fn settings() -> SessionSettings {
        SessionSettings {
            model: "models/gemini-2.0-flash-live-001".to_string(),
            persona: "Kamu adalah asisten drive thru.".to_string(),
            locale: Some("id-ID".to_string()),
            voice: None,
            response_modalities: vec![Modality::Audio, Modality::Text],
            input_sample_rate: 16000,
            tools: vec![save_order_declaration()],
        }
    }

    fn parse(frame: &str) -> Value {
        serde_json::from_str(frame).unwrap()
    }

    #[test]
    fn test_handshake_shape() {
        let handshake = parse(&GeminiTranslator::default().build_handshake(&settings()).unwrap());
        let setup = &handshake["setup"];

        assert_eq!(setup["model"], "models/gemini-2.0-flash-live-001");
        assert_eq!(
            setup["generationConfig"]["responseModalities"],
            json!(["AUDIO", "TEXT"])
        );
        assert_eq!(
            setup["generationConfig"]["speechConfig"]["languageCode"],
            "id-ID"
        );
        assert!(setup["generationConfig"]["speechConfig"].get("voiceConfig").is_none());
        assert_eq!(
            setup["systemInstruction"]["parts"][0]["text"],
            "Kamu adalah asisten drive thru."
        );

        let declaration = &setup["tools"][0]["functionDeclarations"][0];
        assert_eq!(declaration["name"], "save_order");
        assert_eq!(declaration["parameters"]["type"], "OBJECT");
        assert_eq!(declaration["parameters"]["properties"]["items"]["type"], "ARRAY");
        assert_eq!(
            declaration["parameters"]["properties"]["items"]["items"]["properties"]["qty"]["type"],
            "INTEGER"
        );
        assert_eq!(declaration["parameters"]["required"], json!(["items"]));
    }

    #[test]
    fn test_handshake_with_voice_and_no_tools() {
        let mut settings = settings();
        settings.voice = Some("Puck".to_string());
        settings.tools.clear();
        settings.model = "gemini-2.0-flash-live-001".to_string();

        let handshake = parse(&GeminiTranslator::default().build_handshake(&settings).unwrap());
        let setup = &handshake["setup"];

        assert_eq!(setup["model"], "models/gemini-2.0-flash-live-001");
        assert_eq!(
            setup["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"],
            "Puck"
        );
        assert!(setup.get("tools").is_none());
    }

    #[test]
    fn test_handshake_reply() {
        let translator = GeminiTranslator::default();

        assert_eq!(
            translator.decode_handshake_reply(r#"{"setupComplete": {}}"#).unwrap(),
            HandshakeReply::Accepted
        );
        assert_eq!(
            translator
                .decode_handshake_reply(r#"{"error": {"code": 400, "message": "bad model"}}"#)
                .unwrap(),
            HandshakeReply::Rejected("bad model".to_string())
        );
        assert_eq!(
            translator.decode_handshake_reply(r#"{"usageMetadata": {}}"#).unwrap(),
            HandshakeReply::Pending
        );
        assert!(translator.decode_handshake_reply("not json").is_err());
    }

    #[test]
    fn test_encode_client_audio() {
        let frame = parse(&GeminiTranslator::default().encode_client_audio(&[1, 2, 3]).unwrap());
        let chunk = &frame["realtimeInput"]["mediaChunks"][0];

        assert_eq!(chunk["mimeType"], "audio/pcm;rate=16000");
        assert_eq!(chunk["data"], BASE64_STANDARD.encode([1u8, 2, 3]));
    }

    #[test]
    fn test_encode_client_text() {
        let frames = GeminiTranslator::default().encode_client_text("halo").unwrap();
        assert_eq!(frames.len(), 1);

        let frame = parse(&frames[0]);
        assert_eq!(frame["clientContent"]["turnComplete"], true);
        assert_eq!(frame["clientContent"]["turns"][0]["role"], "user");
        assert_eq!(frame["clientContent"]["turns"][0]["parts"][0]["text"], "halo");
    }

    #[test]
    fn test_decode_empty_frame_yields_no_events() {
        let translator = GeminiTranslator::default();
        assert!(translator.decode_upstream("{}").unwrap().is_empty());
        assert!(
            translator
                .decode_upstream(r#"{"serverContent": {"turnComplete": true}}"#)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_decode_mixed_frame_keeps_part_order() {
        let audio = BASE64_STANDARD.encode([9u8, 8, 7, 6]);
        let frame = json!({
            "serverContent": {
                "modelTurn": {
                    "parts": [
                        {"text": "Baik, "},
                        {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": audio}},
                        {"text": "pesanan dicatat."}
                    ]
                }
            },
            "toolCall": {
                "functionCalls": [
                    {"id": "c1", "name": "save_order", "args": {"items": [{"menu": "cola", "qty": 2}]}}
                ]
            }
        })
        .to_string();

        let events = GeminiTranslator::default().decode_upstream(&frame).unwrap();
        assert_eq!(
            events,
            vec![
                InboundEvent::Text("Baik, ".to_string()),
                InboundEvent::Audio(Bytes::from_static(&[9, 8, 7, 6])),
                InboundEvent::Text("pesanan dicatat.".to_string()),
                InboundEvent::ToolCalls(vec![ToolCall::new(
                    "c1",
                    "save_order",
                    json!({"items": [{"menu": "cola", "qty": 2}]})
                )]),
            ]
        );
    }

    #[test]
    fn test_decode_multi_call_batch() {
        let frame = r#"{"toolCall": {"functionCalls": [
            {"id": "a", "name": "save_order", "args": {}},
            {"id": "b", "name": "delete_order"}
        ]}}"#;

        let events = GeminiTranslator::default().decode_upstream(frame).unwrap();
        match &events[..] {
            [InboundEvent::ToolCalls(calls)] => {
                assert_eq!(calls.len(), 2);
                assert_eq!(calls[1].id, "b");
                assert_eq!(calls[1].args, Value::Null);
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn test_decode_ignores_non_audio_inline_data() {
        let frame = r#"{"serverContent": {"modelTurn": {"parts": [{"inlineData": {"mimeType": "image/png", "data": "AAAA"}}]}}}"#;
        assert!(GeminiTranslator::default().decode_upstream(frame).unwrap().is_empty());
    }

    #[test]
    fn test_decode_malformed_frames() {
        let translator = GeminiTranslator::default();

        assert!(matches!(
            translator.decode_upstream("{not json"),
            Err(RealtimeError::MalformedFrame(_))
        ));
        assert!(matches!(
            translator.decode_upstream("[1, 2]"),
            Err(RealtimeError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_invalid_audio_part_keeps_rest_of_frame() {
        let frame = json!({
            "serverContent": {"modelTurn": {"parts": [
                {"inlineData": {"mimeType": "audio/pcm", "data": "@@@"}},
                {"text": "Siap"}
            ]}},
            "toolCall": {"functionCalls": [
                {"id": "c1", "name": "save_order", "args": {"items": [{"menu": "cola", "qty": 2}]}}
            ]}
        })
        .to_string();

        let events = GeminiTranslator::default().decode_upstream(&frame).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], InboundEvent::Text("Siap".to_string()));
        assert!(matches!(&events[1], InboundEvent::ToolCalls(calls) if calls[0].id == "c1"));
    }

    #[test]
    fn test_nameless_call_stays_in_batch() {
        let frame = r#"{"toolCall": {"functionCalls": [
            {"id": "c1", "name": "save_order", "args": {}},
            {"id": "c2"}
        ]}}"#;

        let events = GeminiTranslator::default().decode_upstream(frame).unwrap();
        match &events[..] {
            [InboundEvent::ToolCalls(calls)] => {
                assert_eq!(calls.len(), 2);
                assert_eq!(calls[1].id, "c2");
                assert_eq!(calls[1].name, "");
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn test_encode_tool_batch_is_single_message() {
        let mut ok = Map::new();
        ok.insert("status".into(), json!("ok"));
        let results = vec![
            ToolResult {
                id: "c1".into(),
                name: "save_order".into(),
                response: ok,
            },
            ToolResult::unknown_tool(&ToolCall::new("c2", "delete_order", json!({}))),
        ];

        let frames = GeminiTranslator::default().encode_tool_batch(&results).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(
            parse(&frames[0]),
            json!({"toolResponse": {"functionResponses": [
                {"id": "c1", "name": "save_order", "response": {"status": "ok"}},
                {"id": "c2", "name": "delete_order", "response": {"status": "unknown_tool"}}
            ]}})
        );
    }

    #[test]
    fn test_encode_tool_result_preserves_id() {
        let result = ToolResult::unknown_tool(&ToolCall::new("function-call-8812", "x", json!({})));
        let frame = parse(&GeminiTranslator::default().encode_tool_result(&result).unwrap());
        assert_eq!(
            frame["toolResponse"]["functionResponses"][0]["id"],
            "function-call-8812"
        );
    }
}
