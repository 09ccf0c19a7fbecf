use crate::client::config::Config;
use crate::client::consts::{TOOL_ACTION_PARAM, TOOL_NAME};
use crate::command::ACTION_NAMES;
use secrecy::ExposeSecret;
use serde_json::json;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use voice_snake_types::{FunctionDeclaration, Setup, Tool};

pub fn build_request(config: &Config) -> tokio_tungstenite::tungstenite::Result<Request> {
    format!("{}?key={}", config.base_url(), config.api_key().expose_secret()).into_client_request()
}

/// The single `controlSnake` tool with its enumerated `action` parameter.
pub fn control_tool() -> Tool {
    Tool::functions(vec![FunctionDeclaration::new(
        TOOL_NAME.to_string(),
        "Controls the Snake game: turn the snake or change the game state.".to_string(),
        json!({
            "type": "OBJECT",
            "properties": {
                TOOL_ACTION_PARAM: {
                    "type": "STRING",
                    "enum": ACTION_NAMES,
                    "description": "Direction to turn, or START, STOP, RESTART, PAUSE."
                }
            },
            "required": [TOOL_ACTION_PARAM]
        }),
    )])
}

pub fn build_setup(config: &Config) -> Setup {
    Setup::builder(config.model())
        .with_voice(config.voice().clone())
        .with_instructions(config.instructions())
        .with_tools(vec![control_tool()])
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_declares_the_control_tool() {
        let config = Config::builder().with_api_key("k").with_model("models/m").build();
        let json = serde_json::to_value(build_setup(&config)).unwrap();

        let declaration = &json["tools"][0]["functionDeclarations"][0];
        assert_eq!(declaration["name"], "controlSnake");
        assert_eq!(declaration["parameters"]["required"], json!(["action"]));
        assert_eq!(
            declaration["parameters"]["properties"]["action"]["enum"],
            json!(["UP", "DOWN", "LEFT", "RIGHT", "START", "STOP", "RESTART", "PAUSE"])
        );
        assert_eq!(json["model"], "models/m");
        assert!(json["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .is_some_and(|text| text.contains("controlSnake") && text.contains("开始")));
    }

    #[test]
    fn request_carries_the_key() {
        let config = Config::builder()
            .with_base_url("wss://example.test/live")
            .with_api_key("secret")
            .build();
        let request = build_request(&config).unwrap();
        assert_eq!(request.uri().to_string(), "wss://example.test/live?key=secret");
    }
}
