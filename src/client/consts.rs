pub const GEMINI_API_KEY: &str = "GEMINI_API_KEY";

pub const BASE_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";
pub const DEFAULT_MODEL: &str = "models/gemini-2.0-flash-exp";

pub const TOOL_NAME: &str = "controlSnake";
pub const TOOL_ACTION_PARAM: &str = "action";
pub const TOOL_ACK: &str = "OK";

pub const CAPTURE_CHANNELS: u16 = 1;
pub const PLAYBACK_CHANNELS: u16 = 1;

/// Queued outbound messages before new audio chunks are dropped.
pub const OUTBOUND_CAPACITY: usize = 64;
pub const INBOUND_CAPACITY: usize = 256;

pub const SYSTEM_INSTRUCTIONS: &str = r#"You are the voice controller of a Snake game.
- When the player says a command, call the controlSnake tool with the matching action.
- English commands: up, down, left, right, start, stop, pause, restart.
- Chinese commands: 上 (UP), 下 (DOWN), 左 (LEFT), 右 (RIGHT), 开始 (START), 停止 (STOP), 暂停 (PAUSE), 重新开始 (RESTART).
- After a tool call, answer with one or two words at most, ex: "OK" or "Turning left".
- Never start a conversation and never explain yourself."#;
