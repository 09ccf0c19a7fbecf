pub mod audio;
pub mod events;
pub mod setup;
pub mod tools;

pub use events::{ClientMessage, RealtimeInput, ServerContent, ServerMessage};
pub use setup::{Setup, SetupBuilder};
pub use tools::{FunctionCall, FunctionDeclaration, FunctionResponse, Tool, ToolCall, ToolResponse};
