mod client;
pub mod command;
pub mod config;
pub mod error;
pub mod game;
pub mod runner;

pub use voice_snake_types as types;
pub use voice_snake_utils as utils;

pub use client::{
    build_request, build_setup, control_tool, AudioDevices, CaptureStream, Config, ConfigBuilder, Connection,
    EventTx, Inbound, NativeAudio, PlaybackSink, SessionEvent, SessionManager, Transport, WsTransport, DEFAULT_MODEL,
    GEMINI_API_KEY, TOOL_NAME,
};
