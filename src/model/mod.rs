//! Model client module for AI inference.

mod client;
mod stream;
mod tools;
mod types;

pub use client::{
    print_metrics, ChatModel, ModelClient, ModelConfig, ModelError, DEFAULT_MAX_RETRIES,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_RETRY_DELAY_SECS,
};
pub use stream::{parse_sse_line, StreamChunk, StreamCollector, ThinkingEcho, ToolCallAccumulator};
pub use tools::phone_tools;
pub use types::{
    ChatMessage, ContentPart, FunctionCall, FunctionDef, ImageUrl, MessageContent, ModelResponse,
    ResponseMetrics, ToolCall, ToolDef,
};
