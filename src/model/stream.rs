//! Server-sent event handling for streamed chat completions.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::time::Instant;

use serde_json::Value;

use super::client::ModelError;
use super::types::{ModelResponse, ResponseMetrics, ToolCall};
use crate::actions::ACTION_MARKERS;

/// One meaningful piece of an SSE stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    Content(String),
    Reasoning(String),
    /// Raw `delta.tool_calls` fragments.
    ToolCalls(Vec<Value>),
    Done,
}

/// Parse one SSE line. Keep-alives and non-data lines yield `None`.
pub fn parse_sse_line(line: &str) -> Result<Option<StreamChunk>, ModelError> {
    if line.is_empty() || line.starts_with(':') {
        return Ok(None);
    }

    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim();

    if data == "[DONE]" {
        return Ok(Some(StreamChunk::Done));
    }

    let json: Value = serde_json::from_str(data).map_err(|e| ModelError::Stream(e.to_string()))?;

    if let Some(message) = json["error"]["message"].as_str() {
        return Err(ModelError::ApiError(message.to_string()));
    }

    let Some(first) = json["choices"].as_array().and_then(|c| c.first()) else {
        return Ok(None);
    };
    let delta = &first["delta"];

    if let Some(reasoning) = delta["reasoning_content"].as_str() {
        if !reasoning.is_empty() {
            return Ok(Some(StreamChunk::Reasoning(reasoning.to_string())));
        }
    }

    if let Some(tool_calls) = delta["tool_calls"].as_array() {
        if !tool_calls.is_empty() {
            return Ok(Some(StreamChunk::ToolCalls(tool_calls.clone())));
        }
    }

    if let Some(content) = delta["content"].as_str() {
        if !content.is_empty() {
            return Ok(Some(StreamChunk::Content(content.to_string())));
        }
    }

    if first["finish_reason"].as_str().is_some() {
        return Ok(Some(StreamChunk::Done));
    }

    Ok(None)
}

#[derive(Debug, Default)]
struct PartialCall {
    id: String,
    call_type: String,
    name: String,
    arguments: String,
}

/// Reassembles tool calls from their streamed fragments, keyed by index.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: BTreeMap<usize, PartialCall>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, deltas: &[Value]) {
        for delta in deltas {
            let index = delta["index"].as_u64().unwrap_or(0) as usize;
            let entry = self.calls.entry(index).or_default();

            if let Some(id) = delta["id"].as_str().filter(|id| !id.is_empty()) {
                entry.id = id.to_string();
            }
            if let Some(call_type) = delta["type"].as_str().filter(|t| !t.is_empty()) {
                entry.call_type = call_type.to_string();
            }
            if let Some(name) = delta["function"]["name"].as_str() {
                entry.name.push_str(name);
            }
            if let Some(arguments) = delta["function"]["arguments"].as_str() {
                entry.arguments.push_str(arguments);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Completed calls in index order. Fragments that never got a name are dropped.
    pub fn finish(self) -> Vec<ToolCall> {
        self.calls
            .into_values()
            .filter(|call| !call.name.is_empty())
            .map(|call| {
                let id = if call.id.is_empty() {
                    format!("call_{}", uuid::Uuid::new_v4().simple())
                } else {
                    call.id
                };
                let mut tool_call = ToolCall::function(id, call.name, call.arguments);
                if !call.call_type.is_empty() {
                    tool_call.call_type = call.call_type;
                }
                tool_call
            })
            .collect()
    }
}

/// Decides which part of streamed text can be echoed as thinking.
///
/// Text is released as it arrives until an action marker shows up. A buffer
/// tail that could still grow into a marker is held back.
#[derive(Debug, Default)]
pub struct ThinkingEcho {
    pending: String,
    reached_action: bool,
}

impl ThinkingEcho {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an action marker has been seen.
    pub fn reached_action(&self) -> bool {
        self.reached_action
    }

    /// Feed a content delta; returns the text that is safe to print now.
    pub fn push(&mut self, delta: &str) -> Option<String> {
        if self.reached_action {
            return None;
        }
        self.pending.push_str(delta);

        let marker_at = ACTION_MARKERS
            .iter()
            .filter_map(|marker| self.pending.find(marker))
            .min();
        if let Some(index) = marker_at {
            self.reached_action = true;
            let mut thinking = self.pending[..index].to_string();
            self.pending.clear();
            thinking.push('\n');
            return Some(thinking);
        }

        let held = ACTION_MARKERS
            .iter()
            .flat_map(|marker| (1..marker.len()).map(move |len| &marker[..len]))
            .filter(|prefix| self.pending.ends_with(prefix))
            .map(str::len)
            .max()
            .unwrap_or(0);

        let release = self.pending.len() - held;
        if release == 0 {
            return None;
        }
        let text = self.pending[..release].to_string();
        self.pending.drain(..release);
        Some(text)
    }
}

/// Assembles a streamed completion from raw SSE bytes.
///
/// Thinking and reasoning deltas are echoed to stdout when `verbose` is set.
pub struct StreamCollector {
    started: Instant,
    verbose: bool,
    line_buf: Vec<u8>,
    content: String,
    tool_calls: ToolCallAccumulator,
    echo: ThinkingEcho,
    metrics: ResponseMetrics,
    done: bool,
}

impl StreamCollector {
    pub fn new(started: Instant, verbose: bool) -> Self {
        Self {
            started,
            verbose,
            line_buf: Vec::new(),
            content: String::new(),
            tool_calls: ToolCallAccumulator::new(),
            echo: ThinkingEcho::new(),
            metrics: ResponseMetrics::default(),
            done: false,
        }
    }

    /// Whether `[DONE]` or a finish reason has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed raw bytes; each complete line is handled as soon as it ends.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<(), ModelError> {
        for &byte in bytes {
            if self.done {
                break;
            }
            if byte != b'\n' {
                self.line_buf.push(byte);
                continue;
            }
            let line = std::mem::take(&mut self.line_buf);
            self.handle_line(&line)?;
        }
        Ok(())
    }

    /// Handle a trailing line without a newline and build the response.
    pub fn finish(mut self) -> Result<ModelResponse, ModelError> {
        if !self.done && !self.line_buf.is_empty() {
            let line = std::mem::take(&mut self.line_buf);
            self.handle_line(&line)?;
        }

        self.metrics.total_time = self.started.elapsed().as_secs_f64();
        Ok(ModelResponse {
            content: self.content,
            tool_calls: self.tool_calls.finish(),
            metrics: self.metrics,
        })
    }

    fn handle_line(&mut self, raw: &[u8]) -> Result<(), ModelError> {
        let line = String::from_utf8_lossy(raw);
        let chunk = match parse_sse_line(line.trim()) {
            Ok(Some(chunk)) => chunk,
            Ok(None) => return Ok(()),
            Err(ModelError::Stream(e)) => {
                tracing::debug!("SSE parse skipped: {}", e);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if self.metrics.time_to_first_token.is_none() && chunk != StreamChunk::Done {
            self.metrics.time_to_first_token = Some(self.elapsed());
        }

        match chunk {
            StreamChunk::Content(delta) => {
                self.content.push_str(&delta);
                let was_thinking = !self.echo.reached_action();
                let printable = self.echo.push(&delta);
                if was_thinking && self.echo.reached_action() {
                    self.metrics.time_to_thinking_end = Some(self.elapsed());
                }
                if let Some(text) = printable {
                    self.print(&text);
                }
            }
            StreamChunk::Reasoning(delta) => self.print(&delta),
            StreamChunk::ToolCalls(deltas) => {
                if self.metrics.time_to_thinking_end.is_none() {
                    self.metrics.time_to_thinking_end = Some(self.elapsed());
                }
                self.tool_calls.merge(&deltas);
            }
            StreamChunk::Done => self.done = true,
        }
        Ok(())
    }

    fn elapsed(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    fn print(&self, text: &str) {
        if self.verbose {
            print!("{}", text);
            let _ = io::stdout().flush();
        }
    }
}
