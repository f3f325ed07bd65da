//! Parsers turning model output into an [`Action`].
//!
//! Two encodings are supported. [`DslParser`] reads the textual
//! `do(action="...", ...)` / `finish(message="...")` protocol, and
//! [`ToolCallParser`] reads structured function calls.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::model::{phone_tools, ModelResponse, ToolCall, ToolDef};

use super::action::{Action, DoAction};

const FINISH_MARKER: &str = "finish(message=";
const DO_MARKER: &str = "do(action=";

/// Markers that separate free-text reasoning from the action expression.
pub const ACTION_MARKERS: [&str; 2] = [FINISH_MARKER, DO_MARKER];

/// Errors raised while turning model output into an action.
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("Failed to parse action: {0}")]
    Malformed(String),
    #[error("Unknown function name: {0}")]
    UnknownFunction(String),
    #[error("Failed to parse function arguments: {0}")]
    InvalidArguments(String),
    #[error("Model produced no actionable call")]
    NoToolCall,
    #[error("Operator prompt failed: {0}")]
    Prompt(#[from] std::io::Error),
}

/// Which encoding the model is asked to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParserMode {
    /// `do(...)` / `finish(...)` text.
    Dsl,
    /// Function calling.
    #[default]
    Tools,
}

impl ParserMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParserMode::Dsl => "dsl",
            ParserMode::Tools => "tools",
        }
    }

    /// Parser implementing this mode.
    pub fn parser(self) -> Box<dyn ActionParser> {
        match self {
            ParserMode::Dsl => Box::new(DslParser),
            ParserMode::Tools => Box::new(ToolCallParser),
        }
    }
}

impl fmt::Display for ParserMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParserMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dsl" | "text" => Ok(ParserMode::Dsl),
            "tools" | "tool" | "function" => Ok(ParserMode::Tools),
            other => Err(format!("unknown parser mode: {} (expected dsl or tools)", other)),
        }
    }
}

/// A model response split into its reasoning and its action part.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reply {
    pub thinking: String,
    /// Action expression (DSL) or a readable rendering of the call (tools).
    pub action_text: String,
    pub tool_call: Option<ToolCall>,
}

/// Converts a model response into exactly one [`Action`].
pub trait ActionParser: Send + Sync {
    fn mode(&self) -> ParserMode;

    /// Function declarations to send with each request.
    fn tools(&self) -> Vec<ToolDef>;

    fn split(&self, response: &ModelResponse) -> Reply;

    fn parse(&self, reply: &Reply) -> Result<Action, ActionError>;
}

/// Parser for the textual `do(...)` / `finish(...)` protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct DslParser;

impl ActionParser for DslParser {
    fn mode(&self) -> ParserMode {
        ParserMode::Dsl
    }

    fn tools(&self) -> Vec<ToolDef> {
        Vec::new()
    }

    fn split(&self, response: &ModelResponse) -> Reply {
        let (thinking, action_text) = split_response(&response.content);
        Reply {
            thinking,
            action_text,
            tool_call: None,
        }
    }

    fn parse(&self, reply: &Reply) -> Result<Action, ActionError> {
        parse_action(&reply.action_text)
    }
}

/// Split raw model text into `(thinking, action)`.
///
/// Rules, in priority order:
/// 1. `finish(message=` present: text before it is thinking, the rest is the action.
/// 2. `do(action=` present: same split on that marker.
/// 3. `<answer>` present: think tags stripped from the prefix, tag body is the action.
/// 4. Otherwise the whole text is the action.
pub fn split_response(content: &str) -> (String, String) {
    for marker in ACTION_MARKERS {
        if let Some(index) = content.find(marker) {
            let thinking = strip_tags(&content[..index]);
            let action = content[index..].trim().trim_end_matches("</answer>").trim();
            return (thinking, action.to_string());
        }
    }

    if let Some((before, after)) = content.split_once("<answer>") {
        let thinking = strip_tags(before);
        let action = after.replace("</answer>", "").trim().to_string();
        return (thinking, action);
    }

    (String::new(), content.to_string())
}

fn strip_tags(text: &str) -> String {
    text.replace("<think>", "")
        .replace("</think>", "")
        .replace("<answer>", "")
        .trim()
        .to_string()
}

/// Parse one DSL action expression.
pub fn parse_action(expression: &str) -> Result<Action, ActionError> {
    let expression = expression.trim();

    if expression.starts_with("finish(") {
        return parse_finish(expression);
    }

    if expression.starts_with("do(") {
        if is_type_action(expression) {
            let text = quoted_argument(expression, "text=").ok_or_else(|| {
                ActionError::Malformed(format!("missing text in {}", expression))
            })?;
            return Ok(Action::Do(DoAction::Type { text }));
        }
        return parse_do(expression);
    }

    Err(ActionError::Malformed(expression.to_string()))
}

fn is_type_action(expression: &str) -> bool {
    ["Type", "Type_Name"].iter().any(|name| {
        expression.starts_with(&format!("do(action=\"{}\"", name))
            || expression.starts_with(&format!("do(action='{}'", name))
    })
}

fn parse_finish(expression: &str) -> Result<Action, ActionError> {
    if !expression.contains("message=") {
        return Ok(Action::Finish { message: None });
    }
    let message = quoted_argument(expression, "message=")
        .ok_or_else(|| ActionError::Malformed(expression.to_string()))?;
    Ok(Action::Finish {
        message: Some(message),
    })
}

/// Value of a quoted argument that runs to the end of the call.
///
/// Used for free-text arguments which may contain commas, quotes or
/// parentheses. The value ends at the last matching quote before the closing `)`.
fn quoted_argument(expression: &str, key: &str) -> Option<String> {
    let start = expression.find(key)? + key.len();
    let rest = &expression[start..];
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let body = rest[1..]
        .trim_end()
        .strip_suffix(')')?
        .trim_end()
        .strip_suffix(quote)?;
    Some(body.to_string())
}

fn parse_do(expression: &str) -> Result<Action, ActionError> {
    let body = expression
        .strip_prefix("do(")
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| ActionError::Malformed(expression.to_string()))?;

    let mut args = Map::new();
    for fragment in split_arguments(body) {
        let (key, raw) = fragment.split_once('=').ok_or_else(|| {
            ActionError::Malformed(format!("argument without '=': {}", fragment))
        })?;
        let value = parse_literal(raw.trim())
            .ok_or_else(|| ActionError::Malformed(format!("invalid value: {}", raw.trim())))?;
        args.insert(key.trim().to_string(), value);
    }

    let name = match args.remove("action") {
        Some(Value::String(name)) => name,
        _ => return Err(ActionError::Malformed(format!("missing action name: {}", expression))),
    };

    Ok(Action::Do(DoAction::from_args(&name, &args)))
}

/// Split a call body on top-level commas, ignoring commas inside quotes or brackets.
fn split_arguments(body: &str) -> Vec<&str> {
    let mut fragments = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in body.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                fragments.push(body[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = body[start..].trim();
    if !last.is_empty() {
        fragments.push(last);
    }
    fragments
}

/// Literal forms, tried in order: quoted string, boolean, integer list, integer, float.
fn parse_literal(raw: &str) -> Option<Value> {
    if let Some(s) = unquote(raw) {
        return Some(Value::String(s.to_string()));
    }
    match raw {
        "true" | "True" => return Some(Value::Bool(true)),
        "false" | "False" => return Some(Value::Bool(false)),
        _ => {}
    }
    if let Some(inner) = raw.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        let items = inner
            .split(',')
            .map(|item| item.trim().parse::<i64>().ok().map(Value::from))
            .collect::<Option<Vec<_>>>()?;
        return Some(Value::Array(items));
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Some(Value::from(n));
    }
    raw.parse::<f64>().ok().map(Value::from)
}

fn unquote(raw: &str) -> Option<&str> {
    ['"', '\''].iter().find_map(|q| {
        raw.strip_prefix(*q)
            .and_then(|s| s.strip_suffix(*q))
    })
}

/// Parser for structured function calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolCallParser;

/// Map a function name to the internal action name.
pub fn map_function_to_action(name: &str) -> Result<&'static str, ActionError> {
    let action = match name {
        "tap" => "Tap",
        "type_text" => "Type",
        "swipe" => "Swipe",
        "long_press" => "Long Press",
        "double_tap" => "Double Tap",
        "launch_app" => "Launch",
        "press_back" => "Back",
        "press_home" => "Home",
        "wait" => "Wait",
        "take_over" => "Take_over",
        "interact" => "Interact",
        "record_note" => "Note",
        "call_api" => "Call_API",
        "finish_task" => "finish",
        other => return Err(ActionError::UnknownFunction(other.to_string())),
    };
    Ok(action)
}

/// Convert one function call into an action.
pub fn parse_function_call(call: &ToolCall) -> Result<Action, ActionError> {
    tracing::debug!(
        name = %call.function.name,
        arguments = %call.function.arguments,
        "parsing function call"
    );

    let action_name = map_function_to_action(&call.function.name)?;

    let arguments = call.function.arguments.trim();
    let args: Map<String, Value> = if arguments.is_empty() {
        Map::new()
    } else {
        serde_json::from_str(arguments).map_err(|e| ActionError::InvalidArguments(e.to_string()))?
    };

    if action_name == "finish" {
        let message = args
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Task completed");
        return Ok(Action::finish(message));
    }

    Ok(Action::Do(DoAction::from_args(action_name, &args)))
}

impl ActionParser for ToolCallParser {
    fn mode(&self) -> ParserMode {
        ParserMode::Tools
    }

    fn tools(&self) -> Vec<ToolDef> {
        phone_tools()
    }

    fn split(&self, response: &ModelResponse) -> Reply {
        let tool_call = response.tool_calls.first().cloned();
        if response.tool_calls.len() > 1 {
            tracing::warn!(
                count = response.tool_calls.len(),
                "model returned several tool calls; only the first is used"
            );
        }
        let action_text = tool_call
            .as_ref()
            .map(|c| format!("{}({})", c.function.name, c.function.arguments))
            .unwrap_or_default();
        Reply {
            thinking: response.content.trim().to_string(),
            action_text,
            tool_call,
        }
    }

    fn parse(&self, reply: &Reply) -> Result<Action, ActionError> {
        let call = reply.tool_call.as_ref().ok_or(ActionError::NoToolCall)?;
        parse_function_call(call)
    }
}
