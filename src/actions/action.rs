//! Normalized action model shared by both parser front ends.

use serde_json::{json, Map, Value};

/// Side length of the virtual screen grid the model addresses.
pub const COORDINATE_SCALE: i64 = 1000;

/// One decision made by the model for the current step.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Ends the task.
    Finish { message: Option<String> },
    /// Operates the device.
    Do(DoAction),
}

/// Device operation requested by the model.
///
/// Coordinates are kept as the raw integer lists the model produced; they are
/// validated and scaled against the screen only when the action is dispatched.
#[derive(Debug, Clone, PartialEq)]
pub enum DoAction {
    Launch { app: String },
    Tap { element: Vec<i64>, message: Option<String> },
    /// Also produced for `Type_Name`.
    Type { text: String },
    Swipe { start: Vec<i64>, end: Vec<i64> },
    Back,
    Home,
    DoubleTap { element: Vec<i64> },
    LongPress { element: Vec<i64> },
    Wait { duration: Option<String> },
    TakeOver { message: Option<String> },
    Note { message: Option<String> },
    CallApi { instruction: Option<String> },
    Interact,
    /// An action name outside the known vocabulary.
    Unknown { name: String },
}

impl Action {
    pub fn finish(message: impl Into<String>) -> Self {
        Action::Finish {
            message: Some(message.into()),
        }
    }

    pub fn is_finish(&self) -> bool {
        matches!(self, Action::Finish { .. })
    }

    /// The `message` parameter carried by the action, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            Action::Finish { message } => message.as_deref(),
            Action::Do(DoAction::Tap { message, .. })
            | Action::Do(DoAction::TakeOver { message })
            | Action::Do(DoAction::Note { message }) => message.as_deref(),
            Action::Do(_) => None,
        }
    }

    /// Render as the `_metadata`-tagged map used in logs and operator output.
    pub fn to_json(&self) -> Value {
        match self {
            Action::Finish { message } => {
                let mut map = Map::new();
                map.insert("_metadata".into(), json!("finish"));
                if let Some(message) = message {
                    map.insert("message".into(), json!(message));
                }
                Value::Object(map)
            }
            Action::Do(action) => {
                let mut map = Map::new();
                map.insert("_metadata".into(), json!("do"));
                map.insert("action".into(), json!(action.name()));
                action.write_params(&mut map);
                Value::Object(map)
            }
        }
    }
}

impl DoAction {
    /// Build an action from its name and a key/value argument map.
    pub fn from_args(name: &str, args: &Map<String, Value>) -> Self {
        match name {
            "Launch" => DoAction::Launch {
                app: string_arg(args, "app").unwrap_or_default(),
            },
            "Tap" => DoAction::Tap {
                element: coordinate_arg(args, "element"),
                message: string_arg(args, "message"),
            },
            "Type" | "Type_Name" => DoAction::Type {
                text: string_arg(args, "text").unwrap_or_default(),
            },
            "Swipe" => DoAction::Swipe {
                start: coordinate_arg(args, "start"),
                end: coordinate_arg(args, "end"),
            },
            "Back" => DoAction::Back,
            "Home" => DoAction::Home,
            "Double Tap" => DoAction::DoubleTap {
                element: coordinate_arg(args, "element"),
            },
            "Long Press" => DoAction::LongPress {
                element: coordinate_arg(args, "element"),
            },
            "Wait" => DoAction::Wait {
                duration: string_arg(args, "duration"),
            },
            "Take_over" => DoAction::TakeOver {
                message: string_arg(args, "message"),
            },
            "Note" => DoAction::Note {
                message: string_arg(args, "message"),
            },
            "Call_API" => DoAction::CallApi {
                instruction: string_arg(args, "instruction"),
            },
            "Interact" => DoAction::Interact,
            other => DoAction::Unknown {
                name: other.to_string(),
            },
        }
    }

    /// Action name as it appears in `do(action="...")`.
    pub fn name(&self) -> &str {
        match self {
            DoAction::Launch { .. } => "Launch",
            DoAction::Tap { .. } => "Tap",
            DoAction::Type { .. } => "Type",
            DoAction::Swipe { .. } => "Swipe",
            DoAction::Back => "Back",
            DoAction::Home => "Home",
            DoAction::DoubleTap { .. } => "Double Tap",
            DoAction::LongPress { .. } => "Long Press",
            DoAction::Wait { .. } => "Wait",
            DoAction::TakeOver { .. } => "Take_over",
            DoAction::Note { .. } => "Note",
            DoAction::CallApi { .. } => "Call_API",
            DoAction::Interact => "Interact",
            DoAction::Unknown { name } => name,
        }
    }

    fn write_params(&self, map: &mut Map<String, Value>) {
        let mut put = |key: &str, value: Value| {
            map.insert(key.to_string(), value);
        };
        match self {
            DoAction::Launch { app } => put("app", json!(app)),
            DoAction::Tap { element, message } => {
                put("element", json!(element));
                if let Some(message) = message {
                    put("message", json!(message));
                }
            }
            DoAction::Type { text } => put("text", json!(text)),
            DoAction::Swipe { start, end } => {
                put("start", json!(start));
                put("end", json!(end));
            }
            DoAction::DoubleTap { element } | DoAction::LongPress { element } => {
                put("element", json!(element))
            }
            DoAction::Wait { duration: Some(d) } => put("duration", json!(d)),
            DoAction::TakeOver { message: Some(m) } | DoAction::Note { message: Some(m) } => {
                put("message", json!(m))
            }
            DoAction::CallApi {
                instruction: Some(i),
            } => put("instruction", json!(i)),
            _ => {}
        }
    }
}

fn string_arg(args: &Map<String, Value>, key: &str) -> Option<String> {
    args.get(key).map(|value| match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Numeric list argument; non-numeric items are dropped, floats truncate.
fn coordinate_arg(args: &Map<String, Value>, key: &str) -> Vec<i64> {
    args.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
                .collect()
        })
        .unwrap_or_default()
}

/// A validated point on the 1000x1000 virtual grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coordinate {
    pub x: i64,
    pub y: i64,
}

impl Coordinate {
    /// Validate a raw `[x, y]` list.
    pub fn parse(values: &[i64]) -> Result<Self, String> {
        let &[x, y] = values else {
            return Err(format!(
                "expected 2 coordinates, got {}",
                values.len()
            ));
        };
        let range = 0..=COORDINATE_SCALE;
        if !range.contains(&x) || !range.contains(&y) {
            return Err(format!(
                "coordinate [{}, {}] is outside the 0-{} grid",
                x, y, COORDINATE_SCALE
            ));
        }
        Ok(Self { x, y })
    }

    /// Absolute pixel position on a screen of the given size.
    pub fn to_absolute(self, screen_width: u32, screen_height: u32) -> (i32, i32) {
        let scale = |value: i64, dimension: u32| {
            (value as f64 / COORDINATE_SCALE as f64 * dimension as f64).round() as i32
        };
        (scale(self.x, screen_width), scale(self.y, screen_height))
    }
}
