//! Function declarations offered to the model in tool-calling mode.

use serde_json::{json, Map, Value};

use super::types::{FunctionDef, ToolDef};

fn coordinate_param(description: &str) -> Value {
    json!({
        "type": "array",
        "description": description,
        "items": {"type": "integer"},
        "minItems": 2,
        "maxItems": 2,
    })
}

fn string_param(description: &str) -> Value {
    json!({"type": "string", "description": description})
}

fn tool(name: &str, description: &str, properties: &[(&str, Value)], required: &[&str]) -> ToolDef {
    let properties: Map<String, Value> = properties
        .iter()
        .map(|(key, schema)| (key.to_string(), schema.clone()))
        .collect();

    let mut parameters = json!({"type": "object", "properties": properties});
    if !required.is_empty() {
        parameters["required"] = json!(required);
    }

    ToolDef {
        def_type: "function".to_string(),
        function: FunctionDef {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        },
    }
}

/// All functions the phone agent understands. Coordinates are on the
/// 0-1000 relative grid.
pub fn phone_tools() -> Vec<ToolDef> {
    vec![
        tool(
            "tap",
            "Tap a point on the screen. Use it for buttons, list items, app icons and any other clickable element.",
            &[
                ("element", coordinate_param("Coordinates of the tap point [x, y]")),
                (
                    "message",
                    string_param("Optional message for sensitive operations such as payments or privacy settings"),
                ),
            ],
            &["element"],
        ),
        tool(
            "type_text",
            "Enter text into the focused input field. Tap the field first so it has focus.",
            &[("text", string_param("The text to input"))],
            &["text"],
        ),
        tool(
            "swipe",
            "Drag from the start point to the end point. Use it to scroll, switch pages or pull down panels.",
            &[
                ("start", coordinate_param("Start coordinates [x1, y1]")),
                ("end", coordinate_param("End coordinates [x2, y2]")),
            ],
            &["start", "end"],
        ),
        tool(
            "long_press",
            "Press and hold a point on the screen, for context menus or text selection.",
            &[("element", coordinate_param("Coordinates of the long press point [x, y]"))],
            &["element"],
        ),
        tool(
            "double_tap",
            "Tap a point twice in quick succession, for zooming or opening items.",
            &[("element", coordinate_param("Coordinates of the double tap point [x, y]"))],
            &["element"],
        ),
        tool(
            "launch_app",
            "Launch an app directly instead of navigating the home screen. A new screenshot follows automatically.",
            &[("app", string_param("Name of the app to launch"))],
            &["app"],
        ),
        tool(
            "press_back",
            "Go back to the previous screen or close the current dialog.",
            &[],
            &[],
        ),
        tool(
            "press_home",
            "Return to the launcher home screen.",
            &[],
            &[],
        ),
        tool(
            "wait",
            "Wait for a page to load or an animation to settle.",
            &[(
                "duration",
                json!({
                    "type": "number",
                    "description": "Duration in seconds to wait",
                    "default": 1.0,
                }),
            )],
            &[],
        ),
        tool(
            "take_over",
            "Hand control to the user for login, verification or any step the agent cannot complete.",
            &[("message", string_param("What the user needs to do"))],
            &["message"],
        ),
        tool(
            "interact",
            "Ask the user to choose when several options satisfy the task.",
            &[("message", string_param("Description of the interaction needed"))],
            &[],
        ),
        tool(
            "record_note",
            "Record the content of the current page for later summarization.",
            &[("message", string_param("Content to record"))],
            &[],
        ),
        tool(
            "call_api",
            "Summarize or comment on the current page or recorded content.",
            &[("instruction", string_param("What to summarize or analyze"))],
            &["instruction"],
        ),
        tool(
            "finish_task",
            "Finish the task and report the outcome.",
            &[("message", string_param("What was accomplished"))],
            &["message"],
        ),
    ]
}
