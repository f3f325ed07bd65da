//! Actions module for turning model replies into device operations.

mod action;
mod handler;
mod parser;

pub use action::{Action, Coordinate, DoAction, COORDINATE_SCALE};
pub use handler::{
    parse_wait_duration, ActionHandler, ActionResult, ConfirmationCallback, TakeoverCallback,
};
pub use parser::{
    map_function_to_action, parse_action, parse_function_call, split_response, ActionError,
    ActionParser, DslParser, ParserMode, Reply, ToolCallParser, ACTION_MARKERS,
};
