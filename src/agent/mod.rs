//! Agent module for orchestrating phone automation.

mod conversation;
mod phone_agent;

pub use conversation::{remove_images_from_message, Conversation};
pub use phone_agent::{
    AgentConfig, AgentError, AgentState, PhoneAgent, StepResult, MAX_STEPS_REACHED,
};
