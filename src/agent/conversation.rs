//! Turn history replayed to the model on every request.

use crate::model::{ChatMessage, ContentPart, MessageContent, ToolCall};

/// Ordered turns of one task.
///
/// Only the newest user turn may carry a screenshot. Pushing a user turn
/// strips images from every earlier turn, and the agent calls
/// [`Conversation::strip_latest_image`] once the model has seen the screen.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_system(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::system(content));
    }

    pub fn push_user(&mut self, text: impl Into<String>, image_base64: Option<&str>) {
        self.messages.iter_mut().for_each(remove_images_from_message);
        self.messages.push(ChatMessage::user(text, image_base64));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>, tool_calls: Option<Vec<ToolCall>>) {
        self.messages.push(ChatMessage::assistant(content, tool_calls));
    }

    pub fn push_tool(&mut self, tool_call_id: impl Into<String>, content: impl Into<String>) {
        self.messages.push(ChatMessage::tool(tool_call_id, content));
    }

    /// Drop the image from the most recent user turn.
    pub fn strip_latest_image(&mut self) {
        if let Some(message) = self.messages.iter_mut().rev().find(|m| m.role == "user") {
            remove_images_from_message(message);
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of turns currently holding an image.
    pub fn image_count(&self) -> usize {
        self.messages.iter().filter(|m| m.has_image()).count()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

/// Remove image parts from a message, keeping text parts in order.
pub fn remove_images_from_message(message: &mut ChatMessage) {
    if let MessageContent::Parts(parts) = &mut message.content {
        parts.retain(|part| matches!(part, ContentPart::Text { .. }));
    }
}
