use crate::error::GenerationError;
use async_trait::async_trait;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// a text completion service.
///
/// one request, one response. the agent bounds each call with a timeout and
/// drops the future when it fires, so implementations must release whatever
/// they hold (processes, connections) on drop. no per-call state is kept, so
/// one instance is shared across concurrent invocations.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String, GenerationError>;

    fn name(&self) -> &str {
        "model"
    }
}

/// how a message list is flattened into a single prompt text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChatTemplate {
    #[default]
    Llama2,
    Plain,
}

impl FromStr for ChatTemplate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "llama2" | "llama-2" => Ok(ChatTemplate::Llama2),
            "plain" => Ok(ChatTemplate::Plain),
            other => Err(format!("unknown chat template: {}", other)),
        }
    }
}

pub fn render_prompt(messages: &[Message], template: ChatTemplate) -> String {
    let mut prompt = String::new();

    for msg in messages {
        match (template, &msg.role) {
            (ChatTemplate::Llama2, MessageRole::System) => {
                prompt.push_str(&format!("<<SYS>>\n{}\n<</SYS>>\n\n", msg.content));
            }
            (ChatTemplate::Llama2, MessageRole::User) => {
                prompt.push_str(&format!("[INST] {} [/INST] ", msg.content));
            }
            (ChatTemplate::Llama2, MessageRole::Assistant) => {
                prompt.push_str(&format!("{} ", msg.content));
            }
            (ChatTemplate::Plain, role) => {
                let label = match role {
                    MessageRole::System => "system",
                    MessageRole::User => "user",
                    MessageRole::Assistant => "assistant",
                };
                prompt.push_str(&format!("{}:\n{}\n\n", label, msg.content));
            }
        }
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = Message::system("test");
        assert_eq!(msg.role, MessageRole::System);
        assert_eq!(msg.content, "test");
    }

    #[test]
    fn test_render_llama2() {
        let prompt = render_prompt(
            &[Message::system("be terse"), Message::user("count rows")],
            ChatTemplate::Llama2,
        );
        assert_eq!(prompt, "<<SYS>>\nbe terse\n<</SYS>>\n\n[INST] count rows [/INST] ");
    }

    #[test]
    fn test_render_plain() {
        let prompt = render_prompt(
            &[Message::user("count rows"), Message::assistant("SELECT 1")],
            ChatTemplate::Plain,
        );
        assert_eq!(prompt, "user:\ncount rows\n\nassistant:\nSELECT 1\n\n");
    }

    #[test]
    fn test_template_from_str() {
        assert_eq!("Plain".parse::<ChatTemplate>(), Ok(ChatTemplate::Plain));
        assert_eq!("llama2".parse::<ChatTemplate>(), Ok(ChatTemplate::Llama2));
        assert!("chatml".parse::<ChatTemplate>().is_err());
    }
}
