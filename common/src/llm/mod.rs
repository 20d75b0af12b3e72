pub mod command;
pub mod model;

pub use command::CommandModel;
pub use model::{render_prompt, ChatTemplate, CompletionModel, Message, MessageRole};
